//! Graph edits submitted from outside the engine.
//!
//! Queued commands are applied at the start of the next step, before the
//! tick runs, in the order they were pushed.

use crate::fixed::Ticks;
use crate::geometry::{Footprint, Position};
use crate::graph::{DestroyOutcome, EditResult, NodeRequest, PathOutcome, Placed, Removed};
use crate::id::NodeId;

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

/// A single edit that can be submitted to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Place a single node.
    AddNode(NodeRequest),
    /// Place a rectangular form rooted at `origin`.
    AddForm { origin: Position, size: Footprint },
    /// Lay a conveyor along consecutive cells.
    AddPath { cells: Vec<Position>, construct: bool },
    /// Add an output edge.
    Connect { from: NodeId, to: NodeId },
    /// Remove an output edge.
    Disconnect { from: NodeId, to: NodeId },
    /// Request removal through a destruction job.
    Destroy { node: NodeId },
    /// Remove a node immediately.
    Delete { node: NodeId },
}

/// What an applied command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Placed(Placed),
    Form(NodeId),
    Path(PathOutcome),
    Connected,
    Disconnected,
    Destroy(DestroyOutcome),
    Deleted(Removed),
}

/// Result of applying one queued command.
pub type CommandResult = EditResult<CommandOutcome>;

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// Commands waiting for the next step, plus an optional bounded log of the
/// ones already handed out.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<Command>,
    log: CommandLog,
}

/// Applied commands tagged with the tick they were taken on.
#[derive(Debug, Default)]
struct CommandLog {
    entries: Vec<(Ticks, Command)>,
    /// 0 disables logging.
    limit: usize,
}

impl CommandLog {
    fn record(&mut self, tick: Ticks, commands: &[Command]) {
        if self.limit == 0 {
            return;
        }
        let skip = commands.len().saturating_sub(self.limit);
        self.entries
            .extend(commands[skip..].iter().cloned().map(|c| (tick, c)));
        self.trim();
    }

    fn trim(&mut self) {
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that logs up to `limit` applied commands.
    pub fn with_max_history(limit: usize) -> Self {
        let mut queue = Self::default();
        queue.set_history_limit(limit);
        queue
    }

    /// Change the log bound, dropping the oldest entries if it shrank.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.log.limit = limit;
        self.log.trim();
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.pending.extend(commands);
    }

    /// Take every pending command in submission order, logging them under
    /// `tick`.
    pub fn drain(&mut self, tick: Ticks) -> Vec<Command> {
        let taken = std::mem::take(&mut self.pending);
        self.log.record(tick, &taken);
        taken
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Logged `(tick, command)` pairs, oldest first.
    pub fn history(&self) -> &[(Ticks, Command)] {
        &self.log.entries
    }

    pub fn clear_history(&mut self) {
        self.log.entries.clear();
    }
}
