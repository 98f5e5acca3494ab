//! The simulation engine: owns the world, the random source and the event
//! bus, and runs the per-step pipeline.
//!
//! A step runs four phases in order:
//!
//! 1. **Pre-tick**: apply queued commands.
//! 2. **Items**: the node pass in [`crate::tick`].
//! 3. **Jobs**: the scheduler in [`crate::scheduler`].
//! 4. **Bookkeeping**: consistency check, event delivery, state hash.
//!
//! Edits made directly through the engine between steps take effect
//! immediately. Their events are held back and recorded at the start of
//! the next step, so the event buffers always describe one step.

use crate::command_queue::{Command, CommandOutcome, CommandQueue, CommandResult};
use crate::event::{Event, EventBus, EventKind, PassiveListener};
use crate::geometry::{Footprint, Position};
use crate::graph::{self, DestroyOutcome, EditResult, NodeRequest, PathOutcome, Placed, Removed};
use crate::id::{JobId, NodeId};
use crate::node::NodeType;
use crate::rng::{RandomSource, SimRng};
use crate::scheduler;
use crate::sim::{hash_world, AdvanceResult, StateHash, TickReport};
use crate::tick::tick_nodes;
use crate::validation::check_world;
use crate::world::World;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Free-standing step
// ---------------------------------------------------------------------------

/// Advance `world` by one tick using `rng`.
///
/// Deterministic given the world and the random source state. Panics if
/// the world is inconsistent afterwards.
pub fn tick<R: RandomSource>(world: &mut World, rng: &mut R) -> TickReport {
    let mut events = EventBus::default();
    run_tick(world, rng, &mut events)
}

fn run_tick<R: RandomSource>(world: &mut World, rng: &mut R, events: &mut EventBus) -> TickReport {
    world.tick += 1;
    let mut report = TickReport {
        tick: world.tick,
        ..Default::default()
    };

    tick_nodes(world, rng, events, &mut report);
    scheduler::tick_jobs(world, events, &mut report);
    scheduler::tick_robots(world);

    assert_consistent(world);
    trace!(tick = world.tick, ?report, "tick complete");
    report
}

/// Panic with every broken invariant if the world is inconsistent.
pub fn assert_consistent(world: &World) {
    let violations = check_world(world);
    if !violations.is_empty() {
        let list = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        panic!("world inconsistent at tick {}: {list}", world.tick);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Result of a single [`Engine::step`].
#[derive(Debug, Default)]
pub struct StepResult {
    pub report: TickReport,
    /// One result per queued command, in submission order.
    pub commands: Vec<CommandResult>,
}

#[derive(Debug)]
pub struct Engine {
    pub(crate) world: World,
    pub(crate) rng: SimRng,
    pub(crate) events: EventBus,
    commands: CommandQueue,
    /// Events from direct edits, recorded at the start of the next step.
    staged: Vec<Event>,
    pub(crate) paused: bool,
    last_state_hash: u64,
}

impl Engine {
    /// Wrap an existing world. The world is checked first; an
    /// inconsistent world panics.
    pub fn new(world: World, seed: u64) -> Self {
        Self::with_rng(world, SimRng::new(seed))
    }

    pub fn with_rng(world: World, rng: SimRng) -> Self {
        assert_consistent(&world);
        let mut engine = Self {
            world,
            rng,
            events: EventBus::default(),
            commands: CommandQueue::new(),
            staged: Vec::new(),
            paused: false,
            last_state_hash: 0,
        };
        engine.last_state_hash = engine.compute_state_hash();
        engine
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn tick(&self) -> u64 {
        self.world.tick
    }

    /// Consume the engine, returning the world and random source.
    pub fn into_parts(self) -> (World, SimRng) {
        (self.world, self.rng)
    }

    // -----------------------------------------------------------------------
    // Direct edits
    // -----------------------------------------------------------------------

    pub fn add_node(&mut self, request: NodeRequest) -> EditResult<Placed> {
        let node_type = request.node_type;
        let placed = graph::add_node(&mut self.world, request)?;
        self.stage_node_added(placed.node, node_type);
        if let Some(job) = placed.job {
            self.stage_job_queued(job);
        }
        Ok(placed)
    }

    pub fn add_form_node(&mut self, origin: Position, size: Footprint) -> EditResult<NodeId> {
        let root = graph::add_form_node(&mut self.world, origin, size)?;
        for cell in size.tiles(origin) {
            let id = NodeId(cell);
            let node_type = self.world.expect_node(id).node_type();
            self.stage_node_added(id, node_type);
        }
        Ok(root)
    }

    pub fn add_path(&mut self, cells: &[Position], construct: bool) -> EditResult<PathOutcome> {
        let outcome = graph::add_path(&mut self.world, cells, construct)?;
        for &node in &outcome.placed {
            let node_type = self.world.expect_node(node).node_type();
            self.stage_node_added(node, node_type);
            if let Some(job) = self.world.job_for(node).map(|j| j.id) {
                self.stage_job_queued(job);
            }
        }
        for &(from, to) in &outcome.linked {
            self.stage(Event::EdgeAdded { from, to, tick: self.world.tick });
        }
        Ok(outcome)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> EditResult<()> {
        graph::connect(&mut self.world, from, to)?;
        self.stage(Event::EdgeAdded { from, to, tick: self.world.tick });
        Ok(())
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> EditResult<()> {
        graph::disconnect(&mut self.world, from, to)?;
        self.stage(Event::EdgeRemoved { from, to, tick: self.world.tick });
        Ok(())
    }

    pub fn destroy_node(&mut self, node: NodeId) -> EditResult<DestroyOutcome> {
        let outcome = graph::destroy_node(&mut self.world, node)?;
        match &outcome {
            DestroyOutcome::Queued(job) => self.stage_job_queued(*job),
            DestroyOutcome::Cancelled(removed) => self.stage_removed(removed),
            DestroyOutcome::AlreadyPending => {}
        }
        Ok(outcome)
    }

    pub fn delete_node(&mut self, node: NodeId) -> EditResult<Removed> {
        let removed = graph::delete_node(&mut self.world, node)?;
        self.stage_removed(&removed);
        Ok(removed)
    }

    /// Apply a command immediately.
    pub fn apply(&mut self, command: Command) -> CommandResult {
        match command {
            Command::AddNode(request) => self.add_node(request).map(CommandOutcome::Placed),
            Command::AddForm { origin, size } => {
                self.add_form_node(origin, size).map(CommandOutcome::Form)
            }
            Command::AddPath { cells, construct } => {
                self.add_path(&cells, construct).map(CommandOutcome::Path)
            }
            Command::Connect { from, to } => {
                self.connect(from, to).map(|()| CommandOutcome::Connected)
            }
            Command::Disconnect { from, to } => {
                self.disconnect(from, to).map(|()| CommandOutcome::Disconnected)
            }
            Command::Destroy { node } => self.destroy_node(node).map(CommandOutcome::Destroy),
            Command::Delete { node } => self.delete_node(node).map(CommandOutcome::Deleted),
        }
    }

    // -----------------------------------------------------------------------
    // Command queue
    // -----------------------------------------------------------------------

    /// Queue a command for the next step.
    pub fn queue(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn queue_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.commands.push_batch(commands);
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.pending_count()
    }

    /// Keep up to `max` applied commands for inspection.
    pub fn set_command_history(&mut self, max: usize) {
        self.commands.set_history_limit(max);
    }

    pub fn command_history(&self) -> &[(u64, Command)] {
        self.commands.history()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    /// Register a passive listener for an event kind. Listeners run at the
    /// end of every step.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.events.on_passive(kind, listener);
    }

    /// Events recorded during the most recent step.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn stage(&mut self, event: Event) {
        self.staged.push(event);
    }

    fn stage_node_added(&mut self, node: NodeId, node_type: NodeType) {
        self.stage(Event::NodeAdded {
            node,
            node_type,
            tick: self.world.tick,
        });
    }

    fn stage_job_queued(&mut self, job: JobId) {
        if let Some(j) = self.world.job(job) {
            let event = Event::JobQueued {
                job,
                kind: j.kind,
                node: j.node,
                tick: self.world.tick,
            };
            self.stage(event);
        }
    }

    fn stage_removed(&mut self, removed: &Removed) {
        let tick = self.world.tick;
        for &job in &removed.jobs {
            self.stage(Event::JobCancelled {
                job,
                node: removed.node.id,
                tick,
            });
        }
        for &from in &removed.severed {
            self.stage(Event::EdgeRemoved {
                from,
                to: removed.node.id,
                tick,
            });
        }
        self.stage(Event::NodeRemoved {
            node: removed.node.id,
            tick,
        });
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `step()` and `advance()` are
    /// no-ops. Direct edits still work.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// The state hash computed at the end of the most recent step.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    pub(crate) fn compute_state_hash(&self) -> u64 {
        StateHash::new()
            .field(&hash_world(&self.world))
            .field(&self.rng.state())
            .finish()
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Run one step: queued commands, then the tick.
    pub fn step(&mut self) -> StepResult {
        if self.paused {
            return StepResult::default();
        }

        // Phase 1: pre-tick.
        self.events.clear_all();
        for event in std::mem::take(&mut self.staged) {
            self.events.emit(event);
        }
        let commands = self.commands.drain(self.world.tick);
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.apply(command);
            if let Err(failure) = &result {
                debug!(tick = self.world.tick, %failure, "queued command rejected");
            }
            results.push(result);
        }
        for event in std::mem::take(&mut self.staged) {
            self.events.emit(event);
        }

        // Phases 2 and 3.
        let report = run_tick(&mut self.world, &mut self.rng, &mut self.events);

        // Phase 4: bookkeeping.
        self.events.deliver();
        self.last_state_hash = self.compute_state_hash();

        StepResult {
            report,
            commands: results,
        }
    }

    /// Run `steps` steps, summing their reports. Queued command results
    /// are dropped; use [`Engine::step`] to inspect them.
    pub fn advance(&mut self, steps: u64) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.paused {
            return result;
        }
        for _ in 0..steps {
            let step = self.step();
            result.totals.merge(&step.report);
            result.steps_run += 1;
        }
        result
    }
}
