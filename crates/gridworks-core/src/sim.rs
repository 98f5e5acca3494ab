//! Per-step result types and the world state hash.

use crate::fixed::{Fixed64, Ticks};
use crate::geometry::{Delta, Position};
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::world::World;

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// What happened during one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick this report describes.
    pub tick: Ticks,
    pub spawned: u32,
    pub consumed: u32,
    pub energized: u32,
    pub purified: u32,
    pub moved: u32,
    pub jobs_assigned: u32,
    pub jobs_completed: u32,
}

impl TickReport {
    /// Net change in the number of items in the world.
    pub fn item_delta(&self) -> i64 {
        self.spawned as i64 - self.consumed as i64 - self.energized as i64
    }

    /// Fold another report into this one. The tick becomes the later one.
    pub fn merge(&mut self, other: &TickReport) {
        self.tick = self.tick.max(other.tick);
        self.spawned += other.spawned;
        self.consumed += other.consumed;
        self.energized += other.energized;
        self.purified += other.purified;
        self.moved += other.moved;
        self.jobs_assigned += other.jobs_assigned;
        self.jobs_completed += other.jobs_completed;
    }
}

// ---------------------------------------------------------------------------
// Advance result
// ---------------------------------------------------------------------------

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default)]
pub struct AdvanceResult {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,
    /// Sum of the per-step reports.
    pub totals: TickReport,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// 64-bit FNV-1a over little-endian field encodings. Used to compare runs
/// and snapshots, not for security.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

/// A value with a fixed byte encoding for [`StateHash`].
pub trait HashField {
    fn feed(&self, h: &mut StateHash);
}

impl StateHash {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub fn new() -> Self {
        Self(Self::OFFSET)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0 = bytes
            .iter()
            .fold(self.0, |acc, &b| (acc ^ u64::from(b)).wrapping_mul(Self::PRIME));
        self
    }

    pub fn field(&mut self, value: &impl HashField) -> &mut Self {
        value.feed(self);
        self
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! hash_le_bytes {
    ($($t:ty),*) => {
        $(impl HashField for $t {
            fn feed(&self, h: &mut StateHash) {
                h.bytes(&self.to_le_bytes());
            }
        })*
    };
}

hash_le_bytes!(u8, u32, u64, i32, i64);

impl HashField for usize {
    fn feed(&self, h: &mut StateHash) {
        h.field(&(*self as u64));
    }
}

impl HashField for Fixed64 {
    fn feed(&self, h: &mut StateHash) {
        h.field(&self.to_bits());
    }
}

impl HashField for Position {
    fn feed(&self, h: &mut StateHash) {
        h.field(&self.x).field(&self.y);
    }
}

impl HashField for Delta {
    fn feed(&self, h: &mut StateHash) {
        h.field(&self.x).field(&self.y);
    }
}

impl HashField for NodeId {
    fn feed(&self, h: &mut StateHash) {
        h.field(&self.position());
    }
}

impl HashField for str {
    fn feed(&self, h: &mut StateHash) {
        h.field(&self.len()).bytes(self.as_bytes());
    }
}

impl HashField for String {
    fn feed(&self, h: &mut StateHash) {
        self.as_str().feed(h);
    }
}

/// A presence tag comes first, so `None` and a zero value differ.
impl<T: HashField> HashField for Option<T> {
    fn feed(&self, h: &mut StateHash) {
        match self {
            Some(v) => h.field(&1u8).field(v),
            None => h.field(&0u8),
        };
    }
}

/// Hash every simulated field of `world`. Maps are ordered, so equal
/// worlds always hash equally.
pub fn hash_world(world: &World) -> u64 {
    let mut h = StateHash::new();
    h.field(&world.tick)
        .field(&world.rules.max_purity)
        .field(&world.rules.producer_rate)
        .field(&world.rules.purifier_rate)
        .field(&world.next_item_id)
        .field(&world.next_robot_id)
        .field(&world.next_job_id);

    h.field(&world.nodes.len());
    for node in world.nodes.values() {
        h.field(&node.position)
            .field(&(node.state as u8))
            .field(&(node.node_type() as u8))
            .field(&node.item.map(|i| i.0))
            .field(&node.outputs.len());
        for (target, &direction) in &node.outputs {
            h.field(target).field(&(direction as u8));
        }
        match &node.kind {
            NodeKind::Consumer { stats } => {
                for (key, count) in stats {
                    h.field(key).field(count);
                }
            }
            NodeKind::Producer { rate, power } => {
                h.field(rate).field(power);
            }
            NodeKind::Purifier { rate } => {
                h.field(rate);
            }
            NodeKind::Energizer { power } => {
                h.field(power);
            }
            NodeKind::FormRoot { target } => {
                h.field(target);
            }
            NodeKind::RobotTerminal { robot } => {
                h.field(&robot.0);
            }
            NodeKind::Normal | NodeKind::FormLeaf => {}
        }
    }

    h.field(&world.items.len());
    for item in world.items.values() {
        h.field(&item.id.0)
            .field(&item.node)
            .field(&item.tick)
            .field(&(item.color as u8))
            .field(&item.purity)
            .field(&item.display_delta);
    }

    h.field(&world.robots.len());
    for robot in world.robots.values() {
        h.field(&robot.id.0)
            .field(&robot.home)
            .field(&robot.position)
            .field(&robot.display_delta)
            .field(&robot.job.map(|j| j.0));
    }

    h.field(&world.jobs.len());
    for job in world.jobs.values() {
        h.field(&job.id.0)
            .field(&(job.kind as u8))
            .field(&job.node)
            .field(&job.robot.map(|r| r.0));
    }

    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeState};

    #[test]
    fn fnv_reference_values() {
        assert_eq!(StateHash::new().finish(), 0xcbf2_9ce4_8422_2325);
        assert_eq!(StateHash::new().bytes(b"a").finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn field_order_matters() {
        let a = StateHash::new().field(&1u32).field(&2u32).finish();
        let b = StateHash::new().field(&2u32).field(&1u32).finish();
        assert_ne!(a, b);
        assert_eq!(a, StateHash::new().field(&1u32).field(&2u32).finish());
    }

    #[test]
    fn none_differs_from_zero() {
        let none = StateHash::new().field(&None::<u64>).finish();
        let zero = StateHash::new().field(&Some(0u64)).finish();
        assert_ne!(none, zero);
    }

    #[test]
    fn world_hash_tracks_changes() {
        let mut world = World::default();
        let empty = hash_world(&world);
        assert_eq!(empty, hash_world(&world.clone()));

        let node = Node::new(Position::ORIGIN, NodeState::Active, NodeKind::Normal);
        world.nodes.insert(node.id, node);
        let one = hash_world(&world);
        assert_ne!(empty, one);

        world.tick += 1;
        assert_ne!(one, hash_world(&world));
    }

    #[test]
    fn report_item_delta() {
        let report = TickReport {
            spawned: 3,
            consumed: 1,
            energized: 1,
            ..Default::default()
        };
        assert_eq!(report.item_delta(), 1);

        let mut total = TickReport::default();
        total.merge(&report);
        total.merge(&TickReport { tick: 9, moved: 2, ..Default::default() });
        assert_eq!(total.spawned, 3);
        assert_eq!(total.moved, 2);
        assert_eq!(total.tick, 9);
    }
}
