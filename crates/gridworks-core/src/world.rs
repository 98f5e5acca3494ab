//! The World aggregate: every node, item, robot and job, plus the id
//! counters and the rules the world was created with.

use crate::fixed::{Fixed64, Ticks};
use crate::geometry::Position;
use crate::id::{ItemId, JobId, NodeId, RobotId};
use crate::item::Item;
use crate::job::{Job, Robot};
use crate::node::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default chance per tick that an empty producer spawns an item.
pub const DEFAULT_PRODUCER_RATE: f64 = 0.1;
/// Default chance per tick that a purifier raises its item's purity.
pub const DEFAULT_PURIFIER_RATE: f64 = 0.1;
/// Default purity cap; purifiers release items only at this purity.
pub const DEFAULT_MAX_PURITY: u32 = 10;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Tunable constants. Stored in the world so snapshots replay identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    pub max_purity: u32,
    /// Rate given to new producers unless a request overrides it.
    pub producer_rate: Fixed64,
    /// Rate given to new purifiers unless a request overrides it.
    pub purifier_rate: Fixed64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            max_purity: DEFAULT_MAX_PURITY,
            producer_rate: Fixed64::from_num(DEFAULT_PRODUCER_RATE),
            purifier_rate: Fixed64::from_num(DEFAULT_PURIFIER_RATE),
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Complete simulation state. Maps are ordered so iteration, hashing and
/// serialization are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub tick: Ticks,
    pub rules: Rules,
    pub nodes: BTreeMap<NodeId, Node>,
    pub items: BTreeMap<ItemId, Item>,
    pub robots: BTreeMap<RobotId, Robot>,
    pub jobs: BTreeMap<JobId, Job>,
    pub next_item_id: u64,
    pub next_robot_id: u64,
    pub next_job_id: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Rules::default())
    }
}

impl World {
    /// An empty world at tick 0.
    pub fn new(rules: Rules) -> Self {
        Self {
            tick: 0,
            rules,
            nodes: BTreeMap::new(),
            items: BTreeMap::new(),
            robots: BTreeMap::new(),
            jobs: BTreeMap::new(),
            next_item_id: 0,
            next_robot_id: 0,
            next_job_id: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Id allocation
    // -----------------------------------------------------------------------

    pub(crate) fn allocate_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    pub(crate) fn allocate_robot_id(&mut self) -> RobotId {
        let id = RobotId(self.next_robot_id);
        self.next_robot_id += 1;
        id
    }

    pub(crate) fn allocate_job_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_at(&self, position: Position) -> Option<&Node> {
        self.nodes.get(&NodeId(position))
    }

    pub fn is_occupied(&self, position: Position) -> bool {
        self.nodes.contains_key(&NodeId(position))
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// The item resting on `node`, if any.
    pub fn item_on(&self, node: NodeId) -> Option<&Item> {
        self.node(node)
            .and_then(|n| n.item)
            .and_then(|id| self.items.get(&id))
    }

    pub fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(&id)
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// The job targeting `node`, if any.
    pub fn job_for(&self, node: NodeId) -> Option<&Job> {
        self.jobs.values().find(|job| job.node == node)
    }

    // Invariant-checked lookups for the simulation passes. A miss means
    // the world is corrupt.

    pub(crate) fn expect_node(&self, id: NodeId) -> &Node {
        match self.nodes.get(&id) {
            Some(node) => node,
            None => panic!("node {id} referenced but missing from world"),
        }
    }

    pub(crate) fn expect_node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => panic!("node {id} referenced but missing from world"),
        }
    }

    pub(crate) fn expect_item(&self, id: ItemId) -> &Item {
        match self.items.get(&id) {
            Some(item) => item,
            None => panic!("item {id} referenced but missing from world"),
        }
    }

    pub(crate) fn expect_item_mut(&mut self, id: ItemId) -> &mut Item {
        match self.items.get_mut(&id) {
            Some(item) => item,
            None => panic!("item {id} referenced but missing from world"),
        }
    }

    // -----------------------------------------------------------------------
    // Aggregate queries
    // -----------------------------------------------------------------------

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Consumer stats summed over every consumer.
    pub fn consumed_totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for node in self.nodes.values() {
            if let NodeKind::Consumer { stats } = &node.kind {
                for (key, count) in stats {
                    *totals.entry(key.clone()).or_insert(0) += count;
                }
            }
        }
        totals
    }

    /// Power accumulated by every energizer.
    pub fn energized_power(&self) -> u64 {
        self.nodes
            .values()
            .filter_map(|node| match node.kind {
                NodeKind::Energizer { power } => Some(power),
                _ => None,
            })
            .sum()
    }

    pub fn idle_robot_count(&self) -> usize {
        self.robots.values().filter(|r| r.is_idle()).count()
    }
}
