//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::fixed::Fixed64;
use crate::geometry::Position;
use crate::graph::{self, NodeRequest};
use crate::id::{ItemId, NodeId};
use crate::item::{Item, ItemColor};
use crate::node::NodeType;
use crate::rng::RandomSource;
use crate::world::World;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Placement
// ===========================================================================

/// Place an active node, panicking on rejection.
pub fn place(world: &mut World, x: i32, y: i32, node_type: NodeType) -> NodeId {
    match graph::add_node(world, NodeRequest::new(Position::new(x, y), node_type)) {
        Ok(placed) => placed.node,
        Err(e) => panic!("cannot place {node_type} at {x}.{y}: {e}"),
    }
}

pub fn place_producer(world: &mut World, x: i32, y: i32, rate: f64) -> NodeId {
    let request = NodeRequest::new(Position::new(x, y), NodeType::Producer).with_rate(fixed(rate));
    match graph::add_node(world, request) {
        Ok(placed) => placed.node,
        Err(e) => panic!("cannot place producer at {x}.{y}: {e}"),
    }
}

pub fn place_purifier(world: &mut World, x: i32, y: i32, rate: f64) -> NodeId {
    let request = NodeRequest::new(Position::new(x, y), NodeType::Purifier).with_rate(fixed(rate));
    match graph::add_node(world, request) {
        Ok(placed) => placed.node,
        Err(e) => panic!("cannot place purifier at {x}.{y}: {e}"),
    }
}

/// Connect two nodes, panicking on rejection.
pub fn link(world: &mut World, from: NodeId, to: NodeId) {
    if let Err(e) = graph::connect(world, from, to) {
        panic!("cannot link {from} -> {to}: {e}");
    }
}

/// Put a fresh item (tick 0) on an empty node.
pub fn put_item(world: &mut World, node: NodeId, color: ItemColor, purity: u32) -> ItemId {
    let id = world.allocate_item_id();
    world.items.insert(
        id,
        Item {
            id,
            node,
            tick: 0,
            color,
            purity,
            display_delta: None,
        },
    );
    let slot = &mut world.expect_node_mut(node).item;
    assert!(slot.is_none(), "node {node} already holds an item");
    *slot = Some(id);
    id
}

// ===========================================================================
// Layouts
// ===========================================================================

/// A clockwise ring of four Normal nodes with its top-left at `origin`:
/// `origin -> south -> south-east -> east -> origin`.
pub fn ring(world: &mut World, origin: Position) -> [NodeId; 4] {
    let cells = [
        origin,
        Position::new(origin.x, origin.y + 1),
        Position::new(origin.x + 1, origin.y + 1),
        Position::new(origin.x + 1, origin.y),
    ];
    let ids = cells.map(|p| place(world, p.x, p.y, NodeType::Normal));
    for i in 0..4 {
        link(world, ids[i], ids[(i + 1) % 4]);
    }
    ids
}

/// `len` Normal nodes running east from `start`, each linked to the next.
pub fn line(world: &mut World, start: Position, len: u32) -> Vec<NodeId> {
    let ids: Vec<NodeId> = (0..len as i32)
        .map(|dx| place(world, start.x + dx, start.y, NodeType::Normal))
        .collect();
    for pair in ids.windows(2) {
        link(world, pair[0], pair[1]);
    }
    ids
}

/// `rows` independent production lines, each a producer feeding `length`
/// conveyors into a consumer. Every fourth row ends in a purifier before
/// its consumer.
pub fn factory_rows(rows: u32, length: u32, rate: f64) -> World {
    let mut world = World::default();
    for row in 0..rows as i32 {
        let y = row * 2;
        let producer = place_producer(&mut world, 0, y, rate);
        let belt = line(&mut world, Position::new(1, y), length);
        let mut tail = *belt.last().unwrap_or(&producer);
        if let Some(&head) = belt.first() {
            link(&mut world, producer, head);
        }
        let mut x = length as i32 + 1;
        if row % 4 == 3 {
            let purifier = place_purifier(&mut world, x, y, 0.5);
            link(&mut world, tail, purifier);
            tail = purifier;
            x += 1;
        }
        let consumer = place(&mut world, x, y, NodeType::Consumer);
        link(&mut world, tail, consumer);
    }
    world
}

// ===========================================================================
// Random sources
// ===========================================================================

/// Replays a fixed list of values, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedRng {
    values: Vec<u64>,
    next: usize,
}

impl ScriptedRng {
    pub fn new(values: Vec<u64>) -> Self {
        assert!(!values.is_empty(), "scripted rng needs at least one value");
        Self { values, next: 0 }
    }

    /// Always yields zero: every roll in (0, 1) succeeds and every shuffle
    /// keeps a fixed order.
    pub fn zeros() -> Self {
        Self::new(vec![0])
    }

    /// Always yields `u64::MAX`: every roll below 1 fails.
    pub fn maxed() -> Self {
        Self::new(vec![u64::MAX])
    }

    pub fn draws(&self) -> usize {
        self.next
    }
}

impl RandomSource for ScriptedRng {
    fn next_u64(&mut self) -> u64 {
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        v
    }
}
