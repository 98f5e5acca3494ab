//! Property-based tests for the simulation core.
//!
//! Random grids of nodes, edges and items are ticked forward and checked
//! against the world invariants: items are never duplicated or lost,
//! every node holds at most one item, and the run is deterministic.

use gridworks_core::command_queue::Command;
use gridworks_core::engine::{self, Engine};
use gridworks_core::geometry::{Direction, Footprint, Position};
use gridworks_core::graph::{self, NodeRequest};
use gridworks_core::id::NodeId;
use gridworks_core::item::ItemColor;
use gridworks_core::node::NodeType;
use gridworks_core::rng::SimRng;
use gridworks_core::serialize::{deserialize_world, serialize_world};
use gridworks_core::test_utils::*;
use gridworks_core::validation::check_world;
use gridworks_core::world::World;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

const GRID: i32 = 6;

const PLACEABLE: [NodeType; 6] = [
    NodeType::Normal,
    NodeType::Normal,
    NodeType::Producer,
    NodeType::Purifier,
    NodeType::Energizer,
    NodeType::Consumer,
];

/// A random world on a small grid. Rejected edits are simply skipped, so
/// every generated world is consistent by construction.
fn arb_world(max_nodes: usize) -> impl Strategy<Value = World> {
    (
        proptest::collection::vec((0..GRID, 0..GRID, 0..PLACEABLE.len()), 1..max_nodes),
        proptest::collection::vec((any::<prop::sample::Index>(), 0..4usize), 0..max_nodes * 2),
        proptest::collection::vec((any::<prop::sample::Index>(), 0..3usize, 0..=10u32), 0..max_nodes),
        0..=10u32,
    )
        .prop_map(|(cells, edges, items, rate_tenths)| {
            let mut world = World::default();
            let rate = fixed(rate_tenths as f64 / 10.0);
            for (x, y, t) in cells {
                let node_type = PLACEABLE[t];
                let mut request = NodeRequest::new(Position::new(x, y), node_type);
                if matches!(node_type, NodeType::Producer | NodeType::Purifier) {
                    request = request.with_rate(rate);
                }
                let _ = graph::add_node(&mut world, request);
            }

            let ids: Vec<NodeId> = world.nodes.keys().copied().collect();
            for (index, dir) in edges {
                let from = *index.get(&ids);
                if let Some(cell) = from.position().checked_offset(Direction::all()[dir].delta()) {
                    let _ = graph::connect(&mut world, from, NodeId::from(cell));
                }
            }

            for (index, color, purity) in items {
                let node = *index.get(&ids);
                if world.item_on(node).is_none() {
                    put_item(&mut world, node, ItemColor::ALL[color], purity);
                }
            }
            world
        })
}

#[derive(Debug, Clone)]
enum MutOp {
    Place(i32, i32, usize, bool),
    Form(i32, i32),
    Connect(i32, i32, usize),
    Disconnect(i32, i32, usize),
    Destroy(i32, i32),
    Delete(i32, i32),
    Step,
}

fn arb_mut_op() -> impl Strategy<Value = MutOp> {
    prop_oneof![
        4 => (0..GRID, 0..GRID, 0..PLACEABLE.len(), any::<bool>())
            .prop_map(|(x, y, t, c)| MutOp::Place(x, y, t, c)),
        1 => (0..GRID, 0..GRID).prop_map(|(x, y)| MutOp::Form(x, y)),
        4 => (0..GRID, 0..GRID, 0..4usize).prop_map(|(x, y, d)| MutOp::Connect(x, y, d)),
        1 => (0..GRID, 0..GRID, 0..4usize).prop_map(|(x, y, d)| MutOp::Disconnect(x, y, d)),
        2 => (0..GRID, 0..GRID).prop_map(|(x, y)| MutOp::Destroy(x, y)),
        1 => (0..GRID, 0..GRID).prop_map(|(x, y)| MutOp::Delete(x, y)),
        4 => Just(MutOp::Step),
    ]
}

fn arb_mutation_sequence(max_len: usize) -> impl Strategy<Value = Vec<MutOp>> {
    proptest::collection::vec(arb_mut_op(), 1..max_len)
}

fn neighbor(x: i32, y: i32, dir: usize) -> NodeId {
    let cell = Position::new(x, y).checked_offset(Direction::all()[dir].delta());
    NodeId::from(cell.unwrap_or(Position::new(x, y)))
}

fn command_for(op: &MutOp) -> Option<Command> {
    let command = match *op {
        MutOp::Place(x, y, t, construct) => {
            let mut request = NodeRequest::new(Position::new(x, y), PLACEABLE[t]);
            if construct {
                request = request.under_construction();
            }
            Command::AddNode(request)
        }
        MutOp::Form(x, y) => Command::AddForm {
            origin: Position::new(x, y),
            size: Footprint::new(2, 2),
        },
        MutOp::Connect(x, y, d) => Command::Connect {
            from: NodeId::new(x, y),
            to: neighbor(x, y, d),
        },
        MutOp::Disconnect(x, y, d) => Command::Disconnect {
            from: NodeId::new(x, y),
            to: neighbor(x, y, d),
        },
        MutOp::Destroy(x, y) => Command::Destroy {
            node: NodeId::new(x, y),
        },
        MutOp::Delete(x, y) => Command::Delete {
            node: NodeId::new(x, y),
        },
        MutOp::Step => return None,
    };
    Some(command)
}

/// An engine with a robot terminal parked just outside the grid.
fn engine_with_terminal(seed: u64) -> Engine {
    let mut world = World::default();
    place(&mut world, -1, -1, NodeType::RobotTerminal);
    Engine::new(world, seed)
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Item count changes only by spawned minus consumed minus energized.
    #[test]
    fn items_are_conserved(mut world in arb_world(30), seed in any::<u64>()) {
        let mut rng = SimRng::new(seed);
        for _ in 0..30 {
            let before = world.item_count() as i64;
            let report = engine::tick(&mut world, &mut rng);
            prop_assert_eq!(world.item_count() as i64, before + report.item_delta());
        }
    }

    /// Every node holds at most one item and every item is on its node,
    /// before and after every tick.
    #[test]
    fn single_occupancy_holds(mut world in arb_world(30), seed in any::<u64>()) {
        prop_assert!(check_world(&world).is_empty());
        let mut rng = SimRng::new(seed);
        for _ in 0..20 {
            engine::tick(&mut world, &mut rng);
            prop_assert_eq!(check_world(&world), Vec::new());
            let occupied = world.nodes.values().filter(|n| n.item.is_some()).count();
            prop_assert_eq!(occupied, world.item_count());
        }
    }

    /// A purifier never hands on an item below the purity cap.
    #[test]
    fn purifiers_gate_on_purity(mut world in arb_world(30), seed in any::<u64>()) {
        let max = world.rules.max_purity;
        let mut rng = SimRng::new(seed);
        for _ in 0..20 {
            let before = world.clone();
            engine::tick(&mut world, &mut rng);
            for (id, item) in &before.items {
                let held_by = before.node(item.node).map(|n| n.node_type());
                if held_by != Some(NodeType::Purifier) || item.purity >= max {
                    continue;
                }
                if let Some(after) = world.item(*id) {
                    if after.node != item.node {
                        prop_assert!(after.purity >= max, "item {} left a purifier at purity {}", id, after.purity);
                    }
                }
            }
        }
    }

    /// Two runs from the same world and seed end identically.
    #[test]
    fn simulation_is_deterministic(world in arb_world(30), seed in any::<u64>()) {
        let mut a = Engine::new(world.clone(), seed);
        let mut b = Engine::new(world, seed);
        a.advance(25);
        b.advance(25);
        prop_assert_eq!(a.world(), b.world());
        prop_assert_eq!(a.state_hash(), b.state_hash());
    }

    /// A snapshot reproduces the world exactly.
    #[test]
    fn snapshot_round_trip(world in arb_world(30), seed in any::<u64>()) {
        let mut engine = Engine::new(world, seed);
        engine.advance(5);
        let bytes = serialize_world(engine.world()).expect("serialize should succeed");
        let restored = deserialize_world(&bytes).expect("deserialize should succeed");
        prop_assert_eq!(&restored, engine.world());
    }

    /// Any sequence of queued edits and steps keeps the world consistent.
    /// The engine itself panics if a step ends inconsistent.
    #[test]
    fn mutation_safety(ops in arb_mutation_sequence(80), seed in any::<u64>()) {
        let mut engine = engine_with_terminal(seed);
        for op in &ops {
            match command_for(op) {
                Some(command) => engine.queue(command),
                None => {
                    engine.step();
                }
            }
        }
        engine.step();
        prop_assert!(check_world(engine.world()).is_empty());
    }

    /// Queued commands and direct edits reach the same world.
    #[test]
    fn queued_and_direct_edits_agree(ops in arb_mutation_sequence(40)) {
        let mut queued = engine_with_terminal(3);
        let mut direct = engine_with_terminal(3);
        for op in &ops {
            match command_for(op) {
                Some(command) => {
                    queued.queue(command.clone());
                    queued.step();
                    let _ = direct.apply(command);
                    direct.step();
                }
                None => {
                    queued.step();
                    direct.step();
                }
            }
        }
        prop_assert_eq!(queued.world(), direct.world());
    }

    /// Every idle robot sits on its home terminal after a step.
    #[test]
    fn idle_robots_are_home(ops in arb_mutation_sequence(60), seed in any::<u64>()) {
        let mut engine = engine_with_terminal(seed);
        for op in &ops {
            if let Some(command) = command_for(op) {
                engine.queue(command);
            }
            engine.step();
            for robot in engine.world().robots.values() {
                if robot.is_idle() {
                    prop_assert_eq!(robot.position, robot.home.position());
                }
            }
        }
    }
}
