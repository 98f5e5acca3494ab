//! End-to-end scenarios driven through the engine.

use gridworks_core::command_queue::{Command, CommandOutcome};
use gridworks_core::engine::Engine;
use gridworks_core::event::{Event, EventKind};
use gridworks_core::geometry::{build_path, Axis, Position};
use gridworks_core::graph::{DestroyOutcome, EditError, NodeRequest};
use gridworks_core::id::NodeId;
use gridworks_core::item::ItemColor;
use gridworks_core::job::JobKind;
use gridworks_core::node::{NodeKind, NodeState, NodeType};
use gridworks_core::test_utils::*;
use gridworks_core::world::World;
use std::cell::RefCell;
use std::rc::Rc;

fn stats(engine: &Engine, node: NodeId) -> Vec<(String, u64)> {
    match &engine.world().node(node).unwrap().kind {
        NodeKind::Consumer { stats } => stats.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        other => panic!("{node} is not a consumer: {other:?}"),
    }
}

// ===========================================================================
// Item flow
// ===========================================================================

#[test]
fn producer_feeds_consumer_in_three_ticks() {
    let mut world = World::default();
    let producer = place_producer(&mut world, 0, 0, 1.0);
    let consumer = place(&mut world, 1, 0, NodeType::Consumer);
    link(&mut world, producer, consumer);
    let mut engine = Engine::new(world, 2024);

    let first = engine.step();
    assert_eq!(first.report.spawned, 1);
    let item = engine.world().item_on(producer).unwrap().clone();
    assert_eq!(item.tick, 1);
    assert_eq!(item.purity, 0);
    assert_eq!(engine.events().buffered_count(EventKind::ItemProduced), 1);

    let second = engine.step();
    assert_eq!(second.report.moved, 1);
    let moved = engine.world().item(item.id).unwrap();
    assert_eq!(moved.node, consumer);
    assert_eq!(moved.tick, 0);
    assert_eq!(
        engine.events().events(EventKind::ItemMoved).next(),
        Some(&Event::ItemMoved {
            from: producer,
            to: consumer,
            item: item.id,
            tick: 2,
        })
    );

    // Remove the producer so nothing new appears on the third tick.
    engine.delete_node(producer).unwrap();
    let third = engine.step();
    assert_eq!(third.report.consumed, 1);
    assert_eq!(engine.world().item_count(), 0);
    assert_eq!(stats(&engine, consumer), vec![(format!("{}-0", item.color), 1)]);
    assert_eq!(engine.events().buffered_count(EventKind::NodeRemoved), 1);
}

#[test]
fn purifier_line_delivers_only_pure_items() {
    let mut world = World::default();
    let producer = place_producer(&mut world, 0, 0, 1.0);
    let purifier = place_purifier(&mut world, 1, 0, 0.5);
    let consumer = place(&mut world, 2, 0, NodeType::Consumer);
    link(&mut world, producer, purifier);
    link(&mut world, purifier, consumer);
    let max = world.rules.max_purity;
    let mut engine = Engine::new(world, 31);

    let totals = engine.advance(200).totals;
    assert!(totals.consumed > 0);
    assert!(totals.purified >= totals.consumed * max);
    for (key, _) in stats(&engine, consumer) {
        assert!(key.ends_with(&format!("-{max}")), "impure item consumed: {key}");
    }
}

#[test]
fn ring_with_one_item_moves_one_hop_through_the_engine() {
    let mut world = World::default();
    let cells = ring(&mut world, Position::new(0, 0));
    let item = put_item(&mut world, cells[0], ItemColor::Green, 0);

    for seed in 0..32 {
        let mut engine = Engine::new(world.clone(), seed);
        for hop in 1..=8 {
            engine.step();
            assert_eq!(engine.world().item(item).unwrap().node, cells[hop % 4], "seed {seed}");
        }
    }
}

#[test]
fn energizer_collects_purified_green_items() {
    let mut world = World::default();
    let e = place(&mut world, 1, 0, NodeType::Energizer);
    let n = place(&mut world, 0, 0, NodeType::Normal);
    link(&mut world, n, e);
    put_item(&mut world, n, ItemColor::Green, 7);
    let mut engine = Engine::new(world, 0);

    let totals = engine.advance(3).totals;
    assert_eq!(totals.energized, 1);
    assert_eq!(engine.world().energized_power(), 7);
    assert_eq!(engine.world().item_count(), 0);
}

// ===========================================================================
// Jobs and robots
// ===========================================================================

#[test]
fn destroying_a_loaded_node_waits_for_the_robot() {
    let mut world = World::default();
    place(&mut world, 0, -2, NodeType::RobotTerminal);
    let target = place(&mut world, 0, 0, NodeType::Normal);
    put_item(&mut world, target, ItemColor::Red, 3);
    let mut engine = Engine::new(world, 5);

    let DestroyOutcome::Queued(job) = engine.destroy_node(target).unwrap() else {
        panic!("active node should queue a destruction job");
    };
    assert_eq!(engine.world().node(target).unwrap().state, NodeState::PendingDestruction);

    let first = engine.step();
    assert_eq!(first.report.jobs_assigned, 1);
    assert_eq!(engine.events().buffered_count(EventKind::JobQueued), 1);

    for _ in 0..2 {
        engine.step();
        assert!(engine.world().node(target).is_some());
        assert_eq!(engine.world().item_count(), 1);
    }

    let done = engine.step();
    assert_eq!(done.report.jobs_completed, 1);
    assert!(engine.world().node(target).is_none());
    assert_eq!(engine.world().item_count(), 0);
    assert!(engine.world().job(job).is_none());
    assert_eq!(
        engine.events().events(EventKind::JobCompleted).next(),
        Some(&Event::JobCompleted {
            job,
            kind: JobKind::Destroy,
            node: target,
            tick: 4,
        })
    );
    assert_eq!(engine.world().idle_robot_count(), 1);
}

#[test]
fn queued_construction_becomes_active() {
    let mut world = World::default();
    place(&mut world, 0, 0, NodeType::RobotTerminal);
    let mut engine = Engine::new(world, 0);

    let request = NodeRequest::new(Position::new(2, 1), NodeType::Normal).under_construction();
    engine.queue(Command::AddNode(request));
    let step = engine.step();
    let Ok(CommandOutcome::Placed(placed)) = &step.commands[0] else {
        panic!("placement should succeed: {:?}", step.commands);
    };
    assert!(placed.job.is_some());
    let node = placed.node;

    // Assigned on the first tick, three cells to walk, done on the next.
    engine.advance(3);
    assert_eq!(engine.world().node(node).unwrap().state, NodeState::PendingConstruction);
    let result = engine.step();
    assert_eq!(result.report.jobs_completed, 1);
    assert_eq!(engine.world().node(node).unwrap().state, NodeState::Active);
    assert!(engine.world().jobs.is_empty());
}

#[test]
fn items_skip_a_conveyor_under_construction() {
    let mut world = World::default();
    let a = place(&mut world, 0, 0, NodeType::Normal);
    let item = put_item(&mut world, a, ItemColor::Blue, 0);
    let mut engine = Engine::new(world, 8);
    let b = engine
        .add_node(NodeRequest::new(Position::new(1, 0), NodeType::Normal).under_construction())
        .unwrap()
        .node;
    engine.connect(a, b).unwrap();

    engine.advance(10);
    assert_eq!(engine.world().item(item).unwrap().node, a);
    assert_eq!(engine.world().node(b).unwrap().state, NodeState::PendingConstruction);
}

// ===========================================================================
// Editing through the engine
// ===========================================================================

#[test]
fn connect_validation_through_the_engine() {
    let mut world = World::default();
    let consumer = place(&mut world, 0, 0, NodeType::Consumer);
    let normal = place(&mut world, 1, 0, NodeType::Normal);
    let far = place(&mut world, 3, 0, NodeType::Normal);
    let mut engine = Engine::new(world, 0);

    let err = engine.connect(normal, far).unwrap_err();
    assert!(err.to_string().contains("invalid distance"));

    let err = engine.connect(consumer, normal).unwrap_err();
    assert!(err.contains(&EditError::InvalidInput {
        node: consumer,
        node_type: NodeType::Consumer,
    }));

    engine.connect(normal, consumer).unwrap();
    let err = engine.connect(normal, consumer).unwrap_err();
    assert!(err.contains(&EditError::EdgeExists {
        from: normal,
        to: consumer,
    }));
    assert_eq!(engine.world().node(normal).unwrap().outputs.len(), 1);
}

#[test]
fn conveyor_path_carries_items_around_a_corner() {
    let mut world = World::default();
    let source = place(&mut world, 0, 0, NodeType::Normal);
    let sink = place(&mut world, 3, 2, NodeType::Consumer);
    let item = put_item(&mut world, source, ItemColor::Green, 0);
    let mut engine = Engine::new(world, 4);

    let cells = build_path(source.position(), sink.position(), Axis::X).unwrap();
    assert_eq!(cells.len(), 6);
    let outcome = engine.add_path(&cells, false).unwrap();
    assert_eq!(outcome.placed.len(), 4);
    assert_eq!(outcome.linked.len(), 5);

    engine.advance(6);
    assert!(engine.world().item(item).is_none());
    assert_eq!(stats(&engine, sink), vec![("Green-0".to_string(), 1)]);
}

#[test]
fn edit_events_arrive_with_the_next_step() {
    let mut engine = Engine::new(World::default(), 0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    engine.on_passive(
        EventKind::NodeAdded,
        Box::new(move |event| sink.borrow_mut().push(event.clone())),
    );

    engine
        .add_node(NodeRequest::new(Position::new(0, 0), NodeType::Normal))
        .unwrap();
    assert!(seen.borrow().is_empty());

    engine.step();
    assert_eq!(
        seen.borrow().as_slice(),
        &[Event::NodeAdded {
            node: NodeId::new(0, 0),
            node_type: NodeType::Normal,
            tick: 0,
        }]
    );

    engine.step();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(engine.events().buffered_count(EventKind::NodeAdded), 0);
}

#[test]
fn large_factory_runs_consistently() {
    let world = factory_rows(16, 12, 0.3);
    let mut engine = Engine::new(world, 99);
    let mut items = engine.world().item_count() as i64;
    for _ in 0..300 {
        let report = engine.step().report;
        items += report.item_delta();
        assert_eq!(engine.world().item_count() as i64, items);
    }
    assert!(engine.world().consumed_totals().values().sum::<u64>() > 0);
}
