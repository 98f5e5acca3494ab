//! World consistency checking.
//!
//! [`check_world`] walks the whole aggregate and reports every broken
//! invariant. The engine runs it after each step and treats any violation
//! as fatal; snapshot loading runs it and reports violations as a load
//! error.

use crate::fixed::is_unit_interval;
use crate::geometry::Direction;
use crate::id::{ItemId, JobId, NodeId, RobotId};
use crate::job::JobKind;
use crate::node::{NodeKind, NodeState, NodeType};
use crate::world::World;
use std::collections::{BTreeMap, BTreeSet};

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("node stored under {key} has id {id} at position {position}")]
    NodeIdMismatch {
        key: NodeId,
        id: NodeId,
        position: crate::geometry::Position,
    },
    #[error("node {node} outputs to itself")]
    SelfOutput { node: NodeId },
    #[error("node {node} outputs to missing node {target}")]
    DanglingOutput { node: NodeId, target: NodeId },
    #[error("node {node} outputs to non-adjacent node {target}")]
    NonAdjacentOutput { node: NodeId, target: NodeId },
    #[error("node {node} stores direction {stored:?} toward {target}")]
    DirectionMismatch {
        node: NodeId,
        target: NodeId,
        stored: Direction,
    },
    #[error("{from_type} node {node} cannot output to {to_type} node {target}")]
    IncapableEdge {
        node: NodeId,
        target: NodeId,
        from_type: NodeType,
        to_type: NodeType,
    },
    #[error("duplicate item [id={item}][nodeId={node}]")]
    DuplicateItem { item: ItemId, node: NodeId },
    #[error("missing item [id={item}][nodeId={node}]")]
    MissingItem { item: ItemId, node: NodeId },
    #[error("extra item [id={item}]")]
    ExtraItem { item: ItemId },
    #[error("item {item} claims node {claimed} but rests on {actual}")]
    ItemOwnerMismatch {
        item: ItemId,
        claimed: NodeId,
        actual: NodeId,
    },
    #[error("item stored under {key} has id {id}")]
    ItemIdMismatch { key: ItemId, id: ItemId },
    #[error("item {item} has purity {purity} above the cap {max}")]
    PurityOverflow { item: ItemId, purity: u32, max: u32 },
    #[error("node {node} has rate outside [0, 1]")]
    RateOutOfRange { node: NodeId },
    #[error("terminal {node} and robot {robot} do not reference each other")]
    TerminalRobotMismatch { node: NodeId, robot: RobotId },
    #[error("robot {robot} has no terminal at {home}")]
    RobotHomeMissing { robot: RobotId, home: NodeId },
    #[error("robot {robot} and job {job} do not reference each other")]
    RobotJobMismatch { robot: RobotId, job: JobId },
    #[error("job {job} targets missing node {node}")]
    JobTargetMissing { job: JobId, node: NodeId },
    #[error("{kind:?} job {job} targets node {node} in state {state:?}")]
    JobStateMismatch {
        job: JobId,
        kind: JobKind,
        node: NodeId,
        state: NodeState,
    },
    #[error("node {node} is {state:?} but has {jobs} jobs")]
    PendingNodeJobCount {
        node: NodeId,
        state: NodeState,
        jobs: usize,
    },
    #[error("{space} id {id} is not below the counter {next}")]
    CounterBehind {
        space: &'static str,
        id: u64,
        next: u64,
    },
}

/// Check every invariant of `world`. An empty result means consistent.
pub fn check_world(world: &World) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_nodes(world, &mut violations);
    check_items(world, &mut violations);
    check_robots(world, &mut violations);
    check_jobs(world, &mut violations);
    violations
}

fn check_nodes(world: &World, out: &mut Vec<Violation>) {
    for (&key, node) in &world.nodes {
        if key != node.id || node.id.position() != node.position {
            out.push(Violation::NodeIdMismatch {
                key,
                id: node.id,
                position: node.position,
            });
        }

        for (&target, &stored) in &node.outputs {
            if target == node.id {
                out.push(Violation::SelfOutput { node: node.id });
                continue;
            }
            let Some(target_node) = world.nodes.get(&target) else {
                out.push(Violation::DanglingOutput {
                    node: node.id,
                    target,
                });
                continue;
            };
            let (from_type, to_type) = (node.node_type(), target_node.node_type());
            if !from_type.can_output() || !to_type.can_receive() {
                out.push(Violation::IncapableEdge {
                    node: node.id,
                    target,
                    from_type,
                    to_type,
                });
            }
            match Direction::between(&node.position, &target_node.position) {
                Ok(actual) if actual == stored => {}
                Ok(_) => out.push(Violation::DirectionMismatch {
                    node: node.id,
                    target,
                    stored,
                }),
                Err(_) => out.push(Violation::NonAdjacentOutput {
                    node: node.id,
                    target,
                }),
            }
        }

        if let Some(rate) = node.kind.rate() {
            if !is_unit_interval(rate) {
                out.push(Violation::RateOutOfRange { node: node.id });
            }
        }

        if let NodeKind::RobotTerminal { robot } = node.kind {
            let linked = world.robots.get(&robot).is_some_and(|r| r.home == node.id);
            if !linked {
                out.push(Violation::TerminalRobotMismatch {
                    node: node.id,
                    robot,
                });
            }
        }
    }
}

fn check_items(world: &World, out: &mut Vec<Violation>) {
    let mut seen = BTreeSet::new();
    let mut extra: BTreeSet<ItemId> = world.items.keys().copied().collect();

    for node in world.nodes.values() {
        let Some(item_id) = node.item else {
            continue;
        };
        extra.remove(&item_id);
        if !seen.insert(item_id) {
            out.push(Violation::DuplicateItem {
                item: item_id,
                node: node.id,
            });
        }
        match world.items.get(&item_id) {
            None => out.push(Violation::MissingItem {
                item: item_id,
                node: node.id,
            }),
            Some(item) if item.node != node.id => out.push(Violation::ItemOwnerMismatch {
                item: item_id,
                claimed: item.node,
                actual: node.id,
            }),
            Some(_) => {}
        }
    }

    for item in extra {
        out.push(Violation::ExtraItem { item });
    }

    let max = world.rules.max_purity;
    for (&key, item) in &world.items {
        if key != item.id {
            out.push(Violation::ItemIdMismatch { key, id: item.id });
        }
        if item.purity > max {
            out.push(Violation::PurityOverflow {
                item: item.id,
                purity: item.purity,
                max,
            });
        }
        if item.id.0 >= world.next_item_id {
            out.push(Violation::CounterBehind {
                space: "item",
                id: item.id.0,
                next: world.next_item_id,
            });
        }
    }
}

fn check_robots(world: &World, out: &mut Vec<Violation>) {
    for robot in world.robots.values() {
        let home_ok = world.nodes.get(&robot.home).is_some_and(
            |n| matches!(n.kind, NodeKind::RobotTerminal { robot: r } if r == robot.id),
        );
        if !home_ok {
            out.push(Violation::RobotHomeMissing {
                robot: robot.id,
                home: robot.home,
            });
        }
        if let Some(job_id) = robot.job {
            let linked = world.jobs.get(&job_id).is_some_and(|j| j.robot == Some(robot.id));
            if !linked {
                out.push(Violation::RobotJobMismatch {
                    robot: robot.id,
                    job: job_id,
                });
            }
        }
        if robot.id.0 >= world.next_robot_id {
            out.push(Violation::CounterBehind {
                space: "robot",
                id: robot.id.0,
                next: world.next_robot_id,
            });
        }
    }
}

fn check_jobs(world: &World, out: &mut Vec<Violation>) {
    let mut per_node: BTreeMap<NodeId, usize> = BTreeMap::new();

    for job in world.jobs.values() {
        *per_node.entry(job.node).or_insert(0) += 1;

        match world.nodes.get(&job.node) {
            None => out.push(Violation::JobTargetMissing {
                job: job.id,
                node: job.node,
            }),
            Some(node) => {
                let expected = match job.kind {
                    JobKind::Construct => NodeState::PendingConstruction,
                    JobKind::Destroy => NodeState::PendingDestruction,
                };
                if node.state != expected {
                    out.push(Violation::JobStateMismatch {
                        job: job.id,
                        kind: job.kind,
                        node: node.id,
                        state: node.state,
                    });
                }
            }
        }

        if let Some(robot_id) = job.robot {
            let linked = world.robots.get(&robot_id).is_some_and(|r| r.job == Some(job.id));
            if !linked {
                out.push(Violation::RobotJobMismatch {
                    robot: robot_id,
                    job: job.id,
                });
            }
        }

        if job.id.0 >= world.next_job_id {
            out.push(Violation::CounterBehind {
                space: "job",
                id: job.id.0,
                next: world.next_job_id,
            });
        }
    }

    for node in world.nodes.values() {
        if node.state == NodeState::Active {
            continue;
        }
        let jobs = per_node.get(&node.id).copied().unwrap_or(0);
        if jobs != 1 {
            out.push(Violation::PendingNodeJobCount {
                node: node.id,
                state: node.state,
                jobs,
            });
        }
    }
}
