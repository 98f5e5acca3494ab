//! Construction and destruction jobs, and the robots that carry them out.
//!
//! A job starts unassigned, picks up the first idle robot, and is then
//! worked one grid cell per tick until the robot stands on the target.
//! On the tick after arrival the job completes: a construction activates
//! its node, a destruction deletes it. Robots without a job return to
//! their terminal.

use crate::event::{Event, EventBus};
use crate::graph;
use crate::id::{JobId, RobotId};
use crate::job::{Job, JobKind};
use crate::node::NodeState;
use crate::sim::TickReport;
use crate::world::World;
use tracing::debug;

/// Advance every job by one tick, in job id order.
pub fn tick_jobs(world: &mut World, events: &mut EventBus, report: &mut TickReport) {
    let ids: Vec<JobId> = world.jobs.keys().copied().collect();
    for id in ids {
        // An earlier completion in this pass may have removed the job.
        let Some(job) = world.jobs.get(&id).cloned() else {
            continue;
        };
        match job.robot {
            Some(robot) => work(world, &job, robot, events, report),
            None => assign(world, &job, events, report),
        }
    }
}

/// Move idle robots back to their terminals.
pub fn tick_robots(world: &mut World) {
    let World { nodes, robots, .. } = world;
    for robot in robots.values_mut().filter(|r| r.is_idle()) {
        let home = match nodes.get(&robot.home) {
            Some(node) => node.position,
            None => panic!("robot {} has no terminal at {}", robot.id, robot.home),
        };
        if robot.position == home {
            robot.display_delta = None;
        } else {
            robot.display_delta = Some(home.delta_from(&robot.position));
            robot.position = home;
        }
    }
}

fn assign(world: &mut World, job: &Job, events: &mut EventBus, report: &mut TickReport) {
    let Some(robot) = world.robots.values_mut().find(|r| r.is_idle()) else {
        return;
    };
    robot.job = Some(job.id);
    let robot_id = robot.id;
    if let Some(entry) = world.jobs.get_mut(&job.id) {
        entry.robot = Some(robot_id);
    }

    report.jobs_assigned += 1;
    events.emit(Event::JobAssigned {
        job: job.id,
        robot: robot_id,
        tick: world.tick,
    });
    debug!(job = %job.id, robot = %robot_id, node = %job.node, "job assigned");
}

fn work(
    world: &mut World,
    job: &Job,
    robot_id: RobotId,
    events: &mut EventBus,
    report: &mut TickReport,
) {
    let target = world.expect_node(job.node).position;
    let Some(robot) = world.robots.get_mut(&robot_id) else {
        panic!("job {} assigned to missing robot {robot_id}", job.id);
    };
    assert_eq!(robot.job, Some(job.id), "robot {robot_id} does not hold job {}", job.id);

    if robot.position != target {
        let next = robot.position.step_toward(&target);
        robot.display_delta = Some(next.delta_from(&robot.position));
        robot.position = next;
        return;
    }

    robot.display_delta = None;
    robot.job = None;
    let tick = world.tick;

    match job.kind {
        JobKind::Construct => {
            let node = world.expect_node_mut(job.node);
            assert_eq!(
                node.state,
                NodeState::PendingConstruction,
                "construct job {} targets node {} in the wrong state",
                job.id,
                job.node
            );
            node.state = NodeState::Active;
            world.jobs.remove(&job.id);
        }
        JobKind::Destroy => {
            assert_eq!(
                world.expect_node(job.node).state,
                NodeState::PendingDestruction,
                "destroy job {} targets node {} in the wrong state",
                job.id,
                job.node
            );
            // Deleting the node also drops this job.
            let removed = match graph::delete_node(world, job.node) {
                Ok(removed) => removed,
                Err(failure) => {
                    panic!("destroy job {} could not delete {}: {failure}", job.id, job.node)
                }
            };
            for &from in &removed.severed {
                events.emit(Event::EdgeRemoved {
                    from,
                    to: job.node,
                    tick,
                });
            }
            events.emit(Event::NodeRemoved {
                node: job.node,
                tick,
            });
        }
    }

    report.jobs_completed += 1;
    events.emit(Event::JobCompleted {
        job: job.id,
        kind: job.kind,
        node: job.node,
        tick,
    });
    debug!(job = %job.id, kind = ?job.kind, node = %job.node, "job completed");
}
