//! Gridworks Core -- the simulation core of a grid factory game.
//!
//! A world is a grid of typed nodes joined by directional conveyor edges.
//! Items are produced, purified, carried and consumed one hop per tick;
//! robots build and remove nodes by walking to them.
//!
//! # Step Pipeline
//!
//! Each call to [`engine::Engine::step`] (or the free function [`engine::tick`])
//! advances the world by one tick:
//!
//! 1. **Pre-tick** -- Apply queued edit commands.
//! 2. **Items** -- One depth-first pass over the graph moves, spawns,
//!    purifies and consumes items, resolving conveyor loops.
//! 3. **Jobs** -- Idle robots take pending jobs; assigned robots step
//!    toward their target and complete the job on arrival.
//! 4. **Bookkeeping** -- Check every world invariant, deliver events,
//!    update the state hash.
//!
//! # Editing
//!
//! Edits go through [`graph`] (or the matching [`engine::Engine`]
//! methods). They validate fully before mutating and report every problem
//! found:
//!
//! ```rust
//! use gridworks_core::geometry::Position;
//! use gridworks_core::graph::{self, NodeRequest};
//! use gridworks_core::id::NodeId;
//! use gridworks_core::node::NodeType;
//! use gridworks_core::world::World;
//!
//! let mut world = World::default();
//! graph::add_node(&mut world, NodeRequest::new(Position::new(0, 0), NodeType::Normal)).unwrap();
//! graph::add_node(&mut world, NodeRequest::new(Position::new(2, 0), NodeType::Normal)).unwrap();
//! let err = graph::connect(&mut world, NodeId::new(0, 0), NodeId::new(2, 0)).unwrap_err();
//! assert!(err.to_string().contains("distance"));
//! ```
//!
//! # Key Types
//!
//! - [`world::World`] -- Nodes, items, robots and jobs with id counters.
//! - [`node::Node`] / [`node::NodeKind`] -- Grid cells and their behavior.
//! - [`engine::Engine`] -- Owns a world, its random source and event bus.
//! - [`rng::RandomSource`] -- Injected randomness; [`rng::SimRng`] is the
//!   default generator.
//! - [`validation::check_world`] -- Every world invariant as a list of
//!   [`validation::Violation`]s.
//! - [`serialize`] -- Versioned snapshots via bitcode, JSON behind `json`.

pub mod command_queue;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod geometry;
pub mod graph;
pub mod id;
pub mod item;
pub mod job;
pub mod node;
pub mod rng;
pub mod scheduler;
pub mod serialize;
pub mod sim;
pub mod tick;
pub mod validation;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::tick;
