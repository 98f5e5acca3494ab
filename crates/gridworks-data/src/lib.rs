//! Data-driven world setup for Gridworks.
//!
//! A [`GameConfig`] describes a starting world (seed, rules, nodes, forms
//! and conveyor links) in RON, TOML or JSON. The loader detects the format
//! from the file extension, validates every position and rate, and builds
//! the world through the same graph edits the game uses.

pub mod loader;
pub mod schema;

pub use loader::{build_engine, build_world, load_config, starter_config, DataLoadError};
pub use schema::{FormData, GameConfig, NodeData, RulesData};
