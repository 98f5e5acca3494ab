//! Serde data file structs for starting worlds.
//!
//! These structs define the on-disk format. They are deserialized from RON,
//! JSON, or TOML files and then turned into a world by the loader. Node
//! positions are written as `"x.y"` strings and parsed during the build so
//! errors can name the offending entry.

use gridworks_core::node::NodeType;
use gridworks_core::world::{DEFAULT_MAX_PURITY, DEFAULT_PRODUCER_RATE, DEFAULT_PURIFIER_RATE};
use serde::{Deserialize, Serialize};

// ===========================================================================
// Top level
// ===========================================================================

/// A complete starting world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Seed for the engine's random source.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub rules: RulesData,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub forms: Vec<FormData>,
}

// ===========================================================================
// Rules
// ===========================================================================

/// Tunable constants. Rates are plain decimals here and converted to
/// fixed point when the world is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesData {
    #[serde(default = "default_max_purity")]
    pub max_purity: u32,
    #[serde(default = "default_producer_rate")]
    pub producer_rate: f64,
    #[serde(default = "default_purifier_rate")]
    pub purifier_rate: f64,
}

fn default_max_purity() -> u32 {
    DEFAULT_MAX_PURITY
}

fn default_producer_rate() -> f64 {
    DEFAULT_PRODUCER_RATE
}

fn default_purifier_rate() -> f64 {
    DEFAULT_PURIFIER_RATE
}

impl Default for RulesData {
    fn default() -> Self {
        Self {
            max_purity: default_max_purity(),
            producer_rate: default_producer_rate(),
            purifier_rate: default_purifier_rate(),
        }
    }
}

// ===========================================================================
// Layout
// ===========================================================================

/// One placed node and the neighbours it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Grid cell as `"x.y"`.
    pub position: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: NodeType,
    /// Positions this node outputs to, as `"x.y"`.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Overrides the rules' rate for producers and purifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Place the node under construction, queuing a job for a robot.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub construct: bool,
}

fn default_node_type() -> NodeType {
    NodeType::Normal
}

impl NodeData {
    pub fn new(position: &str, node_type: NodeType) -> Self {
        Self {
            position: position.to_string(),
            node_type,
            outputs: Vec::new(),
            rate: None,
            construct: false,
        }
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A rectangular form rooted at its top-left cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormData {
    pub origin: String,
    pub width: u32,
    pub height: u32,
}

// ===========================================================================
// Tests
// ===========================================================================
