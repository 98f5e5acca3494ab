use crate::geometry::{GeometryError, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a node. A node's id is its grid cell, encoded as `"x.y"`
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(pub Position);

impl NodeId {
    pub const fn new(x: i32, y: i32) -> Self {
        Self(Position::new(x, y))
    }

    pub fn position(&self) -> Position {
        self.0
    }
}

impl From<Position> for NodeId {
    fn from(p: Position) -> Self {
        Self(p)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(NodeId)
    }
}

impl TryFrom<String> for NodeId {
    type Error = GeometryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

counter_id! {
    /// Identifies an item. Allocated from the world's item counter.
    ItemId
}

counter_id! {
    /// Identifies a robot. Allocated from the world's robot counter.
    RobotId
}

counter_id! {
    /// Identifies a construction or destruction job.
    JobId
}
