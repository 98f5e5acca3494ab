//! Robots and the construction/destruction jobs they carry out.

use crate::geometry::{Delta, Position};
use crate::id::{JobId, NodeId, RobotId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Bring a `PendingConstruction` node to `Active`.
    Construct,
    /// Remove a `PendingDestruction` node.
    Destroy,
}

/// A pending structural change awaiting a robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Target node.
    pub node: NodeId,
    /// Robot en route, if one has been assigned.
    pub robot: Option<RobotId>,
}

impl Job {
    pub fn is_assigned(&self) -> bool {
        self.robot.is_some()
    }
}

/// A mobile agent that fulfils jobs. Lives at its terminal when idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    pub id: RobotId,
    /// The terminal the robot returns to when idle.
    pub home: NodeId,
    pub position: Position,
    /// Offset of the last move, for interpolation only.
    #[serde(default)]
    pub display_delta: Option<Delta>,
    pub job: Option<JobId>,
}

impl Robot {
    pub fn is_idle(&self) -> bool {
        self.job.is_none()
    }
}
