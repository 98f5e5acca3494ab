//! Grid nodes: the common record plus a per-variant payload.

use crate::fixed::Fixed64;
use crate::geometry::{Direction, Position};
use crate::id::{ItemId, NodeId, RobotId};
use crate::item::Item;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a node with respect to robot jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Placed, waiting for a robot to build it. Never receives items.
    PendingConstruction,
    Active,
    /// Marked for removal; still simulated until a robot arrives.
    PendingDestruction,
}

/// Variant-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Normal,
    Consumer {
        /// Finalized items, keyed by `"{color}-{purity}"`.
        stats: BTreeMap<String, u64>,
    },
    Producer {
        rate: Fixed64,
        power: u64,
    },
    Purifier {
        rate: Fixed64,
    },
    Energizer {
        power: u64,
    },
    FormRoot {
        target: Option<NodeId>,
    },
    FormLeaf,
    RobotTerminal {
        robot: RobotId,
    },
}

/// Discriminant tag for [`NodeKind`], used in requests and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Normal,
    Consumer,
    Producer,
    Purifier,
    Energizer,
    FormRoot,
    FormLeaf,
    RobotTerminal,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::Normal,
        NodeType::Consumer,
        NodeType::Producer,
        NodeType::Purifier,
        NodeType::Energizer,
        NodeType::FormRoot,
        NodeType::FormLeaf,
        NodeType::RobotTerminal,
    ];

    /// Types that may hand items to a downstream node.
    pub fn can_output(self) -> bool {
        matches!(
            self,
            NodeType::Normal | NodeType::Producer | NodeType::Purifier | NodeType::Energizer
        )
    }

    /// Types that may receive items from an upstream node.
    pub fn can_receive(self) -> bool {
        matches!(
            self,
            NodeType::Normal | NodeType::Consumer | NodeType::Purifier | NodeType::Energizer
        )
    }

    /// Types the graph editor may queue for destruction.
    pub fn is_destroyable(self) -> bool {
        !matches!(
            self,
            NodeType::FormRoot | NodeType::FormLeaf | NodeType::RobotTerminal
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Normal => NodeType::Normal,
            NodeKind::Consumer { .. } => NodeType::Consumer,
            NodeKind::Producer { .. } => NodeType::Producer,
            NodeKind::Purifier { .. } => NodeType::Purifier,
            NodeKind::Energizer { .. } => NodeType::Energizer,
            NodeKind::FormRoot { .. } => NodeType::FormRoot,
            NodeKind::FormLeaf => NodeType::FormLeaf,
            NodeKind::RobotTerminal { .. } => NodeType::RobotTerminal,
        }
    }

    /// Production or purification rate, for the variants that have one.
    pub fn rate(&self) -> Option<Fixed64> {
        match self {
            NodeKind::Producer { rate, .. } | NodeKind::Purifier { rate } => Some(*rate),
            _ => None,
        }
    }

    /// Accumulated power, for the variants that have one.
    pub fn power(&self) -> Option<u64> {
        match self {
            NodeKind::Producer { power, .. } | NodeKind::Energizer { power } => Some(*power),
            _ => None,
        }
    }
}

/// A grid cell with a behavior variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub state: NodeState,
    pub item: Option<ItemId>,
    /// Downstream neighbours and the direction each one lies in.
    pub outputs: BTreeMap<NodeId, Direction>,
    pub kind: NodeKind,
}

impl Node {
    /// A node with no item and no outputs.
    pub fn new(position: Position, state: NodeState, kind: NodeKind) -> Self {
        Self {
            id: NodeId(position),
            position,
            state,
            item: None,
            outputs: BTreeMap::new(),
            kind,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn is_pending_construction(&self) -> bool {
        self.state == NodeState::PendingConstruction
    }

    /// Whether this node may hand `item` downstream this tick. The target's
    /// occupancy is checked separately.
    pub fn may_release(&self, item: &Item, max_purity: u32) -> bool {
        match self.kind {
            NodeKind::Purifier { .. } => item.purity >= max_purity,
            NodeKind::Normal | NodeKind::Producer { .. } | NodeKind::Energizer { .. } => {
                item.tick >= 1
            }
            NodeKind::Consumer { .. }
            | NodeKind::FormRoot { .. }
            | NodeKind::FormLeaf
            | NodeKind::RobotTerminal { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemColor;

    fn item(tick: u64, purity: u32) -> Item {
        Item {
            id: ItemId(0),
            node: NodeId::new(0, 0),
            tick,
            color: ItemColor::Blue,
            purity,
            display_delta: None,
        }
    }

    #[test]
    fn capability_sets() {
        let outputs: Vec<_> = NodeType::ALL.into_iter().filter(|t| t.can_output()).collect();
        assert_eq!(
            outputs,
            vec![NodeType::Normal, NodeType::Producer, NodeType::Purifier, NodeType::Energizer]
        );
        let receivers: Vec<_> = NodeType::ALL.into_iter().filter(|t| t.can_receive()).collect();
        assert_eq!(
            receivers,
            vec![NodeType::Normal, NodeType::Consumer, NodeType::Purifier, NodeType::Energizer]
        );
    }

    #[test]
    fn protected_types_are_not_destroyable() {
        assert!(!NodeType::FormRoot.is_destroyable());
        assert!(!NodeType::FormLeaf.is_destroyable());
        assert!(!NodeType::RobotTerminal.is_destroyable());
        assert!(NodeType::Normal.is_destroyable());
    }

    #[test]
    fn purifier_releases_only_at_max_purity() {
        let node = Node::new(
            Position::ORIGIN,
            NodeState::Active,
            NodeKind::Purifier { rate: Fixed64::ONE },
        );
        assert!(!node.may_release(&item(5, 9), 10));
        assert!(node.may_release(&item(0, 10), 10));
    }

    #[test]
    fn normal_releases_after_one_tick() {
        let node = Node::new(Position::ORIGIN, NodeState::Active, NodeKind::Normal);
        assert!(!node.may_release(&item(0, 0), 10));
        assert!(node.may_release(&item(1, 0), 10));
    }

    #[test]
    fn unknown_node_kind_is_rejected() {
        let json = r#"{"id":"0.0","position":{"x":0,"y":0},"state":"Active","item":null,"outputs":{},"kind":"Teleporter"}"#;
        assert!(serde_json::from_str::<Node>(json).is_err());
    }
}
