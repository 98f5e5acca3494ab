use crate::geometry::Delta;
use crate::id::{ItemId, NodeId};
use crate::rng::RandomSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item color. A closed set: unknown colors fail to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemColor {
    Green,
    Blue,
    Red,
}

impl ItemColor {
    pub const ALL: [ItemColor; 3] = [ItemColor::Green, ItemColor::Blue, ItemColor::Red];

    /// Uniformly pick a color.
    pub fn sample<R: RandomSource>(rng: &mut R) -> ItemColor {
        Self::ALL[rng.below(Self::ALL.len())]
    }
}

impl fmt::Display for ItemColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemColor::Green => "Green",
            ItemColor::Blue => "Blue",
            ItemColor::Red => "Red",
        };
        f.write_str(name)
    }
}

/// A unit of payload sitting on exactly one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// The node whose `item` slot holds this item.
    pub node: NodeId,
    /// Ticks since the item arrived on its current node.
    pub tick: u64,
    pub color: ItemColor,
    pub purity: u32,
    /// Offset of the last hop, for animation. Cleared when the owning node
    /// is next visited.
    #[serde(default)]
    pub display_delta: Option<Delta>,
}

impl Item {
    /// Key under which a consumer records this item: `"{color}-{purity}"`.
    pub fn stat_key(&self) -> String {
        stat_key(self.color, self.purity)
    }
}

pub fn stat_key(color: ItemColor, purity: u32) -> String {
    format!("{color}-{purity}")
}
