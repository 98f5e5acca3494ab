//! The per-tick item pass.
//!
//! Every node is visited exactly once per tick in a depth-first walk. A
//! node first applies its own behavior (spawn, purify, consume, absorb),
//! then visits its downstream neighbours before trying to hand its item to
//! each of them. Visiting downstream first means a chain of full conveyors
//! advances as a unit: the node at the end empties before the one behind
//! it tries to move.
//!
//! Conveyor loops are detected as back edges onto the current DFS path.
//! The node that closes the loop lifts its item into a pending record, the
//! walk unwinds to the loop's entry node (each node moving its item one
//! hop on the way), and the entry node receives the pending item last.
//! At most one loop can be open at a time: once one is open, every frame
//! stops iterating its outputs until the entry node closes it.

use crate::event::{Event, EventBus};
use crate::id::{ItemId, NodeId};
use crate::item::{stat_key, Item, ItemColor};
use crate::node::{NodeKind, NodeType};
use crate::rng::RandomSource;
use crate::sim::TickReport;
use crate::world::World;
use std::collections::BTreeSet;
use tracing::trace;

/// Run the item pass for the world's current tick.
///
/// The caller advances `world.tick` first; this pass only moves items.
/// Panics if the graph is corrupt (an output edge to a missing or
/// non-adjacent node, or a walk that fails to close its loop).
pub fn tick_nodes<R: RandomSource>(
    world: &mut World,
    rng: &mut R,
    events: &mut EventBus,
    report: &mut TickReport,
) {
    let mut roots: Vec<NodeId> = world.nodes.keys().copied().collect();
    rng.shuffle(&mut roots);

    let mut pass = NodePass {
        world,
        rng,
        events,
        report,
        seen: BTreeSet::new(),
        path: Vec::new(),
        on_path: BTreeSet::new(),
        spawned: BTreeSet::new(),
        open_loop: None,
    };

    for root in roots {
        if pass.seen.contains(&root) {
            continue;
        }
        pass.visit(root);
        assert!(pass.path.is_empty(), "DFS path not empty after visiting {root}");
        assert!(
            pass.open_loop.is_none(),
            "loop left open after visiting {root}"
        );
    }
}

/// An item lifted off the node that closed a loop, waiting for the loop's
/// entry node.
#[derive(Debug)]
struct PendingLoop {
    /// The node the back edge points at.
    entry: NodeId,
    /// The node whose output closed the loop.
    from: NodeId,
    /// `None` when the closing node keeps its item this tick.
    item: Option<ItemId>,
}

struct NodePass<'a, R> {
    world: &'a mut World,
    rng: &'a mut R,
    events: &'a mut EventBus,
    report: &'a mut TickReport,
    seen: BTreeSet<NodeId>,
    /// Current DFS path, in visit order.
    path: Vec<NodeId>,
    on_path: BTreeSet<NodeId>,
    /// Items created this tick; they stay put until the next tick.
    spawned: BTreeSet<ItemId>,
    open_loop: Option<PendingLoop>,
}

impl<R: RandomSource> NodePass<'_, R> {
    fn visit(&mut self, id: NodeId) {
        assert!(self.seen.insert(id), "node {id} visited twice in one tick");

        let mut item = self.world.expect_node(id).item;
        if let Some(item_id) = item {
            let resident = self.world.expect_item_mut(item_id);
            resident.tick += 1;
            resident.display_delta = None;
        }

        let (node_type, rate) = {
            let node = self.world.expect_node(id);
            (node.node_type(), node.kind.rate())
        };

        match node_type {
            NodeType::Consumer => {
                if let Some(item_id) = item {
                    if self.world.expect_item(item_id).tick > 0 {
                        self.consume(id, item_id);
                    }
                }
                // Consumers never output.
                return;
            }
            NodeType::Producer => {
                if item.is_none() && self.rng.chance(rate.unwrap_or_default()) {
                    item = Some(self.spawn(id));
                }
            }
            NodeType::Purifier => {
                if let Some(item_id) = item {
                    if self.rng.chance(rate.unwrap_or_default()) {
                        self.purify(id, item_id);
                    }
                }
            }
            NodeType::Energizer => {
                if let Some(item_id) = item {
                    let resident = self.world.expect_item(item_id);
                    if resident.tick > 0 && resident.color == ItemColor::Green && resident.purity > 0 {
                        self.absorb(id, item_id);
                        item = None;
                    }
                }
            }
            NodeType::Normal | NodeType::FormRoot | NodeType::FormLeaf | NodeType::RobotTerminal => {}
        }

        assert!(self.on_path.insert(id), "node {id} re-entered while on the DFS path");
        self.path.push(id);

        let mut outputs = self.live_outputs(id);
        self.rng.shuffle(&mut outputs);

        for output in outputs {
            if self.on_path.contains(&output) {
                self.begin_loop(id, output, item);
                if self.world.expect_node(id).item.is_none() {
                    item = None;
                }
                break;
            }

            if !self.seen.contains(&output) {
                self.visit(output);
            }

            if let Some(item_id) = item {
                if self.world.expect_node(output).item.is_none() && self.releasable(id, item_id) {
                    self.transfer(id, output, item_id);
                    item = None;
                }
            }

            if self.open_loop.is_some() {
                break;
            }
        }

        if self.open_loop.as_ref().is_some_and(|l| l.entry == id) {
            if let Some(pending) = self.open_loop.take() {
                self.close_loop(pending);
            }
        }

        self.on_path.remove(&id);
        self.path.pop();
    }

    /// Output targets that can take part this tick, in stored order.
    /// Targets under construction are skipped.
    fn live_outputs(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.world.expect_node(id);
        node.outputs
            .keys()
            .copied()
            .filter(|&target| {
                let target_node = self.world.expect_node(target);
                assert!(
                    node.position.is_adjacent(&target_node.position),
                    "node {id} outputs to non-adjacent node {target}"
                );
                !target_node.is_pending_construction()
            })
            .collect()
    }

    /// Whether the node may hand `item_id` on right now, ignoring the
    /// target's occupancy.
    fn releasable(&self, node: NodeId, item_id: ItemId) -> bool {
        if self.spawned.contains(&item_id) {
            return false;
        }
        let item = self.world.expect_item(item_id);
        self.world
            .expect_node(node)
            .may_release(item, self.world.rules.max_purity)
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// Record a back edge from `from` onto `entry`.
    ///
    /// The closing node's item is lifted only when it may move and the
    /// shift along the path is certain to leave `entry` empty. Otherwise
    /// it stays where it is and the loop still unwinds without it.
    fn begin_loop(&mut self, from: NodeId, entry: NodeId, item: Option<ItemId>) {
        assert!(
            self.open_loop.is_none(),
            "second loop opened at {from} -> {entry} while one is pending"
        );

        let lifted = item.filter(|&item_id| {
            self.releasable(from, item_id) && self.entry_will_vacate(entry)
        });
        if let Some(item_id) = lifted {
            self.world.expect_node_mut(from).item = None;
            trace!(node = %from, %entry, item = %item_id, "loop item lifted");
        }

        self.open_loop = Some(PendingLoop {
            entry,
            from,
            item: lifted,
        });
    }

    /// Walk the path from the closing node back to `entry`. Each node
    /// moves its item one hop forward during the unwind, so a node ends up
    /// empty if it was empty already, or if it can release and the node
    /// ahead of it ends up empty.
    fn entry_will_vacate(&self, entry: NodeId) -> bool {
        let Some(start) = self.path.iter().position(|&n| n == entry) else {
            return false;
        };
        // The last path entry is the closing node itself, which is being
        // emptied by the lift under consideration.
        let upstream = &self.path[start..self.path.len() - 1];
        upstream.iter().rev().fold(true, |ahead_vacant, &node| {
            match self.world.expect_node(node).item {
                None => true,
                Some(item_id) => ahead_vacant && self.releasable(node, item_id),
            }
        })
    }

    fn close_loop(&mut self, pending: PendingLoop) {
        let Some(item_id) = pending.item else {
            return;
        };
        let entry = self.world.expect_node(pending.entry);
        assert!(
            entry.item.is_none(),
            "loop entry {} still occupied when its pending item arrives",
            pending.entry
        );
        self.place(pending.from, pending.entry, item_id);
        trace!(entry = %pending.entry, item = %item_id, "loop closed");
    }

    // -----------------------------------------------------------------------
    // Item mutations
    // -----------------------------------------------------------------------

    fn spawn(&mut self, node: NodeId) -> ItemId {
        let id = self.world.allocate_item_id();
        let color = ItemColor::sample(&mut *self.rng);
        self.world.items.insert(
            id,
            Item {
                id,
                node,
                tick: 1,
                color,
                purity: 0,
                display_delta: None,
            },
        );
        self.world.expect_node_mut(node).item = Some(id);
        self.spawned.insert(id);

        self.report.spawned += 1;
        self.events.emit(Event::ItemProduced {
            node,
            item: id,
            color,
            tick: self.world.tick,
        });
        trace!(%node, item = %id, %color, "item produced");
        id
    }

    fn purify(&mut self, node: NodeId, item_id: ItemId) {
        let max = self.world.rules.max_purity;
        let item = self.world.expect_item_mut(item_id);
        if item.purity >= max {
            return;
        }
        item.purity += 1;
        let purity = item.purity;

        self.report.purified += 1;
        self.events.emit(Event::ItemPurified {
            node,
            item: item_id,
            purity,
            tick: self.world.tick,
        });
        trace!(%node, item = %item_id, purity, "item purified");
    }

    fn consume(&mut self, node: NodeId, item_id: ItemId) {
        let item = self.take_item(node, item_id);
        if let NodeKind::Consumer { stats } = &mut self.world.expect_node_mut(node).kind {
            *stats.entry(stat_key(item.color, item.purity)).or_insert(0) += 1;
        }

        self.report.consumed += 1;
        self.events.emit(Event::ItemConsumed {
            node,
            item: item_id,
            color: item.color,
            purity: item.purity,
            tick: self.world.tick,
        });
        trace!(%node, item = %item_id, "item consumed");
    }

    fn absorb(&mut self, node: NodeId, item_id: ItemId) {
        let item = self.take_item(node, item_id);
        let power = u64::from(item.purity);
        if let NodeKind::Energizer { power: total } = &mut self.world.expect_node_mut(node).kind {
            *total += power;
        }

        self.report.energized += 1;
        self.events.emit(Event::ItemEnergized {
            node,
            item: item_id,
            power,
            tick: self.world.tick,
        });
        trace!(%node, item = %item_id, power, "item energized");
    }

    fn take_item(&mut self, node: NodeId, item_id: ItemId) -> Item {
        self.world.expect_node_mut(node).item = None;
        match self.world.items.remove(&item_id) {
            Some(item) => item,
            None => panic!("item {item_id} on node {node} missing from world"),
        }
    }

    fn transfer(&mut self, from: NodeId, to: NodeId, item_id: ItemId) {
        self.world.expect_node_mut(from).item = None;
        self.place(from, to, item_id);
    }

    /// Put an item that has already left `from` onto `to`.
    fn place(&mut self, from: NodeId, to: NodeId, item_id: ItemId) {
        let delta = to.position().delta_from(&from.position());
        self.world.expect_node_mut(to).item = Some(item_id);
        let item = self.world.expect_item_mut(item_id);
        item.node = to;
        item.tick = 0;
        item.display_delta = Some(delta);

        self.report.moved += 1;
        self.events.emit(Event::ItemMoved {
            from,
            to,
            item: item_id,
            tick: self.world.tick,
        });
        trace!(%from, %to, item = %item_id, "item moved");
    }
}
