//! Simulation events and the bus that records them.
//!
//! The tick pass, the scheduler and the engine's edit methods emit into an
//! [`EventBus`]. Each kind gets a bounded [`EventBuffer`] the first time it
//! fires. The engine delivers buffers to passive listeners at the end of a
//! step and clears them at the start of the next one.
//!
//! A suppressed kind is never buffered.

use crate::fixed::Ticks;
use crate::id::{ItemId, JobId, NodeId, RobotId};
use crate::item::ItemColor;
use crate::job::JobKind;
use crate::node::NodeType;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Items --
    ItemProduced {
        node: NodeId,
        item: ItemId,
        color: ItemColor,
        tick: Ticks,
    },
    ItemPurified {
        node: NodeId,
        item: ItemId,
        purity: u32,
        tick: Ticks,
    },
    ItemMoved {
        from: NodeId,
        to: NodeId,
        item: ItemId,
        tick: Ticks,
    },
    ItemConsumed {
        node: NodeId,
        item: ItemId,
        color: ItemColor,
        purity: u32,
        tick: Ticks,
    },
    ItemEnergized {
        node: NodeId,
        item: ItemId,
        power: u64,
        tick: Ticks,
    },

    // -- Graph --
    NodeAdded {
        node: NodeId,
        node_type: NodeType,
        tick: Ticks,
    },
    NodeRemoved {
        node: NodeId,
        tick: Ticks,
    },
    EdgeAdded {
        from: NodeId,
        to: NodeId,
        tick: Ticks,
    },
    EdgeRemoved {
        from: NodeId,
        to: NodeId,
        tick: Ticks,
    },

    // -- Jobs --
    JobQueued {
        job: JobId,
        kind: JobKind,
        node: NodeId,
        tick: Ticks,
    },
    JobAssigned {
        job: JobId,
        robot: RobotId,
        tick: Ticks,
    },
    JobCompleted {
        job: JobId,
        kind: JobKind,
        node: NodeId,
        tick: Ticks,
    },
    JobCancelled {
        job: JobId,
        node: NodeId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ItemProduced,
    ItemPurified,
    ItemMoved,
    ItemConsumed,
    ItemEnergized,
    NodeAdded,
    NodeRemoved,
    EdgeAdded,
    EdgeRemoved,
    JobQueued,
    JobAssigned,
    JobCompleted,
    JobCancelled,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::ItemProduced,
        EventKind::ItemPurified,
        EventKind::ItemMoved,
        EventKind::ItemConsumed,
        EventKind::ItemEnergized,
        EventKind::NodeAdded,
        EventKind::NodeRemoved,
        EventKind::EdgeAdded,
        EventKind::EdgeRemoved,
        EventKind::JobQueued,
        EventKind::JobAssigned,
        EventKind::JobCompleted,
        EventKind::JobCancelled,
    ];
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ItemProduced { .. } => EventKind::ItemProduced,
            Event::ItemPurified { .. } => EventKind::ItemPurified,
            Event::ItemMoved { .. } => EventKind::ItemMoved,
            Event::ItemConsumed { .. } => EventKind::ItemConsumed,
            Event::ItemEnergized { .. } => EventKind::ItemEnergized,
            Event::NodeAdded { .. } => EventKind::NodeAdded,
            Event::NodeRemoved { .. } => EventKind::NodeRemoved,
            Event::EdgeAdded { .. } => EventKind::EdgeAdded,
            Event::EdgeRemoved { .. } => EventKind::EdgeRemoved,
            Event::JobQueued { .. } => EventKind::JobQueued,
            Event::JobAssigned { .. } => EventKind::JobAssigned,
            Event::JobCompleted { .. } => EventKind::JobCompleted,
            Event::JobCancelled { .. } => EventKind::JobCancelled,
        }
    }

    /// The tick the event happened on.
    pub fn tick(&self) -> Ticks {
        match self {
            Event::ItemProduced { tick, .. }
            | Event::ItemPurified { tick, .. }
            | Event::ItemMoved { tick, .. }
            | Event::ItemConsumed { tick, .. }
            | Event::ItemEnergized { tick, .. }
            | Event::NodeAdded { tick, .. }
            | Event::NodeRemoved { tick, .. }
            | Event::EdgeAdded { tick, .. }
            | Event::EdgeRemoved { tick, .. }
            | Event::JobQueued { tick, .. }
            | Event::JobAssigned { tick, .. }
            | Event::JobCompleted { tick, .. }
            | Event::JobCancelled { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// A bounded queue of events of one kind. When full, pushing drops the
/// oldest event.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    /// Events ever pushed, dropped ones included.
    total_written: u64,
}

impl EventBuffer {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Drop buffered events. `total_written` is kept.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Everything the bus keeps for one event kind.
#[derive(Default)]
struct Channel {
    /// Allocated on the first event of this kind.
    buffer: Option<EventBuffer>,
    suppressed: bool,
    listeners: Vec<PassiveListener>,
}

/// Per-kind event buffers with suppression and passive listeners.
pub struct EventBus {
    channels: BTreeMap<EventKind, Channel>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffered: BTreeMap<EventKind, usize> = self
            .channels
            .iter()
            .map(|(kind, c)| (*kind, c.buffer.as_ref().map_or(0, EventBuffer::len)))
            .collect();
        f.debug_struct("EventBus")
            .field("buffered", &buffered)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// `capacity` bounds each kind's buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: BTreeMap::new(),
            capacity,
        }
    }

    fn channel(&mut self, kind: EventKind) -> &mut Channel {
        self.channels.entry(kind).or_default()
    }

    /// Stop recording a kind and drop anything already buffered for it.
    pub fn suppress(&mut self, kind: EventKind) {
        let channel = self.channel(kind);
        channel.suppressed = true;
        channel.buffer = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.channels.get(&kind).is_some_and(|c| c.suppressed)
    }

    /// Record an event. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let capacity = self.capacity;
        let channel = self.channel(event.kind());
        if channel.suppressed {
            return;
        }
        channel
            .buffer
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Listeners of a kind run in registration order during
    /// [`EventBus::deliver`].
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.channel(kind).listeners.push(listener);
    }

    /// Hand every buffered event to the listeners of its kind, oldest
    /// first. Buffers stay readable until the next [`EventBus::clear_all`].
    pub fn deliver(&mut self) {
        for channel in self.channels.values_mut() {
            let Some(buffer) = &channel.buffer else {
                continue;
            };
            for listener in &mut channel.listeners {
                buffer.iter().for_each(|event| listener(event));
            }
        }
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.channels.get(&kind).and_then(|c| c.buffer.as_ref())
    }

    /// Buffered events of one kind, oldest first.
    pub fn events(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.buffer(kind).into_iter().flat_map(EventBuffer::iter)
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffer(kind).map_or(0, EventBuffer::len)
    }

    /// Empty every buffer. Listeners and suppression stay.
    pub fn clear_all(&mut self) {
        for buffer in self.channels.values_mut().filter_map(|c| c.buffer.as_mut()) {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn hop(tick: Ticks) -> Event {
        Event::ItemMoved {
            from: NodeId::new(0, 0),
            to: NodeId::new(1, 0),
            item: ItemId(0),
            tick,
        }
    }

    #[test]
    fn buffer_keeps_push_order() {
        let mut buffer = EventBuffer::new(8);
        buffer.push(hop(1));
        buffer.push(hop(2));
        let ticks: Vec<Ticks> = buffer.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[test]
    fn full_buffer_evicts_oldest() {
        let mut buffer = EventBuffer::new(2);
        (0..5).for_each(|t| buffer.push(hop(t)));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_written(), 5);
        let ticks: Vec<Ticks> = buffer.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![3, 4]);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let mut buffer = EventBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(hop(1));
        buffer.push(hop(2));
        assert_eq!(buffer.iter().next().map(Event::tick), Some(2));
    }

    #[test]
    fn every_kind_is_listed_once() {
        let mut kinds = EventKind::ALL.to_vec();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), EventKind::ALL.len());
    }

    #[test]
    fn suppression_drops_the_kind() {
        let mut bus = EventBus::default();
        bus.emit(hop(1));
        bus.suppress(EventKind::ItemMoved);
        assert!(bus.is_suppressed(EventKind::ItemMoved));
        bus.emit(hop(2));
        assert!(bus.buffer(EventKind::ItemMoved).is_none());
        assert_eq!(bus.buffered_count(EventKind::ItemMoved), 0);
    }

    #[test]
    fn deliver_runs_listeners_and_keeps_buffers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);

        let mut bus = EventBus::default();
        bus.on_passive(
            EventKind::ItemMoved,
            Box::new(move |e| sink.borrow_mut().push(e.tick())),
        );
        bus.emit(hop(1));
        bus.emit(hop(2));
        bus.deliver();

        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(bus.buffered_count(EventKind::ItemMoved), 2);

        bus.clear_all();
        assert_eq!(bus.buffered_count(EventKind::ItemMoved), 0);
        bus.deliver();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn events_are_split_by_kind() {
        let mut bus = EventBus::new(4);
        bus.emit(hop(1));
        bus.emit(Event::NodeRemoved {
            node: NodeId::new(0, 0),
            tick: 1,
        });
        assert_eq!(bus.events(EventKind::ItemMoved).count(), 1);
        assert_eq!(bus.events(EventKind::NodeRemoved).count(), 1);
        assert_eq!(bus.events(EventKind::JobQueued).count(), 0);
        assert_eq!(bus.buffer(EventKind::ItemMoved).map(EventBuffer::capacity), Some(4));
    }
}
