//! Structured change events and the synchronous dispatch bus.
//!
//! Every externally visible mutation constructs an immutable [`ChangeEvent`]
//! carrying entity/key identifiers and previous/current values, and publishes
//! it before the mutating call returns. Delivery is in-line and ordered by
//! `(priority, insertion order)`; there is no queued dispatch and no
//! reordering. Subscribers may attach an [`EventFilter`] predicate so the bus
//! can route without re-inspecting every subscriber's interests per event;
//! the domain managers expose pre-built narrow filters (by resource, by
//! subject, by resource and subject, all).

use crate::id::*;
use crate::materials::BatchLocation;
use crate::time::Time;
use crate::value::PropertyValue;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A state-change notification. All events carry the simulation time at
/// which the mutation occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    // -- Population --
    PersonAdded {
        person: PersonId,
        time: Time,
    },
    PersonRemoved {
        person: PersonId,
        time: Time,
    },
    PersonPropertyDefined {
        property: PersonPropertyId,
        time: Time,
    },
    PersonPropertyChanged {
        person: PersonId,
        property: PersonPropertyId,
        previous: PropertyValue,
        current: PropertyValue,
        time: Time,
    },

    // -- Global attributes --
    AttributeDefined {
        attribute: AttributeId,
        time: Time,
    },
    AttributeChanged {
        attribute: AttributeId,
        previous: PropertyValue,
        current: PropertyValue,
        time: Time,
    },

    // -- Resources --
    RegionAdded {
        region: RegionId,
        time: Time,
    },
    ResourceDefined {
        resource: ResourceId,
        time: Time,
    },
    ResourceChanged {
        subject: SubjectId,
        resource: ResourceId,
        previous: u64,
        current: u64,
        time: Time,
    },

    // -- Materials --
    ProducerAdded {
        producer: MaterialsProducerId,
        time: Time,
    },
    BatchCreated {
        batch: BatchId,
        producer: MaterialsProducerId,
        time: Time,
    },
    BatchRemoved {
        batch: BatchId,
        time: Time,
    },
    BatchPropertyDefined {
        property: BatchPropertyId,
        time: Time,
    },
    BatchPropertyChanged {
        batch: BatchId,
        property: BatchPropertyId,
        previous: PropertyValue,
        current: PropertyValue,
        time: Time,
    },
    BatchMoved {
        batch: BatchId,
        previous: BatchLocation,
        current: BatchLocation,
        time: Time,
    },
    StageCreated {
        stage: StageId,
        producer: MaterialsProducerId,
        time: Time,
    },
    StageRemoved {
        stage: StageId,
        time: Time,
    },
    StageOfferChanged {
        stage: StageId,
        previous: bool,
        current: bool,
        time: Time,
    },
    StageTransferred {
        stage: StageId,
        previous: MaterialsProducerId,
        current: MaterialsProducerId,
        time: Time,
    },
}

/// Discriminant tag for event types, used for subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PersonAdded,
    PersonRemoved,
    PersonPropertyDefined,
    PersonPropertyChanged,
    AttributeDefined,
    AttributeChanged,
    RegionAdded,
    ResourceDefined,
    ResourceChanged,
    ProducerAdded,
    BatchCreated,
    BatchRemoved,
    BatchPropertyDefined,
    BatchPropertyChanged,
    BatchMoved,
    StageCreated,
    StageRemoved,
    StageOfferChanged,
    StageTransferred,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 19;

impl ChangeEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::PersonAdded { .. } => EventKind::PersonAdded,
            ChangeEvent::PersonRemoved { .. } => EventKind::PersonRemoved,
            ChangeEvent::PersonPropertyDefined { .. } => EventKind::PersonPropertyDefined,
            ChangeEvent::PersonPropertyChanged { .. } => EventKind::PersonPropertyChanged,
            ChangeEvent::AttributeDefined { .. } => EventKind::AttributeDefined,
            ChangeEvent::AttributeChanged { .. } => EventKind::AttributeChanged,
            ChangeEvent::RegionAdded { .. } => EventKind::RegionAdded,
            ChangeEvent::ResourceDefined { .. } => EventKind::ResourceDefined,
            ChangeEvent::ResourceChanged { .. } => EventKind::ResourceChanged,
            ChangeEvent::ProducerAdded { .. } => EventKind::ProducerAdded,
            ChangeEvent::BatchCreated { .. } => EventKind::BatchCreated,
            ChangeEvent::BatchRemoved { .. } => EventKind::BatchRemoved,
            ChangeEvent::BatchPropertyDefined { .. } => EventKind::BatchPropertyDefined,
            ChangeEvent::BatchPropertyChanged { .. } => EventKind::BatchPropertyChanged,
            ChangeEvent::BatchMoved { .. } => EventKind::BatchMoved,
            ChangeEvent::StageCreated { .. } => EventKind::StageCreated,
            ChangeEvent::StageRemoved { .. } => EventKind::StageRemoved,
            ChangeEvent::StageOfferChanged { .. } => EventKind::StageOfferChanged,
            ChangeEvent::StageTransferred { .. } => EventKind::StageTransferred,
        }
    }
}

impl EventKind {
    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A subscriber callback. Receives events read-only.
pub type Listener = Box<dyn FnMut(&ChangeEvent)>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&ChangeEvent) -> bool>;

/// Priority level for subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

/// Wraps a listener with priority, optional filter, and insertion order.
struct SubscriberEntry {
    listener: Listener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("priority", &self.priority)
            .field(
                "filter",
                &if self.filter.is_some() { "Some(<fn>)" } else { "None" },
            )
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The central event bus. Delivery is synchronous: `publish` runs every
/// matching subscriber before returning to the mutating caller.
pub struct EventBus {
    /// Subscribers indexed by event kind.
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    /// Total events published per kind.
    published: [u64; EVENT_KIND_COUNT],
    /// Monotonically increasing counter for stable sort ordering.
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("published", &self.published)
            .field("next_insertion_order", &self.next_insertion_order)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: std::array::from_fn(|_| Vec::new()),
            published: [0; EVENT_KIND_COUNT],
            next_insertion_order: 0,
        }
    }

    /// Register a listener for an event kind with Normal priority and no
    /// filter.
    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) {
        self.subscribe_filtered(kind, SubscriberPriority::Normal, None, listener);
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.subscribers[kind.index()].push(SubscriberEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
    }

    /// Deliver an event to every matching subscriber, in
    /// `(priority, insertion order)`. Returns after the last subscriber.
    pub fn publish(&mut self, event: &ChangeEvent) {
        let idx = event.kind().index();
        self.published[idx] += 1;

        self.subscribers[idx].sort_by_key(|entry| (entry.priority, entry.insertion_order));
        for entry in &mut self.subscribers[idx] {
            if let Some(ref filter) = entry.filter
                && !filter(event)
            {
                continue;
            }
            (entry.listener)(event);
        }
    }

    /// Total events published for a kind.
    pub fn published_count(&self, kind: EventKind) -> u64 {
        self.published[kind.index()]
    }

    /// Number of subscribers registered for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers[kind.index()].len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
