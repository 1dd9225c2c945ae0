use crate::chain::Chain;
use crate::segment::SegmentId;
use glam::Vec3;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Contact notification as the solver reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawContact {
    pub relative_velocity: Vec3,
    pub contact_points: Vec<Vec3>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// Magnitude of the relative approach velocity, never negative.
    pub impact_force: f32,
    pub contact_point: Vec3,
    pub source_segment: SegmentId,
    pub at_ms: u64,
}

/// Reduces raw contacts on one segment into [`CollisionEvent`]s.
#[derive(Debug, Clone, Copy)]
pub struct CollisionReducer {
    segment: SegmentId,
}

impl CollisionReducer {
    pub fn new(segment: SegmentId) -> Self {
        Self { segment }
    }

    pub fn reduce(&self, contact: &RawContact, self_position: Vec3, at_ms: u64) -> CollisionEvent {
        let force = contact.relative_velocity.length();
        let impact_force = if force.is_finite() { force } else { 0.0 };
        let contact_point = contact
            .contact_points
            .first()
            .copied()
            .filter(|p| p.is_finite())
            .unwrap_or(self_position);
        CollisionEvent {
            impact_force,
            contact_point,
            source_segment: self.segment,
            at_ms,
        }
    }
}

/// Closed set of collision listeners.
#[derive(Debug)]
pub enum CollisionSubscriber {
    /// Forward to a channel, usually drained by the haptic engine each step.
    Channel(mpsc::UnboundedSender<CollisionEvent>),
    /// Log every event at debug level.
    Trace,
}

/// Fans collision events out to subscribers in the same step they occur.
#[derive(Debug, Default)]
pub struct CollisionBus {
    subscribers: Vec<CollisionSubscriber>,
    published: u64,
}

impl CollisionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel subscriber and return its receiving end.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CollisionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(CollisionSubscriber::Channel(tx));
        rx
    }

    pub fn add_trace(&mut self) {
        self.subscribers.push(CollisionSubscriber::Trace);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total events published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Deliver `event` to every subscriber. Channel subscribers whose
    /// receiver is gone are dropped.
    pub fn publish(&mut self, event: CollisionEvent) {
        self.published += 1;
        self.subscribers.retain(|subscriber| match subscriber {
            CollisionSubscriber::Channel(tx) => tx.send(event).is_ok(),
            CollisionSubscriber::Trace => {
                debug!(
                    segment = %event.source_segment,
                    force = event.impact_force,
                    point = ?event.contact_point,
                    "Collision"
                );
                true
            }
        });
    }

    /// Reduce a raw contact on `segment` and publish it.
    pub fn report(
        &mut self,
        chain: &Chain,
        segment: SegmentId,
        contact: &RawContact,
        at_ms: u64,
    ) -> Option<CollisionEvent> {
        let Some(index) = chain.index_of(segment) else {
            warn!(%segment, "Contact on unknown segment ignored");
            return None;
        };
        let event = CollisionReducer::new(segment).reduce(contact, chain.global_position(index), at_ms);
        self.publish(event);
        Some(event)
    }
}
