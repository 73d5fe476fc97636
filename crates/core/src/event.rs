//! Domain event system — decoupled observation of engine activity.
//!
//! The orchestrator publishes an event for every resolved turn, every
//! contained source fault, and every guard escalation. Subscribers (CLI
//! output, audit sinks, metrics) react without the engine knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::state::GuardTier;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn was resolved and committed
    TurnResolved {
        conversation_id: String,
        turn: u32,
        action: String,
        next_state: String,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// A knowledge source failed and its proposals were discarded
    SourceFaulted {
        conversation_id: String,
        source: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A guard moved to a higher escalation tier
    GuardEscalated {
        conversation_id: String,
        guard: String,
        tier: GuardTier,
        timestamp: DateTime<Utc>,
    },

    /// A new flow graph was published
    FlowReloaded {
        states: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing never
/// blocks, so it is safe to call from the synchronous turn pipeline.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::GuardEscalated {
            conversation_id: "conv-1".into(),
            guard: "conversation_loop".into(),
            tier: GuardTier::Nudge,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::GuardEscalated { guard, tier, .. } => {
                assert_eq!(guard, "conversation_loop");
                assert_eq!(*tier, GuardTier::Nudge);
            }
            _ => panic!("Expected GuardEscalated event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::FlowReloaded {
            states: 3,
            timestamp: Utc::now(),
        });
    }
}
