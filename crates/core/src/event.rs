//! Event bus for engine-internal pub/sub.
//!
//! Components publish domain events (tool started, step started, context
//! compressed) without knowing who listens. Frontends subscribe to render
//! progress; nothing here ever feeds back into the message history.
//! Delivery is best-effort: if nobody is listening, events are dropped.

use crate::message::SessionId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Events that flow through the engine.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A turn was opened for a user message.
    TurnStarted {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },

    /// A turn reached a terminal state.
    TurnCompleted {
        session_id: SessionId,
        steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// The router picked tool domains for the turn.
    IntentRouted {
        mode: String,
        domains: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A reasoning step began.
    StepStarted {
        step: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool execution was dispatched.
    ToolStarted {
        tool_name: String,
        call_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool execution finished (successfully or not).
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The compressor rewrote the working history.
    ContextCompressed {
        messages_before: usize,
        messages_after: usize,
        timestamp: DateTime<Utc>,
    },

    /// An oversized tool output was archived to the scratchpad.
    OutputArchived {
        key: String,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },
}

/// A simple broadcast-based event bus.
///
/// Slow subscribers may miss events (lagged receiver); that is acceptable
/// for a status side channel.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of receivers that got it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        debug!(event = ?event, "Publishing domain event");
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::StepStarted {
            step: 1,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::StepStarted { step, .. } => assert_eq!(*step, 1),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        let delivered = bus.publish(DomainEvent::TurnStarted {
            session_id: SessionId::new(),
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(DomainEvent::ContextCompressed {
            messages_before: 40,
            messages_after: 9,
            timestamp: Utc::now(),
        });

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }
}
