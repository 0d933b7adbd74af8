//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues.

pub mod inbound_consumer;

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use hookline_common::models::{InboundMessage, SessionStatus};

/// Events published by the session manager.
#[derive(Debug, Clone)]
pub enum HookEvent {
    /// A platform message that should run through the inbound pipeline.
    InboundMessage {
        session_id: i32,
        message: InboundMessage,
        is_mention: bool,
    },

    /// The persisted status of a session changed.
    SessionStatusChanged {
        session_id: i32,
        status: SessionStatus,
    },
}

impl HookEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            HookEvent::InboundMessage { .. } => "inbound_message",
            HookEvent::SessionStatusChanged { .. } => "session_status",
        }
    }

    pub fn session_id(&self) -> i32 {
        match self {
            HookEvent::InboundMessage { session_id, .. }
            | HookEvent::SessionStatusChanged { session_id, .. } => *session_id,
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<HookEvent>` for guaranteed delivery.
///
/// - If the subscriber’s channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<HookEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber’s buffer.
const DEFAULT_BUFFER_SIZE: usize = 10000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new, empty event bus.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<HookEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers. Closed subscribers are pruned.
    pub async fn publish(&self, event: HookEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut saw_closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                saw_closed = true;
            }
        }
        if saw_closed {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
        }
    }

    pub async fn publish_inbound(&self, session_id: i32, message: InboundMessage, is_mention: bool) {
        self.publish(HookEvent::InboundMessage {
            session_id,
            message,
            is_mention,
        })
        .await;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(HookEvent::SessionStatusChanged {
            session_id: 3,
            status: SessionStatus::Connected,
        })
        .await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        assert_eq!(evt1.session_id(), 3);
        assert_eq!(evt2.event_type(), "session_status");
    }

    fn status_event(session_id: i32, status: SessionStatus) -> HookEvent {
        HookEvent::SessionStatusChanged { session_id, status }
    }

    #[tokio::test]
    async fn test_backpressure_blocking() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        bus.publish(status_event(1, SessionStatus::Connecting)).await;

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        let second_publish = bus.publish(status_event(1, SessionStatus::Connected));
        let result = timeout(Duration::from_millis(500), second_publish).await;
        assert!(result.is_ok(), "publish should eventually unblock");

        let (evt1, evt2) = handle.await.unwrap();
        match (evt1, evt2) {
            (
                HookEvent::SessionStatusChanged { status: a, .. },
                HookEvent::SessionStatusChanged { status: b, .. },
            ) => {
                assert_eq!(a, SessionStatus::Connecting);
                assert_eq!(b, SessionStatus::Connected);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(1)).await;
        let _keep = bus.subscribe(Some(1)).await;
        drop(rx);

        bus.publish(status_event(2, SessionStatus::Disconnected)).await;
        assert_eq!(bus.subscriber_count().await, 1);
    }
}
