//! src/eventbus/inbound_consumer.rs
//!
//! Subscribes to the EventBus and runs every inbound message through the
//! MessageService on its own task, so a slow webhook for one session never
//! holds up another.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::eventbus::{EventBus, HookEvent};
use crate::services::MessageService;

pub async fn spawn_inbound_consumer(
    event_bus: &EventBus,
    service: Arc<MessageService>,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(None).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("Inbound consumer started");
        loop {
            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Inbound consumer shutting down");
                        break;
                    }
                },
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(HookEvent::InboundMessage { session_id, message, is_mention }) => {
                            let svc = Arc::clone(&service);
                            tokio::spawn(async move {
                                if let Err(e) = svc.process(session_id, &message, is_mention).await {
                                    error!(
                                        "Error processing message {} for session {}: {}",
                                        message.id, session_id, e
                                    );
                                }
                            });
                        }
                        Some(other) => {
                            debug!("Inbound consumer ignoring '{}' event", other.event_type());
                        }
                        None => {
                            info!("Inbound consumer channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}
