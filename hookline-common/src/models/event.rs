// File: hookline-common/src/models/event.rs

use serde::{Deserialize, Serialize};
use crate::models::chat::InboundMessage;

pub const STATE_CONNECTED: &str = "CONNECTED";

/// Everything a platform connection reports back to its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Qr { code: String },
    Authenticated,
    Ready,
    StateChanged { state: String },
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message { message: InboundMessage },
    /// Fired for every message created on this identity, including our own sends.
    MessageCreated { message: InboundMessage },
    Typing { chat_id: String },
    StopTyping { chat_id: String },
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Qr { .. } => "qr",
            ConnectionEvent::Authenticated => "authenticated",
            ConnectionEvent::Ready => "ready",
            ConnectionEvent::StateChanged { .. } => "change_state",
            ConnectionEvent::AuthFailure { .. } => "auth_failure",
            ConnectionEvent::Disconnected { .. } => "disconnected",
            ConnectionEvent::Message { .. } => "message",
            ConnectionEvent::MessageCreated { .. } => "message_create",
            ConnectionEvent::Typing { .. } => "typing",
            ConnectionEvent::StopTyping { .. } => "stop_typing",
        }
    }
}
