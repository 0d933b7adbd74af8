// File: hookline-common/src/models/mod.rs
pub mod session;
pub mod webhook;
pub mod message;
pub mod chat;
pub mod event;

pub use session::{NewSession, Session, SessionStatus, SessionUpdate};
pub use webhook::{NewWebhook, Webhook};
pub use message::{Message, MessageFilter, MessagePage, NewMessage};
pub use chat::{
    ChatInfo, ContactInfo, GroupParticipant, InboundMessage, LastMessage, MediaBlob, MediaSource,
    OutgoingContent, SentMessage,
};
pub use event::ConnectionEvent;
