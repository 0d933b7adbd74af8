// File: hookline-core/src/services/mod.rs

pub mod media;
pub mod message_sender;
pub mod message_service;
pub mod webhook_service;

pub use media::{FsMediaStore, MediaProcessor, StoredMedia};
pub use message_sender::{MediaRequest, MessageSender, OutboundSender, SendOptions};
pub use message_service::MessageService;
pub use webhook_service::{DispatchReport, WebhookService};
