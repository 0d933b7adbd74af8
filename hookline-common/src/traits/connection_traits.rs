use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Error;
use crate::models::{
    ChatInfo, ConnectionEvent, ContactInfo, InboundMessage, MediaBlob, OutgoingContent,
    SentMessage,
};

/// A live connection for one session identity.
///
/// Lifecycle and message events are not returned from these calls; they are
/// pushed into the channel handed to [`ConnectionFactory::open`].
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    async fn connect(&self) -> Result<(), Error>;
    async fn destroy(&self) -> Result<(), Error>;

    async fn send_message(
        &self,
        chat_id: &str,
        content: &OutgoingContent,
    ) -> Result<SentMessage, Error>;

    async fn send_typing(&self, chat_id: &str) -> Result<(), Error>;

    /// Canonical chat id for a raw phone number / address, `None` if unregistered.
    async fn resolve_canonical_id(&self, address: &str) -> Result<Option<String>, Error>;

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, Error>;
    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, Error>;
    async fn get_mentions(&self, message: &InboundMessage) -> Result<Vec<ContactInfo>, Error>;
    async fn list_chats(&self) -> Result<Vec<ChatInfo>, Error>;
    async fn download_media(&self, message: &InboundMessage) -> Result<Option<MediaBlob>, Error>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(
        &self,
        session_id: i32,
        auth_dir: &Path,
        events: UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn PlatformConnection>, Error>;
}
