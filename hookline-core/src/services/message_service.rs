// File: hookline-core/src/services/message_service.rs

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, error, info, warn};

use hookline_common::models::chat::non_empty;
use hookline_common::models::message::DEFAULT_PAGE_LIMIT;
use hookline_common::models::{
    InboundMessage, Message, MessageFilter, MessagePage, NewMessage, Session, Webhook,
};
use hookline_common::traits::{
    MessageRepository, PlatformConnection, SessionRepository, WebhookRepository,
};

use crate::platforms::views::normalize_chat_name;
use crate::platforms::SessionManager;
use crate::services::media::{MediaProcessor, StoredMedia};
use crate::services::webhook_service::{DispatchReport, WebhookService};
use crate::Error;

/// Whether a persisted inbound message is forwarded to webhooks.
///
/// Outbound echoes never are; group chatter only when this identity was mentioned.
pub fn should_dispatch(session: &Session, webhooks: &[Webhook], raw: &InboundMessage, is_mention: bool) -> bool {
    let has_webhook = session.has_default_webhook() || webhooks.iter().any(|w| w.active);
    has_webhook && !raw.from_me && (!raw.is_group() || is_mention)
}

#[derive(Debug, Default)]
struct ResolvedMetadata {
    group_id: Option<String>,
    chat_name: Option<String>,
    contact_name: Option<String>,
}

/// The inbound pipeline plus read access to stored messages.
pub struct MessageService {
    manager: SessionManager,
    sessions: Arc<dyn SessionRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    messages: Arc<dyn MessageRepository>,
    media: Arc<dyn MediaProcessor>,
    webhook_service: Arc<WebhookService>,
}

impl MessageService {
    pub fn new(
        manager: SessionManager,
        sessions: Arc<dyn SessionRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        messages: Arc<dyn MessageRepository>,
        media: Arc<dyn MediaProcessor>,
        webhook_service: Arc<WebhookService>,
    ) -> Self {
        debug!("MessageService::new() called");
        Self {
            manager,
            sessions,
            webhooks,
            messages,
            media,
            webhook_service,
        }
    }

    /// Persist one platform message and forward it when eligible.
    ///
    /// Re-delivery of an already stored (session, message id) pair returns the
    /// stored row untouched and does not dispatch again.
    pub async fn process(
        &self,
        session_id: i32,
        raw: &InboundMessage,
        is_mention: bool,
    ) -> Result<Option<Message>, Error> {
        if raw.is_status_broadcast() {
            debug!("Skipping status message for session {}", session_id);
            return Ok(None);
        }

        let Some(session) = self.sessions.get(session_id).await? else {
            error!("Session {} not found, cannot process message {}", session_id, raw.id);
            return Ok(None);
        };
        let webhooks = self.webhooks.list_active_for_session(session_id).await?;
        let dispatch = should_dispatch(&session, &webhooks, raw, is_mention);

        if let Some(existing) = self.messages.find_by_platform_id(session_id, &raw.id).await? {
            debug!("Message {} already stored for session {}", raw.id, session_id);
            return Ok(Some(existing));
        }

        let connection = self.manager.get_session(session_id).map(|rt| rt.connection());
        let metadata = match &connection {
            Some(conn) => self.resolve_metadata(session_id, conn, raw).await,
            None => ResolvedMetadata::default(),
        };

        let saved = match self.messages.insert(&inbound_record(session_id, raw, metadata)).await {
            Ok(m) => m,
            Err(Error::Duplicate(_)) => {
                debug!("Concurrent delivery of {} for session {}", raw.id, session_id);
                let existing = self
                    .messages
                    .find_by_platform_id(session_id, &raw.id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("message {}", raw.id)))?;
                return Ok(Some(existing));
            }
            Err(e) => return Err(e),
        };
        info!("Message {} saved for session {}", saved.id, session_id);

        let media = match (&connection, raw.has_media) {
            (Some(conn), true) => self.process_media(session_id, conn, raw, saved.id).await,
            _ => None,
        };

        if !dispatch {
            debug!(
                "Message {} for session {} not eligible for webhooks",
                saved.id, session_id
            );
            return Ok(Some(saved));
        }

        let report: DispatchReport = self
            .webhook_service
            .dispatch(&session, &webhooks, &saved, media.as_ref())
            .await;
        debug!("Dispatch for message {}: {:?}", saved.id, report);

        match self.messages.get(saved.id).await {
            Ok(Some(fresh)) => Ok(Some(fresh)),
            _ => Ok(Some(saved)),
        }
    }

    async fn resolve_metadata(
        &self,
        session_id: i32,
        conn: &Arc<dyn PlatformConnection>,
        raw: &InboundMessage,
    ) -> ResolvedMetadata {
        let mut meta = ResolvedMetadata::default();
        if raw.is_group() {
            meta.group_id = Some(raw.chat_id().to_string());
        }

        match conn.get_chat(raw.chat_id()).await {
            Ok(chat) => {
                meta.chat_name = Some(normalize_chat_name(&chat));
                if chat.is_group {
                    meta.group_id = Some(chat.id.clone());
                }
            }
            Err(e) => debug!("Session {}: chat lookup for {} failed: {}", session_id, raw.id, e),
        }

        match conn.get_contact(raw.contact_id()).await {
            Ok(contact) => meta.contact_name = contact.display_name(),
            Err(e) => debug!("Session {}: contact lookup for {} failed: {}", session_id, raw.id, e),
        }
        meta
    }

    async fn process_media(
        &self,
        session_id: i32,
        conn: &Arc<dyn PlatformConnection>,
        raw: &InboundMessage,
        row_id: i64,
    ) -> Option<StoredMedia> {
        let blob = match conn.download_media(raw).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                warn!("No media found for message {}", row_id);
                return None;
            }
            Err(e) => {
                error!("Error downloading media for message {}: {}", row_id, e);
                return None;
            }
        };
        match self.media.store(session_id, row_id, &blob).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!("Error processing media for message {}: {}", row_id, e);
                None
            }
        }
    }

    pub async fn get_messages(&self, session_id: i32, filter: &MessageFilter) -> Result<MessagePage, Error> {
        let filter = MessageFilter {
            limit: if filter.limit > 0 { filter.limit } else { DEFAULT_PAGE_LIMIT },
            offset: filter.offset.max(0),
            phone: filter.phone.as_ref().and_then(|p| non_empty(&Some(p.trim().to_string()))),
        };
        let (messages, total) = self.messages.list(session_id, &filter).await?;
        Ok(MessagePage {
            messages,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn get_message(&self, id: i64) -> Result<Message, Error> {
        self.messages
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", id)))
    }
}

fn inbound_record(session_id: i32, raw: &InboundMessage, meta: ResolvedMetadata) -> NewMessage {
    let timestamp = if raw.timestamp > 0 {
        Utc.timestamp_opt(raw.timestamp, 0).single().unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    };
    NewMessage {
        session_id,
        message_id: raw.id.clone(),
        from_number: raw.from.clone(),
        to_number: raw.to.clone(),
        contact_name: meta.contact_name,
        group_id: meta.group_id,
        chat_name: meta.chat_name,
        author: if raw.is_group() { raw.author.clone() } else { None },
        from_me: raw.from_me,
        message_type: raw.message_type.clone(),
        content: raw.body.clone(),
        timestamp,
        webhook_sent: false,
    }
}
