// File: hookline-core/src/services/message_sender.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use hookline_common::models::chat::{is_chat_address, non_empty};
use hookline_common::models::{MediaSource, Message, NewMessage, OutgoingContent, SentMessage};
use hookline_common::traits::{MessageRepository, PlatformConnection};

use crate::platforms::views::normalize_chat_name;
use crate::platforms::SessionManager;
use crate::Error;

pub const MEDIA_TYPE_IMAGE: &str = "image";

/// Media attached to an outbound send, as accepted from API callers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Base64, optionally with a `data:<mime>;base64,` prefix.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub media: Option<MediaRequest>,
    /// Simulated typing time; `None` uses the configured default.
    #[serde(default)]
    pub typing_duration_ms: Option<i64>,
}

/// Anything that can push a message out through a session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(
        &self,
        session_id: i32,
        to: &str,
        text: &str,
        options: SendOptions,
    ) -> Result<Message, Error>;
}

fn strip_data_url_prefix(data: &str) -> &str {
    let trimmed = data.trim();
    if trimmed.starts_with("data:") {
        if let Some(idx) = trimmed.find(";base64,") {
            return &trimmed[idx + ";base64,".len()..];
        }
    }
    trimmed
}

/// Validate the request and turn it into what goes on the wire.
pub fn build_content(text: &str, media: Option<&MediaRequest>) -> Result<OutgoingContent, Error> {
    let Some(media) = media else {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        return Ok(OutgoingContent::Text { body: text.to_string() });
    };

    let kind = media
        .media_type
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_default();
    if kind != MEDIA_TYPE_IMAGE {
        let shown = if kind.is_empty() { "(missing)".to_string() } else { kind };
        return Err(Error::UnsupportedMediaType(shown));
    }

    let source = if let Some(data) = non_empty(&media.data) {
        let mimetype = non_empty(&media.mimetype).ok_or_else(|| {
            Error::InvalidMedia("mimetype is required when providing base64 data".into())
        })?;
        MediaSource::Inline {
            mimetype,
            data: strip_data_url_prefix(&data).to_string(),
            filename: non_empty(&media.filename),
        }
    } else if let Some(url) = non_empty(&media.url) {
        MediaSource::Remote { url }
    } else {
        return Err(Error::InvalidMedia(
            "media payload must include either a url or base64 data".into(),
        ));
    };

    let caption = non_empty(&media.caption).unwrap_or_else(|| text.to_string());
    Ok(OutgoingContent::Media { media: source, caption })
}

/// Outbound composer: recipient resolution, simulated typing, send, persist.
pub struct MessageSender {
    manager: SessionManager,
    messages: Arc<dyn MessageRepository>,
}

impl MessageSender {
    pub fn new(manager: SessionManager, messages: Arc<dyn MessageRepository>) -> Self {
        Self { manager, messages }
    }

    async fn resolve_recipient(
        &self,
        conn: &Arc<dyn PlatformConnection>,
        to: &str,
    ) -> Result<String, Error> {
        let to = to.trim();
        if to.is_empty() {
            return Err(Error::InvalidRecipient("recipient is empty".into()));
        }
        if is_chat_address(to) {
            return Ok(to.to_string());
        }
        conn.resolve_canonical_id(to)
            .await?
            .ok_or_else(|| Error::InvalidRecipient(format!("{} is not registered", to)))
    }

    async fn simulate_typing(
        &self,
        session_id: i32,
        conn: &Arc<dyn PlatformConnection>,
        chat_id: &str,
        requested_ms: Option<i64>,
    ) {
        match conn.get_chat(chat_id).await {
            Ok(_) => {
                if let Err(e) = conn.send_typing(chat_id).await {
                    debug!("Session {}: typing signal to {} failed: {}", session_id, chat_id, e);
                }
            }
            Err(e) => debug!("Session {}: could not load chat {} for typing: {}", session_id, chat_id, e),
        }
        let delay = self.manager.config().typing_delay(requested_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Group id, chat name and contact name for the persisted row.
    async fn reload_metadata(
        &self,
        session_id: i32,
        conn: &Arc<dyn PlatformConnection>,
        chat_id: &str,
    ) -> (Option<String>, Option<String>, Option<String>) {
        let chat = match conn.get_chat(chat_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Session {}: metadata reload for {} failed: {}", session_id, chat_id, e);
                return (None, None, None);
            }
        };
        let chat_name = Some(normalize_chat_name(&chat));

        if chat.is_group {
            let contact_name = non_empty(&chat.name).or_else(|| non_empty(&chat.contact_pushname));
            return (Some(chat.id.clone()), chat_name, contact_name);
        }

        let contact_name = match conn.get_contact(chat_id).await {
            Ok(c) => c.display_name().or_else(|| non_empty(&c.number)),
            Err(e) => {
                debug!("Session {}: contact lookup for {} failed: {}", session_id, chat_id, e);
                None
            }
        };
        (None, chat_name, contact_name)
    }

    async fn persist(&self, record: NewMessage) -> Result<Message, Error> {
        let session_id = record.session_id;
        let message_id = record.message_id.clone();
        match self.messages.insert(&record).await {
            Ok(m) => Ok(m),
            Err(Error::Duplicate(_)) => {
                // The message-created echo of this send can land first.
                self.messages
                    .find_by_platform_id(session_id, &message_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))
            }
            Err(e) => Err(e),
        }
    }
}

fn outbound_record(
    session_id: i32,
    chat_id: &str,
    sent: &SentMessage,
    content: &OutgoingContent,
    metadata: (Option<String>, Option<String>, Option<String>),
) -> NewMessage {
    let (group_id, chat_name, contact_name) = metadata;
    let (message_type, text) = match content {
        OutgoingContent::Text { body } => ("chat", body.clone()),
        OutgoingContent::Media { caption, .. } => (MEDIA_TYPE_IMAGE, caption.clone()),
    };
    let timestamp = sent
        .timestamp
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);
    let to_number = if sent.to.is_empty() { chat_id.to_string() } else { sent.to.clone() };

    NewMessage {
        session_id,
        message_id: sent.id.clone(),
        from_number: sent.from.clone(),
        to_number: Some(to_number),
        contact_name,
        group_id,
        chat_name,
        author: None,
        from_me: true,
        message_type: message_type.to_string(),
        content: text,
        timestamp,
        webhook_sent: false,
    }
}

#[async_trait]
impl OutboundSender for MessageSender {
    async fn send(
        &self,
        session_id: i32,
        to: &str,
        text: &str,
        options: SendOptions,
    ) -> Result<Message, Error> {
        let conn = self.manager.connection(session_id)?;
        let chat_id = self.resolve_recipient(&conn, to).await?;
        let content = build_content(text, options.media.as_ref())?;

        self.simulate_typing(session_id, &conn, &chat_id, options.typing_duration_ms)
            .await;

        let sent = conn.send_message(&chat_id, &content).await?;
        let metadata = self.reload_metadata(session_id, &conn, &chat_id).await;

        let saved = self
            .persist(outbound_record(session_id, &chat_id, &sent, &content, metadata))
            .await?;
        info!("Message {} sent from session {} to {}", saved.id, session_id, chat_id);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(data: Option<&str>, url: Option<&str>, mimetype: Option<&str>) -> MediaRequest {
        MediaRequest {
            media_type: Some("image".into()),
            data: data.map(Into::into),
            url: url.map(Into::into),
            mimetype: mimetype.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn text_requires_content() {
        assert!(matches!(build_content("   ", None), Err(Error::EmptyMessage)));
        assert_eq!(
            build_content("hi", None).unwrap(),
            OutgoingContent::Text { body: "hi".into() }
        );
    }

    #[test]
    fn only_images_are_supported() {
        let mut m = image(None, Some("http://x/a.pdf"), None);
        m.media_type = Some("document".into());
        assert!(matches!(build_content("", Some(&m)), Err(Error::UnsupportedMediaType(t)) if t == "document"));
        m.media_type = None;
        assert!(matches!(build_content("", Some(&m)), Err(Error::UnsupportedMediaType(_))));
    }

    #[test]
    fn inline_data_needs_mimetype_and_loses_prefix() {
        let m = image(Some("data:image/png;base64,AAAA"), None, None);
        assert!(matches!(build_content("", Some(&m)), Err(Error::InvalidMedia(_))));

        let m = image(Some("data:image/png;base64,AAAA"), None, Some("image/png"));
        match build_content("look", Some(&m)).unwrap() {
            OutgoingContent::Media { media: MediaSource::Inline { data, mimetype, .. }, caption } => {
                assert_eq!(data, "AAAA");
                assert_eq!(mimetype, "image/png");
                assert_eq!(caption, "look");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn remote_url_and_caption_override() {
        let mut m = image(None, Some("https://cdn/x.jpg"), None);
        m.caption = Some("cap".into());
        assert_eq!(
            build_content("fallback", Some(&m)).unwrap(),
            OutgoingContent::Media {
                media: MediaSource::Remote { url: "https://cdn/x.jpg".into() },
                caption: "cap".into()
            }
        );

        let empty = image(None, None, None);
        assert!(matches!(build_content("x", Some(&empty)), Err(Error::InvalidMedia(_))));
    }
}
