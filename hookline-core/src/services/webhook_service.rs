// File: hookline-core/src/services/webhook_service.rs
//
// Fan-out of persisted inbound messages to webhook targets, and the
// auto-reply loop that turns webhook responses back into outbound sends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use hookline_common::models::{Message, Session, Webhook};
use hookline_common::traits::MessageRepository;

use crate::http::HttpClient;
use crate::services::media::StoredMedia;
use crate::services::message_sender::{OutboundSender, SendOptions};
use crate::Error;

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Field names tried, in order, on object-shaped reply items.
const REPLY_FIELDS: [&str; 3] = ["reply_message", "output", "message"];

static SRCDOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)srcdoc=["']([^"']+)["']"#).expect("srcdoc pattern"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    pub to: Option<String>,
    pub contact_name: Option<String>,
    pub group_id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_mime_type: Option<String>,
}

/// Body POSTed to every webhook target.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub session_id: i32,
    pub session_name: String,
    pub message: WebhookMessage,
}

impl WebhookPayload {
    pub fn build(session: &Session, message: &Message, media: Option<&StoredMedia>) -> Self {
        let mut out = WebhookMessage {
            id: message.message_id.clone(),
            from: message.from_number.clone(),
            to: message.to_number.clone(),
            contact_name: message.contact_name.clone(),
            group_id: message.group_id.clone(),
            message_type: message.message_type.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            media_url: None,
            media_data: None,
            media_mime_type: None,
        };
        if let Some(m) = media {
            out.media_url = Some(m.url.clone());
            if m.is_image() {
                out.media_data = Some(m.data.clone());
            }
            out.media_mime_type = Some(m.mimetype.clone());
        }
        Self {
            session_id: session.id,
            session_name: session.session_name.clone(),
            message: out,
        }
    }
}

/// One reply instruction pulled out of a webhook response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub content: String,
    pub reply_to: Option<String>,
}

/// Shapes a webhook response item may take.
#[derive(Debug, PartialEq)]
enum ReplyItem<'a> {
    Text(&'a str),
    Fields {
        text: Option<&'a str>,
        reply_to: Option<&'a str>,
    },
    Ignored,
}

impl<'a> ReplyItem<'a> {
    fn decode(item: &'a Value) -> Self {
        match item {
            Value::String(s) => ReplyItem::Text(s),
            Value::Object(map) => {
                let text = REPLY_FIELDS
                    .iter()
                    .filter_map(|f| map.get(*f).and_then(Value::as_str))
                    .find(|s| !s.is_empty());
                let reply_to = map
                    .get("reply_to")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                ReplyItem::Fields { text, reply_to }
            }
            _ => ReplyItem::Ignored,
        }
    }
}

fn clean_reply_text(raw: &str) -> String {
    let inner = SRCDOC_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    TAG_RE.replace_all(inner, "").trim().to_string()
}

/// Parse a webhook response body into reply instructions.
///
/// JSON bodies are used as-is; anything else is treated as a single plain
/// message. Arrays yield one reply per usable item.
pub fn extract_replies(body: &str) -> Vec<Reply> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    let parsed = serde_json::from_str::<Value>(body)
        .unwrap_or_else(|_| Value::Array(vec![serde_json::json!({ "message": body })]));
    let items = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    items
        .iter()
        .filter_map(|item| {
            let (raw, reply_to) = match ReplyItem::decode(item) {
                ReplyItem::Text(s) => (s, None),
                ReplyItem::Fields { text: Some(t), reply_to } => (t, reply_to),
                ReplyItem::Fields { text: None, .. } | ReplyItem::Ignored => return None,
            };
            let content = clean_reply_text(raw);
            if content.is_empty() {
                return None;
            }
            Some(Reply {
                content,
                reply_to: reply_to.map(str::to_string),
            })
        })
        .collect()
}

/// Where an auto-reply goes: the explicit target, else whoever is on the
/// other side of the original message.
pub fn resolve_reply_target(reply_to: Option<&str>, original: &Message) -> Option<String> {
    if let Some(t) = reply_to.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(t.to_string());
    }
    let counterpart = if original.from_me {
        original.to_number.as_deref()
    } else {
        Some(original.from_number.as_str())
    };
    counterpart
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookTarget {
    pub url: String,
    pub secret: Option<String>,
    /// The session's own webhook URL, as opposed to a registered row.
    pub is_default: bool,
}

pub fn collect_targets(session: &Session, webhooks: &[Webhook]) -> Vec<WebhookTarget> {
    let mut targets = Vec::with_capacity(webhooks.len() + 1);
    if let Some(url) = session.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        targets.push(WebhookTarget { url: url.to_string(), secret: None, is_default: true });
    }
    for w in webhooks.iter().filter(|w| w.active) {
        targets.push(WebhookTarget {
            url: w.url.clone(),
            secret: w.secret.clone().filter(|s| !s.is_empty()),
            is_default: false,
        });
    }
    targets
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub replies_sent: usize,
    pub replies_failed: usize,
}

pub struct WebhookService {
    http: Arc<dyn HttpClient>,
    messages: Arc<dyn MessageRepository>,
    sender: Arc<dyn OutboundSender>,
    user_agent: String,
}

impl WebhookService {
    pub fn new(
        http: Arc<dyn HttpClient>,
        messages: Arc<dyn MessageRepository>,
        sender: Arc<dyn OutboundSender>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            messages,
            sender,
            user_agent: user_agent.into(),
        }
    }

    fn headers_for(&self, target: &WebhookTarget) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        if let Some(secret) = &target.secret {
            headers.push((SECRET_HEADER.to_string(), secret.clone()));
        }
        headers
    }

    async fn deliver(&self, target: &WebhookTarget, body: &Value) -> Result<String, Error> {
        let resp = self
            .http
            .post_json(&target.url, body, self.headers_for(target))
            .await?;
        if !resp.is_success() {
            return Err(Error::Webhook(format!("{} responded with {}", target.url, resp.status)));
        }
        Ok(resp.body)
    }

    /// Send every active target the payload, one after another. Per-target
    /// failures are logged and counted, never returned.
    pub async fn dispatch(
        &self,
        session: &Session,
        webhooks: &[Webhook],
        message: &Message,
        media: Option<&StoredMedia>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let payload = WebhookPayload::build(session, message, media);
        let body = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to encode webhook payload for message {}: {}", message.id, e);
                return report;
            }
        };

        for target in collect_targets(session, webhooks) {
            let response = match self.deliver(&target, &body).await {
                Ok(r) => r,
                Err(e) => {
                    error!("Error sending webhook for message {} to {}: {}", message.id, target.url, e);
                    report.failed += 1;
                    continue;
                }
            };
            info!("Webhook sent for message {} to {}", message.id, target.url);
            report.delivered += 1;

            if target.is_default {
                if let Err(e) = self.messages.mark_webhook_sent(message.id).await {
                    warn!("Could not flag message {} as delivered: {}", message.id, e);
                }
            }

            self.send_replies(session.id, message, &response, &mut report).await;
        }
        report
    }

    async fn send_replies(&self, session_id: i32, message: &Message, body: &str, report: &mut DispatchReport) {
        let replies = extract_replies(body);
        if replies.is_empty() {
            debug!("Webhook response for message {} carried no replies", message.id);
            return;
        }
        for reply in replies {
            let Some(to) = resolve_reply_target(reply.reply_to.as_deref(), message) else {
                warn!("No reply target for message {}; skipping auto-reply", message.id);
                continue;
            };
            match self
                .sender
                .send(session_id, &to, &reply.content, SendOptions::default())
                .await
            {
                Ok(_) => {
                    info!("Auto-reply sent for message {} to {}", message.id, to);
                    report.replies_sent += 1;
                }
                Err(e) => {
                    error!("Error sending auto-reply for message {}: {}", message.id, e);
                    report.replies_failed += 1;
                }
            }
        }
    }
}
