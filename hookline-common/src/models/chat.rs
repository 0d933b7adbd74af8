// File: hookline-common/src/models/chat.rs
//
// Shapes exchanged with a live platform connection.

use serde::{Deserialize, Serialize};

pub const DIRECT_SUFFIX: &str = "@c.us";
pub const GROUP_SUFFIX: &str = "@g.us";
pub const STATUS_BROADCAST: &str = "status@broadcast";

pub fn is_group_address(address: &str) -> bool {
    address.ends_with(GROUP_SUFFIX)
}

/// Already a direct or group chat id, no lookup needed.
pub fn is_chat_address(address: &str) -> bool {
    address.ends_with(DIRECT_SUFFIX) || address.ends_with(GROUP_SUFFIX)
}

/// `"12345@c.us"` => `"12345"`.
pub fn user_part(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// A message event as reported by the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    /// Sender inside a group chat.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub body: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub has_media: bool,
}

fn default_message_type() -> String {
    "chat".to_string()
}

impl InboundMessage {
    pub fn is_status_broadcast(&self) -> bool {
        self.from == STATUS_BROADCAST || self.to.as_deref() == Some(STATUS_BROADCAST)
    }

    pub fn is_group(&self) -> bool {
        is_group_address(&self.from) || self.to.as_deref().map(is_group_address).unwrap_or(false)
    }

    /// The chat this message belongs to, seen from this identity.
    pub fn chat_id(&self) -> &str {
        if self.from_me {
            self.to.as_deref().unwrap_or(&self.from)
        } else {
            &self.from
        }
    }

    /// The contact that authored the message.
    pub fn contact_id(&self) -> &str {
        self.author.as_deref().unwrap_or(&self.from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub from_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupParticipant {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formatted_title: Option<String>,
    /// Push name of the contact behind a direct chat.
    #[serde(default)]
    pub contact_pushname: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub is_me: bool,
}

impl ContactInfo {
    /// name, then pushname.
    pub fn display_name(&self) -> Option<String> {
        non_empty(&self.name).or_else(|| non_empty(&self.pushname))
    }
}

pub fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

/// Downloaded media; `data` is base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mimetype: String,
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaSource {
    Inline {
        mimetype: String,
        data: String,
        #[serde(default)]
        filename: Option<String>,
    },
    Remote { url: String },
}

/// What a send call puts on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutgoingContent {
    Text { body: String },
    Media { media: MediaSource, caption: String },
}

/// Acknowledgement returned by the connection after a send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}
