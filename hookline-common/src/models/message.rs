// File: hookline-common/src/models/message.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// A persisted inbound or outbound message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub session_id: i32,
    /// Platform-native id; unique per session.
    pub message_id: String,
    pub from_number: String,
    pub to_number: Option<String>,
    pub contact_name: Option<String>,
    pub group_id: Option<String>,
    pub chat_name: Option<String>,
    pub author: Option<String>,
    pub from_me: bool,
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub webhook_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: i32,
    pub message_id: String,
    pub from_number: String,
    pub to_number: Option<String>,
    pub contact_name: Option<String>,
    pub group_id: Option<String>,
    pub chat_name: Option<String>,
    pub author: Option<String>,
    pub from_me: bool,
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub webhook_sent: bool,
}

impl NewMessage {
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            session_id: self.session_id,
            message_id: self.message_id,
            from_number: self.from_number,
            to_number: self.to_number,
            contact_name: self.contact_name,
            group_id: self.group_id,
            chat_name: self.chat_name,
            author: self.author,
            from_me: self.from_me,
            message_type: self.message_type,
            content: self.content,
            timestamp: self.timestamp,
            webhook_sent: self.webhook_sent,
            created_at: Utc::now(),
        }
    }
}

/// Paging and search filters for message listings.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageFilter {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Substring matched against sender and recipient.
    #[serde(default)]
    pub phone: Option<String>,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            phone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
