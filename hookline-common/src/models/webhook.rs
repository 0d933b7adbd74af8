// File: hookline-common/src/models/webhook.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WEBHOOK_EVENT: &str = "message";

/// An extra webhook target attached to a session, besides its default URL.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: i32,
    pub session_id: i32,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewWebhook {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

impl NewWebhook {
    pub fn events_or_default(&self) -> Vec<String> {
        match &self.events {
            Some(e) if !e.is_empty() => e.clone(),
            _ => vec![DEFAULT_WEBHOOK_EVENT.to_string()],
        }
    }
}
