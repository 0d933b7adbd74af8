// File: hookline-common/src/models/session.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection lifecycle state persisted on the `sessions` row.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnected" => Ok(SessionStatus::Disconnected),
            "connecting" => Ok(SessionStatus::Connecting),
            "connected" => Ok(SessionStatus::Connected),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i32,
    pub session_name: String,
    pub user_id: i32,
    pub webhook_url: Option<String>,
    pub status: SessionStatus,
    pub qr_code: Option<String>,
    /// Serialized auth snapshot; never sent to API clients.
    #[serde(skip_serializing)]
    pub session_data: Option<Value>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn has_default_webhook(&self) -> bool {
        self.webhook_url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Fields accepted when creating a session row.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    /// Explicit id; auto-assigned when absent.
    #[serde(default)]
    pub id: Option<i32>,
    pub session_name: String,
    pub user_id: i32,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Partial update of the lifecycle columns.
///
/// `None` leaves a column untouched; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub qr_code: Option<Option<String>>,
    pub session_data: Option<Option<Value>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_qr(mut self, qr: Option<String>) -> Self {
        self.qr_code = Some(qr);
        self
    }

    pub fn with_session_data(mut self, data: Option<Value>) -> Self {
        self.session_data = Some(data);
        self
    }

    pub fn with_last_seen(mut self, at: DateTime<Utc>) -> Self {
        self.last_seen = Some(at);
        self
    }

    /// Apply this patch to an in-memory row.
    pub fn apply_to(&self, session: &mut Session) {
        if let Some(s) = self.status {
            session.status = s;
        }
        if let Some(qr) = &self.qr_code {
            session.qr_code = qr.clone();
        }
        if let Some(data) = &self.session_data {
            session.session_data = data.clone();
        }
        if let Some(at) = self.last_seen {
            session.last_seen = Some(at);
        }
        session.updated_at = Utc::now();
    }
}
