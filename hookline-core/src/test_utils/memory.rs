// File: hookline-core/src/test_utils/memory.rs
//
// In-memory repositories for tests that don't need Postgres.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use hookline_common::models::{
    Message, MessageFilter, NewMessage, NewSession, NewWebhook, Session, SessionStatus,
    SessionUpdate, Webhook,
};
use hookline_common::traits::{MessageRepository, SessionRepository, WebhookRepository};

use crate::Error;

#[derive(Default)]
pub struct InMemorySessionRepository {
    rows: Mutex<BTreeMap<i32, Session>>,
    next_id: AtomicI32,
    /// Every lifecycle write, in order.
    pub state_writes: Mutex<Vec<(i32, SessionUpdate)>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing uniqueness checks.
    pub fn seed(&self, id: i32, name: &str, webhook_url: Option<&str>) -> Session {
        let now = Utc::now();
        let session = Session {
            id,
            session_name: name.to_string(),
            user_id: 1,
            webhook_url: webhook_url.map(str::to_string),
            status: SessionStatus::Disconnected,
            qr_code: None,
            session_data: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().insert(id, session.clone());
        session
    }

    pub fn put(&self, session: Session) {
        self.rows.lock().insert(session.id, session);
    }

    pub fn snapshot(&self, id: i32) -> Option<Session> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn writes_for(&self, id: i32) -> Vec<SessionUpdate> {
        self.state_writes
            .lock()
            .iter()
            .filter(|(sid, _)| *sid == id)
            .map(|(_, u)| u.clone())
            .collect()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, new: &NewSession) -> Result<Session, Error> {
        let mut rows = self.rows.lock();
        if rows
            .values()
            .any(|s| s.user_id == new.user_id && s.session_name == new.session_name)
        {
            return Err(Error::Duplicate(format!("session name {}", new.session_name)));
        }
        let id = match new.id {
            Some(id) if rows.contains_key(&id) => {
                return Err(Error::Duplicate(format!("session id {}", id)));
            }
            Some(id) => id,
            None => {
                let max = rows.keys().next_back().copied().unwrap_or(0);
                let next = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                next.max(max + 1)
            }
        };
        let now = Utc::now();
        let session = Session {
            id,
            session_name: new.session_name.clone(),
            user_id: new.user_id,
            webhook_url: new.webhook_url.clone(),
            status: SessionStatus::Disconnected,
            qr_code: None,
            session_data: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: i32) -> Result<Option<Session>, Error> {
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Session>, Error> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    async fn list_by_status(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, Error> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn update_details(
        &self,
        id: i32,
        session_name: &str,
        webhook_url: Option<&str>,
    ) -> Result<Option<Session>, Error> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        row.session_name = session_name.to_string();
        row.webhook_url = webhook_url.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn update_state(&self, id: i32, update: &SessionUpdate) -> Result<(), Error> {
        self.state_writes.lock().push((id, update.clone()));
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;
        update.apply_to(row);
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<bool, Error> {
        Ok(self.rows.lock().remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryWebhookRepository {
    rows: Mutex<Vec<Webhook>>,
    next_id: AtomicI32,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, id: i32, active: bool) {
        if let Some(w) = self.rows.lock().iter_mut().find(|w| w.id == id) {
            w.active = active;
        }
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn list_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|w| w.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_active_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|w| w.session_id == session_id && w.active)
            .cloned()
            .collect())
    }

    async fn upsert(&self, session_id: i32, new: &NewWebhook) -> Result<Webhook, Error> {
        let mut rows = self.rows.lock();
        let now = Utc::now();
        if let Some(w) = rows
            .iter_mut()
            .find(|w| w.session_id == session_id && w.url == new.url)
        {
            w.secret = new.secret.clone();
            w.events = new.events_or_default();
            w.active = true;
            w.updated_at = now;
            return Ok(w.clone());
        }
        let webhook = Webhook {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            session_id,
            url: new.url.clone(),
            secret: new.secret.clone(),
            events: new.events_or_default(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(webhook.clone());
        Ok(webhook)
    }

    async fn delete(&self, id: i32) -> Result<bool, Error> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|w| w.id != id);
        Ok(rows.len() != before)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    rows: Mutex<Vec<Message>>,
    next_id: AtomicI64,
    /// The next N lookups by platform id report "not found", to simulate a
    /// concurrent insert landing between the lookup and our own insert.
    stale_lookups: AtomicUsize,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Message> {
        self.rows.lock().clone()
    }

    pub fn set_stale_lookups(&self, n: usize) {
        self.stale_lookups.store(n, Ordering::SeqCst);
    }

    /// Store a row without going through the trait, as a racing writer would.
    pub fn insert_raw(&self, new: NewMessage) -> Message {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let msg = new.into_message(id);
        self.rows.lock().push(msg.clone());
        msg
    }
}

fn matches_phone(m: &Message, phone: &str) -> bool {
    m.from_number.contains(phone) || m.to_number.as_deref().map(|t| t.contains(phone)).unwrap_or(false)
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn get(&self, id: i64) -> Result<Option<Message>, Error> {
        Ok(self.rows.lock().iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_platform_id(&self, session_id: i32, message_id: &str) -> Result<Option<Message>, Error> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|m| m.session_id == session_id && m.message_id == message_id)
            .cloned())
    }

    async fn insert(&self, new: &NewMessage) -> Result<Message, Error> {
        let mut rows = self.rows.lock();
        if rows
            .iter()
            .any(|m| m.session_id == new.session_id && m.message_id == new.message_id)
        {
            return Err(Error::Duplicate(format!("message {}", new.message_id)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let msg = new.clone().into_message(id);
        rows.push(msg.clone());
        Ok(msg)
    }

    async fn list(&self, session_id: i32, filter: &MessageFilter) -> Result<(Vec<Message>, i64), Error> {
        let mut matching: Vec<Message> = self
            .rows
            .lock()
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| filter.phone.as_deref().map(|p| matches_phone(m, p)).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn mark_webhook_sent(&self, id: i64) -> Result<(), Error> {
        if let Some(m) = self.rows.lock().iter_mut().find(|m| m.id == id) {
            m.webhook_sent = true;
        }
        Ok(())
    }
}
