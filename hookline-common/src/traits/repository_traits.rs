use async_trait::async_trait;
use crate::error::Error;
use crate::models::{
    Message, MessageFilter, NewMessage, NewSession, NewWebhook, Session, SessionStatus,
    SessionUpdate, Webhook,
};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &NewSession) -> Result<Session, Error>;
    async fn get(&self, id: i32) -> Result<Option<Session>, Error>;
    async fn list_all(&self) -> Result<Vec<Session>, Error>;
    async fn list_by_status(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, Error>;

    /// CRUD-level edit of name and default webhook URL.
    async fn update_details(
        &self,
        id: i32,
        session_name: &str,
        webhook_url: Option<&str>,
    ) -> Result<Option<Session>, Error>;

    /// Lifecycle columns written by the session manager.
    async fn update_state(&self, id: i32, update: &SessionUpdate) -> Result<(), Error>;

    async fn delete(&self, id: i32) -> Result<bool, Error>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn list_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error>;
    async fn list_active_for_session(&self, session_id: i32) -> Result<Vec<Webhook>, Error>;

    /// Insert, or refresh the row with the same (session_id, url).
    async fn upsert(&self, session_id: i32, webhook: &NewWebhook) -> Result<Webhook, Error>;

    async fn delete(&self, id: i32) -> Result<bool, Error>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Message>, Error>;

    async fn find_by_platform_id(
        &self,
        session_id: i32,
        message_id: &str,
    ) -> Result<Option<Message>, Error>;

    /// Fails with `Error::Duplicate` when (session_id, message_id) already exists.
    async fn insert(&self, message: &NewMessage) -> Result<Message, Error>;

    /// Newest first, plus the total number of matching rows.
    async fn list(
        &self,
        session_id: i32,
        filter: &MessageFilter,
    ) -> Result<(Vec<Message>, i64), Error>;

    async fn mark_webhook_sent(&self, id: i64) -> Result<(), Error>;
}
