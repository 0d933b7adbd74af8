// File: hookline-core/src/platforms/bridge.rs
//
// Connection to an external protocol gateway ("bridge"). Every operation is a
// JSON POST to `{base}/sessions/{id}/{op}`; the bridge pushes lifecycle and
// message events back to our REST API, which hands them to `route_event`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use hookline_common::models::{
    ChatInfo, ConnectionEvent, ContactInfo, InboundMessage, MediaBlob, OutgoingContent,
    SentMessage,
};
use hookline_common::traits::{ConnectionFactory, PlatformConnection};

use crate::http::HttpClient;
use crate::Error;

#[derive(Debug, Deserialize)]
struct ResolvedId {
    #[serde(default)]
    id: Option<String>,
}

/// Thin RPC wrapper shared by the factory and its connections.
#[derive(Clone)]
struct BridgeRpc {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl BridgeRpc {
    fn endpoint(&self, session_id: i32, op: &str) -> String {
        format!(
            "{}/sessions/{}/{}",
            self.base_url.trim_end_matches('/'),
            session_id,
            op
        )
    }

    async fn call<T: DeserializeOwned>(&self, session_id: i32, op: &str, body: Value) -> Result<T, Error> {
        let url = self.endpoint(session_id, op);
        let resp = self.http.post_json(&url, &body, Vec::new()).await?;
        if !resp.is_success() {
            return Err(Error::Platform(format!(
                "bridge '{}' for session {} returned {}: {}",
                op, session_id, resp.status, resp.body
            )));
        }
        let raw = if resp.body.trim().is_empty() { "null" } else { resp.body.as_str() };
        Ok(serde_json::from_str(raw)?)
    }

    async fn call_unit(&self, session_id: i32, op: &str, body: Value) -> Result<(), Error> {
        let _: Value = self.call(session_id, op, body).await?;
        Ok(())
    }
}

pub struct BridgeConnection {
    session_id: i32,
    rpc: BridgeRpc,
    routes: Arc<DashMap<i32, UnboundedSender<ConnectionEvent>>>,
}

#[async_trait]
impl PlatformConnection for BridgeConnection {
    async fn connect(&self) -> Result<(), Error> {
        self.rpc.call_unit(self.session_id, "connect", json!({})).await
    }

    async fn destroy(&self) -> Result<(), Error> {
        let result = self.rpc.call_unit(self.session_id, "destroy", json!({})).await;
        self.routes.remove(&self.session_id);
        result
    }

    async fn send_message(&self, chat_id: &str, content: &OutgoingContent) -> Result<SentMessage, Error> {
        self.rpc
            .call(self.session_id, "send", json!({ "chatId": chat_id, "content": content }))
            .await
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), Error> {
        self.rpc
            .call_unit(self.session_id, "typing", json!({ "chatId": chat_id }))
            .await
    }

    async fn resolve_canonical_id(&self, address: &str) -> Result<Option<String>, Error> {
        let resolved: Option<ResolvedId> = self
            .rpc
            .call(self.session_id, "resolve", json!({ "address": address }))
            .await?;
        Ok(resolved.and_then(|r| r.id).filter(|id| !id.is_empty()))
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, Error> {
        self.rpc
            .call(self.session_id, "chat", json!({ "chatId": chat_id }))
            .await
    }

    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, Error> {
        self.rpc
            .call(self.session_id, "contact", json!({ "contactId": contact_id }))
            .await
    }

    async fn get_mentions(&self, message: &InboundMessage) -> Result<Vec<ContactInfo>, Error> {
        self.rpc
            .call(self.session_id, "mentions", json!({ "message": message }))
            .await
    }

    async fn list_chats(&self) -> Result<Vec<ChatInfo>, Error> {
        self.rpc.call(self.session_id, "chats", json!({})).await
    }

    async fn download_media(&self, message: &InboundMessage) -> Result<Option<MediaBlob>, Error> {
        self.rpc
            .call(self.session_id, "media", json!({ "message": message }))
            .await
    }
}

/// Opens bridge-backed connections and keeps the event channel of each one.
pub struct BridgeConnectionFactory {
    rpc: BridgeRpc,
    routes: Arc<DashMap<i32, UnboundedSender<ConnectionEvent>>>,
}

impl BridgeConnectionFactory {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            rpc: BridgeRpc {
                base_url: base_url.into(),
                http,
            },
            routes: Arc::new(DashMap::new()),
        }
    }

    /// Deliver an event pushed by the bridge. Returns false when the session
    /// has no open connection (or its event loop already ended).
    pub fn route_event(&self, session_id: i32, event: ConnectionEvent) -> bool {
        let name = event.name();
        let Some(tx) = self.routes.get(&session_id).map(|e| e.value().clone()) else {
            debug!("Bridge event '{}' for session {} has no open connection", name, session_id);
            return false;
        };
        if tx.send(event).is_err() {
            debug!("Bridge event '{}' for session {} dropped; event loop gone", name, session_id);
            self.routes.remove(&session_id);
            return false;
        }
        true
    }

    pub fn open_routes(&self) -> usize {
        self.routes.len()
    }
}

#[async_trait]
impl ConnectionFactory for BridgeConnectionFactory {
    async fn open(
        &self,
        session_id: i32,
        auth_dir: &Path,
        events: UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn PlatformConnection>, Error> {
        self.rpc
            .call_unit(
                session_id,
                "open",
                json!({ "authDir": auth_dir.to_string_lossy() }),
            )
            .await?;

        if self.routes.insert(session_id, events).is_some() {
            warn!("Session {}: replaced a stale bridge event route", session_id);
        }
        info!("Opened bridge connection for session {}", session_id);

        Ok(Arc::new(BridgeConnection {
            session_id,
            rpc: self.rpc.clone(),
            routes: Arc::clone(&self.routes),
        }))
    }
}
