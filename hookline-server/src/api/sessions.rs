//! hookline-server/src/api/sessions.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{info, warn};

use hookline_common::models::chat::non_empty;
use hookline_common::models::{NewSession, Session, SessionStatus};
use hookline_core::Error;

use super::{done, success, success_with, ApiResult, AppState};

/// A session row as listed to the dashboard; QR and auth blob are left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: i32,
    pub session_name: String,
    pub user_id: i32,
    pub webhook_url: Option<String>,
    pub status: SessionStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether this process holds a live connection for the session.
    pub live: bool,
}

impl SessionView {
    fn new(s: Session, live: bool) -> Self {
        Self {
            id: s.id,
            session_name: s.session_name,
            user_id: s.user_id,
            webhook_url: s.webhook_url,
            status: s.status,
            last_seen: s.last_seen,
            created_at: s.created_at,
            updated_at: s.updated_at,
            live,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<i32>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<i32>,
}

/// `webhook_url` absent keeps the current value; `null` clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub webhook_url: Option<Option<String>>,
}

fn present<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(Some)
}

async fn load(state: &AppState, id: i32) -> Result<Session, Error> {
    state
        .sessions
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Session with ID {} not found", id)))
}

/// Chat listings need a connected row; a missing live handle is brought up on demand.
async fn ensure_connected(state: &AppState, id: i32) -> Result<(), Error> {
    let session = load(state, id).await?;
    if session.status != SessionStatus::Connected {
        return Err(Error::NotConnected(id));
    }
    if state.manager.get_session(id).is_none() {
        state.manager.initialize_session(id).await?;
    }
    Ok(())
}

pub async fn list(State(state): State<AppState>) -> ApiResult {
    let rows = state.sessions.list_all().await?;
    let views: Vec<SessionView> = rows
        .into_iter()
        .map(|s| {
            let live = state.manager.get_session(s.id).is_some();
            SessionView::new(s, live)
        })
        .collect();
    Ok(success(views))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    let s = load(&state, id).await?;
    let live = state.manager.get_session(id).is_some();
    Ok(success(SessionView::new(s, live)))
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateSessionRequest>) -> ApiResult {
    let (Some(session_name), Some(user_id)) = (non_empty(&req.session_name), req.user_id) else {
        return Err(Error::Parse("Session name and user ID are required".into()).into());
    };
    let created = state
        .sessions
        .create(&NewSession {
            id: req.session_id,
            session_name: session_name.trim().to_string(),
            user_id,
            webhook_url: non_empty(&req.webhook_url),
        })
        .await?;
    info!("Session {} created", created.id);
    Ok(success_with(StatusCode::CREATED, SessionView::new(created, false)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateSessionRequest>,
) -> ApiResult {
    let existing = load(&state, id).await?;
    let name = non_empty(&req.session_name).unwrap_or(existing.session_name);
    let webhook_url = match req.webhook_url {
        Some(v) => non_empty(&v),
        None => existing.webhook_url,
    };
    let updated = state
        .sessions
        .update_details(id, &name, webhook_url.as_deref())
        .await?
        .ok_or_else(|| Error::NotFound(format!("Session with ID {} not found", id)))?;
    info!("Session {} updated", id);
    let live = state.manager.get_session(id).is_some();
    Ok(success(SessionView::new(updated, live)))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    let existing = load(&state, id).await?;
    let active = matches!(existing.status, SessionStatus::Connected | SessionStatus::Connecting);
    if active || state.manager.get_session(id).is_some() {
        if let Err(e) = state.manager.close_session(id).await {
            warn!("Session {}: close before delete failed: {}", id, e);
        }
    }
    state.sessions.delete(id).await?;
    info!("Session {} deleted", id);
    Ok(done(format!("Session {} deleted successfully", id)))
}

pub async fn start(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    load(&state, id).await?;
    let rt = state.manager.initialize_session(id).await?;
    info!("Session {} started", id);
    Ok(success(rt.info()))
}

pub async fn stop(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    load(&state, id).await?;
    let had_live = state.manager.close_session(id).await?;
    info!("Session {} stopped (live connection: {})", id, had_live);
    Ok(done(format!("Session {} stopped successfully", id)))
}

pub async fn restart(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    load(&state, id).await?;
    let rt = state.manager.restart_session(id).await?;
    Ok(success(rt.info()))
}

/// Starts the session if needed, then reports the QR persisted so far.
pub async fn qr(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    load(&state, id).await?;
    if state.manager.get_session(id).is_none() {
        state.manager.initialize_session(id).await?;
    }
    let fresh = load(&state, id).await?;
    Ok(success(json!({ "qr_code": fresh.qr_code, "status": fresh.status })))
}

pub async fn chats(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    ensure_connected(&state, id).await?;
    Ok(success(state.manager.get_session_chats(id).await?))
}

pub async fn groups(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    ensure_connected(&state, id).await?;
    Ok(success(state.manager.get_session_groups(id).await?))
}

pub async fn group_members(
    State(state): State<AppState>,
    Path((id, group_id)): Path<(i32, String)>,
) -> ApiResult {
    let group_id = group_id.trim();
    if group_id.is_empty() {
        return Err(Error::Parse("Session ID and group ID are required".into()).into());
    }
    ensure_connected(&state, id).await?;
    Ok(success(state.manager.get_group_participants(id, group_id).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use hookline_common::models::{ChatInfo, ConnectionEvent, SessionStatus};
    use hookline_core::test_utils::{eventually, TestHarness};

    use crate::api::test_support::{call, state_for};

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let h = TestHarness::new(tmp.path());

        let (code, body) = call(state_for(&h), Method::POST, "/api/sessions", Some(json!({"session_name": "a"}))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let req = json!({"session_id": 7, "session_name": "support", "user_id": 1, "webhook_url": "https://x/y"});
        let (code, body) = call(state_for(&h), Method::POST, "/api/sessions", Some(req.clone())).await;
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(body["data"]["id"], 7);
        assert_eq!(body["data"]["status"], "disconnected");
        assert!(body["data"].get("qrCode").is_none());

        let (code, _) = call(state_for(&h), Method::POST, "/api/sessions", Some(req)).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_keeps_or_clears_webhook() {
        let tmp = tempfile::tempdir().unwrap();
        let h = TestHarness::new(tmp.path());
        h.sessions.seed(3, "old", Some("https://x/y"));

        let (code, body) = call(state_for(&h), Method::PUT, "/api/sessions/3", Some(json!({"session_name": "new"}))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"]["sessionName"], "new");
        assert_eq!(body["data"]["webhookUrl"], "https://x/y");

        let (_, body) = call(state_for(&h), Method::PUT, "/api/sessions/3", Some(json!({"webhook_url": null}))).await;
        assert!(body["data"]["webhookUrl"].is_null());
        assert_eq!(body["data"]["sessionName"], "new");

        let (code, _) = call(state_for(&h), Method::PUT, "/api/sessions/99", Some(json!({}))).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_qr_stop_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let h = TestHarness::new(tmp.path());
        h.sessions.seed(5, "flow", None);

        let (code, body) = call(state_for(&h), Method::GET, "/api/sessions/5/qr", None).await;
        assert_eq!(code, StatusCode::OK);
        assert!(body["data"]["qr_code"].is_null());
        assert_eq!(body["data"]["status"], "connecting");
        assert!(h.manager.get_session(5).is_some());

        h.factory.connection(5).unwrap().emit(ConnectionEvent::Qr { code: "2@x".into() });
        assert!(eventually(|| h.sessions.snapshot(5).unwrap().qr_code.is_some()).await);
        let (_, body) = call(state_for(&h), Method::GET, "/api/sessions/5/qr", None).await;
        assert_eq!(body["data"]["status"], "connecting");
        assert!(body["data"]["qr_code"].as_str().unwrap().starts_with("data:image/svg+xml"));

        let (code, _) = call(state_for(&h), Method::POST, "/api/sessions/5/stop", None).await;
        assert_eq!(code, StatusCode::OK);
        assert!(h.manager.get_session(5).is_none());

        let (code, body) = call(state_for(&h), Method::POST, "/api/sessions/5/start", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"]["id"], 5);
        assert_eq!(body["data"]["status"], "connecting");
        assert_eq!(h.sessions.snapshot(5).unwrap().status, SessionStatus::Connecting);

        let (code, _) = call(state_for(&h), Method::DELETE, "/api/sessions/5", None).await;
        assert_eq!(code, StatusCode::OK);
        assert!(h.sessions.snapshot(5).is_none());
        assert!(h.manager.get_session(5).is_none());
    }

    #[tokio::test]
    async fn start_failure_is_a_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        let h = TestHarness::new(tmp.path());
        h.sessions.seed(6, "broken", None);
        h.factory.fail_open.store(true, Ordering::SeqCst);

        let (code, body) = call(state_for(&h), Method::POST, "/api/sessions/6/start", None).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");

        let (code, _) = call(state_for(&h), Method::POST, "/api/sessions/404/start", None).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_listing_requires_connected_row() {
        let tmp = tempfile::tempdir().unwrap();
        let h = TestHarness::new(tmp.path());
        h.sessions.seed(8, "chats", None);
        h.factory.on_open(|c| c.add_chat(ChatInfo { id: "111@c.us".into(), name: Some("Alice".into()), ..Default::default() }));

        let (code, body) = call(state_for(&h), Method::GET, "/api/sessions/8/chats", None).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Session 8 is not connected");

        let mut row = h.sessions.snapshot(8).unwrap();
        row.status = SessionStatus::Connected;
        h.sessions.put(row);

        // Not live yet: the handler brings the connection up itself.
        let (code, body) = call(state_for(&h), Method::GET, "/api/sessions/8/chats", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "Alice");
        assert_eq!(h.factory.opened.load(Ordering::SeqCst), 1);
    }
}
