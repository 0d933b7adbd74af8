//! hookline-server/src/api/mod.rs
//!
//! REST surface for the dashboard and for webhook consumers. Every handler
//! answers with `{status: "success", data}` or `{status: "error", message}`.

pub mod bridge;
pub mod messages;
pub mod sessions;
pub mod webhooks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use hookline_common::traits::{SessionRepository, WebhookRepository};
use hookline_core::platforms::{BridgeConnectionFactory, SessionManager};
use hookline_core::services::{MessageService, OutboundSender};
use hookline_core::Error;

/// Shared handles for the Axum routes.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub manager: SessionManager,
    pub sender: Arc<dyn OutboundSender>,
    pub message_service: Arc<MessageService>,
    /// `None` when sessions are not backed by the bridge connector.
    pub bridge: Option<Arc<BridgeConnectionFactory>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(sessions::list).post(sessions::create))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_one).put(sessions::update).delete(sessions::delete),
        )
        .route("/api/sessions/{id}/start", post(sessions::start))
        .route("/api/sessions/{id}/stop", post(sessions::stop))
        .route("/api/sessions/{id}/restart", post(sessions::restart))
        .route("/api/sessions/{id}/qr", get(sessions::qr))
        .route("/api/sessions/{id}/chats", get(sessions::chats))
        .route("/api/sessions/{id}/groups", get(sessions::groups))
        .route("/api/sessions/{id}/groups/{group_id}/members", get(sessions::group_members))
        .route("/api/messages/{id}", get(messages::get_one))
        .route("/api/messages/session/{session_id}", get(messages::list))
        .route("/api/messages/session/{session_id}/send", post(messages::send))
        .route(
            "/api/webhook/{id}",
            post(webhooks::handle_reply).get(webhooks::list).delete(webhooks::delete),
        )
        .route("/api/webhook/{id}/register", post(webhooks::register))
        .route("/api/bridge/{session_id}/events", post(bridge::push_event))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().to_rfc3339() }))
}

/// `200 {status: "success", data}`.
pub fn success<T: Serialize>(data: T) -> Response {
    success_with(StatusCode::OK, data)
}

pub fn success_with<T: Serialize>(code: StatusCode, data: T) -> Response {
    (code, Json(json!({ "status": "success", "data": data }))).into_response()
}

/// `200 {status: "success", message}` for actions without a payload.
pub fn done(message: impl Into<String>) -> Response {
    (StatusCode::OK, Json(json!({ "status": "success", "message": message.into() }))).into_response()
}

/// Error wrapper so handlers can use `?` on core results.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::NotConnected(_) => StatusCode::BAD_REQUEST,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = status_for(&self.0);
        if code.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (code, Json(json!({ "status": "error", "message": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;
