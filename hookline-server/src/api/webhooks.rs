//! hookline-server/src/api/webhooks.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use url::Url;

use hookline_common::models::chat::non_empty;
use hookline_common::models::{NewWebhook, Session, SessionStatus};
use hookline_core::services::SendOptions;
use hookline_core::Error;

use super::{done, success, success_with, ApiResult, AppState};

/// A reply instruction pushed to us by a webhook consumer.
#[derive(Debug, Default, Deserialize)]
pub struct ReplyInstruction {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub reply_message: Option<String>,
}

async fn load_session(state: &AppState, id: i32) -> Result<Session, Error> {
    state
        .sessions
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Session with ID {} not found", id)))
}

pub async fn handle_reply(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Json(req): Json<ReplyInstruction>,
) -> ApiResult {
    let session = load_session(&state, session_id).await?;
    if session.status != SessionStatus::Connected {
        return Err(Error::NotConnected(session_id).into());
    }

    let (Some(to), Some(text)) = (non_empty(&req.reply_to), non_empty(&req.reply_message)) else {
        return Ok(done("Webhook received"));
    };
    let sent = state
        .sender
        .send(session_id, &to, &text, SendOptions::default())
        .await?;
    info!(
        "Reply for {} sent through session {}",
        req.message_id.as_deref().unwrap_or("-"),
        session_id
    );
    Ok(success(json!({ "message": "Reply sent successfully", "sentMessage": sent })))
}

pub async fn register(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Json(req): Json<NewWebhook>,
) -> ApiResult {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return Err(Error::Parse("Webhook URL is required".into()).into());
    }
    match Url::parse(&url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        _ => return Err(Error::Parse(format!("Invalid webhook URL: {}", url)).into()),
    }
    load_session(&state, session_id).await?;

    let existed = state
        .webhooks
        .list_for_session(session_id)
        .await?
        .iter()
        .any(|w| w.url == url);

    let webhook = state
        .webhooks
        .upsert(session_id, &NewWebhook { url, ..req })
        .await?;

    if existed {
        info!("Webhook {} updated for session {}", webhook.id, session_id);
        Ok(success(webhook))
    } else {
        info!("Webhook {} registered for session {}", webhook.id, session_id);
        Ok(success_with(StatusCode::CREATED, webhook))
    }
}

pub async fn list(State(state): State<AppState>, Path(session_id): Path<i32>) -> ApiResult {
    load_session(&state, session_id).await?;
    Ok(success(state.webhooks.list_for_session(session_id).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult {
    if !state.webhooks.delete(id).await? {
        return Err(Error::NotFound(format!("Webhook with ID {} not found", id)).into());
    }
    info!("Webhook {} deleted", id);
    Ok(done(format!("Webhook {} deleted successfully", id)))
}
