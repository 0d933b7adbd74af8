//! hookline-server/src/api/messages.rs

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use hookline_common::models::chat::non_empty;
use hookline_common::models::MessageFilter;
use hookline_core::services::message_sender::MEDIA_TYPE_IMAGE;
use hookline_core::services::{MediaRequest, SendOptions};
use hookline_core::Error;

use super::{success, ApiResult, AppState};

/// Body of `POST /api/messages/session/{id}/send`.
///
/// `media` is either a JSON object, a JSON string holding an object, or a
/// bare base64 string described by the `media*` side fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media: Option<Value>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_mime_type: Option<String>,
    #[serde(default)]
    pub media_filename: Option<String>,
    #[serde(default)]
    pub typing_duration_ms: Option<i64>,
}

impl SendRequest {
    /// Normalize the loose media fields into one request.
    pub fn media_request(&self) -> Result<Option<MediaRequest>, Error> {
        let caption = non_empty(&self.caption);
        let mut media = match &self.media {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    serde_json::from_str::<MediaRequest>(trimmed)
                        .map_err(|_| Error::InvalidMedia("media payload must be valid JSON".into()))?
                } else {
                    MediaRequest {
                        media_type: Some(
                            non_empty(&self.media_type)
                                .map(|t| t.trim().to_lowercase())
                                .unwrap_or_else(|| MEDIA_TYPE_IMAGE.to_string()),
                        ),
                        data: Some(trimmed.to_string()),
                        mimetype: non_empty(&self.media_mime_type).map(|m| m.trim().to_string()),
                        filename: non_empty(&self.media_filename).map(|f| f.trim().to_string()),
                        ..Default::default()
                    }
                }
            }
            Some(obj @ Value::Object(_)) => serde_json::from_value::<MediaRequest>(obj.clone())
                .map_err(|e| Error::InvalidMedia(format!("media payload: {}", e)))?,
            Some(_) => return Err(Error::InvalidMedia("media payload must be an object".into())),
        };
        if non_empty(&media.caption).is_none() {
            media.caption = caption;
        }
        Ok(Some(media))
    }
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    Ok(success(state.message_service.get_message(id).await?))
}

pub async fn list(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Query(filter): Query<MessageFilter>,
) -> ApiResult {
    let page = state.message_service.get_messages(session_id, &filter).await?;
    Ok(success(json!({
        "messages": page.messages,
        "pagination": { "total": page.total, "limit": page.limit, "offset": page.offset }
    })))
}

pub async fn send(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    Json(req): Json<SendRequest>,
) -> ApiResult {
    let Some(to) = non_empty(&req.to) else {
        return Err(Error::InvalidRecipient("Recipient (to) is required".into()).into());
    };
    if state.sessions.get(session_id).await?.is_none() {
        return Err(Error::NotFound(format!("Session with ID {} not found", session_id)).into());
    }
    let options = SendOptions {
        media: req.media_request()?,
        typing_duration_ms: req.typing_duration_ms,
    };
    let text = req.message.clone().unwrap_or_default();
    debug!("Send request for session {} to {}", session_id, to);

    let sent = state.sender.send(session_id, &to, &text, options).await?;
    Ok(success(json!({ "message": "Message sent successfully", "sentMessage": sent })))
}
