//! hookline-server/src/api/bridge.rs
//!
//! Event push endpoint for the protocol bridge.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;
use tracing::debug;

use hookline_common::models::ConnectionEvent;
use hookline_core::Error;

use super::{success_with, ApiResult, AppState};

pub async fn push_event(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    body: Bytes,
) -> ApiResult {
    let Some(bridge) = state.bridge.as_ref() else {
        return Err(Error::NotFound("bridge connector is not configured".into()).into());
    };
    let event: ConnectionEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => {
            debug!("Session {}: undecodable bridge event: {}", session_id, e);
            return Err(Error::Parse(format!("unrecognized bridge event: {}", e)).into());
        }
    };
    let name = event.name();
    if !bridge.route_event(session_id, event) {
        return Err(Error::NotConnected(session_id).into());
    }
    Ok(success_with(StatusCode::ACCEPTED, json!({ "event": name })))
}
