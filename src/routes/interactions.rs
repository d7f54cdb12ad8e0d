//! Slack interactivity callback
//!
//! Slack posts `application/x-www-form-urlencoded` with a single `payload` field holding the
//! interaction JSON. Requests are signed with HMAC-SHA256 over `v0:{timestamp}:{body}`.

use crate::error::{AppError, AppResult};
use crate::notify::DetailView;
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";
const SIGNATURE_VERSION: &str = "v0";

/// Requests older (or newer) than this are replays
const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    actions: Vec<InteractionAction>,
}

#[derive(Debug, Deserialize)]
struct InteractionAction {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

/// Handle a button click: resolve the detail view and open it as a modal
pub async fn handle_interaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    if let Some(secret) = &state.signing_secret {
        verify_signature(secret, &headers, &body, chrono::Utc::now().timestamp())?;
    }

    let raw = form_payload(&body)?;
    let interaction: InteractionPayload = serde_json::from_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid interaction payload: {}", e)))?;

    if interaction.kind != "block_actions" {
        debug!("Ignoring interaction of type {}", interaction.kind);
        return Ok(StatusCode::OK);
    }

    let trigger_id = interaction
        .trigger_id
        .ok_or_else(|| AppError::BadRequest("Missing trigger_id".to_string()))?;

    // A trigger can open one view
    let Some(action) = interaction.actions.first() else {
        return Ok(StatusCode::OK);
    };

    let value = action.value.as_deref().unwrap_or_default();
    let view = match state.actions.dispatch(&action.action_id, value).await {
        Ok(view) => view,
        Err(e) => {
            warn!("Action {} failed: {}", action.action_id, e);
            DetailView::new("Details unavailable", &format!("Could not load details: {}", e))
        }
    };

    if let Err(e) = state.detail.open_detail(&trigger_id, &view).await {
        warn!("Slack Error (views.open): {}", e);
    } else {
        info!("🔍 Opened {} detail view", action.action_id);
    }

    Ok(StatusCode::OK)
}

fn form_payload(body: &[u8]) -> AppResult<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| AppError::BadRequest("Missing payload field".to_string()))
}

/// Check the request signature and freshness against `now` (unix seconds)
pub fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8], now: i64) -> AppResult<()> {
    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let issued: i64 = timestamp
        .parse()
        .map_err(|_| AppError::Unauthorized("Malformed request timestamp".to_string()))?;
    if (now - issued).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(AppError::Unauthorized("Stale request timestamp".to_string()));
    }

    let provided = header_str(headers, SIGNATURE_HEADER)?
        .strip_prefix(&format!("{}=", SIGNATURE_VERSION))
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| AppError::Unauthorized("Malformed signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC key: {}", e)))?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    mac.verify_slice(&provided)
        .map_err(|_| AppError::Unauthorized("Signature mismatch".to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))
}
