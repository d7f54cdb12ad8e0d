//! Slack Web API client
//!
//! Delivery goes through `chat.postMessage`; detail views open through `views.open`.
//! Slack answers HTTP 200 with `{"ok": false, "error": ...}` on logical failures, so both the
//! status and the `ok` flag are checked.

use super::message::{DetailView, OutboundMessage};
use crate::config::SlackConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts a composed message for one channel
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> AppResult<()>;
}

/// Opens a follow-up view for an interactive trigger
#[async_trait]
pub trait DetailOpener: Send + Sync {
    async fn open_detail(&self, trigger_id: &str, view: &DetailView) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("schema-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> AppResult<()> {
        let response: SlackResponse = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(AppError::Sink(format!(
                "{} failed: {}",
                method,
                response.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSink for SlackClient {
    async fn send(&self, message: &OutboundMessage) -> AppResult<()> {
        let body = serde_json::to_value(message)?;
        self.call("chat.postMessage", &body).await?;
        debug!("Delivered message to #{}", message.channel);
        Ok(())
    }
}

#[async_trait]
impl DetailOpener for SlackClient {
    async fn open_detail(&self, trigger_id: &str, view: &DetailView) -> AppResult<()> {
        let body = serde_json::json!({
            "trigger_id": trigger_id,
            "view": view.to_modal(),
        });
        self.call("views.open", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_api_base() {
        let client = SlackClient::new(&SlackConfig {
            bot_token: "xoxb-test".to_string(),
            api_base: "https://slack.example/api/".to_string(),
            ..SlackConfig::default()
        })
        .unwrap();
        assert_eq!(client.api_base, "https://slack.example/api");
    }

    #[test]
    fn test_slack_error_response_shape() {
        let response: SlackResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("channel_not_found"));
    }
}
