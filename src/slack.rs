//! Minimal Slack Web API client: identity lookup, thread history, and
//! message post/delete. Only what the reply cycle needs.

use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://slack.com/api";
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("Slack API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Slack {method} failed: {error}")]
    Api { method: &'static str, error: String },
}

impl SlackError {
    /// True when Slack rejected the call for a missing OAuth scope.
    pub fn is_missing_scope(&self) -> bool {
        matches!(self, Self::Api { error, .. } if error == "missing_scope")
    }
}

/// One message from `conversations.replies`, reduced to what the
/// timeline builder needs.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub ts: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    messages: Option<Vec<SlackMessage>>,
}

pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(bot_token, API_BASE)
    }

    /// Same client against a different API root; the integration tests
    /// point this at a local mock server.
    pub fn with_api_base(bot_token: impl Into<String>, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// `auth.test`: resolves the bot's own user id.
    pub async fn auth_test(&self) -> Result<String, SlackError> {
        let url = format!("{}/auth.test", self.api_base);
        let envelope = self
            .execute("auth.test", self.http.get(url).bearer_auth(&self.bot_token))
            .await?;
        envelope.user_id.ok_or(SlackError::Api {
            method: "auth.test",
            error: "response missing user_id".to_string(),
        })
    }

    /// `chat.postMessage` into a thread. Slack can omit `ts` in an ok
    /// response, so callers that care get `None` and decide themselves.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: &str,
    ) -> Result<Option<String>, SlackError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let payload = serde_json::json!({
            "channel": channel,
            "text": text,
            "thread_ts": thread_ts,
        });
        let envelope = self
            .execute(
                "chat.postMessage",
                self.http.post(url).bearer_auth(&self.bot_token).json(&payload),
            )
            .await?;
        Ok(envelope.ts)
    }

    /// `chat.delete`, used for placeholder cleanup.
    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), SlackError> {
        let url = format!("{}/chat.delete", self.api_base);
        let payload = serde_json::json!({ "channel": channel, "ts": ts });
        self.execute(
            "chat.delete",
            self.http.post(url).bearer_auth(&self.bot_token).json(&payload),
        )
        .await?;
        Ok(())
    }

    /// `conversations.replies`: up to `limit` messages of one thread,
    /// oldest first. Needs the `conversations:history` scope.
    pub async fn thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackError> {
        let url = format!("{}/conversations.replies", self.api_base);
        let envelope = self
            .execute(
                "conversations.replies",
                self.http
                    .get(url)
                    .bearer_auth(&self.bot_token)
                    .query(&[("channel", channel), ("ts", thread_ts)])
                    .query(&[("limit", limit)]),
            )
            .await?;
        Ok(envelope.messages.unwrap_or_default())
    }

    async fn execute(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope, SlackError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        if !status.is_success() {
            return Err(SlackError::Api {
                method,
                error: format!("http {status}: {body}"),
            });
        }
        // Slack reports most app-level errors with HTTP 200; the JSON
        // "ok" field is the real verdict.
        let envelope: ApiEnvelope = serde_json::from_str(&body).map_err(|e| SlackError::Api {
            method,
            error: format!("unparseable response: {e}"),
        })?;
        if !envelope.ok {
            return Err(SlackError::Api {
                method,
                error: envelope.error.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(envelope)
    }
}
