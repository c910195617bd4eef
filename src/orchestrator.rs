//! The reply cycle: one mention in, one threaded answer out.
//!
//! Every accepted mention gets its own cycle: resolve the bot's identity,
//! load its system prompt, extract the question, post a placeholder,
//! rebuild the thread timeline, run inference, post the answer, clean up.
//! Known failures answer the user with a specific message; a top-level
//! catch-all guarantees nobody is left waiting on a silent crash.

use crate::bedrock::BedrockClient;
use crate::prompt;
use crate::slack::{SlackClient, SlackError};
use crate::timeline;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Most recent thread messages fetched for context.
pub const HISTORY_LIMIT: u32 = 20;

const PLACEHOLDER_TEXT: &str = "Just a moment, generating an answer... ⏳";

/// One `app_mention`, as handed over by the ingress.
#[derive(Debug, Clone)]
pub struct MentionEvent {
    pub event_id: Option<String>,
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    /// `authorizations[0].user_id` from the delivery envelope, when present.
    pub authed_user_id: Option<String>,
}

pub struct Orchestrator {
    slack: SlackClient,
    bedrock: BedrockClient,
    prompt_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(slack: SlackClient, bedrock: BedrockClient, prompt_dir: PathBuf) -> Self {
        Self {
            slack,
            bedrock,
            prompt_dir,
        }
    }

    /// Runs the full reply cycle for one mention. Anything the cycle did
    /// not handle itself lands in the catch-all here, which answers the
    /// user and cleans up the placeholder.
    pub async fn handle_mention(&self, event: MentionEvent) {
        let event_id = event
            .event_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(
            "mention from {} in {} (event id: {event_id}, ts: {}, thread: {:?})",
            event.user,
            event.channel,
            event.ts,
            event.thread_ts
        );

        let mut cycle = ReplyCycle {
            slack: &self.slack,
            bedrock: &self.bedrock,
            prompt_dir: &self.prompt_dir,
            target_ts: thread_root(event.thread_ts.as_deref(), &event.ts),
            event: &event,
            placeholder_ts: None,
        };

        if let Err(err) = cycle.run().await {
            tracing::error!(
                "unhandled failure while processing mention (event id: {event_id}): {err:#}"
            );
            cycle
                .notify(&format!(
                    "Sorry, <@{}>. Something went wrong while handling your request. 😥",
                    event.user
                ))
                .await;
            cycle.cleanup_placeholder().await;
        }
    }
}

struct ReplyCycle<'a> {
    slack: &'a SlackClient,
    bedrock: &'a BedrockClient,
    prompt_dir: &'a Path,
    event: &'a MentionEvent,
    target_ts: String,
    placeholder_ts: Option<String>,
}

impl ReplyCycle<'_> {
    /// Walks the cycle. Known aborts answer the user and return `Ok`;
    /// `Err` is reserved for conditions only the catch-all handles.
    async fn run(&mut self) -> anyhow::Result<()> {
        let Some(bot_user_id) = self.resolve_bot_user_id().await else {
            self.notify("Sorry, something went wrong while setting up the bot. (bot ID unavailable)")
                .await;
            return Ok(());
        };

        let system_prompt = match load_system_prompt(self.prompt_dir, &bot_user_id).await {
            Ok(prompt) => prompt,
            Err(failure) => {
                self.notify(&failure.user_message(&self.event.user)).await;
                return Ok(());
            }
        };

        let query = extract_query(&self.event.text, &bot_user_id);
        if query.is_empty() {
            tracing::warn!("mention carried no question text");
            self.notify(&format!("<@{}>, please provide a question.", self.event.user))
                .await;
            return Ok(());
        }
        tracing::info!("extracted question: {query}");

        self.post_placeholder().await;

        let timeline_json = match self.fetch_timeline_json(&bot_user_id, &query).await {
            Ok(json) => json,
            Err(err) => {
                let message = if err.is_missing_scope() {
                    tracing::error!("thread history fetch lacks the conversations:history scope");
                    format!(
                        "Sorry, <@{}>. Fetching earlier thread messages requires the 'conversations:history' scope. Please check the Slack app configuration.",
                        self.event.user
                    )
                } else {
                    tracing::error!("thread history fetch failed: {err}");
                    format!(
                        "Sorry, <@{}>. Something went wrong while fetching the earlier conversation.",
                        self.event.user
                    )
                };
                self.notify(&message).await;
                self.cleanup_placeholder().await;
                return Ok(());
            }
        };

        let prompt = prompt::assemble(&system_prompt, &timeline_json, &query);

        let started = Instant::now();
        let reply = self.bedrock.generate(&prompt).await;
        tracing::info!(
            "inference completed in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        self.slack
            .post_message(&self.event.channel, &reply, &self.target_ts)
            .await?;
        tracing::info!("reply posted (thread: {})", self.target_ts);

        self.cleanup_placeholder().await;
        Ok(())
    }

    /// Ordered resolution: the delivery's authorization hint first, then
    /// a live `auth.test` call.
    async fn resolve_bot_user_id(&self) -> Option<String> {
        if let Some(id) = self
            .event
            .authed_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
        {
            tracing::debug!("bot user id from event authorizations: {id}");
            return Some(id.to_string());
        }
        match self.slack.auth_test().await {
            Ok(id) => {
                tracing::info!("bot user id resolved via auth.test: {id}");
                Some(id)
            }
            Err(err) => {
                tracing::error!("could not resolve bot user id: {err}");
                None
            }
        }
    }

    /// Canonical timeline JSON for the prompt. Inside a thread this
    /// fetches history; otherwise the timeline is just the current
    /// question. An empty fetch result falls back the same way.
    async fn fetch_timeline_json(
        &self,
        bot_user_id: &str,
        query: &str,
    ) -> Result<String, SlackError> {
        let Some(thread_ts) = self.event.thread_ts.as_deref().filter(|ts| !ts.is_empty()) else {
            tracing::info!("mention starts a new thread; timeline is the question only");
            return Ok(timeline::to_canonical_json(&timeline::single_entry(
                &self.event.user,
                query,
            )));
        };

        tracing::info!("fetching history for thread {thread_ts}");
        let messages = self
            .slack
            .thread_replies(&self.event.channel, thread_ts, HISTORY_LIMIT)
            .await?;
        if messages.is_empty() {
            tracing::info!("thread history came back empty; using the question only");
            return Ok(timeline::to_canonical_json(&timeline::single_entry(
                &self.event.user,
                query,
            )));
        }
        tracing::info!("fetched {} thread message(s)", messages.len());
        Ok(timeline::to_canonical_json(&timeline::build_timeline(
            &messages,
            bot_user_id,
        )))
    }

    /// Advisory only: failure to post is logged and the cycle continues.
    async fn post_placeholder(&mut self) {
        match self
            .slack
            .post_message(&self.event.channel, PLACEHOLDER_TEXT, &self.target_ts)
            .await
        {
            Ok(Some(ts)) => {
                tracing::info!("placeholder posted (ts: {ts})");
                self.placeholder_ts = Some(ts);
            }
            Ok(None) => tracing::warn!("placeholder posted but response carried no ts"),
            Err(err) => tracing::error!("failed to post placeholder: {err}"),
        }
    }

    /// Best-effort delete of the placeholder; failure is logged only.
    async fn cleanup_placeholder(&mut self) {
        if let Some(ts) = self.placeholder_ts.take() {
            match self.slack.delete_message(&self.event.channel, &ts).await {
                Ok(()) => tracing::info!("placeholder deleted (ts: {ts})"),
                Err(err) => tracing::error!("failed to delete placeholder {ts}: {err}"),
            }
        }
    }

    /// Best-effort user-facing message into the cycle's thread.
    async fn notify(&self, text: &str) {
        if let Err(err) = self
            .slack
            .post_message(&self.event.channel, text, &self.target_ts)
            .await
        {
            tracing::error!("failed to deliver notice to {}: {err}", self.event.channel);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PromptFailure {
    NotConfigured,
    Empty,
    Unreadable,
}

impl PromptFailure {
    fn user_message(&self, user: &str) -> String {
        match self {
            Self::NotConfigured => format!(
                "Sorry, <@{user}>. This bot's system prompt is not configured. Please contact an administrator."
            ),
            Self::Empty => format!(
                "Sorry, <@{user}>. There is a problem with this bot's configuration (empty system prompt). Please contact an administrator."
            ),
            Self::Unreadable => format!(
                "Sorry, <@{user}>. Something went wrong while loading the bot configuration. Please contact an administrator."
            ),
        }
    }
}

/// Reads `system_prompt_<BOT_ID>.txt` fresh for this cycle and trims it.
async fn load_system_prompt(prompt_dir: &Path, bot_user_id: &str) -> Result<String, PromptFailure> {
    let path = prompt_dir.join(format!("system_prompt_{bot_user_id}.txt"));
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            let prompt = raw.trim().to_string();
            if prompt.is_empty() {
                tracing::error!("system prompt file is empty: {}", path.display());
                return Err(PromptFailure::Empty);
            }
            tracing::info!("system prompt loaded from {}", path.display());
            Ok(prompt)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("system prompt file not found: {}", path.display());
            Err(PromptFailure::NotConfigured)
        }
        Err(err) => {
            tracing::error!("failed to read system prompt file {}: {err}", path.display());
            Err(PromptFailure::Unreadable)
        }
    }
}

/// The question carried by a mention: the text minus the bot's own
/// mention token, or, when the token is absent, everything after the
/// first space.
fn extract_query(text: &str, bot_user_id: &str) -> String {
    let token = format!("<@{bot_user_id}>");
    if !bot_user_id.is_empty() && text.contains(&token) {
        text.replace(&token, "").trim().to_string()
    } else {
        match text.split_once(' ') {
            Some((_, rest)) => rest.trim().to_string(),
            None => String::new(),
        }
    }
}

/// Thread root all replies in this cycle target: the surrounding thread
/// when the mention happened inside one, else the mention itself.
fn thread_root(thread_ts: Option<&str>, ts: &str) -> String {
    match thread_ts {
        Some(root) if !root.is_empty() => root.to_string(),
        _ => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_query_strips_mention_token() {
        assert_eq!(extract_query("<@UBOT> what is 2+2?", "UBOT"), "what is 2+2?");
        assert_eq!(extract_query("<@UBOT> hi <@UBOT>", "UBOT"), "hi");
        assert_eq!(extract_query("<@UBOT>", "UBOT"), "");
    }

    #[test]
    fn extract_query_falls_back_to_first_space_split() {
        assert_eq!(extract_query("<@UOTHER> question", "UBOT"), "question");
        assert_eq!(extract_query("singleword", "UBOT"), "");
        assert_eq!(extract_query("lead rest of it", "UBOT"), "rest of it");
    }

    #[test]
    fn extract_query_keeps_inner_spacing_from_replacement() {
        assert_eq!(extract_query("hey <@UBOT> ping", "UBOT"), "hey  ping");
    }

    #[test]
    fn thread_root_prefers_existing_thread() {
        assert_eq!(
            thread_root(Some("1700000000.000500"), "1700000001.000100"),
            "1700000000.000500"
        );
        assert_eq!(thread_root(None, "1700000001.000100"), "1700000001.000100");
        assert_eq!(thread_root(Some(""), "1700000001.000100"), "1700000001.000100");
    }

    #[test]
    fn prompt_failure_messages_name_their_cause() {
        assert!(PromptFailure::NotConfigured
            .user_message("U1")
            .contains("not configured"));
        assert!(PromptFailure::Empty
            .user_message("U1")
            .contains("empty system prompt"));
        assert!(PromptFailure::Unreadable
            .user_message("U1")
            .contains("loading the bot configuration"));
        assert!(PromptFailure::Empty.user_message("U1").contains("<@U1>"));
    }

    #[tokio::test]
    async fn load_system_prompt_classifies_failures() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_system_prompt(dir.path(), "UBOT").await;
        assert_eq!(missing.unwrap_err(), PromptFailure::NotConfigured);

        std::fs::write(dir.path().join("system_prompt_UBOT.txt"), "  \n\t ").unwrap();
        let empty = load_system_prompt(dir.path(), "UBOT").await;
        assert_eq!(empty.unwrap_err(), PromptFailure::Empty);

        std::fs::write(
            dir.path().join("system_prompt_UBOT.txt"),
            "  You are a helpful bot.\n",
        )
        .unwrap();
        let loaded = load_system_prompt(dir.path(), "UBOT").await.unwrap();
        assert_eq!(loaded, "You are a helpful bot.");
    }
}
