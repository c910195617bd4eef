//! Normalizes raw thread messages into the speaker-tagged timeline that
//! gets embedded into the model prompt.

use crate::slack::SlackMessage;
use serde::{Deserialize, Serialize};

/// Tag used for messages authored by this bot or any other bot.
const BOT_TAG: &str = "bot";

/// One line of the conversation as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub from: String,
    pub message: String,
}

/// Builds the ordered timeline from thread history, oldest first.
///
/// Messages with no resolvable sender are dropped, as are messages whose
/// text is empty once the bot's own mention token is stripped. Dropping
/// is normal filtering here, not an error.
pub fn build_timeline(messages: &[SlackMessage], bot_user_id: &str) -> Vec<TimelineEntry> {
    let mut entries = Vec::with_capacity(messages.len());
    for msg in messages {
        let from = if msg.user.as_deref() == Some(bot_user_id) || msg.bot_id.is_some() {
            BOT_TAG.to_string()
        } else if let Some(user) = msg.user.as_deref() {
            format!("<@{user}>")
        } else {
            tracing::debug!("skipping thread message without a sender (ts: {})", msg.ts);
            continue;
        };
        let message = strip_self_mention(&msg.text, bot_user_id);
        if message.is_empty() {
            tracing::debug!("skipping thread message with empty text (ts: {})", msg.ts);
            continue;
        }
        entries.push(TimelineEntry { from, message });
    }
    entries
}

/// Removes every occurrence of the bot's own `<@ID>` token and trims the
/// remainder.
pub fn strip_self_mention(text: &str, bot_user_id: &str) -> String {
    let trimmed = text.trim();
    if bot_user_id.is_empty() {
        return trimmed.to_string();
    }
    let token = format!("<@{bot_user_id}>");
    if trimmed.contains(&token) {
        trimmed.replace(&token, "").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Timeline for a mention outside any thread: just the current question,
/// tagged with its author.
pub fn single_entry(user_id: &str, message: &str) -> Vec<TimelineEntry> {
    vec![TimelineEntry {
        from: format!("<@{user_id}>"),
        message: message.to_string(),
    }]
}

/// Canonical serialization embedded into prompts: pretty-printed with
/// two-space indentation, non-ASCII characters left verbatim.
pub fn to_canonical_json(entries: &[TimelineEntry]) -> String {
    serde_json::to_string_pretty(entries).unwrap_or_else(|_| String::from("[]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(user: Option<&str>, bot_id: Option<&str>, text: &str) -> SlackMessage {
        SlackMessage {
            text: text.to_string(),
            user: user.map(String::from),
            bot_id: bot_id.map(String::from),
            ts: "1700000000.000100".to_string(),
        }
    }

    #[test]
    fn tags_bot_and_human_speakers() {
        let messages = vec![
            msg(Some("U111"), None, "what is rust?"),
            msg(Some("UBOT"), None, "A systems language."),
            msg(None, Some("B042"), "workflow ping"),
        ];
        let timeline = build_timeline(&messages, "UBOT");
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].from, "<@U111>");
        assert_eq!(timeline[1].from, "bot");
        assert_eq!(timeline[2].from, "bot");
    }

    #[test]
    fn drops_senderless_messages() {
        let messages = vec![msg(None, None, "ghost"), msg(Some("U111"), None, "real")];
        let timeline = build_timeline(&messages, "UBOT");
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].message, "real");
    }

    #[test]
    fn strips_self_mention_and_drops_emptied_messages() {
        let messages = vec![
            msg(Some("U111"), None, "<@UBOT> hello there"),
            msg(Some("U222"), None, "<@UBOT>"),
            msg(Some("U333"), None, "   "),
        ];
        let timeline = build_timeline(&messages, "UBOT");
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].message, "hello there");
    }

    #[test]
    fn strip_self_mention_removes_every_occurrence() {
        assert_eq!(
            strip_self_mention("<@UBOT> ping <@UBOT> pong", "UBOT"),
            "ping  pong"
        );
        assert_eq!(strip_self_mention("  plain text  ", "UBOT"), "plain text");
        assert_eq!(strip_self_mention("<@UOTHER> hi", "UBOT"), "<@UOTHER> hi");
        assert_eq!(strip_self_mention(" keep all ", ""), "keep all");
    }

    #[test]
    fn canonical_json_is_pretty_and_exact() {
        let timeline = single_entry("U1", "hi");
        assert_eq!(
            to_canonical_json(&timeline),
            "[\n  {\n    \"from\": \"<@U1>\",\n    \"message\": \"hi\"\n  }\n]"
        );
        assert_eq!(to_canonical_json(&[]), "[]");
    }

    #[test]
    fn canonical_json_keeps_non_ascii_verbatim() {
        let timeline = single_entry("U1", "안녕하세요 👋");
        let json = to_canonical_json(&timeline);
        assert!(json.contains("안녕하세요 👋"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let messages = vec![
            msg(Some("U111"), None, "first"),
            msg(Some("UBOT"), None, "second"),
            msg(Some("U111"), None, "<@UBOT> third"),
        ];
        let a = to_canonical_json(&build_timeline(&messages, "UBOT"));
        let b = to_canonical_json(&build_timeline(&messages, "UBOT"));
        assert_eq!(a, b);
    }
}
