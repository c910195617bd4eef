//! Assembles the single prompt string sent to the model: system prompt,
//! blank line, then an instruction block built around the timeline.

/// Combines the per-bot system prompt, the serialized timeline, and the
/// latest question.
///
/// A timeline that is exactly the empty array gets the direct-question
/// phrasing with no JSON block. Anything else, including a string that
/// fails to parse as a non-empty array, is embedded verbatim in a fenced
/// block with the answer-the-last-message phrasing. No truncation happens
/// here.
pub fn assemble(system_prompt: &str, timeline_json: &str, latest_query: &str) -> String {
    let empty_timeline = match serde_json::from_str::<serde_json::Value>(timeline_json) {
        Ok(serde_json::Value::Array(entries)) => entries.is_empty(),
        _ => true,
    };

    let instruction = if empty_timeline && timeline_json == "[]" {
        format!("Please answer the following question directly:\n\n{latest_query}")
    } else {
        format!(
            "Here is the conversation so far:\n```json\n{timeline_json}\n```\nPlease answer the last message in the timeline above."
        )
    };

    format!("{system_prompt}\n\n{instruction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_asks_directly() {
        let prompt = assemble("You are helpful.", "[]", "hello");
        assert_eq!(
            prompt,
            "You are helpful.\n\nPlease answer the following question directly:\n\nhello"
        );
        assert!(!prompt.contains("```json"));
    }

    #[test]
    fn valid_timeline_is_embedded_verbatim() {
        let timeline = "[\n  {\n    \"from\": \"<@U1>\",\n    \"message\": \"hi\"\n  }\n]";
        let prompt = assemble("SYS", timeline, "hi");
        assert!(prompt.starts_with("SYS\n\n"));
        assert!(prompt.contains(&format!("```json\n{timeline}\n```")));
        assert!(prompt.ends_with("Please answer the last message in the timeline above."));
        assert!(!prompt.contains("answer the following question"));
    }

    #[test]
    fn malformed_timeline_is_embedded_raw() {
        let prompt = assemble("SYS", "{not json", "q");
        assert!(prompt.contains("```json\n{not json\n```"));
        assert!(prompt.contains("last message"));
    }

    #[test]
    fn degenerate_but_not_literal_empty_array_still_gets_fence() {
        for odd in ["{}", "[ ]", "\"text\"", ""] {
            let prompt = assemble("SYS", odd, "q");
            assert!(prompt.contains("```json"), "expected fence for {odd:?}");
        }
    }
}
