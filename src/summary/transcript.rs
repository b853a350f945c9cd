//! Transcript formatting
//!
//! Turns fetched conversations into the text blob handed to the model.
//! Non-text events are dropped here, after date classification. Authors
//! are shown by display name when one is known, else by id.

use crate::models::{FetchOutcome, Message, TimeWindow};
use std::collections::HashMap;

/// Messages that carry visible text
pub fn text_messages<'a>(
    messages: &'a [Message],
) -> impl Iterator<Item = (&'a Message, &'a str)> + 'a {
    messages.iter().filter_map(|m| {
        m.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| (m, text))
    })
}

/// Ids of everyone who wrote visible text, in order of first appearance
pub fn text_authors<'a>(outcomes: &'a [FetchOutcome]) -> Vec<&'a str> {
    let mut authors: Vec<&str> = Vec::new();
    for outcome in outcomes {
        for (message, _) in text_messages(&outcome.messages) {
            if !authors.contains(&message.author_id.as_str()) {
                authors.push(&message.author_id);
            }
        }
    }
    authors
}

/// Format one conversation, oldest message first
pub fn format_conversation(outcome: &FetchOutcome, names: &HashMap<String, String>) -> String {
    let mut text = format!("## Conversation {}\n", outcome.route.conversation_id);

    for (message, body) in text_messages(&outcome.messages) {
        let author = names
            .get(&message.author_id)
            .map(String::as_str)
            .unwrap_or(&message.author_id);
        text.push_str(&format!(
            "[{}] {}: {}\n",
            message.created_at.format("%Y-%m-%d %H:%M"),
            author,
            body
        ));
    }

    text
}

/// Merge every conversation that has text into one transcript
pub fn build_transcript(outcomes: &[FetchOutcome], names: &HashMap<String, String>) -> String {
    outcomes
        .iter()
        .filter(|o| text_messages(&o.messages).next().is_some())
        .map(|o| format_conversation(o, names))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(window: &TimeWindow, transcript: &str) -> String {
    format!(
        r#"Create a digest of the chat history below.

It covers {} to {} (UTC).

Extract and summarize:
1. Main topics discussed
2. Decisions that were made
3. Action items and who owns them
4. Open questions or unresolved issues

CHAT HISTORY:
---
{}
---

DIGEST:"#,
        window.from().format("%Y-%m-%d %H:%M"),
        window.to().format("%Y-%m-%d %H:%M"),
        transcript
    )
}
