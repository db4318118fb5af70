//! Transcript record parsing and interrupt detection.

use serde::Deserialize;

/// One NDJSON transcript record. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// Author kind: `user`, `assistant`, or anything else.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body, when present.
    #[serde(default)]
    pub message: Option<LogMessage>,
}

/// Message body of a transcript record.
#[derive(Debug, Clone, Deserialize)]
pub struct LogMessage {
    /// Plain text or a list of content items.
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Either shape a message's content may take.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content.
    Text(String),
    /// List of content items.
    Items(Vec<ContentItem>),
}

/// One content item.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    /// Bare string item.
    Text(String),
    /// Object item with an optional `text` field (e.g. `{"type":"text",...}`).
    Block {
        /// Text payload.
        #[serde(default)]
        text: Option<String>,
    },
    /// Anything else.
    Other(serde_json::Value),
}

impl LogEntry {
    /// Whether this is a user record containing `marker`.
    #[must_use]
    pub fn is_interrupt(&self, marker: &str) -> bool {
        if self.kind != "user" {
            return false;
        }
        let Some(content) = self.message.as_ref().and_then(|m| m.content.as_ref()) else {
            return false;
        };
        match content {
            MessageContent::Text(text) => text.contains(marker),
            MessageContent::Items(items) => items.iter().any(|item| match item {
                ContentItem::Text(text) => text.contains(marker),
                ContentItem::Block { text: Some(text) } => text.contains(marker),
                ContentItem::Block { text: None } | ContentItem::Other(_) => false,
            }),
        }
    }
}

/// Whether a single line is an interrupt record. Malformed lines are not.
#[must_use]
pub fn line_is_interrupt(line: &str, marker: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.contains(marker) {
        return false;
    }
    serde_json::from_str::<LogEntry>(trimmed).is_ok_and(|entry| entry.is_interrupt(marker))
}

/// Whether any line of `batch` is an interrupt record.
///
/// Stops at the first match.
#[must_use]
pub fn batch_has_interrupt<'a>(lines: impl IntoIterator<Item = &'a str>, marker: &str) -> bool {
    lines
        .into_iter()
        .any(|line| line_is_interrupt(line, marker))
}
