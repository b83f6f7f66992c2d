//! Opaque conversation message records.
//!
//! Messages are single JSON records read from a session's append-only
//! `conversation.jsonl`. Atoll does not interpret their full structure; it
//! only inspects the `type` and `content` fields to detect conversation
//! reset markers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed line of a session's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub Value);

impl Message {
    /// Parse a single log line.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if the line is not valid JSON.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line).map(Self)
    }

    /// The record's `type` field, if present and a string.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The record's `content` field, if present and a string.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.0.get("content").and_then(Value::as_str)
    }

    /// Whether this record asks for the conversation history to be dropped:
    /// a user message whose content begins with `/clear`.
    #[must_use]
    pub fn is_reset_marker(&self) -> bool {
        self.kind() == Some("user")
            && self
                .content()
                .is_some_and(|c| c.trim().starts_with("/clear"))
    }

    /// The raw record.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_line() {
        let msg = Message::parse_line(r#"{"type":"user","content":"hello"}"#).unwrap();
        assert_eq!(msg.kind(), Some("user"));
        assert_eq!(msg.content(), Some("hello"));
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(Message::parse_line("{not json").is_err());
    }

    #[test]
    fn test_reset_marker() {
        let clear = Message::from(json!({"type": "user", "content": "/clear"}));
        assert!(clear.is_reset_marker());

        let padded = Message::from(json!({"type": "user", "content": "  /clear please"}));
        assert!(padded.is_reset_marker());

        let assistant = Message::from(json!({"type": "assistant", "content": "/clear"}));
        assert!(!assistant.is_reset_marker());

        let chatter = Message::from(json!({"type": "user", "content": "do not /clear"}));
        assert!(!chatter.is_reset_marker());

        let structured = Message::from(json!({"type": "user", "content": {"blocks": []}}));
        assert!(!structured.is_reset_marker());
    }

    #[test]
    fn test_missing_fields() {
        let msg = Message::from(json!({"role": "user"}));
        assert_eq!(msg.kind(), None);
        assert_eq!(msg.content(), None);
        assert!(!msg.is_reset_marker());
    }
}
