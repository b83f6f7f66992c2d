//! The hook wire envelope.
//!
//! The assistant's runtime invokes a hook shim at well-defined lifecycle
//! points; the shim forwards each event to the daemon as a single JSON
//! object over the hook socket. `HookEvent` is that object, with the
//! kind-specific fields captured by [`HookEventKind`].
//!
//! Unrecognized `type` values deserialize to [`HookEventKind::Unknown`] so
//! that a newer assistant cannot desync the daemon's state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::SessionId;

/// Errors produced while decoding a hook payload.
#[derive(Debug, Error)]
pub enum HookEventError {
    /// The payload was not a valid JSON hook event.
    #[error("invalid hook payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload had no usable `session_id`.
    #[error("hook event missing session_id (type {kind})")]
    MissingSessionId {
        /// The payload's `type` field, for the log line.
        kind: String,
    },
}

/// Kind-specific portion of a hook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HookEventKind {
    /// A session has started (or re-entered the foreground).
    SessionStart,
    /// The session has ended.
    SessionEnd,
    /// The user submitted a prompt.
    UserPromptSubmit,
    /// A tool invocation is about to run.
    PreToolUse {
        /// Name of the tool.
        tool_name: String,
        /// Tool input.
        #[serde(default)]
        parameters: Option<Value>,
    },
    /// A tool invocation finished.
    PostToolUse {
        /// Name of the tool.
        tool_name: String,
        /// Tool output.
        #[serde(default)]
        result: Option<Value>,
    },
    /// A tool invocation needs user consent before it may run.
    PermissionRequest {
        /// Name of the tool.
        tool_name: String,
        /// Tool input under review.
        #[serde(default)]
        parameters: Option<Value>,
    },
    /// Informational notice from the assistant.
    Notification {
        /// Human-readable notice text.
        #[serde(default)]
        message: String,
    },
    /// The assistant stopped responding to the current prompt.
    Stop,
    /// A subagent stopped.
    SubagentStop,
    /// Context compaction is about to run.
    PreCompact,
    /// Any `type` value this daemon does not recognize.
    #[serde(other)]
    Unknown,
}

impl HookEventKind {
    /// Stable name for log lines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PreToolUse { .. } => "PreToolUse",
            Self::PostToolUse { .. } => "PostToolUse",
            Self::PermissionRequest { .. } => "PermissionRequest",
            Self::Notification { .. } => "Notification",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this kind requires holding the hook connection open for a
    /// decision.
    #[must_use]
    pub fn wants_approval(&self) -> bool {
        matches!(self, Self::PermissionRequest { .. })
    }
}

/// One hook invocation as received over the hook socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// The session this event belongs to.
    pub session_id: SessionId,
    /// Whether the hook shim detected an interactive terminal on its side.
    #[serde(default)]
    pub has_tty: bool,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: HookEventKind,
}

impl HookEvent {
    /// Decode a hook payload.
    ///
    /// Events without a non-empty `session_id` are rejected with
    /// [`HookEventError::MissingSessionId`]; the caller drops them with a
    /// warning and they never reach the model.
    ///
    /// # Errors
    ///
    /// Returns [`HookEventError::Json`] for malformed payloads and
    /// [`HookEventError::MissingSessionId`] for events with no session.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HookEventError> {
        let raw: Value = serde_json::from_slice(bytes)?;
        let has_session = raw
            .get("session_id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_session {
            let kind = raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("<missing>")
                .to_string();
            return Err(HookEventError::MissingSessionId { kind });
        }
        Ok(serde_json::from_value(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_start() {
        let event =
            HookEvent::from_slice(br#"{"type":"SessionStart","session_id":"abc"}"#).unwrap();
        assert_eq!(event.session_id.as_str(), "abc");
        assert!(!event.has_tty);
        assert!(matches!(event.kind, HookEventKind::SessionStart));
    }

    #[test]
    fn test_parse_pre_tool_use() {
        let event = HookEvent::from_slice(
            br#"{"type":"PreToolUse","session_id":"abc","tool_name":"Read","parameters":{"file_path":"/x"},"has_tty":true}"#,
        )
        .unwrap();
        assert!(event.has_tty);
        let HookEventKind::PreToolUse { tool_name, parameters } = event.kind else {
            panic!("expected PreToolUse");
        };
        assert_eq!(tool_name, "Read");
        assert_eq!(parameters.unwrap()["file_path"], "/x");
    }

    #[test]
    fn test_parse_permission_request_without_parameters() {
        let event = HookEvent::from_slice(
            br#"{"type":"PermissionRequest","session_id":"abc","tool_name":"Bash"}"#,
        )
        .unwrap();
        assert!(event.kind.wants_approval());
        let HookEventKind::PermissionRequest { tool_name, parameters } = event.kind else {
            panic!("expected PermissionRequest");
        };
        assert_eq!(tool_name, "Bash");
        assert!(parameters.is_none());
    }

    #[test]
    fn test_unknown_kind_is_benign() {
        let event =
            HookEvent::from_slice(br#"{"type":"BrandNewThing","session_id":"abc","x":1}"#).unwrap();
        assert!(matches!(event.kind, HookEventKind::Unknown));
        assert_eq!(event.kind.name(), "Unknown");
    }

    #[test]
    fn test_missing_session_id_is_rejected() {
        let err = HookEvent::from_slice(br#"{"type":"Stop"}"#).unwrap_err();
        assert!(matches!(
            err,
            HookEventError::MissingSessionId { ref kind } if kind == "Stop"
        ));

        let err = HookEvent::from_slice(br#"{"type":"Stop","session_id":""}"#).unwrap_err();
        assert!(matches!(err, HookEventError::MissingSessionId { .. }));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            HookEvent::from_slice(b"{nope"),
            Err(HookEventError::Json(_))
        ));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let event = HookEvent::from_slice(
            br#"{"type":"Notification","session_id":"abc","message":"hi","cwd":"/tmp"}"#,
        )
        .unwrap();
        let HookEventKind::Notification { message } = event.kind else {
            panic!("expected Notification");
        };
        assert_eq!(message, "hi");
    }
}
