//! Typed change records published on the change bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use atoll_core::{Message, SessionId, SessionPhase};

/// One model change, as observed by bus subscribers.
///
/// Deltas emitted from the same producer event reach each subscriber in
/// submission order. A subscriber that falls behind sees [`Delta::Resync`]
/// and is expected to re-query the model for a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delta {
    /// A session was created or its phase changed.
    SessionUpserted {
        /// The session.
        session_id: SessionId,
        /// Phase after the change.
        phase: SessionPhase,
    },
    /// A permission request opened (or superseded the previous one).
    ApprovalOpened {
        /// The session.
        session_id: SessionId,
        /// Tool awaiting consent.
        tool_name: String,
        /// Tool input under review.
        parameters: Option<Value>,
    },
    /// The pending permission request resolved.
    ApprovalClosed {
        /// The session.
        session_id: SessionId,
    },
    /// A conversation message was appended.
    MessageAppended {
        /// The session.
        session_id: SessionId,
        /// The new message.
        message: Message,
    },
    /// Synthetic marker: the subscriber missed deltas and must re-query.
    Resync,
}

impl Delta {
    /// The session this delta concerns, when it concerns one.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::SessionUpserted { session_id, .. }
            | Self::ApprovalOpened { session_id, .. }
            | Self::ApprovalClosed { session_id }
            | Self::MessageAppended { session_id, .. } => Some(session_id),
            Self::Resync => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_accessor() {
        let delta = Delta::ApprovalClosed {
            session_id: SessionId::new("s1"),
        };
        assert_eq!(delta.session_id().unwrap().as_str(), "s1");
        assert!(Delta::Resync.session_id().is_none());
    }

    #[test]
    fn test_serde_tagging() {
        let delta = Delta::SessionUpserted {
            session_id: SessionId::new("s1"),
            phase: SessionPhase::Idle,
        };
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["kind"], "session_upserted");
        assert_eq!(json["phase"], "idle");
    }
}
