//! The per-session state record.

use atoll_core::{ApprovalRequest, Message, SessionId, SessionPhase, Timestamp, Tool};
use atoll_events::SessionSummary;

/// State held for one assistant session.
///
/// Sessions are created on the first hook event or log observation for
/// their id and retained for the lifetime of the daemon; `SessionEnd` marks
/// them [`SessionPhase::Completed`] but keeps the record queryable.
#[derive(Debug, Clone)]
pub struct Session {
    /// The session id.
    pub id: SessionId,
    /// Current execution phase.
    pub phase: SessionPhase,
    /// Tool currently executing, if any.
    pub active_tool: Option<Tool>,
    /// Completed tool invocations, in completion order.
    pub tools: Vec<Tool>,
    /// Permission request waiting on the user, if any.
    pub pending_approval: Option<ApprovalRequest>,
    /// Conversation messages read from the session's log.
    pub conversation: Vec<Message>,
    /// Whether the session's hook shim reported an interactive terminal.
    pub has_tty: bool,
    /// When the session was first observed.
    pub created_at: Timestamp,
    /// When the session last changed.
    pub updated_at: Timestamp,
}

impl Session {
    /// Create a fresh idle session.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            phase: SessionPhase::Idle,
            active_tool: None,
            tools: Vec::new(),
            pending_approval: None,
            conversation: Vec::new(),
            has_tty: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The one-row view served to frontends by `ListSessions`.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            phase: self.phase,
            has_pending_approval: self.pending_approval.is_some(),
            active_tool: self.active_tool.as_ref().map(|t| t.name.clone()),
            message_count: self.conversation.len(),
            has_tty: self.has_tty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle_and_empty() {
        let session = Session::new(SessionId::new("s1"));
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.active_tool.is_none());
        assert!(session.pending_approval.is_none());
        assert!(session.tools.is_empty());
        assert!(session.conversation.is_empty());
    }

    #[test]
    fn test_summary_reflects_state() {
        let mut session = Session::new(SessionId::new("s1"));
        session.conversation.push(Message::from(serde_json::json!({
            "type": "user",
            "content": "hi"
        })));
        session.has_tty = true;

        let summary = session.summary();
        assert_eq!(summary.id.as_str(), "s1");
        assert_eq!(summary.message_count, 1);
        assert!(!summary.has_pending_approval);
        assert!(summary.active_tool.is_none());
        assert!(summary.has_tty);
    }
}
