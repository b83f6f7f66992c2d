//! Frontend IPC protocol shapes.
//!
//! UI clients talk to the daemon over a local socket using length-prefixed
//! JSON frames. A client sends [`FrontendCall`]s and receives
//! [`FrontendFrame`]s: replies correlated by call id, interleaved with
//! pushed [`FrontendEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use atoll_core::{Decision, Message, SessionId, SessionPhase};

/// Requests a frontend may make.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum FrontendRequest {
    /// List every known session.
    ListSessions,
    /// Fetch one session's conversation.
    GetConversation {
        /// The session to fetch.
        session_id: SessionId,
    },
    /// Resolve a pending permission request.
    SubmitDecision {
        /// The session whose approval is being decided.
        session_id: SessionId,
        /// The user's verdict.
        decision: Decision,
    },
    /// Query daemon health.
    Health,
}

/// A request envelope with a client-chosen correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendCall {
    /// Correlation id echoed back in the reply.
    pub id: u64,
    /// The request itself.
    #[serde(flatten)]
    pub request: FrontendRequest,
}

/// Reply payloads, one per request method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum FrontendReply {
    /// Result of `ListSessions`.
    Sessions(Vec<SessionSummary>),
    /// Result of `GetConversation`. Unknown sessions yield an empty list.
    Conversation(Vec<Message>),
    /// Acknowledgement of `SubmitDecision`. Decisions against a closed
    /// approval are acknowledged and dropped.
    Ack,
    /// Result of `Health`.
    Health(HealthReport),
    /// The request could not be decoded or handled.
    Error(String),
}

/// One row of `ListSessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// The session.
    pub id: SessionId,
    /// Current phase.
    pub phase: SessionPhase,
    /// Whether a permission request is waiting on the user.
    pub has_pending_approval: bool,
    /// Name of the tool currently executing, if any.
    pub active_tool: Option<String>,
    /// Number of conversation messages held for the session.
    pub message_count: usize,
    /// Whether the session's hook shim reported an interactive terminal.
    pub has_tty: bool,
}

/// Daemon health as reported to frontends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the sessions-root watcher is registered and delivering.
    pub watcher_ok: bool,
    /// Number of sessions in the model.
    pub session_count: usize,
    /// Number of live delta subscribers.
    pub subscriber_count: usize,
}

/// Events pushed to every connected frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FrontendEvent {
    /// A session appeared or changed phase.
    SessionStateChanged {
        /// The session.
        session_id: SessionId,
        /// Phase after the change.
        phase: SessionPhase,
    },
    /// A permission request is waiting on the user.
    PermissionRequest {
        /// The session.
        session_id: SessionId,
        /// Tool awaiting consent.
        tool_name: String,
        /// Tool input under review.
        parameters: Option<Value>,
    },
    /// A conversation message was appended.
    NewMessage {
        /// The session.
        session_id: SessionId,
        /// The new message.
        message: Message,
    },
    /// The client missed updates (or the daemon is shutting down) and must
    /// re-query.
    Resync,
}

/// One server-to-client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum FrontendFrame {
    /// Reply to a [`FrontendCall`].
    Reply {
        /// Correlation id of the call being answered.
        id: u64,
        /// The reply payload.
        reply: FrontendReply,
    },
    /// A pushed event.
    Event {
        /// The event payload.
        event: FrontendEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_wire_shape() {
        let call = FrontendCall {
            id: 7,
            request: FrontendRequest::GetConversation {
                session_id: SessionId::new("s1"),
            },
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "GetConversation");
        assert_eq!(json["params"]["session_id"], "s1");

        let back: FrontendCall = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, 7);
    }

    #[test]
    fn test_submit_decision_round_trip() {
        let raw = r#"{"id":1,"method":"SubmitDecision","params":{"session_id":"b","decision":"allow"}}"#;
        let call: FrontendCall = serde_json::from_str(raw).unwrap();
        let FrontendRequest::SubmitDecision { session_id, decision } = call.request else {
            panic!("expected SubmitDecision");
        };
        assert_eq!(session_id.as_str(), "b");
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_event_frame_tagging() {
        let frame = FrontendFrame::Event {
            event: FrontendEvent::Resync,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["frame"], "event");
        assert_eq!(json["event"]["event"], "resync");
    }
}
