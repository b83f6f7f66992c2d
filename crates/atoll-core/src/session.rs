//! Session state vocabulary: phases, tool records, and approvals.
//!
//! These types live in `atoll-core` so that the model, the change bus, and
//! the frontend protocol can all reference them without a circular
//! dependency.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::types::Timestamp;

/// Execution phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for user input.
    Idle,
    /// The assistant is working on a prompt.
    Processing,
    /// A tool invocation is in flight.
    RunningTool,
    /// Blocked on a user approval decision.
    WaitingApproval,
    /// The session has ended; retained for queries.
    Completed,
    /// The session failed.
    Error,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
            Self::RunningTool => write!(f, "running_tool"),
            Self::WaitingApproval => write!(f, "waiting_approval"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Outcome status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Still executing.
    Running,
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Error,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One tool invocation, bracketed by `PreToolUse` and `PostToolUse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name as reported by the assistant.
    pub name: String,
    /// Current status.
    pub status: ToolStatus,
    /// When the invocation started.
    pub start_time: Timestamp,
    /// When the invocation finished, once it has.
    pub end_time: Option<Timestamp>,
    /// Tool input, as reported in `PreToolUse`.
    pub parameters: Option<Value>,
    /// Tool output, as reported in `PostToolUse`.
    pub result: Option<Value>,
}

impl Tool {
    /// Start a new running tool record.
    #[must_use]
    pub fn started(name: impl Into<String>, parameters: Option<Value>) -> Self {
        Self {
            name: name.into(),
            status: ToolStatus::Running,
            start_time: Timestamp::now(),
            end_time: None,
            parameters,
            result: None,
        }
    }
}

/// Generation token for a pending approval.
///
/// Each `PermissionRequest` mints a fresh id; decisions are matched against
/// the live generation so a late decision against a closed approval is a
/// harmless no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub Uuid);

impl ApprovalId {
    /// Mint a new approval generation.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "approval:{}", self.0)
    }
}

/// A tool invocation waiting on user consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Generation token for this request.
    pub id: ApprovalId,
    /// Tool the assistant wants to run.
    pub tool_name: String,
    /// Tool input under review.
    pub parameters: Option<Value>,
    /// When the request was received.
    pub requested_at: Timestamp,
}

impl ApprovalRequest {
    /// Open a new approval request for the given tool.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, parameters: Option<Value>) -> Self {
        Self {
            id: ApprovalId::new(),
            tool_name: tool_name.into(),
            parameters,
            requested_at: Timestamp::now(),
        }
    }
}

/// A user's verdict on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Let the tool run.
    Allow,
    /// Block the tool.
    Deny,
}

impl Decision {
    /// Wire representation (`"allow"` / `"deny"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
