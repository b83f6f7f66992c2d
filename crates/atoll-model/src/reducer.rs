//! Phase transition logic for hook events.
//!
//! One handler per event kind, mirroring the session state machine:
//!
//! ```text
//! idle -> processing -> running_tool -> idle
//!                    \-> waiting_approval -> idle
//! SessionEnd -> completed (terminal for lifecycle; retained for queries)
//! ```
//!
//! Transitions not listed for an event kind are no-ops on phase. Two
//! coherence rules hold for every observable state: `waiting_approval` iff a
//! pending approval is set, and `running_tool` iff a tool is marked running.

use tracing::{debug, info, warn};

use atoll_core::{
    ApprovalId, ApprovalRequest, HookEventKind, SessionPhase, Timestamp, Tool, ToolStatus,
};
use atoll_events::Delta;

use crate::session::Session;

/// What reducing one event did.
pub(crate) enum ReduceOutcome {
    /// The event was applied; the store appends the closing
    /// `SessionUpserted` to these deltas.
    Applied(Vec<Delta>),
    /// The event was recognized but ignored (out-of-order duplicate); the
    /// session is untouched.
    Ignored,
}

/// Apply one recognized hook event to a session.
///
/// `approval_generation` is the generation token for a `PermissionRequest`,
/// minted by the hook endpoint so that its later close notification matches
/// exactly this approval. `None` mints a fresh one.
pub(crate) fn reduce(
    session: &mut Session,
    kind: &HookEventKind,
    approval_generation: Option<ApprovalId>,
) -> ReduceOutcome {
    match kind {
        HookEventKind::SessionStart => {
            session.phase = SessionPhase::Idle;
            info!(session = %session.id.short(), "session started");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::SessionEnd => session_end(session),
        HookEventKind::UserPromptSubmit => {
            session.phase = SessionPhase::Processing;
            debug!(session = %session.id.short(), "user prompt submitted");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::PreToolUse { tool_name, parameters } => {
            session.active_tool = Some(Tool::started(tool_name.clone(), parameters.clone()));
            session.phase = SessionPhase::RunningTool;
            debug!(session = %session.id.short(), tool = %tool_name, "tool started");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::PostToolUse { tool_name, result } => {
            post_tool_use(session, tool_name, result.clone())
        },
        HookEventKind::PermissionRequest { tool_name, parameters } => permission_request(
            session,
            tool_name,
            parameters.clone(),
            approval_generation,
        ),
        HookEventKind::Notification { message } => {
            debug!(session = %session.id.short(), message = %message, "notification");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::Stop | HookEventKind::SubagentStop => {
            session.active_tool = None;
            // A pending approval keeps the session in waiting_approval until
            // the decision or timeout lands.
            if session.pending_approval.is_none() {
                session.phase = SessionPhase::Idle;
            }
            debug!(session = %session.id.short(), "session stopped");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::PreCompact => {
            debug!(session = %session.id.short(), "context compaction starting");
            ReduceOutcome::Applied(Vec::new())
        },
        HookEventKind::Unknown => {
            // The store drops unknown kinds before reaching the reducer.
            ReduceOutcome::Ignored
        },
    }
}

fn session_end(session: &mut Session) -> ReduceOutcome {
    let mut deltas = Vec::new();
    session.active_tool = None;
    if session.pending_approval.take().is_some() {
        deltas.push(Delta::ApprovalClosed {
            session_id: session.id.clone(),
        });
    }
    session.phase = SessionPhase::Completed;
    info!(session = %session.id.short(), "session ended");
    ReduceOutcome::Applied(deltas)
}

fn post_tool_use(
    session: &mut Session,
    tool_name: &str,
    result: Option<serde_json::Value>,
) -> ReduceOutcome {
    let Some(mut tool) = session.active_tool.take_if(|tool| tool.name == tool_name) else {
        warn!(
            session = %session.id.short(),
            tool = %tool_name,
            "PostToolUse without matching active tool; ignoring"
        );
        return ReduceOutcome::Ignored;
    };

    tool.status = ToolStatus::Success;
    tool.end_time = Some(Timestamp::now());
    tool.result = result;
    session.tools.push(tool);
    session.phase = SessionPhase::Idle;
    debug!(session = %session.id.short(), tool = %tool_name, "tool completed");
    ReduceOutcome::Applied(Vec::new())
}

fn permission_request(
    session: &mut Session,
    tool_name: &str,
    parameters: Option<serde_json::Value>,
    generation: Option<ApprovalId>,
) -> ReduceOutcome {
    if let Some(previous) = &session.pending_approval {
        info!(
            session = %session.id.short(),
            superseded = %previous.tool_name,
            tool = %tool_name,
            "permission request supersedes pending approval"
        );
    }

    // The gated tool has not executed; it is represented by the pending
    // approval until the decision lands.
    session.active_tool = None;

    let mut request = ApprovalRequest::new(tool_name, parameters.clone());
    if let Some(id) = generation {
        request.id = id;
    }
    session.pending_approval = Some(request);
    session.phase = SessionPhase::WaitingApproval;
    info!(session = %session.id.short(), tool = %tool_name, "permission requested");

    ReduceOutcome::Applied(vec![Delta::ApprovalOpened {
        session_id: session.id.clone(),
        tool_name: tool_name.to_string(),
        parameters,
    }])
}
