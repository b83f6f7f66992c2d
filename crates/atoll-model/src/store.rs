//! Centralized session state.
//!
//! All mutations flow through the `apply_*` methods, which return the
//! [`Delta`]s they produced; the caller (the daemon's mutator task) publishes
//! them on the change bus after releasing its write guard. Reads return
//! references; callers clone what they need to keep snapshots consistent.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use atoll_core::{ApprovalId, HookEvent, HookEventKind, Message, SessionId, SessionPhase, Timestamp};
use atoll_events::{Delta, SessionSummary};

use crate::reducer::{self, ReduceOutcome};
use crate::session::Session;

/// The authoritative map of observed sessions.
///
/// Sessions are created on first observation (hook event or log activity)
/// and never evicted; a completed session stays queryable.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one session.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// All sessions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// One-row summaries for every session, oldest first.
    #[must_use]
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.list().into_iter().map(Session::summary).collect()
    }

    /// Number of known sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Apply one hook event.
    ///
    /// Unknown event kinds are discarded with a warning and change nothing —
    /// not even session creation — so they are invisible to replay. Every
    /// applied event emits at least a `SessionUpserted` delta.
    ///
    /// `approval_generation` carries the hook endpoint's generation token
    /// for a `PermissionRequest` (see [`SessionStore::close_approval`]).
    pub fn apply_hook_event(
        &mut self,
        event: &HookEvent,
        approval_generation: Option<ApprovalId>,
    ) -> Vec<Delta> {
        if matches!(event.kind, HookEventKind::Unknown) {
            warn!(
                session = %event.session_id.short(),
                "discarding unrecognized hook event kind"
            );
            return Vec::new();
        }

        let created = !self.sessions.contains_key(&event.session_id);
        let session = self
            .sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| {
                info!(session = %event.session_id.short(), "created session");
                Session::new(event.session_id.clone())
            });

        match reducer::reduce(session, &event.kind, approval_generation) {
            ReduceOutcome::Applied(mut deltas) => {
                session.has_tty = event.has_tty;
                session.updated_at = Timestamp::now();
                deltas.push(Delta::SessionUpserted {
                    session_id: session.id.clone(),
                    phase: session.phase,
                });
                deltas
            },
            ReduceOutcome::Ignored if created => vec![Delta::SessionUpserted {
                session_id: session.id.clone(),
                phase: session.phase,
            }],
            ReduceOutcome::Ignored => Vec::new(),
        }
    }

    /// Apply a batch of tailed log messages.
    ///
    /// `reset` empties the conversation before appending, in the same delta
    /// batch, so readers never observe pre-reset and post-reset messages
    /// together.
    pub fn apply_log_update(
        &mut self,
        session_id: &SessionId,
        reset: bool,
        messages: Vec<Message>,
    ) -> Vec<Delta> {
        let session = self.sessions.entry(session_id.clone()).or_insert_with(|| {
            info!(session = %session_id.short(), "created session from log activity");
            Session::new(session_id.clone())
        });

        let mut messages = messages;
        if reset {
            // A rewound tailer re-delivers the post-marker tail it already
            // handed us; when the held conversation is a prefix of the
            // incoming batch, only the new suffix is appended.
            if !session.conversation.is_empty()
                && messages.len() >= session.conversation.len()
                && session
                    .conversation
                    .iter()
                    .zip(messages.iter())
                    .all(|(held, incoming)| held == incoming)
            {
                messages.drain(..session.conversation.len());
            } else {
                debug!(
                    session = %session_id.short(),
                    dropped = session.conversation.len(),
                    "conversation reset"
                );
                session.conversation.clear();
            }
        }

        if messages.is_empty() && !(reset && session.conversation.is_empty()) {
            return Vec::new();
        }

        let mut deltas = Vec::new();
        for message in messages {
            session.conversation.push(message.clone());
            deltas.push(Delta::MessageAppended {
                session_id: session.id.clone(),
                message,
            });
        }

        session.updated_at = Timestamp::now();
        deltas.push(Delta::SessionUpserted {
            session_id: session.id.clone(),
            phase: session.phase,
        });
        deltas
    }

    /// Close the pending approval for a session.
    ///
    /// Called when the hook endpoint resolved (or abandoned) the held hook
    /// call. `generation` guards against racing a successor approval: a
    /// close for a superseded generation is a no-op. `None` closes whatever
    /// is pending.
    pub fn close_approval(
        &mut self,
        session_id: &SessionId,
        generation: Option<ApprovalId>,
    ) -> Vec<Delta> {
        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(session = %session_id.short(), "approval close for unknown session");
            return Vec::new();
        };

        let matches = match (&session.pending_approval, generation) {
            (Some(pending), Some(generation)) => pending.id == generation,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            debug!(session = %session_id.short(), "stale approval close ignored");
            return Vec::new();
        }

        session.pending_approval = None;
        if session.phase == SessionPhase::WaitingApproval {
            session.phase = SessionPhase::Idle;
        }
        session.updated_at = Timestamp::now();

        vec![
            Delta::ApprovalClosed {
                session_id: session.id.clone(),
            },
            Delta::SessionUpserted {
                session_id: session.id.clone(),
                phase: session.phase,
            },
        ]
    }
}
