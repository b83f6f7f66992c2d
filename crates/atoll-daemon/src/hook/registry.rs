//! Registry of hook calls held open for an approval decision.
//!
//! The registry task is the only owner of the pending-call map; connection
//! tasks and the frontend endpoint talk to it exclusively over its command
//! channel. At most one call is held per session — registering a second
//! resolves the first as superseded, exactly once.

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use atoll_core::{ApprovalId, Decision, SessionId};

/// How a held hook call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A frontend decided.
    Decided(Decision),
    /// A newer permission request for the same session replaced this one.
    Superseded,
    /// The daemon is shutting down.
    Shutdown,
}

/// Commands accepted by the registry task.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Hold a hook call until its approval resolves.
    Register {
        /// The session the approval belongs to.
        session_id: SessionId,
        /// Generation token of the approval this call carries.
        generation: ApprovalId,
        /// Resolved exactly once with the call's outcome.
        reply: oneshot::Sender<Resolution>,
    },
    /// Resolve the held call for a session with a user decision. A decision
    /// for a session with no held call is dropped silently — late and
    /// duplicate decisions are idempotent.
    Resolve {
        /// The session being decided.
        session_id: SessionId,
        /// The verdict.
        decision: Decision,
    },
    /// Drop a registration whose connection is done with it (timeout or
    /// broken writer). Matched by generation so a successor registration
    /// can never be cancelled by its predecessor's cleanup.
    Deregister {
        /// The session of the abandoned call.
        session_id: SessionId,
        /// Generation the abandoning connection holds.
        generation: ApprovalId,
    },
    /// Resolve every held call with [`Resolution::Shutdown`] and exit.
    Shutdown,
}

struct PendingHookCall {
    generation: ApprovalId,
    reply: oneshot::Sender<Resolution>,
}

/// Run the registry until shutdown (by command or channel closure); held
/// calls are swept with [`Resolution::Shutdown`] on the way out.
pub async fn run(mut commands: mpsc::Receiver<RegistryCommand>) {
    let mut pending: HashMap<SessionId, PendingHookCall> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RegistryCommand::Register {
                session_id,
                generation,
                reply,
            } => {
                let call = PendingHookCall { generation, reply };
                if let Some(previous) = pending.insert(session_id.clone(), call) {
                    info!(session = %session_id.short(), "held hook call superseded");
                    let _ = previous.reply.send(Resolution::Superseded);
                }
            },
            RegistryCommand::Resolve {
                session_id,
                decision,
            } => match pending.remove(&session_id) {
                Some(call) => {
                    info!(session = %session_id.short(), decision = %decision, "approval decided");
                    let _ = call.reply.send(Resolution::Decided(decision));
                },
                None => {
                    debug!(session = %session_id.short(), "decision for closed approval dropped");
                },
            },
            RegistryCommand::Deregister {
                session_id,
                generation,
            } => {
                if pending
                    .get(&session_id)
                    .is_some_and(|call| call.generation == generation)
                {
                    pending.remove(&session_id);
                }
            },
            RegistryCommand::Shutdown => break,
        }
    }

    for (_, call) in pending.drain() {
        let _ = call.reply.send(Resolution::Shutdown);
    }
    info!("approval registry stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> (mpsc::Sender<RegistryCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(rx));
        (tx, handle)
    }

    async fn register(
        tx: &mpsc::Sender<RegistryCommand>,
        session: &str,
    ) -> (ApprovalId, oneshot::Receiver<Resolution>) {
        let generation = ApprovalId::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(RegistryCommand::Register {
            session_id: SessionId::new(session),
            generation,
            reply: reply_tx,
        })
        .await
        .unwrap();
        (generation, reply_rx)
    }

    #[tokio::test]
    async fn test_resolve_delivers_decision() {
        let (tx, _handle) = registry().await;
        let (_, reply) = register(&tx, "A").await;

        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("A"),
            decision: Decision::Allow,
        })
        .await
        .unwrap();

        assert_eq!(reply.await.unwrap(), Resolution::Decided(Decision::Allow));
    }

    #[tokio::test]
    async fn test_second_registration_supersedes_first() {
        let (tx, _handle) = registry().await;
        let (_, first) = register(&tx, "A").await;
        let (_, second) = register(&tx, "A").await;

        assert_eq!(first.await.unwrap(), Resolution::Superseded);

        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("A"),
            decision: Decision::Deny,
        })
        .await
        .unwrap();
        assert_eq!(second.await.unwrap(), Resolution::Decided(Decision::Deny));
    }

    #[tokio::test]
    async fn test_late_decision_is_dropped() {
        let (tx, _handle) = registry().await;
        let (_, reply) = register(&tx, "A").await;

        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("A"),
            decision: Decision::Allow,
        })
        .await
        .unwrap();
        assert!(reply.await.is_ok());

        // Duplicate decision after resolution: accepted, no effect.
        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("A"),
            decision: Decision::Deny,
        })
        .await
        .unwrap();
        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("never-registered"),
            decision: Decision::Allow,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_deregister_matches_generation() {
        let (tx, _handle) = registry().await;
        let (stale, _first) = register(&tx, "A").await;
        let (_, second) = register(&tx, "A").await;

        // The superseded connection's cleanup must not cancel the successor.
        tx.send(RegistryCommand::Deregister {
            session_id: SessionId::new("A"),
            generation: stale,
        })
        .await
        .unwrap();

        tx.send(RegistryCommand::Resolve {
            session_id: SessionId::new("A"),
            decision: Decision::Allow,
        })
        .await
        .unwrap();
        assert_eq!(second.await.unwrap(), Resolution::Decided(Decision::Allow));
    }

    #[tokio::test]
    async fn test_shutdown_sweeps_held_calls() {
        let (tx, handle) = registry().await;
        let (_, one) = register(&tx, "A").await;
        let (_, two) = register(&tx, "B").await;

        tx.send(RegistryCommand::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert_eq!(one.await.unwrap(), Resolution::Shutdown);
        assert_eq!(two.await.unwrap(), Resolution::Shutdown);
    }
}
