//! The mutator task: the single writer of the session model.
//!
//! Every producer (hook connections, the watcher bridge, approval
//! resolution) submits a [`StoreCommand`] over one bounded channel; this
//! task serializes their application to the [`SessionStore`] and publishes
//! the resulting deltas on the change bus after releasing the write guard.
//! Reads elsewhere take the lock's read half and see consistent snapshots.

use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use atoll_core::{ApprovalId, HookEvent, SessionId};
use atoll_events::ChangeBus;
use atoll_model::SessionStore;
use atoll_watch::LogUpdate;

/// The session model, shared between the mutator (write) and the frontend
/// endpoint (read).
pub type SharedStore = Arc<RwLock<SessionStore>>;

/// Commands accepted by the mutator task.
#[derive(Debug)]
pub enum StoreCommand {
    /// Apply a hook event.
    Hook {
        /// The decoded event.
        event: HookEvent,
        /// Generation token minted by the hook endpoint for a
        /// `PermissionRequest`, so its later close matches exactly this
        /// approval.
        approval_generation: Option<ApprovalId>,
        /// Signalled once the event is applied and its deltas published;
        /// the hook endpoint awaits this before acknowledging the shim.
        applied: Option<oneshot::Sender<()>>,
    },
    /// Apply a batch of tailed log messages.
    Log(LogUpdate),
    /// The hook endpoint resolved (or abandoned) a held approval.
    ApprovalClosed {
        /// The session whose approval resolved.
        session_id: SessionId,
        /// The generation that resolved; a mismatch (superseded approval)
        /// is a no-op.
        generation: ApprovalId,
    },
    /// Drain the channel and exit.
    Shutdown,
}

/// Run the mutator until shutdown.
///
/// On [`StoreCommand::Shutdown`] the channel is closed and every command
/// already queued is applied before the task exits.
pub async fn run(store: SharedStore, bus: ChangeBus, mut commands: mpsc::Receiver<StoreCommand>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, StoreCommand::Shutdown) {
            commands.close();
            while let Some(command) = commands.recv().await {
                apply(&store, &bus, command).await;
            }
            break;
        }
        apply(&store, &bus, command).await;
    }
    info!("mutator stopped");
}

async fn apply(store: &SharedStore, bus: &ChangeBus, command: StoreCommand) {
    let (deltas, applied) = {
        let mut guard = store.write().await;
        match command {
            StoreCommand::Hook {
                event,
                approval_generation,
                applied,
            } => (guard.apply_hook_event(&event, approval_generation), applied),
            StoreCommand::Log(update) => (
                guard.apply_log_update(&update.session_id, update.reset, update.messages),
                None,
            ),
            StoreCommand::ApprovalClosed {
                session_id,
                generation,
            } => (guard.close_approval(&session_id, Some(generation)), None),
            StoreCommand::Shutdown => (Vec::new(), None),
        }
    };

    for delta in deltas {
        bus.publish(delta);
    }
    if let Some(applied) = applied {
        let _ = applied.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_core::SessionPhase;
    use atoll_events::Delta;
    use serde_json::json;

    fn hook(raw: serde_json::Value) -> StoreCommand {
        StoreCommand::Hook {
            event: serde_json::from_value(raw).unwrap(),
            approval_generation: None,
            applied: None,
        }
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order_and_published() {
        let store: SharedStore = Arc::new(RwLock::new(SessionStore::new()));
        let bus = ChangeBus::new();
        let mut deltas = bus.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(run(store.clone(), bus.clone(), rx));

        tx.send(hook(json!({"type": "SessionStart", "session_id": "A"})))
            .await
            .unwrap();
        tx.send(hook(json!({"type": "UserPromptSubmit", "session_id": "A"})))
            .await
            .unwrap();

        let first = deltas.recv().await.unwrap();
        assert!(matches!(
            *first,
            Delta::SessionUpserted { phase: SessionPhase::Idle, .. }
        ));
        let second = deltas.recv().await.unwrap();
        assert!(matches!(
            *second,
            Delta::SessionUpserted { phase: SessionPhase::Processing, .. }
        ));

        tx.send(StoreCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_applied_signal_fires_after_publication() {
        let store: SharedStore = Arc::new(RwLock::new(SessionStore::new()));
        let bus = ChangeBus::new();
        let mut deltas = bus.subscribe();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run(store.clone(), bus.clone(), rx));

        let (applied_tx, applied_rx) = oneshot::channel();
        tx.send(StoreCommand::Hook {
            event: serde_json::from_value(
                json!({"type": "PermissionRequest", "session_id": "B", "tool_name": "Bash"}),
            )
            .unwrap(),
            approval_generation: Some(ApprovalId::new()),
            applied: Some(applied_tx),
        })
        .await
        .unwrap();

        applied_rx.await.unwrap();

        // The model already holds the pending approval.
        assert!(
            store
                .read()
                .await
                .get(&SessionId::new("B"))
                .unwrap()
                .pending_approval
                .is_some()
        );
        // And its deltas are already on the bus.
        let first = deltas.try_recv().unwrap();
        assert!(matches!(*first, Delta::ApprovalOpened { .. }));

        tx.send(StoreCommand::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_commands() {
        let store: SharedStore = Arc::new(RwLock::new(SessionStore::new()));
        let bus = ChangeBus::new();
        let (tx, rx) = mpsc::channel(16);

        // Queue work and the shutdown before the task starts, so everything
        // is already buffered.
        tx.send(hook(json!({"type": "SessionStart", "session_id": "A"})))
            .await
            .unwrap();
        tx.send(StoreCommand::Shutdown).await.unwrap();
        tx.send(hook(json!({"type": "SessionStart", "session_id": "B"})))
            .await
            .unwrap();

        run(store.clone(), bus, rx).await;

        let guard = store.read().await;
        assert_eq!(guard.session_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_approval_close_is_ignored() {
        let store: SharedStore = Arc::new(RwLock::new(SessionStore::new()));
        let bus = ChangeBus::new();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run(store.clone(), bus.clone(), rx));

        let live = ApprovalId::new();
        let (applied_tx, applied_rx) = oneshot::channel();
        tx.send(StoreCommand::Hook {
            event: serde_json::from_value(
                json!({"type": "PermissionRequest", "session_id": "C", "tool_name": "Bash"}),
            )
            .unwrap(),
            approval_generation: Some(live),
            applied: Some(applied_tx),
        })
        .await
        .unwrap();
        applied_rx.await.unwrap();

        // A close for some other (superseded) generation changes nothing.
        tx.send(StoreCommand::ApprovalClosed {
            session_id: SessionId::new("C"),
            generation: ApprovalId::new(),
        })
        .await
        .unwrap();
        // A close for the live generation clears the approval.
        tx.send(StoreCommand::ApprovalClosed {
            session_id: SessionId::new("C"),
            generation: live,
        })
        .await
        .unwrap();
        tx.send(StoreCommand::Shutdown).await.unwrap();
        task.await.unwrap();

        let guard = store.read().await;
        let session = guard.get(&SessionId::new("C")).unwrap();
        assert!(session.pending_approval.is_none());
        assert_eq!(session.phase, SessionPhase::Idle);
    }
}
