//! Hook endpoint: the unix socket the assistant's hook shim calls.
//!
//! One connection carries exactly one hook event: a single UTF-8 JSON
//! object, read until it parses, the peer half-closes, or a 64 KiB cap.
//! Most events get no response body. A `PermissionRequest` is different:
//! the server acknowledges with `{"status":"waiting_for_approval"}` and
//! keeps the connection open until a frontend decision, the approval
//! timeout, supersession, or shutdown produces the final
//! `{"decision":...,"reason":...}` frame. Response frames are
//! newline-terminated JSON and fully flushed before close.

pub mod registry;

use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atoll_core::{ApprovalId, Decision, HookEvent, SessionId};

use crate::mutator::StoreCommand;
use registry::{RegistryCommand, Resolution};

/// Largest accepted hook payload.
const MAX_EVENT_BYTES: usize = 64 * 1024;

/// How long a connected peer may take to deliver its event.
const EVENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles for hook connection handling.
#[derive(Clone)]
pub struct HookEndpoint {
    /// Channel into the mutator task.
    pub commands: mpsc::Sender<StoreCommand>,
    /// Channel into the pending-call registry.
    pub registry: mpsc::Sender<RegistryCommand>,
    /// How long a pending approval waits before auto-denying.
    pub approval_timeout: Duration,
}

/// Accept hook connections until cancelled.
///
/// On cancellation the endpoint stops accepting, asks the registry to deny
/// every held call with `reason = "shutdown"`, and waits for in-flight
/// connections to finish writing their final frames.
pub async fn run(endpoint: HookEndpoint, listener: UnixListener, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    connections.spawn(handle_connection(endpoint.clone(), stream));
                },
                Err(e) => {
                    warn!(error = %e, "failed to accept hook connection");
                },
            },
        }
    }

    drop(listener);
    let _ = endpoint.registry.send(RegistryCommand::Shutdown).await;
    while connections.join_next().await.is_some() {}
    info!("hook endpoint stopped");
}

async fn handle_connection(endpoint: HookEndpoint, mut stream: UnixStream) {
    let payload = match timeout(EVENT_READ_TIMEOUT, read_event(&mut stream)).await {
        Ok(Ok(Some(payload))) => payload,
        Ok(Ok(None)) => {
            warn!("hook peer connected without sending an event");
            return;
        },
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read hook payload");
            return;
        },
        Err(_) => {
            warn!("timed out reading hook payload");
            return;
        },
    };

    let event = match HookEvent::from_slice(&payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "dropping hook payload");
            return;
        },
    };
    debug!(
        kind = event.kind.name(),
        session = %event.session_id.short(),
        "hook event received"
    );

    if event.kind.wants_approval() {
        handle_permission_request(endpoint, stream, event).await;
    } else {
        // No response body for plain events; application order is preserved
        // by the mutator channel.
        let _ = endpoint
            .commands
            .send(StoreCommand::Hook {
                event,
                approval_generation: None,
                applied: None,
            })
            .await;
    }
}

/// Read one JSON object from the peer.
///
/// The shim keeps the connection open when it expects a response, so the
/// read finishes as soon as the accumulated bytes parse as a complete JSON
/// value, without waiting for EOF.
async fn read_event(stream: &mut UnixStream) -> io::Result<Option<Vec<u8>>> {
    let mut payload = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if !payload.is_empty()
            && serde_json::from_slice::<serde::de::IgnoredAny>(&payload).is_ok()
        {
            return Ok(Some(payload));
        }
        if payload.len() >= MAX_EVENT_BYTES {
            return Ok(Some(payload));
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return if payload.is_empty() {
                Ok(None)
            } else {
                Ok(Some(payload))
            };
        }
        payload.extend_from_slice(&chunk[..n]);
    }
}

/// Hold a `PermissionRequest` connection open until its decision resolves.
async fn handle_permission_request(endpoint: HookEndpoint, stream: UnixStream, event: HookEvent) {
    let (mut read_half, mut write_half) = stream.into_split();
    let session_id = event.session_id.clone();
    let generation = ApprovalId::new();

    // Apply the event first: the model must hold the pending approval
    // before the shim is told it is waiting.
    let (applied_tx, applied_rx) = oneshot::channel();
    if endpoint
        .commands
        .send(StoreCommand::Hook {
            event,
            approval_generation: Some(generation),
            applied: Some(applied_tx),
        })
        .await
        .is_err()
    {
        warn!(session = %session_id.short(), "mutator unavailable; dropping permission request");
        return;
    }
    let _ = applied_rx.await;

    let (reply_tx, reply_rx) = oneshot::channel();
    if endpoint
        .registry
        .send(RegistryCommand::Register {
            session_id: session_id.clone(),
            generation,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        // Registry already gone: shutting down.
        close_approval(&endpoint, &session_id, generation).await;
        let _ = write_json_line(
            &mut write_half,
            &serde_json::json!({"decision": Decision::Deny, "reason": "shutdown"}),
        )
        .await;
        return;
    }

    if write_json_line(
        &mut write_half,
        &serde_json::json!({"status": "waiting_for_approval"}),
    )
    .await
    .is_err()
    {
        // Peer vanished before it even saw the ack.
        warn!(session = %session_id.short(), "hook peer lost before acknowledgement");
        let _ = endpoint
            .registry
            .send(RegistryCommand::Deregister {
                session_id: session_id.clone(),
                generation,
            })
            .await;
        close_approval(&endpoint, &session_id, generation).await;
        return;
    }

    // Await the decision with a real timer; the timeout fires even if no
    // other event ever arrives. The read half doubles as a liveness probe:
    // the shim sends nothing further, so any read completion means the peer
    // vanished or broke protocol.
    let mut probe = [0u8; 64];
    let (decision, reason, resolves_model) = tokio::select! {
        resolution = reply_rx => match resolution.unwrap_or(Resolution::Shutdown) {
            Resolution::Decided(decision) => (decision, "user decision from frontend", true),
            Resolution::Superseded => (Decision::Deny, "superseded", false),
            Resolution::Shutdown => (Decision::Deny, "shutdown", false),
        },
        () = tokio::time::sleep(endpoint.approval_timeout) => {
            info!(session = %session_id.short(), "approval timed out");
            let _ = endpoint
                .registry
                .send(RegistryCommand::Deregister {
                    session_id: session_id.clone(),
                    generation,
                })
                .await;
            (Decision::Deny, "timeout", true)
        },
        _ = read_half.read(&mut probe) => {
            warn!(session = %session_id.short(), "hook peer vanished while awaiting decision");
            let _ = endpoint
                .registry
                .send(RegistryCommand::Deregister {
                    session_id: session_id.clone(),
                    generation,
                })
                .await;
            close_approval(&endpoint, &session_id, generation).await;
            return;
        },
    };

    // The model observes the close before the shim can issue its next
    // event, because this command is enqueued before the response frame is
    // written. Superseded and shutdown outcomes leave the model alone: the
    // pending approval either belongs to the successor or dies with us.
    if resolves_model {
        close_approval(&endpoint, &session_id, generation).await;
    }

    if let Err(e) = write_json_line(
        &mut write_half,
        &serde_json::json!({"decision": decision, "reason": reason}),
    )
    .await
    {
        warn!(session = %session_id.short(), error = %e, "failed to deliver decision to hook peer");
    }
}

async fn close_approval(endpoint: &HookEndpoint, session_id: &SessionId, generation: ApprovalId) {
    let _ = endpoint
        .commands
        .send(StoreCommand::ApprovalClosed {
            session_id: session_id.clone(),
            generation,
        })
        .await;
}

/// Write one newline-terminated JSON frame, fully drained.
async fn write_json_line<W>(writer: &mut W, value: &serde_json::Value) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
