//! Frontend endpoint: the unix socket UI clients talk to.
//!
//! Frames are 4-byte big-endian length prefixes followed by JSON. Each
//! client connection is served by one task that interleaves replies to the
//! client's [`FrontendCall`]s with events fanned out from the change bus;
//! queries read consistent snapshots of the model under its read guard. A
//! slow client loses oldest deltas (never stalling the mutator) and is
//! handed a `resync` event; shutdown delivers a final `resync` before the
//! socket closes.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atoll_events::{
    ChangeBus, Delta, FrontendCall, FrontendEvent, FrontendFrame, FrontendReply, FrontendRequest,
    HealthReport,
};
use atoll_watch::WatchHealth;

use crate::hook::registry::RegistryCommand;
use crate::mutator::SharedStore;

/// Largest accepted (or produced) frame payload.
const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Shared handles for frontend connection handling.
#[derive(Clone)]
pub struct FrontendEndpoint {
    /// The session model (read side).
    pub store: SharedStore,
    /// The change bus to fan out to clients.
    pub bus: ChangeBus,
    /// Channel into the pending-call registry, for decisions.
    pub registry: mpsc::Sender<RegistryCommand>,
    /// Watcher liveness, for health queries.
    pub watch_health: WatchHealth,
}

/// Accept frontend connections until cancelled.
pub async fn run(endpoint: FrontendEndpoint, listener: UnixListener, cancel: CancellationToken) {
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let (read_half, write_half) = stream.into_split();
                    clients.spawn(handle_client(
                        endpoint.clone(),
                        read_half,
                        write_half,
                        cancel.clone(),
                    ));
                },
                Err(e) => {
                    warn!(error = %e, "failed to accept frontend connection");
                },
            },
        }
    }

    drop(listener);
    while clients.join_next().await.is_some() {}
    info!("frontend endpoint stopped");
}

async fn handle_client(
    endpoint: FrontendEndpoint,
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    cancel: CancellationToken,
) {
    let mut deltas = endpoint.bus.subscribe();
    debug!("frontend client connected");

    // Frames are decoded on a dedicated task: a length-prefixed read is not
    // safe to abandon mid-frame, while a channel receive is.
    let (calls_tx, mut calls) = mpsc::channel::<Vec<u8>>(16);
    let reader = tokio::spawn(read_calls(read_half, calls_tx));

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                // Final resync so the client knows to re-query whoever
                // picks up after us.
                let _ = write_frame(
                    &mut write_half,
                    &FrontendFrame::Event { event: FrontendEvent::Resync },
                )
                .await;
                break;
            },
            payload = calls.recv() => {
                let Some(payload) = payload else { break };
                let reply = handle_call(&endpoint, &payload).await;
                if write_frame(&mut write_half, &reply).await.is_err() {
                    break;
                }
            },
            delta = deltas.recv() => {
                let Some(delta) = delta else { break };
                let Some(event) = event_for(&delta) else { continue };
                if write_frame(&mut write_half, &FrontendFrame::Event { event }).await.is_err() {
                    break;
                }
            },
        }
    }

    reader.abort();
    if deltas.drop_count() > 0 {
        debug!(dropped = deltas.drop_count(), "frontend client fell behind");
    }
    debug!("frontend client disconnected");
}

/// Decode request frames off the read half until disconnect.
async fn read_calls(mut read_half: OwnedReadHalf, calls: mpsc::Sender<Vec<u8>>) {
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(payload)) => {
                if calls.send(payload).await.is_err() {
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read frontend frame");
                break;
            },
        }
    }
}

/// Serve one request against a consistent snapshot of the model.
async fn handle_call(endpoint: &FrontendEndpoint, payload: &[u8]) -> FrontendFrame {
    let call: FrontendCall = match serde_json::from_slice(payload) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "malformed frontend request");
            return FrontendFrame::Reply {
                id: 0,
                reply: FrontendReply::Error(format!("malformed request: {e}")),
            };
        },
    };

    let reply = match call.request {
        FrontendRequest::ListSessions => {
            FrontendReply::Sessions(endpoint.store.read().await.summaries())
        },
        FrontendRequest::GetConversation { session_id } => {
            let guard = endpoint.store.read().await;
            let messages = guard
                .get(&session_id)
                .map(|session| session.conversation.clone())
                .unwrap_or_default();
            FrontendReply::Conversation(messages)
        },
        FrontendRequest::SubmitDecision {
            session_id,
            decision,
        } => {
            // Late or duplicate decisions against a closed approval are
            // dropped by the registry; the ack is unconditional.
            let _ = endpoint
                .registry
                .send(RegistryCommand::Resolve {
                    session_id,
                    decision,
                })
                .await;
            FrontendReply::Ack
        },
        FrontendRequest::Health => {
            let guard = endpoint.store.read().await;
            FrontendReply::Health(HealthReport {
                watcher_ok: endpoint.watch_health.is_ok(),
                session_count: guard.session_count(),
                subscriber_count: endpoint.bus.subscriber_count(),
            })
        },
    };

    FrontendFrame::Reply { id: call.id, reply }
}

/// The pushed event for a delta, if the delta is client-visible.
///
/// `ApprovalClosed` has no dedicated event: the paired `SessionUpserted`
/// already reports the phase leaving `waiting_approval`.
fn event_for(delta: &Delta) -> Option<FrontendEvent> {
    match delta {
        Delta::SessionUpserted { session_id, phase } => Some(FrontendEvent::SessionStateChanged {
            session_id: session_id.clone(),
            phase: *phase,
        }),
        Delta::ApprovalOpened {
            session_id,
            tool_name,
            parameters,
        } => Some(FrontendEvent::PermissionRequest {
            session_id: session_id.clone(),
            tool_name: tool_name.clone(),
            parameters: parameters.clone(),
        }),
        Delta::MessageAppended {
            session_id,
            message,
        } => Some(FrontendEvent::NewMessage {
            session_id: session_id.clone(),
            message: message.clone(),
        }),
        Delta::Resync => Some(FrontendEvent::Resync),
        Delta::ApprovalClosed { .. } => None,
    }
}

/// Read one length-prefixed frame. `Ok(None)` is a clean disconnect.
///
/// # Errors
///
/// Fails on I/O errors and on frames larger than the 1 MiB cap.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte cap"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one length-prefixed JSON frame, fully drained.
///
/// # Errors
///
/// Fails on I/O errors and unencodable values.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let bytes = serde_json::to_vec(value).map_err(io::Error::other)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}
