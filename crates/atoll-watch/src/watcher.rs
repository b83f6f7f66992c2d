//! Watching the sessions root for conversation log activity.
//!
//! One watcher instance observes `<sessions_root>/<session_id>/conversation.jsonl`
//! files. It owns the per-session [`LogTailer`]s, debounces rapid
//! modifications per path, and emits [`LogUpdate`] batches to the daemon's
//! mutator over a bounded channel. A failing watch backend is re-registered
//! with capped backoff while the rest of the daemon keeps serving; liveness
//! is exposed through [`WatchHealth`].

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use atoll_core::{Message, SessionId};

use crate::tailer::LogTailer;

/// File name of the per-session conversation log.
pub const CONVERSATION_LOG: &str = "conversation.jsonl";

/// Capacity of the internal bridge from the watch backend's thread.
const FS_EVENT_BUFFER: usize = 256;

/// Backoff cap for re-registering a failed watch backend.
const MAX_REGISTER_BACKOFF: Duration = Duration::from_secs(30);

/// A batch of newly tailed messages for one session.
#[derive(Debug, Clone)]
pub struct LogUpdate {
    /// The session whose log grew.
    pub session_id: SessionId,
    /// Whether the conversation must be emptied before appending.
    pub reset: bool,
    /// The new messages, in file order.
    pub messages: Vec<Message>,
}

/// Shared liveness flag for the watch backend.
///
/// False until the first successful registration, and while the backend is
/// being re-registered after a failure.
#[derive(Debug, Clone, Default)]
pub struct WatchHealth {
    ok: Arc<AtomicBool>,
}

impl WatchHealth {
    /// Whether the watch backend is currently registered and delivering.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok.load(Ordering::Relaxed)
    }

    fn set(&self, ok: bool) {
        self.ok.store(ok, Ordering::Relaxed);
    }
}

enum WatchExit {
    Cancelled,
    BackendFailed,
}

/// Watches the sessions root and turns log mutations into [`LogUpdate`]s.
pub struct SessionWatcher {
    root: PathBuf,
    debounce: Duration,
    updates: mpsc::Sender<LogUpdate>,
    tailers: HashMap<SessionId, LogTailer>,
    last_polled: HashMap<PathBuf, Instant>,
    health: WatchHealth,
}

impl SessionWatcher {
    /// Create a watcher over `root` emitting updates on `updates`.
    ///
    /// `debounce` is the per-path coalescing window for modification
    /// events; a modification within the window of the last one is dropped.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, debounce: Duration, updates: mpsc::Sender<LogUpdate>) -> Self {
        Self {
            root: root.into(),
            debounce,
            updates,
            tailers: HashMap::new(),
            last_polled: HashMap::new(),
            health: WatchHealth::default(),
        }
    }

    /// Handle to this watcher's liveness flag.
    #[must_use]
    pub fn health(&self) -> WatchHealth {
        self.health.clone()
    }

    /// Run until cancelled.
    ///
    /// Registers the watch backend, scans pre-existing session logs, and
    /// dispatches filesystem events. A backend failure is retried with
    /// capped backoff; the daemon's other endpoints are unaffected.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.ensure_root();

        let mut backoff = Duration::from_secs(1);
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.watch_until_failure(&cancel).await {
                WatchExit::Cancelled => break,
                WatchExit::BackendFailed => {
                    self.health.set(false);
                    error!(
                        path = %self.root.display(),
                        retry_in = ?backoff,
                        "watch backend failed; re-registering"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(backoff) => {},
                    }
                    backoff = backoff.saturating_mul(2).min(MAX_REGISTER_BACKOFF);
                },
            }
        }

        self.health.set(false);
        info!("session watcher stopped");
    }

    /// One registration lifetime: register, scan, dispatch until the
    /// backend fails or the daemon shuts down.
    async fn watch_until_failure(&mut self, cancel: &CancellationToken) -> WatchExit {
        let (fs_tx, mut fs_rx) = mpsc::channel(FS_EVENT_BUFFER);
        let _watcher = match register(&self.root, fs_tx) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(path = %self.root.display(), error = %e, "failed to register filesystem watcher");
                return WatchExit::BackendFailed;
            },
        };
        self.health.set(true);
        info!(path = %self.root.display(), "watching sessions root");

        // Pre-existing logs (and anything missed while re-registering) are
        // picked up by polling; tailer offsets keep this idempotent.
        self.scan_existing().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return WatchExit::Cancelled,
                event = fs_rx.recv() => match event {
                    Some(Ok(event)) => self.handle_fs_event(event).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "watch backend error");
                        return WatchExit::BackendFailed;
                    },
                    None => return WatchExit::BackendFailed,
                },
            }
        }
    }

    fn ensure_root(&self) {
        if self.root.exists() {
            return;
        }
        warn!(path = %self.root.display(), "sessions root missing; creating");
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            warn!(path = %self.root.display(), error = %e, "failed to create sessions root");
        }
    }

    /// Scan for session logs already on disk and emit their content.
    async fn scan_existing(&mut self) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.root.display(), error = %e, "failed to scan sessions root");
                return;
            },
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let log = dir.join(CONVERSATION_LOG);
            if !log.exists() {
                continue;
            }
            let Some(session_id) = session_id_for(&log) else {
                continue;
            };
            self.poll_and_send(session_id, &log).await;
        }
    }

    async fn handle_fs_event(&mut self, event: Event) {
        let debounce = match event.kind {
            EventKind::Create(_) => false,
            EventKind::Modify(_) => true,
            _ => return,
        };
        for path in event.paths {
            self.handle_path(&path, debounce).await;
        }
    }

    async fn handle_path(&mut self, path: &Path, debounce: bool) {
        if path.file_name().and_then(OsStr::to_str) != Some(CONVERSATION_LOG) {
            return;
        }
        let Some(session_id) = session_id_for(path) else {
            return;
        };

        if debounce {
            let now = Instant::now();
            if self
                .last_polled
                .get(path)
                .is_some_and(|last| now.duration_since(*last) < self.debounce)
            {
                debug!(path = %path.display(), "modification coalesced");
                return;
            }
            self.last_polled.insert(path.to_path_buf(), now);
        }

        self.poll_and_send(session_id, path).await;
    }

    async fn poll_and_send(&mut self, session_id: SessionId, path: &Path) {
        let tailer = self.tailers.entry(session_id.clone()).or_insert_with(|| {
            info!(session = %session_id.short(), "session log discovered");
            LogTailer::new(path)
        });

        let batch = tailer.poll();
        if batch.is_empty() {
            return;
        }

        let update = LogUpdate {
            session_id,
            reset: batch.reset,
            messages: batch.messages,
        };
        if self.updates.send(update).await.is_err() {
            debug!("mutator channel closed; dropping log update");
        }
    }
}

/// Session id from `<sessions_root>/<session_id>/conversation.jsonl`.
fn session_id_for(path: &Path) -> Option<SessionId> {
    path.parent()?
        .file_name()?
        .to_str()
        .map(SessionId::from)
}

/// Register the watch backend, bridging its callback thread into the
/// async loop.
fn register(
    root: &Path,
    tx: mpsc::Sender<notify::Result<Event>>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res| {
        // Delivered from the backend's own thread.
        let _ = tx.blocking_send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}
