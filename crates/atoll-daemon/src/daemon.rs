//! Daemon assembly: wiring, startup, and shutdown orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use atoll_config::Config;
use atoll_events::{ChangeBus, DeltaStream};
use atoll_model::SessionStore;
use atoll_watch::SessionWatcher;

use crate::hook::registry;
use crate::mutator::{self, SharedStore, StoreCommand};
use crate::{frontend, hook, socket};

/// Depth of the producers → mutator channel.
const COMMAND_BUFFER: usize = 256;

/// Depth of the watcher → bridge channel.
const LOG_UPDATE_BUFFER: usize = 256;

/// Depth of the registry command channel.
const REGISTRY_BUFFER: usize = 64;

/// How long each task gets to wind down before being aborted.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that abort daemon startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A listening socket could not be bound.
    #[error("failed to bind {purpose} socket at {path}: {source}")]
    Bind {
        /// Which endpoint failed.
        purpose: &'static str,
        /// The socket path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

/// A running daemon: every task spawned, sockets bound.
pub struct Daemon {
    config: Config,
    cancel: CancellationToken,
    store: SharedStore,
    bus: ChangeBus,
    commands: mpsc::Sender<StoreCommand>,
    mutator_task: JoinHandle<()>,
    registry_task: JoinHandle<()>,
    watcher_task: JoinHandle<()>,
    bridge_task: JoinHandle<()>,
    hook_task: JoinHandle<()>,
    frontend_task: JoinHandle<()>,
}

impl Daemon {
    /// Bind both sockets and spawn every task.
    ///
    /// # Errors
    ///
    /// Fails if either socket cannot be bound (including when a live
    /// daemon already holds one).
    pub async fn start(config: Config) -> Result<Self, DaemonError> {
        let hook_listener =
            socket::bind_socket(&config.socket_path).map_err(|source| DaemonError::Bind {
                purpose: "hook",
                path: config.socket_path.clone(),
                source,
            })?;
        let frontend_listener = socket::bind_socket(&config.frontend_socket_path).map_err(
            |source| DaemonError::Bind {
                purpose: "frontend",
                path: config.frontend_socket_path.clone(),
                source,
            },
        )?;

        let store: SharedStore = Arc::new(RwLock::new(SessionStore::new()));
        let bus = ChangeBus::with_capacity(config.bus_capacity);
        let cancel = CancellationToken::new();

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (registry_tx, registry_rx) = mpsc::channel(REGISTRY_BUFFER);
        let (updates_tx, mut updates_rx) = mpsc::channel(LOG_UPDATE_BUFFER);

        let mutator_task = tokio::spawn(mutator::run(store.clone(), bus.clone(), commands_rx));
        let registry_task = tokio::spawn(registry::run(registry_rx));

        let watcher = SessionWatcher::new(
            config.sessions_root.clone(),
            config.debounce_window(),
            updates_tx,
        );
        let watch_health = watcher.health();
        let watcher_task = tokio::spawn(watcher.run(cancel.child_token()));

        // Bridge tailed log batches into the mutator channel.
        let bridge_commands = commands_tx.clone();
        let bridge_task = tokio::spawn(async move {
            while let Some(update) = updates_rx.recv().await {
                if bridge_commands.send(StoreCommand::Log(update)).await.is_err() {
                    break;
                }
            }
        });

        let hook_task = tokio::spawn(hook::run(
            hook::HookEndpoint {
                commands: commands_tx.clone(),
                registry: registry_tx.clone(),
                approval_timeout: config.approval_timeout(),
            },
            hook_listener,
            cancel.child_token(),
        ));

        let frontend_task = tokio::spawn(frontend::run(
            frontend::FrontendEndpoint {
                store: store.clone(),
                bus: bus.clone(),
                registry: registry_tx,
                watch_health,
            },
            frontend_listener,
            cancel.child_token(),
        ));

        info!(
            hook_socket = %config.socket_path.display(),
            frontend_socket = %config.frontend_socket_path.display(),
            sessions_root = %config.sessions_root.display(),
            "daemon started"
        );

        Ok(Self {
            config,
            cancel,
            store,
            bus,
            commands: commands_tx,
            mutator_task,
            registry_task,
            watcher_task,
            bridge_task,
            hook_task,
            frontend_task,
        })
    }

    /// The session model (read side), for embedding and tests.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Subscribe to the daemon's delta stream.
    #[must_use]
    pub fn subscribe(&self) -> DeltaStream {
        self.bus.subscribe()
    }

    /// Stop everything, in dependency order.
    ///
    /// The watcher stops and drains; the hook endpoint refuses new
    /// connections and denies every held approval with `shutdown`; frontend
    /// clients receive a final resync; the mutator drains its channel and
    /// exits.
    pub async fn shutdown(self) {
        info!("daemon shutting down");
        self.cancel.cancel();

        // The hook endpoint sweeps the registry and joins its connections;
        // the mutator must outlive them to observe their final commands.
        join_task("hook endpoint", self.hook_task).await;
        join_task("frontend endpoint", self.frontend_task).await;
        join_task("session watcher", self.watcher_task).await;
        join_task("log bridge", self.bridge_task).await;

        let _ = self.commands.send(StoreCommand::Shutdown).await;
        join_task("mutator", self.mutator_task).await;
        join_task("approval registry", self.registry_task).await;

        for path in [&self.config.socket_path, &self.config.frontend_socket_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove socket file");
                }
            }
        }
        info!("daemon stopped");
    }

    /// Run until a shutdown signal arrives, then stop cleanly.
    ///
    /// # Errors
    ///
    /// Fails only on startup; see [`Daemon::start`].
    pub async fn run(config: Config) -> Result<(), DaemonError> {
        let daemon = Self::start(config).await?;
        wait_for_shutdown_signal().await;
        daemon.shutdown().await;
        Ok(())
    }
}

async fn join_task(name: &'static str, mut task: JoinHandle<()>) {
    if tokio::time::timeout(TASK_STOP_TIMEOUT, &mut task).await.is_err() {
        warn!(task = name, "did not stop in time; aborting");
        task.abort();
    }
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("received interrupt"),
                // Without a working signal handler the only safe option is
                // to stop rather than run unkillable.
                Err(e) => warn!(error = %e, "failed to listen for SIGINT; shutting down"),
            }
        },
        () = terminate => {
            info!("received terminate");
        },
    }
}
