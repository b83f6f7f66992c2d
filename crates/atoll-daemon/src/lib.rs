//! Atoll Daemon - the per-user session daemon.
//!
//! Wires the model, change bus, watcher, and the two socket endpoints into
//! one cooperative runtime:
//!
//! - [`hook`]: the unix socket the assistant's hook shim calls, holding
//!   permission-request connections open until a decision lands
//! - [`frontend`]: the unix socket UI clients query and subscribe on
//! - [`mutator`]: the single task allowed to mutate the session model
//! - [`daemon`]: assembly, shutdown orchestration, and signal wiring

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod daemon;
pub mod frontend;
pub mod hook;
pub mod mutator;
pub mod socket;

pub use daemon::{Daemon, DaemonError};
