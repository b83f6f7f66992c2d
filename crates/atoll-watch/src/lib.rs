//! Atoll Watch - log ingestion for the Atoll session daemon.
//!
//! This crate provides:
//! - [`LogTailer`], an incremental parser for a session's append-only
//!   `conversation.jsonl` with truncation and reset handling
//! - [`SessionWatcher`], which watches the sessions root for new session
//!   logs and modifications, debounces them, and emits [`LogUpdate`]
//!   batches to the daemon's mutator

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod tailer;
pub mod watcher;

pub use tailer::{LogTailer, TailBatch};
pub use watcher::{CONVERSATION_LOG, LogUpdate, SessionWatcher, WatchHealth};
