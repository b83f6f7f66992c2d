//! Atoll Core - Foundation types for the Atoll session daemon.
//!
//! This crate provides:
//! - Session identifiers and timestamps
//! - The session state vocabulary (phases, tools, approvals)
//! - The hook wire envelope emitted by the assistant's runtime
//! - Opaque conversation message records

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod hook_event;
pub mod message;
pub mod session;
pub mod types;

pub use hook_event::{HookEvent, HookEventError, HookEventKind};
pub use message::Message;
pub use session::{ApprovalId, ApprovalRequest, Decision, SessionPhase, Tool, ToolStatus};
pub use types::{SessionId, Timestamp};
