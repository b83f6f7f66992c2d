//! Atoll Events - change delivery for the Atoll session daemon.
//!
//! This crate provides:
//! - [`Delta`], the typed change records emitted by the model's mutator
//! - [`ChangeBus`], multi-subscriber delta delivery with bounded queues,
//!   per-subscriber drop accounting, and synthetic resync markers
//! - The frontend IPC protocol shapes shared by the daemon and UI clients

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod delta;
pub mod frontend_api;

pub use bus::{ChangeBus, DEFAULT_BUS_CAPACITY, DeltaStream};
pub use delta::Delta;
pub use frontend_api::{
    FrontendCall, FrontendEvent, FrontendFrame, FrontendReply, FrontendRequest, HealthReport,
    SessionSummary,
};
