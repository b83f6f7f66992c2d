//! Atoll Model - the authoritative in-memory session state.
//!
//! This crate provides:
//! - [`Session`], the per-session state record
//! - [`SessionStore`], the sole owner of all session state
//! - The hook event reducer: every mutation flows through the store's
//!   `apply_*` methods and returns the [`Delta`]s it produced
//!
//! The store itself is not synchronized; the daemon wraps it in a lock whose
//! write half belongs to a single mutator task, which publishes the returned
//! deltas on the change bus.
//!
//! [`Delta`]: atoll_events::Delta

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod reducer;
pub mod session;
pub mod store;

pub use session::Session;
pub use store::SessionStore;
