//! Reconciliation of watched containers
//!
//! Provides:
//! - Health assessment of a fresh runtime snapshot against the manifest
//! - The per-cycle state machine
//! - Repair: detach, start, reattach with retries
//! - The per-container watch loop

pub mod checker;
pub mod cycle;
pub mod recovery;
pub mod watch;

pub use watch::{ContainerWatch, WatchTiming};
