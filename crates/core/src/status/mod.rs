//! Status reporting for purchase runs.
//!
//! The orchestrator receives an `Arc<dyn StatusReporter>` at construction and
//! reports one event per stage transition and per retry.

mod events;
mod reporter;

pub use events::*;
pub use reporter::*;
