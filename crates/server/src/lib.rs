//! Turnstile job service: HTTP API, WebSocket progress stream and the
//! registry of hosted purchase jobs.

pub mod api;
pub mod jobs;
pub mod metrics;
pub mod state;
