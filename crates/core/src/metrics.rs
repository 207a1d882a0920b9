//! Prometheus metrics for the purchase loop.
//!
//! Registered into the server's registry through [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Purchase Loop Metrics
// =============================================================================

/// Loop iterations by outcome.
pub static ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("turnstile_attempts_total", "Total purchase loop iterations"),
        &["outcome"], // "success", "retry", "abort"
    )
    .unwrap()
});

/// Duration of one loop iteration in seconds.
pub static ATTEMPT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "turnstile_attempt_duration_seconds",
            "Duration of one purchase loop iteration",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Stage failures by stage and kind.
pub static STAGE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("turnstile_stage_failures_total", "Stage failures"),
        &["stage", "kind"],
    )
    .unwrap()
});

/// Best-effort cookie acceptances that found no banner.
pub static COOKIE_BANNER_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "turnstile_cookie_banner_skipped_total",
        "Iterations where the cookie banner was missing or refused",
    )
    .unwrap()
});

/// Finished purchase runs by result.
pub static PURCHASES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("turnstile_purchases_total", "Finished purchase runs"),
        &["result"], // "succeeded", "aborted", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ATTEMPTS_TOTAL.clone()),
        Box::new(ATTEMPT_DURATION.clone()),
        Box::new(STAGE_FAILURES.clone()),
        Box::new(COOKIE_BANNER_SKIPPED.clone()),
        Box::new(PURCHASES_TOTAL.clone()),
    ]
}
