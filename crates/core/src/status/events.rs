use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::purchase::{PurchaseState, StageFailure};

/// Progress and failure events of a purchase run.
///
/// Every event is self-contained: consumers may drop or reorder them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    RunStarted {
        categories: Vec<String>,
        guest_count: u32,
    },
    /// Suspended until the scheduled start.
    ScheduledWait {
        until: DateTime<Utc>,
        wait_ms: u64,
    },
    ScheduledStart {
        until: DateTime<Utc>,
    },
    AttemptStarted {
        attempt: u32,
    },
    StageEntered {
        attempt: u32,
        stage: PurchaseState,
    },
    CookiesAccepted {
        attempt: u32,
    },
    /// Cookie banner missing or refused; never fatal.
    CookiesSkipped {
        attempt: u32,
        reason: String,
    },
    CategoryResolved {
        attempt: u32,
        category: String,
    },
    Retry {
        attempt: u32,
        failure: StageFailure,
        delay_ms: u64,
    },
    Succeeded {
        attempts: u32,
        category: String,
        location: String,
    },
    Aborted {
        attempts: u32,
        failure: StageFailure,
    },
    Cancelled {
        attempts: u32,
    },
}

impl StatusEvent {
    /// Snake-case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ScheduledWait { .. } => "scheduled_wait",
            Self::ScheduledStart { .. } => "scheduled_start",
            Self::AttemptStarted { .. } => "attempt_started",
            Self::StageEntered { .. } => "stage_entered",
            Self::CookiesAccepted { .. } => "cookies_accepted",
            Self::CookiesSkipped { .. } => "cookies_skipped",
            Self::CategoryResolved { .. } => "category_resolved",
            Self::Retry { .. } => "retry",
            Self::Succeeded { .. } => "succeeded",
            Self::Aborted { .. } => "aborted",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether no further events follow for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Aborted { .. } | Self::Cancelled { .. }
        )
    }

    /// Human-readable narration.
    pub fn message(&self) -> String {
        match self {
            Self::RunStarted {
                categories,
                guest_count,
            } => format!(
                "Starting purchase of {} ticket(s), categories in order: {}",
                guest_count,
                categories.join(", ")
            ),
            Self::ScheduledWait { until, wait_ms } => format!(
                "Waiting {}s for scheduled start at {}",
                wait_ms / 1000,
                until.to_rfc3339()
            ),
            Self::ScheduledStart { until } => {
                format!("Scheduled start {} reached", until.to_rfc3339())
            }
            Self::AttemptStarted { attempt } => format!("Attempt {} started", attempt),
            Self::StageEntered { attempt, stage } => {
                format!("Attempt {}: entering {}", attempt, stage)
            }
            Self::CookiesAccepted { attempt } => format!("Attempt {}: cookies accepted", attempt),
            Self::CookiesSkipped { attempt, reason } => {
                format!("Attempt {}: cookie banner skipped ({})", attempt, reason)
            }
            Self::CategoryResolved { attempt, category } => {
                format!("Attempt {}: category {} is available", attempt, category)
            }
            Self::Retry {
                attempt,
                failure,
                delay_ms,
            } => {
                if *delay_ms == 0 {
                    format!("Attempt {} failed, retrying: {}", attempt, failure)
                } else {
                    format!(
                        "Attempt {} failed, retrying in {}ms: {}",
                        attempt, delay_ms, failure
                    )
                }
            }
            Self::Succeeded {
                attempts,
                category,
                location,
            } => format!(
                "Purchase reached payment for {} after {} attempt(s): {}",
                category, attempts, location
            ),
            Self::Aborted { attempts, failure } => {
                format!("Purchase aborted after {} attempt(s): {}", attempts, failure)
            }
            Self::Cancelled { attempts } => {
                format!("Purchase cancelled after {} attempt(s)", attempts)
            }
        }
    }
}
