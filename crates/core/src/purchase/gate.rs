//! Schedule gate: hold the run until its scheduled start.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// How the gate was passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No start configured, or it already passed.
    Immediate,
    /// Slept until the start instant.
    Waited,
    /// Cancelled while waiting.
    Cancelled,
}

pub struct ScheduleGate;

impl ScheduleGate {
    /// Time left until `scheduled`, if it lies in the future.
    pub fn remaining(
        scheduled: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<std::time::Duration> {
        let scheduled = scheduled?;
        (scheduled - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Single sleep until `scheduled`; returns at once when it is absent or past.
    pub async fn wait(scheduled: Option<DateTime<Utc>>, cancel: &CancellationToken) -> GateOutcome {
        let Some(remaining) = Self::remaining(scheduled, Utc::now()) else {
            return GateOutcome::Immediate;
        };
        tokio::select! {
            _ = cancel.cancelled() => GateOutcome::Cancelled,
            _ = tokio::time::sleep(remaining) => GateOutcome::Waited,
        }
    }
}
