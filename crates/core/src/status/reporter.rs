use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::StatusEvent;

/// Sink for status events.
///
/// Reporting is fire-and-forget: implementations must not block the
/// purchase loop and must swallow their own failures.
pub trait StatusReporter: Send + Sync {
    fn report(&self, event: StatusEvent);
}

/// Envelope wrapping a status event with the time it was reported.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: StatusEvent,
}

/// Narrates events through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    label: Option<String>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every line with a label (e.g. a job id).
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl StatusReporter for TracingReporter {
    fn report(&self, event: StatusEvent) {
        let message = event.message();
        let label = self.label.as_deref().unwrap_or("purchase");
        if is_warning(&event) {
            warn!(target: "turnstile::status", "[{}] {}", label, message)
        } else {
            info!(target: "turnstile::status", "[{}] {}", label, message)
        }
    }
}

fn is_warning(event: &StatusEvent) -> bool {
    matches!(
        event,
        StatusEvent::Retry { .. } | StatusEvent::CookiesSkipped { .. } | StatusEvent::Aborted { .. }
    )
}

/// Forwards events into a bounded channel without waiting.
///
/// A full or closed channel drops the event and logs a warning.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<StatusEnvelope>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<StatusEnvelope>) -> Self {
        Self { tx }
    }

    /// Create a reporter and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StatusEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl StatusReporter for ChannelReporter {
    fn report(&self, event: StatusEvent) {
        let envelope = StatusEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.try_send(envelope) {
            warn!("Dropped status event: {}", e);
        }
    }
}

/// Delivers every event to several reporters.
#[derive(Clone, Default)]
pub struct FanoutReporter {
    sinks: Vec<Arc<dyn StatusReporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StatusReporter>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl StatusReporter for FanoutReporter {
    fn report(&self, event: StatusEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.report(event.clone());
            }
            last.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<StatusEvent>>);

    impl StatusReporter for Collect {
        fn report(&self, event: StatusEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_failures_log_as_warnings() {
        use crate::purchase::{FailureKind, PurchaseState, StageFailure};

        let failure = StageFailure::new(
            PurchaseState::ResolveSection,
            FailureKind::Unclassified,
            "driver hiccup",
        );
        assert!(is_warning(&StatusEvent::Retry {
            attempt: 1,
            failure: failure.clone(),
            delay_ms: 0,
        }));
        assert!(is_warning(&StatusEvent::Aborted {
            attempts: 1,
            failure,
        }));
        assert!(is_warning(&StatusEvent::CookiesSkipped {
            attempt: 1,
            reason: "no banner".to_string(),
        }));
        assert!(!is_warning(&StatusEvent::AttemptStarted { attempt: 1 }));
        assert!(!is_warning(&StatusEvent::Cancelled { attempts: 1 }));
    }

    #[tokio::test]
    async fn test_channel_reporter_delivers() {
        let (reporter, mut rx) = ChannelReporter::channel(4);
        reporter.report(StatusEvent::AttemptStarted { attempt: 1 });

        let envelope = rx.recv().await.expect("should receive event");
        assert_eq!(envelope.event, StatusEvent::AttemptStarted { attempt: 1 });
    }

    #[test]
    fn test_channel_reporter_full_channel_does_not_block() {
        let (reporter, _rx) = ChannelReporter::channel(1);
        reporter.report(StatusEvent::AttemptStarted { attempt: 1 });
        // Second event is dropped, not awaited.
        reporter.report(StatusEvent::AttemptStarted { attempt: 2 });
    }

    #[test]
    fn test_channel_reporter_closed_channel_is_swallowed() {
        let (reporter, rx) = ChannelReporter::channel(4);
        drop(rx);
        reporter.report(StatusEvent::Cancelled { attempts: 0 });
    }

    #[test]
    fn test_envelope_has_timestamp() {
        let (reporter, mut rx) = ChannelReporter::channel(4);
        let before = Utc::now();
        reporter.report(StatusEvent::AttemptStarted { attempt: 1 });
        let after = Utc::now();

        let envelope = rx.try_recv().expect("should receive event");
        assert!(envelope.timestamp >= before);
        assert!(envelope.timestamp <= after);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let fanout = FanoutReporter::new()
            .with(a.clone() as Arc<dyn StatusReporter>)
            .with(b.clone() as Arc<dyn StatusReporter>);
        assert_eq!(fanout.len(), 2);

        fanout.report(StatusEvent::AttemptStarted { attempt: 7 });

        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_tracing_reporter_never_panics() {
        let reporter = TracingReporter::labeled("job-1");
        reporter.report(StatusEvent::Cancelled { attempts: 2 });
        TracingReporter::new().report(StatusEvent::AttemptStarted { attempt: 1 });
    }
}
