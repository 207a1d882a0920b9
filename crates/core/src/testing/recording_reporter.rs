//! Status reporter that records events for assertions.

use std::sync::Mutex;

use crate::purchase::PurchaseState;
use crate::status::{StatusEvent, StatusReporter};

/// Records every reported event in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages entered, in order, across all iterations.
    pub fn stages(&self) -> Vec<PurchaseState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StatusEvent::StageEntered { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }

    /// Number of events of one kind (see [`StatusEvent::kind`]).
    pub fn count_kind(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, event: StatusEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
