//! Sequenced lifecycle timeline for a single run.

use chrono::Utc;
use std::sync::Mutex;

use crate::domain::{PipelineEvent, PipelineEventKind};

/// Append-only, sequence-numbered event log shared by the driver, the build
/// coordinator and the push gate.
#[derive(Debug, Default)]
pub struct Timeline {
    events: Mutex<Vec<PipelineEvent>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number (starting at 1).
    pub fn record(&self, kind: PipelineEventKind) -> u64 {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let seq = events.len() as u64 + 1;
        events.push(PipelineEvent {
            seq,
            timestamp: Utc::now(),
            kind,
        });
        seq
    }

    /// Copy of all events recorded so far, in sequence order.
    pub fn snapshot(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
