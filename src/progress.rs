//! Progress events emitted by the pipeline controller.
//!
//! Each stage owns a fixed band of the overall completion fraction. A stage
//! emits `StageStarted` at the low end of its band and `StageCompleted` at the
//! high end, so the fraction never decreases over a run. The external tools
//! report nothing while they run; `StageRunning` only carries elapsed time so
//! front-ends can show an honest indeterminate indicator.

use crate::stage::StageKind;
use serde::Serialize;

/// Completion fraction at the start and end of a stage.
pub fn band(stage: StageKind) -> (f64, f64) {
    match stage {
        StageKind::Distance => (0.0, 0.40),
        StageKind::TreeInfer => (0.40, 0.99),
        StageKind::SubtypeInfer => (0.99, 1.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    QueryParsed {
        query_id: String,
        query_length: usize,
    },
    StageStarted {
        stage: StageKind,
        fraction: f64,
    },
    StageRunning {
        stage: StageKind,
        elapsed_secs: u64,
    },
    StageCompleted {
        stage: StageKind,
        fraction: f64,
        duration_secs: f64,
    },
    StageFailed {
        stage: StageKind,
        reason: String,
    },
    Aggregating {
        fraction: f64,
    },
    Packaging {
        fraction: f64,
    },
    Finished {
        success: bool,
    },
}

impl ProgressEvent {
    /// Completion fraction carried by the event, if any.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::StageStarted { fraction, .. }
            | ProgressEvent::StageCompleted { fraction, .. }
            | ProgressEvent::Aggregating { fraction }
            | ProgressEvent::Packaging { fraction } => Some(*fraction),
            _ => None,
        }
    }
}

/// Sink for pipeline progress. Called from the controller task and from the
/// elapsed-time ticker, so implementations must be shareable.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: &ProgressEvent) {}
}
