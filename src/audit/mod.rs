//! Run history.
//!
//! Every `subtyper run` leaves one JSON record under `<state_dir>/runs/`,
//! successful or not, so a failed analysis can be traced back to the stage
//! and the upload that caused it.

use crate::errors::{PipelineError, StageError};
use crate::stage::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    pub upload: UploadAudit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryAudit>,
    pub stages: Vec<StageAudit>,
    pub outcome: RunOutcome,
}

impl AuditRun {
    pub fn new(config: RunConfig, upload: UploadAudit) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            upload,
            query: None,
            stages: Vec::new(),
            outcome: RunOutcome::InProgress,
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
    }

    /// Wall-clock duration, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub workspace_dir: PathBuf,
    pub output_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub python: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadAudit {
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryAudit {
    pub query_id: String,
    pub query_length: usize,
}

/// One stage invocation as seen by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageAudit {
    pub stage: StageKind,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub exit_code: Option<i32>,
    pub outcome: StageAuditOutcome,
    /// Tool stderr, kept for failed stages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl StageAudit {
    pub fn new(
        stage: StageKind,
        started_at: DateTime<Utc>,
        duration: Duration,
        exit_code: Option<i32>,
        failure: Option<&StageError>,
        diagnostics: &str,
    ) -> Self {
        let outcome = match failure {
            None => StageAuditOutcome::Succeeded,
            Some(err) => StageAuditOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        };
        let diagnostics = (failure.is_some() && !diagnostics.trim().is_empty())
            .then(|| diagnostics.to_string());
        Self {
            stage,
            started_at,
            duration_secs: duration.as_secs_f64(),
            exit_code,
            outcome,
            diagnostics,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == StageAuditOutcome::Succeeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StageAuditOutcome {
    Succeeded,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunOutcome {
    InProgress,
    Succeeded {
        subtype_assignment: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        archive: Option<PathBuf>,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<StageKind>,
        kind: String,
        message: String,
    },
}

impl RunOutcome {
    pub fn failed(err: &PipelineError) -> Self {
        RunOutcome::Failed {
            stage: err.stage(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Short label for history listings.
    pub fn label(&self) -> String {
        match self {
            RunOutcome::InProgress => "in progress".to_string(),
            RunOutcome::Succeeded {
                subtype_assignment, ..
            } => subtype_assignment.clone(),
            RunOutcome::Failed {
                stage: Some(stage),
                kind,
                ..
            } => format!("failed at {} ({})", stage, kind),
            RunOutcome::Failed { kind, .. } => format!("failed ({})", kind),
        }
    }
}

pub mod logger;
pub use logger::AuditLogger;
