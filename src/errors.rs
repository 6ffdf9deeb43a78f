//! Typed error hierarchy for the subtyping pipeline.
//!
//! Four enums cover the four failure surfaces:
//! - `StageError`: one external stage did not yield a usable artifact
//! - `AggregationError`: stage outputs violate the report contract
//! - `ArtifactError`: output directory housekeeping and packaging failures
//! - `PipelineError`: terminal outcome of a run, stage-qualified

use crate::stage::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from a single Stage Runner invocation.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to launch '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process exited with non-zero code {exit_code}")]
    ProcessFailure { exit_code: i32, diagnostics: String },

    #[error("Expected artifact {path} was not written")]
    MissingArtifact { path: PathBuf },

    #[error("Artifact {path} could not be decoded: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("Stage argument {path} is not an absolute path")]
    RelativePath { path: PathBuf },
}

impl StageError {
    /// Stable snake_case name of the failure classification.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::SpawnFailed { .. } => "spawn_failed",
            StageError::ProcessFailure { .. } => "process_failure",
            StageError::MissingArtifact { .. } => "missing_artifact",
            StageError::MalformedArtifact { .. } => "malformed_artifact",
            StageError::RelativePath { .. } => "relative_path",
        }
    }

    /// Captured diagnostic text, when the failure carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            StageError::ProcessFailure { diagnostics, .. } => non_blank(diagnostics),
            _ => None,
        }
    }
}

fn non_blank(text: &str) -> Option<&str> {
    (!text.trim().is_empty()).then_some(text)
}

/// Errors raised while merging stage payloads into a report.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Malformed conflict summary: {reason}")]
    MalformedConflictSummary { reason: String },
}

/// Errors from the Artifact Store (the `FileSystemError` kind).
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove stale artifact {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to write archive {path}: {source}")]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive {archive} would be written inside the output directory {output_dir}")]
    ArchiveInsideOutput { archive: PathBuf, output_dir: PathBuf },

    #[error("Output directory {path} has no parent directory")]
    NoParent { path: PathBuf },

    #[error("Workspace lock {path} is held by another run")]
    LockContended { path: PathBuf },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
        /// Everything the tool wrote to stderr, whatever the failure kind.
        diagnostics: String,
    },

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Output handling failed: {0}")]
    FileSystem(#[source] ArtifactError),

    #[error("Another run is already active (lock held at {path})")]
    RunInProgress { path: PathBuf },
}

impl From<ArtifactError> for PipelineError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::LockContended { path } => PipelineError::RunInProgress { path },
            other => PipelineError::FileSystem(other),
        }
    }
}

impl PipelineError {
    pub fn invalid_upload(reason: impl Into<String>) -> Self {
        PipelineError::InvalidUpload {
            reason: reason.into(),
        }
    }

    /// The stage that failed, for stage-qualified reporting.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Diagnostic text captured from the failing external tool.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::Stage {
                source,
                diagnostics,
                ..
            } => non_blank(diagnostics).or_else(|| source.diagnostics()),
            _ => None,
        }
    }

    /// Stable snake_case classification used in audit records and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidUpload { .. } => "invalid_upload",
            PipelineError::Stage { source, .. } => source.kind(),
            PipelineError::Aggregation(AggregationError::MalformedConflictSummary { .. }) => {
                "malformed_conflict_summary"
            }
            PipelineError::FileSystem(_) => "file_system_error",
            PipelineError::RunInProgress { .. } => "run_in_progress",
        }
    }
}
