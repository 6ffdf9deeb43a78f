//! Pipeline Controller.
//!
//! Drives the three stages in strict order as a small state machine:
//!
//! ```text
//! Init -> Distance -> TreeInfer -> SubtypeInfer -> Aggregating -> Done
//!
//! any state before Done -> Failed
//! ```
//!
//! A state advances only on a successful stage outcome. The first failure
//! moves to `Failed` and nothing after it runs. The staged upload is removed
//! on every exit path.

use crate::aggregate::{PipelineReport, aggregate};
use crate::artifacts::{ArchiveSummary, ArtifactStore};
use crate::audit::StageAudit;
use crate::config::{Config, ReferenceSet, ToolSet};
use crate::errors::{PipelineError, StageError};
use crate::progress::{ProgressEvent, ProgressReporter, band};
use crate::query::{AnalysisRequest, StagedUpload};
use crate::stage::{
    DistanceInput, DistanceStage, MLTreeResult, Stage, StageKind, StageRunner, SubtypeInput,
    SubtypeStage, TreeFile, TreeInput, TreeStage,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often a running stage reports its elapsed time.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Distance,
    TreeInfer,
    SubtypeInfer,
    Aggregating,
    Done,
    Failed,
}

impl PipelineState {
    /// The state entered when the current one succeeds.
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineState::Init => Some(PipelineState::Distance),
            PipelineState::Distance => Some(PipelineState::TreeInfer),
            PipelineState::TreeInfer => Some(PipelineState::SubtypeInfer),
            PipelineState::SubtypeInfer => Some(PipelineState::Aggregating),
            PipelineState::Aggregating => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(self, to: PipelineState) -> bool {
        if to == PipelineState::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }
}

impl From<StageKind> for PipelineState {
    fn from(stage: StageKind) -> Self {
        match stage {
            StageKind::Distance => PipelineState::Distance,
            StageKind::TreeInfer => PipelineState::TreeInfer,
            StageKind::SubtypeInfer => PipelineState::SubtypeInfer,
        }
    }
}

/// What a successful run hands back to the caller.
#[derive(Debug)]
pub struct RunOutput {
    pub report: PipelineReport,
    /// Files moved into the tree subdirectory.
    pub relocated: Vec<PathBuf>,
    /// `None` when packaging was disabled.
    pub archive: Option<ArchiveSummary>,
}

pub struct Pipeline {
    reference: ReferenceSet,
    tools: ToolSet,
    store: ArtifactStore,
    runner: StageRunner,
    reporter: Arc<dyn ProgressReporter>,
    package: bool,
    state: PipelineState,
    stages: Vec<StageAudit>,
    request: Option<AnalysisRequest>,
}

impl Pipeline {
    pub fn new(config: &Config, runner: StageRunner, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reference: config.reference.clone(),
            tools: config.tools.clone(),
            store: ArtifactStore::new(config.layout.clone(), &config.workspace_dir),
            runner,
            reporter,
            package: true,
            state: PipelineState::Init,
            stages: Vec::new(),
            request: None,
        }
    }

    /// Skip the final archive; the output directory is still reorganized.
    pub fn without_archive(mut self) -> Self {
        self.package = false;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// One record per stage that was launched, in launch order.
    pub fn stage_records(&self) -> &[StageAudit] {
        &self.stages
    }

    /// The parsed request, once the upload has been read.
    pub fn request(&self) -> Option<&AnalysisRequest> {
        self.request.as_ref()
    }

    /// Run the whole pipeline for `upload`, consuming it. The staged file is
    /// gone when this returns, whatever the outcome.
    pub async fn run(&mut self, upload: StagedUpload) -> Result<RunOutput, PipelineError> {
        let result = self.drive(upload.path()).await;
        upload.cleanup();

        if let Err(err) = &result {
            if !self.state.is_terminal() {
                self.transition(PipelineState::Failed);
            }
            tracing::error!(kind = err.kind(), error = %err, "pipeline run failed");
        }

        self.reporter.report(&ProgressEvent::Finished {
            success: result.is_ok(),
        });
        result
    }

    async fn drive(&mut self, upload: &Path) -> Result<RunOutput, PipelineError> {
        let request = AnalysisRequest::from_fasta(upload)?;
        tracing::info!(query_id = %request.query_id, length = request.query_length, "query parsed");
        self.reporter.report(&ProgressEvent::QueryParsed {
            query_id: request.query_id.clone(),
            query_length: request.query_length,
        });
        self.request = Some(request.clone());

        let _lock = self.store.prepare()?;
        let tools = self.tools.clone();
        let output_dir = self.store.output_dir().to_path_buf();

        let distance = self
            .execute(
                &DistanceStage {
                    tool: &tools.distance,
                    input: DistanceInput {
                        query_fasta: upload.to_path_buf(),
                        reference_panel: self.reference.panel.clone(),
                    },
                },
                Ok,
            )
            .await?;

        // Only the query id crosses from the upload into the tree stage;
        // the distance result does not.
        let tree_input = TreeInput::for_query(
            &request.query_id,
            upload,
            &self.reference.alignment,
            &self.reference.tree,
            &output_dir,
        );
        let prefix = tree_input.output_prefix.clone();
        let alignment = tree_input.output_alignment.clone();
        let (tree, tree_file) = self
            .execute(
                &TreeStage {
                    tool: &tools.tree,
                    input: tree_input,
                },
                |summary| {
                    let tree_file = TreeFile::locate(&prefix)?;
                    let result = MLTreeResult {
                        summary,
                        alignment: alignment.is_file().then(|| alignment.clone()),
                        tree_file: tree_file.path().to_path_buf(),
                    };
                    Ok((result, tree_file))
                },
            )
            .await?;

        let subtype = self
            .execute(
                &SubtypeStage {
                    tool: &tools.subtype,
                    input: SubtypeInput {
                        tree_file,
                        taxon_label: request.query_id.clone(),
                        subtype_table: self.reference.subtypes.clone(),
                    },
                },
                Ok,
            )
            .await?;

        self.transition(PipelineState::Aggregating);
        self.reporter
            .report(&ProgressEvent::Aggregating { fraction: 1.0 });
        let report = aggregate(request, distance, tree, subtype)?;
        self.transition(PipelineState::Done);

        let relocated = self.store.reorganize()?;
        let archive = if self.package {
            self.reporter.report(&ProgressEvent::Packaging { fraction: 1.0 });
            Some(self.store.package()?)
        } else {
            None
        };

        Ok(RunOutput {
            report,
            relocated,
            archive,
        })
    }

    /// Run one stage and pass its payload through `accept`, which may reject
    /// it with a stage error of its own.
    async fn execute<S, T>(
        &mut self,
        stage: &S,
        accept: impl FnOnce(S::Output) -> Result<T, StageError>,
    ) -> Result<T, PipelineError>
    where
        S: Stage,
    {
        let kind = S::KIND;
        self.transition(kind.into());

        let (start, end) = band(kind);
        self.reporter.report(&ProgressEvent::StageStarted {
            stage: kind,
            fraction: start,
        });

        let started_at = Utc::now();
        let ticker = spawn_ticker(Arc::clone(&self.reporter), kind);
        let outcome = self.runner.run_stage(stage).await;
        ticker.abort();

        let duration = outcome.duration;
        let exit_code = outcome.exit_code;
        let diagnostics = outcome.diagnostics;
        let result = outcome.result.and_then(accept);

        self.stages.push(StageAudit::new(
            kind,
            started_at,
            duration,
            exit_code,
            result.as_ref().err(),
            &diagnostics,
        ));

        match result {
            Ok(value) => {
                self.reporter.report(&ProgressEvent::StageCompleted {
                    stage: kind,
                    fraction: end,
                    duration_secs: duration.as_secs_f64(),
                });
                Ok(value)
            }
            Err(source) => {
                self.reporter.report(&ProgressEvent::StageFailed {
                    stage: kind,
                    reason: source.to_string(),
                });
                Err(PipelineError::Stage {
                    stage: kind,
                    source,
                    diagnostics,
                })
            }
        }
    }

    fn transition(&mut self, to: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal transition {:?} -> {:?}",
            self.state,
            to
        );
        tracing::debug!(from = ?self.state, to = ?to, "pipeline transition");
        self.state = to;
    }
}

/// Emit `StageRunning` once per tick until aborted.
fn spawn_ticker(reporter: Arc<dyn ProgressReporter>, stage: StageKind) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now();
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            reporter.report(&ProgressEvent::StageRunning {
                stage,
                elapsed_secs: start.elapsed().as_secs(),
            });
        }
    })
}
