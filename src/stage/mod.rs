//! Stage Runner: executes one external analysis tool and decodes its artifact.
//!
//! Each tool is described by a type implementing [`Stage`]: an explicit input
//! struct that knows how to lay itself out as positional arguments, and an
//! output type implementing [`Artifact`]. [`StageRunner`] is the one generic
//! executor for all of them.
//!
//! Tools report through a JSON file at a fixed path rather than stdout. The
//! runner launches the process, waits for it, keeps whatever it wrote to
//! stderr, and only then looks for the artifact. It never writes anything
//! itself.

pub mod distance;
pub mod executor;
pub mod subtype;
pub mod tree;

pub use distance::{DistanceInput, DistanceStage, PDistanceResult};
pub use executor::{ProcessExecutor, ProcessReport, StageExecutor};
pub use subtype::{SubtypeInput, SubtypeOutput, SubtypeStage};
pub use tree::{MLTreeResult, MlTreeSummary, TreeFile, TreeInput, TreeStage};

use crate::errors::StageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The three external analysis steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Distance,
    TreeInfer,
    SubtypeInfer,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [
        StageKind::Distance,
        StageKind::TreeInfer,
        StageKind::SubtypeInfer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Distance => "Distance",
            StageKind::TreeInfer => "TreeInfer",
            StageKind::SubtypeInfer => "SubtypeInfer",
        }
    }

    /// Human-readable activity shown while the stage runs.
    pub fn activity(&self) -> &'static str {
        match self {
            StageKind::Distance => "Calculating p-distance",
            StageKind::TreeInfer => "Inferring new ML tree",
            StageKind::SubtypeInfer => "Inferring subtype",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One positional argument of a stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageArg {
    /// A file argument; must be absolute.
    Path(PathBuf),
    /// A plain value such as a taxon label.
    Text(String),
}

impl StageArg {
    fn to_os_string(&self) -> OsString {
        match self {
            StageArg::Path(path) => path.clone().into_os_string(),
            StageArg::Text(text) => OsString::from(text),
        }
    }
}

/// How to launch one external tool: program, optional script, working
/// directory and the well-known artifact path it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub script: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub artifact: PathBuf,
}

impl ToolCommand {
    /// Build the full stage spec: the script path (if any) followed by the
    /// stage's own positional arguments.
    pub fn spec(&self, stage: StageKind, args: Vec<StageArg>) -> StageSpec {
        let mut all_args = Vec::with_capacity(args.len() + 1);
        if let Some(script) = &self.script {
            all_args.push(StageArg::Path(script.clone()));
        }
        all_args.extend(args);
        StageSpec {
            stage,
            program: self.program.clone(),
            args: all_args,
            working_dir: self.working_dir.clone(),
            output_path: self.artifact.clone(),
        }
    }
}

/// A fully-resolved invocation of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub stage: StageKind,
    pub program: String,
    pub args: Vec<StageArg>,
    pub working_dir: PathBuf,
    pub output_path: PathBuf,
}

impl StageSpec {
    /// Reject any non-absolute file argument, working directory or output path.
    pub fn validate(&self) -> Result<(), StageError> {
        let paths = self
            .args
            .iter()
            .filter_map(|arg| match arg {
                StageArg::Path(path) => Some(path.as_path()),
                StageArg::Text(_) => None,
            })
            .chain([self.working_dir.as_path(), self.output_path.as_path()]);
        for path in paths {
            if !path.is_absolute() {
                return Err(StageError::RelativePath {
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    pub fn os_args(&self) -> Vec<OsString> {
        self.args.iter().map(StageArg::to_os_string).collect()
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            match arg {
                StageArg::Path(path) => line.push_str(&path.display().to_string()),
                StageArg::Text(text) => line.push_str(text),
            }
        }
        line
    }
}

/// A structured artifact a stage writes to its output path.
pub trait Artifact: DeserializeOwned {
    /// Semantic checks beyond the JSON shape; an `Err` is reported as
    /// `MalformedArtifact`.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A typed stage: explicit input, explicit output.
pub trait Stage {
    type Output: Artifact;

    const KIND: StageKind;

    fn spec(&self) -> StageSpec;
}

/// Everything the Controller learns from one stage invocation.
///
/// The payload is present only when `result` is `Ok`.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub stage: StageKind,
    pub exit_code: Option<i32>,
    pub diagnostics: String,
    pub duration: Duration,
    pub result: Result<T, StageError>,
}

/// Generic executor for every [`Stage`].
#[derive(Clone)]
pub struct StageRunner {
    executor: Arc<dyn StageExecutor>,
}

impl StageRunner {
    pub fn new(executor: Arc<dyn StageExecutor>) -> Self {
        Self { executor }
    }

    /// Runner backed by real subprocesses.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessExecutor))
    }

    pub async fn run_stage<S: Stage>(&self, stage: &S) -> StageOutcome<S::Output> {
        self.run(&stage.spec()).await
    }

    /// Execute `spec` once and decode its artifact as `T`. No retries.
    pub async fn run<T: Artifact>(&self, spec: &StageSpec) -> StageOutcome<T> {
        if let Err(err) = spec.validate() {
            return StageOutcome {
                stage: spec.stage,
                exit_code: None,
                diagnostics: String::new(),
                duration: Duration::ZERO,
                result: Err(err),
            };
        }

        tracing::info!(stage = %spec.stage, command = %spec.command_line(), "launching stage");

        let report = match self.executor.execute(spec).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(stage = %spec.stage, error = %err, "stage could not be launched");
                return StageOutcome {
                    stage: spec.stage,
                    exit_code: None,
                    diagnostics: String::new(),
                    duration: Duration::ZERO,
                    result: Err(err),
                };
            }
        };

        tracing::debug!(
            stage = %spec.stage,
            exit_code = report.exit_code,
            elapsed_secs = report.duration.as_secs_f64(),
            stdout = %report.stdout.trim_end(),
            "stage process finished"
        );

        let result = if report.exit_code != 0 {
            Err(StageError::ProcessFailure {
                exit_code: report.exit_code,
                diagnostics: report.diagnostics.clone(),
            })
        } else {
            decode_artifact::<T>(&spec.output_path)
        };

        if let Err(err) = &result {
            tracing::warn!(stage = %spec.stage, error = %err, "stage failed");
        }

        StageOutcome {
            stage: spec.stage,
            exit_code: Some(report.exit_code),
            diagnostics: report.diagnostics,
            duration: report.duration,
            result,
        }
    }
}

/// Open and decode the artifact at `path`.
pub fn decode_artifact<T: Artifact>(path: &Path) -> Result<T, StageError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StageError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        Err(err) => {
            return Err(StageError::MalformedArtifact {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
        }
    };

    let value: T =
        serde_json::from_str(&content).map_err(|err| StageError::MalformedArtifact {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    value
        .check()
        .map_err(|reason| StageError::MalformedArtifact {
            path: path.to_path_buf(),
            reason,
        })?;

    Ok(value)
}


#[cfg(test)]
mod tests {
    use super::testing::{create_test_script, sh_tool};
    use super::*;
    use tempfile::tempdir;

    fn spec_for(tool: &ToolCommand) -> StageSpec {
        tool.spec(StageKind::Distance, vec![])
    }

    #[test]
    fn stage_order_is_distance_tree_subtype() {
        assert_eq!(
            StageKind::ALL,
            [
                StageKind::Distance,
                StageKind::TreeInfer,
                StageKind::SubtypeInfer
            ]
        );
    }

    #[test]
    fn spec_prepends_script_path() {
        let tool = ToolCommand {
            program: "python3".into(),
            script: Some(PathBuf::from("/opt/tools/p-distance-calc.py")),
            working_dir: PathBuf::from("/work"),
            artifact: PathBuf::from("/work/output/p_distance_output.json"),
        };
        let spec = tool.spec(
            StageKind::Distance,
            vec![StageArg::Path(PathBuf::from("/tmp/q.fasta"))],
        );
        assert_eq!(
            spec.command_line(),
            "python3 /opt/tools/p-distance-calc.py /tmp/q.fasta"
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn spec_rejects_relative_file_arguments() {
        let tool = ToolCommand {
            program: "python3".into(),
            script: None,
            working_dir: PathBuf::from("/work"),
            artifact: PathBuf::from("/work/output/p_distance_output.json"),
        };
        let spec = tool.spec(
            StageKind::Distance,
            vec![
                StageArg::Path(PathBuf::from("reference_genomes.fa")),
                StageArg::Text("not-a-path".into()),
            ],
        );
        match spec.validate() {
            Err(StageError::RelativePath { path }) => {
                assert_eq!(path, PathBuf::from("reference_genomes.fa"))
            }
            other => panic!("Expected RelativePath, got {:?}", other),
        }
    }

    #[test]
    fn text_arguments_are_not_path_checked() {
        let tool = ToolCommand {
            program: "python3".into(),
            script: None,
            working_dir: PathBuf::from("/work"),
            artifact: PathBuf::from("/work/output/subtype_output.json"),
        };
        let spec = tool.spec(StageKind::SubtypeInfer, vec![StageArg::Text("Q1".into())]);
        assert!(spec.validate().is_ok());
    }

    #[derive(Debug, Deserialize)]
    struct Probe {
        value: f64,
    }

    impl Artifact for Probe {
        fn check(&self) -> Result<(), String> {
            if self.value < 0.0 {
                return Err("value must be non-negative".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_process_failure_with_stderr() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("out.json");
        let script = create_test_script(
            dir.path(),
            "fail.sh",
            "echo 'reference panel missing' >&2\nexit 3\n",
        );
        let tool = sh_tool(&script, dir.path(), &artifact);

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert_eq!(outcome.exit_code, Some(3));
        match outcome.result.as_ref().err() {
            Some(StageError::ProcessFailure {
                exit_code,
                diagnostics,
            }) => {
                assert_eq!(*exit_code, 3);
                assert_eq!(diagnostics, "reference panel missing\n");
            }
            other => panic!("Expected ProcessFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn clean_exit_without_artifact_is_missing_artifact() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("out.json");
        let script = create_test_script(dir.path(), "noop.sh", "exit 0\n");
        let tool = sh_tool(&script, dir.path(), &artifact);

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert!(matches!(
            outcome.result.as_ref().err(),
            Some(StageError::MissingArtifact { path }) if path == &artifact
        ));
    }

    #[tokio::test]
    async fn undecodable_artifact_is_malformed() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("out.json");
        let script = create_test_script(
            dir.path(),
            "garbage.sh",
            &format!("printf 'not json' > '{}'\n", artifact.display()),
        );
        let tool = sh_tool(&script, dir.path(), &artifact);

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert!(matches!(
            outcome.result.as_ref().err(),
            Some(StageError::MalformedArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn failed_semantic_check_is_malformed() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("out.json");
        let script = create_test_script(
            dir.path(),
            "negative.sh",
            &format!("echo '{{\"value\": -1.0}}' > '{}'\n", artifact.display()),
        );
        let tool = sh_tool(&script, dir.path(), &artifact);

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        match outcome.result.as_ref().err() {
            Some(StageError::MalformedArtifact { reason, .. }) => {
                assert!(reason.contains("non-negative"))
            }
            other => panic!("Expected MalformedArtifact, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn success_decodes_payload_and_keeps_stderr() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("out.json");
        let script = create_test_script(
            dir.path(),
            "ok.sh",
            &format!(
                "echo 'warning: 3 ambiguous bases' >&2\necho '{{\"value\": 0.5}}' > '{}'\n",
                artifact.display()
            ),
        );
        let tool = sh_tool(&script, dir.path(), &artifact);

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.diagnostics, "warning: 3 ambiguous bases\n");
        let probe = outcome.result.unwrap();
        assert_eq!(probe.value, 0.5);
    }

    #[tokio::test]
    async fn relative_spec_is_rejected_before_launch() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("launched");
        let script = create_test_script(
            dir.path(),
            "touch.sh",
            &format!("touch '{}'\n", marker.display()),
        );
        let mut tool = sh_tool(&script, dir.path(), Path::new("output/out.json"));
        tool.artifact = PathBuf::from("output/out.json");

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert!(matches!(
            outcome.result.as_ref().err(),
            Some(StageError::RelativePath { .. })
        ));
        assert_eq!(outcome.exit_code, None);
        assert!(!marker.exists(), "tool must not run for an invalid spec");
    }

    #[tokio::test]
    async fn unknown_program_is_spawn_failure() {
        let dir = tempdir().unwrap();
        let tool = ToolCommand {
            program: "/nonexistent/bin/subtyper-test-tool".into(),
            script: None,
            working_dir: dir.path().to_path_buf(),
            artifact: dir.path().join("out.json"),
        };

        let outcome = StageRunner::process().run::<Probe>(&spec_for(&tool)).await;

        assert!(matches!(
            outcome.result.as_ref().err(),
            Some(StageError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn decode_missing_file() {
        let dir = tempdir().unwrap();
        let err = decode_artifact::<Probe>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), "missing_artifact");
    }
}
