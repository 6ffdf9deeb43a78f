//! TreeInfer stage: place the query into the reference tree and re-optimise.
//!
//! The JSON summary the tool writes is opaque to us. The real payload is two
//! side files: the updated alignment and `{prefix}.treefile`, which the
//! subtype stage consumes.

use super::{Artifact, Stage, StageArg, StageKind, StageSpec, ToolCommand};
use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension the tree tool appends to the output prefix.
pub const TREEFILE_EXTENSION: &str = "treefile";

/// Decoded `ml_tree_output.json`. Any JSON object is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MlTreeSummary(pub serde_json::Value);

impl Artifact for MlTreeSummary {
    fn check(&self) -> Result<(), String> {
        if !self.0.is_object() {
            return Err("tree summary is not a JSON object".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TreeInput {
    pub reference_alignment: PathBuf,
    pub query_fasta: PathBuf,
    pub reference_tree: PathBuf,
    pub output_alignment: PathBuf,
    pub output_prefix: PathBuf,
}

impl TreeInput {
    /// Derive both output paths from the query identifier:
    /// `{output_dir}/{id}_updated.fasta` and `{output_dir}/{id}_reoptimised`.
    pub fn for_query(
        query_id: &str,
        query_fasta: &Path,
        reference_alignment: &Path,
        reference_tree: &Path,
        output_dir: &Path,
    ) -> Self {
        Self {
            reference_alignment: reference_alignment.to_path_buf(),
            query_fasta: query_fasta.to_path_buf(),
            reference_tree: reference_tree.to_path_buf(),
            output_alignment: output_dir.join(format!("{query_id}_updated.fasta")),
            output_prefix: output_dir.join(format!("{query_id}_reoptimised")),
        }
    }

}

/// `{prefix}.treefile`. The prefix may itself contain dots, so the
/// extension is appended rather than substituted.
pub fn tree_file_path(prefix: &Path) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(TREEFILE_EXTENSION);
    PathBuf::from(name)
}

/// A tree file known to exist on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile(PathBuf);

impl TreeFile {
    /// Confirm the tree produced for `prefix` exists. Its absence is a
    /// `MissingArtifact` of the tree stage.
    pub fn locate(prefix: &Path) -> Result<Self, StageError> {
        let path = tree_file_path(prefix);
        if path.is_file() {
            Ok(Self(path))
        } else {
            Err(StageError::MissingArtifact { path })
        }
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Everything the tree stage yields to the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MLTreeResult {
    pub summary: MlTreeSummary,
    /// Updated alignment, when the tool wrote one.
    pub alignment: Option<PathBuf>,
    pub tree_file: PathBuf,
}

pub struct TreeStage<'a> {
    pub tool: &'a ToolCommand,
    pub input: TreeInput,
}

impl Stage for TreeStage<'_> {
    type Output = MlTreeSummary;

    const KIND: StageKind = StageKind::TreeInfer;

    fn spec(&self) -> StageSpec {
        let input = &self.input;
        self.tool.spec(
            Self::KIND,
            vec![
                StageArg::Path(input.reference_alignment.clone()),
                StageArg::Path(input.query_fasta.clone()),
                StageArg::Path(input.reference_tree.clone()),
                StageArg::Path(input.output_alignment.clone()),
                StageArg::Path(input.output_prefix.clone()),
            ],
        )
    }
}
