//! SubtypeInfer stage: patristic distances on the re-optimised tree.

use super::{Artifact, Stage, StageArg, StageKind, StageSpec, ToolCommand, TreeFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decoded `subtype_output.json`.
///
/// `conflict_summary` is kept as raw JSON here; its shape is validated
/// against the `conflicts` flag by the aggregator, which owns that error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeOutput {
    pub closest_reference_ml: String,
    pub ml_distance: f64,
    pub conflicts: bool,
    #[serde(default)]
    pub conflict_summary: Option<serde_json::Value>,
    pub subtype_assignment: String,
}

impl Artifact for SubtypeOutput {
    fn check(&self) -> Result<(), String> {
        if !self.ml_distance.is_finite() || self.ml_distance < 0.0 {
            return Err(format!("ml_distance {} is not a distance", self.ml_distance));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SubtypeInput {
    pub tree_file: TreeFile,
    /// Must be the query identifier used to label the new leaf.
    pub taxon_label: String,
    pub subtype_table: PathBuf,
}

pub struct SubtypeStage<'a> {
    pub tool: &'a ToolCommand,
    pub input: SubtypeInput,
}

impl Stage for SubtypeStage<'_> {
    type Output = SubtypeOutput;

    const KIND: StageKind = StageKind::SubtypeInfer;

    fn spec(&self) -> StageSpec {
        self.tool.spec(
            Self::KIND,
            vec![
                StageArg::Path(self.input.tree_file.path().to_path_buf()),
                StageArg::Text(self.input.taxon_label.clone()),
                StageArg::Path(self.input.subtype_table.clone()),
            ],
        )
    }
}
