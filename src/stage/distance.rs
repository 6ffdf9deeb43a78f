//! Distance stage: fast nearest-reference estimate by p-distance.

use super::{Artifact, Stage, StageArg, StageKind, StageSpec, ToolCommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decoded `p_distance_output.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PDistanceResult {
    pub closest_reference: String,
    pub p_distance: f64,
    pub below_cutoff: bool,
}

impl Artifact for PDistanceResult {
    fn check(&self) -> Result<(), String> {
        if self.closest_reference.trim().is_empty() {
            return Err("closest_reference is empty".to_string());
        }
        if !self.p_distance.is_finite() || !(0.0..=1.0).contains(&self.p_distance) {
            return Err(format!(
                "p_distance {} is outside [0, 1]",
                self.p_distance
            ));
        }
        Ok(())
    }
}

/// Positional inputs: query sequence, then reference panel.
#[derive(Debug, Clone)]
pub struct DistanceInput {
    pub query_fasta: PathBuf,
    pub reference_panel: PathBuf,
}

pub struct DistanceStage<'a> {
    pub tool: &'a ToolCommand,
    pub input: DistanceInput,
}

impl Stage for DistanceStage<'_> {
    type Output = PDistanceResult;

    const KIND: StageKind = StageKind::Distance;

    fn spec(&self) -> StageSpec {
        self.tool.spec(
            Self::KIND,
            vec![
                StageArg::Path(self.input.query_fasta.clone()),
                StageArg::Path(self.input.reference_panel.clone()),
            ],
        )
    }
}
