//! Result Aggregator: validates the three stage payloads and merges them into
//! the final [`PipelineReport`].
//!
//! The subtype assignment is decided by the external subtype tool. Nothing
//! here recomputes it; the aggregator only checks that the conflict summary
//! agrees with the `conflicts` flag and formats the narrative.

use crate::errors::AggregationError;
use crate::query::AnalysisRequest;
use crate::stage::{MLTreeResult, PDistanceResult, SubtypeOutput};
use serde::{Deserialize, Serialize};

/// Assignment value reserved for an irresolvable conflict.
pub const NOT_DETERMINED: &str = "Not determined";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingTaxon {
    pub taxon: String,
    pub clade: String,
    pub subtype: String,
}

impl std::fmt::Display for ConflictingTaxon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (Clade {} Subtype {})",
            self.taxon, self.clade, self.subtype
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub conflicting_taxa: Vec<ConflictingTaxon>,
    pub clades: Vec<String>,
    pub subtypes: Vec<String>,
}

/// Validated subtype stage result. `conflict_summary` is `Some` exactly when
/// `conflicts` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtypeResult {
    pub closest_reference_ml: String,
    pub ml_distance: f64,
    pub conflicts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_summary: Option<ConflictSummary>,
    pub subtype_assignment: String,
}

impl SubtypeResult {
    pub fn is_irresolvable(&self) -> bool {
        self.conflicts && self.subtype_assignment == NOT_DETERMINED
    }
}

/// User-facing account of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictNarrative {
    /// The consensus could not be resolved; no clade or subtype is implied.
    pub irresolvable: bool,
    /// `"{taxon} (Clade {clade} Subtype {subtype})"`, in input order.
    pub taxa: Vec<String>,
    pub clades: Vec<String>,
    pub subtypes: Vec<String>,
}

/// The sole artifact shown to the user. Only built once every stage and the
/// aggregation check have succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub request: AnalysisRequest,
    pub distance: PDistanceResult,
    pub tree: MLTreeResult,
    pub subtype: SubtypeResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<ConflictNarrative>,
}

/// Validate `subtype` against its conflicts flag and assemble the report.
pub fn aggregate(
    request: AnalysisRequest,
    distance: PDistanceResult,
    tree: MLTreeResult,
    subtype: SubtypeOutput,
) -> Result<PipelineReport, AggregationError> {
    let subtype = validate_subtype(subtype)?;
    let narrative = subtype
        .conflict_summary
        .as_ref()
        .map(|summary| narrate(summary, subtype.is_irresolvable()));

    Ok(PipelineReport {
        request,
        distance,
        tree,
        subtype,
        narrative,
    })
}

fn validate_subtype(output: SubtypeOutput) -> Result<SubtypeResult, AggregationError> {
    let conflict_summary = if output.conflicts {
        let raw = output
            .conflict_summary
            .ok_or_else(|| malformed("conflicts flagged but conflict_summary is absent"))?;
        let summary: ConflictSummary =
            serde_json::from_value(raw).map_err(|e| malformed(e.to_string()))?;
        if summary.conflicting_taxa.is_empty() {
            return Err(malformed("conflicts flagged but conflicting_taxa is empty"));
        }
        Some(summary)
    } else {
        if output.conflict_summary.is_some() {
            tracing::warn!("conflict_summary present without conflicts flag; ignoring it");
        }
        None
    };

    Ok(SubtypeResult {
        closest_reference_ml: output.closest_reference_ml,
        ml_distance: output.ml_distance,
        conflicts: output.conflicts,
        conflict_summary,
        subtype_assignment: output.subtype_assignment,
    })
}

fn narrate(summary: &ConflictSummary, irresolvable: bool) -> ConflictNarrative {
    ConflictNarrative {
        irresolvable,
        taxa: summary
            .conflicting_taxa
            .iter()
            .map(ToString::to_string)
            .collect(),
        clades: dedup_in_order(&summary.clades),
        subtypes: dedup_in_order(&summary.subtypes),
    }
}

/// First occurrence wins; exact string equality.
fn dedup_in_order(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

fn malformed(reason: impl Into<String>) -> AggregationError {
    AggregationError::MalformedConflictSummary {
        reason: reason.into(),
    }
}
