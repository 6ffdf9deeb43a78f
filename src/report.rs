//! Rendering of a finished run for the terminal (`text`) or for machines
//! (`--json`).

use crate::aggregate::PipelineReport;
use crate::artifacts::ArchiveSummary;
use crate::errors::PipelineError;
use crate::stage::StageKind;
use serde::Serialize;
use std::fmt::Write;

/// Plain-text report: summary statistics, both distance results, the
/// conflict summary when there is one, and the subtype assignment.
pub fn render_report(report: &PipelineReport, archive: Option<&ArchiveSummary>) -> String {
    let mut out = String::new();
    let request = &report.request;
    let distance = &report.distance;
    let subtype = &report.subtype;

    let _ = writeln!(out, "Summary Statistics");
    let _ = writeln!(out, "  Query ID: {}", request.query_id);
    let _ = writeln!(out, "  Query Length: {}", request.query_length);
    let _ = writeln!(out);

    let _ = writeln!(out, "P-Distance Results");
    let _ = writeln!(
        out,
        "  * Closest Reference: {} ({:.4})",
        distance.closest_reference, distance.p_distance
    );
    let _ = writeln!(out, "  * Below Cutoff: {}", distance.below_cutoff);
    let _ = writeln!(out);

    let _ = writeln!(out, "ML Patristic Distance Results");
    let _ = writeln!(
        out,
        "  * Closest Reference: {} ({:.4})",
        subtype.closest_reference_ml, subtype.ml_distance
    );
    let _ = writeln!(out, "  * Conflicts: {}", subtype.conflicts);

    if let Some(narrative) = &report.narrative {
        let _ = writeln!(out);
        let _ = writeln!(out, "Conflict Summary");
        if narrative.irresolvable {
            let _ = writeln!(
                out,
                "  * Consensus Assignment: Not determined due to conflicts."
            );
        }
        let _ = writeln!(out, "  * Conflicting Taxa: {}", narrative.taxa.join(", "));
        let _ = writeln!(out, "  * Conflicting Clades: {}", narrative.clades.join(", "));
        let _ = writeln!(
            out,
            "  * Conflicting Subtypes: {}",
            narrative.subtypes.join(", ")
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Subtype Assignment: {}", subtype.subtype_assignment);

    if let Some(archive) = archive {
        let _ = writeln!(
            out,
            "Archive: {} ({} files, {} bytes)",
            archive.path.display(),
            archive.members.len(),
            archive.size_bytes
        );
    }

    out
}

/// Stage-qualified failure message followed by the tool's diagnostics.
pub fn render_failure(err: &PipelineError) -> String {
    let mut out = match err.stage() {
        Some(stage) => format!("Analysis failed at stage {}: {}\n", stage, stage_reason(err)),
        None => format!("Analysis failed: {}\n", err),
    };
    if let Some(diagnostics) = err.diagnostics() {
        out.push_str("Diagnostics:\n");
        out.push_str(&textwrap::indent(diagnostics.trim_end(), "    "));
        out.push('\n');
    }
    out
}

fn stage_reason(err: &PipelineError) -> String {
    match err {
        PipelineError::Stage { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Machine-readable run result printed by `run --json`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JsonOutcome<'a> {
    Success {
        report: &'a PipelineReport,
        #[serde(skip_serializing_if = "Option::is_none")]
        archive: Option<&'a ArchiveSummary>,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<StageKind>,
        kind: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostics: Option<&'a str>,
    },
}

impl<'a> JsonOutcome<'a> {
    pub fn failed(err: &'a PipelineError) -> Self {
        JsonOutcome::Failed {
            stage: err.stage(),
            kind: err.kind(),
            message: err.to_string(),
            diagnostics: err.diagnostics(),
        }
    }
}
