//! Single-query analysis: `subtyper run <fasta>`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use subtyper::audit::{AuditLogger, QueryAudit, RunConfig, RunOutcome, UploadAudit};
use subtyper::config::Config;
use subtyper::pipeline::Pipeline;
use subtyper::query::StagedUpload;
use subtyper::report::{JsonOutcome, render_failure, render_report};
use subtyper::stage::StageRunner;
use subtyper::ui::{PipelineUI, UiMode};

/// Options for one `run` invocation.
pub struct RunArgs<'a> {
    /// FASTA file, or `-` for stdin
    pub input: &'a Path,
    pub json: bool,
    pub ui: &'a str,
    pub no_archive: bool,
}

/// Run the pipeline for one upload. Returns whether the analysis succeeded.
pub async fn cmd_run(config: &Config, args: RunArgs<'_>) -> Result<bool> {
    let upload = if args.input == Path::new("-") {
        StagedUpload::from_reader(std::io::stdin().lock())
            .context("Failed to stage query from stdin")?
    } else {
        StagedUpload::from_path(args.input)?
    };

    config.ensure_directories()?;

    let mut audit = AuditLogger::new(&config.audit_dir);
    let audit_enabled = match audit.start_run(
        RunConfig {
            workspace_dir: config.workspace_dir.clone(),
            output_dir: config.output_dir().to_path_buf(),
            reference_dir: config.reference.dir.clone(),
            python: config.python.clone(),
        },
        UploadAudit {
            sha256: upload.sha256().to_string(),
            bytes: upload.bytes(),
        },
    ) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "run history disabled for this run");
            false
        }
    };

    let mode = if args.json {
        UiMode::Json
    } else {
        UiMode::parse(args.ui)
    };
    let ui = Arc::new(PipelineUI::new(mode, config.verbose));

    let mut pipeline = Pipeline::new(config, StageRunner::process(), ui);
    if args.no_archive {
        pipeline = pipeline.without_archive();
    }

    let result = pipeline.run(upload).await;

    if audit_enabled {
        let outcome = match &result {
            Ok(output) => RunOutcome::Succeeded {
                subtype_assignment: output.report.subtype.subtype_assignment.clone(),
                archive: output.archive.as_ref().map(|a| a.path.clone()),
            },
            Err(err) => RunOutcome::failed(err),
        };
        if let Err(err) = record_run(&mut audit, &pipeline, outcome) {
            tracing::warn!(error = %err, "failed to record run history");
        }
    }

    match result {
        Ok(output) => {
            if args.json {
                let outcome = JsonOutcome::Success {
                    report: &output.report,
                    archive: output.archive.as_ref(),
                };
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", render_report(&output.report, output.archive.as_ref()));
            }
            Ok(true)
        }
        Err(err) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&JsonOutcome::failed(&err))?);
            } else {
                eprint!("{}", render_failure(&err));
            }
            Ok(false)
        }
    }
}

fn record_run(audit: &mut AuditLogger, pipeline: &Pipeline, outcome: RunOutcome) -> Result<()> {
    if let Some(request) = pipeline.request() {
        audit.set_query(QueryAudit {
            query_id: request.query_id.clone(),
            query_length: request.query_length,
        })?;
    }
    for stage in pipeline.stage_records() {
        audit.add_stage(stage.clone())?;
    }
    let path = audit.finish_run(outcome)?;
    tracing::debug!(path = %path.display(), "run recorded");
    Ok(())
}
