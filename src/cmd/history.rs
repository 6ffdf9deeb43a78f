//! Recorded runs: `subtyper history`.

use anyhow::Result;

use subtyper::audit::AuditLogger;
use subtyper::config::Config;

pub fn cmd_history(config: &Config, limit: usize) -> Result<()> {
    let audit = AuditLogger::new(&config.audit_dir);
    let runs = audit.list_runs()?;

    if runs.is_empty() {
        println!("No runs recorded in {}", config.audit_dir.join("runs").display());
        return Ok(());
    }

    for path in runs.iter().take(limit) {
        let run = match audit.load_run(path) {
            Ok(run) => run,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable run file"
                );
                continue;
            }
        };
        let id = run.run_id.to_string();
        let query = run
            .query
            .as_ref()
            .map(|q| q.query_id.as_str())
            .unwrap_or("-");
        let duration = run
            .duration()
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<20} {:>8}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            &id[..8],
            query,
            duration,
            run.outcome.label()
        );
    }

    if runs.len() > limit {
        println!("... {} older run(s) not shown", runs.len() - limit);
    }
    Ok(())
}
