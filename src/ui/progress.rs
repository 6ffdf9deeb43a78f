//! Terminal rendering of pipeline progress.
//!
//! Three output modes:
//! - `full`: an `indicatif` bar driven by stage bands, with a spinner while a
//!   tool runs
//! - `minimal`: one line per stage transition
//! - `json`: one JSON object per event, for machine consumption
//!
//! Everything goes to stderr so stdout stays free for the report.

use crate::progress::{ProgressEvent, ProgressReporter};
use crate::ui::icons::{CHECK, CLOCK, CROSS, DNA, PACKAGE, RUNNING, SPARKLE};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::time::Duration;

/// Output mode for the progress UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bar with colors
    #[default]
    Full,
    /// Single-line status updates
    Minimal,
    /// JSON-formatted events
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    /// Parse UI mode from string (convenience method).
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// Progress UI for a single pipeline run.
pub struct PipelineUI {
    mode: UiMode,
    bar: ProgressBar,
    verbose: bool,
    term: Term,
}

impl PipelineUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let term = Term::stderr();
        let bar = match mode {
            UiMode::Full => {
                let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
                let style = ProgressStyle::default_bar()
                    .template("{spinner} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .expect("progress bar template is a valid static string")
                    .progress_chars("█▓▒░");
                bar.set_style(style);
                bar
            }
            _ => ProgressBar::hidden(),
        };

        Self {
            mode,
            bar,
            verbose,
            term,
        }
    }

    /// Print above the bar, falling back to `eprintln!` if the terminal is gone.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            if writeln!(&self.term, "{}", msg.as_ref()).is_err() {
                eprintln!("{}", msg.as_ref());
            }
        } else {
            self.bar.println(msg.as_ref());
        }
    }

    fn set_fraction(&self, fraction: f64) {
        let pos = (fraction.clamp(0.0, 1.0) * 100.0).round() as u64;
        // Never move backwards.
        if pos > self.bar.position() {
            self.bar.set_position(pos);
        }
    }

    fn handle_json(&self, event: &ProgressEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::QueryParsed {
                query_id,
                query_length,
            } => {
                self.print_line(format!("Query {} ({} bp)", query_id, query_length));
            }
            ProgressEvent::StageStarted { stage, .. } => {
                self.print_line(format!("{}...", stage.activity()));
            }
            ProgressEvent::StageCompleted {
                stage,
                duration_secs,
                ..
            } => {
                self.print_line(format!("✓ {} ({:.1}s)", stage, duration_secs));
            }
            ProgressEvent::StageFailed { stage, reason } => {
                self.print_line(format!("✗ {} ({})", stage, reason));
            }
            ProgressEvent::Finished { success } => {
                self.print_line(format!("Done {}", if *success { "✓" } else { "✗" }));
            }
            _ => {}
        }
    }

    fn handle_full(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::QueryParsed {
                query_id,
                query_length,
            } => {
                self.print_line(format!(
                    "{}Query {} {}",
                    DNA,
                    style(query_id).cyan().bold(),
                    style(format!("({} bp)", query_length)).dim()
                ));
            }
            ProgressEvent::StageStarted { stage, fraction } => {
                self.set_fraction(*fraction);
                self.bar.set_message(format!("{}...", stage.activity()));
                self.bar.enable_steady_tick(Duration::from_millis(100));
                if self.verbose {
                    self.print_line(format!("{}{}", RUNNING, style(stage).yellow()));
                }
            }
            ProgressEvent::StageRunning {
                stage,
                elapsed_secs,
            } => {
                self.bar.set_message(format!(
                    "{}... {}",
                    stage.activity(),
                    style(format!("({})", format_elapsed(*elapsed_secs))).dim()
                ));
            }
            ProgressEvent::StageCompleted {
                stage,
                fraction,
                duration_secs,
            } => {
                self.set_fraction(*fraction);
                self.print_line(format!(
                    "{}{} {}",
                    CHECK,
                    stage,
                    style(format!("{}{:.1}s", CLOCK, duration_secs)).dim()
                ));
            }
            ProgressEvent::StageFailed { stage, reason } => {
                self.bar.abandon_with_message(format!(
                    "{}{} failed: {}",
                    CROSS,
                    style(stage).red().bold(),
                    reason
                ));
            }
            ProgressEvent::Aggregating { fraction } => {
                self.set_fraction(*fraction);
                self.bar.set_message("Aggregating results...");
            }
            ProgressEvent::Packaging { fraction } => {
                self.set_fraction(*fraction);
                self.bar
                    .set_message(format!("{}Packaging output...", PACKAGE));
            }
            ProgressEvent::Finished { success } => {
                if *success {
                    self.bar
                        .finish_with_message(format!("{}Analysis complete", SPARKLE));
                } else if !self.bar.is_finished() {
                    self.bar
                        .abandon_with_message(format!("{}Analysis failed", CROSS));
                }
            }
        }
    }
}

impl ProgressReporter for PipelineUI {
    fn report(&self, event: &ProgressEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }
}

fn format_elapsed(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
