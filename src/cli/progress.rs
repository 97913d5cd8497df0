use std::time::Instant;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::models::{ExecutionSignal, Severity};
use crate::pipeline::{ScanEvent, STAGES};

/// Live stage bar and status line fed by orchestrator events.
pub struct ScanProgress {
    multi: MultiProgress,
    stage_bar: Option<ProgressBar>,
    status_bar: ProgressBar,
    attempts: usize,
    findings: usize,
    current_point: String,
    start_time: Instant,
}

impl ScanProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status_bar.set_message("Launching browser...");
        status_bar.enable_steady_tick(std::time::Duration::from_millis(120));

        Self {
            multi,
            stage_bar: None,
            status_bar,
            attempts: 0,
            findings: 0,
            current_point: String::new(),
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::SessionStarted { target, seed, .. } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(STAGES.len() as u64 - 1));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("  {bar:30.cyan/dark_gray} {pos}/{len} stages | {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("█▓░"),
                );
                bar.set_message(format!("Scanning {} (seed {})", target, seed));
                self.stage_bar = Some(bar);
                self.update_status();
            }
            ScanEvent::StageEntered { stage, display_name } => {
                if let Some(bar) = &self.stage_bar {
                    let pos = STAGES.iter().position(|d| d.stage == *stage).unwrap_or(0);
                    bar.set_position(pos as u64);
                    bar.set_message(display_name.clone());
                }
                self.update_status();
            }
            ScanEvent::PointStarted { point, context, eligible } => {
                self.current_point = format!("{} [{}] {} candidates", point, context, eligible);
                self.update_status();
            }
            ScanEvent::AttemptCompleted { .. } => {
                self.attempts += 1;
                self.update_status();
            }
            ScanEvent::FindingRecorded { id, point, signal, severity, score } => {
                self.findings += 1;
                let mark = match signal {
                    ExecutionSignal::Confirmed => style("✔").green().bold(),
                    _ => style("?").yellow().bold(),
                };
                let sev = match severity {
                    Severity::Critical | Severity::High => style(severity.as_str()).red(),
                    Severity::Medium => style(severity.as_str()).yellow(),
                    _ => style(severity.as_str()).dim(),
                };
                self.println(&format!("  {} {} {} {} ({} {})", mark, id, signal, point, sev, score));
                self.update_status();
            }
            ScanEvent::SessionFinished { findings, attempts, error } => {
                let elapsed = format_elapsed(self.start_time.elapsed().as_millis() as u64);
                match error {
                    Some(error) => {
                        if let Some(bar) = self.stage_bar.take() {
                            bar.abandon_with_message("Aborted");
                        }
                        self.status_bar.finish_with_message(format!(
                            "Scan aborted after {} attempts, {} findings kept: {}",
                            attempts, findings, error
                        ));
                    }
                    None => {
                        if let Some(bar) = self.stage_bar.take() {
                            bar.finish_with_message("All stages complete");
                        }
                        self.status_bar.finish_with_message(format!(
                            "Scan complete: {} findings | {} attempts | {}",
                            findings, attempts, elapsed
                        ));
                    }
                }
            }
        }
    }

    fn update_status(&self) {
        let elapsed = format_elapsed(self.start_time.elapsed().as_millis() as u64);
        self.status_bar.set_message(format!(
            "{} | {} attempts | {} findings | {}",
            elapsed, self.attempts, self.findings, self.current_point,
        ));
    }

    /// Print above the bars without tearing them.
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    if mins > 0 {
        format!("{}m{}s", mins, remaining_secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(4_500), "4s");
        assert_eq!(format_elapsed(125_000), "2m5s");
    }
}
