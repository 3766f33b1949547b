//! Progress bars for chunked transfers

use indicatif::{ProgressBar, ProgressStyle};
use rkflash_core::progress::Progress;

/// Bar template: the phase is fixed, `{msg}` carries the completion status
fn bar_template(phase: &str) -> String {
    format!(
        "{{spinner:.green}} {} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] \
         {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {{msg}}",
        phase
    )
}

/// Create a progress bar with custom phase message
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&bar_template(phase))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Progress reporter using an indicatif progress bar
///
/// A bar is created on `start` and finished on `stop`. If an operation fails
/// midway the bar is abandoned when the reporter is dropped.
pub struct IndicatifProgress {
    current_bar: Option<ProgressBar>,
    phase: &'static str,
}

impl IndicatifProgress {
    pub fn new(phase: &'static str) -> Self {
        Self {
            current_bar: None,
            phase,
        }
    }
}

impl Progress for IndicatifProgress {
    fn start(&mut self, total_bytes: u64) {
        let pb = create_progress_bar_with_phase(total_bytes, self.phase)
            .unwrap_or_else(|_| ProgressBar::new(total_bytes));
        self.current_bar = Some(pb);
    }

    fn update(&mut self, delta_bytes: u64) {
        if let Some(pb) = &self.current_bar {
            pb.inc(delta_bytes);
        }
    }

    fn stop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(format!("{} complete", self.phase));
        }
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message(format!("{} failed", self.phase));
        }
    }
}
