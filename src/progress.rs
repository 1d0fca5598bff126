//! Per-candidate progress bars

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tdconvert::convert::Stage;
use tdconvert::discover::Candidate;
use tdconvert::Reporter;

pub struct Progress {
    bars: Vec<ProgressBar>,
}

impl Progress {
    /// One spinner per candidate, in batch order
    pub fn new(multi: &MultiProgress, candidates: &[Candidate]) -> Result<Self> {
        let style = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓")
            .template("{spinner} {prefix:.bold} {msg}")?;

        let bars = candidates
            .iter()
            .map(|candidate| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(display_name(&candidate.source));
                bar.set_message(format!("waiting ({})", candidate.kind));
                bar
            })
            .collect();

        Ok(Self { bars })
    }
}

impl Reporter for Progress {
    fn stage(&self, index: usize, _source: &Path, stage: Stage) {
        let Some(bar) = self.bars.get(index) else {
            return;
        };
        match stage {
            Stage::Reading => {
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_message("reading");
            }
            Stage::Connecting => bar.set_message("connecting"),
            Stage::Writing => bar.set_message("writing"),
            Stage::Done => bar.finish_with_message("done"),
            Stage::Failed => bar.finish_with_message("failed"),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
