//! 📊 Progress: a spinner while lines go by, and a table so comfy it has lumbar support
//! once they stop.

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

/// 🧮 What happened to every line we read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    /// Validated and handed to the sink.
    pub(crate) accepted: u64,
    /// Unparseable line, or the validator said no.
    pub(crate) rejected: u64,
    /// Validated, then the sink or transport said no.
    pub(crate) failed: u64,
}

impl Tally {
    pub(crate) fn total(&self) -> u64 {
        self.accepted + self.rejected + self.failed
    }

    /// 🎨 Renders the final score.
    pub(crate) fn render(&self, elapsed: Duration) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["outcome", "records"]);
        for (label, count) in [
            ("✅ accepted", self.accepted),
            ("🚫 rejected", self.rejected),
            ("💀 failed", self.failed),
            ("📦 total", self.total()),
        ] {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(count).set_alignment(CellAlignment::Right),
            ]);
        }
        format!("{table}\n⏱️ {:.2}s", elapsed.as_secs_f64())
    }
}

/// 🌀 The spinner and the stopwatch, bundled.
pub(crate) struct Progress {
    spinner: ProgressBar,
    started: Instant,
}

impl Progress {
    pub(crate) fn start() -> Self {
        let spinner = ProgressBar::new_spinner();
        // -- a bad template only costs us the styling, never the run
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self {
            spinner,
            started: Instant::now(),
        }
    }

    pub(crate) fn update(&self, tally: &Tally) {
        self.spinner.set_message(format!(
            "{} accepted, {} rejected, {} failed",
            tally.accepted, tally.rejected, tally.failed
        ));
    }

    pub(crate) fn finish(&self, tally: &Tally) -> String {
        self.spinner.finish_and_clear();
        tally.render(self.started.elapsed())
    }
}
