use std::fmt;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

pub fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64) * 100.0
}

pub fn spinner_frame(processed: usize) -> char {
    SPINNER[processed % SPINNER.len()]
}

/// Single redrawn status line plus the log lines printed above it.
///
/// Every call is made while the aggregator lock is held, which keeps the line
/// and the log output from interleaving between workers.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    total: usize,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("total", &self.total)
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(total: usize) -> Result<Self, String> {
        let bar = ProgressBar::new(total as u64);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template(
                ":: Progress: {msg} :: [{pos}/{len}] :: Duration: [{elapsed_precise}]",
            )
            .map_err(|e| format!("failed to build progress bar style: {e}"))?,
        );
        let reporter = Self { bar, total };
        reporter.render(0);
        Ok(reporter)
    }

    pub fn hidden(total: usize) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn render(&self, processed: usize) {
        self.bar.set_position(processed as u64);
        self.bar.set_message(format!(
            "{:.2}% {}",
            percentage(processed, self.total),
            spinner_frame(processed)
        ));
    }

    // a hidden bar swallows println; stderr keeps stdout free for the report
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    pub fn vulnerable(&self, url: &str) {
        self.println(format!("{}    {}", "[Vulnerable]".bold().red(), url));
    }

    pub fn clean(&self, url: &str) {
        self.println(format!("{} {}", "[Not Vulnerable]".bold().green(), url));
    }

    pub fn failed(&self, url: &str, cause: &str) {
        self.println(format!(
            "{}        {} {}",
            "[Failed]".bold().yellow(),
            url,
            format!("({cause})").dimmed()
        ));
    }

    pub fn warn(&self, message: &str) {
        self.println(crate::output::warn_line(message));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
