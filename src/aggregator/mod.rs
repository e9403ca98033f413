use std::collections::HashSet;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::probe::ProbeOutcome;
use crate::progress::ProgressReporter;

/// Counts and findings of a finished (or in-flight) scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub vulnerable: Vec<String>,
    pub processed: usize,
    pub clean: usize,
    pub failed: usize,
}

struct State<W> {
    tally: Tally,
    seen: HashSet<String>,
    sink: W,
}

/// Shared result holder. [`Aggregator::record`] is the only way to mutate it.
pub struct Aggregator<W> {
    state: Mutex<State<W>>,
    reporter: ProgressReporter,
    verbose: u8,
}

impl<W> Aggregator<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(sink: W, reporter: ProgressReporter, verbose: u8) -> Self {
        Self {
            state: Mutex::new(State {
                tally: Tally::default(),
                seen: HashSet::new(),
                sink,
            }),
            reporter,
            verbose,
        }
    }

    /// Applies one probe outcome.
    ///
    /// The set insert, the sink append, the counter bump and the progress redraw
    /// all happen under the same lock, so readers never see the counter ahead of
    /// the result set and a url reflected twice reaches the sink once.
    pub async fn record(&self, outcome: ProbeOutcome) {
        let mut state = self.state.lock().await;
        match outcome {
            ProbeOutcome::Vulnerable(url) => {
                self.reporter.vulnerable(&url);
                if state.seen.insert(url.clone()) {
                    let line = format!("{url}\n");
                    let written = match state.sink.write_all(line.as_bytes()).await {
                        Ok(()) => state.sink.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        self.reporter
                            .warn(&format!("failed to write '{url}' to output: {e}"));
                    }
                    state.tally.vulnerable.push(url);
                }
            }
            ProbeOutcome::Clean(url) => {
                state.tally.clean += 1;
                if self.verbose >= 1 {
                    self.reporter.clean(&url);
                }
            }
            ProbeOutcome::Failed { url, cause } => {
                state.tally.failed += 1;
                if self.verbose >= 2 {
                    self.reporter.failed(&url, &cause);
                }
            }
        }
        state.tally.processed += 1;
        self.reporter.render(state.tally.processed);
    }

    pub async fn processed(&self) -> usize {
        self.state.lock().await.tally.processed
    }

    pub async fn found(&self) -> usize {
        self.state.lock().await.tally.vulnerable.len()
    }

    pub async fn tally(&self) -> Tally {
        self.state.lock().await.tally.clone()
    }

    pub fn into_parts(self) -> (Tally, W) {
        let state = self.state.into_inner();
        (state.tally, state.sink)
    }
}
