use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::time::Instant;

use crate::aggregator::{Aggregator, Tally};
use crate::pool::{self, SharedLimiter};
use crate::probe::{self, ClientBuildError, ClientOptions, HttpProbe, Probe};
use crate::progress::ProgressReporter;
use crate::queue::{Candidate, WorkQueue};

pub type BoxedSink = Box<dyn AsyncWrite + Unpin + Send>;

#[derive(Clone, Debug)]
pub enum CandidateSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub candidates: CandidateSource,
    pub output: Option<String>,
    pub marker: String,
    pub workers: usize,
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: bool,
    pub rate: Option<u32>,
    pub verbose: u8,
    pub show_progress: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            candidates: CandidateSource::Inline(Vec::new()),
            output: None,
            marker: probe::DEFAULT_MARKER.to_string(),
            workers: 10,
            timeout_seconds: 10,
            proxy: None,
            header: None,
            follow_redirects: false,
            rate: None,
            verbose: 0,
            show_progress: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("marker must not be empty")]
    EmptyMarker,

    #[error("invalid timeout {value}, expected a positive number of seconds")]
    InvalidTimeout { value: u64 },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output file: {path}: {source}")]
    OutputCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Client(#[from] ClientBuildError),

    #[error("{message}")]
    Progress { message: String },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("result aggregator is still shared after all workers finished")]
    AggregatorShared,
}

/// Final summary of a scan.
#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    pub vulnerable: Vec<String>,
    pub total: usize,
    pub processed: usize,
    pub clean: usize,
    pub failed: usize,
    pub workers: usize,
    #[serde(rename = "elapsed_seconds", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((d.as_secs_f64() * 100.0).round() / 100.0)
}

impl ScanReport {
    fn from_tally(tally: Tally, total: usize, workers: usize, elapsed: Duration) -> Self {
        Self {
            vulnerable: tally.vulnerable,
            total,
            processed: tally.processed,
            clean: tally.clean,
            failed: tally.failed,
            workers,
            elapsed,
        }
    }
}

/// Everything a single scan owns: the pending candidates, the probe and the sink.
///
/// The queue is filled before [`ScanSession::run`]; running seals it, starts the
/// worker pool and hands the sink back together with the report.
pub struct ScanSession<P: ?Sized, W> {
    queue: WorkQueue,
    probe: Arc<P>,
    sink: W,
    workers: usize,
    verbose: u8,
    reporter: Option<ProgressReporter>,
    limiter: Option<SharedLimiter>,
    started_at: Option<Instant>,
}

impl<P, W> ScanSession<P, W>
where
    P: Probe + ?Sized + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(probe: Arc<P>, sink: W) -> Self {
        Self {
            queue: WorkQueue::new(),
            probe,
            sink,
            workers: 10,
            verbose: 0,
            reporter: None,
            limiter: None,
            started_at: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Uses a visible progress line instead of the default hidden one.
    pub fn reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn rate(mut self, rate: Option<u32>) -> Self {
        self.limiter = pool::build_limiter(rate);
        self
    }

    pub fn enqueue(&mut self, url: impl Into<String>) {
        self.queue.enqueue(Candidate::new(url));
    }

    pub fn extend<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue.extend(urls.into_iter().map(Candidate::new));
    }

    /// Measures elapsed time from `at` instead of from the start of [`ScanSession::run`].
    pub fn started_at(mut self, at: Instant) -> Self {
        self.started_at = Some(at);
        self
    }

    pub async fn run(self) -> Result<(ScanReport, W), RunnerError> {
        let ScanSession {
            queue,
            probe,
            sink,
            workers,
            verbose,
            reporter,
            limiter,
            started_at,
        } = self;
        let started_at = started_at.unwrap_or_else(Instant::now);

        let total = queue.len();
        let reporter = reporter.unwrap_or_else(|| ProgressReporter::hidden(total));
        let aggregator = Arc::new(Aggregator::new(sink, reporter.clone(), verbose));

        pool::run_pool(workers, queue.seal(), probe, aggregator.clone(), limiter)
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        reporter.finish();

        let aggregator = Arc::try_unwrap(aggregator).map_err(|_| RunnerError::AggregatorShared)?;
        let (tally, sink) = aggregator.into_parts();
        let report = ScanReport::from_tally(tally, total, workers, started_at.elapsed());
        Ok((report, sink))
    }
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(mut options: Options) -> Result<Self, RunnerError> {
        if options.marker.is_empty() {
            return Err(RunnerError::EmptyMarker);
        }
        if options.timeout_seconds == 0 {
            return Err(RunnerError::InvalidTimeout {
                value: options.timeout_seconds,
            });
        }
        options.workers = options.workers.max(1);
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Loads the candidates, opens the sink and runs a full scan.
    ///
    /// Every error comes from the setup phase; once workers start, failures
    /// only show up in the report counts.
    pub async fn run(&self) -> Result<ScanReport, RunnerError> {
        let started_at = Instant::now();
        let candidates = load_candidates(&self.options.candidates).await?;
        let sink = open_sink(self.options.output.as_deref()).await?;

        let client = probe::build_client(&ClientOptions {
            timeout_seconds: self.options.timeout_seconds,
            proxy: self.options.proxy.clone(),
            header: self.options.header.clone(),
            follow_redirects: self.options.follow_redirects,
        })?;
        let http_probe = Arc::new(HttpProbe::new(client, self.options.marker.clone()));

        let mut session = ScanSession::new(http_probe, sink)
            .workers(self.options.workers)
            .verbose(self.options.verbose)
            .rate(self.options.rate)
            .started_at(started_at);
        if self.options.show_progress {
            let reporter = ProgressReporter::new(candidates.len())
                .map_err(|message| RunnerError::Progress { message })?;
            session = session.reporter(reporter);
        }
        session.extend(candidates);

        let (report, _) = session.run().await?;
        Ok(report)
    }
}

async fn open_sink(path: Option<&str>) -> Result<BoxedSink, RunnerError> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return Ok(Box::new(tokio::io::sink()));
    };
    let path = crate::config::expand_tilde_string(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await
        .map_err(|e| RunnerError::OutputCreate { path, source: e })?;
    Ok(Box::new(file))
}

pub async fn load_candidates(source: &CandidateSource) -> Result<Vec<String>, RunnerError> {
    match source {
        CandidateSource::Inline(values) => Ok(values
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()),
        CandidateSource::FilePath(path) => {
            let path = crate::config::expand_tilde_string(path.as_str());
            let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
                kind: "wordlist",
                path: path.clone(),
                source: e,
            })?;
            let mut out = Vec::new();
            let mut lines = BufReader::new(handle).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        out.push(line.to_string());
                    }
                    Ok(None) => break,
                    Err(e) => {
                        return Err(RunnerError::FileRead {
                            kind: "wordlist",
                            path,
                            source: e,
                        })
                    }
                }
            }
            Ok(out)
        }
    }
}
