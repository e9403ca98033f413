use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use rand::seq::IndexedRandom;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::output::{info_line, warn_line};
use crate::utils;

const ARCHIVE_BASE: &str = "https://web.archive.org";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:54.0) Gecko/20100101 Firefox/54.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) AppleWebKit/603.3.8 Safari/603.3.8",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0",
];

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("no domains to harvest")]
    NoDomains,

    #[error("failed to read domain list: {path}: {source}")]
    DomainList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url} after {attempts} attempts: {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("failed to stream urls: {source}")]
    Stream {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write results: {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fixed-delay retry schedule: `max_attempts` tries with `delay` between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or the attempts are used up.
    ///
    /// `on_failure` sees the attempt number (1-based) and the error of each
    /// failed try. The sleeper is called between attempts, never after the last.
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
        mut on_failure: impl FnMut(u32, &E),
    ) -> Result<T, (u32, E)>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    on_failure(attempt, &e);
                    if attempt >= attempts {
                        return Err((attempt, e));
                    }
                }
            }
            sleeper.sleep(self.delay).await;
            attempt += 1;
        }
    }
}

#[derive(Clone, Debug)]
pub struct HarvestOptions {
    pub domains: Vec<String>,
    pub extensions: Vec<String>,
    pub placeholder: String,
    pub proxy: Option<String>,
    pub stream: bool,
    pub output_dir: String,
    pub retry: RetryPolicy,
    pub archive_base: String,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            extensions: utils::default_extensions(),
            placeholder: crate::probe::DEFAULT_MARKER.to_string(),
            proxy: None,
            stream: false,
            output_dir: "results".to_string(),
            retry: RetryPolicy::default(),
            archive_base: ARCHIVE_BASE.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestSummary {
    pub domain: String,
    pub found: usize,
    pub cleaned: usize,
    pub saved: usize,
    pub path: PathBuf,
}

pub fn archive_url(base: &str, domain: &str) -> String {
    format!(
        "{}/cdx/search/cdx?url={}/*&output=txt&collapse=urlkey&fl=original&page=/",
        base.trim_end_matches('/'),
        domain
    )
}

pub fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, HarvestError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .danger_accept_invalid_certs(true);
    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| HarvestError::Proxy {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| HarvestError::HttpClientBuild { source: e })
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .header(reqwest::header::USER_AGENT, random_user_agent())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Fetches the archived url list for `domain`, retrying per `policy`.
pub async fn fetch_archived_urls(
    client: &reqwest::Client,
    archive_base: &str,
    domain: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Vec<String>, HarvestError> {
    let url = archive_url(archive_base, domain);
    let body = policy
        .run(
            sleeper,
            |_| fetch_once(client, &url),
            |attempt, e| {
                eprintln!(
                    "{}",
                    warn_line(&format!(
                        "Attempt {attempt}/{} failed: {e}. Retrying in {} seconds...",
                        policy.max_attempts,
                        policy.delay.as_secs()
                    ))
                );
            },
        )
        .await
        .map_err(|(attempts, e)| HarvestError::FetchExhausted {
            url: url.clone(),
            attempts,
            last_error: e.to_string(),
        })?;
    Ok(body.split_whitespace().map(|s| s.to_string()).collect())
}

/// Writes the urls carrying a query string to `path`, echoing each one to
/// `stream` when given. Returns how many were written.
pub async fn save_urls(
    path: &Path,
    urls: &[String],
    mut stream: Option<&mut (dyn Write + Send)>,
) -> Result<usize, HarvestError> {
    let write_err = |e: std::io::Error| HarvestError::Write {
        path: path.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(write_err)?;

    let mut saved = 0usize;
    for url in urls.iter().filter(|u| u.contains('?')) {
        file.write_all(format!("{url}\n").as_bytes())
            .await
            .map_err(write_err)?;
        if let Some(out) = stream.as_mut() {
            writeln!(out, "{url}").map_err(|e| HarvestError::Stream { source: e })?;
        }
        saved += 1;
    }
    file.flush().await.map_err(write_err)?;
    Ok(saved)
}

pub async fn harvest_domain(
    client: &reqwest::Client,
    options: &HarvestOptions,
    domain: &str,
    sleeper: &dyn Sleeper,
    out: &mut (dyn Write + Send),
) -> Result<HarvestSummary, HarvestError> {
    eprintln!(
        "{}",
        info_line(&format!("Fetching URLs for {}", domain.cyan()))
    );
    let urls = fetch_archived_urls(
        client,
        &options.archive_base,
        domain,
        &options.retry,
        sleeper,
    )
    .await?;
    eprintln!(
        "{}",
        info_line(&format!("Found {} URLs.", urls.len().to_string().green()))
    );

    let cleaned = utils::clean_urls(&urls, &options.extensions, &options.placeholder);
    eprintln!(
        "{}",
        info_line(&format!(
            "Cleaned URLs: {}",
            cleaned.len().to_string().green()
        ))
    );

    let path = Path::new(&options.output_dir).join(format!("{domain}.txt"));
    let saved = save_urls(&path, &cleaned, options.stream.then_some(out)).await?;
    eprintln!(
        "{}",
        info_line(&format!(
            "Saved cleaned URLs to {}",
            path.display().to_string().cyan()
        ))
    );

    Ok(HarvestSummary {
        domain: domain.to_string(),
        found: urls.len(),
        cleaned: cleaned.len(),
        saved,
        path,
    })
}

/// Harvests every domain in order, stopping at the first domain whose fetch
/// is exhausted. Status lines go to stderr; `out` only ever sees streamed urls.
pub async fn run_harvest(
    options: &HarvestOptions,
    sleeper: &dyn Sleeper,
    out: &mut (dyn Write + Send),
) -> Result<Vec<HarvestSummary>, HarvestError> {
    if options.domains.is_empty() {
        return Err(HarvestError::NoDomains);
    }
    let client = build_client(options.proxy.as_deref())?;
    let mut summaries = Vec::with_capacity(options.domains.len());
    for domain in options.domains.iter() {
        let summary = harvest_domain(&client, options, domain, sleeper, &mut *out).await?;
        summaries.push(summary);
    }
    Ok(summaries)
}

pub async fn load_domains(path: &str) -> Result<Vec<String>, HarvestError> {
    let path = crate::config::expand_tilde_string(path);
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| HarvestError::DomainList { path, source: e })?;
    Ok(utils::parse_domain_list(&contents))
}
