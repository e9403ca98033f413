use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub const DEFAULT_MARKER: &str = "xss<>";

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0";

/// What a single probe observed for one candidate url.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Vulnerable(String),
    Clean(String),
    Failed { url: String, cause: String },
}

impl ProbeOutcome {
    pub fn url(&self) -> &str {
        match self {
            ProbeOutcome::Vulnerable(url) => url,
            ProbeOutcome::Clean(url) => url,
            ProbeOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        matches!(self, ProbeOutcome::Vulnerable(_))
    }
}

/// Issues one request for a url and classifies the response.
///
/// Implementations must not retry and must not panic on transport errors,
/// those are reported as [`ProbeOutcome::Failed`].
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("failed to setup proxy: {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid header '{header}', expected 'Key: Value'")]
    Header { header: String },

    #[error("failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            proxy: None,
            header: None,
            follow_redirects: false,
        }
    }
}

fn parse_header(raw: &str) -> Option<(reqwest::header::HeaderName, reqwest::header::HeaderValue)> {
    let (key, value) = raw.split_once(':')?;
    let key = reqwest::header::HeaderName::from_str(key.trim()).ok()?;
    let value = reqwest::header::HeaderValue::from_str(value.trim()).ok()?;
    Some((key, value))
}

pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client, ClientBuildError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(USER_AGENT),
    );
    if let Some(raw) = options.header.as_deref().filter(|h| !h.trim().is_empty()) {
        let (key, value) = parse_header(raw).ok_or_else(|| ClientBuildError::Header {
            header: raw.to_string(),
        })?;
        headers.append(key, value);
    }

    let redirect_policy = if options.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect_policy)
        .timeout(Duration::from_secs(options.timeout_seconds.max(1)))
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| ClientBuildError::Proxy {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ClientBuildError::Build { source: e })
}

/// Probe backed by a real HTTP client, matching the marker as a plain substring.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    marker: String,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, marker: impl Into<String>) -> Self {
        Self {
            client,
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return ProbeOutcome::Failed {
                    url: url.to_string(),
                    cause: e.to_string(),
                }
            }
        };
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                return ProbeOutcome::Failed {
                    url: url.to_string(),
                    cause: format!("failed to read body: {e}"),
                }
            }
        };
        classify(url, &body, &self.marker)
    }
}

pub fn classify(url: &str, body: &str, marker: &str) -> ProbeOutcome {
    if body.contains(marker) {
        ProbeOutcome::Vulnerable(url.to_string())
    } else {
        ProbeOutcome::Clean(url.to_string())
    }
}
