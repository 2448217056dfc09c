//! HTTP transport used to probe raw URLs
//!
//! The transport issues a single GET and follows redirects hop by hop so
//! that every intermediate response is recorded:
//! - Redirects are followed manually, up to a configured number of hops
//! - A URL visited twice is a redirect loop and fails the probe
//! - The whole probe is bounded by one timeout
//! - The body is read in chunks and truncated to a maximum size

use crate::config::ResolverConfig;
use crate::resolver::resolved::{ProbeResponse, RedirectHop};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION, SET_COOKIE};
use reqwest::{redirect::Policy, Client, Response};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Errors that make a probe fail as a whole
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Redirect loop detected at {0}")]
    RedirectLoop(String),

    #[error("Redirect chain exceeded {0} hops")]
    TooManyRedirects(usize),

    #[error("Invalid redirect location '{0}'")]
    InvalidLocation(String),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// The outcome of following a URL to its final response
#[derive(Debug, Clone)]
pub struct Probe {
    pub response: ProbeResponse,
    pub history: Vec<RedirectHop>,
}

/// Seam for issuing the single GET probe per URL
#[async_trait]
pub trait Transport: Send + Sync {
    async fn probe(&self, url: &Url) -> Result<Probe, TransportError>;
}

/// Builds the probe HTTP client
///
/// Redirects are disabled at the client level so the transport can record
/// each hop itself.
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.probe_timeout_secs);
        Ok(Self {
            client: build_http_client(&config.user_agent, timeout)?,
            timeout,
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn follow(&self, url: &Url) -> Result<Probe, TransportError> {
        let started = Instant::now();
        let mut current = url.clone();
        let mut visited = HashSet::new();
        let mut history = Vec::new();

        visited.insert(current.as_str().to_string());

        loop {
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if !status.is_redirection() {
                let elapsed = started.elapsed();
                let response = self.finish(response, elapsed).await?;
                return Ok(Probe { response, history });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            history.push(RedirectHop {
                url: current.to_string(),
                status: status.as_u16(),
                location: location.clone(),
            });

            // A redirect without a Location is the final answer
            let Some(location) = location else {
                let elapsed = started.elapsed();
                let response = self.finish(response, elapsed).await?;
                return Ok(Probe { response, history });
            };

            if history.len() > self.max_redirects {
                return Err(TransportError::TooManyRedirects(self.max_redirects));
            }

            let next = current
                .join(&location)
                .map_err(|_| TransportError::InvalidLocation(location.clone()))?;

            if !visited.insert(next.as_str().to_string()) {
                return Err(TransportError::RedirectLoop(next.to_string()));
            }

            tracing::trace!("Redirect {} -> {}", current, next);
            current = next;
        }
    }

    async fn finish(
        &self,
        mut response: Response,
        elapsed: Duration,
    ) -> Result<ProbeResponse, TransportError> {
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = fold_headers(response.headers());
        let cookies = parse_cookies(response.headers());
        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_body_bytes {
                break;
            }
        }

        Ok(ProbeResponse {
            final_url,
            status,
            headers,
            cookies,
            encoding,
            elapsed,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &Url) -> Result<Probe, TransportError> {
        tokio::time::timeout(self.timeout, self.follow(url))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

/// Collects headers in arrival order, folding repeated names into one value
fn fold_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut folded: Vec<(String, String)> = Vec::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match folded.iter_mut().find(|(key, _)| key.as_str() == name.as_str()) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => folded.push((name.as_str().to_string(), value)),
        }
    }
    folded
}

/// Extracts `name=value` pairs from every `Set-Cookie` header
fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Reads the charset of a content type
///
/// Textual types without an explicit charset default to ISO-8859-1.
pub fn charset_of(content_type: &str) -> Option<String> {
    let explicit = content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    });

    explicit.or_else(|| {
        content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("text/")
            .then(|| "ISO-8859-1".to_string())
    })
}
