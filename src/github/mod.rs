pub mod types;

pub use types::RepoUrl;

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const AGENT: &str = "comment-harvest";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub API returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid GitHub repository URL: {0} (expected https://github.com/owner/repo)")]
    InvalidUrl(String),

    #[error("GitHub token not provided")]
    MissingToken,

    #[error("Failed to decode content of {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Parse a GitHub repository URL into owner and repository name.
///
/// Accepts `https://github.com/{owner}/{repo}` with optional trailing path
/// segments (e.g. `/tree/main`), a trailing slash, or a `.git` suffix.
pub fn parse_repo_url(url: &str) -> Result<RepoUrl, GitHubError> {
    let invalid = || GitHubError::InvalidUrl(url.to_string());
    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid())?;

    if parsed.host_str() != Some("github.com") {
        return Err(invalid());
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();

    match segments.as_slice() {
        [owner, repo, ..] => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                return Err(invalid());
            }
            Ok(RepoUrl {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
        }
        _ => Err(invalid()),
    }
}

/// Extract the `rel="next"` target from a `Link` response header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        target
            .trim()
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// How transient failures (transport errors and 5xx responses) are retried.
/// `max_retries == 0` fails on the first error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based): `backoff * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// One page of a list endpoint plus the continuation URL, if any.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Thin authenticated wrapper around `reqwest::Client` for the REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry,
        }
    }

    /// Absolute URL for an API path such as `repos/o/r/pulls`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, GitHubError> {
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .get(url)
                .query(query)
                .header(USER_AGENT, AGENT)
                .header(ACCEPT, ACCEPT_JSON)
                .bearer_auth(&self.token)
                .send()
                .await;

            let retryable = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if !status.is_server_error() || attempt >= self.retry.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(GitHubError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                            body,
                        });
                    }
                    format!("status {status}")
                }
                Err(err) => {
                    if attempt >= self.retry.max_retries {
                        return Err(err.into());
                    }
                    err.to_string()
                }
            };

            let delay = self.retry.delay_for(attempt);
            attempt += 1;
            warn!(%url, attempt, delay_ms = delay.as_millis() as u64, reason = %retryable, "retrying GitHub request");
            tokio::time::sleep(delay).await;
        }
    }

    /// GET `url` and deserialize the JSON body.
    #[instrument(skip(self, query))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let response = self.send(url, query).await?;
        Ok(response.json::<T>().await?)
    }

    /// GET one page of a list endpoint, reading the continuation from the
    /// `Link` header.
    #[instrument(skip(self, query))]
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>, GitHubError> {
        let response = self.send(url, query).await?;
        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_link);
        let items = response.json::<Vec<T>>().await?;
        debug!(items = items.len(), has_next = next.is_some(), "received page");
        Ok(Page { items, next })
    }

    /// Follow `rel="next"` links from `url` until exhausted.
    pub async fn get_all_linked<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut all = Vec::new();
        let mut page = self.get_page::<T>(url, query).await?;
        loop {
            all.extend(page.items);
            match page.next {
                // Continuation URLs already carry the query string.
                Some(next) => page = self.get_page::<T>(&next, &[]).await?,
                None => return Ok(all),
            }
        }
    }
}
