//! Shared HTTP plumbing for the Google Cloud REST APIs (Translation, Vision).
//! One pooled reqwest client per service, requests spaced a few milliseconds
//! apart, and a bounded retry budget for throttling, 5xx and timeouts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Environment variable holding an OAuth access token
/// (e.g. the output of `gcloud auth print-access-token`).
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_ACCESS_TOKEN";

const MIN_REQUEST_SPACING: Duration = Duration::from_millis(20);
const MAX_THROTTLED_RETRIES: u32 = 3;
const MAX_SERVER_ERROR_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("GOOGLE_ACCESS_TOKEN environment variable not set")]
    MissingToken,
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request timeout")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
}

pub struct CloudClient {
    http: reqwest::Client,
    access_token: String,
    /// Sent as `x-goog-user-project` so quota is billed to the configured project.
    quota_project: Option<String>,
    /// Earliest instant the next request may leave.
    next_slot: Arc<tokio::sync::Mutex<Instant>>,
}

impl CloudClient {
    /// Create a client, reading the access token from `GOOGLE_ACCESS_TOKEN`.
    pub fn from_env(quota_project: Option<String>) -> Result<Self, CloudError> {
        let access_token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(CloudError::MissingToken)?;
        Self::new(access_token.trim().to_string(), quota_project)
    }

    pub fn new(access_token: String, quota_project: Option<String>) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CloudError::Api(e.to_string()))?;

        Ok(Self {
            http,
            access_token,
            quota_project,
            next_slot: Arc::new(tokio::sync::Mutex::new(Instant::now())),
        })
    }

    /// Claim the next send slot; concurrent callers queue on the mutex.
    async fn reserve_slot(&self, cancel: &CancellationToken) -> Result<(), CloudError> {
        let mut slot = self.next_slot.lock().await;
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            backoff(wait, cancel).await?;
        }
        *slot = Instant::now() + MIN_REQUEST_SPACING;
        Ok(())
    }

    fn request(&self, url: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body);
        match &self.quota_project {
            Some(project) => request.header("x-goog-user-project", project),
            None => request,
        }
    }

    /// POST `body` as JSON to a Google endpoint and return the 2xx response.
    /// Throttled, unavailable and timed-out calls are resent within a
    /// [`RetryBudget`]; every wait gives way to `cancel`.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, CloudError> {
        self.reserve_slot(cancel).await?;
        let mut budget = RetryBudget::default();

        loop {
            let sent = tokio::select! {
                r = self.request(url, body).send() => r,
                _ = cancel.cancelled() => return Err(CloudError::Cancelled),
            };

            let wait = match sent {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = budget
                        .after_throttle(retry_after(&resp))
                        .ok_or(CloudError::RateLimited)?;
                    warn!(url, wait_ms = wait.as_millis() as u64, "google quota exceeded, waiting");
                    wait
                }
                Ok(resp) if resp.status().is_server_error() => {
                    let status = resp.status();
                    let wait = budget
                        .after_server_error()
                        .ok_or_else(|| CloudError::Api(format!("{url} answered {status}")))?;
                    warn!(
                        url,
                        status = status.as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "google backend unavailable, backing off"
                    );
                    wait
                }
                Ok(resp) => return Err(rejection(resp).await),
                Err(e) if e.is_timeout() => {
                    if !budget.after_timeout() {
                        return Err(CloudError::Timeout);
                    }
                    warn!(url, "google call timed out, resending");
                    Duration::ZERO
                }
                Err(e) => return Err(CloudError::Api(e.to_string())),
            };
            backoff(wait, cancel).await?;
        }
    }
}

/// How many more times a single call may be resent, per failure kind.
#[derive(Debug, Default)]
struct RetryBudget {
    throttled: u32,
    server_errors: u32,
    timed_out: bool,
}

impl RetryBudget {
    /// Delay before resending a 429: the server's `Retry-After`, else 1s, 2s, 4s.
    fn after_throttle(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.throttled >= MAX_THROTTLED_RETRIES {
            return None;
        }
        let wait = retry_after.unwrap_or(Duration::from_secs(1 << self.throttled));
        self.throttled += 1;
        Some(wait)
    }

    /// Delay before resending a 5xx: 500ms, then 1s.
    fn after_server_error(&mut self) -> Option<Duration> {
        if self.server_errors >= MAX_SERVER_ERROR_RETRIES {
            return None;
        }
        let wait = Duration::from_millis(500) * (1 << self.server_errors);
        self.server_errors += 1;
        Some(wait)
    }

    /// A timed-out call is resent once, immediately.
    fn after_timeout(&mut self) -> bool {
        !std::mem::replace(&mut self.timed_out, true)
    }
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Google wraps failures as `{"error": {"code", "message", "status"}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn describe_rejection(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.status.is_empty() => format!(
            "{status} {}: {}",
            envelope.error.status, envelope.error.message
        ),
        Ok(envelope) => format!("{status}: {}", envelope.error.message),
        Err(_) => format!("{status}: {}", body.chars().take(200).collect::<String>()),
    }
}

async fn rejection(resp: reqwest::Response) -> CloudError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "google call rejected");
    CloudError::Api(describe_rejection(status, &body))
}

async fn backoff(wait: Duration, cancel: &CancellationToken) -> Result<(), CloudError> {
    tokio::select! {
        _ = tokio::time::sleep(wait) => Ok(()),
        _ = cancel.cancelled() => Err(CloudError::Cancelled),
    }
}
