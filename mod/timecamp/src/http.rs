//! Blocking JSON client for the TimeCamp REST API.
//!
//! Calls are strictly serial; rate limiting is handled by honouring 429
//! responses and `Retry-After` headers rather than client-side budgeting.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use campsync_core::SyncError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry behavior for a single logical request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay: Duration,
    /// Ceiling for the computed backoff.
    pub max_delay: Duration,
    /// Statuses retried in addition to 429 and transport errors.
    pub extra_retry_statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            extra_retry_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying `attempt` (1-based), exponential and capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        exp.min(self.max_delay)
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || self.extra_retry_statuses.contains(&status)
    }
}

/// HttpClient wraps a blocking reqwest client with bearer auth, JSON
/// bodies, and the shared retry policy.
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, SyncError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Perform a JSON request with the default retry policy.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, SyncError> {
        self.request_with_policy(method, path, query, body, &RetryPolicy::default())
    }

    /// Perform a JSON request, retrying transport errors, 429, and any
    /// status the policy declares retryable. 2xx responses decode to JSON
    /// (empty bodies decode to `null`); everything else maps onto the
    /// shared error taxonomy.
    pub fn request_with_policy(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        policy: &RetryPolicy,
    ) -> Result<Value, SyncError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut last_error = None;
        for attempt in 1..=policy.max_attempts {
            debug!(%method, %url, attempt, "API request");

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Accept", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(json) = body {
                request = request.json(json);
            }

            let response = match request.send() {
                Ok(r) => r,
                Err(e) => {
                    warn!(%url, attempt, error = %e, "transport error");
                    last_error = Some(SyncError::Transport(e.to_string()));
                    if attempt < policy.max_attempts {
                        thread::sleep(policy.delay_for(attempt));
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response
                    .text()
                    .map_err(|e| SyncError::Transport(e.to_string()))?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&text).map_err(|e| {
                    SyncError::Internal(format!("invalid JSON from {}: {}", url, e))
                });
            }

            if policy.retries_status(status) && attempt < policy.max_attempts {
                let delay = retry_after(&response).unwrap_or_else(|| policy.delay_for(attempt));
                warn!(%url, %status, ?delay, attempt, "retrying after backoff");
                thread::sleep(delay);
                last_error = Some(SyncError::RateLimited(format!("{} from {}", status, url)));
                continue;
            }

            let body_text = response.text().unwrap_or_default();
            return Err(status_error(status, &url, &body_text));
        }

        Err(last_error
            .unwrap_or_else(|| SyncError::Transport(format!("request to {} failed", url))))
    }
}

/// Parse a `Retry-After` header (seconds form).
fn retry_after(response: &reqwest::blocking::Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-2xx status onto the shared error taxonomy.
fn status_error(status: StatusCode, url: &str, body: &str) -> SyncError {
    let detail = if body.trim().is_empty() {
        format!("{} from {}", status, url)
    } else {
        format!("{} from {}: {}", status, url, body.trim())
    };
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth(detail),
        StatusCode::FORBIDDEN => SyncError::PermissionDenied(detail),
        StatusCode::NOT_FOUND => SyncError::NotFound(detail),
        StatusCode::CONFLICT => SyncError::Conflict(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SyncError::Validation(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited(detail),
        _ => SyncError::Transport(detail),
    }
}
