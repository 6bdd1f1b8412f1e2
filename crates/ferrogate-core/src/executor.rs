//! Retrying HTTP executor and outcome classification.
//!
//! One call to [`HttpExecutor::send`] is one logical upstream call: transient
//! failures are retried here, and only the final classification leaves.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::outcome::RequestOutcome;
use crate::retry::{RetryConfig, RetryTrigger};

/// Result of one logical upstream call, after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: RequestOutcome,
    /// Final HTTP status; `None` when the transport never produced one.
    pub status: Option<u16>,
    /// Parsed payload, present on success.
    pub body: Option<Value>,
    pub detail: String,
    pub attempts: u32,
}

impl Execution {
    fn transport_failure(error: &HttpError, attempts: u32) -> Self {
        Self {
            outcome: RequestOutcome::NetworkError,
            status: None,
            body: None,
            detail: format!("network error: {}", error.message()),
            attempts,
        }
    }
}

/// Runs requests through the shared transport with the retry policy applied.
#[derive(Clone)]
pub struct HttpExecutor {
    client: Arc<dyn HttpClient>,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpExecutor {
    pub fn new(client: Arc<dyn HttpClient>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub const fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn send(&self, request: HttpRequest) -> Execution {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let result = self.client.execute(request.clone()).await;

            let (trigger, retry_after) = match &result {
                Ok(response) => (
                    Some(RetryTrigger::Status(response.status)),
                    response.retry_after,
                ),
                Err(error) => (RetryTrigger::from_error_kind(error.kind()), None),
            };
            let next = trigger.and_then(|trigger| {
                self.retry.next_delay(request.method, trigger, attempt, retry_after)
            });
            if let Some(delay) = next {
                debug!(
                    attempt,
                    max_attempts = self.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    status = result.as_ref().ok().map(|response| response.status),
                    "retrying transient upstream failure"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let execution = match result {
                Ok(response) => classify(&response, attempt),
                Err(error) => Execution::transport_failure(&error, attempt),
            };
            if !execution.outcome.is_success() {
                warn!(
                    outcome = %execution.outcome,
                    status = execution.status,
                    attempts = execution.attempts,
                    detail = %execution.detail,
                    "upstream call failed"
                );
            }
            return execution;
        }
    }
}

/// Maps a final HTTP response onto the outcome taxonomy.
pub fn classify(response: &HttpResponse, attempts: u32) -> Execution {
    let status = response.status;
    let failure = |outcome: RequestOutcome, detail: String| Execution {
        outcome,
        status: Some(status),
        body: None,
        detail,
        attempts,
    };

    match status {
        401 => failure(
            RequestOutcome::AuthError,
            with_provider_message("authentication failed: invalid API key", &response.body),
        ),
        403 => failure(
            RequestOutcome::ClientError,
            with_provider_message("access forbidden", &response.body),
        ),
        429 => failure(
            RequestOutcome::RateLimited,
            String::from("upstream rate limit exceeded"),
        ),
        404 => failure(RequestOutcome::ClientError, String::from("not found")),
        500..=599 => failure(
            RequestOutcome::ServerError,
            format!("upstream server error (HTTP {status})"),
        ),
        400..=499 => failure(
            RequestOutcome::ClientError,
            with_provider_message(&format!("client error (HTTP {status})"), &response.body),
        ),
        200..=299 => classify_payload(&response.body, status, attempts),
        _ => failure(
            RequestOutcome::ClientError,
            format!("unexpected HTTP status {status}"),
        ),
    }
}

fn classify_payload(body: &str, status: u16, attempts: u32) -> Execution {
    let failure = |outcome: RequestOutcome, detail: String| Execution {
        outcome,
        status: Some(status),
        body: None,
        detail,
        attempts,
    };

    if body.trim().is_empty() {
        return failure(
            RequestOutcome::EmptyResponse,
            String::from("empty response body"),
        );
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(error) => {
            return failure(
                RequestOutcome::ServerError,
                format!("malformed JSON payload: {error}"),
            )
        }
    };

    if let Some(detail) = provider_error(&value) {
        return failure(RequestOutcome::ServerError, detail);
    }
    if is_empty_payload(&value) {
        return failure(
            RequestOutcome::EmptyResponse,
            String::from("response contained no data"),
        );
    }

    Execution {
        outcome: RequestOutcome::Success,
        status: Some(status),
        body: Some(value),
        detail: String::from("ok"),
        attempts,
    }
}

/// Provider error envelope: `{"status":"error","code":..,"message":..}`.
fn provider_error(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if object.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error");
    Some(match object.get("code") {
        Some(code) if !code.is_null() => format!("provider error {code}: {message}"),
        _ => format!("provider error: {message}"),
    })
}

/// Null, an empty collection, or an object whose fields are all empty.
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.values().all(is_empty_value),
        other => is_empty_value(other),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn with_provider_message(summary: &str, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
    });
    match message {
        Some(message) if !message.is_empty() => format!("{summary}: {message}"),
        _ => summary.to_owned(),
    }
}
