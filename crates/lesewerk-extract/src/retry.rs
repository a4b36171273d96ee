// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff + jitter for remote OCR and LLM calls.
//
// Classifies errors into Transient (auto-retry), UserAction (fix credentials
// or files), and Permanent (give up). Only transient errors are retried.

use std::future::Future;
use std::time::Duration;

use lesewerk_core::error::LesewerkError;
use lesewerk_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry: the error is permanent or needs the caller to act.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a `LesewerkError` into an `ErrorClass` for retry decisions.
pub fn classify_error(err: &LesewerkError) -> ErrorClass {
    match err {
        LesewerkError::Http { status, .. } => classify_status(*status),
        LesewerkError::Llm(detail) | LesewerkError::OcrError(detail) => classify_detail(detail),

        // Caller has to fix a file or a setting
        LesewerkError::ModelNotFound(_) => ErrorClass::UserAction,
        LesewerkError::Config(_) => ErrorClass::UserAction,

        // Permanent: wrong input or malformed data
        LesewerkError::UnsupportedDocument(_) => ErrorClass::Permanent,
        LesewerkError::PdfError(_) => ErrorClass::Permanent,
        LesewerkError::ImageError(_) => ErrorClass::Permanent,
        LesewerkError::Segmentation(_) => ErrorClass::Permanent,
        LesewerkError::UnknownModel { .. } => ErrorClass::Permanent,
        LesewerkError::Serialization(_) => ErrorClass::Permanent,

        LesewerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Permanent,
        },
    }
}

/// Classify an HTTP status. `None` means the request never got a response
/// (connect failure, timeout), which is worth another try.
fn classify_status(status: Option<u16>) -> ErrorClass {
    match status {
        None => ErrorClass::Transient,
        Some(408 | 425 | 429) => ErrorClass::Transient,
        Some(500..=599) => ErrorClass::Transient,
        Some(401 | 403) => ErrorClass::UserAction,
        Some(_) => ErrorClass::Permanent,
    }
}

/// Classify a free-form service error detail string.
fn classify_detail(detail: &str) -> ErrorClass {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("rate limit")
        || lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("forbidden")
    {
        return ErrorClass::UserAction;
    }

    // Malformed responses and rejected requests do not improve on retry
    ErrorClass::Permanent
}

/// Retry decision for the `attempt`-th failure (zero-based) of a request.
///
/// Only transient failures are retried; the delay grows exponentially with
/// the attempt number.
pub fn should_retry(err: &LesewerkError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Transient if attempt < config.max_retries => {
            let delay = compute_delay(attempt, config);
            debug!(attempt, delay_ms = delay.as_millis(), "Transient failure, backing off");
            RetryDecision::RetryAfter(delay)
        }
        ErrorClass::Transient => {
            warn!(attempt, max = config.max_retries, "Retry budget spent");
            RetryDecision::Exhausted
        }
        class => {
            info!(?class, "Not retryable");
            RetryDecision::GiveUp(class)
        }
    }
}

/// Run `operation` until it succeeds or [`should_retry`] says stop.
///
/// The last error is returned unchanged when giving up.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, LesewerkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LesewerkError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => match should_retry(&err, attempt, config) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(operation, attempt, error = %err, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
            },
        }
    }
}

/// Exponential backoff with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);

    Duration::from_millis(capped_ms)
}

/// Deterministic jitter spread across `[0, base)`.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}
