//! Retry executor — bounded attempts with exponential backoff.
//!
//! Wraps a single transaction submission (submit + confirm). Failures are
//! classified after each attempt; an insufficient balance ends the run on
//! the spot, anything else is retried after `base_delay * 2^(attempt-1)`.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::error::{classify, BotError, ErrorKind};
use crate::events::{EventBus, EventKind, Severity};

/// Delay before the attempt following `attempt` (1-indexed).
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_delay_ms.saturating_mul(factor))
}

pub struct RetryExecutor {
    base_delay_ms: u64,
    events: EventBus,
}

impl RetryExecutor {
    pub fn new(base_delay_ms: u64, events: EventBus) -> Self {
        Self { base_delay_ms, events }
    }

    /// Run `operation` up to `max_attempts` times.
    pub async fn execute<T, F, Fut>(&self, name: &str, max_attempts: u32, mut operation: F) -> Result<T, BotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let kind = classify(&err);

            if !kind.is_retryable() {
                self.emit_failed(name, attempt, kind, &err);
                return Err(BotError::with_source(
                    kind,
                    format!("{name} failed: {err:#}"),
                    err,
                ));
            }

            if attempt >= max_attempts {
                self.emit_failed(name, attempt, kind, &err);
                return Err(BotError::with_source(
                    kind,
                    format!("{name} failed after {attempt} attempts: {err:#}"),
                    err,
                ));
            }

            let delay = backoff_delay(self.base_delay_ms, attempt);
            self.events.emit(
                EventKind::StepRetry,
                Severity::Warn,
                format!("Retrying {name} (attempt {}/{max_attempts})", attempt + 1),
                json!({
                    "step": name,
                    "attempt": attempt + 1,
                    "max_attempts": max_attempts,
                    "delay_ms": delay.as_millis() as u64,
                    "error_kind": kind,
                    "error": format!("{err:#}"),
                }),
            );
            debug!(step = name, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn emit_failed(&self, name: &str, attempt: u32, kind: ErrorKind, err: &anyhow::Error) {
        self.events.emit(
            EventKind::StepFailed,
            Severity::Error,
            format!("{name} failed"),
            json!({
                "step": name,
                "attempts": attempt,
                "error_kind": kind,
                "error": format!("{err:#}"),
            }),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
