//! Structured event stream for observability.
//!
//! Components emit [`BotEvent`]s through a shared [`EventBus`]. Each event
//! is logged via `tracing` at its severity and broadcast to any subscribers
//! (dashboards, alerting, tests). Nobody listening is not an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    CycleStart,
    CycleComplete,
    CycleSkipped,
    StepRetry,
    StepFailed,
    HealthPassed,
    LowBalance,
    MetricsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub kind: EventKind,
    pub message: String,
    pub payload: Value,
}

/// Cloneable handle onto the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: EventKind, severity: Severity, message: impl Into<String>, payload: Value) {
        let event = BotEvent {
            timestamp: Utc::now(),
            severity,
            kind,
            message: message.into(),
            payload,
        };

        match event.severity {
            Severity::Debug => debug!(kind = ?event.kind, payload = %event.payload, "{}", event.message),
            Severity::Info => info!(kind = ?event.kind, payload = %event.payload, "{}", event.message),
            Severity::Warn => warn!(kind = ?event.kind, payload = %event.payload, "{}", event.message),
            Severity::Error => error!(kind = ?event.kind, payload = %event.payload, "{}", event.message),
        }

        // Err only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
