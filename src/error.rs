//! Error taxonomy and classification.
//!
//! Every failure that leaves the engine is a [`BotError`] tagged with an
//! [`ErrorKind`]. Collaborator errors arrive as `anyhow::Error` and are
//! tagged by [`classify`], which inspects the message text.

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Closed set of failure categories the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    NetworkError,
    ContractError,
    InsufficientBalance,
    FeeTooHigh,
    Unknown,
}

impl ErrorKind {
    /// Whether the retry executor may attempt the operation again.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::InsufficientBalance)
    }

    /// Conditions that cannot heal by waiting; the scheduler stops on these.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::InsufficientBalance)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ContractError => "CONTRACT_ERROR",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::FeeTooHigh => "FEE_TOO_HIGH",
            ErrorKind::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// BotError
// ---------------------------------------------------------------------------

/// Tagged error surfaced by every core component.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct BotError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BotError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a collaborator error, keeping it as the source.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Classify `err` and wrap it under `context`.
    pub fn classified(context: &str, err: anyhow::Error) -> Self {
        let kind = classify(&err);
        let message = format!("{context}: {err:#}");
        Self::with_source(kind, message, err)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias for engine operations.
pub type BotResult<T> = std::result::Result<T, BotError>;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Ordered keyword table. The first row with a matching keyword wins, so a
/// message mentioning both "balance" and "contract" is a balance failure.
const CLASSIFICATION_RULES: &[(&[&str], ErrorKind)] = &[
    (&["network", "connection", "timeout"], ErrorKind::NetworkError),
    (&["insufficient", "balance"], ErrorKind::InsufficientBalance),
    (&["gas", "fee"], ErrorKind::FeeTooHigh),
    (&["revert", "contract"], ErrorKind::ContractError),
];

/// Map a failure message to its kind. Case-insensitive, total.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

/// Classify an arbitrary error. A [`BotError`] anywhere in the chain keeps
/// its tag; anything else is classified from the full context chain.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    if let Some(tagged) = err.chain().find_map(|e| e.downcast_ref::<BotError>()) {
        return tagged.kind();
    }
    classify_message(&format!("{err:#}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
