//! Cost gate — refuse to send transactions while fees are over budget.
//!
//! The fee estimate is read fresh on every check. Only a confirmed reading
//! above the ceiling blocks; a failed read lets the step through.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BotError, BotResult, ErrorKind};
use crate::ledger::LedgerClient;

/// Pure comparison used by [`CostGate::check`].
pub fn evaluate(current_fee: Decimal, ceiling: Option<Decimal>) -> BotResult<()> {
    match ceiling {
        Some(max) if current_fee > max => Err(BotError::new(
            ErrorKind::FeeTooHigh,
            format!("Network fee {current_fee} exceeds ceiling {max}"),
        )),
        _ => Ok(()),
    }
}

pub struct CostGate {
    ledger: Arc<dyn LedgerClient>,
}

impl CostGate {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    pub async fn check(&self, ceiling: Option<Decimal>) -> BotResult<()> {
        let Some(max) = ceiling else {
            return Ok(());
        };

        match self.ledger.read_fee_estimate().await {
            Ok(fee) => {
                debug!(fee = %fee, ceiling = %max, "Fee check");
                evaluate(fee, Some(max))
            }
            Err(e) => {
                warn!(error = %e, "Fee estimate unavailable, letting step through");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
