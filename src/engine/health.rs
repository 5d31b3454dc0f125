//! Health monitor — best-effort connectivity and balance probe.
//!
//! Runs on its own timer, independent of cycles. Never fails: every read
//! error is logged and reflected as a missing field in the report.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::events::{EventBus, EventKind, Severity};
use crate::ledger::LedgerClient;

/// Native balance below which gas payments are at risk.
pub const MIN_NATIVE_BALANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub block_number: Option<u64>,
    pub native_balance: Option<Decimal>,
    pub staked_balance: Option<Decimal>,
    pub low_balance: bool,
}

impl HealthReport {
    /// All reads answered.
    pub fn is_healthy(&self) -> bool {
        self.block_number.is_some() && self.native_balance.is_some() && self.staked_balance.is_some()
    }
}

pub struct HealthMonitor {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<RwLock<BotConfig>>,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<RwLock<BotConfig>>, events: EventBus) -> Self {
        Self { ledger, config, events }
    }

    pub async fn probe(&self) -> HealthReport {
        let (account, staked_token) = {
            let cfg = self.config.read().await;
            (cfg.account.clone(), cfg.staked_token.clone())
        };

        let block_number = match self.ledger.read_block_number().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Health check: block number unavailable");
                None
            }
        };

        let native_balance = match self.ledger.read_native_balance(&account).await {
            Ok(b) => Some(b),
            Err(e) => {
                warn!(error = %e, "Health check: native balance unavailable");
                None
            }
        };

        let staked_balance = match self.ledger.read_balance(&staked_token, &account).await {
            Ok(b) => Some(b),
            Err(e) => {
                warn!(error = %e, "Health check: staked balance unavailable");
                None
            }
        };

        let low_balance = matches!(native_balance, Some(b) if b < MIN_NATIVE_BALANCE);
        let report = HealthReport {
            block_number,
            native_balance,
            staked_balance,
            low_balance,
        };

        if low_balance {
            self.events.emit(
                EventKind::LowBalance,
                Severity::Warn,
                format!("Native balance below {MIN_NATIVE_BALANCE}, top up to keep paying gas"),
                json!({ "native_balance": native_balance, "floor": MIN_NATIVE_BALANCE }),
            );
        }

        if report.is_healthy() {
            self.events.emit(
                EventKind::HealthPassed,
                Severity::Info,
                "Health check passed",
                json!(report),
            );
        } else {
            debug!(?report, "Health check incomplete");
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
