//! Dry-run ledger.
//!
//! Simulates the ledger with fixed read values and logs every submission
//! instead of sending it. Used when no live client is wired in, and for
//! exercising the full scheduler without touching a network.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{LedgerClient, LedgerConnector, TxHandle, TxOptions, TxReceipt};

/// Gas reported for every simulated receipt.
const DRY_RUN_GAS_USED: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct DryRunLedger {
    pending_rewards: Decimal,
    native_balance: Decimal,
    fee_estimate: Decimal,
}

impl Default for DryRunLedger {
    fn default() -> Self {
        Self::new(Decimal::ZERO, Decimal::ONE, Decimal::ONE)
    }
}

impl DryRunLedger {
    pub fn new(pending_rewards: Decimal, native_balance: Decimal, fee_estimate: Decimal) -> Self {
        Self {
            pending_rewards,
            native_balance,
            fee_estimate,
        }
    }

    fn handle(kind: &str) -> TxHandle {
        TxHandle(format!("dry-run-{kind}-{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl LedgerClient for DryRunLedger {
    async fn read_pending_rewards(&self, _account: &str) -> Result<Decimal> {
        Ok(self.pending_rewards)
    }

    async fn read_allowance(&self, _owner: &str, _spender: &str) -> Result<Decimal> {
        Ok(Decimal::MAX)
    }

    async fn read_balance(&self, _token: &str, _account: &str) -> Result<Decimal> {
        // Nothing is ever transferred, so balance deltas stay at zero.
        Ok(Decimal::ZERO)
    }

    async fn read_native_balance(&self, _account: &str) -> Result<Decimal> {
        Ok(self.native_balance)
    }

    async fn read_fee_estimate(&self) -> Result<Decimal> {
        Ok(self.fee_estimate)
    }

    async fn read_block_number(&self) -> Result<u64> {
        Ok(0)
    }

    async fn submit_claim(&self, opts: &TxOptions) -> Result<TxHandle> {
        info!(gas_multiplier = %opts.gas_limit_multiplier, "[DRY RUN] Would submit claim");
        Ok(Self::handle("claim"))
    }

    async fn submit_approve(&self, spender: &str, amount: Decimal, opts: &TxOptions) -> Result<TxHandle> {
        info!(spender, %amount, gas_multiplier = %opts.gas_limit_multiplier, "[DRY RUN] Would submit approve");
        Ok(Self::handle("approve"))
    }

    async fn submit_stake(&self, recipient: &str, amount: Decimal, opts: &TxOptions) -> Result<TxHandle> {
        info!(recipient, %amount, gas_multiplier = %opts.gas_limit_multiplier, "[DRY RUN] Would submit stake");
        Ok(Self::handle("stake"))
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle, _timeout: Duration) -> Result<TxReceipt> {
        info!(tx = %handle, "[DRY RUN] Confirmed");
        Ok(TxReceipt {
            success: true,
            gas_used: DRY_RUN_GAS_USED,
            effective_price: self.fee_estimate,
        })
    }
}

#[async_trait]
impl LedgerConnector for DryRunLedger {
    async fn connect(&self, _signing_key: SecretString) -> Result<Arc<dyn LedgerClient>> {
        Ok(Arc::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
