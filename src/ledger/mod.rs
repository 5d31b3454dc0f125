//! Ledger integration.
//!
//! Defines the `LedgerClient` capability set the engine drives, and the
//! `LedgerConnector` that builds a client from a signing key. The engine
//! never sees RPC endpoints, ABIs or signers; it only reads amounts,
//! submits the three transactions and waits for receipts.
//!
//! - `dry_run` — a client that simulates reads and logs submissions

pub mod dry_run;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque identifier of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub success: bool,
    pub gas_used: u64,
    /// Price paid per gas unit, in the network's fee unit.
    pub effective_price: Decimal,
}

impl TxReceipt {
    /// Total fee paid: gas used times effective price.
    pub fn fee(&self) -> Decimal {
        Decimal::from(self.gas_used) * self.effective_price
    }
}

/// Per-submission settings forwarded to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct TxOptions {
    /// Safety factor applied to the client's gas estimate.
    pub gas_limit_multiplier: Decimal,
}

/// Capability set consumed by the engine. Every call may fail; each call
/// site in the engine decides whether a failure is fatal, retried or ignored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Rewards accrued for `account` and not yet claimed.
    async fn read_pending_rewards(&self, account: &str) -> Result<Decimal>;

    /// How much `spender` may move on behalf of `owner`.
    async fn read_allowance(&self, owner: &str, spender: &str) -> Result<Decimal>;

    /// Token balance of `account`.
    async fn read_balance(&self, token: &str, account: &str) -> Result<Decimal>;

    /// Native currency balance of `account` (pays for gas).
    async fn read_native_balance(&self, account: &str) -> Result<Decimal>;

    /// Current network fee estimate, in the unit of `max_gas_price`.
    async fn read_fee_estimate(&self) -> Result<Decimal>;

    /// Latest block height.
    async fn read_block_number(&self) -> Result<u64>;

    async fn submit_claim(&self, opts: &TxOptions) -> Result<TxHandle>;

    async fn submit_approve(&self, spender: &str, amount: Decimal, opts: &TxOptions) -> Result<TxHandle>;

    async fn submit_stake(&self, recipient: &str, amount: Decimal, opts: &TxOptions) -> Result<TxHandle>;

    /// Block until the transaction is mined or `timeout` elapses.
    async fn wait_for_confirmation(&self, handle: &TxHandle, timeout: Duration) -> Result<TxReceipt>;
}

/// Builds a ready-to-use client from the signing key. Called once per
/// `Bot::start`.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect(&self, signing_key: SecretString) -> Result<Arc<dyn LedgerClient>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
