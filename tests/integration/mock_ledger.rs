//! Mock ledger for integration testing.
//!
//! Provides a deterministic, in-memory `LedgerClient`. State changes land
//! on confirmation: a claim moves pending rewards into the reward balance,
//! an approval sets the allowance and a stake moves balance into the
//! staked position.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use autostake::ledger::{LedgerClient, LedgerConnector, TxHandle, TxOptions, TxReceipt};

/// Gas reported for every confirmed transaction.
pub const GAS_PER_TX: u64 = 50_000;

#[derive(Debug, Clone)]
enum PendingTx {
    Claim,
    Approve(Decimal),
    Stake(Decimal),
}

#[derive(Default)]
struct LedgerState {
    pending_rewards: Decimal,
    reward_balance: Decimal,
    allowance: Decimal,
    staked: Decimal,
    native_balance: Decimal,
    fee_estimate: Decimal,
    gas_price: Decimal,
    fail_pending_read: bool,
    fail_fee_read: bool,
    claim_errors: VecDeque<String>,
    fee_after_claim: Option<Decimal>,
    stake_error: Option<String>,
    block_reads: usize,
    submissions: Vec<String>,
    txs: Vec<PendingTx>,
}

/// A mock ledger for deterministic testing.
pub struct MockLedger {
    state: Mutex<LedgerState>,
    /// When set, `submit_claim` waits for a permit before returning.
    claim_gate: Mutex<Option<Arc<Notify>>>,
    claim_entered: Arc<Notify>,
}

impl MockLedger {
    /// Fresh ledger with the given pending rewards and allowance.
    pub fn new(pending_rewards: Decimal, allowance: Decimal) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                pending_rewards,
                allowance,
                native_balance: Decimal::ONE,
                fee_estimate: Decimal::ONE,
                gas_price: Decimal::ONE,
                ..Default::default()
            }),
            claim_gate: Mutex::new(None),
            claim_entered: Arc::new(Notify::new()),
        })
    }

    pub fn set_pending(&self, amount: Decimal) {
        self.state.lock().unwrap().pending_rewards = amount;
    }

    pub fn set_fee_estimate(&self, fee: Decimal) {
        self.state.lock().unwrap().fee_estimate = fee;
    }

    pub fn set_native_balance(&self, amount: Decimal) {
        self.state.lock().unwrap().native_balance = amount;
    }

    pub fn fail_pending_read(&self) {
        self.state.lock().unwrap().fail_pending_read = true;
    }

    pub fn fail_fee_read(&self) {
        self.state.lock().unwrap().fail_fee_read = true;
    }

    /// Queue errors returned by the next `submit_claim` calls, in order.
    pub fn push_claim_errors(&self, msg: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.claim_errors.push_back(msg.to_string());
        }
    }

    /// Once the next claim confirms, the fee estimate jumps to `fee`.
    pub fn spike_fee_after_claim(&self, fee: Decimal) {
        self.state.lock().unwrap().fee_after_claim = Some(fee);
    }

    /// Every stake submission fails with `msg`.
    pub fn fail_stakes(&self, msg: &str) {
        self.state.lock().unwrap().stake_error = Some(msg.to_string());
    }

    /// Number of block height reads, one per health probe.
    pub fn health_probes(&self) -> usize {
        self.state.lock().unwrap().block_reads
    }

    /// Make the next claims block until `gate` is notified.
    pub fn gate_claims(&self, gate: Arc<Notify>) {
        *self.claim_gate.lock().unwrap() = Some(gate);
    }

    /// Notified each time a claim submission starts.
    pub fn claim_entered(&self) -> Arc<Notify> {
        self.claim_entered.clone()
    }

    /// Every submission so far, e.g. `["claim", "approve:10", "stake:10"]`.
    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn staked(&self) -> Decimal {
        self.state.lock().unwrap().staked
    }

    pub fn allowance(&self) -> Decimal {
        self.state.lock().unwrap().allowance
    }

    fn register(&self, tx: PendingTx, label: String) -> TxHandle {
        let mut state = self.state.lock().unwrap();
        state.submissions.push(label);
        state.txs.push(tx);
        TxHandle(format!("0xmock{}", state.txs.len() - 1))
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn read_pending_rewards(&self, _account: &str) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        if state.fail_pending_read {
            return Err(anyhow!("connection refused"));
        }
        Ok(state.pending_rewards)
    }

    async fn read_allowance(&self, _owner: &str, _spender: &str) -> Result<Decimal> {
        Ok(self.state.lock().unwrap().allowance)
    }

    async fn read_balance(&self, token: &str, _account: &str) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        if token == "0xstaked" {
            Ok(state.staked)
        } else {
            Ok(state.reward_balance)
        }
    }

    async fn read_native_balance(&self, _account: &str) -> Result<Decimal> {
        Ok(self.state.lock().unwrap().native_balance)
    }

    async fn read_fee_estimate(&self) -> Result<Decimal> {
        let state = self.state.lock().unwrap();
        if state.fail_fee_read {
            return Err(anyhow!("rpc timeout"));
        }
        Ok(state.fee_estimate)
    }

    async fn read_block_number(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.block_reads += 1;
        Ok(state.txs.len() as u64 + 1_000)
    }

    async fn submit_claim(&self, _opts: &TxOptions) -> Result<TxHandle> {
        self.claim_entered.notify_one();
        let gate = self.claim_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let next_error = self.state.lock().unwrap().claim_errors.pop_front();
        if let Some(msg) = next_error {
            self.state.lock().unwrap().submissions.push("claim-failed".into());
            return Err(anyhow!("{msg}"));
        }
        Ok(self.register(PendingTx::Claim, "claim".into()))
    }

    async fn submit_approve(&self, _spender: &str, amount: Decimal, _opts: &TxOptions) -> Result<TxHandle> {
        Ok(self.register(PendingTx::Approve(amount), format!("approve:{amount}")))
    }

    async fn submit_stake(&self, _recipient: &str, amount: Decimal, _opts: &TxOptions) -> Result<TxHandle> {
        let stake_error = {
            let mut state = self.state.lock().unwrap();
            let err = state.stake_error.clone();
            if err.is_some() {
                state.submissions.push("stake-failed".into());
            }
            err
        };
        if let Some(msg) = stake_error {
            return Err(anyhow!("{msg}"));
        }
        Ok(self.register(PendingTx::Stake(amount), format!("stake:{amount}")))
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle, _timeout: Duration) -> Result<TxReceipt> {
        let index: usize = handle
            .0
            .trim_start_matches("0xmock")
            .parse()
            .map_err(|_| anyhow!("unknown transaction {handle}"))?;

        let mut state = self.state.lock().unwrap();
        let tx = state
            .txs
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("unknown transaction {handle}"))?;

        match tx {
            PendingTx::Claim => {
                let pending = state.pending_rewards;
                state.reward_balance += pending;
                state.pending_rewards = Decimal::ZERO;
                if let Some(fee) = state.fee_after_claim.take() {
                    state.fee_estimate = fee;
                }
            }
            PendingTx::Approve(amount) => state.allowance = amount,
            PendingTx::Stake(amount) => {
                if state.reward_balance < amount {
                    return Err(anyhow!("insufficient balance to stake {amount}"));
                }
                state.reward_balance -= amount;
                state.allowance -= amount;
                state.staked += amount;
            }
        }

        Ok(TxReceipt {
            success: true,
            gas_used: GAS_PER_TX,
            effective_price: state.gas_price,
        })
    }
}

/// Hands out the same shared mock on every connect.
pub struct MockConnector(pub Arc<MockLedger>);

#[async_trait]
impl LedgerConnector for MockConnector {
    async fn connect(&self, _signing_key: SecretString) -> Result<Arc<dyn LedgerClient>> {
        Ok(self.0.clone())
    }
}
