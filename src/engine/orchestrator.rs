//! Cycle orchestrator — the claim → approve → stake state machine.
//!
//! One call to [`CycleOrchestrator::run_cycle`] walks the phases in order,
//! each transaction step wrapped by the retry executor and preceded by the
//! cost gate. Steps never run in parallel: approve is only evaluated once
//! the claim has confirmed, stake only once the allowance is in place.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::engine::cost_gate::CostGate;
use crate::engine::retry::RetryExecutor;
use crate::error::{BotError, BotResult, ErrorKind};
use crate::events::{EventBus, EventKind, Severity};
use crate::ledger::{LedgerClient, TxHandle, TxOptions, TxReceipt};
use crate::metrics::{CycleMetrics, MetricsAggregator};

pub const CLAIM_STEP: &str = "Claim rewards";
pub const APPROVE_STEP: &str = "Approve staking contract";
pub const STAKE_STEP: &str = "Stake rewards";

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    CheckingRewards,
    NoRewards,
    BelowThreshold,
    Claiming,
    Claimed,
    Approving,
    Staking,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxKind {
    Claim,
    Approve,
    Stake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    /// Claimed and (when large enough) restaked.
    Completed,
    NoRewards,
    BelowThreshold,
    /// Fee over ceiling at some gate. Neither success nor failure.
    SkippedHighFee,
    Failed(ErrorKind),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Completed => write!(f, "COMPLETED"),
            CycleOutcome::NoRewards => write!(f, "NO_REWARDS"),
            CycleOutcome::BelowThreshold => write!(f, "BELOW_THRESHOLD"),
            CycleOutcome::SkippedHighFee => write!(f, "SKIPPED_HIGH_FEE"),
            CycleOutcome::Failed(kind) => write!(f, "FAILED({kind})"),
        }
    }
}

/// Everything a single cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub outcome: CycleOutcome,
    pub phases: Vec<CyclePhase>,
    pub transactions: Vec<TxKind>,
    pub pending_rewards: Decimal,
    pub claimed: Decimal,
    pub staked: Decimal,
    pub gas_used: u64,
    pub fee_cost: Decimal,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            outcome: CycleOutcome::Completed,
            phases: vec![CyclePhase::Idle],
            transactions: Vec::new(),
            pending_rewards: Decimal::ZERO,
            claimed: Decimal::ZERO,
            staked: Decimal::ZERO,
            gas_used: 0,
            fee_cost: Decimal::ZERO,
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(cycle = %self.cycle_id, ?phase, "Cycle phase");
        self.phases.push(phase);
    }

    fn record_receipt(&mut self, kind: TxKind, receipt: &TxReceipt) {
        self.transactions.push(kind);
        self.gas_used = self.gas_used.saturating_add(receipt.gas_used);
        self.fee_cost += receipt.fee();
    }

    pub fn visited(&self, phase: CyclePhase) -> bool {
        self.phases.contains(&phase)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct CycleOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    gate: CostGate,
    config: Arc<RwLock<BotConfig>>,
    metrics: Arc<Mutex<MetricsAggregator>>,
    events: EventBus,
}

impl CycleOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        config: Arc<RwLock<BotConfig>>,
        metrics: Arc<Mutex<MetricsAggregator>>,
        events: EventBus,
    ) -> Self {
        Self {
            gate: CostGate::new(ledger.clone()),
            ledger,
            config,
            metrics,
            events,
        }
    }

    pub fn metrics(&self) -> CycleMetrics {
        self.lock_metrics().snapshot()
    }

    fn lock_metrics(&self) -> MutexGuard<'_, MetricsAggregator> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one full cycle and fold the result into the metrics.
    ///
    /// Returns `Ok` for completed, no-op and fee-skipped cycles; any other
    /// failure is counted and returned.
    pub async fn run_cycle(&self) -> BotResult<CycleReport> {
        let cfg = self.config.read().await.clone();
        let mut report = CycleReport::new();

        self.events.emit(
            EventKind::CycleStart,
            Severity::Info,
            "Starting cycle",
            json!({ "cycle_id": report.cycle_id }),
        );

        let result = self.drive(&cfg, &mut report).await;

        match result {
            Ok(()) => {
                report.enter(CyclePhase::Completed);
                if cfg.metrics_enabled {
                    let mut m = self.lock_metrics();
                    m.record_claimed(report.claimed);
                    m.record_staked(report.staked);
                    m.record_usage(report.gas_used, report.fee_cost);
                    m.record_success();
                }
                self.events.emit(
                    EventKind::CycleComplete,
                    Severity::Info,
                    format!("Cycle complete: {}", report.outcome),
                    json!({
                        "cycle_id": report.cycle_id,
                        "outcome": report.outcome.to_string(),
                        "claimed": report.claimed,
                        "staked": report.staked,
                        "gas_used": report.gas_used,
                        "fee_cost": report.fee_cost,
                    }),
                );
                self.emit_snapshot(&cfg);
                Ok(report)
            }
            Err(e) if e.kind() == ErrorKind::FeeTooHigh => {
                report.outcome = CycleOutcome::SkippedHighFee;
                report.enter(CyclePhase::Completed);
                if cfg.metrics_enabled {
                    let mut m = self.lock_metrics();
                    m.record_claimed(report.claimed);
                    m.record_staked(report.staked);
                    m.record_fee(report.fee_cost);
                    m.record_skip();
                }
                self.events.emit(
                    EventKind::CycleSkipped,
                    Severity::Warn,
                    format!("Cycle skipped: {}", e.message()),
                    json!({
                        "cycle_id": report.cycle_id,
                        "claimed": report.claimed,
                    }),
                );
                self.emit_snapshot(&cfg);
                Ok(report)
            }
            Err(e) => {
                report.outcome = CycleOutcome::Failed(e.kind());
                report.enter(CyclePhase::Failed);
                if cfg.metrics_enabled {
                    let mut m = self.lock_metrics();
                    m.record_claimed(report.claimed);
                    m.record_staked(report.staked);
                    m.record_fee(report.fee_cost);
                    m.record_failure();
                }
                warn!(
                    cycle = %report.cycle_id,
                    kind = %e.kind(),
                    error = %e.message(),
                    claimed = %report.claimed,
                    "Cycle failed"
                );
                self.emit_snapshot(&cfg);
                Err(e)
            }
        }
    }

    async fn drive(&self, cfg: &BotConfig, report: &mut CycleReport) -> BotResult<()> {
        report.enter(CyclePhase::CheckingRewards);
        let pending = match self.ledger.read_pending_rewards(&cfg.account).await {
            Ok(amount) => amount,
            Err(e) => {
                warn!(error = %e, "Pending rewards unavailable, treating as zero");
                Decimal::ZERO
            }
        };
        report.pending_rewards = pending;

        if pending <= Decimal::ZERO {
            info!("No pending rewards");
            report.enter(CyclePhase::NoRewards);
            report.outcome = CycleOutcome::NoRewards;
            return Ok(());
        }

        if let Some(min) = cfg.min_stake_amount {
            if pending < min {
                info!(pending = %pending, min = %min, "Pending rewards below threshold, leaving them to accrue");
                report.enter(CyclePhase::BelowThreshold);
                report.outcome = CycleOutcome::BelowThreshold;
                return Ok(());
            }
        }

        self.gate.check(cfg.max_gas_price).await?;

        report.enter(CyclePhase::Claiming);
        let claimed = self.claim(cfg, report).await?;
        report.claimed = claimed;
        report.enter(CyclePhase::Claimed);
        info!(claimed = %claimed, pending = %pending, "Rewards claimed");

        if claimed <= Decimal::ZERO {
            warn!(pending = %pending, "Claim confirmed but balance did not increase");
            return Ok(());
        }

        report.enter(CyclePhase::Approving);
        self.ensure_allowance(cfg, claimed, report).await?;

        report.enter(CyclePhase::Staking);
        if let Some(min) = cfg.min_stake_amount {
            if claimed < min {
                info!(claimed = %claimed, min = %min, "Claimed amount below threshold, not restaking");
                return Ok(());
            }
        }

        self.gate.check(cfg.max_gas_price).await?;
        self.stake(cfg, claimed, report).await?;
        report.staked = claimed;
        info!(staked = %claimed, "Rewards staked");
        Ok(())
    }

    async fn claim(&self, cfg: &BotConfig, report: &mut CycleReport) -> BotResult<Decimal> {
        let before = self.reward_balance(cfg).await?;

        let opts = tx_options(cfg);
        let receipt = self
            .submit_and_confirm(CLAIM_STEP, cfg, |ledger| {
                let opts = opts.clone();
                async move { ledger.submit_claim(&opts).await }
            })
            .await?;
        report.record_receipt(TxKind::Claim, &receipt);

        let after = self.reward_balance(cfg).await?;
        Ok(after - before)
    }

    async fn ensure_allowance(&self, cfg: &BotConfig, amount: Decimal, report: &mut CycleReport) -> BotResult<()> {
        let allowance = self
            .ledger
            .read_allowance(&cfg.account, &cfg.staking_contract)
            .await
            .map_err(|e| BotError::classified("Read allowance", e))?;

        if allowance >= amount {
            debug!(allowance = %allowance, amount = %amount, "Allowance sufficient");
            return Ok(());
        }

        self.gate.check(cfg.max_gas_price).await?;

        let opts = tx_options(cfg);
        let spender = cfg.staking_contract.clone();
        let receipt = self
            .submit_and_confirm(APPROVE_STEP, cfg, |ledger| {
                let opts = opts.clone();
                let spender = spender.clone();
                async move { ledger.submit_approve(&spender, amount, &opts).await }
            })
            .await?;
        report.record_receipt(TxKind::Approve, &receipt);
        info!(spender = %cfg.staking_contract, amount = %amount, "Allowance raised");
        Ok(())
    }

    async fn stake(&self, cfg: &BotConfig, amount: Decimal, report: &mut CycleReport) -> BotResult<()> {
        let opts = tx_options(cfg);
        let recipient = cfg.account.clone();
        let receipt = self
            .submit_and_confirm(STAKE_STEP, cfg, |ledger| {
                let opts = opts.clone();
                let recipient = recipient.clone();
                async move { ledger.submit_stake(&recipient, amount, &opts).await }
            })
            .await?;
        report.record_receipt(TxKind::Stake, &receipt);
        Ok(())
    }

    /// Submit via `submit`, wait for the receipt, and treat a failed
    /// receipt as an error, all inside one retry boundary.
    async fn submit_and_confirm<S, Fut>(&self, step: &str, cfg: &BotConfig, submit: S) -> BotResult<TxReceipt>
    where
        S: Fn(Arc<dyn LedgerClient>) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<TxHandle>>,
    {
        let executor = RetryExecutor::new(cfg.retry_base_delay_ms, self.events.clone());
        let timeout = cfg.confirmation_timeout();
        let submit = &submit;

        executor
            .execute(step, cfg.max_retries, move || {
                let ledger = self.ledger.clone();
                async move {
                    let handle = submit(ledger.clone()).await?;
                    debug!(step, tx = %handle, "Transaction submitted");
                    confirm(ledger.as_ref(), &handle, timeout).await
                }
            })
            .await
    }

    async fn reward_balance(&self, cfg: &BotConfig) -> BotResult<Decimal> {
        self.ledger
            .read_balance(&cfg.reward_token, &cfg.account)
            .await
            .map_err(|e| BotError::classified("Read reward balance", e))
    }

    fn emit_snapshot(&self, cfg: &BotConfig) {
        if !cfg.metrics_enabled {
            return;
        }
        let snapshot = self.metrics();
        self.events.emit(
            EventKind::MetricsSnapshot,
            Severity::Debug,
            format!("Metrics: {snapshot}"),
            json!(snapshot),
        );
    }
}

async fn confirm(ledger: &dyn LedgerClient, handle: &TxHandle, timeout: Duration) -> anyhow::Result<TxReceipt> {
    let receipt = ledger.wait_for_confirmation(handle, timeout).await?;
    if !receipt.success {
        anyhow::bail!("Transaction {handle} reverted");
    }
    Ok(receipt)
}

fn tx_options(cfg: &BotConfig) -> TxOptions {
    TxOptions {
        gas_limit_multiplier: cfg.gas_limit_multiplier,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
