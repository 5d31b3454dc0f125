//! Full cycle scenarios through `CycleOrchestrator` and a `MockLedger`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_test::{assert_err, assert_ok};

use autostake::config::BotConfig;
use autostake::engine::orchestrator::{CycleOrchestrator, CycleOutcome, CyclePhase, TxKind};
use autostake::error::ErrorKind;
use autostake::events::{EventBus, EventKind};
use autostake::metrics::MetricsAggregator;

use crate::mock_ledger::{MockLedger, GAS_PER_TX};

pub fn test_config() -> BotConfig {
    BotConfig {
        account: "0xme".into(),
        reward_token: "0xreward".into(),
        staking_contract: "0xstaking".into(),
        staked_token: "0xstaked".into(),
        interval_hours: 24,
        max_retries: 3,
        retry_base_delay_ms: 1,
        gas_limit_multiplier: dec!(1.2),
        min_stake_amount: None,
        max_gas_price: None,
        health_check_interval_mins: None,
        metrics_enabled: true,
        confirmation_timeout_secs: 60,
    }
}

fn orchestrator(ledger: Arc<MockLedger>, cfg: BotConfig, events: EventBus) -> CycleOrchestrator {
    CycleOrchestrator::new(
        ledger,
        Arc::new(RwLock::new(cfg)),
        Arc::new(Mutex::new(MetricsAggregator::new())),
        events,
    )
}

#[tokio::test]
async fn test_no_rewards_completes_as_noop() {
    let ledger = MockLedger::new(Decimal::ZERO, Decimal::ZERO);
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::NoRewards);
    assert_eq!(report.claimed, Decimal::ZERO);
    assert_eq!(report.staked, Decimal::ZERO);
    assert!(ledger.submissions().is_empty());

    let m = orch.metrics();
    assert_eq!(m.successful_cycles, 1);
    assert_eq!(m.total_claimed, Decimal::ZERO);
    assert_eq!(m.total_staked, Decimal::ZERO);
    assert!(m.last_success.is_some());
}

#[tokio::test]
async fn test_sufficient_allowance_skips_approve() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.transactions, vec![TxKind::Claim, TxKind::Stake]);
    assert_eq!(ledger.submissions(), vec!["claim", "stake:10"]);
    assert_eq!(ledger.staked(), dec!(10));
    assert_eq!(orch.metrics().total_staked, dec!(10));
    assert_eq!(orch.metrics().total_claimed, dec!(10));
}

#[tokio::test]
async fn test_low_allowance_triggers_approve() {
    let ledger = MockLedger::new(dec!(10), dec!(2));
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let report = orch.run_cycle().await.unwrap();

    assert!(report.visited(CyclePhase::Approving));
    assert_eq!(ledger.submissions(), vec!["claim", "approve:10", "stake:10"]);
    assert_eq!(ledger.staked(), dec!(10));
    assert_eq!(ledger.allowance(), Decimal::ZERO);

    let m = orch.metrics();
    assert_eq!(m.average_gas_used, u128::from(3 * GAS_PER_TX));
    assert_eq!(m.total_fee_cost, Decimal::from(3 * GAS_PER_TX));
}

#[tokio::test]
async fn test_fee_over_ceiling_sends_nothing() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.set_fee_estimate(dec!(80));
    let mut cfg = test_config();
    cfg.max_gas_price = Some(dec!(50));
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::SkippedHighFee);
    assert!(ledger.submissions().is_empty());

    let m = orch.metrics();
    assert_eq!(m.total_claimed, Decimal::ZERO);
    assert_eq!(m.total_staked, Decimal::ZERO);
    assert_eq!(m.skipped_cycles, 1);
    assert_eq!(m.successful_cycles, 0);
    assert_eq!(m.failed_cycles, 0);
}

#[tokio::test]
async fn test_fee_read_failure_lets_cycle_through() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.fail_fee_read();
    let mut cfg = test_config();
    cfg.max_gas_price = Some(dec!(50));
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let report = assert_ok!(orch.run_cycle().await);
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(ledger.staked(), dec!(10));
}

#[tokio::test]
async fn test_pending_below_threshold_is_not_claimed() {
    let ledger = MockLedger::new(dec!(4.99), dec!(100));
    let mut cfg = test_config();
    cfg.min_stake_amount = Some(dec!(5));
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::BelowThreshold);
    assert!(ledger.submissions().is_empty());
    assert_eq!(orch.metrics().successful_cycles, 1);
}

#[tokio::test]
async fn test_pending_read_failure_treated_as_zero() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.fail_pending_read();
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::NoRewards);
    assert!(ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_claim_exhausts_retries_on_network_error() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.push_claim_errors("network error: connection reset", 3);
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let orch = orchestrator(ledger.clone(), test_config(), events);

    let err = orch.run_cycle().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert!(err.message().contains("Claim rewards"));
    assert!(err.message().contains("3 attempts"));
    assert_eq!(ledger.submissions(), vec!["claim-failed"; 3]);

    let m = orch.metrics();
    assert_eq!(m.failed_cycles, 1);
    assert!(m.last_failure.is_some());

    let mut retries = 0;
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::StepRetry {
            retries += 1;
        }
    }
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn test_claim_recovers_after_transient_errors() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.push_claim_errors("request timeout", 2);
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(ledger.submissions(), vec!["claim-failed", "claim-failed", "claim", "stake:10"]);
}

#[tokio::test]
async fn test_insufficient_balance_claim_attempted_once() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.push_claim_errors("insufficient funds for gas", 5);
    let mut cfg = test_config();
    cfg.max_retries = 5;
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let err = assert_err!(orch.run_cycle().await);
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_average_gas_across_cycles() {
    let ledger = MockLedger::new(dec!(10), dec!(1000));
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    // claim + stake
    orch.run_cycle().await.unwrap();
    // nothing pending: no gas
    orch.run_cycle().await.unwrap();

    let m = orch.metrics();
    assert_eq!(m.successful_cycles, 2);
    assert_eq!(m.average_gas_used, u128::from(GAS_PER_TX));
}

#[tokio::test]
async fn test_fee_spike_at_stake_gate_keeps_claim() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.spike_fee_after_claim(dec!(80));
    let mut cfg = test_config();
    cfg.max_gas_price = Some(dec!(50));
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let report = assert_ok!(orch.run_cycle().await);

    assert_eq!(report.outcome, CycleOutcome::SkippedHighFee);
    assert_eq!(report.transactions, vec![TxKind::Claim]);
    assert_eq!(ledger.submissions(), vec!["claim"]);
    assert_eq!(ledger.staked(), Decimal::ZERO);

    let m = orch.metrics();
    assert_eq!(m.skipped_cycles, 1);
    assert_eq!(m.successful_cycles, 0);
    assert_eq!(m.total_claimed, dec!(10));
    assert_eq!(m.total_staked, Decimal::ZERO);
    assert_eq!(m.total_fee_cost, Decimal::from(GAS_PER_TX));
    assert_eq!(m.average_gas_used, 0);
}

#[tokio::test]
async fn test_fee_spike_at_approve_gate_skips_approve() {
    let ledger = MockLedger::new(dec!(10), Decimal::ZERO);
    ledger.spike_fee_after_claim(dec!(80));
    let mut cfg = test_config();
    cfg.max_gas_price = Some(dec!(50));
    let orch = orchestrator(ledger.clone(), cfg, EventBus::new());

    let report = assert_ok!(orch.run_cycle().await);

    assert_eq!(report.outcome, CycleOutcome::SkippedHighFee);
    assert!(report.visited(CyclePhase::Approving));
    assert!(!report.visited(CyclePhase::Staking));
    assert_eq!(ledger.submissions(), vec!["claim"]);
    assert_eq!(ledger.allowance(), Decimal::ZERO);

    let m = orch.metrics();
    assert_eq!(m.skipped_cycles, 1);
    assert_eq!(m.total_claimed, dec!(10));
    assert_eq!(m.total_fee_cost, Decimal::from(GAS_PER_TX));
}

#[tokio::test]
async fn test_failed_stake_still_counts_claim_fee() {
    let ledger = MockLedger::new(dec!(10), dec!(100));
    ledger.fail_stakes("execution reverted");
    let orch = orchestrator(ledger.clone(), test_config(), EventBus::new());

    let err = assert_err!(orch.run_cycle().await);

    assert_eq!(err.kind(), ErrorKind::ContractError);
    assert!(err.message().contains("Stake rewards"));
    assert_eq!(ledger.submissions(), vec!["claim", "stake-failed", "stake-failed", "stake-failed"]);

    let m = orch.metrics();
    assert_eq!(m.failed_cycles, 1);
    assert_eq!(m.total_claimed, dec!(10));
    assert_eq!(m.total_staked, Decimal::ZERO);
    assert_eq!(m.total_fee_cost, Decimal::from(GAS_PER_TX));
    assert_eq!(m.average_gas_used, 0);
}
