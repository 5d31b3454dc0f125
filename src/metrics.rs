//! Metrics aggregation — totals, cycle counters and running gas average.
//!
//! Mutated only by the orchestrator after each cycle; everyone else reads
//! a [`CycleMetrics`] snapshot. In-memory only, reset on restart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleMetrics {
    pub total_claimed: Decimal,
    pub total_staked: Decimal,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    /// Cycles ended early because the network fee was over the ceiling.
    pub skipped_cycles: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    /// Mean gas per successful cycle, integer division.
    pub average_gas_used: u128,
    pub total_fee_cost: Decimal,
}

impl Default for CycleMetrics {
    fn default() -> Self {
        Self {
            total_claimed: Decimal::ZERO,
            total_staked: Decimal::ZERO,
            successful_cycles: 0,
            failed_cycles: 0,
            skipped_cycles: 0,
            last_success: None,
            last_failure: None,
            average_gas_used: 0,
            total_fee_cost: Decimal::ZERO,
        }
    }
}

impl fmt::Display for CycleMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "claimed={} | staked={} | cycles ok={} failed={} skipped={} | avg_gas={} | fees={}",
            self.total_claimed,
            self.total_staked,
            self.successful_cycles,
            self.failed_cycles,
            self.skipped_cycles,
            self.average_gas_used,
            self.total_fee_cost,
        )
    }
}

impl CycleMetrics {
    pub fn total_cycles(&self) -> u64 {
        self.successful_cycles + self.failed_cycles + self.skipped_cycles
    }

    /// Successful cycles as a fraction of success + failure. Skips excluded.
    pub fn success_rate(&self) -> f64 {
        let decided = self.successful_cycles + self.failed_cycles;
        if decided == 0 {
            0.0
        } else {
            self.successful_cycles as f64 / decided as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: CycleMetrics,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one gas sample at `price` per unit.
    ///
    /// Call before [`record_success`](Self::record_success): the running
    /// average weights the existing mean by the success count *before* it
    /// is incremented.
    pub fn record_gas(&mut self, used: u64, price: Decimal) {
        self.record_usage(used, Decimal::from(used) * price);
    }

    /// Same as [`record_gas`](Self::record_gas) with the fee already
    /// computed, for samples that sum several transactions at different prices.
    pub fn record_usage(&mut self, used: u64, fee: Decimal) {
        let n = u128::from(self.metrics.successful_cycles);
        let avg = self.metrics.average_gas_used;
        self.metrics.average_gas_used = (avg * n + u128::from(used)) / (n + 1);
        self.metrics.total_fee_cost += fee;
    }

    /// Fees paid by a cycle that did not succeed. The gas average only
    /// follows successful cycles, but the money is spent either way.
    pub fn record_fee(&mut self, fee: Decimal) {
        self.metrics.total_fee_cost += fee;
    }

    pub fn record_claimed(&mut self, amount: Decimal) {
        self.metrics.total_claimed += amount;
    }

    pub fn record_staked(&mut self, amount: Decimal) {
        self.metrics.total_staked += amount;
    }

    pub fn record_success(&mut self) {
        self.metrics.successful_cycles += 1;
        self.metrics.last_success = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.metrics.failed_cycles += 1;
        self.metrics.last_failure = Some(Utc::now());
    }

    pub fn record_skip(&mut self) {
        self.metrics.skipped_cycles += 1;
    }

    pub fn snapshot(&self) -> CycleMetrics {
        self.metrics.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
