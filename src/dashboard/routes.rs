//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is the shared `Arc<Bot>`.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::bot::Bot;
use crate::engine::scheduler::RunStatus;
use crate::metrics::CycleMetrics;

pub type AppState = Arc<Bot>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: RunStatus,
    pub account: String,
    pub staking_contract: String,
    pub interval_hours: u64,
    pub max_retries: u32,
    pub min_stake_amount: Option<Decimal>,
    pub max_gas_price: Option<Decimal>,
    pub total_cycles: u64,
    pub success_rate: f64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(bot): State<AppState>) -> Json<StatusResponse> {
    let cfg = bot.config().await;
    let metrics = bot.get_metrics();

    Json(StatusResponse {
        status: bot.status().await,
        account: cfg.account,
        staking_contract: cfg.staking_contract,
        interval_hours: cfg.interval_hours,
        max_retries: cfg.max_retries,
        min_stake_amount: cfg.min_stake_amount,
        max_gas_price: cfg.max_gas_price,
        total_cycles: metrics.total_cycles(),
        success_rate: metrics.success_rate(),
    })
}

/// GET /api/metrics
pub async fn get_metrics(State(bot): State<AppState>) -> Json<CycleMetrics> {
    Json(bot.get_metrics())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
