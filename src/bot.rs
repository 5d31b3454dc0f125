//! Bot facade — the API the process layer drives.
//!
//! Owns the shared config, metrics and event bus for the lifetime of the
//! process. Each `start` connects a fresh ledger client from the signing
//! key and assembles orchestrator, health monitor and scheduler around it.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{info, warn};

use crate::config::{BotConfig, ConfigUpdate};
use crate::engine::health::HealthMonitor;
use crate::engine::orchestrator::CycleOrchestrator;
use crate::engine::scheduler::{RunStatus, Scheduler};
use crate::events::{EventBus, EventKind, Severity};
use crate::ledger::LedgerConnector;
use crate::metrics::{CycleMetrics, MetricsAggregator};

pub struct Bot {
    config: Arc<RwLock<BotConfig>>,
    metrics: Arc<Mutex<MetricsAggregator>>,
    events: EventBus,
    connector: Arc<dyn LedgerConnector>,
    scheduler: AsyncMutex<Option<Scheduler>>,
    /// Set by `shutdown`; no start is accepted afterwards.
    closed: AtomicBool,
}

impl Bot {
    pub fn new(config: BotConfig, connector: Arc<dyn LedgerConnector>) -> Result<Self> {
        config.validate().context("Invalid bot configuration")?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(Mutex::new(MetricsAggregator::new())),
            events: EventBus::new(),
            connector,
            scheduler: AsyncMutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connect to the ledger and start scheduling. Fails if already running
    /// or if the first cycle hits a fatal error.
    ///
    /// The scheduler slot is only locked while the scheduler is built and
    /// reserved; the first cycle runs unlocked so `status`, `stop` and
    /// `shutdown` stay responsive during startup.
    pub async fn start(&self, signing_key: SecretString) -> Result<()> {
        let scheduler = {
            let mut slot = self.scheduler.lock().await;
            if self.closed.load(Ordering::Acquire) {
                bail!("Bot is shut down");
            }
            if matches!(slot.as_ref(), Some(s) if s.is_running()) {
                bail!("Bot is already running");
            }

            let ledger = self
                .connector
                .connect(signing_key)
                .await
                .context("Failed to connect ledger client")?;

            let orchestrator = Arc::new(CycleOrchestrator::new(
                ledger.clone(),
                self.config.clone(),
                self.metrics.clone(),
                self.events.clone(),
            ));
            let health = Arc::new(HealthMonitor::new(ledger, self.config.clone(), self.events.clone()));
            let scheduler = Scheduler::new(orchestrator, health, self.config.clone());
            scheduler.reserve()?;
            *slot = Some(scheduler.clone());
            scheduler
        };

        scheduler.launch().await
    }

    /// Stop the timers. An in-flight cycle still completes.
    pub async fn stop(&self) {
        if let Some(s) = self.scheduler.lock().await.as_ref() {
            s.stop();
        }
    }

    /// Stop, wait for in-flight work, and publish the final metrics.
    /// Final: a later or concurrent `start` is refused.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let scheduler = self.scheduler.lock().await.clone();
        if let Some(s) = scheduler {
            s.shutdown().await;
        }
        let snapshot = self.get_metrics();
        self.events.emit(
            EventKind::MetricsSnapshot,
            Severity::Info,
            format!("Final metrics: {snapshot}"),
            json!(snapshot),
        );
    }

    pub async fn status(&self) -> RunStatus {
        match self.scheduler.lock().await.as_ref() {
            Some(s) => s.status(),
            None => RunStatus::Idle,
        }
    }

    pub fn get_metrics(&self) -> CycleMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub async fn config(&self) -> BotConfig {
        self.config.read().await.clone()
    }

    /// Apply a partial update; the next cycle picks it up. Timer periods
    /// are fixed when the timers are armed and change on the next start.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<BotConfig> {
        let mut cfg = self.config.write().await;
        let next = cfg.apply(&update)?;
        if next.interval_hours != cfg.interval_hours
            || next.health_check_interval_mins != cfg.health_check_interval_mins
        {
            warn!("Timer periods changed; they take effect on the next start");
        }
        *cfg = next.clone();
        info!(?update, "Configuration updated");
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
