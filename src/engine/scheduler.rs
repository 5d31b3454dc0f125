//! Scheduler — main-cycle and health-check timers with graceful shutdown.
//!
//! Two independent tokio tasks tick at their own cadence. Both check the
//! run state before doing anything, so nothing fires after `stop()`.
//! Stopping is signalled over a watch channel rather than by aborting the
//! tasks: a cycle that is already running always finishes.
//!
//! Overlap policy: a main tick that finds a cycle still in flight is
//! skipped, not queued.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::engine::health::HealthMonitor;
use crate::engine::orchestrator::{CycleOrchestrator, CycleReport};
use crate::error::BotError;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RunStatus {
    Idle,
    Running,
}

struct RunState {
    status: RunStatus,
    main_timer: Option<JoinHandle<()>>,
    health_timer: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// What a main-cycle tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Scheduler not running; nothing happened.
    Inactive,
    /// Previous cycle still running; this tick was dropped.
    SkippedInFlight,
    Ran(Result<CycleReport, BotError>),
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Cheap to clone; all clones drive the same timers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    orchestrator: Arc<CycleOrchestrator>,
    health: Arc<HealthMonitor>,
    config: Arc<RwLock<BotConfig>>,
    state: Mutex<RunState>,
    /// `true` while a cycle runs. Doubles as the non-overlap guard.
    in_flight: watch::Sender<bool>,
}

/// Clears the in-flight flag however the cycle future ends.
struct InFlightGuard<'a>(&'a watch::Sender<bool>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<CycleOrchestrator>,
        health: Arc<HealthMonitor>,
        config: Arc<RwLock<BotConfig>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                health,
                config,
                state: Mutex::new(RunState {
                    status: RunStatus::Idle,
                    main_timer: None,
                    health_timer: None,
                    shutdown: None,
                }),
                in_flight: watch::channel(false).0,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RunStatus {
        self.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == RunStatus::Running
    }

    /// Probe health once, run one cycle in the foreground, then arm the
    /// timers. Only a fatal first cycle is returned, and it leaves the
    /// scheduler idle; any other failure is logged and scheduling goes on.
    pub async fn start(&self) -> Result<()> {
        self.reserve()?;
        self.launch().await
    }

    /// Flip to Running without doing any work yet. Lets a caller claim
    /// the scheduler under its own lock and run [`launch`](Self::launch)
    /// after releasing it.
    pub fn reserve(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.status == RunStatus::Running {
            bail!("Scheduler is already running");
        }
        state.status = RunStatus::Running;
        Ok(())
    }

    /// Second half of [`start`](Self::start). A `stop()` issued while this
    /// runs is honoured: the first cycle finishes and no timer is armed.
    pub async fn launch(&self) -> Result<()> {
        let cfg = self.inner.config.read().await.clone();
        info!(
            interval_hours = cfg.interval_hours,
            health_check_mins = ?cfg.health_check_interval_mins,
            "Scheduler starting"
        );

        self.inner.health.probe().await;

        match self.run_main_tick().await {
            TickOutcome::Ran(Err(e)) if e.kind().is_fatal() => {
                error!(kind = %e.kind(), error = %e.message(), "Initial cycle failed fatally");
                return Err(e.into());
            }
            TickOutcome::Ran(Err(e)) => {
                warn!(kind = %e.kind(), error = %e.message(), "Initial cycle failed, timers armed anyway");
            }
            TickOutcome::Inactive => {
                info!("Scheduler stopped during startup");
                return Ok(());
            }
            _ => {}
        }

        let (tx, rx) = watch::channel(false);
        let main_timer = tokio::spawn(self.clone().main_loop(cfg.interval(), rx.clone()));
        let health_timer = cfg
            .health_check_interval()
            .map(|period| tokio::spawn(self.clone().health_loop(period, rx)));

        let mut state = self.lock_state();
        if state.status != RunStatus::Running {
            // stop() raced the first cycle; the fresh tasks see the signal and exit.
            let _ = tx.send(true);
            return Ok(());
        }
        state.main_timer = Some(main_timer);
        state.health_timer = health_timer;
        state.shutdown = Some(tx);
        info!("Scheduler running");
        Ok(())
    }

    /// Signal both timers and go idle. Safe to call repeatedly and from
    /// inside a tick. An in-flight cycle is left to finish.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if state.status == RunStatus::Idle {
            debug!("Scheduler already stopped");
            return;
        }
        state.status = RunStatus::Idle;
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(true);
        }
        // Detach rather than abort so a running cycle completes.
        state.main_timer.take();
        state.health_timer.take();
        info!("Scheduler stopped");
    }

    /// `stop()`, then wait for the timer tasks (and any cycle they are
    /// running) to finish.
    pub async fn shutdown(&self) {
        let (main, health) = {
            let mut state = self.lock_state();
            (state.main_timer.take(), state.health_timer.take())
        };
        self.stop();
        for handle in [main, health].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Timer task ended abnormally");
            }
        }
        let mut busy = self.inner.in_flight.subscribe();
        let _ = busy.wait_for(|running| !*running).await;
    }

    /// Whether a cycle is running right now.
    pub fn cycle_in_flight(&self) -> bool {
        *self.inner.in_flight.borrow()
    }

    /// One main-cycle tick: guarded by run state and the in-flight flag.
    pub async fn run_main_tick(&self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Inactive;
        }

        let acquired = self.inner.in_flight.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !acquired {
            warn!("Previous cycle still running, skipping tick");
            return TickOutcome::SkippedInFlight;
        }

        let result = {
            let _guard = InFlightGuard(&self.inner.in_flight);
            self.inner.orchestrator.run_cycle().await
        };

        if let Err(e) = &result {
            if e.kind().is_fatal() {
                error!(kind = %e.kind(), error = %e.message(), "Fatal condition, stopping scheduler");
                self.stop();
            } else {
                error!(kind = %e.kind(), error = %e.message(), "Cycle failed, continuing to next");
            }
        }
        TickOutcome::Ran(result)
    }

    /// One health tick; no-op unless running.
    pub async fn run_health_tick(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.inner.health.probe().await;
        true
    }

    async fn main_loop(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let stopped = *shutdown.borrow();
            if stopped || !self.is_running() {
                break;
            }
            // Outside the select, so a shutdown signal cannot cancel it.
            self.run_main_tick().await;
        }
        debug!("Main cycle timer exited");
    }

    async fn health_loop(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let stopped = *shutdown.borrow();
            if stopped || !self.run_health_tick().await {
                break;
            }
        }
        debug!("Health check timer exited");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
