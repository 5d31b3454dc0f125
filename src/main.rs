//! AUTOSTAKE — Resilient reward compounding bot
//!
//! Entry point. Loads configuration, initialises structured logging,
//! obtains the signing key, starts the scheduler and waits for Ctrl+C or
//! SIGTERM, then shuts down gracefully and logs the final metrics.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use autostake::bot::Bot;
use autostake::config;
use autostake::dashboard;
use autostake::ledger::dry_run::DryRunLedger;
use autostake::secrets::{EnvSecretProvider, SecretProvider};

const BANNER: &str = r#"
   _   _   _ _____ ___  ___ _____ _   _  _____
  /_\ | | | |_   _/ _ \/ __|_   _/_\ | |/ / __|
 / _ \| |_| | | || (_) \__ \ | |/ _ \| ' <| _|
/_/ \_\\___/  |_| \___/|___/ |_/_/ \_\_|\_\___|

  claim → approve → stake, on schedule
"#;

/// Config path when `AUTOSTAKE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("AUTOSTAKE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        account = %cfg.bot.account,
        staking_contract = %cfg.bot.staking_contract,
        interval_hours = cfg.bot.interval_hours,
        max_retries = cfg.bot.max_retries,
        min_stake = ?cfg.bot.min_stake_amount,
        max_gas_price = ?cfg.bot.max_gas_price,
        "AUTOSTAKE starting up"
    );

    let signing_key = EnvSecretProvider::new(&cfg.secrets.signing_key_env).obtain_signing_key()?;

    // No live ledger binding ships with the crate; the dry-run client logs
    // what would be sent.
    let connector = Arc::new(DryRunLedger::default());
    let bot = Arc::new(Bot::new(cfg.bot.clone(), connector)?);

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(bot.clone(), cfg.dashboard.port).await?;
    }

    // Handlers go in before the first cycle so an early Ctrl+C or SIGTERM
    // still drains and flushes metrics.
    let signal = shutdown_signal()?;
    tokio::pin!(signal);

    let mut startup = tokio::spawn({
        let bot = bot.clone();
        async move { bot.start(signing_key).await }
    });

    let started = tokio::select! {
        joined = &mut startup => Some(joined),
        _ = &mut signal => None,
    };

    match started {
        Some(joined) => {
            if let Err(e) = joined.context("Startup task panicked")? {
                error!(error = %e, "Startup failed");
                bot.shutdown().await;
                return Err(e);
            }
            info!("Scheduler armed. Press Ctrl+C to stop.");
            signal.await;
            info!("Shutdown signal received.");
            bot.shutdown().await;
        }
        None => {
            info!("Shutdown signal received during startup.");
            bot.shutdown().await;
            if let Err(e) = startup.await.context("Startup task panicked")? {
                warn!(error = %e, "Startup aborted by shutdown");
            }
        }
    }

    let metrics = bot.get_metrics();
    info!(
        claimed = %metrics.total_claimed,
        staked = %metrics.total_staked,
        successful = metrics.successful_cycles,
        failed = metrics.failed_cycles,
        skipped = metrics.skipped_cycles,
        fees = %metrics.total_fee_cost,
        "AUTOSTAKE shut down cleanly."
    );

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM. Listeners are registered
/// when this is called, not when the future is first polled.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to listen for SIGINT")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autostake=info"));

    let json_logging = std::env::var("AUTOSTAKE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
