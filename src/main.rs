//! DRIP — Unattended Dollar-Cost-Averaging Order Agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the execution record from disk (or starts fresh), and drives
//! the execution engine on a wall-clock cadence with graceful shutdown.
//! Ticks run strictly serially: the next tick is not scheduled until the
//! previous `run_once` has returned.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

use drip::broker::alpaca::AlpacaClient;
use drip::broker::BrokerGateway;
use drip::config::AppConfig;
use drip::engine::Engine;
use drip::store::{ExecutionStore, JsonFileStore};

const BANNER: &str = r#"
 ____  ____  ___ ____
|  _ \|  _ \|_ _|  _ \
| | | | |_) || || |_) |
| |_| |  _ < | ||  __/
|____/|_| \_\___|_|

  Dollar-cost averaging, one period at a time
  v0.1.0 — Unattended Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");

    // -- Build the immutable plan ------------------------------------------

    let is_paper = std::env::var("IS_PAPER").ok();
    let plan = cfg.plan.build(is_paper.as_deref())?;
    info!(
        agent_name = %cfg.agent.name,
        plan = %plan,
        tick_interval_secs = cfg.agent.tick_interval_secs,
        "DRIP starting up"
    );
    if plan.mode == drip::types::TradeMode::Live {
        warn!("LIVE trading mode — orders will use real funds");
    }

    // -- Initialise components ---------------------------------------------

    let credentials = cfg.broker.credentials()?;
    let broker = AlpacaClient::new(credentials, plan.mode, cfg.broker.request_timeout())?;
    info!(broker = broker.name(), mode = %plan.mode, "Broker gateway ready");

    let store = JsonFileStore::new(&cfg.storage.state_file);
    match store.load()? {
        Some(record) => info!(record = %record, "Resumed from saved state"),
        None => info!(
            state_file = %cfg.storage.state_file,
            "No prior execution record, starting fresh"
        ),
    }

    let engine = Engine::new(plan, broker, store, cfg.retry.policy());

    // -- Main loop -----------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.tick_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.tick_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.run_once(Utc::now()).await {
                    Ok(record) => {
                        info!(
                            period = %record.period_key,
                            status = %record.status,
                            order_id = ?record.order_id,
                            "Tick complete"
                        );
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, "Tick failed — will retry on a later tick");
                    }
                    Err(e) => {
                        error!(error = %e, "Tick failed — operator attention may be required");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("DRIP shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("drip=info"));

    let json_logging = std::env::var("DRIP_LOG_JSON").is_ok();

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
