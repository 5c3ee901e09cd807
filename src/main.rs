//! Meter poller — Binary Entrypoint
//! Runs exactly one poll cycle over the configured meters and exits.
//! When cycles run is up to the host's scheduler (cron, systemd timer, ...).

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meter_poller::config::load_config_default;
use meter_poller::metrics::Metrics;
use meter_poller::poll::fixture::FixtureFetcher;
use meter_poller::{run_cycle, JsonFileStore, TracingLog};

/// Compact logs by default; `POLLER_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("poll=info,warn"));

    let json = std::env::var("POLLER_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let dump_metrics = std::env::var("POLLER_METRICS_DUMP")
        .ok()
        .is_some_and(|v| v == "1");
    let metrics = if dump_metrics {
        Some(Metrics::init().context("installing prometheus recorder")?)
    } else {
        None
    };

    let cfg = load_config_default().context("loading poller config")?;
    let opts = cfg.cycle_options()?;
    let meters = cfg.enabled_meters();
    let fetcher = FixtureFetcher::from_path(&cfg.fixture_path)?;
    let store = JsonFileStore::new(&cfg.store_path);

    let report = run_cycle(&fetcher, &meters, &store, &TracingLog, &opts).await;

    tracing::info!(
        target: "poll",
        meters = report.meters,
        failed = report.failed_meters.len(),
        fetched = report.fetched,
        rejected = report.rejected,
        inserted = report.inserted,
        committed = report.is_committed(),
        store = %store.path().display(),
        "poll run finished"
    );

    if let Some(m) = metrics {
        tracing::info!(target: "poll", "metrics snapshot:\n{}", m.render());
    }

    Ok(())
}
