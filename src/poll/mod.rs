// src/poll/mod.rs
pub mod fixture;
pub mod types;
pub mod validate;

use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::{FutureExt, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::logger::{CycleLog, TracingLog};
use crate::poll::types::{FetchError, Meter, MeterFetcher, RawReading, Reading};
use crate::poll::validate::{is_acceptable, ReadingRange};
use crate::store::{RecordStore, StoreError};

const NO_ADDRESS: &str = "[NO IP ADDRESS AVAILABLE]";

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Poll cycles run.");
        describe_counter!(
            "poll_meter_errors_total",
            "Meter fetches that failed and were skipped."
        );
        describe_counter!(
            "poll_readings_fetched_total",
            "Readings returned by meters before validation."
        );
        describe_counter!(
            "poll_readings_rejected_total",
            "Readings dropped as malformed or out of range."
        );
        describe_counter!(
            "poll_readings_inserted_total",
            "Readings newly inserted by the store."
        );
        describe_counter!(
            "poll_commit_failures_total",
            "Cycles whose batch commit failed."
        );
        describe_histogram!("poll_cycle_ms", "Poll cycle wall time in milliseconds.");
        describe_gauge!("poll_last_run_ts", "Unix ts when a poll cycle last ran.");
    });
}

/// Knobs for a single cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    pub range: ReadingRange,
    /// Cap on concurrent fetches; `None` (or 0) launches every meter at once.
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("store commit failed: {0}")]
    Commit(#[from] StoreError),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Committed,
    Failed { message: String },
}

/// What a cycle did. Observational only; `run_cycle` never fails.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub meters: usize,
    /// Names of meters whose fetch failed, in input order.
    pub failed_meters: Vec<String>,
    pub fetched: usize,
    pub rejected: usize,
    /// Size of the batch handed to the store.
    pub committed_batch: usize,
    /// Readings the store reported as new.
    pub inserted: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn is_committed(&self) -> bool {
        self.outcome == CycleOutcome::Committed
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Fetch one meter, turning an error or panic into `None` after logging it.
async fn fetch_isolated<'a>(
    fetcher: &'a dyn MeterFetcher,
    meter: &'a Meter,
    log: &'a dyn CycleLog,
) -> (&'a str, Option<Vec<RawReading>>) {
    let err = match AssertUnwindSafe(fetcher.fetch(meter)).catch_unwind().await {
        Ok(Ok(readings)) => return (meter.name.as_str(), Some(readings)),
        Ok(Err(e)) => e,
        Err(payload) => FetchError::Other(anyhow::anyhow!(
            "fetch panicked: {}",
            panic_message(payload)
        )),
    };

    let address = err.address().unwrap_or(NO_ADDRESS);
    log.error(
        &format!("ERROR ON REQUEST TO METER {address}, {err}"),
        &err,
    );
    counter!("poll_meter_errors_total").increment(1);
    (meter.name.as_str(), None)
}

/// Drop malformed/out-of-range readings and flatten per-meter batches, keeping order.
/// Returns (accepted, rejected_count).
pub fn validate_and_flatten(
    batches: Vec<Vec<RawReading>>,
    range: &ReadingRange,
) -> (Vec<Reading>, usize) {
    let total: usize = batches.iter().map(Vec::len).sum();
    let mut accepted = Vec::with_capacity(total);
    let mut rejected = 0usize;
    for r in batches.into_iter().flatten() {
        if is_acceptable(r.value, range) {
            accepted.push(Reading::from(r));
        } else {
            tracing::debug!(target: "poll", meter = %r.meter, value = r.value, "reading rejected");
            rejected += 1;
        }
    }
    (accepted, rejected)
}

async fn commit(store: &dyn RecordStore, readings: &[Reading]) -> Result<usize, CycleError> {
    match AssertUnwindSafe(store.insert_or_ignore_all(readings))
        .catch_unwind()
        .await
    {
        Ok(res) => Ok(res?),
        Err(payload) => Err(CycleError::Unexpected(format!(
            "store panicked: {}",
            panic_message(payload)
        ))),
    }
}

/// Poll every meter concurrently, validate what came back and commit it as one batch.
///
/// Failures never escape: a failing meter contributes nothing, and a failing commit
/// leaves the store as it was. Both are reported through `log` and the returned report.
pub async fn run_cycle(
    fetcher: &dyn MeterFetcher,
    meters: &[Meter],
    store: &dyn RecordStore,
    log: &dyn CycleLog,
    opts: &CycleOptions,
) -> CycleReport {
    ensure_metrics_described();

    let started_at = Utc::now();
    let t0 = std::time::Instant::now();
    log.info(&format!(
        "Getting meter data {}",
        started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));

    // fetching: settle every meter, never short-circuit
    let tasks: Vec<_> = meters.iter().map(|m| fetch_isolated(fetcher, m, log)).collect();
    let settled: Vec<(&str, Option<Vec<RawReading>>)> = match opts.max_in_flight {
        Some(n) if n > 0 => futures::stream::iter(tasks).buffered(n).collect().await,
        _ => futures::future::join_all(tasks).await,
    };

    // validating / flattening
    let mut failed_meters = Vec::new();
    let mut batches = Vec::with_capacity(settled.len());
    for (name, outcome) in settled {
        match outcome {
            Some(batch) => batches.push(batch),
            None => failed_meters.push(name.to_string()),
        }
    }
    let fetched: usize = batches.iter().map(Vec::len).sum();
    let (readings, rejected) = validate_and_flatten(batches, &opts.range);

    // committing
    let (inserted, outcome) = match commit(store, &readings).await {
        Ok(inserted) => {
            log.info("Update finished");
            (inserted, CycleOutcome::Committed)
        }
        Err(e) => {
            log.error(&format!("Error updating all meters: {e}"), &e);
            counter!("poll_commit_failures_total").increment(1);
            (
                0,
                CycleOutcome::Failed {
                    message: e.to_string(),
                },
            )
        }
    };

    // Telemetry
    counter!("poll_cycles_total").increment(1);
    counter!("poll_readings_fetched_total").increment(fetched as u64);
    counter!("poll_readings_rejected_total").increment(rejected as u64);
    counter!("poll_readings_inserted_total").increment(inserted as u64);
    histogram!("poll_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    gauge!("poll_last_run_ts").set(started_at.timestamp().max(0) as f64);

    tracing::debug!(
        target: "poll",
        meters = meters.len(),
        failed = failed_meters.len(),
        fetched,
        rejected,
        inserted,
        "poll cycle done"
    );

    CycleReport {
        started_at,
        meters: meters.len(),
        failed_meters,
        fetched,
        rejected,
        committed_batch: readings.len(),
        inserted,
        outcome,
    }
}

/// One cycle logged through `tracing`, accepting any finite value, with no cap on concurrent fetches.
pub async fn update_all_meters(
    fetcher: &dyn MeterFetcher,
    meters: &[Meter],
    store: &dyn RecordStore,
) -> CycleReport {
    run_cycle(fetcher, meters, store, &TracingLog, &CycleOptions::default()).await
}
