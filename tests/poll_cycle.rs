// tests/poll_cycle.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use meter_poller::{
    run_cycle, CycleOptions, CycleOutcome, FetchError, FnFetcher, MemoryStore, Meter,
    RawReading, ReadingRange, RecordingLog,
};

fn raw(meter: &str, secs: i64, value: f64) -> RawReading {
    RawReading {
        meter: meter.to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        value,
    }
}

fn meters(names: &[&str]) -> Vec<Meter> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Meter::new(*n, format!("10.0.0.{}", i + 1)))
        .collect()
}

#[tokio::test]
async fn unreachable_and_out_of_range_are_isolated() {
    let fetcher = FnFetcher(|m: Meter| async move {
        match m.name.as_str() {
            "A" => Ok(vec![raw("A", 1, 5.0)]),
            "B" => Err(FetchError::unreachable(m.address, "network error")),
            _ => Ok(vec![raw("C", 2, -1_000_000.0)]),
        }
    });
    let store = MemoryStore::new();
    let log = RecordingLog::new();
    let opts = CycleOptions {
        range: ReadingRange::between(0.0, 1000.0).unwrap(),
        ..CycleOptions::default()
    };

    let report = run_cycle(&fetcher, &meters(&["A", "B", "C"]), &store, &log, &opts).await;

    let stored = store.readings();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].meter, "A");
    assert_eq!(stored[0].timestamp, Utc.timestamp_opt(1, 0).unwrap());
    assert_eq!(stored[0].value, 5.0);

    assert_eq!(report.failed_meters, vec!["B".to_string()]);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.outcome, CycleOutcome::Committed);

    // only B is an error; the dropped reading from C is not
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("ERROR ON REQUEST TO METER 10.0.0.2"));
    let infos = log.infos();
    assert!(infos[0].starts_with("Getting meter data "));
    assert_eq!(infos.last().map(String::as_str), Some("Update finished"));
}

#[tokio::test]
async fn every_meter_failing_still_completes() {
    let fetcher = FnFetcher(|m: Meter| async move {
        Err::<Vec<RawReading>, _>(FetchError::Protocol {
            address: None,
            reason: format!("garbage from {}", m.name),
        })
    });
    let store = MemoryStore::new();
    let log = RecordingLog::new();

    let report = run_cycle(
        &fetcher,
        &meters(&["x", "y", "z"]),
        &store,
        &log,
        &CycleOptions::default(),
    )
    .await;

    assert!(store.is_empty());
    assert_eq!(report.failed_meters.len(), 3);
    assert_eq!(report.committed_batch, 0);
    assert!(report.is_committed());
    let errors = log.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .all(|e| e.starts_with("ERROR ON REQUEST TO METER [NO IP ADDRESS AVAILABLE]")));
}

#[tokio::test]
async fn panicking_fetch_counts_as_failed_meter() {
    let fetcher = FnFetcher(|m: Meter| async move {
        if m.name == "bad" {
            panic!("driver bug");
        }
        Ok::<_, FetchError>(vec![raw(&m.name, 10, 1.0)])
    });
    let store = MemoryStore::new();
    let log = RecordingLog::new();

    let report = run_cycle(
        &fetcher,
        &meters(&["good", "bad", "fine"]),
        &store,
        &log,
        &CycleOptions::default(),
    )
    .await;

    assert_eq!(report.failed_meters, vec!["bad".to_string()]);
    assert_eq!(store.len(), 2);
    assert!(log.errors()[0].contains("driver bug"));
}

#[tokio::test]
async fn malformed_values_never_reach_the_store() {
    let fetcher = FnFetcher(|m: Meter| async move {
        Ok::<_, FetchError>(vec![
            raw(&m.name, 1, f64::NAN),
            raw(&m.name, 2, f64::INFINITY),
            raw(&m.name, 3, 42.0),
        ])
    });
    let store = MemoryStore::new();
    let log = RecordingLog::new();

    let report = run_cycle(&fetcher, &meters(&["m"]), &store, &log, &CycleOptions::default()).await;

    assert_eq!(report.rejected, 2);
    assert_eq!(store.readings().iter().map(|r| r.value).collect::<Vec<_>>(), vec![42.0]);
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn fetches_run_concurrently() {
    // Every fetch waits for all the others; a serialized cycle would never get past the first.
    let names = ["a", "b", "c", "d"];
    let barrier = Arc::new(tokio::sync::Barrier::new(names.len()));
    let fetcher = FnFetcher(move |m: Meter| {
        let barrier = barrier.clone();
        async move {
            barrier.wait().await;
            Ok::<_, FetchError>(vec![raw(&m.name, 1, 1.0)])
        }
    });
    let store = MemoryStore::new();
    let log = RecordingLog::new();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        run_cycle(&fetcher, &meters(&names), &store, &log, &CycleOptions::default()),
    )
    .await
    .expect("cycle should not serialize fetches");

    assert_eq!(report.inserted, 4);
}

#[tokio::test]
async fn in_flight_cap_is_respected() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (f, p) = (in_flight.clone(), peak.clone());
    let fetcher = FnFetcher(move |m: Meter| {
        let (f, p) = (f.clone(), p.clone());
        async move {
            let now = f.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            f.fetch_sub(1, Ordering::SeqCst);
            let idx: i64 = m.name.trim_start_matches('m').parse().unwrap();
            Ok::<_, FetchError>(vec![raw(&m.name, idx, idx as f64)])
        }
    });
    let names: Vec<String> = (0..8).map(|i| format!("m{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let store = MemoryStore::new();
    let log = RecordingLog::new();
    let opts = CycleOptions {
        max_in_flight: Some(2),
        ..CycleOptions::default()
    };

    let report = run_cycle(&fetcher, &meters(&refs), &store, &log, &opts).await;

    assert_eq!(report.inserted, 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_meter_list_commits_empty_batch() {
    let fetcher = FnFetcher(|_m: Meter| async move { Ok::<Vec<RawReading>, FetchError>(Vec::new()) });
    let store = MemoryStore::new();
    let log = RecordingLog::new();

    let report = run_cycle(&fetcher, &[], &store, &log, &CycleOptions::default()).await;

    assert_eq!(report.meters, 0);
    assert!(report.is_committed());
    assert!(store.is_empty());
}
