// src/lib.rs
// Public library surface for the poller binary and integration tests.

pub mod config;
pub mod logger;
pub mod metrics;
pub mod poll;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::logger::{CycleLog, RecordingLog, TracingLog};
pub use crate::poll::types::{FetchError, FnFetcher, Meter, MeterFetcher, RawReading, Reading};
pub use crate::poll::validate::{is_acceptable, Bound, ReadingRange};
pub use crate::poll::{run_cycle, update_all_meters, CycleOptions, CycleOutcome, CycleReport};
pub use crate::store::{JsonFileStore, MemoryStore, RecordStore, StoreError};
