// src/poll/fixture.rs
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::poll::types::{FetchError, FetchOutcome, Meter, MeterFetcher, RawReading};

#[derive(Debug, Deserialize)]
struct Sample {
    timestamp: DateTime<Utc>,
    // string or null here is a malformed reading, not a fixture error
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Samples(Vec<Sample>),
    Failure { error: String },
}

/// Serves canned readings per meter name. Meters without an entry are reported unreachable.
pub struct FixtureFetcher {
    entries: HashMap<String, Entry>,
}

impl FixtureFetcher {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let entries: HashMap<String, Entry> =
            serde_json::from_str(s).context("parsing meter fixture json")?;
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading meter fixture from {}", path.display()))?;
        Self::from_json_str(&content)
    }
}

/// Only JSON numbers are readings; strings (even "7.5"), null, bools and the rest map to NaN.
fn numeric(v: &serde_json::Value) -> f64 {
    v.as_f64().unwrap_or(f64::NAN)
}

#[async_trait]
impl MeterFetcher for FixtureFetcher {
    async fn fetch(&self, meter: &Meter) -> FetchOutcome {
        match self.entries.get(&meter.name) {
            Some(Entry::Samples(samples)) => Ok(samples
                .iter()
                .map(|s| RawReading {
                    meter: meter.name.clone(),
                    timestamp: s.timestamp,
                    value: numeric(&s.value),
                })
                .collect()),
            Some(Entry::Failure { error }) => {
                Err(FetchError::unreachable(meter.address.clone(), error.clone()))
            }
            None => Err(FetchError::unreachable(
                meter.address.clone(),
                "no fixture data for meter",
            )),
        }
    }
}
