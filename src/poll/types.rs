// src/poll/types.rs
use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Meter {
    pub name: String,    // unique identity, e.g. "library"
    pub address: String, // network address, e.g. "10.0.0.5"
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Protocol parameters, opaque to the poll cycle.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl Meter {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }
}

/// One sample as returned by a fetcher, before validation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RawReading {
    pub meter: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A validated reading, the unit the store persists.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Reading {
    pub meter: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            meter: self.meter.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl From<RawReading> for Reading {
    fn from(r: RawReading) -> Self {
        Self {
            meter: r.meter,
            timestamp: r.timestamp,
            value: r.value,
        }
    }
}

/// Uniqueness key of a stored reading.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingKey {
    pub meter: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("meter {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("protocol error from {}: {reason}", or_unknown(.address))]
    Protocol {
        address: Option<String>,
        reason: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn or_unknown(address: &Option<String>) -> &str {
    address.as_deref().unwrap_or("unknown meter")
}

impl FetchError {
    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Address of the meter that failed, when the error carries one.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Unreachable { address, .. } => Some(address),
            Self::Protocol { address, .. } => address.as_deref(),
            Self::Other(_) => None,
        }
    }
}

pub type FetchOutcome = Result<Vec<RawReading>, FetchError>;

#[async_trait]
pub trait MeterFetcher: Send + Sync {
    /// Query one meter. Must fail rather than return a sentinel on network or protocol errors.
    async fn fetch(&self, meter: &Meter) -> FetchOutcome;
}

/// Adapts a plain async closure into a [`MeterFetcher`].
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F, Fut> MeterFetcher for FnFetcher<F>
where
    F: Fn(Meter) -> Fut + Send + Sync,
    Fut: Future<Output = FetchOutcome> + Send,
{
    async fn fetch(&self, meter: &Meter) -> FetchOutcome {
        (self.0)(meter.clone()).await
    }
}
