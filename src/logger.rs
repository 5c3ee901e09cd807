// src/logger.rs
use std::error::Error;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Sink for cycle notifications: start, completion, per-meter failure and cycle-fatal failure.
pub trait CycleLog: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str, detail: &(dyn Error + 'static));
}

/// Production sink: forwards to `tracing` under the `poll` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl CycleLog for TracingLog {
    fn info(&self, message: &str) {
        tracing::info!(target: "poll", "{message}");
    }

    fn error(&self, message: &str, detail: &(dyn Error + 'static)) {
        tracing::error!(target: "poll", error = ?detail, "{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Info(String),
    Error { message: String, detail: String },
}

// --- Test helper ---
#[derive(Debug, Default)]
pub struct RecordingLog {
    pub lines: Mutex<Vec<LogLine>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic elsewhere while holding the lock does not lose what was recorded.
    fn guard(&self) -> MutexGuard<'_, Vec<LogLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn errors(&self) -> Vec<String> {
        self.guard()
            .iter()
            .filter_map(|l| match l {
                LogLine::Error { message, .. } => Some(message.clone()),
                LogLine::Info(_) => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.guard()
            .iter()
            .filter_map(|l| match l {
                LogLine::Info(m) => Some(m.clone()),
                LogLine::Error { .. } => None,
            })
            .collect()
    }
}

impl CycleLog for RecordingLog {
    fn info(&self, message: &str) {
        self.guard().push(LogLine::Info(message.to_string()));
    }

    fn error(&self, message: &str, detail: &(dyn Error + 'static)) {
        self.guard().push(LogLine::Error {
            message: message.to_string(),
            detail: detail.to_string(),
        });
    }
}
