//! Per-analysis diagnostics
//!
//! "Found no culprit" is a normal outcome, so the classifier reports why
//! through this side channel instead of an error. Every entry is also
//! emitted as a `tracing` event.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Machine-checkable reason for a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    NoRegressionRange,
    NoSuspects,
    FailedToParseStacktrace,
    OnlyOneSuspect,
    AllSuspectsFiltered,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::NoRegressionRange => "NoRegressionRange",
            LogKind::NoSuspects => "NoSuspects",
            LogKind::FailedToParseStacktrace => "FailedToParseStacktrace",
            LogKind::OnlyOneSuspect => "OnlyOneSuspect",
            LogKind::AllSuspectsFiltered => "AllSuspectsFiltered",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub kind: LogKind,
    pub message: String,
}

/// Ordered diagnostics of the most recent analysis
#[derive(Debug, Clone, Default)]
pub struct AnalysisLog {
    entries: Vec<LogEntry>,
}

impl AnalysisLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: LogLevel, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(kind = %kind, "{}", message),
            LogLevel::Warning => warn!(kind = %kind, "{}", message),
            LogLevel::Error => error!(kind = %kind, "{}", message),
        }
        self.entries.push(LogEntry {
            level,
            kind,
            message,
        });
    }

    pub fn info(&mut self, kind: LogKind, message: impl Into<String>) {
        self.record(LogLevel::Info, kind, message);
    }

    pub fn warning(&mut self, kind: LogKind, message: impl Into<String>) {
        self.record(LogLevel::Warning, kind, message);
    }

    pub fn error(&mut self, kind: LogKind, message: impl Into<String>) {
        self.record(LogLevel::Error, kind, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Whether an entry of `kind` was recorded
    pub fn contains(&self, kind: LogKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
