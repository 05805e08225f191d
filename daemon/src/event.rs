//! Security event records

use chrono::{DateTime, Local};
use std::fmt;

pub const HIGH_CPU_USAGE: &str = "High CPU Usage";
pub const PROCESS_MONITOR: &str = "Process Monitor";

/// Local time with microseconds and UTC offset, e.g.
/// `2024-05-01T13:37:00.123456+02:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected condition, not yet persisted. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub source: String,
}

impl Event {
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A row read back from the `events` table.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub description: String,
    pub source: String,
}
