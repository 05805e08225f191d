//! Threshold detection

use chrono::{DateTime, Local};

use crate::collector::ProcessSample;
use crate::config::DEFAULT_CPU_THRESHOLD;
use crate::event::{Event, Severity, HIGH_CPU_USAGE, PROCESS_MONITOR};

pub trait Detector: Send + Sync {
    /// Map one sample to at most one event. Must not perform I/O.
    fn evaluate(&self, sample: &ProcessSample, detected_at: DateTime<Local>) -> Option<Event>;
}

#[derive(Debug, Clone)]
pub struct CpuThresholdDetector {
    threshold_percent: f64,
}

impl CpuThresholdDetector {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }
}

impl Default for CpuThresholdDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_THRESHOLD)
    }
}

impl Detector for CpuThresholdDetector {
    fn evaluate(&self, sample: &ProcessSample, detected_at: DateTime<Local>) -> Option<Event> {
        if sample.cpu_percent.is_nan() || sample.cpu_percent <= self.threshold_percent {
            return None;
        }
        Some(Event {
            timestamp: detected_at,
            event_type: HIGH_CPU_USAGE.to_string(),
            severity: Severity::Warning,
            description: format!(
                "Process {} (PID: {}) CPU: {:.1}%",
                sample.name, sample.pid, sample.cpu_percent
            ),
            source: PROCESS_MONITOR.to_string(),
        })
    }
}
