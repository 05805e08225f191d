//! Process sampling (reads /proc on Linux)

mod linux;

pub use linux::LinuxProcessCollector;

use crate::error::CollectorError;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub username: String,
    pub cmdline: String,
    pub cpu_percent: f64,
}

/// Lazy, single-pass sequence of samples from one tick.
pub type ProcessSamples = Box<dyn Iterator<Item = ProcessSample> + Send>;

#[async_trait::async_trait]
pub trait ProcessCollector: Send + Sync {
    /// One sample per process visible at call time. Processes that vanish or
    /// deny access are left out rather than reported.
    async fn sample(&self) -> Result<ProcessSamples, CollectorError>;
}
