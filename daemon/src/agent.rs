//! The sampling loop and its lifecycle

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::ProcessCollector;
use crate::db::EventStore;
use crate::detector::Detector;
use crate::error::AgentError;
use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub samples: usize,
    pub event_ids: Vec<i64>,
    /// Cancellation was observed before the tick saw every sample.
    pub cancelled: bool,
}

pub struct Agent<C, D, S> {
    collector: C,
    detector: D,
    store: S,
    check_interval: Duration,
    cancel: CancellationToken,
    state: AgentState,
    last_detected: Option<DateTime<Local>>,
}

impl<C, D, S> Agent<C, D, S>
where
    C: ProcessCollector,
    D: Detector,
    S: EventStore,
{
    pub fn new(
        collector: C,
        detector: D,
        store: S,
        check_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collector,
            detector,
            store,
            check_interval,
            cancel,
            state: AgentState::Created,
            last_detected: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run ticks until cancelled or a tick fails, then close the store.
    ///
    /// Ticks are scheduled with a fixed delay: the next one starts
    /// `check_interval` after the previous one finished. A failing tick is
    /// logged once at ERROR and ends the loop; it is not retried.
    pub async fn start(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::Created {
            return Err(AgentError::AlreadyStarted(self.state));
        }
        self.state = AgentState::Running;
        info!("NightMother Security Agent started");

        let result = self.run().await;

        self.state = AgentState::Stopping;
        match &result {
            Ok(()) => info!("Shutting down NightMother"),
            Err(e) => error!("Error: {}", e),
        }
        self.store.close();
        self.state = AgentState::Stopped;
        result
    }

    async fn run(&mut self) -> Result<(), AgentError> {
        loop {
            if self.tick().await?.cancelled {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
    }

    /// Sample, evaluate, persist and mirror every resulting event.
    pub async fn tick(&mut self) -> Result<TickReport, AgentError> {
        let mut report = TickReport::default();
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let samples = tokio::select! {
            _ = self.cancel.cancelled() => {
                report.cancelled = true;
                return Ok(report);
            }
            samples = self.collector.sample() => samples?,
        };

        for sample in samples {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.samples += 1;
            let detected_at = self.detection_time();
            if let Some(event) = self.detector.evaluate(&sample, detected_at) {
                report.event_ids.push(self.record(&event)?);
            }
        }

        debug!(
            "Tick done: {} samples, {} events",
            report.samples,
            report.event_ids.len()
        );
        Ok(report)
    }

    fn record(&mut self, event: &Event) -> Result<i64, AgentError> {
        let id = self.store.append(event)?;
        info!("{}: {}", event.severity, event.description);
        Ok(id)
    }

    /// Wall clock, clamped so detection times never go backwards.
    fn detection_time(&mut self) -> DateTime<Local> {
        let now = Local::now();
        let at = match self.last_detected {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_detected = Some(at);
        at
    }
}
