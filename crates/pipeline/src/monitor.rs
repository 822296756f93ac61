//! Periodic device health monitor.
//!
//! [`HealthMonitor`] is the producer half of the pipeline. Each cycle it
//! evaluates every registered device, appends an alert-raised event when a
//! device goes from UP to DOWN, and persists every device's new status.

use std::sync::Arc;
use std::time::Duration;

use fleetwatch_core::alert::AlertRaised;
use fleetwatch_core::device::DEFAULT_CHECK_INTERVAL_SECS;
use fleetwatch_core::error::PipelineError;
use fleetwatch_db::models::status::DeviceStatus;
use fleetwatch_events::stream::ALERT_STREAM;
use fleetwatch_events::EventStream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::health::HealthProbe;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between the start of two cycles.
    pub interval: Duration,
    /// Stream that receives alert-raised events.
    pub stream: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            stream: ALERT_STREAM.to_string(),
        }
    }
}

/// Counts from one monitor cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices whose status was evaluated and persisted.
    pub evaluated: usize,
    /// UP -> DOWN transitions observed.
    pub transitions: usize,
    /// Transition events appended to the stream.
    pub appended: usize,
    /// Transition events lost because the append failed.
    pub append_failures: usize,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

pub struct HealthMonitor {
    store: Arc<dyn Store>,
    stream: Arc<dyn EventStream>,
    probe: Arc<dyn HealthProbe>,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        stream: Arc<dyn EventStream>,
        probe: Arc<dyn HealthProbe>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            stream,
            probe,
            config,
        }
    }

    /// Run cycles on a fixed interval until `cancel` fires.
    ///
    /// The first cycle starts immediately. Cancellation is only observed
    /// between cycles, never inside one.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            stream = %self.config.stream,
            "Health monitor started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Health monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "Monitoring cycle aborted");
                    }
                }
            }
        }
    }

    /// Evaluate every device once.
    ///
    /// A failed append is logged and counted; the cycle carries on. A failed
    /// evaluation or status write aborts the cycle: devices handled before
    /// it keep their new status, the rest keep the old one until the next
    /// cycle.
    pub async fn run_once(&self) -> Result<CycleReport, PipelineError> {
        let devices = self.store.get_all_devices().await?;
        let mut report = CycleReport::default();

        for device in &devices {
            let new_status = self.probe.evaluate(device).await?;

            if device.status() == Some(DeviceStatus::Up) && new_status == DeviceStatus::Down {
                report.transitions += 1;
                let event = AlertRaised::device_down(device.id, &device.name);

                match self
                    .stream
                    .append(&self.config.stream, &event.to_payload())
                    .await
                {
                    Ok(event_id) => {
                        report.appended += 1;
                        tracing::info!(
                            device_id = device.id,
                            device_name = %device.name,
                            event_id,
                            "Device went down, alert event appended"
                        );
                    }
                    Err(e) => {
                        report.append_failures += 1;
                        tracing::error!(
                            device_id = device.id,
                            device_name = %device.name,
                            error = %e,
                            "Failed to append alert event"
                        );
                    }
                }
            }

            self.store.update_device_status(device.id, new_status).await?;
            report.evaluated += 1;
        }

        tracing::debug!(
            evaluated = report.evaluated,
            transitions = report.transitions,
            appended = report.appended,
            append_failures = report.append_failures,
            "Monitoring cycle completed"
        );

        Ok(report)
    }
}
