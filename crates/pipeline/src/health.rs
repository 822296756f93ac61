//! Pluggable device health predicate.
//!
//! Real probing (ICMP, SNMP, agent heartbeats) lives outside this crate; the
//! monitor only needs something that turns a device into a status.

use async_trait::async_trait;
use fleetwatch_core::error::PipelineError;
use fleetwatch_db::models::device::Device;
use fleetwatch_db::models::status::DeviceStatus;
use rand::Rng;

/// Default probability that [`RandomProbe`] reports a device DOWN.
pub const DEFAULT_DOWN_PROBABILITY: f64 = 0.5;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Observe the device's current health.
    ///
    /// An error aborts the rest of the monitor iteration; devices already
    /// handled in that iteration keep their new status.
    async fn evaluate(&self, device: &Device) -> Result<DeviceStatus, PipelineError>;
}

/// Coin-flip probe standing in for real health checks.
pub struct RandomProbe {
    down_probability: f64,
}

impl RandomProbe {
    /// `down_probability` is clamped to `0.0..=1.0`; NaN counts as `0.0`.
    pub fn new(down_probability: f64) -> Self {
        let down_probability = if down_probability.is_nan() {
            0.0
        } else {
            down_probability.clamp(0.0, 1.0)
        };
        Self { down_probability }
    }

    pub fn down_probability(&self) -> f64 {
        self.down_probability
    }
}

impl Default for RandomProbe {
    fn default() -> Self {
        Self::new(DEFAULT_DOWN_PROBABILITY)
    }
}

#[async_trait]
impl HealthProbe for RandomProbe {
    async fn evaluate(&self, _device: &Device) -> Result<DeviceStatus, PipelineError> {
        let down = rand::rng().random_bool(self.down_probability);
        Ok(if down {
            DeviceStatus::Down
        } else {
            DeviceStatus::Up
        })
    }
}

/// Adapts a plain synchronous predicate into a [`HealthProbe`].
pub struct FnProbe<F>(pub F);

#[async_trait]
impl<F> HealthProbe for FnProbe<F>
where
    F: Fn(&Device) -> DeviceStatus + Send + Sync,
{
    async fn evaluate(&self, device: &Device) -> Result<DeviceStatus, PipelineError> {
        Ok((self.0)(device))
    }
}
