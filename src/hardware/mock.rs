//! Mock hardware for tests and downstream development.
//!
//! All mocks use async-safe sleeps (`tokio::time::sleep`, never
//! `std::thread::sleep`) and add a little random jitter to motion timing so
//! callers cannot accidentally depend on exact durations.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;

use crate::axis::{AxisState, StateMonitor};
use crate::device::{ParameterSet, Parameterizable};
use crate::error::DeviceResult;
use crate::hardware::{Positionable, VelocityCapable};
use crate::parameter::Parameter;
use crate::unit::UnitValue;

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
    base + Duration::from_millis(jitter_ms)
}

fn locked<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockAxis - Simulated positioning axis
// =============================================================================

/// Simulated axis with hard position limits.
///
/// Motion beyond a limit clamps the stored position at the limit and
/// publishes [`AxisState::PositionLimit`]; motion within range publishes
/// [`AxisState::Standby`]. Default limits are ±100 steps.
pub struct MockAxis {
    position: StdMutex<f64>,
    hard_limits: (f64, f64),
    motion_delay: Duration,
}

impl MockAxis {
    /// Axis at 0 steps with limits ±100 and a short motion delay.
    pub fn new() -> Self {
        Self::with_limits(-100.0, 100.0)
    }

    /// Axis at 0 steps with the given hard limits.
    pub fn with_limits(lower: f64, upper: f64) -> Self {
        Self {
            position: StdMutex::new(0.0),
            hard_limits: (lower, upper),
            motion_delay: Duration::from_millis(10),
        }
    }

    /// Override the simulated motion delay.
    pub fn with_motion_delay(mut self, delay: Duration) -> Self {
        self.motion_delay = delay;
        self
    }
}

impl Default for MockAxis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Positionable for MockAxis {
    async fn position_steps(&self) -> DeviceResult<f64> {
        Ok(*locked(&self.position))
    }

    async fn move_to_steps(&self, steps: f64, monitor: &StateMonitor) -> DeviceResult<()> {
        monitor.publish(AxisState::Moving);
        let delay = jittered(self.motion_delay);
        sleep(delay).await;

        let (lower, upper) = self.hard_limits;
        if steps < lower {
            *locked(&self.position) = lower;
            monitor.publish(AxisState::PositionLimit);
        } else if steps > upper {
            *locked(&self.position) = upper;
            monitor.publish(AxisState::PositionLimit);
        } else {
            *locked(&self.position) = steps;
            monitor.publish(AxisState::Standby);
        }
        Ok(())
    }

    async fn halt(&self, monitor: &StateMonitor) -> DeviceResult<()> {
        sleep(self.motion_delay).await;
        monitor.publish(AxisState::Standby);
        Ok(())
    }

    fn in_position_limit(&self) -> bool {
        let position = *locked(&self.position);
        position <= self.hard_limits.0 || position >= self.hard_limits.1
    }
}

// =============================================================================
// MockContinuousAxis - Simulated axis with velocity control
// =============================================================================

/// Simulated continuous axis: position limits ±10, velocity limits ±100.
pub struct MockContinuousAxis {
    position: StdMutex<f64>,
    velocity: StdMutex<f64>,
    position_limits: (f64, f64),
    velocity_limits: (f64, f64),
    motion_delay: Duration,
}

impl MockContinuousAxis {
    /// Axis at rest at 0 steps.
    pub fn new() -> Self {
        Self {
            position: StdMutex::new(0.0),
            velocity: StdMutex::new(0.0),
            position_limits: (-10.0, 10.0),
            velocity_limits: (-100.0, 100.0),
            motion_delay: Duration::from_millis(10),
        }
    }
}

impl Default for MockContinuousAxis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Positionable for MockContinuousAxis {
    async fn position_steps(&self) -> DeviceResult<f64> {
        Ok(*locked(&self.position))
    }

    async fn move_to_steps(&self, steps: f64, monitor: &StateMonitor) -> DeviceResult<()> {
        monitor.publish(AxisState::Moving);
        let delay = jittered(self.motion_delay);
        sleep(delay).await;

        let (lower, upper) = self.position_limits;
        let clamped = steps.clamp(lower, upper);
        *locked(&self.position) = clamped;
        if clamped == steps {
            monitor.publish(AxisState::Standby);
        } else {
            monitor.publish(AxisState::PositionLimit);
        }
        Ok(())
    }

    async fn halt(&self, monitor: &StateMonitor) -> DeviceResult<()> {
        sleep(self.motion_delay).await;
        *locked(&self.velocity) = 0.0;
        monitor.publish(AxisState::Standby);
        Ok(())
    }

    fn in_position_limit(&self) -> bool {
        let position = *locked(&self.position);
        position <= self.position_limits.0 || position >= self.position_limits.1
    }
}

#[async_trait]
impl VelocityCapable for MockContinuousAxis {
    async fn velocity_steps(&self) -> DeviceResult<f64> {
        Ok(*locked(&self.velocity))
    }

    async fn set_velocity_steps(&self, steps: f64, monitor: &StateMonitor) -> DeviceResult<()> {
        monitor.publish(AxisState::Moving);
        let delay = jittered(self.motion_delay);
        sleep(delay).await;

        let (lower, upper) = self.velocity_limits;
        let clamped = steps.clamp(lower, upper);
        *locked(&self.velocity) = clamped;
        if clamped == steps {
            monitor.publish(AxisState::Standby);
        } else {
            monitor.publish(AxisState::VelocityLimit);
        }
        Ok(())
    }

    fn in_velocity_limit(&self) -> bool {
        let velocity = *locked(&self.velocity);
        velocity <= self.velocity_limits.0 || velocity >= self.velocity_limits.1
    }
}

// =============================================================================
// MockValueDevice - One readable/writable scalar parameter
// =============================================================================

/// Device exposing a single `value` parameter backed by in-memory state.
pub struct MockValueDevice {
    params: ParameterSet,
    value: Arc<StdMutex<f64>>,
}

impl MockValueDevice {
    /// Device with `value` initialized to 0.
    pub fn new() -> DeviceResult<Self> {
        let value = Arc::new(StdMutex::new(0.0));

        let getter_value = value.clone();
        let setter_value = value.clone();
        let parameter = Parameter::builder("value")
            .getter(move || {
                let value = getter_value.clone();
                Box::pin(async move { Ok(UnitValue::bare(*locked(&value))) })
            })
            .setter(move |new: UnitValue| {
                let value = setter_value.clone();
                Box::pin(async move {
                    sleep(jittered(Duration::from_millis(2))).await;
                    *locked(&value) = new.magnitude;
                    Ok(())
                })
            })
            .build()?;

        let mut params = ParameterSet::new();
        params.register(parameter)?;
        Ok(Self { params, value })
    }

    /// Direct view of the stored value, bypassing the parameter.
    pub fn raw_value(&self) -> f64 {
        *locked(&self.value)
    }
}

impl Parameterizable for MockValueDevice {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_axis_clamps_at_limits() {
        let axis = MockAxis::new();
        let monitor = StateMonitor::new();

        axis.move_to_steps(150.0, &monitor).await.unwrap();
        assert_eq!(axis.position_steps().await.unwrap(), 100.0);
        assert_eq!(monitor.current(), AxisState::PositionLimit);
        assert!(axis.in_position_limit());
    }

    #[tokio::test]
    async fn test_mock_axis_within_range() {
        let axis = MockAxis::new();
        let monitor = StateMonitor::new();

        axis.move_to_steps(50.0, &monitor).await.unwrap();
        assert_eq!(axis.position_steps().await.unwrap(), 50.0);
        assert_eq!(monitor.current(), AxisState::Standby);
        assert!(!axis.in_position_limit());
    }

    #[tokio::test]
    async fn test_mock_continuous_axis_velocity_limit() {
        let axis = MockContinuousAxis::new();
        let monitor = StateMonitor::new();

        axis.set_velocity_steps(200.0, &monitor).await.unwrap();
        assert_eq!(axis.velocity_steps().await.unwrap(), 100.0);
        assert_eq!(monitor.current(), AxisState::VelocityLimit);

        axis.halt(&monitor).await.unwrap();
        assert_eq!(axis.velocity_steps().await.unwrap(), 0.0);
        assert_eq!(monitor.current(), AxisState::Standby);
    }
}
