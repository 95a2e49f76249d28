//! Capability traits for device I/O collaborators.
//!
//! These traits are the boundary to vendor-specific controllers: the core
//! only needs a blocking getter/setter pair per quantity, safe to call from
//! a worker task and free to block arbitrarily long (motion completion
//! polling, serial round-trips).
//!
//! Implementations drive the axis state machine themselves: `move_to_steps`
//! publishes [`AxisState::Moving`](crate::axis::AxisState) on entry and
//! `Standby` or `PositionLimit` on completion, with the stored value clamped
//! at a hardware limit rather than the requested one.

use async_trait::async_trait;

use crate::axis::StateMonitor;
use crate::error::DeviceResult;

pub mod mock;

/// Hardware that can report and drive a position, in device steps.
#[async_trait]
pub trait Positionable: Send + Sync {
    /// Current position in steps.
    async fn position_steps(&self) -> DeviceResult<f64>;

    /// Drive to `steps`, blocking until motion settles.
    ///
    /// Publishes `Moving` on entry and `Standby` or `PositionLimit` on
    /// completion through `monitor`.
    async fn move_to_steps(&self, steps: f64, monitor: &StateMonitor) -> DeviceResult<()>;

    /// Stop the motion, blocking until the axis is physically stopped.
    ///
    /// Publishes `Standby` on completion; must be idempotent.
    async fn halt(&self, monitor: &StateMonitor) -> DeviceResult<()>;

    /// Whether the hardware currently reports a position limit.
    fn in_position_limit(&self) -> bool;
}

/// Hardware that can additionally hold a velocity, in device steps.
#[async_trait]
pub trait VelocityCapable: Send + Sync {
    /// Current velocity in steps per second.
    async fn velocity_steps(&self) -> DeviceResult<f64>;

    /// Settle at velocity `steps`, blocking until reached.
    ///
    /// Publishes `Moving` on entry and `Standby` or `VelocityLimit` on
    /// completion through `monitor`.
    async fn set_velocity_steps(&self, steps: f64, monitor: &StateMonitor) -> DeviceResult<()>;

    /// Whether the hardware currently reports a velocity limit.
    fn in_velocity_limit(&self) -> bool;
}
