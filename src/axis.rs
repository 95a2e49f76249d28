//! Movable devices and their state machine.
//!
//! An [`Axis`] layers observable states (`Standby`, `Moving`,
//! `PositionLimit`) on top of a `position` parameter; a [`ContinuousAxis`]
//! adds a `velocity` parameter and `VelocityLimit`. Transitions are driven
//! exclusively by the device's own blocking I/O completing inside the
//! setter body — the hardware implementation publishes through the
//! [`StateMonitor`] it is handed, not the framework.
//!
//! State publication is fire-and-forget: a `watch` channel for awaiting
//! subscribers plus an explicit per-device observer list. A misbehaving
//! observer never affects the publishing device.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::calibration::{Calibration, LinearCalibration};
use crate::device::{ParameterSet, Parameterizable};
use crate::error::DeviceResult;
use crate::executor::{Executor, TaskHandle};
use crate::hardware::{Positionable, VelocityCapable};
use crate::parameter::Parameter;
use crate::unit::UnitValue;

/// Observable device states. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisState {
    /// At rest; the initial state.
    Standby,
    /// A position or velocity write is in progress.
    Moving,
    /// Motion completed clamped at a hardware position limit.
    PositionLimit,
    /// Velocity settled clamped at a hardware velocity limit.
    VelocityLimit,
}

/// Handle returned by [`StateMonitor::add_observer`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(AxisState) + Send + Sync>;

/// Per-device state publisher.
///
/// Cloned into the hardware collaborator's move/stop bodies; `publish` is
/// synchronous and never blocks on listener behavior.
#[derive(Clone)]
pub struct StateMonitor {
    tx: Arc<watch::Sender<AxisState>>,
    observers: Arc<StdMutex<Vec<(ObserverId, Observer)>>>,
    next_id: Arc<AtomicU64>,
}

impl StateMonitor {
    /// Monitor starting in `Standby`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AxisState::Standby);
        Self {
            tx: Arc::new(tx),
            observers: Arc::new(StdMutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a new state to all subscribers and observers.
    ///
    /// Observer panics are caught and logged; they never propagate into the
    /// publishing device.
    pub fn publish(&self, state: AxisState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "axis state changed");
        }
        let snapshot: Vec<Observer> = {
            let observers = self.observers();
            observers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer(state))).is_err() {
                warn!(?state, "state observer panicked; detaching from it");
            }
        }
    }

    /// The state currently held.
    pub fn current(&self) -> AxisState {
        *self.tx.borrow()
    }

    /// Receiver that resolves whenever the state changes.
    pub fn subscribe(&self) -> watch::Receiver<AxisState> {
        self.tx.subscribe()
    }

    /// Attach an observer called on every publication.
    pub fn add_observer(&self, observer: impl Fn(AxisState) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers().push((id, Arc::new(observer)));
        id
    }

    /// Detach an observer; returns whether it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    fn observers(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Observer)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-quantity configuration for an axis parameter.
pub struct AxisConfig {
    /// User-unit to step conversion.
    pub calibration: Arc<dyn Calibration>,
    /// Unit tag written values must carry.
    pub unit: Option<String>,
    /// Inclusive soft bounds in user units.
    pub soft_limits: Option<(f64, f64)>,
}

impl AxisConfig {
    /// Identity calibration, given unit tag, no soft limits.
    pub fn with_unit(unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::default()
        }
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            calibration: Arc::new(LinearCalibration::identity()),
            unit: None,
            soft_limits: None,
        }
    }
}

/// A movable device with a `position` parameter.
pub struct Axis {
    params: ParameterSet,
    monitor: StateMonitor,
    hardware: Arc<dyn Positionable>,
}

impl Axis {
    /// Build an axis over a position-capable hardware collaborator.
    pub fn new(hardware: Arc<dyn Positionable>, config: AxisConfig) -> DeviceResult<Self> {
        let monitor = StateMonitor::new();
        let mut params = ParameterSet::new();
        params.register(position_parameter(&hardware, &monitor, &config)?)?;
        Ok(Self {
            params,
            monitor,
            hardware,
        })
    }

    /// Write the position in user units.
    pub fn set_position(&self, position: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.params.write("position", position)
    }

    /// Read the position in user units.
    pub fn get_position(&self) -> DeviceResult<TaskHandle<UnitValue>> {
        self.params.read("position")
    }

    /// Move by `delta` user units relative to the current position.
    ///
    /// Sugar for a read followed by a derived write. The two operations are
    /// locked separately, so a concurrent position write from another
    /// caller may interleave between them; this race is part of the
    /// contract and deliberately not serialized away.
    pub async fn move_by(&self, delta: f64) -> DeviceResult<TaskHandle<()>> {
        let current = self.get_position()?.result().await?;
        self.set_position(UnitValue {
            magnitude: current.magnitude + delta,
            unit: current.unit,
        })
    }

    /// Stop the physical motion.
    ///
    /// Dispatched without the position parameter's lock so it can run
    /// alongside an in-flight move instead of queuing behind it. The
    /// hardware's stop is blocking and publishes `Standby` on completion;
    /// stopping an already stopped axis is a no-op.
    pub fn stop(&self) -> DeviceResult<TaskHandle<()>> {
        let hardware = self.hardware.clone();
        let monitor = self.monitor.clone();
        Ok(Executor::try_current()?
            .spawn(async move { hardware.halt(&monitor).await }))
    }

    /// The state currently held.
    pub fn state(&self) -> AxisState {
        self.monitor.current()
    }

    /// Receiver that resolves on state changes.
    pub fn subscribe(&self) -> watch::Receiver<AxisState> {
        self.monitor.subscribe()
    }

    /// Attach a state observer.
    pub fn add_observer(&self, observer: impl Fn(AxisState) + Send + Sync + 'static) -> ObserverId {
        self.monitor.add_observer(observer)
    }

    /// Detach a state observer.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.monitor.remove_observer(id)
    }

    /// The axis's state publisher.
    pub fn monitor(&self) -> &StateMonitor {
        &self.monitor
    }
}

impl Parameterizable for Axis {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

/// A movable device that can also hold a velocity.
///
/// Composes an [`Axis`] rather than inheriting from it: the position state
/// machine is written once and reused, the `velocity` parameter is wired
/// against [`VelocityCapable`] into the same parameter set and monitor.
pub struct ContinuousAxis {
    axis: Axis,
}

impl ContinuousAxis {
    /// Build over hardware that is both position- and velocity-capable.
    pub fn new<H>(hardware: Arc<H>, position: AxisConfig, velocity: AxisConfig) -> DeviceResult<Self>
    where
        H: Positionable + VelocityCapable + 'static,
    {
        let velocity_hw: Arc<dyn VelocityCapable> = hardware.clone();
        let mut axis = Axis::new(hardware, position)?;
        axis.params
            .register(velocity_parameter(&velocity_hw, &axis.monitor, &velocity)?)?;
        Ok(Self { axis })
    }

    /// Write the velocity in user units.
    pub fn set_velocity(&self, velocity: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.axis.params.write("velocity", velocity)
    }

    /// Read the velocity in user units.
    pub fn get_velocity(&self) -> DeviceResult<TaskHandle<UnitValue>> {
        self.axis.params.read("velocity")
    }

    /// The underlying positional axis.
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Write the position in user units.
    pub fn set_position(&self, position: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.axis.set_position(position)
    }

    /// Read the position in user units.
    pub fn get_position(&self) -> DeviceResult<TaskHandle<UnitValue>> {
        self.axis.get_position()
    }

    /// Move by `delta` user units; see [`Axis::move_by`] for the race note.
    pub async fn move_by(&self, delta: f64) -> DeviceResult<TaskHandle<()>> {
        self.axis.move_by(delta).await
    }

    /// Stop the physical motion; see [`Axis::stop`].
    pub fn stop(&self) -> DeviceResult<TaskHandle<()>> {
        self.axis.stop()
    }

    /// The state currently held.
    pub fn state(&self) -> AxisState {
        self.axis.state()
    }

    /// Receiver that resolves on state changes.
    pub fn subscribe(&self) -> watch::Receiver<AxisState> {
        self.axis.subscribe()
    }

    /// Attach a state observer.
    pub fn add_observer(&self, observer: impl Fn(AxisState) + Send + Sync + 'static) -> ObserverId {
        self.axis.add_observer(observer)
    }
}

impl Parameterizable for ContinuousAxis {
    fn parameters(&self) -> &ParameterSet {
        &self.axis.params
    }
}

fn position_parameter(
    hardware: &Arc<dyn Positionable>,
    monitor: &StateMonitor,
    config: &AxisConfig,
) -> DeviceResult<Parameter> {
    let getter_hw = hardware.clone();
    let getter_calibration = config.calibration.clone();
    let getter_unit = config.unit.clone();

    let setter_hw = hardware.clone();
    let setter_calibration = config.calibration.clone();
    let setter_monitor = monitor.clone();

    let limit_hw = hardware.clone();

    let mut builder = Parameter::builder("position")
        .getter(move || {
            let hw = getter_hw.clone();
            let calibration = getter_calibration.clone();
            let unit = getter_unit.clone();
            Box::pin(async move {
                let steps = hw.position_steps().await?;
                Ok(UnitValue {
                    magnitude: calibration.to_user(steps),
                    unit,
                })
            })
        })
        .setter(move |value: UnitValue| {
            let hw = setter_hw.clone();
            let calibration = setter_calibration.clone();
            let monitor = setter_monitor.clone();
            Box::pin(async move {
                hw.move_to_steps(calibration.to_steps(value.magnitude), &monitor)
                    .await
            })
        })
        .hard_limit(move || limit_hw.in_position_limit());

    if let Some(unit) = &config.unit {
        builder = builder.unit(unit.clone());
    }
    if let Some((lower, upper)) = config.soft_limits {
        builder = builder.soft_limits(lower, upper);
    }
    builder.build()
}

fn velocity_parameter(
    hardware: &Arc<dyn VelocityCapable>,
    monitor: &StateMonitor,
    config: &AxisConfig,
) -> DeviceResult<Parameter> {
    let getter_hw = hardware.clone();
    let getter_calibration = config.calibration.clone();
    let getter_unit = config.unit.clone();

    let setter_hw = hardware.clone();
    let setter_calibration = config.calibration.clone();
    let setter_monitor = monitor.clone();

    let limit_hw = hardware.clone();

    let mut builder = Parameter::builder("velocity")
        .getter(move || {
            let hw = getter_hw.clone();
            let calibration = getter_calibration.clone();
            let unit = getter_unit.clone();
            Box::pin(async move {
                let steps = hw.velocity_steps().await?;
                Ok(UnitValue {
                    magnitude: calibration.to_user(steps),
                    unit,
                })
            })
        })
        .setter(move |value: UnitValue| {
            let hw = setter_hw.clone();
            let calibration = setter_calibration.clone();
            let monitor = setter_monitor.clone();
            Box::pin(async move {
                hw.set_velocity_steps(calibration.to_steps(value.magnitude), &monitor)
                    .await
            })
        })
        .hard_limit(move || limit_hw.in_velocity_limit());

    if let Some(unit) = &config.unit {
        builder = builder.unit(unit.clone());
    }
    if let Some((lower, upper)) = config.soft_limits {
        builder = builder.soft_limits(lower, upper);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_starts_in_standby() {
        let monitor = StateMonitor::new();
        assert_eq!(monitor.current(), AxisState::Standby);
    }

    #[test]
    fn test_observer_add_remove() {
        let monitor = StateMonitor::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = seen.clone();
        let id = monitor.add_observer(move |state| sink.lock().unwrap().push(state));

        monitor.publish(AxisState::Moving);
        assert!(monitor.remove_observer(id));
        monitor.publish(AxisState::Standby);

        assert_eq!(*seen.lock().unwrap(), vec![AxisState::Moving]);
        assert!(!monitor.remove_observer(id));
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let monitor = StateMonitor::new();
        monitor.add_observer(|_| panic!("listener bug"));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        monitor.add_observer(move |state| sink.lock().unwrap().push(state));

        monitor.publish(AxisState::Moving);

        // The healthy observer and the channel still saw the change.
        assert_eq!(*seen.lock().unwrap(), vec![AxisState::Moving]);
        assert_eq!(monitor.current(), AxisState::Moving);
    }
}
