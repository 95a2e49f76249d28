//! Device-control framework for laboratory instrumentation.
//!
//! Physical device quantities (position, velocity, arbitrary scalar
//! settings) are exposed as named, unit- and limit-checked
//! [`Parameter`]s that are read and written asynchronously with at most one
//! in-flight mutation per parameter. A thin state-machine layer
//! ([`Axis`], [`ContinuousAxis`]) turns raw parameter writes into
//! observable device states.
//!
//! Vendor wire protocols live behind the capability traits in
//! [`hardware`]; unit conversion is pluggable through [`Calibration`].

pub mod axis;
pub mod calibration;
pub mod device;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod parameter;
pub mod unit;

pub use axis::{Axis, AxisConfig, AxisState, ContinuousAxis, ObserverId, StateMonitor};
pub use calibration::{Calibration, LinearCalibration};
pub use device::{ParameterSet, Parameterizable};
pub use error::{DeviceError, DeviceResult};
pub use executor::{Executor, TaskHandle};
pub use parameter::{Parameter, ParameterBuilder, ParameterDescriptor};
pub use unit::UnitValue;
