//! Error types for the device-control framework.
//!
//! `DeviceError` is the single error type used throughout the crate. The
//! validation variants (`ReadAccess`, `WriteAccess`, `Unit`, `SoftLimit`)
//! are raised synchronously before any hardware dispatch; `HardLimit` is
//! raised from inside a dispatched task, immediately before the setter body
//! would run. Failures of the device I/O itself enter the taxonomy as
//! `Hardware` and propagate unmodified through the task handle.
//!
//! The type is `Clone` so that a finished task's outcome can be cached in
//! its handle and observed through both `wait()` and `result()`.

use thiserror::Error;

/// Convenience alias for results using the framework error type.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors produced by parameters, devices and the dispatch layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Parameter name rejected at construction time.
    #[error("invalid parameter name `{0}'")]
    InvalidName(String),

    /// The parameter has no getter registered.
    #[error("parameter `{0}' cannot be read")]
    ReadAccess(String),

    /// The parameter has no setter registered.
    #[error("parameter `{0}' cannot be written")]
    WriteAccess(String),

    /// The written value carries a unit tag different from the configured one.
    #[error("parameter `{parameter}' expects unit `{expected}', got `{actual}'")]
    Unit {
        /// Parameter name.
        parameter: String,
        /// Configured unit tag.
        expected: String,
        /// Unit tag of the rejected value ("none" when untagged).
        actual: String,
    },

    /// The written value falls outside the configured soft limits.
    #[error("value {value} violates soft limits of parameter `{parameter}'")]
    SoftLimit {
        /// Parameter name.
        parameter: String,
        /// Rejected magnitude.
        value: f64,
    },

    /// The hardware reported an active limit condition at dispatch time.
    #[error("parameter `{0}' is in hard limit")]
    HardLimit(String),

    /// No parameter with this name is registered on the device.
    #[error("no parameter named `{0}'")]
    NoSuchParameter(String),

    /// A parameter with this name is already registered on the device.
    #[error("duplicate parameter `{0}'")]
    DuplicateParameter(String),

    /// `restore()` was called with an empty stash.
    #[error("nothing stashed for parameter `{0}'")]
    StashUnderflow(String),

    /// Failure reported by the device I/O collaborator.
    #[error("hardware error: {0}")]
    Hardware(String),

    /// Dispatch attempted outside a running Tokio runtime.
    #[error("no async runtime available for dispatch")]
    NoRuntime,

    /// The worker task ended without delivering a result.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// One or more sub-operations of a device-wide operation failed.
    ///
    /// Carries every failing parameter by name; nothing is swallowed.
    #[error("{} parameter operation(s) failed", .0.len())]
    Partial(Vec<(String, DeviceError)>),
}

impl DeviceError {
    /// Per-parameter failures of an aggregate operation, if this is one.
    pub fn failures(&self) -> Option<&[(String, DeviceError)]> {
        match self {
            DeviceError::Partial(failures) => Some(failures),
            _ => None,
        }
    }
}
