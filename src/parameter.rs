//! Named, validated, asynchronously accessed device quantities.
//!
//! A [`Parameter`] owns one physical quantity: an optional getter and
//! setter (absence disables the capability), an optional unit tag, soft
//! limits, a hard-limit predicate, a LIFO value stash and the per-parameter
//! mutation lock.
//!
//! Validation is synchronous and side-effect-free: `set()` rejects write
//! access, unit and soft-limit violations before anything is dispatched, so
//! a caller can fail fast without ever touching hardware. The hard-limit
//! predicate is the exception — it reflects a hardware-reported condition
//! and is evaluated under the lock immediately before the setter body, which
//! is never entered when the predicate holds.
//!
//! # Example
//!
//! ```rust,ignore
//! let exposure = Parameter::builder("exposure")
//!     .getter(move || Box::pin(camera_read()))
//!     .setter(move |v| Box::pin(camera_write(v)))
//!     .unit("ms")
//!     .soft_limits(1.0, 10_000.0)
//!     .build()?;
//!
//! exposure.set(UnitValue::new(250.0, "ms"))?.wait().await?;
//! ```

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{DeviceError, DeviceResult};
use crate::executor::{Executor, TaskHandle};
use crate::unit::UnitValue;

/// Getter callback: reads the quantity from the device.
pub type Getter =
    Arc<dyn Fn() -> BoxFuture<'static, DeviceResult<UnitValue>> + Send + Sync>;

/// Setter callback: writes the quantity to the device; may block on motion
/// completion or a serial round-trip, which is why it runs off the caller's
/// thread.
pub type Setter =
    Arc<dyn Fn(UnitValue) -> BoxFuture<'static, DeviceResult<()>> + Send + Sync>;

/// Zero-argument predicate, true while the hardware reports a limit.
pub type HardLimit = Arc<dyn Fn() -> bool + Send + Sync>;

#[allow(clippy::expect_used)]
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static pattern compiles"));

struct Inner {
    name: String,
    getter: Option<Getter>,
    setter: Option<Setter>,
    unit: Option<String>,
    soft_lower: Option<f64>,
    soft_upper: Option<f64>,
    in_hard_limit: Option<HardLimit>,
    executor: Option<Executor>,
    /// One in-flight mutation per parameter; queued FIFO by arrival.
    lock: Arc<Mutex<()>>,
    /// LIFO stack of previously read values.
    stash: StdMutex<Vec<UnitValue>>,
}

impl Inner {
    fn stash_guard(&self) -> std::sync::MutexGuard<'_, Vec<UnitValue>> {
        self.stash.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_readable(&self) -> DeviceResult<()> {
        if self.getter.is_some() {
            Ok(())
        } else {
            Err(DeviceError::ReadAccess(self.name.clone()))
        }
    }

    fn check_writable(&self) -> DeviceResult<()> {
        if self.setter.is_some() {
            Ok(())
        } else {
            Err(DeviceError::WriteAccess(self.name.clone()))
        }
    }

    /// Unit and soft-limit checks; no side effects.
    fn validate(&self, value: &UnitValue) -> DeviceResult<()> {
        if let Some(expected) = &self.unit {
            if value.unit.as_deref() != Some(expected.as_str()) {
                return Err(DeviceError::Unit {
                    parameter: self.name.clone(),
                    expected: expected.clone(),
                    actual: value.unit.clone().unwrap_or_else(|| "none".to_string()),
                });
            }
        }
        let below = self.soft_lower.is_some_and(|lower| value.magnitude < lower);
        let above = self.soft_upper.is_some_and(|upper| value.magnitude > upper);
        if below || above {
            return Err(DeviceError::SoftLimit {
                parameter: self.name.clone(),
                value: value.magnitude,
            });
        }
        Ok(())
    }

    /// Runs inside the dispatched task, under the lock.
    async fn write_now(&self, value: UnitValue) -> DeviceResult<()> {
        if self.in_hard_limit.as_ref().is_some_and(|limit| limit()) {
            return Err(DeviceError::HardLimit(self.name.clone()));
        }
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| DeviceError::WriteAccess(self.name.clone()))?;
        setter(value).await
    }

    async fn read_now(&self) -> DeviceResult<UnitValue> {
        let getter = self
            .getter
            .as_ref()
            .ok_or_else(|| DeviceError::ReadAccess(self.name.clone()))?;
        getter().await
    }
}

/// A named device quantity with unit and limit protection.
///
/// Cheap to clone; clones share the same lock, stash and callbacks.
#[derive(Clone)]
pub struct Parameter {
    inner: Arc<Inner>,
}

impl Parameter {
    /// Start building a parameter with the given name.
    ///
    /// The name is checked against `[A-Za-z_][A-Za-z0-9_-]*` when
    /// [`ParameterBuilder::build`] runs.
    pub fn builder(name: impl Into<String>) -> ParameterBuilder {
        ParameterBuilder {
            name: name.into(),
            getter: None,
            setter: None,
            unit: None,
            soft_lower: None,
            soft_upper: None,
            in_hard_limit: None,
            executor: None,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configured unit tag, if any.
    pub fn unit(&self) -> Option<&str> {
        self.inner.unit.as_deref()
    }

    /// Whether a getter is registered. Pure query, no dispatch.
    pub fn is_readable(&self) -> bool {
        self.inner.getter.is_some()
    }

    /// Whether a setter is registered. Pure query, no dispatch.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Number of stashed values.
    pub fn stash_depth(&self) -> usize {
        self.inner.stash_guard().len()
    }

    /// Serializable metadata snapshot.
    pub fn descriptor(&self) -> ParameterDescriptor {
        ParameterDescriptor {
            name: self.inner.name.clone(),
            unit: self.inner.unit.clone(),
            soft_lower: self.inner.soft_lower,
            soft_upper: self.inner.soft_upper,
            readable: self.is_readable(),
            writable: self.is_writable(),
        }
    }

    /// Read the quantity through the getter.
    ///
    /// Fails synchronously with [`DeviceError::ReadAccess`] when no getter
    /// is registered; otherwise the getter runs on the worker pool under
    /// this parameter's lock.
    pub fn get(&self) -> DeviceResult<TaskHandle<UnitValue>> {
        self.inner.check_readable()?;
        let inner = self.inner.clone();
        trace!(parameter = %self.inner.name, "dispatching get");
        Ok(self
            .executor()?
            .submit(self.inner.lock.clone(), async move { inner.read_now().await }))
    }

    /// Write the quantity through the setter.
    ///
    /// Write access, unit and soft limits are checked synchronously before
    /// any dispatch; on failure the setter body is never entered and no
    /// side effect occurs. The hard-limit predicate is evaluated under the
    /// lock right before the setter body and surfaces through the handle.
    pub fn set(&self, value: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.inner.check_writable()?;
        self.inner.validate(&value)?;
        let inner = self.inner.clone();
        trace!(parameter = %self.inner.name, %value, "dispatching set");
        Ok(self.executor()?.submit(self.inner.lock.clone(), async move {
            inner.write_now(value).await
        }))
    }

    /// Read the current value and push it onto the stash.
    ///
    /// Runs under the parameter lock, so the pushed value cannot be
    /// interleaved with a concurrent `set`.
    pub fn stash(&self) -> DeviceResult<TaskHandle<()>> {
        self.inner.check_readable()?;
        let inner = self.inner.clone();
        Ok(self.executor()?.submit(self.inner.lock.clone(), async move {
            let value = inner.read_now().await?;
            inner.stash_guard().push(value);
            Ok(())
        }))
    }

    /// Pop the most recently stashed value and write it back.
    ///
    /// Fails synchronously with [`DeviceError::StashUnderflow`] when the
    /// stash is empty; the popped value passes through the same unit, soft
    /// and hard-limit checks as `set`.
    pub fn restore(&self) -> DeviceResult<TaskHandle<()>> {
        self.inner.check_writable()?;
        if self.inner.stash_guard().is_empty() {
            return Err(DeviceError::StashUnderflow(self.inner.name.clone()));
        }
        let inner = self.inner.clone();
        Ok(self.executor()?.submit(self.inner.lock.clone(), async move {
            let value = inner
                .stash_guard()
                .pop()
                .ok_or_else(|| DeviceError::StashUnderflow(inner.name.clone()))?;
            inner.validate(&value)?;
            inner.write_now(value).await
        }))
    }

    fn executor(&self) -> DeviceResult<Executor> {
        match &self.inner.executor {
            Some(executor) => Ok(executor.clone()),
            None => Executor::try_current(),
        }
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.inner.name)
            .field("unit", &self.inner.unit)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Fluent builder for [`Parameter`].
pub struct ParameterBuilder {
    name: String,
    getter: Option<Getter>,
    setter: Option<Setter>,
    unit: Option<String>,
    soft_lower: Option<f64>,
    soft_upper: Option<f64>,
    in_hard_limit: Option<HardLimit>,
    executor: Option<Executor>,
}

impl ParameterBuilder {
    /// Register the getter callback.
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, DeviceResult<UnitValue>> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    /// Register the setter callback.
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(UnitValue) -> BoxFuture<'static, DeviceResult<()>> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(f));
        self
    }

    /// Unit tag values must carry on writes.
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Inclusive soft bounds checked before dispatch.
    pub fn soft_limits(mut self, lower: f64, upper: f64) -> Self {
        self.soft_lower = Some(lower);
        self.soft_upper = Some(upper);
        self
    }

    /// Hardware limit predicate, checked at dispatch time.
    pub fn hard_limit<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.in_hard_limit = Some(Arc::new(f));
        self
    }

    /// Dispatch on an explicit executor instead of the caller's runtime.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validate the name and build the parameter.
    pub fn build(self) -> DeviceResult<Parameter> {
        if !NAME_PATTERN.is_match(&self.name) {
            return Err(DeviceError::InvalidName(self.name));
        }
        Ok(Parameter {
            inner: Arc::new(Inner {
                name: self.name,
                getter: self.getter,
                setter: self.setter,
                unit: self.unit,
                soft_lower: self.soft_lower,
                soft_upper: self.soft_upper,
                in_hard_limit: self.in_hard_limit,
                executor: self.executor,
                lock: Arc::new(Mutex::new(())),
                stash: StdMutex::new(Vec::new()),
            }),
        })
    }
}

/// Serializable parameter metadata for introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,
    /// Configured unit tag.
    pub unit: Option<String>,
    /// Lower soft bound.
    pub soft_lower: Option<f64>,
    /// Upper soft bound.
    pub soft_upper: Option<f64>,
    /// Whether a getter is registered.
    pub readable: bool,
    /// Whether a setter is registered.
    pub writable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_setter() -> impl Fn(UnitValue) -> BoxFuture<'static, DeviceResult<()>> {
        |_| Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_names() {
        assert!(matches!(
            Parameter::builder("1pm").build(),
            Err(DeviceError::InvalidName(_))
        ));
        assert!(Parameter::builder("current position").build().is_err());
        assert!(Parameter::builder("").build().is_err());

        assert!(Parameter::builder("this-is-correct").build().is_ok());
        assert!(Parameter::builder("this_too").build().is_ok());
    }

    #[test]
    fn test_capability_queries() {
        let read_only = Parameter::builder("foo")
            .getter(|| Box::pin(async { Ok(UnitValue::bare(0.0)) }))
            .build()
            .unwrap();
        assert!(read_only.is_readable());
        assert!(!read_only.is_writable());

        let write_only = Parameter::builder("bar")
            .setter(noop_setter())
            .build()
            .unwrap();
        assert!(!write_only.is_readable());
        assert!(write_only.is_writable());
    }

    #[tokio::test]
    async fn test_unit_mismatch_fails_before_dispatch() {
        let parameter = Parameter::builder("foo")
            .setter(noop_setter())
            .unit("mm")
            .build()
            .unwrap();

        parameter
            .set(UnitValue::new(2.0, "mm"))
            .unwrap()
            .wait()
            .await
            .unwrap();

        match parameter.set(UnitValue::new(2.0, "s")) {
            Err(DeviceError::Unit { actual, .. }) => assert_eq!(actual, "s"),
            other => panic!("expected unit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_descriptor() {
        let parameter = Parameter::builder("exposure")
            .setter(noop_setter())
            .unit("ms")
            .soft_limits(1.0, 10_000.0)
            .build()
            .unwrap();

        let descriptor = parameter.descriptor();
        assert_eq!(descriptor.name, "exposure");
        assert_eq!(descriptor.unit.as_deref(), Some("ms"));
        assert_eq!(descriptor.soft_lower, Some(1.0));
        assert!(!descriptor.readable);
        assert!(descriptor.writable);
    }
}
