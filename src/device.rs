//! Devices as named collections of parameters.
//!
//! A [`ParameterSet`] is an insertion-ordered registry, filled during
//! device construction and never mutated afterwards. The [`Parameterizable`]
//! trait routes attribute-style access (`get`/`set` by name) through it and
//! provides device-wide stash/restore.

use async_trait::async_trait;

use crate::error::{DeviceError, DeviceResult};
use crate::executor::TaskHandle;
use crate::parameter::{Parameter, ParameterDescriptor};
use crate::unit::UnitValue;

/// Insertion-ordered collection of uniquely named parameters.
#[derive(Debug, Default)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter; fails on a duplicate name.
    pub fn register(&mut self, parameter: Parameter) -> DeviceResult<()> {
        if self.params.iter().any(|p| p.name() == parameter.name()) {
            return Err(DeviceError::DuplicateParameter(parameter.name().to_string()));
        }
        self.params.push(parameter);
        Ok(())
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> DeviceResult<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| DeviceError::NoSuchParameter(name.to_string()))
    }

    /// Whether a parameter with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name() == name)
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    /// Metadata snapshots in registration order.
    pub fn descriptors(&self) -> Vec<ParameterDescriptor> {
        self.params.iter().map(Parameter::descriptor).collect()
    }

    /// Route a read to the named parameter.
    pub fn read(&self, name: &str) -> DeviceResult<TaskHandle<UnitValue>> {
        self.parameter(name)?.get()
    }

    /// Route a write to the named parameter.
    pub fn write(&self, name: &str, value: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.parameter(name)?.set(value)
    }

    /// Stash every parameter in registration order.
    ///
    /// A failure on one parameter does not prevent attempting the rest; all
    /// failures are collected into [`DeviceError::Partial`].
    pub async fn stash_all(&self) -> DeviceResult<()> {
        self.for_each_collecting(Parameter::stash).await
    }

    /// Restore every parameter in registration order, collecting failures
    /// like [`ParameterSet::stash_all`].
    pub async fn restore_all(&self) -> DeviceResult<()> {
        self.for_each_collecting(Parameter::restore).await
    }

    async fn for_each_collecting<F>(&self, op: F) -> DeviceResult<()>
    where
        F: Fn(&Parameter) -> DeviceResult<TaskHandle<()>>,
    {
        let mut failures = Vec::new();
        for parameter in &self.params {
            let outcome = match op(parameter) {
                Ok(mut handle) => handle.wait().await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                failures.push((parameter.name().to_string(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DeviceError::Partial(failures))
        }
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A device exposing its quantities as parameters.
///
/// Implementors only supply [`Parameterizable::parameters`]; the accessors
/// are sugar over the set and carry no additional contract. Devices with a
/// fixed parameter vocabulary usually add strongly-typed wrappers on top
/// (see [`Axis::set_position`](crate::axis::Axis::set_position)).
#[async_trait]
pub trait Parameterizable: Send + Sync {
    /// The device's registered parameters.
    fn parameters(&self) -> &ParameterSet;

    /// Read the named parameter.
    fn get(&self, name: &str) -> DeviceResult<TaskHandle<UnitValue>> {
        self.parameters().read(name)
    }

    /// Write the named parameter.
    fn set(&self, name: &str, value: UnitValue) -> DeviceResult<TaskHandle<()>> {
        self.parameters().write(name, value)
    }

    /// Stash all parameters, reporting every sub-failure.
    async fn stash_all(&self) -> DeviceResult<()> {
        self.parameters().stash_all().await
    }

    /// Restore all parameters, reporting every sub-failure.
    async fn restore_all(&self) -> DeviceResult<()> {
        self.parameters().restore_all().await
    }
}
