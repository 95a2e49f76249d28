//! A scalar magnitude with an optional unit tag.
//!
//! The framework does not implement physical-unit arithmetic. A unit is an
//! opaque, equality-checkable string supplied by the caller; conversion
//! between user units and device steps is the job of a
//! [`Calibration`](crate::calibration::Calibration) collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value as read from or written to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitValue {
    /// Numeric magnitude.
    pub magnitude: f64,
    /// Opaque unit tag, compared by equality against a parameter's unit.
    pub unit: Option<String>,
}

impl UnitValue {
    /// A value tagged with a unit, e.g. `UnitValue::new(2.5, "mm")`.
    pub fn new(magnitude: f64, unit: impl Into<String>) -> Self {
        Self {
            magnitude,
            unit: Some(unit.into()),
        }
    }

    /// An untagged value.
    pub fn bare(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: None,
        }
    }

    /// The unit tag, if any.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

impl From<f64> for UnitValue {
    fn from(magnitude: f64) -> Self {
        UnitValue::bare(magnitude)
    }
}

impl fmt::Display for UnitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} {}", self.magnitude, unit),
            None => write!(f, "{}", self.magnitude),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(UnitValue::new(2.5, "mm").to_string(), "2.5 mm");
        assert_eq!(UnitValue::bare(7.0).to_string(), "7");
    }

    #[test]
    fn test_unit_equality() {
        assert_eq!(UnitValue::new(1.0, "mm"), UnitValue::new(1.0, "mm"));
        assert_ne!(UnitValue::new(1.0, "mm"), UnitValue::new(1.0, "s"));
        assert_ne!(UnitValue::new(1.0, "mm"), UnitValue::bare(1.0));
    }
}
