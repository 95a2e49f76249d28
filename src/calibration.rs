//! Conversion between user units and device-native steps.

/// Pure, stateless mapping between user-unit values and step counts.
///
/// Called synchronously inside a parameter's getter/setter wrappers; must
/// have no side effects.
pub trait Calibration: Send + Sync {
    /// Steps to user units.
    fn to_user(&self, steps: f64) -> f64;
    /// User units to steps.
    fn to_steps(&self, value: f64) -> f64;
}

/// Linear calibration: `steps = (value + offset) * steps_per_unit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    steps_per_unit: f64,
    offset: f64,
}

impl LinearCalibration {
    /// *steps_per_unit* steps per user unit, zero point *offset* user units
    /// away from the device's zero.
    pub fn new(steps_per_unit: f64, offset: f64) -> Self {
        Self {
            steps_per_unit,
            offset,
        }
    }

    /// One step per unit, no offset.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Calibration for LinearCalibration {
    fn to_user(&self, steps: f64) -> f64 {
        steps / self.steps_per_unit - self.offset
    }

    fn to_steps(&self, value: f64) -> f64 {
        (value + self.offset) * self.steps_per_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_round_trip() {
        let calibration = LinearCalibration::new(2.0, 3.0);
        for steps in [-250.0, -1.0, 0.0, 0.5, 17.0, 1e6] {
            let round_tripped = calibration.to_steps(calibration.to_user(steps));
            assert!((round_tripped - steps).abs() < 1e-9);
        }
    }

    #[test]
    fn test_linear_mapping() {
        let calibration = LinearCalibration::new(2.0, 3.0);
        assert_eq!(calibration.to_steps(7.0), 20.0);
        assert_eq!(calibration.to_user(20.0), 7.0);
    }

    #[test]
    fn test_identity() {
        let calibration = LinearCalibration::identity();
        assert_eq!(calibration.to_user(42.0), 42.0);
        assert_eq!(calibration.to_steps(42.0), 42.0);
    }
}
