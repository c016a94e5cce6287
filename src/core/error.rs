use thiserror::Error;

/// Construction-time configuration failures.
///
/// Every variant names the offending field. None of these are raised while a
/// reservoir is running; per-cycle computation has no error path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{field} = {value} is too small (minimum {min})")]
    InvalidCount {
        field: &'static str,
        value: usize,
        min: usize,
    },

    #[error("{predictor} window {window} exceeds the maximum of {max}")]
    WindowTooLarge {
        predictor: &'static str,
        window: usize,
        max: usize,
    },

    #[error("{field} requests {requested} connections but only {available} slots are free")]
    TooManyConnections {
        field: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("{expected} neuron parameters supplied for a {found} activation")]
    ActivationMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{field} has length {found}, expected {expected}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

pub type Result<T, E = ConfigError> = core::result::Result<T, E>;

/// Checks `min <= value <= max` (and finiteness).
pub(crate) fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

/// Checks `min <= value < 1`.
pub(crate) fn check_below_one(
    field: &'static str,
    value: f64,
    min: f64,
    expected: &'static str,
) -> Result<()> {
    if value.is_finite() && value >= min && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

/// Checks a density (fraction of available slots) lies in [0, 1].
pub(crate) fn check_density(field: &'static str, value: f64) -> Result<()> {
    check_range(field, value, 0.0, 1.0, "[0, 1]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_checks_bounds_and_nan() {
        assert!(check_density("d", 0.0).is_ok());
        assert!(check_density("d", 1.0).is_ok());
        assert!(check_density("d", -0.01).is_err());
        assert!(check_density("d", f64::NAN).is_err());
    }

    #[test]
    fn half_open_check_excludes_only_one() {
        assert!(check_below_one("r", 0.0, 0.0, "[0, 1)").is_ok());
        assert!(check_below_one("r", 0.999_999_5, 0.0, "[0, 1)").is_ok());
        assert!(check_below_one("r", 1.0, 0.0, "[0, 1)").is_err());
        assert!(check_below_one("r", 0.2, 0.3, "[min, 1)").is_err());
        assert!(check_below_one("r", f64::NAN, 0.0, "[0, 1)").is_err());
    }

    #[test]
    fn error_message_names_the_field() {
        let err = check_density("topology.density", 1.5).unwrap_err();
        assert!(err.to_string().contains("topology.density"));
    }
}
