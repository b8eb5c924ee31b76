//! Stepper configuration.
//!
//! ```yaml
//! trace_points_per_step: 10   # sub-steps between two clip steps
//! iterations_per_step: 100    # RK4 iterations per sub-step (dynamic models)
//! x_limit: 8000.0             # off-screen envelope in image units
//! y_limit: 6000.0
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

pub const DEFAULT_TRACE_POINTS_PER_STEP: usize = 10;
pub const DEFAULT_ITERATIONS_PER_STEP: usize = 100;
pub const DEFAULT_X_LIMIT: f64 = 8000.0;
pub const DEFAULT_Y_LIMIT: f64 = 6000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperConfig {
    pub trace_points_per_step: usize,
    pub iterations_per_step: usize,
    pub x_limit: f64,
    pub y_limit: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            trace_points_per_step: DEFAULT_TRACE_POINTS_PER_STEP,
            iterations_per_step: DEFAULT_ITERATIONS_PER_STEP,
            x_limit: DEFAULT_X_LIMIT,
            y_limit: DEFAULT_Y_LIMIT,
        }
    }
}

impl StepperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trace_points_per_step == 0 {
            return Err(ModelError::config("trace_points_per_step must be at least 1"));
        }
        if self.iterations_per_step == 0 {
            return Err(ModelError::config("iterations_per_step must be at least 1"));
        }
        if !(self.x_limit > 0.0 && self.y_limit > 0.0) {
            return Err(ModelError::config(format!(
                "off-screen limits must be positive, got ({}, {})",
                self.x_limit, self.y_limit
            )));
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: StepperConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: StepperConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// True when an image-space sample lies inside the drawable envelope.
    /// `NaN` coordinates are never inside.
    pub fn in_bounds(&self, x: f64, y: f64) -> bool {
        x.abs() < self.x_limit && y.abs() < self.y_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = StepperConfig::from_yaml_str("iterations_per_step: 20\n").unwrap();
        assert_eq!(cfg.iterations_per_step, 20);
        assert_eq!(cfg.trace_points_per_step, DEFAULT_TRACE_POINTS_PER_STEP);
        assert_eq!(cfg.x_limit, DEFAULT_X_LIMIT);
    }

    #[test]
    fn zero_sub_steps_are_rejected() {
        let err = StepperConfig::from_yaml_str("trace_points_per_step: 0\n").unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn nan_is_out_of_bounds() {
        let cfg = StepperConfig::default();
        assert!(cfg.in_bounds(10.0, -10.0));
        assert!(!cfg.in_bounds(f64::NAN, 0.0));
        assert!(!cfg.in_bounds(0.0, 6000.0));
    }
}
