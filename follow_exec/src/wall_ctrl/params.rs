//! Wall control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for wall control
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Desired lateral distance between the robot and the wall on its right.
    pub standoff_target_m: f64,

    /// Forward distance at or below which the robot stops and turns away from
    /// the obstacle ahead.
    pub clearance_threshold_m: f64,

    /// Lower bound of the error band in which the PD law is used. Errors at or
    /// below this are within tolerance.
    pub deadband_min_m: f64,

    /// Upper bound of the error band in which the PD law is used. Errors at or
    /// above this saturate the turn rate.
    pub deadband_max_m: f64,

    /// Proportional gain
    pub k_p: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Limit on the magnitude of the turn rate demand.
    pub angular_speed_limit_rads: f64,

    /// Forward speed used whenever the way ahead is clear.
    pub cruise_speed_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            standoff_target_m: 0.25,
            clearance_threshold_m: 0.3,
            deadband_min_m: 0.05,
            deadband_max_m: 0.07,
            k_p: -3.0,
            k_d: -5.0,
            angular_speed_limit_rads: 0.3,
            cruise_speed_ms: 0.05,
        }
    }
}

impl Params {
    /// Check the parameters describe a usable controller.
    pub fn validate(&self) -> Result<(), super::WallCtrlError> {
        if !(self.angular_speed_limit_rads > 0.0) {
            return Err(super::WallCtrlError::InvalidParams(format!(
                "angular_speed_limit_rads must be positive, found {}",
                self.angular_speed_limit_rads
            )));
        }

        if !(self.deadband_min_m <= self.deadband_max_m) {
            return Err(super::WallCtrlError::InvalidParams(format!(
                "deadband_min_m ({}) must not exceed deadband_max_m ({})",
                self.deadband_min_m, self.deadband_max_m
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_param_file_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../params/wall_ctrl.toml");
        let params: Params = util::params::load_from_path(path).unwrap();

        assert_eq!(params, Params::default());
        assert!(params.validate().is_ok());
    }
}
