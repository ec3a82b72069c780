//! # Wall control module
//!
//! Wall control keeps the robot at a fixed standoff from the wall on its right
//! hand side. It works on two range samples per cycle: the lateral distance
//! (directly right) and the forward distance (directly ahead).
//!
//! The lateral error is the lateral distance minus the standoff target, so a
//! positive error means the robot is too far from the wall. The turn rate
//! demand is chosen from the magnitude of the error:
//!
//! - At or below `deadband_min_m` the robot is within tolerance and drives
//!   straight.
//! - Strictly between `deadband_min_m` and `deadband_max_m` a PD law is used.
//! - At or above `deadband_max_m` the demand saturates at the turn rate limit,
//!   turning right (negative) for positive errors and left for the rest.
//!
//! All of this is overridden when the forward distance is at or below the
//! clearance threshold: the robot stops and turns left on the spot at the
//! limit rate. That branch does not compute a new error, the previous one is
//! carried over, so the first PD cycle after an emergency turn uses the error
//! from before it.
//!
//! The turn rate is always clamped to the limit.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::drive::VelocityCmd;
use serde::Serialize;

// Internal
pub use params::Params;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during WallCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum WallCtrlError {
    #[error("Could not load the parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Could not initialise the archive: {0}")]
    ArchiveInitError(String),

    #[error("The control period must be positive, found {0} s")]
    InvalidPeriod(f64),
}

/// Which part of the control law produced the demand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum CtrlBranch {
    /// Obstacle ahead, turning on the spot
    Emergency,

    /// Inside the PD band
    Pd,

    /// Error beyond the PD band, turn rate saturated
    Saturated,

    /// Within tolerance, driving straight
    Straight,
}

impl Default for CtrlBranch {
    fn default() -> Self {
        CtrlBranch::Straight
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of one evaluation of the control law.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MotionOutput {
    /// Velocity demand for the drive base
    pub cmd: VelocityCmd,

    /// Error to use as the previous error on the next evaluation
    pub error_m: f64,

    /// Branch of the law that was taken
    pub branch: CtrlBranch,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Evaluate the wall following control law.
///
/// This is a pure function, the only state carried between cycles is the
/// returned `error_m` which must be passed back in as `last_error_m`.
pub fn compute(
    lateral_m: f64,
    forward_m: f64,
    last_error_m: f64,
    period_s: f64,
    params: &Params,
) -> MotionOutput {
    let limit = params.angular_speed_limit_rads;

    if forward_m <= params.clearance_threshold_m {
        return MotionOutput {
            cmd: VelocityCmd {
                linear_ms: 0.0,
                angular_rads: clamp_rate(limit, limit),
            },
            error_m: last_error_m,
            branch: CtrlBranch::Emergency,
        };
    }

    let error_m = lateral_m - params.standoff_target_m;
    let abs_error_m = error_m.abs();

    let (angular_rads, branch) =
        if abs_error_m > params.deadband_min_m && abs_error_m < params.deadband_max_m {
            (
                params.k_p * error_m + params.k_d * (error_m - last_error_m) / period_s,
                CtrlBranch::Pd,
            )
        } else if abs_error_m >= params.deadband_max_m {
            let rate = if error_m > 0.0 { -limit } else { limit };
            (rate, CtrlBranch::Saturated)
        } else {
            (0.0, CtrlBranch::Straight)
        };

    MotionOutput {
        cmd: VelocityCmd {
            linear_ms: params.cruise_speed_ms,
            angular_rads: clamp_rate(angular_rads, limit),
        },
        error_m,
        branch,
    }
}

/// Clamp a turn rate into `[-limit, limit]`.
fn clamp_rate(rate: f64, limit: f64) -> f64 {
    rate.max(-limit).min(limit)
}
