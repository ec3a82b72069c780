//! # Drive base commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Velocity demand sent to the differential drive base.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
pub struct VelocityCmd {
    /// Forward speed in meters/second.
    pub linear_ms: f64,

    /// Turn rate in radians/second.
    ///
    /// Follows the right hand rule about the robot's Z+ (upwards) axis, so that a positive rate
    /// turns the robot to the left.
    pub angular_rads: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VelocityCmd {
    /// A command which stops the robot.
    pub fn zero() -> Self {
        Self::default()
    }

    /// True if the command demands no motion.
    pub fn is_zero(&self) -> bool {
        self.linear_ms == 0.0 && self.angular_rads == 0.0
    }
}
