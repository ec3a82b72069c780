//! # Find wall service
//!
//! The find wall service drives the robot up to the nearest wall and aligns it so that the wall is
//! on the robot's right hand side. The response is sent once the procedure is over.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Request to find the wall. Carries no payload.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct FindWallRequest;

/// Response from the find wall service.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct FindWallResponse {
    /// True if the wall was found and the robot is in position.
    pub wall_found: bool,
}
