//! # Wall follow library.
//!
//! This library provides the control core of the wall following executable, so it can be tested
//! on its own and reused by other crates in the workspace.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Executable parameters
pub mod params;

/// Wall control module - turns the two range samples into a velocity command
pub mod wall_ctrl;

/// Latest range observation
pub mod range_cache;

/// Controller state, shared between all command producing triggers
pub mod controller;

/// Precondition gate - holds the controller inactive until a wall has been found
pub mod gate;

/// Odometry telemetry session
pub mod odom_session;

/// Control scheduler - periodic and sensor ticks
pub mod scheduler;

/// Worker pool running ticks and deferred handlers
pub mod worker_pool;

/// Reconnect policy for collaborators
pub mod retry;

/// Find wall client - requests the find wall service
pub mod find_wall_client;

/// Odometry record client - goal, feedback and result of the odometry recorder
pub mod odom_record_client;

/// Velocity command publisher - sends commands to the drive base
pub mod cmd_vel_publisher;

/// Scan client - receives sweeps from the range sensor
pub mod scan_client;
