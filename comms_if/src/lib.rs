//! # Communications interface crate.
//!
//! Provides all common communications interfaces between the wall following executable and the
//! equipment and services it depends on.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message definitions for equipment (range sensor and drive base)
pub mod eqpt;

/// Request/response service definitions
pub mod srv;

/// Goal/feedback/result action definitions
pub mod action;

/// Network module
pub mod net;
