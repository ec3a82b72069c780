//! # Service Interface
//!
//! One-shot request/response services offered by collaborators.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod find_wall;
