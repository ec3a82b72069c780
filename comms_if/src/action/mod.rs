//! # Action Interface
//!
//! Long running goal/feedback/result interactions with collaborators.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod odom_record;
