//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the equipment, i.e. the
//! planar range sensor and the drive base.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod drive;
pub mod scan;
