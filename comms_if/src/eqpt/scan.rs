//! # Range sensor sweep

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single planar sweep of the range sensor.
///
/// Ranges are ordered by bearing, index 0 being directly behind the sensor and increasing
/// anticlockwise, so that with one sample per degree index 90 points to the right and index 180
/// points straight ahead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LaserScan {
    /// Measured ranges in meters.
    pub ranges: Vec<f64>,

    /// Time at which the sweep was captured.
    pub timestamp: DateTime<Utc>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LaserScan {
    /// Get the range at the given index, or `None` if the sweep is too short.
    pub fn range_at(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_range_at() {
        let mut ranges = vec![1.0; 360];
        ranges[90] = 0.25;
        ranges[180] = 2.0;

        let scan = LaserScan {
            ranges,
            timestamp: Utc::now(),
        };

        assert_eq!(scan.range_at(90), Some(0.25));
        assert_eq!(scan.range_at(180), Some(2.0));
        assert_eq!(scan.range_at(360), None);
    }
}
