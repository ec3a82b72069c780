//! # Range sample cache
//!
//! Holds the latest pair of range measurements used by wall control, the
//! distance to the wall on the right and the distance to whatever is ahead.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::eqpt::scan::LaserScan;
use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The two ranges of interest taken from one sweep.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct RangeObservation {
    /// Distance to the wall on the right
    pub lateral_m: f64,

    /// Distance to the nearest obstacle ahead
    pub forward_m: f64,

    /// Capture time of the sweep the ranges came from
    pub observed_at: DateTime<Utc>,
}

/// Latest observation, overwritten on every record.
#[derive(Debug, Default, Clone)]
pub struct RangeCache {
    latest: Option<RangeObservation>,

    num_records: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RangeObservation {
    /// Build an observation captured now.
    pub fn new(lateral_m: f64, forward_m: f64) -> Self {
        Self {
            lateral_m,
            forward_m,
            observed_at: Utc::now(),
        }
    }

    /// Pick the lateral and forward ranges out of a sweep.
    ///
    /// Returns `None` if either index is outside of the sweep.
    pub fn from_scan(scan: &LaserScan, right_index: usize, front_index: usize) -> Option<Self> {
        Some(Self {
            lateral_m: scan.range_at(right_index)?,
            forward_m: scan.range_at(front_index)?,
            observed_at: scan.timestamp,
        })
    }
}

impl RangeCache {
    /// Record a new observation, replacing the previous one.
    pub fn record(&mut self, observation: RangeObservation) {
        self.latest = Some(observation);
        self.num_records += 1;
    }

    /// The most recent observation, `None` until the first one is recorded.
    pub fn latest(&self) -> Option<RangeObservation> {
        self.latest
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_overwrites() {
        let mut cache = RangeCache::default();
        assert!(cache.latest().is_none());

        cache.record(RangeObservation::new(0.3, 1.0));
        let second = RangeObservation::new(0.2, 0.5);
        cache.record(second);

        assert_eq!(cache.latest(), Some(second));
        assert_eq!(cache.num_records(), 2);
    }

    #[test]
    fn test_from_scan() {
        let mut ranges = vec![3.5; 360];
        ranges[90] = 0.27;
        ranges[180] = 0.8;
        let scan = LaserScan {
            ranges,
            timestamp: Utc::now(),
        };

        let obs = RangeObservation::from_scan(&scan, 90, 180).unwrap();
        assert_eq!(obs.lateral_m, 0.27);
        assert_eq!(obs.forward_m, 0.8);
        assert_eq!(obs.observed_at, scan.timestamp);

        assert!(RangeObservation::from_scan(&scan, 90, 400).is_none());
    }
}
