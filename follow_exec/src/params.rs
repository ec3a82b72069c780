//! # Wall follow executable parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::NetParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scan_client::ScanIndices;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FollowExecParams {
    /// Collaborator endpoints
    pub net: NetParams,

    /// Sweep index of the range directly to the right
    pub scan_right_index: usize,

    /// Sweep index of the range directly ahead
    pub scan_front_index: usize,

    /// Period of the control tick
    pub tick_period_s: f64,

    /// Time between two attempts to reach a collaborator
    pub reconnect_interval_s: f64,

    /// Number of worker threads, if not set one per hardware thread is used
    #[serde(default)]
    pub num_workers: Option<usize>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FollowExecParams {
    pub fn scan_indices(&self) -> ScanIndices {
        ScanIndices {
            right: self.scan_right_index,
            front: self.scan_front_index,
        }
    }

    /// Tick period, `None` if the configured value is not a positive number of seconds.
    pub fn tick_period(&self) -> Option<Duration> {
        positive_duration(self.tick_period_s)
    }

    /// Reconnect interval, `None` if the configured value is not a positive number of seconds.
    pub fn reconnect_interval(&self) -> Option<Duration> {
        positive_duration(self.reconnect_interval_s)
    }
}

fn positive_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 && secs.is_finite() {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PARAMS_TOML: &str = r#"
        scan_right_index = 90
        scan_front_index = 180
        tick_period_s = 0.1
        reconnect_interval_s = 1.0

        [net]
        scan_endpoint = "tcp://localhost:5013"
        cmd_vel_endpoint = "tcp://*:5014"
        find_wall_endpoint = "tcp://localhost:5010"
        odom_goal_endpoint = "tcp://localhost:5011"
        odom_event_endpoint = "tcp://localhost:5012"
    "#;

    #[test]
    fn test_deserialise() {
        let params: FollowExecParams = toml::from_str(PARAMS_TOML).unwrap();

        assert_eq!(params.scan_indices().right, 90);
        assert_eq!(params.scan_indices().front, 180);
        assert_eq!(params.tick_period(), Some(Duration::from_millis(100)));
        assert_eq!(params.reconnect_interval(), Some(Duration::from_secs(1)));
        assert_eq!(params.num_workers, None);
        assert_eq!(params.net.find_wall_endpoint, "tcp://localhost:5010");
    }

    #[test]
    fn test_param_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../params/follow_exec.toml");
        let params: FollowExecParams = util::params::load_from_path(path).unwrap();

        assert_eq!(params.tick_period(), Some(Duration::from_millis(100)));
        assert_eq!(params.net.cmd_vel_endpoint, "tcp://*:5014");
    }

    #[test]
    fn test_invalid_periods() {
        let mut params: FollowExecParams = toml::from_str(PARAMS_TOML).unwrap();

        params.tick_period_s = 0.0;
        params.reconnect_interval_s = std::f64::NAN;

        assert!(params.tick_period().is_none());
        assert!(params.reconnect_interval().is_none());
    }
}
