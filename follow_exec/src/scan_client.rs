//! # Scan client
//!
//! Subscribes to the range sensor's sweeps. A background thread receives each sweep, picks out
//! the lateral and forward ranges and hands them to a callback, normally a
//! [`SensorTrigger`](crate::scheduler::SensorTrigger).
//!
//! Delivery is best effort. Sweeps missed while the sensor is not connected are simply lost.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::scan::LaserScan,
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::{error, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::range_cache::RangeObservation;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ScanClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
    num_scans: Arc<AtomicU64>,
}

/// Which ranges of a sweep are used.
#[derive(Debug, Copy, Clone)]
pub struct ScanIndices {
    /// Index of the range directly to the right
    pub right: usize,

    /// Index of the range directly ahead
    pub front: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ScanClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a message from the sensor: {0}")]
    RecvError(zmq::Error),

    #[error("Could not deserialize the sweep: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The sensor sent a message which was not valid UTF-8")]
    NonUtf8Message,

    #[error("The sweep has {0} ranges, index {1} is out of range")]
    IndexOutOfRange(usize, usize),

    #[error("Could not start the scan thread: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScanClient {
    /// Subscribe to the sensor and start calling `on_observation` for each valid sweep.
    pub fn start<F>(
        ctx: &zmq::Context,
        params: &NetParams,
        indices: ScanIndices,
        on_observation: F,
    ) -> Result<Self, ScanClientError>
    where
        F: FnMut(RangeObservation) + Send + 'static,
    {
        let socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, &params.scan_endpoint)
            .map_err(ScanClientError::SocketError)?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let num_scans = Arc::new(AtomicU64::new(0));

        let bg_run_clone = bg_run.clone();
        let num_scans_clone = num_scans.clone();

        let bg_jh = thread::Builder::new()
            .name("scan_client".into())
            .spawn(move || bg_thread(socket, indices, bg_run_clone, num_scans_clone, on_observation))
            .map_err(ScanClientError::SpawnError)?;

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run,
            num_scans,
        })
    }

    /// Number of valid sweeps received so far.
    pub fn num_scans(&self) -> u64 {
        self.num_scans.load(Ordering::Relaxed)
    }

    /// Stop receiving sweeps.
    pub fn stop(mut self) {
        self.stop_bg();
    }

    fn stop_bg(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Scan client thread panicked");
            }
        }
    }
}

impl Drop for ScanClient {
    fn drop(&mut self) {
        self.stop_bg();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Extract the observation from a serialized sweep.
pub fn parse_scan(scan_str: &str, indices: ScanIndices) -> Result<RangeObservation, ScanClientError> {
    let scan: LaserScan =
        serde_json::from_str(scan_str).map_err(ScanClientError::DeserializeError)?;

    RangeObservation::from_scan(&scan, indices.right, indices.front).ok_or_else(|| {
        ScanClientError::IndexOutOfRange(scan.ranges.len(), indices.right.max(indices.front))
    })
}

fn bg_thread<F>(
    socket: MonitoredSocket,
    indices: ScanIndices,
    run: Arc<AtomicBool>,
    num_scans: Arc<AtomicU64>,
    mut on_observation: F,
) where
    F: FnMut(RangeObservation),
{
    while run.load(Ordering::Relaxed) {
        let scan_str = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("{}", ScanClientError::NonUtf8Message);
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("{}", ScanClientError::RecvError(e));
                continue;
            }
        };

        match parse_scan(&scan_str, indices) {
            Ok(obs) => {
                num_scans.fetch_add(1, Ordering::Relaxed);
                on_observation(obs);
            }
            Err(e) => warn!("Dropping sweep: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    const INDICES: ScanIndices = ScanIndices {
        right: 90,
        front: 180,
    };

    fn scan_str(num_ranges: usize) -> String {
        let mut ranges = vec![3.5; num_ranges];
        if num_ranges > 180 {
            ranges[90] = 0.26;
            ranges[180] = 0.9;
        }

        serde_json::to_string(&LaserScan {
            ranges,
            timestamp: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_scan() {
        let obs = parse_scan(&scan_str(360), INDICES).unwrap();

        assert_eq!(obs.lateral_m, 0.26);
        assert_eq!(obs.forward_m, 0.9);
    }

    #[test]
    fn test_short_scan_rejected() {
        assert!(matches!(
            parse_scan(&scan_str(100), INDICES),
            Err(ScanClientError::IndexOutOfRange(100, 180))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            parse_scan("not a scan", INDICES),
            Err(ScanClientError::DeserializeError(_))
        ));
    }
}
