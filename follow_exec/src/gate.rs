//! # Precondition gate
//!
//! The controller must not move the robot until the find wall service reports that a wall has
//! been found. The gate performs this handshake once at start up:
//!
//! 1. Wait, at a fixed interval, for the find wall service to become reachable.
//! 2. Issue a single request.
//! 3. Post the response to the worker pool, where it is resolved exactly once: a positive answer
//!    activates the controller, anything else leaves it inactive for the rest of its life.
//!
//! There is no retry of the request itself and no timeout on the response.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::srv::find_wall::{FindWallRequest, FindWallResponse};
use log::{debug, error, info, warn};
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    controller::{lock_core, SharedCore},
    retry::{sleep_unless_stopped, RetryPolicy},
    worker_pool::PoolHandle,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time between two checks for the service's response.
const RESPONSE_POLL_PERIOD: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Client side of the find wall service.
pub trait WallFinder: Send + 'static {
    type Error: Display + Send;

    /// Endpoint of the service, for logging.
    fn endpoint(&self) -> &str;

    /// True if the service can currently be reached.
    fn is_reachable(&self) -> bool;

    /// Send the request without waiting for the response.
    fn send_request(&mut self, request: FindWallRequest) -> Result<(), Self::Error>;

    /// Get the response to the request, `Ok(None)` if it hasn't arrived yet.
    fn poll_response(&mut self) -> Result<Option<FindWallResponse>, Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the running handshake.
pub struct PreconditionGate {
    state: Arc<Mutex<GateState>>,
    bg_run: Arc<AtomicBool>,
    bg_jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for the service or for its response
    AwaitingService,

    /// A wall was found, the controller is active
    Ready,

    /// The service answered negatively or the request failed
    Blocked,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("The gate has already been resolved to {0:?}")]
    AlreadyResolved(GateState),

    #[error("Could not start the gate thread: {0}")]
    SpawnError(std::io::Error),
}

/// Outcome of the request, carried from the gate thread to the pool.
#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    WallFound,
    NoWall,
    Failed(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for GateState {
    fn default() -> Self {
        GateState::AwaitingService
    }
}

impl GateState {
    /// Leave `AwaitingService` for `Ready` or `Blocked`.
    ///
    /// This is the only transition the gate has, resolving twice is an error.
    pub fn resolve(&mut self, wall_found: bool) -> Result<(), GateError> {
        if *self != GateState::AwaitingService {
            return Err(GateError::AlreadyResolved(*self));
        }

        *self = if wall_found {
            GateState::Ready
        } else {
            GateState::Blocked
        };

        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        *self != GateState::AwaitingService
    }
}

impl PreconditionGate {
    /// Start the handshake in the background.
    pub fn start<F: WallFinder>(
        finder: F,
        core: SharedCore,
        pool: PoolHandle,
        retry: RetryPolicy,
    ) -> Result<Self, GateError> {
        let state = Arc::new(Mutex::new(GateState::default()));
        let bg_run = Arc::new(AtomicBool::new(true));

        let state_clone = state.clone();
        let bg_run_clone = bg_run.clone();

        let bg_jh = thread::Builder::new()
            .name("precondition_gate".into())
            .spawn(move || bg_thread(finder, core, pool, retry, bg_run_clone, state_clone))
            .map_err(GateError::SpawnError)?;

        Ok(Self {
            state,
            bg_run,
            bg_jh: Some(bg_jh),
        })
    }

    /// Current state of the handshake.
    pub fn state(&self) -> GateState {
        *lock_state(&self.state)
    }

    /// Stop waiting for the service. An unresolved gate stays unresolved.
    pub fn stop(mut self) {
        self.stop_bg();
    }

    fn stop_bg(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Precondition gate thread panicked");
            }
        }
    }
}

impl Drop for PreconditionGate {
    fn drop(&mut self) {
        self.stop_bg();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bg_thread<F: WallFinder>(
    mut finder: F,
    core: SharedCore,
    pool: PoolHandle,
    retry: RetryPolicy,
    run: Arc<AtomicBool>,
    state: Arc<Mutex<GateState>>,
) {
    let what = format!("find wall service at {}", finder.endpoint());

    if let Err(e) = retry.wait_until(&what, &run, || finder.is_reachable()) {
        debug!("{}", e);
        return;
    }

    warn!("Calling find wall service");

    let resolution = match finder.send_request(FindWallRequest) {
        Ok(()) => loop {
            if !run.load(Ordering::Relaxed) {
                debug!("Gate stopped while waiting for the find wall response");
                return;
            }

            match finder.poll_response() {
                Ok(Some(FindWallResponse { wall_found: true })) => break Resolution::WallFound,
                Ok(Some(FindWallResponse { wall_found: false })) => break Resolution::NoWall,
                Ok(None) => sleep_unless_stopped(RESPONSE_POLL_PERIOD, &run),
                Err(e) => break Resolution::Failed(e.to_string()),
            }
        },
        Err(e) => Resolution::Failed(e.to_string()),
    };

    // Resolve on the pool, or here if the pool is already gone
    let state_clone = state.clone();
    let core_clone = core.clone();
    let resolution_clone = resolution.clone();
    if let Err(e) = pool.spawn(move || resolve(resolution_clone, &state_clone, &core_clone)) {
        warn!("Could not post the gate resolution to the pool ({}), resolving in place", e);
        resolve(resolution, &state, &core);
    }
}

fn resolve(resolution: Resolution, state: &Mutex<GateState>, core: &SharedCore) {
    let wall_found = resolution == Resolution::WallFound;

    if let Err(e) = lock_state(state).resolve(wall_found) {
        error!("{}", e);
        return;
    }

    match resolution {
        Resolution::WallFound => {
            if lock_core(core).state.activate() {
                info!("Ready to follow the wall");
            }
        }
        Resolution::NoWall => {
            warn!("The find wall service did not find a wall, the controller will stay inactive")
        }
        Resolution::Failed(e) => error!(
            "The find wall request failed ({}), the controller will stay inactive",
            e
        ),
    }
}

fn lock_state(state: &Mutex<GateState>) -> std::sync::MutexGuard<'_, GateState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        controller::{fake, TickOutcome},
        range_cache::RangeObservation,
        worker_pool::WorkerPool,
    };
    use std::{
        sync::atomic::AtomicUsize,
        time::Instant,
    };

    struct FakeFinder {
        unreachable_checks: usize,
        checks: Arc<AtomicUsize>,
        requests: Arc<AtomicUsize>,
        response: Result<bool, String>,
        responded: bool,
    }

    impl FakeFinder {
        fn new(response: Result<bool, String>) -> Self {
            Self {
                unreachable_checks: 0,
                checks: Arc::new(AtomicUsize::new(0)),
                requests: Arc::new(AtomicUsize::new(0)),
                response,
                responded: false,
            }
        }
    }

    impl WallFinder for FakeFinder {
        type Error = String;

        fn endpoint(&self) -> &str {
            "inproc://find_wall"
        }

        fn is_reachable(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst) >= self.unreachable_checks
        }

        fn send_request(&mut self, _: FindWallRequest) -> Result<(), Self::Error> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn poll_response(&mut self) -> Result<Option<FindWallResponse>, Self::Error> {
            if self.responded {
                return Ok(None);
            }
            self.responded = true;

            self.response
                .clone()
                .map(|wall_found| Some(FindWallResponse { wall_found }))
        }
    }

    fn wait_resolved(gate: &PreconditionGate) -> GateState {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !gate.state().is_resolved() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        gate.state()
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(5))
    }

    #[test]
    fn test_wall_found_activates() {
        let pool = WorkerPool::new(2).unwrap();
        let (core, _) = fake::core(0.1);
        let core = core.into_shared();

        let mut finder = FakeFinder::new(Ok(true));
        finder.unreachable_checks = 3;
        let checks = finder.checks.clone();
        let requests = finder.requests.clone();

        let gate = PreconditionGate::start(finder, core.clone(), pool.handle(), retry()).unwrap();

        assert_eq!(wait_resolved(&gate), GateState::Ready);
        pool.shutdown();

        assert!(lock_core(&core).state.is_active());
        assert!(checks.load(Ordering::SeqCst) >= 4);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        gate.stop();
    }

    #[test]
    fn test_no_wall_stays_inactive() {
        let pool = WorkerPool::new(2).unwrap();
        let (core, publisher) = fake::core(0.1);
        let core = core.into_shared();

        let gate =
            PreconditionGate::start(FakeFinder::new(Ok(false)), core.clone(), pool.handle(), retry())
                .unwrap();

        assert_eq!(wait_resolved(&gate), GateState::Blocked);
        pool.shutdown();

        {
            let mut core = lock_core(&core);
            assert!(!core.state.is_active());
            assert_eq!(
                core.sensor_tick(RangeObservation::new(0.35, 1.0)),
                TickOutcome::Suppressed
            );
            assert_eq!(core.periodic_tick(), TickOutcome::Suppressed);
        }

        assert!(publisher.sent().is_empty());
        gate.stop();
    }

    #[test]
    fn test_request_error_blocks() {
        let pool = WorkerPool::new(1).unwrap();
        let (core, _) = fake::core(0.1);
        let core = core.into_shared();

        let gate = PreconditionGate::start(
            FakeFinder::new(Err("connection reset".into())),
            core.clone(),
            pool.handle(),
            retry(),
        )
        .unwrap();

        assert_eq!(wait_resolved(&gate), GateState::Blocked);
        pool.shutdown();

        assert!(!lock_core(&core).state.is_active());
        gate.stop();
    }

    #[test]
    fn test_stop_while_unreachable() {
        let pool = WorkerPool::new(1).unwrap();
        let (core, _) = fake::core(0.1);

        let mut finder = FakeFinder::new(Ok(true));
        finder.unreachable_checks = usize::MAX;
        let requests = finder.requests.clone();

        let gate =
            PreconditionGate::start(finder, core.into_shared(), pool.handle(), retry()).unwrap();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(gate.state(), GateState::AwaitingService);
        gate.stop();
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolution_is_single_transition() {
        let mut state = GateState::default();

        assert!(state.resolve(true).is_ok());
        assert_eq!(state, GateState::Ready);
        assert!(matches!(
            state.resolve(false),
            Err(GateError::AlreadyResolved(GateState::Ready))
        ));
        assert_eq!(state, GateState::Ready);
    }
}
