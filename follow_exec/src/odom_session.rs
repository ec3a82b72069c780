//! # Odometry telemetry session
//!
//! Asks the odometry recorder to record the path travelled, then follows its progress. The
//! session is independent of the controller, it never touches the controller state.
//!
//! ```text
//! Pending --accepted--> Recording --result--> Complete
//!    |                      |
//!    +--rejected--> Rejected +--transport error--> Failed
//! ```
//!
//! Feedback and the result are handled on the worker pool, so a late feedback can arrive after
//! the result has been handled. It is ignored.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::action::odom_record::{GoalResponse, OdomPoint, OdomRecordEvent, OdomRecordGoal};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    retry::{sleep_unless_stopped, RetryPolicy},
    worker_pool::PoolHandle,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time between two checks for a message from the recorder.
const EVENT_POLL_PERIOD: Duration = Duration::from_millis(10);

/// Session relative path the recorded path is saved to.
pub const RECORDED_PATH_SAVE_PATH: &str = "odom_record/recorded_path.json";

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Client side of the odometry recorder action.
pub trait OdomRecorder: Send + 'static {
    type Error: Display + Send;

    /// Endpoint of the recorder, for logging.
    fn endpoint(&self) -> &str;

    /// True if the recorder can currently be reached.
    fn is_reachable(&self) -> bool;

    /// Submit the goal without waiting for the response.
    fn send_goal(&mut self, goal: OdomRecordGoal) -> Result<(), Self::Error>;

    /// Get the goal response, `Ok(None)` if it hasn't arrived yet.
    fn poll_goal_response(&mut self) -> Result<Option<GoalResponse>, Self::Error>;

    /// Get the next feedback or result, `Ok(None)` if there isn't one.
    fn poll_event(&mut self) -> Result<Option<OdomRecordEvent>, Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State of the recording session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySession {
    state: SessionState,

    /// Whether the recorder accepted the goal
    accepted: bool,

    /// Latest distance reported by the recorder
    cumulative_distance_m: f64,

    /// Path reported in the result, empty until complete
    recorded_path: Vec<OdomPoint>,
}

/// Handle to a running session.
pub struct OdomSession {
    session: Arc<Mutex<TelemetrySession>>,
    bg_run: Arc<AtomicBool>,
    bg_jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Pending,
    Recording,
    Complete,
    Rejected,
    Failed,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OdomSessionError {
    #[error("Cannot handle {event} while the session is {state:?}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },

    #[error("Could not start the session thread: {0}")]
    SpawnError(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Pending
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Rejected | SessionState::Failed
        )
    }
}

impl TelemetrySession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn cumulative_distance_m(&self) -> f64 {
        self.cumulative_distance_m
    }

    pub fn recorded_path(&self) -> &[OdomPoint] {
        &self.recorded_path
    }

    /// Apply the recorder's answer to the goal.
    pub fn goal_response(&mut self, accepted: bool) -> Result<(), OdomSessionError> {
        self.expect(SessionState::Pending, "a goal response")?;

        self.accepted = accepted;
        self.state = if accepted {
            SessionState::Recording
        } else {
            SessionState::Rejected
        };

        Ok(())
    }

    /// Apply a progress update.
    ///
    /// The distance never decreases, an older update handled late is absorbed.
    pub fn feedback(&mut self, current_total_m: f64) -> Result<(), OdomSessionError> {
        self.expect(SessionState::Recording, "feedback")?;

        self.cumulative_distance_m = self.cumulative_distance_m.max(current_total_m);

        Ok(())
    }

    /// Apply the terminal result.
    pub fn complete(&mut self, list_of_odoms: Vec<OdomPoint>) -> Result<(), OdomSessionError> {
        self.expect(SessionState::Recording, "the result")?;

        self.recorded_path = list_of_odoms;
        self.state = SessionState::Complete;

        Ok(())
    }

    /// End the session after a transport failure.
    pub fn fail(&mut self) -> Result<(), OdomSessionError> {
        match self.state {
            SessionState::Pending | SessionState::Recording => {
                self.state = SessionState::Failed;
                Ok(())
            }
            state => Err(OdomSessionError::InvalidTransition {
                state,
                event: "a failure",
            }),
        }
    }

    fn expect(&self, state: SessionState, event: &'static str) -> Result<(), OdomSessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(OdomSessionError::InvalidTransition {
                state: self.state,
                event,
            })
        }
    }
}

impl OdomSession {
    /// Start the session in the background.
    pub fn start<R: OdomRecorder>(
        recorder: R,
        pool: PoolHandle,
        retry: RetryPolicy,
    ) -> Result<Self, OdomSessionError> {
        let session = Arc::new(Mutex::new(TelemetrySession::default()));
        let bg_run = Arc::new(AtomicBool::new(true));

        let session_clone = session.clone();
        let bg_run_clone = bg_run.clone();

        let bg_jh = thread::Builder::new()
            .name("odom_session".into())
            .spawn(move || bg_thread(recorder, pool, retry, bg_run_clone, session_clone))
            .map_err(|e| OdomSessionError::SpawnError(e.to_string()))?;

        Ok(Self {
            session,
            bg_run,
            bg_jh: Some(bg_jh),
        })
    }

    /// Copy of the current session state.
    pub fn snapshot(&self) -> TelemetrySession {
        lock_session(&self.session).clone()
    }

    /// The recorded path, once the session is complete.
    pub fn recorded_path(&self) -> Option<Vec<OdomPoint>> {
        let session = lock_session(&self.session);

        match session.state {
            SessionState::Complete => Some(session.recorded_path.clone()),
            _ => None,
        }
    }

    /// Stop following the recorder. The session keeps whatever state it reached.
    pub fn stop(mut self) {
        self.stop_bg();
    }

    fn stop_bg(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Odometry session thread panicked");
            }
        }
    }
}

impl Drop for OdomSession {
    fn drop(&mut self) {
        self.stop_bg();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bg_thread<R: OdomRecorder>(
    mut recorder: R,
    pool: PoolHandle,
    retry: RetryPolicy,
    run: Arc<AtomicBool>,
    session: Arc<Mutex<TelemetrySession>>,
) {
    let what = format!("odometry recorder at {}", recorder.endpoint());

    if let Err(e) = retry.wait_until(&what, &run, || recorder.is_reachable()) {
        debug!("{}", e);
        return;
    }

    warn!("Sending odometry recording goal");

    if let Err(e) = recorder.send_goal(OdomRecordGoal) {
        error!("Could not send the odometry recording goal: {}", e);
        handle_failure(&session);
        return;
    }

    // Wait for the goal response
    let accepted = loop {
        if !run.load(Ordering::Relaxed) {
            return;
        }

        match recorder.poll_goal_response() {
            Ok(Some(response)) => break response.accepted,
            Ok(None) => sleep_unless_stopped(EVENT_POLL_PERIOD, &run),
            Err(e) => {
                error!("Could not get the odometry goal response: {}", e);
                handle_failure(&session);
                return;
            }
        }
    };

    // The goal response is applied before any event is posted, so feedback can never find the
    // session still pending
    handle_goal_response(accepted, &session);

    if !accepted {
        return;
    }

    while run.load(Ordering::Relaxed) {
        let event = match recorder.poll_event() {
            Ok(Some(e)) => e,
            Ok(None) => {
                sleep_unless_stopped(EVENT_POLL_PERIOD, &run);
                continue;
            }
            Err(e) => {
                error!("Lost the odometry recorder: {}", e);
                handle_failure(&session);
                return;
            }
        };

        let is_result = matches!(event, OdomRecordEvent::Result { .. });

        let session_clone = session.clone();
        let event_clone = event.clone();
        if let Err(e) = pool.spawn(move || handle_event(event_clone, &session_clone)) {
            warn!(
                "Could not post an odometry event to the pool ({}), handling in place",
                e
            );
            handle_event(event, &session);
        }

        if is_result {
            break;
        }
    }
}

fn handle_goal_response(accepted: bool, session: &Mutex<TelemetrySession>) {
    if let Err(e) = lock_session(session).goal_response(accepted) {
        error!("{}", e);
        return;
    }

    if accepted {
        info!("Goal accepted");
    } else {
        warn!("Goal rejected");
    }
}

fn handle_event(event: OdomRecordEvent, session: &Mutex<TelemetrySession>) {
    match event {
        OdomRecordEvent::Feedback { current_total_m } => {
            match lock_session(session).feedback(current_total_m) {
                Ok(()) => info!("Travelled {} m", current_total_m),
                Err(e) => debug!("Ignoring odometry feedback: {}", e),
            }
        }
        OdomRecordEvent::Result { list_of_odoms } => {
            let path = list_of_odoms.clone();

            if let Err(e) = lock_session(session).complete(list_of_odoms) {
                error!("{}", e);
                return;
            }

            info!("All odometry: {:?}", path);
            util::session::save(RECORDED_PATH_SAVE_PATH, path);
        }
    }
}

fn handle_failure(session: &Mutex<TelemetrySession>) {
    if let Err(e) = lock_session(session).fail() {
        error!("{}", e);
    }
}

fn lock_session(session: &Mutex<TelemetrySession>) -> MutexGuard<'_, TelemetrySession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worker_pool::WorkerPool;
    use std::{collections::VecDeque, time::Instant};

    struct FakeRecorder {
        accept: bool,
        goal_sent: bool,
        goal_answered: bool,
        events: VecDeque<Result<OdomRecordEvent, String>>,
    }

    impl FakeRecorder {
        fn new(accept: bool, events: Vec<Result<OdomRecordEvent, String>>) -> Self {
            Self {
                accept,
                goal_sent: false,
                goal_answered: false,
                events: events.into(),
            }
        }
    }

    impl OdomRecorder for FakeRecorder {
        type Error = String;

        fn endpoint(&self) -> &str {
            "inproc://odom_record"
        }

        fn is_reachable(&self) -> bool {
            true
        }

        fn send_goal(&mut self, _: OdomRecordGoal) -> Result<(), Self::Error> {
            self.goal_sent = true;
            Ok(())
        }

        fn poll_goal_response(&mut self) -> Result<Option<GoalResponse>, Self::Error> {
            if !self.goal_sent || self.goal_answered {
                return Ok(None);
            }
            self.goal_answered = true;

            Ok(Some(GoalResponse {
                accepted: self.accept,
            }))
        }

        fn poll_event(&mut self) -> Result<Option<OdomRecordEvent>, Self::Error> {
            self.events.pop_front().transpose()
        }
    }

    fn point(x: f64) -> OdomPoint {
        OdomPoint { x, y: 0.0, z: 0.0 }
    }

    fn wait_terminal(session: &OdomSession) -> TelemetrySession {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.snapshot().state().is_terminal() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        session.snapshot()
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(5))
    }

    #[test]
    fn test_accepted_session_completes() {
        let pool = WorkerPool::new(1).unwrap();
        let recorder = FakeRecorder::new(
            true,
            vec![
                Ok(OdomRecordEvent::Feedback {
                    current_total_m: 0.1,
                }),
                Ok(OdomRecordEvent::Feedback {
                    current_total_m: 0.2,
                }),
                Ok(OdomRecordEvent::Result {
                    list_of_odoms: vec![point(0.1), point(0.2)],
                }),
            ],
        );

        let session = OdomSession::start(recorder, pool.handle(), retry()).unwrap();
        let snapshot = wait_terminal(&session);
        pool.shutdown();

        assert_eq!(snapshot.state(), SessionState::Complete);
        assert!(snapshot.accepted());
        assert_eq!(snapshot.cumulative_distance_m(), 0.2);
        assert_eq!(
            session.recorded_path(),
            Some(vec![point(0.1), point(0.2)])
        );
        session.stop();
    }

    #[test]
    fn test_events_handled_in_place_without_pool() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool.handle();
        pool.shutdown();

        let recorder = FakeRecorder::new(
            true,
            vec![
                Ok(OdomRecordEvent::Feedback {
                    current_total_m: 0.3,
                }),
                Ok(OdomRecordEvent::Result {
                    list_of_odoms: vec![point(0.3)],
                }),
            ],
        );

        let session = OdomSession::start(recorder, handle, retry()).unwrap();
        let snapshot = wait_terminal(&session);

        assert_eq!(snapshot.state(), SessionState::Complete);
        assert_eq!(snapshot.cumulative_distance_m(), 0.3);
        assert_eq!(session.recorded_path(), Some(vec![point(0.3)]));
        session.stop();
    }

    #[test]
    fn test_rejected_goal() {
        let pool = WorkerPool::new(1).unwrap();
        let recorder = FakeRecorder::new(
            false,
            vec![Ok(OdomRecordEvent::Feedback {
                current_total_m: 0.1,
            })],
        );

        let session = OdomSession::start(recorder, pool.handle(), retry()).unwrap();
        let snapshot = wait_terminal(&session);
        pool.shutdown();

        assert_eq!(snapshot.state(), SessionState::Rejected);
        assert!(!snapshot.accepted());
        assert_eq!(snapshot.cumulative_distance_m(), 0.0);
        assert!(session.recorded_path().is_none());
        session.stop();
    }

    #[test]
    fn test_transport_error_fails_session() {
        let pool = WorkerPool::new(1).unwrap();
        let recorder = FakeRecorder::new(true, vec![Err("connection lost".into())]);

        let session = OdomSession::start(recorder, pool.handle(), retry()).unwrap();
        let snapshot = wait_terminal(&session);
        pool.shutdown();

        assert_eq!(snapshot.state(), SessionState::Failed);
        assert!(snapshot.accepted());
        session.stop();
    }

    #[test]
    fn test_late_feedback_is_ignored() {
        let mut session = TelemetrySession::default();

        session.goal_response(true).unwrap();
        session.feedback(0.3).unwrap();

        // Handled out of order
        session.feedback(0.2).unwrap();
        assert_eq!(session.cumulative_distance_m(), 0.3);

        session.complete(vec![point(0.3)]).unwrap();
        assert!(session.feedback(0.4).is_err());
        assert_eq!(session.cumulative_distance_m(), 0.3);
        assert_eq!(session.state(), SessionState::Complete);
    }

    #[test]
    fn test_transitions_from_terminal_states() {
        let mut session = TelemetrySession::default();
        assert_eq!(
            session.feedback(0.1),
            Err(OdomSessionError::InvalidTransition {
                state: SessionState::Pending,
                event: "feedback",
            })
        );

        session.goal_response(false).unwrap();
        assert!(session.goal_response(true).is_err());
        assert!(session.complete(vec![]).is_err());
        assert!(session.fail().is_err());
        assert_eq!(session.state(), SessionState::Rejected);
    }
}
