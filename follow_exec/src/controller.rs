//! # Controller core
//!
//! The controller state and the actuator publisher, shared by every trigger that can produce a
//! motion command. All access goes through a single mutex ([`SharedCore`]) so that a periodic
//! tick and a sensor tick can never interleave their read of the previous error with the write of
//! the new one. Publishing happens inside the same critical section, so the order in which
//! commands reach the actuator channel is the order in which they were computed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::eqpt::drive::VelocityCmd;
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    range_cache::{RangeCache, RangeObservation},
    wall_ctrl::{self, WallCtrl},
};
use util::module::State;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Error type returned by actuator publishers.
pub type PublishError = Box<dyn std::error::Error + Send + Sync>;

/// The controller core as shared between triggers.
pub type SharedCore = Arc<Mutex<ControlCore>>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Sink for velocity commands, the actuator command channel.
pub trait CmdPublisher: Send {
    fn publish(&mut self, cmd: &VelocityCmd) -> Result<(), PublishError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State of the controller, only ever touched while holding the core lock.
pub struct ControllerState {
    /// Set once the precondition handshake succeeds, never cleared
    active: bool,

    /// Wall control module, carries the previous and current error
    pub wall_ctrl: WallCtrl,

    /// Latest range observation
    pub range_cache: RangeCache,

    /// Time of the last command successfully published by a tick
    last_tick_time: Option<DateTime<Utc>>,

    /// Last command sent to the actuator
    command: VelocityCmd,
}

/// Controller state plus the actuator channel it publishes to.
pub struct ControlCore {
    pub state: ControllerState,

    publisher: Box<dyn CmdPublisher>,

    /// Nominal tick period, used by the derivative term of every evaluation
    period_s: f64,

    /// Set once the final command has been published, nothing is published afterwards
    stopped: bool,

    num_published: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What happened during one trigger of the core.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TickOutcome {
    /// The controller is inactive or stopped, nothing was published
    Suppressed,

    /// The controller is active but no observation has arrived yet
    NoObservation,

    /// A command was computed and published
    Published(VelocityCmd),

    /// The motion law or the publisher failed, see the log
    Failed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControllerState {
    pub fn new(wall_ctrl: WallCtrl) -> Self {
        Self {
            active: false,
            wall_ctrl,
            range_cache: RangeCache::default(),
            last_tick_time: None,
            command: VelocityCmd::zero(),
        }
    }

    /// Activate the controller.
    ///
    /// Returns `true` if this call changed the state, `false` if it was already active.
    pub fn activate(&mut self) -> bool {
        let changed = !self.active;
        self.active = true;
        changed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_tick_time(&self) -> Option<DateTime<Utc>> {
        self.last_tick_time
    }

    /// The last command published to the actuator.
    pub fn command(&self) -> VelocityCmd {
        self.command
    }
}

impl ControlCore {
    pub fn new(wall_ctrl: WallCtrl, publisher: Box<dyn CmdPublisher>, period_s: f64) -> Self {
        Self {
            state: ControllerState::new(wall_ctrl),
            publisher,
            period_s,
            stopped: false,
            num_published: 0,
        }
    }

    /// Wrap the core for sharing between triggers.
    pub fn into_shared(self) -> SharedCore {
        Arc::new(Mutex::new(self))
    }

    /// Fixed period trigger, acts on the latest cached observation.
    pub fn periodic_tick(&mut self) -> TickOutcome {
        if self.stopped || !self.state.active {
            return TickOutcome::Suppressed;
        }

        match self.state.range_cache.latest() {
            Some(obs) => self.run_motion(obs),
            None => TickOutcome::NoObservation,
        }
    }

    /// Sensor arrival trigger, caches the observation and acts on it immediately if active.
    pub fn sensor_tick(&mut self, obs: RangeObservation) -> TickOutcome {
        if self.stopped {
            return TickOutcome::Suppressed;
        }

        self.state.range_cache.record(obs);

        if !self.state.active {
            return TickOutcome::Suppressed;
        }

        info!("Right: {}, front: {}", obs.lateral_m, obs.forward_m);

        self.run_motion(obs)
    }

    /// Publish the final zero command and stop publishing.
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }

        let cmd = self.state.wall_ctrl.safe_output();

        if let Err(e) = self.publisher.publish(&cmd) {
            error!("Could not publish the final stop command: {}", e);
        } else {
            self.num_published += 1;
        }

        self.state.command = cmd;
        self.stopped = true;

        info!("Shutdown");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn num_published(&self) -> u64 {
        self.num_published
    }

    fn run_motion(&mut self, obs: RangeObservation) -> TickOutcome {
        let input = wall_ctrl::InputData {
            lateral_m: obs.lateral_m,
            forward_m: obs.forward_m,
            period_s: self.period_s,
        };

        let cmd = match self.state.wall_ctrl.proc(&input) {
            Ok((cmd, _)) => cmd,
            Err(e) => {
                warn!("Error during WallCtrl processing: {}", e);
                return TickOutcome::Failed;
            }
        };

        if let Err(e) = self.publisher.publish(&cmd) {
            error!("Could not publish the velocity command: {}", e);
            return TickOutcome::Failed;
        }

        self.state.command = cmd;
        self.state.last_tick_time = Some(Utc::now());
        self.num_published += 1;

        TickOutcome::Published(cmd)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock the core, recovering the guard if a previous holder panicked.
///
/// The state is still usable after a panic in a tick, the worst case is one lost command.
pub fn lock_core(core: &SharedCore) -> MutexGuard<'_, ControlCore> {
    match core.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("Controller core mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Publisher recording every command it is given.
    #[derive(Clone, Default)]
    pub struct RecordingPublisher {
        pub sent: Arc<Mutex<Vec<VelocityCmd>>>,
    }

    impl RecordingPublisher {
        pub fn sent(&self) -> Vec<VelocityCmd> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CmdPublisher for RecordingPublisher {
        fn publish(&mut self, cmd: &VelocityCmd) -> Result<(), PublishError> {
            self.sent.lock().unwrap().push(*cmd);
            Ok(())
        }
    }

    /// A core with default parameters publishing to the returned recorder.
    pub fn core(period_s: f64) -> (ControlCore, RecordingPublisher) {
        let publisher = RecordingPublisher::default();
        let wall_ctrl = WallCtrl::new(wall_ctrl::Params::default()).unwrap();

        (
            ControlCore::new(wall_ctrl, Box::new(publisher.clone()), period_s),
            publisher,
        )
    }
}

#[cfg(test)]
mod test {
    use super::fake::*;
    use super::*;

    struct FailingPublisher;

    impl CmdPublisher for FailingPublisher {
        fn publish(&mut self, _: &VelocityCmd) -> Result<(), PublishError> {
            Err("actuator unreachable".into())
        }
    }

    #[test]
    fn test_inactive_core_publishes_nothing() {
        let (mut core, publisher) = core(0.1);

        assert_eq!(core.periodic_tick(), TickOutcome::Suppressed);
        assert_eq!(
            core.sensor_tick(RangeObservation::new(0.35, 1.0)),
            TickOutcome::Suppressed
        );
        assert_eq!(core.periodic_tick(), TickOutcome::Suppressed);

        // The observation is still cached for when the controller activates
        assert!(core.state.range_cache.latest().is_some());
        assert!(publisher.sent().is_empty());
        assert!(core.state.last_tick_time().is_none());
    }

    #[test]
    fn test_active_without_observation() {
        let (mut core, publisher) = core(0.1);
        core.state.activate();

        assert_eq!(core.periodic_tick(), TickOutcome::NoObservation);
        assert!(publisher.sent().is_empty());
    }

    #[test]
    fn test_both_triggers_publish_when_active() {
        let (mut core, publisher) = core(0.1);
        assert!(core.state.activate());

        let expected = VelocityCmd {
            linear_ms: 0.05,
            angular_rads: -0.3,
        };

        assert_eq!(
            core.sensor_tick(RangeObservation::new(0.35, 1.0)),
            TickOutcome::Published(expected)
        );
        assert_eq!(core.periodic_tick(), TickOutcome::Published(expected));

        assert_eq!(publisher.sent(), vec![expected, expected]);
        assert_eq!(core.state.command(), expected);
        assert!(core.state.last_tick_time().is_some());
        assert_eq!(core.num_published(), 2);
    }

    #[test]
    fn test_activation_is_monotonic() {
        let (mut core, _) = core(0.1);

        assert!(!core.state.is_active());
        assert!(core.state.activate());
        assert!(!core.state.activate());
        assert!(core.state.is_active());
    }

    #[test]
    fn test_shutdown_publishes_single_zero() {
        let (mut core, publisher) = core(0.1);
        core.state.activate();
        core.sensor_tick(RangeObservation::new(0.35, 1.0));

        core.shutdown();
        core.shutdown();

        let sent = publisher.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].is_zero());
        assert!(core.is_stopped());

        // Nothing after the final command
        assert_eq!(core.periodic_tick(), TickOutcome::Suppressed);
        assert_eq!(
            core.sensor_tick(RangeObservation::new(0.25, 1.0)),
            TickOutcome::Suppressed
        );
        assert_eq!(publisher.sent().len(), 2);
    }

    #[test]
    fn test_publish_failure_is_not_fatal() {
        let wall_ctrl = WallCtrl::new(wall_ctrl::Params::default()).unwrap();
        let mut core = ControlCore::new(wall_ctrl, Box::new(FailingPublisher), 0.1);
        core.state.activate();

        assert_eq!(
            core.sensor_tick(RangeObservation::new(0.35, 1.0)),
            TickOutcome::Failed
        );
        assert_eq!(core.state.command(), VelocityCmd::zero());
        assert!(core.state.last_tick_time().is_none());
        assert_eq!(core.num_published(), 0);

        core.shutdown();
        assert!(core.is_stopped());
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let (core, _) = core(0.1);
        let shared = core.into_shared();

        let shared_clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared_clone.lock().unwrap();
            panic!("tick failure");
        })
        .join();

        assert!(shared.is_poisoned());
        assert_eq!(lock_core(&shared).periodic_tick(), TickOutcome::Suppressed);
    }
}
