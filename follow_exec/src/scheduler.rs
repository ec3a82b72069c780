//! # Control scheduler
//!
//! Drives the controller core from two sources:
//!
//! - a timer thread posting a periodic tick to the worker pool at a fixed rate,
//! - a [`SensorTrigger`] posting a sensor tick for every observation that arrives.
//!
//! Both kinds of tick run on the pool and serialise on the core lock. Stopping the scheduler ends
//! the timer and publishes the final zero command, after which the core ignores any tick still
//! queued on the pool.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, trace, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    controller::{lock_core, SharedCore, TickOutcome},
    range_cache::RangeObservation,
    retry::sleep_unless_stopped,
    worker_pool::{PoolHandle, WorkerPoolError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Owner of the periodic tick.
pub struct ControlScheduler {
    core: SharedCore,
    pool: PoolHandle,
    period: Duration,
    timer_run: Arc<AtomicBool>,
    timer_jh: Option<JoinHandle<()>>,
}

/// Posts sensor ticks for new observations, given to whatever receives the sensor stream.
#[derive(Clone)]
pub struct SensorTrigger {
    core: SharedCore,
    pool: PoolHandle,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("The scheduler has already been started")]
    AlreadyStarted,

    #[error("The tick period must be positive")]
    InvalidPeriod,

    #[error("Could not start the timer thread: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlScheduler {
    pub fn new(core: SharedCore, pool: PoolHandle, period: Duration) -> Self {
        Self {
            core,
            pool,
            period,
            timer_run: Arc::new(AtomicBool::new(true)),
            timer_jh: None,
        }
    }

    /// Start the periodic tick.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.timer_jh.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        if self.period == Duration::from_secs(0) {
            return Err(SchedulerError::InvalidPeriod);
        }

        let core = self.core.clone();
        let pool = self.pool.clone();
        let period = self.period;
        let run = self.timer_run.clone();

        self.timer_jh = Some(
            thread::Builder::new()
                .name("control_timer".into())
                .spawn(move || timer_thread(core, pool, period, run))
                .map_err(SchedulerError::SpawnError)?,
        );

        debug!("Control scheduler started with a {:?} period", self.period);

        Ok(())
    }

    /// Get a trigger for sensor ticks.
    pub fn sensor_trigger(&self) -> SensorTrigger {
        SensorTrigger {
            core: self.core.clone(),
            pool: self.pool.clone(),
        }
    }

    /// Stop the periodic tick and publish the final zero command.
    pub fn stop(mut self) {
        self.timer_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.timer_jh.take() {
            if jh.join().is_err() {
                error!("Control timer thread panicked");
            }
        }

        lock_core(&self.core).shutdown();
    }
}

/// Clears the in-flight flag when the tick holding it ends, even by panic or by being dropped
/// unrun.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SensorTrigger {
    /// Post a sensor tick for the given observation.
    pub fn on_observation(&self, obs: RangeObservation) -> Result<(), WorkerPoolError> {
        let core = self.core.clone();

        self.pool.spawn(move || {
            let outcome = lock_core(&core).sensor_tick(obs);
            trace!("Sensor tick: {:?}", outcome);
        })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn timer_thread(core: SharedCore, pool: PoolHandle, period: Duration, run: Arc<AtomicBool>) {
    let mut next_tick = Instant::now() + period;

    // Set while a posted tick has not finished running
    let in_flight = Arc::new(AtomicBool::new(false));

    while run.load(Ordering::Relaxed) {
        if in_flight.swap(true, Ordering::SeqCst) {
            warn!("Previous periodic tick still pending, skipping this one");
        } else {
            let core_clone = core.clone();
            let guard = InFlightGuard(in_flight.clone());
            let posted = pool.spawn(move || {
                let _guard = guard;
                periodic_tick(&core_clone, period);
            });

            if let Err(e) = posted {
                warn!("Could not post the periodic tick, stopping the timer: {}", e);
                break;
            }
        }

        let now = Instant::now();
        match next_tick.checked_duration_since(now) {
            Some(d) => {
                sleep_unless_stopped(d, &run);
                next_tick += period;
            }
            // Timer fell behind, skip the missed ticks rather than bursting
            None => {
                warn!(
                    "Control timer late by {:.06} s",
                    (now - next_tick).as_secs_f64()
                );
                next_tick = now + period;
            }
        }
    }
}

fn periodic_tick(core: &SharedCore, period: Duration) {
    let start = Instant::now();

    let outcome = lock_core(core).periodic_tick();

    let dur = start.elapsed();
    if dur > period {
        warn!(
            "Periodic tick overran by {:.06} s",
            (dur - period).as_secs_f64()
        );
    }

    if outcome == TickOutcome::NoObservation {
        debug!("Active but no range observation received yet");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{controller::fake, worker_pool::WorkerPool};
    use comms_if::eqpt::drive::VelocityCmd;

    const PERIOD: Duration = Duration::from_millis(10);

    #[test]
    fn test_inactive_publishes_only_final_zero() {
        let pool = WorkerPool::new(2).unwrap();
        let (core, publisher) = fake::core(PERIOD.as_secs_f64());
        let core = core.into_shared();

        let mut scheduler = ControlScheduler::new(core.clone(), pool.handle(), PERIOD);
        scheduler.start().unwrap();
        let trigger = scheduler.sensor_trigger();

        for _ in 0..5 {
            trigger
                .on_observation(RangeObservation::new(0.35, 1.0))
                .unwrap();
            thread::sleep(PERIOD);
        }

        scheduler.stop();
        pool.shutdown();

        assert_eq!(publisher.sent(), vec![VelocityCmd::zero()]);
        assert_eq!(lock_core(&core).state.range_cache.num_records(), 5);
    }

    #[test]
    fn test_active_publishes_then_stops_with_zero() {
        let pool = WorkerPool::new(2).unwrap();
        let (core, publisher) = fake::core(PERIOD.as_secs_f64());
        let core = core.into_shared();
        lock_core(&core).state.activate();

        let mut scheduler = ControlScheduler::new(core.clone(), pool.handle(), PERIOD);
        scheduler.start().unwrap();
        scheduler
            .sensor_trigger()
            .on_observation(RangeObservation::new(0.35, 1.0))
            .unwrap();

        thread::sleep(PERIOD * 6);
        scheduler.stop();

        // Ticks still queued on the pool must not publish after the final command
        thread::sleep(PERIOD * 2);
        pool.shutdown();

        let sent = publisher.sent();
        let expected = VelocityCmd {
            linear_ms: 0.05,
            angular_rads: -0.3,
        };

        assert!(sent.len() >= 3);
        let (last, rest) = sent.split_last().unwrap();
        assert!(last.is_zero());
        assert!(rest.iter().all(|cmd| *cmd == expected));
    }

    #[test]
    fn test_stalled_pool_does_not_burst() {
        let pool = WorkerPool::new(1).unwrap();
        let (core, publisher) = fake::core(PERIOD.as_secs_f64());
        let core = core.into_shared();
        {
            let mut c = lock_core(&core);
            c.state.activate();
            c.sensor_tick(RangeObservation::new(0.35, 1.0));
        }

        let mut scheduler = ControlScheduler::new(core.clone(), pool.handle(), PERIOD);
        scheduler.start().unwrap();

        // Occupy the only worker for many periods
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        pool.handle()
            .spawn(move || {
                release_rx.recv_timeout(Duration::from_secs(5)).ok();
            })
            .unwrap();

        thread::sleep(PERIOD * 30);
        let before = publisher.sent().len();

        release_tx.send(()).unwrap();
        thread::sleep(PERIOD / 2);
        let after = publisher.sent().len();

        scheduler.stop();
        pool.shutdown();

        assert!(
            after - before <= 2,
            "{} commands published right after the stall",
            after - before
        );
    }

    #[test]
    fn test_start_twice() {
        let pool = WorkerPool::new(1).unwrap();
        let (core, _) = fake::core(PERIOD.as_secs_f64());

        let mut scheduler = ControlScheduler::new(core.into_shared(), pool.handle(), PERIOD);
        scheduler.start().unwrap();

        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::AlreadyStarted)
        ));

        scheduler.stop();
    }

    #[test]
    fn test_zero_period_rejected() {
        let pool = WorkerPool::new(1).unwrap();
        let (core, _) = fake::core(0.1);

        let mut scheduler =
            ControlScheduler::new(core.into_shared(), pool.handle(), Duration::from_secs(0));

        assert!(matches!(scheduler.start(), Err(SchedulerError::InvalidPeriod)));
    }
}
