//! Wall following executable entry point.
//!
//! # Architecture
//!
//! Unlike a cyclic executable there is no main loop. Once everything is initialised the main
//! thread only waits for the stop signal, the work is done by:
//!
//!     - The worker pool, running every tick and every deferred handler
//!     - The control timer, posting the periodic tick
//!     - The scan client, posting a sensor tick per sweep
//!     - The precondition gate, waiting for the find wall service
//!     - The odometry session, following the odometry recorder
//!
//! # Shutdown
//!
//! On Ctrl-C the sources of work are stopped first, then the scheduler publishes the final zero
//! command, then the pool is drained and the session closed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use structopt::StructOpt;

// Internal
use follow_lib::{
    cmd_vel_publisher::CmdVelPublisher,
    controller::ControlCore,
    find_wall_client::FindWallClient,
    gate::PreconditionGate,
    odom_record_client::OdomRecordClient,
    odom_session::OdomSession,
    params::FollowExecParams,
    retry::RetryPolicy,
    scan_client::ScanClient,
    scheduler::ControlScheduler,
    wall_ctrl::WallCtrl,
    worker_pool::WorkerPool,
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "follow_exec", about = "Follow the wall on the right of the robot")]
struct Opts {
    /// Minimum level of log messages, one of info, debug or trace
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    /// Do not record the odometry of the run
    #[structopt(long)]
    no_telemetry: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("follow_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(opts.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Wall Follow Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opts);

    // ---- LOAD PARAMETERS ----

    let exec_params: FollowExecParams =
        util::params::load("follow_exec.toml").wrap_err("Could not load exec params")?;

    let tick_period = exec_params
        .tick_period()
        .ok_or_else(|| eyre!("tick_period_s must be positive"))?;
    let retry = RetryPolicy::fixed(
        exec_params
            .reconnect_interval()
            .ok_or_else(|| eyre!("reconnect_interval_s must be positive"))?,
    );

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut wall_ctrl = WallCtrl::default();
    wall_ctrl
        .init("wall_ctrl.toml", &session)
        .wrap_err("Failed to initialise WallCtrl")?;
    info!("WallCtrl init complete");

    let pool = match exec_params.num_workers {
        Some(n) => WorkerPool::new(n),
        None => WorkerPool::with_hardware_parallelism(),
    }
    .wrap_err("Failed to start the worker pool")?;
    info!("WorkerPool started with {} workers", pool.num_workers());

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let publisher = CmdVelPublisher::new(&zmq_ctx, &exec_params.net)
        .wrap_err("Failed to initialise the CmdVelPublisher")?;
    info!("CmdVelPublisher initialised");

    let core = ControlCore::new(
        wall_ctrl,
        Box::new(publisher),
        tick_period.as_secs_f64(),
    )
    .into_shared();

    let odom_session = if opts.no_telemetry {
        info!("Telemetry disabled, odometry will not be recorded");
        None
    } else {
        let client = OdomRecordClient::new(&zmq_ctx, &exec_params.net)
            .wrap_err("Failed to initialise the OdomRecordClient")?;
        let s = OdomSession::start(client, pool.handle(), retry)
            .wrap_err("Failed to start the odometry session")?;
        info!("OdomSession started");
        Some(s)
    };

    let find_wall_client = FindWallClient::new(&zmq_ctx, &exec_params.net)
        .wrap_err("Failed to initialise the FindWallClient")?;
    let gate = PreconditionGate::start(find_wall_client, core.clone(), pool.handle(), retry)
        .wrap_err("Failed to start the precondition gate")?;
    info!("PreconditionGate started");

    let mut scheduler = ControlScheduler::new(core, pool.handle(), tick_period);
    scheduler
        .start()
        .wrap_err("Failed to start the control scheduler")?;

    let trigger = scheduler.sensor_trigger();
    let scan_client = ScanClient::start(
        &zmq_ctx,
        &exec_params.net,
        exec_params.scan_indices(),
        move |obs| {
            if let Err(e) = trigger.on_observation(obs) {
                warn!("Could not post the sensor tick: {}", e);
            }
        },
    )
    .wrap_err("Failed to initialise the ScanClient")?;
    info!("ScanClient initialised");

    info!("Network initialisation complete\n");

    // ---- WAIT FOR STOP ----

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        stop_tx.try_send(()).ok();
    })
    .wrap_err("Failed to set the Ctrl-C handler")?;

    info!("Running, press Ctrl-C to stop\n");

    stop_rx
        .recv()
        .wrap_err("The stop signal channel was closed")?;

    // ---- SHUTDOWN ----

    info!("Stop requested");

    info!("{} sweeps received", scan_client.num_scans());
    scan_client.stop();
    info!(
        "Gate state at shutdown: {:?}",
        gate.state()
    );
    gate.stop();

    if let Some(s) = odom_session {
        let snapshot = s.snapshot();
        info!(
            "Odometry session at shutdown: {:?}, {} m travelled",
            snapshot.state(),
            snapshot.cumulative_distance_m()
        );
        s.stop();
    }

    scheduler.stop();
    pool.shutdown();

    info!("End of execution");

    session.exit();

    Ok(())
}
