//! Implementations for the WallCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use comms_if::eqpt::drive::VelocityCmd;
use log::{trace, warn};
use serde::Serialize;

// Internal
use super::{compute, CtrlBranch, Params, WallCtrlError};
use util::{archive::Archiver, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wall control module state
///
/// Holds the error carried between cycles. The struct itself is not
/// synchronised, the owner is responsible for serialising calls to `proc`.
#[derive(Default)]
pub struct WallCtrl {
    params: Params,

    /// Error used by the previous cycle
    last_error_m: f64,

    /// Error produced by the latest cycle
    current_error_m: f64,

    report: StatusReport,
    arch_report: Archiver,
}

/// Input data to Wall Control.
#[derive(Debug, Copy, Clone)]
pub struct InputData {
    /// Distance to the wall on the right
    pub lateral_m: f64,

    /// Distance to the nearest obstacle ahead
    pub forward_m: f64,

    /// Nominal control period, used by the derivative term
    pub period_s: f64,
}

/// Status report for WallCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug, PartialEq)]
pub struct StatusReport {
    pub branch: CtrlBranch,
    pub lateral_m: f64,
    pub forward_m: f64,
    pub error_m: f64,
    pub last_error_m: f64,
    pub linear_ms: f64,
    pub angular_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WallCtrl {
    /// Create a new controller from the given parameters, without archiving.
    pub fn new(params: Params) -> Result<Self, WallCtrlError> {
        params.validate()?;

        Ok(Self {
            params,
            ..Default::default()
        })
    }

    /// Error carried into the next cycle's derivative term.
    pub fn last_error_m(&self) -> f64 {
        self.last_error_m
    }

    pub fn current_error_m(&self) -> f64 {
        self.current_error_m
    }
}

impl State for WallCtrl {
    type InitData = &'static str;
    type InitError = WallCtrlError;

    type InputData = InputData;
    type OutputData = VelocityCmd;
    type StatusReport = StatusReport;
    type ProcError = WallCtrlError;

    /// Initialise the WallCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data).map_err(WallCtrlError::ParamLoadError)?;
        params.validate()?;
        self.params = params;

        self.arch_report = Archiver::from_path(session, "wall_ctrl/status_report.csv")
            .map_err(|e| WallCtrlError::ArchiveInitError(e.to_string()))?;

        Ok(())
    }

    /// Perform one cycle of Wall Control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if !(input_data.period_s > 0.0) {
            return Err(WallCtrlError::InvalidPeriod(input_data.period_s));
        }

        let out = compute(
            input_data.lateral_m,
            input_data.forward_m,
            self.last_error_m,
            input_data.period_s,
            &self.params,
        );

        self.report = StatusReport {
            branch: out.branch,
            lateral_m: input_data.lateral_m,
            forward_m: input_data.forward_m,
            error_m: out.error_m,
            last_error_m: self.last_error_m,
            linear_ms: out.cmd.linear_ms,
            angular_rads: out.cmd.angular_rads,
        };

        self.current_error_m = out.error_m;
        self.last_error_m = out.error_m;

        trace!("WallCtrl report: {:?}", self.report);

        if let Err(e) = self.arch_report.serialise(self.report) {
            warn!("Could not archive the WallCtrl status report: {}", e);
        }

        Ok((out.cmd, self.report))
    }

    fn safe_output(&self) -> Self::OutputData {
        VelocityCmd::zero()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn input(lateral_m: f64, forward_m: f64) -> InputData {
        InputData {
            lateral_m,
            forward_m,
            period_s: 0.1,
        }
    }

    #[test]
    fn test_error_carried_between_cycles() {
        let mut ctrl = WallCtrl::new(Params::default()).unwrap();

        let (cmd, report) = ctrl.proc(&input(0.31, 1.0)).unwrap();
        assert_eq!(report.branch, CtrlBranch::Pd);
        assert_eq!(report.last_error_m, 0.0);
        assert_eq!(cmd.angular_rads, -0.3);
        assert!((ctrl.last_error_m() - 0.06).abs() < 1e-9);

        // Same reading again, derivative term is now zero
        let (cmd, report) = ctrl.proc(&input(0.31, 1.0)).unwrap();
        assert!((report.last_error_m - 0.06).abs() < 1e-9);
        assert!((cmd.angular_rads + 0.18).abs() < 1e-9);
    }

    #[test]
    fn test_emergency_does_not_touch_error() {
        let mut ctrl = WallCtrl::new(Params::default()).unwrap();

        ctrl.proc(&input(0.35, 1.0)).unwrap();
        let error_m = ctrl.last_error_m();

        let (cmd, report) = ctrl.proc(&input(0.25, 0.1)).unwrap();
        assert_eq!(report.branch, CtrlBranch::Emergency);
        assert_eq!(cmd.linear_ms, 0.0);
        assert_eq!(cmd.angular_rads, 0.3);
        assert_eq!(ctrl.last_error_m(), error_m);
        assert_eq!(ctrl.current_error_m(), error_m);
    }

    #[test]
    fn test_invalid_period() {
        let mut ctrl = WallCtrl::new(Params::default()).unwrap();

        let result = ctrl.proc(&InputData {
            lateral_m: 0.3,
            forward_m: 1.0,
            period_s: 0.0,
        });

        assert!(matches!(result, Err(WallCtrlError::InvalidPeriod(_))));
        assert_eq!(ctrl.last_error_m(), 0.0);
    }

    #[test]
    fn test_safe_output_is_zero() {
        let ctrl = WallCtrl::new(Params::default()).unwrap();
        assert!(ctrl.safe_output().is_zero());
    }
}
