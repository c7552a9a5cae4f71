//! One calibration attempt: assemble correspondences, fit, validate, score.

use camcal_core::{
    evaluate_reprojection, BoardSpec, ExtrinsicPose, Intrinsics, ObservedView, ReprojectionError,
};
use chrono::{DateTime, Local};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::flags::CalibrationFlags;
use crate::traits::{ParameterSolver, SolverError, SolverRequest};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest magnitude accepted for any fitted parameter.
const MAX_PARAM_ABS: f64 = 1e12;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no views to calibrate from")]
    NoViews,
    #[error("solver error: {0}")]
    Solver(String),
    #[error("solver returned {poses} poses for {views} views")]
    PoseCountMismatch { poses: usize, views: usize },
    #[error("fitted parameters are out of range")]
    DegenerateFit,
    #[error(transparent)]
    Reprojection(#[from] ReprojectionError),
}

impl From<SolverError> for CalibrationError {
    fn from(err: SolverError) -> Self {
        Self::Solver(err.to_string())
    }
}

/// User-selected fitting constraints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Fixed `fx / fy`, when set.
    pub aspect_ratio: Option<f64>,
    pub fix_principal_point: bool,
    pub zero_tangent_dist: bool,
}

impl RunnerOptions {
    /// Flags requested by these options, as recorded in the result.
    pub fn flags(&self) -> CalibrationFlags {
        let mut flags = CalibrationFlags::NONE;
        if self.aspect_ratio.is_some() {
            flags |= CalibrationFlags::FIX_ASPECT_RATIO;
        }
        if self.fix_principal_point {
            flags |= CalibrationFlags::FIX_PRINCIPAL_POINT;
        }
        if self.zero_tangent_dist {
            flags |= CalibrationFlags::ZERO_TANGENT_DIST;
        }
        flags
    }
}

/// Outcome of a successful attempt. Built only by [`CalibrationRunner::run`].
#[derive(Clone, Debug)]
pub struct CalibrationResult {
    intrinsics: Intrinsics,
    poses: Vec<ExtrinsicPose>,
    per_view_errors: Vec<f64>,
    total_avg_error: f64,
    solver_rms: f64,
    flags: CalibrationFlags,
    aspect_ratio: Option<f64>,
    board: BoardSpec,
    image_size: (usize, usize),
    timestamp: DateTime<Local>,
    image_points: Vec<Vec<Point2<f64>>>,
}

impl CalibrationResult {
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn poses(&self) -> &[ExtrinsicPose] {
        &self.poses
    }

    pub fn per_view_errors(&self) -> &[f64] {
        &self.per_view_errors
    }

    /// Pooled RMS reprojection error in pixels.
    pub fn total_avg_error(&self) -> f64 {
        self.total_avg_error
    }

    /// RMS as reported by the solver, for diagnostics.
    pub fn solver_rms(&self) -> f64 {
        self.solver_rms
    }

    pub fn flags(&self) -> CalibrationFlags {
        self.flags
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        self.aspect_ratio
    }

    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    pub fn image_points(&self) -> &[Vec<Point2<f64>>] {
        &self.image_points
    }

    pub fn view_count(&self) -> usize {
        self.poses.len()
    }
}

/// Status line printed after every attempt.
pub fn attempt_status(attempt: &Result<CalibrationResult, CalibrationError>) -> String {
    match attempt {
        Ok(res) => format!(
            "Calibration succeeded. avg reprojection error = {:.2}",
            res.total_avg_error()
        ),
        Err(_) => "Calibration failed. avg reprojection error = 0.00".to_string(),
    }
}

/// Runs calibration attempts with a fixed solver and option set.
#[derive(Clone, Debug)]
pub struct CalibrationRunner<S> {
    solver: S,
    options: RunnerOptions,
}

impl<S: ParameterSolver> CalibrationRunner<S> {
    pub fn new(solver: S, options: RunnerOptions) -> Self {
        Self { solver, options }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Fit the camera to `views` of `board`. Not retried on failure.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = views.len()))
    )]
    pub fn run(
        &self,
        views: &[ObservedView],
        board: &BoardSpec,
        image_size: (usize, usize),
    ) -> Result<CalibrationResult, CalibrationError> {
        if views.is_empty() {
            return Err(CalibrationError::NoViews);
        }

        let set = camcal_core::CorrespondenceSet::for_board(board, views.to_vec());
        let flags = self.options.flags();
        // The solver never fits k4/k5.
        let solver_flags = flags | CalibrationFlags::FIX_K4 | CalibrationFlags::FIX_K5;
        let request = SolverRequest {
            object_points: set.object_points_per_view(),
            image_points: set.image_points_per_view(),
            image_size,
            flags: solver_flags,
            initial: self.initial_guess(image_size),
        };

        let output = self.solver.fit(&request)?;
        log::info!("RMS error reported by solver: {:.6}", output.rms);

        if output.poses.len() != views.len() {
            return Err(CalibrationError::PoseCountMismatch {
                poses: output.poses.len(),
                views: views.len(),
            });
        }

        let intrinsics = apply_fixed_terms(output.intrinsics, solver_flags);
        if !parameters_in_range(&intrinsics, &output.poses) {
            log::warn!("rejecting fit: parameters out of range");
            return Err(CalibrationError::DegenerateFit);
        }

        let errors = evaluate_reprojection(&set, &intrinsics, &output.poses)?;
        log::info!(
            "calibrated from {} views: rms {:.4} px",
            views.len(),
            errors.total_rms
        );

        Ok(CalibrationResult {
            intrinsics,
            poses: output.poses,
            per_view_errors: errors.per_view,
            total_avg_error: errors.total_rms,
            solver_rms: output.rms,
            flags,
            aspect_ratio: self.options.aspect_ratio,
            board: *board,
            image_size,
            timestamp: Local::now(),
            image_points: request.image_points,
        })
    }

    fn initial_guess(&self, image_size: (usize, usize)) -> Intrinsics {
        let fx = self.options.aspect_ratio.unwrap_or(1.0);
        Intrinsics::new(
            fx,
            1.0,
            image_size.0 as f64 * 0.5,
            image_size.1 as f64 * 0.5,
        )
    }
}

fn apply_fixed_terms(mut intrinsics: Intrinsics, flags: CalibrationFlags) -> Intrinsics {
    let c = &mut intrinsics.distortion.coeffs;
    if flags.contains(CalibrationFlags::FIX_K4) {
        c[5] = 0.0;
    }
    if flags.contains(CalibrationFlags::FIX_K5) {
        c[6] = 0.0;
    }
    if flags.contains(CalibrationFlags::ZERO_TANGENT_DIST) {
        c[2] = 0.0;
        c[3] = 0.0;
    }
    intrinsics
}

fn parameters_in_range(intrinsics: &Intrinsics, poses: &[ExtrinsicPose]) -> bool {
    let in_range = |v: f64| v.is_finite() && v.abs() <= MAX_PARAM_ABS;
    intrinsics.fx > 0.0
        && intrinsics.fy > 0.0
        && intrinsics.values().all(in_range)
        && poses.iter().all(|p| p.to_array().into_iter().all(in_range))
}
