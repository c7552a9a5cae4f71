//! Capabilities the capture workflow depends on.
//!
//! Concrete implementations (corner detectors, solvers, cameras, terminals)
//! live outside this crate.

use std::time::{Duration, Instant};

use camcal_core::{BoardSpec, ExtrinsicPose, GrayImage, GrayImageView, Intrinsics};
use nalgebra::{Point2, Point3};

use crate::flags::CalibrationFlags;

/// Finds the calibration pattern in an image.
pub trait PatternDetector {
    /// Board points in canonical row-major order, or `None` when the full
    /// pattern is not visible.
    fn detect(&self, image: &GrayImageView<'_>, board: &BoardSpec) -> Option<Vec<Point2<f64>>>;
}

/// Sub-pixel refinement of chessboard corners.
pub trait CornerRefiner {
    fn refine(&self, image: &GrayImageView<'_>, points: Vec<Point2<f64>>) -> Vec<Point2<f64>>;
}

/// Everything a camera-parameter solver is given for one attempt.
#[derive(Clone, Debug)]
pub struct SolverRequest {
    /// Board reference points, replicated once per view.
    pub object_points: Vec<Vec<Point3<f64>>>,
    pub image_points: Vec<Vec<Point2<f64>>>,
    /// `(width, height)` in pixels.
    pub image_size: (usize, usize),
    pub flags: CalibrationFlags,
    /// Starting camera matrix. Under `FIX_ASPECT_RATIO` the ratio is
    /// `fx / fy` of this guess; under `FIX_PRINCIPAL_POINT` its center is kept.
    pub initial: Intrinsics,
}

impl SolverRequest {
    #[inline]
    pub fn view_count(&self) -> usize {
        self.image_points.len()
    }
}

/// Fitted parameters as reported by a solver.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverOutput {
    /// RMS error as computed by the solver itself.
    pub rms: f64,
    pub intrinsics: Intrinsics,
    pub poses: Vec<ExtrinsicPose>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("solver needs at least {needed} views, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("solver failed: {0}")]
    Failed(String),
}

/// Fits intrinsics and per-view poses to 2D-3D correspondences.
pub trait ParameterSolver {
    fn fit(&self, request: &SolverRequest) -> Result<SolverOutput, SolverError>;
}

impl<S: ParameterSolver + ?Sized> ParameterSolver for &S {
    fn fit(&self, request: &SolverRequest) -> Result<SolverOutput, SolverError> {
        (**self).fit(request)
    }
}

/// One decoded frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: GrayImage,
    /// Capture time relative to the start of the stream, when known.
    pub timestamp: Option<Duration>,
}

impl Frame {
    pub fn new(image: GrayImage) -> Self {
        Self {
            image,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("cannot open {what}: {reason}")]
    Open { what: String, reason: String },
    #[error("cannot decode {what}: {reason}")]
    Decode { what: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Produces frames until the stream is exhausted (`Ok(None)`).
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Number of frames, if the source is finite and knows it.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Monotonic time since some fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// User commands delivered between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    /// Clear collected views and start capturing.
    StartCapture,
    /// Toggle the undistorted preview.
    ToggleUndistort,
    Quit,
}

pub trait ControlInput {
    /// Wait at most `timeout` for the next command.
    fn poll(&mut self, timeout: Duration) -> Option<ControlSignal>;
}

/// Control channel that never delivers anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoControl;

impl ControlInput for NoControl {
    fn poll(&mut self, _timeout: Duration) -> Option<ControlSignal> {
        None
    }
}
