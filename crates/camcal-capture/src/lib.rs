//! Interactive capture workflow for planar-target calibration.
//!
//! The crate decides which observed views are admitted ([`CaptureSession`]),
//! keeps them in a [`CorrespondenceStore`], and turns them into a validated
//! [`CalibrationResult`] through a [`CalibrationRunner`]. Pattern detection,
//! parameter fitting, frame acquisition and keyboard input are reached only
//! through the traits in [`traits`], so every collaborator can be replaced by
//! a deterministic stub.
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal_capture::{
//!     AcquisitionMode, CalibrationRunner, CaptureConfig, CaptureSession, RunnerOptions,
//! };
//! use camcal_core::{BoardSpec, PatternKind};
//! # fn solver() -> impl camcal_capture::ParameterSolver {
//! #     let s: &'static dyn camcal_capture::ParameterSolver = unimplemented!();
//! #     s
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = BoardSpec::new(6, 9, 0.025, PatternKind::Chessboard)?;
//! let config = CaptureConfig::default();
//! let mut session = CaptureSession::new(board, AcquisitionMode::ImageList, config);
//! let runner = CalibrationRunner::new(solver(), RunnerOptions::default());
//! // feed `session.observe(..)` with detections, then:
//! if let Some(attempt) = session.finish(&runner, (640, 480)) {
//!     println!("rms = {:.3}", attempt?.total_avg_error());
//! }
//! # Ok(())
//! # }
//! ```

mod flags;
mod pipeline;
mod runner;
mod session;
mod store;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use flags::CalibrationFlags;
pub use pipeline::{
    run_capture_loop, CaptureDevices, CaptureObserver, LoopExit, LoopOptions, LoopSummary,
};
pub use runner::{
    attempt_status, CalibrationError, CalibrationResult, CalibrationRunner, RunnerOptions,
};
pub use session::{AcquisitionMode, CaptureConfig, CaptureSession, CaptureState, FrameOutcome};
pub use store::{CorrespondenceStore, StoreError};
pub use traits::{
    Clock, ControlInput, ControlSignal, CornerRefiner, Frame, FrameSource, MonotonicClock,
    NoControl, ParameterSolver, PatternDetector, SolverError, SolverOutput, SolverRequest,
    SourceError,
};
