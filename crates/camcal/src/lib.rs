//! Camera calibration from views of a planar target.
//!
//! This crate provides:
//! - re-exports of the workspace crates (`core`, `capture`, `io`)
//! - a chessboard detector backed by `calib-targets`
//! - a closed-form planar solver (homographies + Zhang's linear method)
//! - frame sources for image lists, recorded video and (feature `v4l`) cameras
//! - the `camcal` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal::{ChessboardDetector, ImageListSource, PlanarLinearSolver};
//! use camcal::capture::{
//!     run_capture_loop, AcquisitionMode, CalibrationRunner, CaptureConfig, CaptureDevices,
//!     CaptureSession, LoopOptions, MonotonicClock, NoControl, RunnerOptions,
//! };
//! use camcal::core::{BoardSpec, PatternKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let board = BoardSpec::new(6, 9, 0.025, PatternKind::Chessboard)?;
//! let mut source = ImageListSource::new(["left01.jpg", "left02.jpg", "left03.jpg"]);
//! let config = CaptureConfig { target_frames: 3, ..CaptureConfig::default() };
//! let mut session = CaptureSession::new(board, AcquisitionMode::ImageList, config);
//! let runner = CalibrationRunner::new(PlanarLinearSolver::new(), RunnerOptions::default());
//!
//! let opts = LoopOptions::for_session(&session);
//! let summary = run_capture_loop(
//!     &mut session,
//!     &runner,
//!     CaptureDevices {
//!         source: &mut source,
//!         detector: &ChessboardDetector::default(),
//!         refiner: None,
//!         clock: &MonotonicClock::new(),
//!         control: &mut NoControl,
//!     },
//!     &mut (),
//!     opts,
//! )?;
//! if let Some(res) = summary.result {
//!     println!("rms = {:.3}", res.total_avg_error());
//! }
//! # Ok(())
//! # }
//! ```

pub use camcal_capture as capture;
pub use camcal_core as core;
pub use camcal_io as io;

mod detect;
mod refine;
mod solver;
mod source;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
mod control;

pub use detect::ChessboardDetector;
pub use refine::{SubpixParams, SubpixRefiner};
pub use solver::PlanarLinearSolver;
pub use source::{
    load_gray, open_video, to_gray, FrameDirSource, GifSource, ImageListSource,
};

#[cfg(feature = "v4l")]
pub use source::CameraSource;

#[cfg(feature = "cli")]
pub use control::TerminalControl;
