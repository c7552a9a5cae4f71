//! Core types and geometry for planar-target camera calibration.
//!
//! This crate is purely geometric. It does *not* detect patterns, decode
//! images or run a nonlinear optimizer; it defines the reference geometry of
//! a calibration board, the camera model used to score a fit, and the
//! linear building blocks (homographies, closed-form intrinsics) that a
//! solver can be assembled from.

mod board;
mod camera;
mod correspondence;
mod homography;
mod image;
mod logger;
mod planar;
mod remap;
mod reprojection;

pub use board::{generate_reference_points, BoardSpec, BoardSpecError, PatternKind};
pub use camera::{project_point, project_points, Distortion, ExtrinsicPose, Intrinsics};
pub use correspondence::{CorrespondenceSet, ObservedView};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use planar::{
    intrinsics_from_homographies, intrinsics_with_fixed_center, pose_from_homography,
    PlanarFitError,
};
pub use remap::RemapTable;
pub use reprojection::{evaluate_reprojection, ReprojectionError, ReprojectionErrors, ViewResidual};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
