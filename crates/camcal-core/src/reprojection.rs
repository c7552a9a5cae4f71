//! Reprojection error scoring of a fitted camera.

use crate::camera::{project_points, ExtrinsicPose, Intrinsics};
use crate::correspondence::CorrespondenceSet;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReprojectionError {
    #[error("got {poses} poses for {views} views")]
    PoseCountMismatch { poses: usize, views: usize },
    #[error("view {view} has {got} points, board has {expected}")]
    PointCountMismatch {
        view: usize,
        got: usize,
        expected: usize,
    },
}

/// RMS reprojection errors in pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionErrors {
    /// Pooled RMS over every point of every view.
    pub total_rms: f64,
    /// RMS of each view, in view order.
    pub per_view: Vec<f64>,
}

/// Squared residual sum of one view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewResidual {
    pub sum_sq: f64,
    pub points: usize,
}

impl ReprojectionErrors {
    /// Aggregate per-view residual sums into per-view and pooled RMS.
    pub fn from_residuals(residuals: &[ViewResidual]) -> Self {
        let per_view = residuals
            .iter()
            .map(|r| {
                if r.points > 0 {
                    (r.sum_sq / r.points as f64).sqrt()
                } else {
                    0.0
                }
            })
            .collect();
        let total_sq: f64 = residuals.iter().map(|r| r.sum_sq).sum();
        let total_points: usize = residuals.iter().map(|r| r.points).sum();
        let total_rms = if total_points > 0 {
            (total_sq / total_points as f64).sqrt()
        } else {
            0.0
        };
        Self {
            total_rms,
            per_view,
        }
    }
}

/// Project the board through each view's pose and compare with observations.
///
/// With `e_i` the L2 norm of all residuals of view `i` over `n_i` points,
/// `per_view[i] = sqrt(e_i^2 / n_i)` and
/// `total_rms = sqrt(sum(e_i^2) / sum(n_i))`. The total is a pooled RMS,
/// not the mean of the per-view values.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(views = set.views.len()))
)]
pub fn evaluate_reprojection(
    set: &CorrespondenceSet,
    intrinsics: &Intrinsics,
    poses: &[ExtrinsicPose],
) -> Result<ReprojectionErrors, ReprojectionError> {
    if poses.len() != set.views.len() {
        return Err(ReprojectionError::PoseCountMismatch {
            poses: poses.len(),
            views: set.views.len(),
        });
    }

    let mut residuals = Vec::with_capacity(set.views.len());
    for (i, (view, pose)) in set.views.iter().zip(poses).enumerate() {
        let n = view.points.len();
        if n != set.object_points.len() {
            return Err(ReprojectionError::PointCountMismatch {
                view: i,
                got: n,
                expected: set.object_points.len(),
            });
        }

        let projected = project_points(intrinsics, pose, &set.object_points);
        let err_sq: f64 = view
            .points
            .iter()
            .zip(&projected)
            .map(|(obs, proj)| (obs - proj).norm_squared())
            .sum();

        residuals.push(ViewResidual {
            sum_sq: err_sq,
            points: n,
        });
    }

    let errs = ReprojectionErrors::from_residuals(&residuals);
    log::debug!(
        "reprojection: {} views, rms {:.4}",
        errs.per_view.len(),
        errs.total_rms
    );
    Ok(errs)
}
