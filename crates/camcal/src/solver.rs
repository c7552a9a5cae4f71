//! Closed-form planar solver.
//!
//! Homography per view, Zhang's linear intrinsics, pose from homography.
//! Distortion is left at zero; there is no iterative refinement.

use camcal_capture::{CalibrationFlags, ParameterSolver, SolverError, SolverOutput, SolverRequest};
use camcal_core::{
    estimate_homography, intrinsics_from_homographies, intrinsics_with_fixed_center,
    pose_from_homography, project_points, Homography, Intrinsics, PlanarFitError,
};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Linear camera fit from planar views.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanarLinearSolver;

impl PlanarLinearSolver {
    pub fn new() -> Self {
        Self
    }

    fn homographies(request: &SolverRequest) -> Result<Vec<Homography>, SolverError> {
        request
            .object_points
            .iter()
            .zip(&request.image_points)
            .enumerate()
            .map(|(i, (obj, img))| {
                let plane: Vec<Point2<f64>> = obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
                estimate_homography(&plane, img)
                    .ok_or_else(|| SolverError::Failed(format!("no homography for view {i}")))
            })
            .collect()
    }

    fn intrinsics(request: &SolverRequest, hs: &[Homography]) -> Result<Intrinsics, SolverError> {
        let init = &request.initial;
        let aspect = request
            .flags
            .contains(CalibrationFlags::FIX_ASPECT_RATIO)
            .then(|| init.fx / init.fy);

        if request.flags.contains(CalibrationFlags::FIX_PRINCIPAL_POINT) {
            return intrinsics_with_fixed_center(hs, init.cx, init.cy, aspect).map_err(planar_err);
        }

        let mut k = intrinsics_from_homographies(hs).map_err(planar_err)?;
        if let Some(ratio) = aspect {
            // Keep the geometric mean focal length, impose fx / fy.
            let mean = (k.fx * k.fy).sqrt();
            k.fy = mean / ratio.sqrt();
            k.fx = ratio * k.fy;
        }
        Ok(k)
    }
}

fn planar_err(err: PlanarFitError) -> SolverError {
    match err {
        PlanarFitError::NotEnoughViews { needed, got } => {
            SolverError::NotEnoughViews { needed, got }
        }
        other => SolverError::Failed(other.to_string()),
    }
}

impl ParameterSolver for PlanarLinearSolver {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(views = request.view_count()))
    )]
    fn fit(&self, request: &SolverRequest) -> Result<SolverOutput, SolverError> {
        let hs = Self::homographies(request)?;
        let intrinsics = Self::intrinsics(request, &hs)?;
        log::debug!(
            "linear fit: fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy
        );

        let poses = hs
            .iter()
            .map(|h| pose_from_homography(&intrinsics, h))
            .collect::<Result<Vec<_>, _>>()
            .map_err(planar_err)?;

        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for ((obj, img), pose) in request
            .object_points
            .iter()
            .zip(&request.image_points)
            .zip(&poses)
        {
            let proj = project_points(&intrinsics, pose, obj);
            sum_sq += img
                .iter()
                .zip(&proj)
                .map(|(a, b)| (a - b).norm_squared())
                .sum::<f64>();
            count += img.len();
        }
        let rms = if count > 0 {
            (sum_sq / count as f64).sqrt()
        } else {
            0.0
        };

        Ok(SolverOutput {
            rms,
            intrinsics,
            poses,
        })
    }
}
