//! Closed-form camera estimation from plane-induced homographies.
//!
//! These are the linear steps of Zhang's planar calibration: intrinsics
//! from the orthonormality constraints on `K^{-1} H`, then a per-view pose by
//! decomposing `H`. Distortion is not modelled here.

use crate::camera::{ExtrinsicPose, Intrinsics};
use crate::homography::Homography;
use nalgebra::{DMatrix, Matrix3, Rotation3, SVector, Vector3};

/// Linear planar fit failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlanarFitError {
    #[error("need at least {needed} views, got {got}")]
    NotEnoughViews { needed: usize, got: usize },
    #[error("degenerate view configuration: {0}")]
    Degenerate(&'static str),
}

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics with the zero-skew constraint.
///
/// Needs at least two homographies from non-parallel board poses.
pub fn intrinsics_from_homographies(hs: &[Homography]) -> Result<Intrinsics, PlanarFitError> {
    if hs.len() < 2 {
        return Err(PlanarFitError::NotEnoughViews {
            needed: 2,
            got: hs.len(),
        });
    }

    // Two rows per view plus the zero-skew row, padded for a full null space.
    let rows = (2 * hs.len() + 1).max(6);
    let mut v = DMatrix::<f64>::zeros(rows, 6);
    for (k, hom) in hs.iter().enumerate() {
        let h = hom.h / hom.h.norm();
        let v12 = v_ij(&h, 0, 1);
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }
    v[(2 * hs.len(), 1)] = 1.0;

    let svd = v.svd(false, true);
    let idx = svd.singular_values.imin();
    let v_t = svd
        .v_t
        .ok_or(PlanarFitError::Degenerate("svd did not converge"))?;
    let b = v_t.row(idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-300 || b11.abs() < 1e-300 {
        return Err(PlanarFitError::Degenerate("singular conic"));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if !(fx2 > 0.0 && fy2 > 0.0) {
        return Err(PlanarFitError::Degenerate("image of the absolute conic is not positive"));
    }

    let fx = fx2.sqrt();
    let fy = fy2.sqrt();
    let u0 = -b13 * fx2 / lambda;
    Ok(Intrinsics::new(fx, fy, u0, v0))
}

/// Focal lengths with the principal point held at `(cx, cy)`.
///
/// With `aspect_ratio = Some(r)` the fit is further constrained to
/// `fx = r * fy`. Works from a single view.
pub fn intrinsics_with_fixed_center(
    hs: &[Homography],
    cx: f64,
    cy: f64,
    aspect_ratio: Option<f64>,
) -> Result<Intrinsics, PlanarFitError> {
    if hs.is_empty() {
        return Err(PlanarFitError::NotEnoughViews { needed: 1, got: 0 });
    }

    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    // Unknowns a = 1/fx^2, b = 1/fy^2, one orthogonality and one equal-norm row per view.
    let mut a_rows: Vec<[f64; 2]> = Vec::with_capacity(2 * hs.len());
    let mut rhs: Vec<f64> = Vec::with_capacity(2 * hs.len());
    for hom in hs {
        let h = shift * hom.h;
        let h = h / h.norm();
        let (p, q) = (h.column(0), h.column(1));
        a_rows.push([p[0] * q[0], p[1] * q[1]]);
        rhs.push(-p[2] * q[2]);
        a_rows.push([p[0] * p[0] - q[0] * q[0], p[1] * p[1] - q[1] * q[1]]);
        rhs.push(-(p[2] * p[2] - q[2] * q[2]));
    }

    let (a, b) = match aspect_ratio {
        Some(r) => {
            let r2 = r * r;
            let (mut num, mut den) = (0.0, 0.0);
            for (row, y) in a_rows.iter().zip(&rhs) {
                let c = row[0] / r2 + row[1];
                num += c * y;
                den += c * c;
            }
            if den.abs() < 1e-300 {
                return Err(PlanarFitError::Degenerate("fronto-parallel views only"));
            }
            let b = num / den;
            (b / r2, b)
        }
        None => {
            let m = DMatrix::from_fn(a_rows.len(), 2, |i, j| a_rows[i][j]);
            let y = DMatrix::from_column_slice(rhs.len(), 1, &rhs);
            let ata = m.transpose() * &m;
            let aty = m.transpose() * y;
            let sol = ata
                .lu()
                .solve(&aty)
                .ok_or(PlanarFitError::Degenerate("focal lengths are not observable"))?;
            (sol[0], sol[1])
        }
    };

    if !(a > 0.0 && b > 0.0) {
        return Err(PlanarFitError::Degenerate("negative focal length estimate"));
    }
    Ok(Intrinsics::new(1.0 / a.sqrt(), 1.0 / b.sqrt(), cx, cy))
}

/// Decompose a board-to-image homography into a pose, given intrinsics.
///
/// The board is assumed to lie in front of the camera (`t.z > 0`).
pub fn pose_from_homography(
    intrinsics: &Intrinsics,
    hom: &Homography,
) -> Result<ExtrinsicPose, PlanarFitError> {
    let k_inv = intrinsics
        .k_matrix()
        .try_inverse()
        .ok_or(PlanarFitError::Degenerate("camera matrix is singular"))?;

    let r1 = k_inv * hom.h.column(0);
    let r2 = k_inv * hom.h.column(1);
    let t = k_inv * hom.h.column(2);

    let norm = 0.5 * (r1.norm() + r2.norm());
    if norm < 1e-300 {
        return Err(PlanarFitError::Degenerate("homography has zero scale"));
    }
    let mut lambda = 1.0 / norm;
    if t.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = r1 * lambda;
    let r2 = r2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    // Project onto SO(3).
    let svd = r.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(PlanarFitError::Degenerate("svd did not converge")),
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let translation: Vector3<f64> = t * lambda;
    Ok(ExtrinsicPose::from_rotation(
        &Rotation3::from_matrix_unchecked(r_orth),
        translation,
    ))
}
