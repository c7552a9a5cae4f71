//! Pinhole camera with rational radial + tangential distortion.
//!
//! The distortion vector follows the common 8-element layout
//! `[k1, k2, p1, p2, k3, k4, k5, k6]`.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Lens distortion coefficients `[k1, k2, p1, p2, k3, k4, k5, k6]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub coeffs: [f64; 8],
}

impl Distortion {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn new(coeffs: [f64; 8]) -> Self {
        Self { coeffs }
    }

    #[inline]
    pub fn k1(&self) -> f64 {
        self.coeffs[0]
    }
    #[inline]
    pub fn k2(&self) -> f64 {
        self.coeffs[1]
    }
    #[inline]
    pub fn p1(&self) -> f64 {
        self.coeffs[2]
    }
    #[inline]
    pub fn p2(&self) -> f64 {
        self.coeffs[3]
    }
    #[inline]
    pub fn k3(&self) -> f64 {
        self.coeffs[4]
    }
    #[inline]
    pub fn k4(&self) -> f64 {
        self.coeffs[5]
    }
    #[inline]
    pub fn k5(&self) -> f64 {
        self.coeffs[6]
    }
    #[inline]
    pub fn k6(&self) -> f64 {
        self.coeffs[7]
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|c| *c == 0.0)
    }

    /// Apply distortion to normalized image coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = self.radial_factor(r2);
        let (dx, dy) = self.tangential(x, y, r2);
        (x * radial + dx, y * radial + dy)
    }

    fn radial_factor(&self, r2: f64) -> f64 {
        let num = 1.0 + ((self.k3() * r2 + self.k2()) * r2 + self.k1()) * r2;
        let den = 1.0 + ((self.k6() * r2 + self.k5()) * r2 + self.k4()) * r2;
        num / den
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        let (p1, p2) = (self.p1(), self.p2());
        (
            2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }
}

/// Camera intrinsics: focal lengths, principal point and distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::zero(),
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    /// 3x3 camera matrix `K`.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Build from a camera matrix, ignoring any skew term.
    pub fn from_k_matrix(k: &Matrix3<f64>, distortion: Distortion) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            distortion,
        }
    }

    /// Row-major `K` as nested arrays.
    pub fn k_rows(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// All scalar parameters, camera matrix entries first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        [self.fx, self.fy, self.cx, self.cy]
            .into_iter()
            .chain(self.distortion.coeffs)
    }

    pub fn is_finite(&self) -> bool {
        self.values().all(f64::is_finite)
    }

    /// Normalized coordinates to pixel coordinates (distortion applied).
    pub fn normalized_to_pixel(&self, x: f64, y: f64) -> Point2<f64> {
        let (xd, yd) = self.distortion.distort(x, y);
        Point2::new(self.fx * xd + self.cx, self.fy * yd + self.cy)
    }
}

/// Rigid transform from board coordinates into camera coordinates.
///
/// `rotation` is an axis-angle (Rodrigues) vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicPose {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl ExtrinsicPose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: rotation.scaled_axis(),
            translation,
        }
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::new(self.rotation)
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation_matrix() * p + self.translation
    }

    /// `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn from_array(v: [f64; 6]) -> Self {
        Self::new(
            Vector3::new(v[0], v[1], v[2]),
            Vector3::new(v[3], v[4], v[5]),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Project one board point into the image.
#[inline]
pub fn project_point(
    intrinsics: &Intrinsics,
    pose: &ExtrinsicPose,
    p: &Point3<f64>,
) -> Point2<f64> {
    let pc = pose.transform(p);
    let z = if pc.z.abs() > f64::EPSILON { pc.z } else { 1.0 };
    intrinsics.normalized_to_pixel(pc.x / z, pc.y / z)
}

/// Project a set of board points through one pose.
pub fn project_points(
    intrinsics: &Intrinsics,
    pose: &ExtrinsicPose,
    points: &[Point3<f64>],
) -> Vec<Point2<f64>> {
    let r = pose.rotation_matrix();
    points
        .iter()
        .map(|p| {
            let pc = r * p + pose.translation;
            let z = if pc.z.abs() > f64::EPSILON { pc.z } else { 1.0 };
            intrinsics.normalized_to_pixel(pc.x / z, pc.y / z)
        })
        .collect()
}
