//! Gradient-based sub-pixel refinement of chessboard corners.
//!
//! At a saddle point every image gradient `g(p)` in the neighbourhood is
//! orthogonal to `p - c`. The corner `c` is the least-squares solution of
//! `sum(g g^T) c = sum(g g^T p)`, iterated until it stops moving.

use camcal_capture::CornerRefiner;
use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Window half-size in pixels.
    pub half_window: u32,
    pub max_iters: u32,
    /// Stop once an update moves the corner less than this (pixels).
    pub epsilon: f64,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iters: 30,
            epsilon: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SubpixRefiner {
    params: SubpixParams,
}

impl SubpixRefiner {
    pub fn new(params: SubpixParams) -> Self {
        Self { params }
    }

    fn refine_one(&self, image: &GrayImageView<'_>, start: Point2<f64>) -> Point2<f64> {
        let hw = self.params.half_window as i32;
        let sigma = hw as f64 * 0.5;
        let inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);
        let at = |x: f32, y: f32| sample_bilinear(image, x, y) as f64;
        let mut c = start;

        for _ in 0..self.params.max_iters {
            let mut a = Matrix2::zeros();
            let mut b = Vector2::zeros();
            for dy in -hw..=hw {
                for dx in -hw..=hw {
                    let px = c.x + dx as f64;
                    let py = c.y + dy as f64;
                    let (xf, yf) = (px as f32, py as f32);
                    let gx = 0.5 * (at(xf + 1.0, yf) - at(xf - 1.0, yf));
                    let gy = 0.5 * (at(xf, yf + 1.0) - at(xf, yf - 1.0));
                    let w = (-((dx * dx + dy * dy) as f64) * inv_two_sigma2).exp();
                    let g = Vector2::new(gx, gy);
                    let ggt = g * g.transpose() * w;
                    a += ggt;
                    b += ggt * Vector2::new(px, py);
                }
            }

            let Some(a_inv) = a.try_inverse() else {
                break;
            };
            let next = a_inv * b;
            let step = (next - c.coords).norm();
            c = Point2::from(next);
            if step < self.params.epsilon {
                break;
            }
        }

        if (c - start).norm() > hw as f64 || !c.x.is_finite() || !c.y.is_finite() {
            start
        } else {
            c
        }
    }
}

impl CornerRefiner for SubpixRefiner {
    fn refine(&self, image: &GrayImageView<'_>, points: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
        points
            .into_iter()
            .map(|p| self.refine_one(image, p))
            .collect()
    }
}
