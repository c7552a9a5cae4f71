//! Undistortion lookup tables.

use crate::camera::Intrinsics;
use crate::image::{sample_bilinear_u8, GrayImage, GrayImageView};

/// Per-pixel source coordinates for undistorting images of one camera.
///
/// The corrected image keeps the camera matrix of `intrinsics` and drops the
/// distortion term.
#[derive(Clone, Debug)]
pub struct RemapTable {
    pub width: usize,
    pub height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapTable {
    pub fn build(intrinsics: &Intrinsics, width: usize, height: usize) -> Self {
        let mut map_x = Vec::with_capacity(width * height);
        let mut map_y = Vec::with_capacity(width * height);
        for v in 0..height {
            for u in 0..width {
                let x = (u as f64 - intrinsics.cx) / intrinsics.fx;
                let y = (v as f64 - intrinsics.cy) / intrinsics.fy;
                let src = intrinsics.normalized_to_pixel(x, y);
                map_x.push(src.x as f32);
                map_y.push(src.y as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    /// Source pixel sampled for destination pixel `(u, v)`.
    pub fn source(&self, u: usize, v: usize) -> Option<(f32, f32)> {
        if u >= self.width || v >= self.height {
            return None;
        }
        let i = v * self.width + u;
        Some((self.map_x[i], self.map_y[i]))
    }

    /// Resample `src` through the table; pixels mapping outside `src` are black.
    pub fn apply(&self, src: &GrayImageView<'_>) -> GrayImage {
        let mut out = GrayImage::new(self.width, self.height);
        for (dst, (&x, &y)) in out
            .data
            .iter_mut()
            .zip(self.map_x.iter().zip(self.map_y.iter()))
        {
            *dst = sample_bilinear_u8(src, x, y);
        }
        out
    }
}
