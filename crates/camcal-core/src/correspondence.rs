//! Per-view 2D observations paired with the shared board geometry.

use crate::board::{generate_reference_points, BoardSpec};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// One accepted detection: image points in canonical row-major board order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedView {
    pub view_index: usize,
    pub points: Vec<Point2<f64>>,
}

impl ObservedView {
    pub fn new(view_index: usize, points: Vec<Point2<f64>>) -> Self {
        Self { view_index, points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// All accepted views plus the single 3D reference set they share.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub object_points: Vec<Point3<f64>>,
    pub views: Vec<ObservedView>,
}

impl CorrespondenceSet {
    pub fn new(object_points: Vec<Point3<f64>>, views: Vec<ObservedView>) -> Self {
        Self {
            object_points,
            views,
        }
    }

    /// Pair `views` with the reference points of `board`.
    pub fn for_board(board: &BoardSpec, views: Vec<ObservedView>) -> Self {
        Self::new(generate_reference_points(board), views)
    }

    #[inline]
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn total_points(&self) -> usize {
        self.views.iter().map(ObservedView::len).sum()
    }

    /// The reference set replicated once per view.
    pub fn object_points_per_view(&self) -> Vec<Vec<Point3<f64>>> {
        vec![self.object_points.clone(); self.views.len()]
    }

    pub fn image_points_per_view(&self) -> Vec<Vec<Point2<f64>>> {
        self.views.iter().map(|v| v.points.clone()).collect()
    }
}
