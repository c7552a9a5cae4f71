use camcal_core::{BoardSpec, CorrespondenceSet, ObservedView};
use nalgebra::Point2;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("view has {got} points, board has {expected}")]
    PointCount { got: usize, expected: usize },
}

/// Accepted views of one capture cycle, in acceptance order.
#[derive(Clone, Debug)]
pub struct CorrespondenceStore {
    expected_points: usize,
    views: Vec<ObservedView>,
}

impl CorrespondenceStore {
    pub fn new(board: &BoardSpec) -> Self {
        Self {
            expected_points: board.point_count(),
            views: Vec::new(),
        }
    }

    /// Append a view; returns the number of stored views.
    pub fn push(&mut self, points: Vec<Point2<f64>>) -> Result<usize, StoreError> {
        if points.len() != self.expected_points {
            return Err(StoreError::PointCount {
                got: points.len(),
                expected: self.expected_points,
            });
        }
        let index = self.views.len();
        self.views.push(ObservedView::new(index, points));
        Ok(self.views.len())
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    #[inline]
    pub fn views(&self) -> &[ObservedView] {
        &self.views
    }

    /// Pair the stored views with the reference points of `board`.
    pub fn to_set(&self, board: &BoardSpec) -> CorrespondenceSet {
        CorrespondenceSet::for_board(board, self.views.clone())
    }
}
