//! Chessboard detection backed by `calib-targets`.

use calib_targets::chessboard::ChessboardParams;
use calib_targets::detect;
use camcal_capture::PatternDetector;
use camcal_core::{BoardSpec, GrayImageView, PatternKind};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// ChESS corners plus grid fitting, reduced to a full row-major board.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }
}

impl PatternDetector for ChessboardDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = image.width, h = image.height))
    )]
    fn detect(&self, image: &GrayImageView<'_>, board: &BoardSpec) -> Option<Vec<Point2<f64>>> {
        if board.kind != PatternKind::Chessboard {
            return None;
        }
        let img = ::image::GrayImage::from_raw(
            image.width as u32,
            image.height as u32,
            image.data.to_vec(),
        )?;
        let chess_cfg = detect::default_chess_config();
        let found = detect::detect_chessboard(&img, &chess_cfg, self.params.clone())?;
        let labelled: Vec<_> = found
            .detection
            .corners
            .iter()
            .filter_map(|c| {
                let g = c.grid?;
                Some((g.i, g.j, Point2::new(c.position.x as f64, c.position.y as f64)))
            })
            .collect();
        let points = order_grid_corners(labelled, board);
        if points.is_none() {
            log::debug!(
                "grid of {} corners does not match a {}x{} board",
                found.detection.corners.len(),
                board.cols,
                board.rows
            );
        }
        points
    }
}

/// Arrange `(i, j, position)` grid corners as `rows x cols` in row-major
/// order.
///
/// The grid may be detected transposed; it is accepted either way as long as
/// every cell is present exactly once.
pub(crate) fn order_grid_corners(
    labelled: Vec<(i32, i32, Point2<f64>)>,
    board: &BoardSpec,
) -> Option<Vec<Point2<f64>>> {
    let (rows, cols) = (board.rows as usize, board.cols as usize);
    if labelled.len() != rows * cols {
        return None;
    }

    let min_i = labelled.iter().map(|c| c.0).min()?;
    let min_j = labelled.iter().map(|c| c.1).min()?;
    let span_i = (labelled.iter().map(|c| c.0).max()? - min_i + 1) as usize;
    let span_j = (labelled.iter().map(|c| c.1).max()? - min_j + 1) as usize;

    // `i` runs along a row unless the grid came out transposed.
    let transposed = if (span_i, span_j) == (cols, rows) {
        false
    } else if (span_i, span_j) == (rows, cols) {
        true
    } else {
        return None;
    };

    let mut out: Vec<Option<Point2<f64>>> = vec![None; rows * cols];
    for (i, j, p) in labelled {
        let (col, row) = if transposed {
            ((j - min_j) as usize, (i - min_i) as usize)
        } else {
            ((i - min_i) as usize, (j - min_j) as usize)
        };
        let slot = &mut out[row * cols + col];
        if slot.is_some() {
            return None;
        }
        *slot = Some(p);
    }
    out.into_iter().collect()
}
