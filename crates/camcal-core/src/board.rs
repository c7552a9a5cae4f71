//! Board specification and canonical reference geometry.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Layout of the calibration target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Inner corners of a chessboard.
    #[default]
    Chessboard,
    /// Symmetric grid of circle centers.
    CirclesGrid,
    /// Staggered grid: every odd row is shifted by half a pitch.
    AsymmetricCirclesGrid,
}

impl PatternKind {
    /// Short name accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Chessboard => "chessboard",
            PatternKind::CirclesGrid => "circles",
            PatternKind::AsymmetricCirclesGrid => "acircles",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = BoardSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chessboard" => Ok(PatternKind::Chessboard),
            "circles" => Ok(PatternKind::CirclesGrid),
            "acircles" => Ok(PatternKind::AsymmetricCirclesGrid),
            other => Err(BoardSpecError::InvalidPatternKind(other.to_string())),
        }
    }
}

/// Board specification validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BoardSpecError {
    #[error("rows and cols must be >= 1 (got {rows}x{cols})")]
    InvalidSize { rows: u32, cols: u32 },
    #[error("square_size must be finite and > 0 (got {0})")]
    InvalidSquareSize(f64),
    #[error("invalid pattern type `{0}`: must be chessboard, circles or acircles")]
    InvalidPatternKind(String),
}

/// Static description of a planar calibration target.
///
/// `cols` is the board width (points per row) and `rows` the board height,
/// both counted in detectable points (inner corners or circle centers).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub rows: u32,
    pub cols: u32,
    pub square_size: f64,
    #[serde(default)]
    pub kind: PatternKind,
}

impl BoardSpec {
    /// Validate and create a board specification.
    pub fn new(
        rows: u32,
        cols: u32,
        square_size: f64,
        kind: PatternKind,
    ) -> Result<Self, BoardSpecError> {
        let spec = Self {
            rows,
            cols,
            square_size,
            kind,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the invariants of a spec built by hand or deserialized.
    pub fn validate(&self) -> Result<(), BoardSpecError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(BoardSpecError::InvalidSize {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if !self.square_size.is_finite() || self.square_size <= 0.0 {
            return Err(BoardSpecError::InvalidSquareSize(self.square_size));
        }
        Ok(())
    }

    /// Number of points a complete detection of this board yields.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

/// Canonical 3D reference points of one view, on the `z = 0` board plane.
///
/// Points are enumerated row-major: `row ∈ [0, rows)`, `col ∈ [0, cols)`.
/// Detector output must use the same order.
pub fn generate_reference_points(spec: &BoardSpec) -> Vec<Point3<f64>> {
    let s = spec.square_size;
    let mut out = Vec::with_capacity(spec.point_count());
    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let x = match spec.kind {
                PatternKind::Chessboard | PatternKind::CirclesGrid => col as f64,
                PatternKind::AsymmetricCirclesGrid => (2 * col + row % 2) as f64,
            };
            out.push(Point3::new(x * s, row as f64 * s, 0.0));
        }
    }
    out
}
