//! The calibration result document.

use std::fs;
use std::path::Path;

use camcal_capture::CalibrationResult;
use camcal_core::{BoardSpec, Distortion, ExtrinsicPose, Intrinsics, PatternKind};
use serde::{Deserialize, Serialize};

use crate::error::ResultIoError;

/// Optional sections of the result document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Write the detected image points of every view.
    pub write_points: bool,
    /// Write per-view poses and reprojection errors.
    pub write_extrinsics: bool,
}

/// On-disk form of a calibration. Field order is the key order in the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub calibration_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nframes: Option<usize>,
    pub image_width: usize,
    pub image_height: usize,
    pub board_width: u32,
    pub board_height: u32,
    pub square_size: f64,
    #[serde(default)]
    pub pattern: PatternKind,
    #[serde(
        rename = "aspectRatio",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aspect_ratio: Option<f64>,
    pub flags: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags_summary: Option<String>,
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion_coefficients: [f64; 8],
    pub avg_reprojection_error: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_view_reprojection_errors: Option<Vec<f64>>,
    /// `[rx, ry, rz, tx, ty, tz]` per view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_parameters: Option<Vec<[f64; 6]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_points: Option<Vec<Vec<[f64; 2]>>>,
}

impl CalibrationRecord {
    pub fn from_result(result: &CalibrationResult, options: &OutputOptions) -> Self {
        let k = result.intrinsics();
        let board = result.board();
        let flags = result.flags();
        let (width, height) = result.image_size();

        Self {
            calibration_time: result.timestamp().format("%c").to_string(),
            nframes: options.write_extrinsics.then(|| result.view_count()),
            image_width: width,
            image_height: height,
            board_width: board.cols,
            board_height: board.rows,
            square_size: board.square_size,
            pattern: board.kind,
            aspect_ratio: result.aspect_ratio(),
            flags: flags.bits(),
            flags_summary: (!flags.is_empty()).then(|| flags.summary()),
            camera_matrix: k.k_rows(),
            distortion_coefficients: k.distortion.coeffs,
            avg_reprojection_error: result.total_avg_error(),
            per_view_reprojection_errors: options
                .write_extrinsics
                .then(|| result.per_view_errors().to_vec()),
            extrinsic_parameters: options
                .write_extrinsics
                .then(|| result.poses().iter().map(ExtrinsicPose::to_array).collect()),
            image_points: options.write_points.then(|| {
                result
                    .image_points()
                    .iter()
                    .map(|view| view.iter().map(|p| [p.x, p.y]).collect())
                    .collect()
            }),
        }
    }

    pub fn intrinsics(&self) -> Intrinsics {
        let m = &self.camera_matrix;
        Intrinsics::new(m[0][0], m[1][1], m[0][2], m[1][2])
            .with_distortion(Distortion::new(self.distortion_coefficients))
    }

    /// Per-view poses, when they were written.
    pub fn poses(&self) -> Option<Vec<ExtrinsicPose>> {
        self.extrinsic_parameters
            .as_ref()
            .map(|v| v.iter().copied().map(ExtrinsicPose::from_array).collect())
    }

    pub fn board(&self) -> Result<BoardSpec, ResultIoError> {
        Ok(BoardSpec::new(
            self.board_height,
            self.board_width,
            self.square_size,
            self.pattern,
        )?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ResultIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ResultIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Write `result` to `path` as a pretty JSON document.
pub fn save_result(
    result: &CalibrationResult,
    options: &OutputOptions,
    path: impl AsRef<Path>,
) -> Result<(), ResultIoError> {
    let path = path.as_ref();
    CalibrationRecord::from_result(result, options).write_json(path)?;
    log::info!("calibration saved to {}", path.display());
    Ok(())
}

/// Read a document written by [`save_result`].
pub fn load_result(path: impl AsRef<Path>) -> Result<CalibrationRecord, ResultIoError> {
    CalibrationRecord::load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CalibrationRecord {
        CalibrationRecord {
            calibration_time: "Sat Oct 17 12:00:00 2026".into(),
            nframes: None,
            image_width: 640,
            image_height: 480,
            board_width: 9,
            board_height: 6,
            square_size: 0.025,
            pattern: PatternKind::Chessboard,
            aspect_ratio: None,
            flags: 0,
            flags_summary: None,
            camera_matrix: [[800.0, 0.0, 320.0], [0.0, 790.0, 240.0], [0.0, 0.0, 1.0]],
            distortion_coefficients: [0.1, -0.05, 0.0, 0.0, 0.01, 0.0, 0.0, 0.0],
            avg_reprojection_error: 0.25,
            per_view_reprojection_errors: None,
            extrinsic_parameters: None,
            image_points: None,
        }
    }

    #[test]
    fn optional_sections_are_omitted() {
        let json = serde_json::to_value(record()).expect("json");
        let obj = json.as_object().expect("object");
        for key in [
            "nframes",
            "aspectRatio",
            "flags_summary",
            "per_view_reprojection_errors",
            "extrinsic_parameters",
            "image_points",
        ] {
            assert!(!obj.contains_key(key), "{key} should be absent");
        }
        assert_eq!(obj["flags"], 0);
    }

    #[test]
    fn keys_follow_document_order() {
        let mut rec = record();
        rec.nframes = Some(1);
        rec.aspect_ratio = Some(1.0);
        rec.flags = 2;
        rec.flags_summary = Some("+fix_aspectRatio".into());
        rec.per_view_reprojection_errors = Some(vec![0.25]);
        rec.extrinsic_parameters = Some(vec![[0.0; 6]]);
        rec.image_points = Some(vec![vec![[1.0, 2.0]]]);

        let text = serde_json::to_string(&rec).expect("json");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
        let keys: Vec<&str> = value
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            [
                "calibration_time",
                "nframes",
                "image_width",
                "image_height",
                "board_width",
                "board_height",
                "square_size",
                "pattern",
                "aspectRatio",
                "flags",
                "flags_summary",
                "camera_matrix",
                "distortion_coefficients",
                "avg_reprojection_error",
                "per_view_reprojection_errors",
                "extrinsic_parameters",
                "image_points",
            ]
        );
    }

    #[test]
    fn record_exposes_camera_and_board() {
        let rec = record();
        let k = rec.intrinsics();
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (800.0, 790.0, 320.0, 240.0));
        assert_eq!(k.distortion.k3(), 0.01);
        let board = rec.board().expect("board");
        assert_eq!((board.rows, board.cols), (6, 9));
        assert!(rec.poses().is_none());
    }
}
