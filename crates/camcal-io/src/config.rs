//! JSON configuration for the calibration tool.

use std::fs;
use std::path::{Path, PathBuf};

use camcal_capture::{CaptureConfig, RunnerOptions};
use camcal_core::BoardSpec;
use serde::{Deserialize, Serialize};

use crate::error::ResultIoError;
use crate::result::OutputOptions;

fn default_output_path() -> String {
    "out_camera_data.json".to_string()
}

/// Everything the command-line tool can be told, minus the input.
///
/// Command-line flags override values loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub board: Option<BoardSpec>,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub runner: RunnerOptions,
    #[serde(default)]
    pub output: OutputOptions,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default)]
    pub flip_vertical: bool,
    /// Treat the input as a video even if it parses as an image list.
    #[serde(default)]
    pub video: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            board: None,
            capture: CaptureConfig::default(),
            runner: RunnerOptions::default(),
            output: OutputOptions::default(),
            output_path: default_output_path(),
            flip_vertical: false,
            video: false,
        }
    }
}

impl CalibrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ResultIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ResultIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: CalibrationConfig = serde_json::from_str(
            r#"{
                "board": {"rows": 6, "cols": 9, "square_size": 0.02},
                "capture": {"min_delay": 250}
            }"#,
        )
        .expect("config");
        let board = cfg.board.expect("board");
        assert_eq!((board.rows, board.cols), (6, 9));
        assert_eq!(board.kind, camcal_core::PatternKind::Chessboard);
        assert_eq!(cfg.capture.min_delay, Duration::from_millis(250));
        assert_eq!(cfg.capture.target_frames, 10);
        assert_eq!(cfg.output_path(), PathBuf::from("out_camera_data.json"));
        assert!(!cfg.output.write_points);
    }
}
