//! File formats for camcal: calibration result documents, input image lists
//! and tool configuration. All files are JSON.

mod config;
mod error;
mod image_list;
mod result;

pub use config::CalibrationConfig;
pub use error::ResultIoError;
pub use image_list::{load_image_list, parse_image_list, write_image_list};
pub use result::{load_result, save_result, CalibrationRecord, OutputOptions};
