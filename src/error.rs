use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error kinds raised by the analysis core.
///
/// `Metric` failures are recoverable per region (the offending row is
/// filled with NaN); `InputShape` and `Io` are fatal for the image that
/// produced them and surface as failure events from the batch runner.
#[derive(Debug, Error)]
pub enum FibreError {
	#[error("IO error: {0}")]
	Io(#[from] io::Error),
	#[error("Image decoding error: {0}")]
	Image(#[from] image::ImageError),
	#[error("Input shape error: {0}")]
	InputShape(String),
	#[error("Preprocess error: {0}")]
	Preprocess(String),
	#[error("Extraction error: {0}")]
	Extraction(String),
	#[error("Segmentation error: {0}")]
	Segmentation(String),
	#[error("Metric error: {0}")]
	Metric(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Invalid parameter: {0}")]
	InvalidParameter(String),
	#[error("File not found: {}", .0.display())]
	FileNotFound(PathBuf),
}

impl From<serde_json::Error> for FibreError {
	fn from(err: serde_json::Error) -> Self {
		FibreError::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, FibreError>;
