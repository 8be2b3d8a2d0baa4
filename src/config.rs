use crate::constants::{analysis, filters, fire, preprocess, runner};
use crate::error::{FibreError, Result};

/// Parameters controlling the FIRE network extraction.
#[derive(Debug, Clone, Copy)]
pub struct FireParams {
	pub nuc_thresh: f64,
	pub lmp_thresh: f64,
	pub angle_thresh: f64,
	pub r_thresh: f64,
	pub nuc_radius: usize,
}

impl Default for FireParams {
	fn default() -> Self {
		Self {
			nuc_thresh: fire::NUC_THRESH,
			lmp_thresh: fire::LMP_THRESH,
			angle_thresh: fire::ANGLE_THRESH,
			r_thresh: fire::R_THRESH,
			nuc_radius: fire::NUC_RADIUS,
		}
	}
}

impl FireParams {
	/// Angular acceptance derived from `angle_thresh`; branches survive when
	/// |cos(theta) + 1| stays below this bound.
	pub fn theta_thresh(&self) -> f64 {
		((180.0 - self.angle_thresh) * std::f64::consts::PI / 180.0).cos() + 1.0
	}
}

/// Runtime options for a batch analysis.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
	pub sigma: f64,
	pub alpha: f64,
	pub p_intensity: (f64, f64),
	pub p_denoise: (usize, usize),
	pub fire: FireParams,
	pub scale: f64,
	pub clean_r_thresh: f64,
	pub ow_network: bool,
	pub ow_segment: bool,
	pub ow_metric: bool,
	pub save_figures: bool,
	pub workers: usize,
}

impl Default for AnalysisConfig {
	fn default() -> Self {
		Self {
			sigma: filters::DEFAULT_SIGMA,
			alpha: filters::DEFAULT_ALPHA,
			p_intensity: (preprocess::P_INTENSITY_LOW, preprocess::P_INTENSITY_HIGH),
			p_denoise: (preprocess::NL_PATCH_SIZE, preprocess::NL_PATCH_DISTANCE),
			fire: FireParams::default(),
			scale: 1.0,
			clean_r_thresh: analysis::CLEAN_R_THRESH,
			ow_network: false,
			ow_segment: false,
			ow_metric: false,
			save_figures: false,
			workers: runner::DEFAULT_WORKERS,
		}
	}
}

impl AnalysisConfig {
	pub fn builder() -> AnalysisConfigBuilder {
		AnalysisConfigBuilder::default()
	}

	pub fn validate(&self) -> Result<()> {
		if self.sigma <= 0.0 {
			return Err(FibreError::InvalidParameter(
				"Sigma must be greater than 0".into(),
			));
		}
		if self.alpha <= 0.0 {
			return Err(FibreError::InvalidParameter(
				"Alpha must be greater than 0".into(),
			));
		}
		let (low, high) = self.p_intensity;
		if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
			return Err(FibreError::InvalidParameter(format!(
				"Clip percentiles ({}, {}) must satisfy 0 <= low < high <= 100",
				low, high
			)));
		}
		if self.p_denoise.0 == 0 || self.p_denoise.1 == 0 {
			return Err(FibreError::InvalidParameter(
				"Denoise patch size and distance must be greater than 0".into(),
			));
		}
		if self.scale <= 0.0 {
			return Err(FibreError::InvalidParameter(
				"Scale must be greater than 0".into(),
			));
		}
		if self.workers == 0 {
			return Err(FibreError::InvalidParameter(
				"Worker count must be greater than 0".into(),
			));
		}
		Ok(())
	}
}

#[derive(Default)]
pub struct AnalysisConfigBuilder {
	sigma: Option<f64>,
	alpha: Option<f64>,
	p_intensity: Option<(f64, f64)>,
	p_denoise: Option<(usize, usize)>,
	fire: Option<FireParams>,
	scale: Option<f64>,
	ow_network: Option<bool>,
	ow_segment: Option<bool>,
	ow_metric: Option<bool>,
	save_figures: Option<bool>,
	workers: Option<usize>,
}

impl AnalysisConfigBuilder {
	pub fn sigma(mut self, sigma: f64) -> Self {
		self.sigma = Some(sigma);
		self
	}

	pub fn alpha(mut self, alpha: f64) -> Self {
		self.alpha = Some(alpha);
		self
	}

	pub fn p_intensity(mut self, low: f64, high: f64) -> Self {
		self.p_intensity = Some((low, high));
		self
	}

	pub fn p_denoise(mut self, patch: usize, distance: usize) -> Self {
		self.p_denoise = Some((patch, distance));
		self
	}

	pub fn fire(mut self, fire: FireParams) -> Self {
		self.fire = Some(fire);
		self
	}

	pub fn scale(mut self, scale: f64) -> Self {
		self.scale = Some(scale);
		self
	}

	pub fn ow_network(mut self, ow: bool) -> Self {
		self.ow_network = Some(ow);
		self
	}

	pub fn ow_segment(mut self, ow: bool) -> Self {
		self.ow_segment = Some(ow);
		self
	}

	pub fn ow_metric(mut self, ow: bool) -> Self {
		self.ow_metric = Some(ow);
		self
	}

	pub fn save_figures(mut self, save: bool) -> Self {
		self.save_figures = Some(save);
		self
	}

	pub fn workers(mut self, workers: usize) -> Self {
		self.workers = Some(workers);
		self
	}

	pub fn build(self) -> AnalysisConfig {
		let defaults = AnalysisConfig::default();
		AnalysisConfig {
			sigma: self.sigma.unwrap_or(defaults.sigma),
			alpha: self.alpha.unwrap_or(defaults.alpha),
			p_intensity: self.p_intensity.unwrap_or(defaults.p_intensity),
			p_denoise: self.p_denoise.unwrap_or(defaults.p_denoise),
			fire: self.fire.unwrap_or(defaults.fire),
			scale: self.scale.unwrap_or(defaults.scale),
			clean_r_thresh: defaults.clean_r_thresh,
			ow_network: self.ow_network.unwrap_or(false),
			ow_segment: self.ow_segment.unwrap_or(false),
			ow_metric: self.ow_metric.unwrap_or(false),
			save_figures: self.save_figures.unwrap_or(false),
			workers: self.workers.unwrap_or(defaults.workers),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AnalysisConfig::default();
		assert_eq!((5, 35), config.p_denoise);
		assert_eq!((1.0, 99.0), config.p_intensity);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_theta_thresh() {
		let fire = FireParams::default();
		// cos(110 deg) + 1
		assert!((fire.theta_thresh() - 0.65798).abs() < 1e-4);
	}

	#[test]
	fn test_builder() {
		let config = AnalysisConfig::builder()
			.sigma(1.0)
			.workers(4)
			.ow_network(true)
			.build();
		assert_eq!(1.0, config.sigma);
		assert_eq!(4, config.workers);
		assert!(config.ow_network);
		assert!(!config.ow_segment);
	}

	#[test]
	fn test_validate_rejects_bad_percentiles() {
		let config = AnalysisConfig::builder().p_intensity(99.0, 1.0).build();
		assert!(config.validate().is_err());
	}
}
