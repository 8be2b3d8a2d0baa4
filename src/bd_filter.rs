use ndarray::Array2;

use crate::constants::bd;
use crate::error::{FibreError, Result};
use crate::kmeans::MiniBatchKMeans;
use crate::morphology::{binary_fill_holes, binary_opening, remove_small_objects};
use crate::preprocess::equalize_hist;
use crate::utils::{median, percentile};

/// Blue-dominant filter: clusters an RGB-mimicking stack with mini-batch
/// k-means and labels the low `cluster_val` clusters as cell-like, after the
/// CurveAlign BD-creation routine.
#[derive(Debug, Clone)]
pub struct BDFilter {
	pub n_clusters: usize,
	pub n_runs: usize,
	pub p_intensity: (f64, f64),
	pub seed: u64,
}

impl Default for BDFilter {
	fn default() -> Self {
		Self {
			n_clusters: bd::N_CLUSTERS,
			n_runs: bd::N_RUNS,
			p_intensity: (bd::P_INTENSITY_LOW, bd::P_INTENSITY_HIGH),
			seed: bd::KMEANS_SEED,
		}
	}
}

fn symmetric_pad(image: &Array2<f64>, pad: usize) -> Array2<f64> {
	let (rows, cols) = image.dim();
	let mut out = Array2::<f64>::zeros((rows + 2 * pad, cols + 2 * pad));
	let mirror = |index: isize, len: usize| -> usize {
		let len = len as isize;
		let mut i = index;
		loop {
			if i < 0 {
				i = -i - 1;
			} else if i >= len {
				i = 2 * len - i - 1;
			} else {
				return i as usize;
			}
		}
	};
	for r in 0..rows + 2 * pad {
		for c in 0..cols + 2 * pad {
			let rr = mirror(r as isize - pad as isize, rows);
			let cc = mirror(c as isize - pad as isize, cols);
			out[[r, c]] = image[[rr, cc]];
		}
	}
	out
}

fn crop(image: &Array2<f64>, pad: usize, rows: usize, cols: usize) -> Array2<f64> {
	let mut out = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			out[[r, c]] = image[[r + pad, c + pad]];
		}
	}
	out
}

fn rgb_to_grey(channels: &[Array2<f64>; 3]) -> Array2<f64> {
	let (rows, cols) = channels[0].dim();
	let mut grey = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			grey[[r, c]] = 0.2125 * channels[0][[r, c]]
				+ 0.7154 * channels[1][[r, c]]
				+ 0.0721 * channels[2][[r, c]];
		}
	}
	grey
}

impl BDFilter {
	/// Produce the cell-like binary mask for a three-channel stack. All
	/// channels must share one shape.
	pub fn filter_image(&self, channels: &[Array2<f64>; 3]) -> Result<Array2<bool>> {
		let (rows, cols) = channels[0].dim();
		if channels.iter().any(|c| c.dim() != (rows, cols)) {
			return Err(FibreError::Segmentation(
				"BD filter channels must share one shape".into(),
			));
		}
		if rows == 0 || cols == 0 {
			return Ok(Array2::<bool>::from_elem((rows, cols), false));
		}

		// contrast-stretch each channel onto 0..255, then equalise and
		// despeckle behind a symmetric pad
		let mut scaled = Vec::with_capacity(3);
		for channel in channels.iter() {
			let values: Vec<f64> = channel.iter().cloned().collect();
			let low = percentile(&values, self.p_intensity.0);
			let high = percentile(&values, self.p_intensity.1);
			let stretched = if high > low {
				channel.mapv(|v| 255.0 * ((v - low) / (high - low)).max(0.0).min(1.0))
			} else {
				Array2::<f64>::zeros((rows, cols))
			};
			let padded = symmetric_pad(&stretched, bd::PAD_SIZE);
			let equalised = equalize_hist(&padded).mapv(|v| 255.0 * v);
			let smoothed = crate::morphology::median_filter(&equalised, bd::MEDIAN_SIZE);
			let smoothed = crate::morphology::median_filter(&smoothed, bd::MEDIAN_SIZE);
			scaled.push(crop(&smoothed, bd::PAD_SIZE, rows, cols));
		}

		let mut samples = Vec::with_capacity(rows * cols);
		for r in 0..rows {
			for c in 0..cols {
				samples.push(vec![
					scaled[0][[r, c]],
					scaled[1][[r, c]],
					scaled[2][[r, c]],
				]);
			}
		}

		let fit = MiniBatchKMeans::new(self.n_clusters, self.n_runs, self.seed).fit(&samples)?;

		// order clusters by combined intensity rank
		let grey = rgb_to_grey(channels);
		let mut median_intensity = vec![0.0f64; self.n_clusters];
		for cluster in 0..self.n_clusters {
			let mut values = Vec::new();
			for r in 0..rows {
				for c in 0..cols {
					if fit.labels[r * cols + c] == cluster && grey[[r, c]] > 0.0 {
						values.push(grey[[r, c]]);
					}
				}
			}
			median_intensity[cluster] = if values.is_empty() {
				0.0
			} else {
				median(&values)
			};
		}
		let mean_centres: Vec<f64> = fit
			.centroids
			.iter()
			.map(|c| c.iter().sum::<f64>() / c.len() as f64)
			.collect();

		let med_max = median_intensity.iter().cloned().fold(0.0f64, f64::max);
		let centre_max = mean_centres.iter().cloned().fold(0.0f64, f64::max);
		if med_max <= 0.0 || centre_max <= 0.0 {
			return Err(FibreError::Segmentation(
				"BD filter found no intensity to rank clusters".into(),
			));
		}
		let cluster_val: Vec<f64> = (0..self.n_clusters)
			.map(|i| (median_intensity[i] / med_max) * (mean_centres[i] / centre_max))
			.collect();

		// low cluster_val clusters carry the blue-like cellular signal
		let mut cell = Array2::<bool>::from_elem((rows, cols), false);
		for r in 0..rows {
			for c in 0..cols {
				let label = fit.labels[r * cols + c];
				if cluster_val[label] < bd::BLUE_THRESH && grey[[r, c]] > 0.0 {
					cell[[r, c]] = true;
				}
			}
		}

		let opened = binary_opening(&cell, 1);
		let filled = binary_fill_holes(&opened);
		let background = filled.mapv(|v| !v);
		let background = remove_small_objects(&background, bd::OPEN_MIN_SIZE);
		let foreground = background.mapv(|v| !v);
		Ok(remove_small_objects(&foreground, bd::OBJECT_MIN_SIZE))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_shape_mismatch_rejected() {
		let channels = [
			Array2::<f64>::zeros((10, 10)),
			Array2::<f64>::zeros((10, 11)),
			Array2::<f64>::zeros((10, 10)),
		];
		assert!(BDFilter::default().filter_image(&channels).is_err());
	}

	#[test]
	fn test_dark_quadrant_classified_cellular() {
		// bright fibrous field with one dim quadrant; the dim cluster has a
		// low cluster_val and should surface in the cell mask
		let size = 48;
		let mut r_chan = Array2::<f64>::from_elem((size, size), 0.9);
		let mut g_chan = Array2::<f64>::from_elem((size, size), 0.8);
		let mut b_chan = Array2::<f64>::from_elem((size, size), 0.7);
		for r in 0..size / 2 {
			for c in 0..size / 2 {
				r_chan[[r, c]] = 0.05;
				g_chan[[r, c]] = 0.1;
				b_chan[[r, c]] = 0.08;
			}
		}
		// mild ramp so the clustering sees a spread of values
		for r in 0..size {
			for c in 0..size {
				let ramp = 0.002 * (r + c) as f64;
				r_chan[[r, c]] += ramp;
				g_chan[[r, c]] += ramp;
				b_chan[[r, c]] += ramp;
			}
		}
		let mask = BDFilter::default()
			.filter_image(&[r_chan, g_chan, b_chan])
			.unwrap();
		let dim_count = (0..size / 2)
			.flat_map(|r| (0..size / 2).map(move |c| (r, c)))
			.filter(|&(r, c)| mask[[r, c]])
			.count();
		let bright_count = (size / 2..size)
			.flat_map(|r| (size / 2..size).map(move |c| (r, c)))
			.filter(|&(r, c)| mask[[r, c]])
			.count();
		assert!(dim_count > bright_count);
	}
}
