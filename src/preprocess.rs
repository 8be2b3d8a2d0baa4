use ndarray::Array2;

use crate::constants::preprocess::{CLAHE_CLIP_LIMIT, CLAHE_NBINS, NL_H_FACTOR};
use crate::error::{FibreError, Result};
use crate::filters::gaussian_filter;
use crate::utils::{median, percentile};

/// Rescale intensities so the `p_low` percentile maps to 0 and the `p_high`
/// percentile maps to 1, clamping values outside the range. Inputs with no
/// dynamic range short-circuit to a zero image; non-finite pixels are
/// rejected.
pub fn clip_intensities(image: &Array2<f64>, p_low: f64, p_high: f64) -> Result<Array2<f64>> {
	if image.iter().any(|v| !v.is_finite()) {
		return Err(FibreError::Preprocess(
			"image contains non-finite values".into(),
		));
	}
	let values: Vec<f64> = image.iter().cloned().collect();
	let low = percentile(&values, p_low);
	let high = percentile(&values, p_high);
	if high <= low {
		return Ok(Array2::<f64>::zeros(image.dim()));
	}
	Ok(image.mapv(|v| ((v - low) / (high - low)).max(0.0).min(1.0)))
}

/// Noise standard deviation estimated from the diagonal Haar detail
/// coefficients (median absolute deviation / 0.6745).
pub fn estimate_sigma(image: &Array2<f64>) -> f64 {
	let (rows, cols) = image.dim();
	if rows < 2 || cols < 2 {
		return 0.0;
	}
	let mut details = Vec::with_capacity((rows / 2) * (cols / 2));
	for r in (0..rows - 1).step_by(2) {
		for c in (0..cols - 1).step_by(2) {
			let d = (image[[r, c]] - image[[r, c + 1]] - image[[r + 1, c]]
				+ image[[r + 1, c + 1]])
				/ 2.0;
			details.push(d.abs());
		}
	}
	if details.is_empty() {
		return 0.0;
	}
	median(&details) / 0.6745
}

fn reflect_pad(image: &Array2<f64>, pad: usize) -> Array2<f64> {
	let (rows, cols) = image.dim();
	let mut out = Array2::<f64>::zeros((rows + 2 * pad, cols + 2 * pad));
	for r in 0..rows + 2 * pad {
		for c in 0..cols + 2 * pad {
			let rr = reflect(r as isize - pad as isize, rows);
			let cc = reflect(c as isize - pad as isize, cols);
			out[[r, c]] = image[[rr, cc]];
		}
	}
	out
}

fn reflect(index: isize, len: usize) -> usize {
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
}

/// Fast-mode non-local means denoise with an estimated per-image Gaussian
/// sigma and `h = 1.2 * sigma`. Patch distances are computed with integral
/// images over per-offset squared differences.
pub fn nl_means(image: &Array2<f64>, patch_size: usize, patch_distance: usize) -> Array2<f64> {
	let sigma = estimate_sigma(image);
	let h = NL_H_FACTOR * sigma;
	if h <= 0.0 {
		return image.clone();
	}
	let (rows, cols) = image.dim();
	if rows == 0 || cols == 0 {
		return image.clone();
	}
	let f = (patch_size / 2).max(1);
	let d = patch_distance as isize;
	let pad = patch_distance + f + 1;
	let padded = reflect_pad(image, pad);
	let (prows, pcols) = padded.dim();

	let patch_area = ((2 * f + 1) * (2 * f + 1)) as f64;
	let var_offset = 2.0 * sigma * sigma;
	let h2 = h * h;

	// centre pixel contributes with the maximum weight
	let mut weights = Array2::<f64>::from_elem((rows, cols), 1.0);
	let mut accum = image.clone();

	let mut sq_diff = Array2::<f64>::zeros((prows, pcols));
	let mut integral = Array2::<f64>::zeros((prows + 1, pcols + 1));

	for dr in -d..=d {
		for dc in -d..=d {
			if dr == 0 && dc == 0 {
				continue;
			}
			for r in 0..prows {
				for c in 0..pcols {
					let rr = r as isize + dr;
					let cc = c as isize + dc;
					sq_diff[[r, c]] =
						if rr >= 0 && cc >= 0 && rr < prows as isize && cc < pcols as isize {
							let diff = padded[[r, c]] - padded[[rr as usize, cc as usize]];
							diff * diff
						} else {
							0.0
						};
				}
			}
			for r in 0..prows {
				for c in 0..pcols {
					integral[[r + 1, c + 1]] = sq_diff[[r, c]] + integral[[r, c + 1]]
						+ integral[[r + 1, c]]
						- integral[[r, c]];
				}
			}
			for r in 0..rows {
				for c in 0..cols {
					let r0 = r + pad - f;
					let c0 = c + pad - f;
					let r1 = r + pad + f + 1;
					let c1 = c + pad + f + 1;
					let total = integral[[r1, c1]] - integral[[r0, c1]] - integral[[r1, c0]]
						+ integral[[r0, c0]];
					let dist = (total / patch_area - var_offset).max(0.0);
					let w = (-dist / h2).exp();
					let sr = (r + pad) as isize + dr;
					let sc = (c + pad) as isize + dc;
					accum[[r, c]] += w * padded[[sr as usize, sc as usize]];
					weights[[r, c]] += w;
				}
			}
		}
	}

	let mut out = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			out[[r, c]] = accum[[r, c]] / weights[[r, c]];
		}
	}
	out
}

/// Global histogram equalisation onto [0, 1].
pub fn equalize_hist(image: &Array2<f64>) -> Array2<f64> {
	let mut min = f64::INFINITY;
	let mut max = f64::NEG_INFINITY;
	for &v in image.iter() {
		min = min.min(v);
		max = max.max(v);
	}
	if max <= min {
		return Array2::<f64>::zeros(image.dim());
	}
	let nbins = CLAHE_NBINS;
	let scale = nbins as f64 / (max - min);
	let mut hist = vec![0usize; nbins];
	for &v in image.iter() {
		let bin = (((v - min) * scale) as usize).min(nbins - 1);
		hist[bin] += 1;
	}
	let total = image.len() as f64;
	let mut cdf = vec![0.0f64; nbins];
	let mut running = 0usize;
	for (i, &n) in hist.iter().enumerate() {
		running += n;
		cdf[i] = running as f64 / total;
	}
	image.mapv(|v| {
		let bin = (((v - min) * scale) as usize).min(nbins - 1);
		cdf[bin]
	})
}

/// Contrast-limited adaptive histogram equalisation with the default kernel
/// (an 8x8 tile grid, clip limit 0.01, 256 bins). Input is expected in
/// [0, 1]; output stays in [0, 1].
pub fn equalize_adapthist(image: &Array2<f64>) -> Array2<f64> {
	let (rows, cols) = image.dim();
	if rows == 0 || cols == 0 {
		return image.clone();
	}
	let nbins = CLAHE_NBINS;
	let tile_rows = (rows + 7) / 8;
	let tile_cols = (cols + 7) / 8;
	let n_tiles_r = (rows + tile_rows - 1) / tile_rows;
	let n_tiles_c = (cols + tile_cols - 1) / tile_cols;

	let bin_of = |v: f64| ((v.max(0.0).min(1.0) * (nbins as f64 - 1.0)).round()) as usize;

	// per-tile clipped cumulative mappings
	let mut mappings = vec![vec![0.0f64; nbins]; n_tiles_r * n_tiles_c];
	let mut centres_r = vec![0.0f64; n_tiles_r];
	let mut centres_c = vec![0.0f64; n_tiles_c];
	for ti in 0..n_tiles_r {
		let r0 = ti * tile_rows;
		let r1 = (r0 + tile_rows).min(rows);
		centres_r[ti] = (r0 + r1) as f64 / 2.0 - 0.5;
		for tj in 0..n_tiles_c {
			let c0 = tj * tile_cols;
			let c1 = (c0 + tile_cols).min(cols);
			centres_c[tj] = (c0 + c1) as f64 / 2.0 - 0.5;

			let mut hist = vec![0.0f64; nbins];
			let count = ((r1 - r0) * (c1 - c0)) as f64;
			for r in r0..r1 {
				for c in c0..c1 {
					hist[bin_of(image[[r, c]])] += 1.0;
				}
			}
			let clip = (CLAHE_CLIP_LIMIT * count).max(1.0);
			let mut excess = 0.0;
			for h in hist.iter_mut() {
				if *h > clip {
					excess += *h - clip;
					*h = clip;
				}
			}
			let redistribute = excess / nbins as f64;
			for h in hist.iter_mut() {
				*h += redistribute;
			}
			let mapping = &mut mappings[ti * n_tiles_c + tj];
			let mut running = 0.0;
			for (i, &h) in hist.iter().enumerate() {
				running += h;
				mapping[i] = running / count;
			}
		}
	}

	let locate = |x: f64, centres: &[f64]| -> (usize, usize, f64) {
		if x <= centres[0] {
			return (0, 0, 0.0);
		}
		if x >= centres[centres.len() - 1] {
			return (centres.len() - 1, centres.len() - 1, 0.0);
		}
		let mut i = 0;
		while centres[i + 1] < x {
			i += 1;
		}
		let frac = (x - centres[i]) / (centres[i + 1] - centres[i]);
		(i, i + 1, frac)
	};

	let mut out = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		let (ti0, ti1, fr) = locate(r as f64, &centres_r);
		for c in 0..cols {
			let (tj0, tj1, fc) = locate(c as f64, &centres_c);
			let bin = bin_of(image[[r, c]]);
			let m00 = mappings[ti0 * n_tiles_c + tj0][bin];
			let m01 = mappings[ti0 * n_tiles_c + tj1][bin];
			let m10 = mappings[ti1 * n_tiles_c + tj0][bin];
			let m11 = mappings[ti1 * n_tiles_c + tj1][bin];
			let top = m00 * (1.0 - fc) + m01 * fc;
			let bottom = m10 * (1.0 - fc) + m11 * fc;
			out[[r, c]] = top * (1.0 - fr) + bottom * fr;
		}
	}
	out
}

fn bilinear_sample(image: &Array2<f64>, r: f64, c: f64) -> f64 {
	let (rows, cols) = image.dim();
	let r = r.max(0.0).min(rows as f64 - 1.0);
	let c = c.max(0.0).min(cols as f64 - 1.0);
	let r0 = r.floor() as usize;
	let c0 = c.floor() as usize;
	let r1 = (r0 + 1).min(rows - 1);
	let c1 = (c0 + 1).min(cols - 1);
	let fr = r - r0 as f64;
	let fc = c - c0 as f64;
	image[[r0, c0]] * (1.0 - fr) * (1.0 - fc)
		+ image[[r0, c1]] * (1.0 - fr) * fc
		+ image[[r1, c0]] * fr * (1.0 - fc)
		+ image[[r1, c1]] * fr * fc
}

/// Bilinear resize with Gaussian anti-aliasing when shrinking.
pub fn resize(image: &Array2<f64>, out_rows: usize, out_cols: usize) -> Array2<f64> {
	let (rows, cols) = image.dim();
	if rows == 0 || cols == 0 || out_rows == 0 || out_cols == 0 {
		return Array2::<f64>::zeros((out_rows, out_cols));
	}
	if rows == out_rows && cols == out_cols {
		return image.clone();
	}
	let scale_r = rows as f64 / out_rows as f64;
	let scale_c = cols as f64 / out_cols as f64;
	let aa_sigma = ((scale_r.max(scale_c) - 1.0) / 2.0).max(0.0);
	let source = if aa_sigma > 0.0 {
		gaussian_filter(image, aa_sigma)
	} else {
		image.clone()
	};
	let mut out = Array2::<f64>::zeros((out_rows, out_cols));
	for r in 0..out_rows {
		for c in 0..out_cols {
			let src_r = (r as f64 + 0.5) * scale_r - 0.5;
			let src_c = (c as f64 + 0.5) * scale_c - 0.5;
			out[[r, c]] = bilinear_sample(&source, src_r, src_c);
		}
	}
	out
}

/// Uniformly rescale an image by `scale`.
pub fn rescale(image: &Array2<f64>, scale: f64) -> Array2<f64> {
	let (rows, cols) = image.dim();
	let out_rows = ((rows as f64 * scale).round() as usize).max(1);
	let out_cols = ((cols as f64 * scale).round() as usize).max(1);
	resize(image, out_rows, out_cols)
}
