use ndarray::Array2;

use crate::constants::filters::{GAUSSIAN_TRUNCATE, OTSU_NBINS};

/// Reflect an out-of-bounds index back into `0..len` (half-sample symmetric,
/// the scipy `reflect` boundary).
fn reflect_index(index: isize, len: usize) -> usize {
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

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
	let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as usize;
	let radius = radius.max(1);
	let mut kernel = Vec::with_capacity(2 * radius + 1);
	let denom = 2.0 * sigma * sigma;
	for i in 0..=2 * radius {
		let x = i as f64 - radius as f64;
		kernel.push((-x * x / denom).exp());
	}
	let total: f64 = kernel.iter().sum();
	for k in kernel.iter_mut() {
		*k /= total;
	}
	kernel
}

/// Separable Gaussian smoothing with reflected boundaries.
pub fn gaussian_filter(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
	if sigma <= 0.0 {
		return image.clone();
	}
	let (rows, cols) = image.dim();
	if rows == 0 || cols == 0 {
		return image.clone();
	}
	let kernel = gaussian_kernel(sigma);
	let radius = kernel.len() / 2;

	let mut pass_rows = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let mut acc = 0.0;
			for (k, w) in kernel.iter().enumerate() {
				let rr = reflect_index(r as isize + k as isize - radius as isize, rows);
				acc += w * image[[rr, c]];
			}
			pass_rows[[r, c]] = acc;
		}
	}

	let mut out = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let mut acc = 0.0;
			for (k, w) in kernel.iter().enumerate() {
				let cc = reflect_index(c as isize + k as isize - radius as isize, cols);
				acc += w * pass_rows[[r, cc]];
			}
			out[[r, c]] = acc;
		}
	}
	out
}

/// Central-difference gradient along `axis` (0 = rows, 1 = columns), with
/// one-sided differences at the borders.
pub fn gradient(image: &Array2<f64>, axis: usize) -> Array2<f64> {
	let (rows, cols) = image.dim();
	let mut out = Array2::<f64>::zeros((rows, cols));
	if axis == 0 {
		if rows < 2 {
			return out;
		}
		for c in 0..cols {
			out[[0, c]] = image[[1, c]] - image[[0, c]];
			out[[rows - 1, c]] = image[[rows - 1, c]] - image[[rows - 2, c]];
			for r in 1..rows - 1 {
				out[[r, c]] = (image[[r + 1, c]] - image[[r - 1, c]]) / 2.0;
			}
		}
	} else {
		if cols < 2 {
			return out;
		}
		for r in 0..rows {
			out[[r, 0]] = image[[r, 1]] - image[[r, 0]];
			out[[r, cols - 1]] = image[[r, cols - 1]] - image[[r, cols - 2]];
			for c in 1..cols - 1 {
				out[[r, c]] = (image[[r, c + 1]] - image[[r, c - 1]]) / 2.0;
			}
		}
	}
	out
}

/// Hessian components (Hrr, Hrc, Hcc) of the image smoothed at scale `sigma`.
pub fn hessian_matrix(image: &Array2<f64>, sigma: f64) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
	let smoothed = gaussian_filter(image, sigma);
	let d_r = gradient(&smoothed, 0);
	let d_c = gradient(&smoothed, 1);
	let h_rr = gradient(&d_r, 0);
	let h_rc = gradient(&d_r, 1);
	let h_cc = gradient(&d_c, 1);
	(h_rr, h_rc, h_cc)
}

/// Eigenvalues of a symmetric 2x2 matrix [[a, b], [b, c]], returned with the
/// smaller value first.
pub fn eigvals_sym2(a: f64, b: f64, c: f64) -> (f64, f64) {
	let mean = (a + c) / 2.0;
	let delta = ((a - c) * (a - c) / 4.0 + b * b).sqrt();
	(mean - delta, mean + delta)
}

/// Ridge response at scale `sigma`. The Hessian eigenvalue of larger
/// magnitude is negative across a bright elongated structure; its negation
/// is the response, clamped at zero elsewhere.
pub fn tubeness(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
	let (h_rr, h_rc, h_cc) = hessian_matrix(image, sigma);
	let (rows, cols) = image.dim();
	let mut out = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let (lo, hi) = eigvals_sym2(h_rr[[r, c]], h_rc[[r, c]], h_cc[[r, c]]);
			let principal = if lo.abs() >= hi.abs() { lo } else { hi };
			if principal < 0.0 {
				out[[r, c]] = -principal;
			}
		}
	}
	out
}

/// Otsu threshold over a 256-bin histogram. Returns the image minimum when
/// the input has no dynamic range.
pub fn otsu(image: &Array2<f64>) -> f64 {
	let mut min = f64::INFINITY;
	let mut max = f64::NEG_INFINITY;
	for &v in image.iter() {
		if v < min {
			min = v;
		}
		if v > max {
			max = v;
		}
	}
	if !min.is_finite() || !max.is_finite() || max <= min {
		return if min.is_finite() { min } else { 0.0 };
	}

	let nbins = OTSU_NBINS;
	let scale = nbins as f64 / (max - min);
	let mut hist = vec![0usize; nbins];
	for &v in image.iter() {
		let bin = (((v - min) * scale) as usize).min(nbins - 1);
		hist[bin] += 1;
	}

	let total = image.len() as f64;
	let bin_centre = |i: usize| min + (i as f64 + 0.5) / scale;
	let sum_all: f64 = hist
		.iter()
		.enumerate()
		.map(|(i, &n)| bin_centre(i) * n as f64)
		.sum();

	let mut best_bin = 0;
	let mut best_var = f64::NEG_INFINITY;
	let mut w0 = 0.0;
	let mut sum0 = 0.0;
	for i in 0..nbins - 1 {
		w0 += hist[i] as f64;
		sum0 += bin_centre(i) * hist[i] as f64;
		let w1 = total - w0;
		if w0 == 0.0 || w1 == 0.0 {
			continue;
		}
		let m0 = sum0 / w0;
		let m1 = (sum_all - sum0) / w1;
		let var = w0 * w1 * (m0 - m1) * (m0 - m1);
		if var > best_var {
			best_var = var;
			best_bin = i;
		}
	}
	bin_centre(best_bin)
}

/// Two-threshold hysteresis mask: pixels above `alpha * otsu` seed the mask,
/// which floods outward through pixels above half that value.
pub fn hysteresis(image: &Array2<f64>, alpha: f64) -> Array2<bool> {
	let high = alpha * otsu(image);
	let low = 0.5 * high;
	let (rows, cols) = image.dim();
	let mut mask = Array2::<bool>::from_elem((rows, cols), false);
	let mut stack = Vec::new();
	for r in 0..rows {
		for c in 0..cols {
			if image[[r, c]] > high {
				mask[[r, c]] = true;
				stack.push((r, c));
			}
		}
	}
	while let Some((r, c)) = stack.pop() {
		for dr in -1isize..=1 {
			for dc in -1isize..=1 {
				if dr == 0 && dc == 0 {
					continue;
				}
				let rr = r as isize + dr;
				let cc = c as isize + dc;
				if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
					continue;
				}
				let (rr, cc) = (rr as usize, cc as usize);
				if !mask[[rr, cc]] && image[[rr, cc]] > low {
					mask[[rr, cc]] = true;
					stack.push((rr, cc));
				}
			}
		}
	}
	mask
}

/// Plateau-aware local maxima. A pixel belongs to a maximum when no pixel in
/// its connected equal-value plateau has a strictly greater neighbour.
/// Connectivity 1 uses the 4-neighbourhood; anything higher the full
/// 8-neighbourhood. Borders are allowed.
pub fn local_maxima(image: &Array2<f64>, connectivity: usize) -> Array2<bool> {
	let (rows, cols) = image.dim();
	let mut maxima = Array2::<bool>::from_elem((rows, cols), true);
	if rows == 0 || cols == 0 {
		return maxima;
	}
	let offsets: Vec<(isize, isize)> = if connectivity <= 1 {
		vec![(-1, 0), (1, 0), (0, -1), (0, 1)]
	} else {
		vec![
			(-1, -1),
			(-1, 0),
			(-1, 1),
			(0, -1),
			(0, 1),
			(1, -1),
			(1, 0),
			(1, 1),
		]
	};

	let mut stack = Vec::new();
	for r in 0..rows {
		for c in 0..cols {
			for &(dr, dc) in &offsets {
				let rr = r as isize + dr;
				let cc = c as isize + dc;
				if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
					continue;
				}
				if image[[rr as usize, cc as usize]] > image[[r, c]] {
					if maxima[[r, c]] {
						maxima[[r, c]] = false;
						stack.push((r, c));
					}
					break;
				}
			}
		}
	}

	// Suppression spreads through plateaus of equal value
	while let Some((r, c)) = stack.pop() {
		for &(dr, dc) in &offsets {
			let rr = r as isize + dr;
			let cc = c as isize + dc;
			if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
				continue;
			}
			let (rr, cc) = (rr as usize, cc as usize);
			if maxima[[rr, cc]] && image[[rr, cc]] == image[[r, c]] {
				maxima[[rr, cc]] = false;
				stack.push((rr, cc));
			}
		}
	}
	maxima
}

#[cfg(test)]
mod tests {
	use super::*;

	fn image_from(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Array2<f64> {
		let mut image = Array2::<f64>::zeros((rows, cols));
		for r in 0..rows {
			for c in 0..cols {
				image[[r, c]] = f(r, c);
			}
		}
		image
	}

	#[test]
	fn test_gaussian_preserves_mass() {
		let mut image = Array2::<f64>::zeros((11, 11));
		image[[5, 5]] = 1.0;
		let smoothed = gaussian_filter(&image, 1.0);
		assert!((smoothed.sum() - 1.0).abs() < 1e-9);
		assert!(smoothed[[5, 5]] > smoothed[[5, 6]]);
	}

	#[test]
	fn test_gradient_of_ramp() {
		let image = image_from(5, 5, |_, c| c as f64);
		let d_c = gradient(&image, 1);
		for v in d_c.iter() {
			assert!((v - 1.0).abs() < 1e-12);
		}
		let d_r = gradient(&image, 0);
		for v in d_r.iter() {
			assert!(v.abs() < 1e-12);
		}
	}

	#[test]
	fn test_eigvals_sym2_ordering() {
		let (lo, hi) = eigvals_sym2(2.0, 0.0, -1.0);
		assert_eq!((-1.0, 2.0), (lo, hi));
		let (lo, hi) = eigvals_sym2(0.0, 1.0, 0.0);
		assert!((lo + 1.0).abs() < 1e-12 && (hi - 1.0).abs() < 1e-12);
	}

	#[test]
	fn test_tubeness_responds_to_bright_line() {
		let image = image_from(21, 21, |r, _| if r == 10 { 1.0 } else { 0.0 });
		let tube = tubeness(&image, 1.0);
		assert!(tube[[10, 10]] > 0.0);
		assert!(tube[[10, 10]] > tube[[2, 10]]);
	}

	#[test]
	fn test_tubeness_constant_image_is_zero() {
		let image = Array2::<f64>::from_elem((20, 20), 0.7);
		let tube = tubeness(&image, 1.0);
		assert!(tube.iter().all(|&v| v.abs() < 1e-9));
	}

	#[test]
	fn test_otsu_separates_bimodal() {
		let image = image_from(10, 10, |r, _| if r < 5 { 0.1 } else { 0.9 });
		let thresh = otsu(&image);
		assert!(thresh > 0.1 && thresh < 0.9);
	}

	#[test]
	fn test_hysteresis_connects_weak_to_strong() {
		let mut image = Array2::<f64>::zeros((5, 9));
		// strong seed with a weak tail; a detached weak pixel stays out
		image[[2, 1]] = 1.0;
		image[[2, 2]] = 0.4;
		image[[2, 3]] = 0.4;
		image[[2, 7]] = 0.4;
		let mask = hysteresis(&image, 1.0);
		assert!(mask[[2, 1]]);
		assert!(mask[[2, 2]]);
		assert!(mask[[2, 3]]);
		assert!(!mask[[2, 7]]);
	}

	#[test]
	fn test_local_maxima_single_peak() {
		let mut image = Array2::<f64>::zeros((7, 7));
		image[[3, 3]] = 2.0;
		let maxima = local_maxima(&image, 10);
		assert!(maxima[[3, 3]]);
		assert!(!maxima[[3, 4]]);
	}

	#[test]
	fn test_local_maxima_plateau() {
		let mut image = Array2::<f64>::zeros((7, 7));
		image[[3, 2]] = 1.0;
		image[[3, 3]] = 1.0;
		image[[3, 4]] = 1.0;
		let maxima = local_maxima(&image, 10);
		assert!(maxima[[3, 2]] && maxima[[3, 3]] && maxima[[3, 4]]);
		// a higher neighbour suppresses the whole plateau
		image[[3, 5]] = 2.0;
		let maxima = local_maxima(&image, 10);
		assert!(!maxima[[3, 2]] && !maxima[[3, 3]] && !maxima[[3, 4]]);
		assert!(maxima[[3, 5]]);
	}
}
