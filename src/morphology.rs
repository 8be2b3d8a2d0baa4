use ndarray::Array2;

fn neighbour_offsets(connectivity: usize) -> Vec<(isize, isize)> {
	if connectivity <= 1 {
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
	}
}

/// Label connected foreground components. Returns the label map (0 =
/// background, labels 1..=count) and the component count. Components are
/// numbered in raster order of their first pixel.
pub fn label(mask: &Array2<bool>, connectivity: usize) -> (Array2<usize>, usize) {
	let (rows, cols) = mask.dim();
	let mut labels = Array2::<usize>::zeros((rows, cols));
	let offsets = neighbour_offsets(connectivity);
	let mut current = 0;
	let mut stack = Vec::new();
	for r in 0..rows {
		for c in 0..cols {
			if !mask[[r, c]] || labels[[r, c]] != 0 {
				continue;
			}
			current += 1;
			labels[[r, c]] = current;
			stack.push((r, c));
			while let Some((pr, pc)) = stack.pop() {
				for &(dr, dc) in &offsets {
					let rr = pr as isize + dr;
					let cc = pc as isize + dc;
					if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
						continue;
					}
					let (rr, cc) = (rr as usize, cc as usize);
					if mask[[rr, cc]] && labels[[rr, cc]] == 0 {
						labels[[rr, cc]] = current;
						stack.push((rr, cc));
					}
				}
			}
		}
	}
	(labels, current)
}

fn dilate_once(mask: &Array2<bool>) -> Array2<bool> {
	let (rows, cols) = mask.dim();
	let mut out = mask.clone();
	for r in 0..rows {
		for c in 0..cols {
			if !mask[[r, c]] {
				continue;
			}
			for &(dr, dc) in &[(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
				let rr = r as isize + dr;
				let cc = c as isize + dc;
				if rr >= 0 && cc >= 0 && rr < rows as isize && cc < cols as isize {
					out[[rr as usize, cc as usize]] = true;
				}
			}
		}
	}
	out
}

fn erode_once(mask: &Array2<bool>) -> Array2<bool> {
	let (rows, cols) = mask.dim();
	let mut out = mask.clone();
	for r in 0..rows {
		for c in 0..cols {
			if !mask[[r, c]] {
				continue;
			}
			let mut keep = true;
			for &(dr, dc) in &[(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
				let rr = r as isize + dr;
				let cc = c as isize + dc;
				if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
					keep = false;
					break;
				}
				if !mask[[rr as usize, cc as usize]] {
					keep = false;
					break;
				}
			}
			out[[r, c]] = keep;
		}
	}
	out
}

/// Binary dilation with the cross structuring element.
pub fn binary_dilation(mask: &Array2<bool>, iterations: usize) -> Array2<bool> {
	let mut out = mask.clone();
	for _ in 0..iterations {
		out = dilate_once(&out);
	}
	out
}

/// Binary erosion with the cross structuring element.
pub fn binary_erosion(mask: &Array2<bool>, iterations: usize) -> Array2<bool> {
	let mut out = mask.clone();
	for _ in 0..iterations {
		out = erode_once(&out);
	}
	out
}

pub fn binary_closing(mask: &Array2<bool>, iterations: usize) -> Array2<bool> {
	binary_erosion(&binary_dilation(mask, iterations), iterations)
}

pub fn binary_opening(mask: &Array2<bool>, iterations: usize) -> Array2<bool> {
	binary_dilation(&binary_erosion(mask, iterations), iterations)
}

/// Fill background regions not connected to the image border.
pub fn binary_fill_holes(mask: &Array2<bool>) -> Array2<bool> {
	let (rows, cols) = mask.dim();
	if rows == 0 || cols == 0 {
		return mask.clone();
	}
	let mut outside = Array2::<bool>::from_elem((rows, cols), false);
	let mut stack = Vec::new();
	for r in 0..rows {
		for &c in &[0, cols - 1] {
			if !mask[[r, c]] && !outside[[r, c]] {
				outside[[r, c]] = true;
				stack.push((r, c));
			}
		}
	}
	for c in 0..cols {
		for &r in &[0, rows - 1] {
			if !mask[[r, c]] && !outside[[r, c]] {
				outside[[r, c]] = true;
				stack.push((r, c));
			}
		}
	}
	while let Some((r, c)) = stack.pop() {
		for &(dr, dc) in &[(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
			let rr = r as isize + dr;
			let cc = c as isize + dc;
			if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
				continue;
			}
			let (rr, cc) = (rr as usize, cc as usize);
			if !mask[[rr, cc]] && !outside[[rr, cc]] {
				outside[[rr, cc]] = true;
				stack.push((rr, cc));
			}
		}
	}
	let mut out = mask.clone();
	for r in 0..rows {
		for c in 0..cols {
			if !outside[[r, c]] {
				out[[r, c]] = true;
			}
		}
	}
	out
}

/// Drop 8-connected foreground components smaller than `min_size`.
pub fn remove_small_objects(mask: &Array2<bool>, min_size: usize) -> Array2<bool> {
	let (labels, count) = label(mask, 2);
	let mut sizes = vec![0usize; count + 1];
	for &l in labels.iter() {
		sizes[l] += 1;
	}
	let mut out = mask.clone();
	for (v, &l) in out.iter_mut().zip(labels.iter()) {
		if l != 0 && sizes[l] < min_size {
			*v = false;
		}
	}
	out
}

/// Fill 4-connected background holes with area up to `area_threshold`.
pub fn remove_small_holes(mask: &Array2<bool>, area_threshold: usize) -> Array2<bool> {
	let inverted = mask.mapv(|v| !v);
	let (labels, count) = label(&inverted, 1);
	let (rows, cols) = mask.dim();
	let mut sizes = vec![0usize; count + 1];
	let mut touches_border = vec![false; count + 1];
	for r in 0..rows {
		for c in 0..cols {
			let l = labels[[r, c]];
			if l == 0 {
				continue;
			}
			sizes[l] += 1;
			if r == 0 || c == 0 || r == rows - 1 || c == cols - 1 {
				touches_border[l] = true;
			}
		}
	}
	let mut out = mask.clone();
	for r in 0..rows {
		for c in 0..cols {
			let l = labels[[r, c]];
			if l != 0 && !touches_border[l] && sizes[l] <= area_threshold {
				out[[r, c]] = true;
			}
		}
	}
	out
}

/// Exact squared 1-D distance transform (lower envelope of parabolas).
fn distance_transform_1d(f: &[f64]) -> Vec<f64> {
	let n = f.len();
	let inf = 1e20;
	let mut d = vec![0.0f64; n];
	if n == 0 {
		return d;
	}
	let mut v = vec![0usize; n];
	let mut z = vec![0.0f64; n + 1];
	let mut k = 0usize;
	v[0] = 0;
	z[0] = -inf;
	z[1] = inf;
	for q in 1..n {
		let mut s;
		loop {
			let p = v[k];
			s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64))
				/ (2.0 * (q as f64 - p as f64));
			if s <= z[k] && k > 0 {
				k -= 1;
			} else {
				break;
			}
		}
		k += 1;
		v[k] = q;
		z[k] = s;
		z[k + 1] = inf;
	}
	k = 0;
	for q in 0..n {
		while z[k + 1] < q as f64 {
			k += 1;
		}
		let diff = q as f64 - v[k] as f64;
		d[q] = diff * diff + f[v[k]];
	}
	d
}

/// Euclidean distance of every foreground pixel to the nearest background
/// pixel. Background pixels map to zero.
pub fn distance_transform_edt(mask: &Array2<bool>) -> Array2<f64> {
	let (rows, cols) = mask.dim();
	let inf = 1e20;
	let mut sq = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			sq[[r, c]] = if mask[[r, c]] { inf } else { 0.0 };
		}
	}
	// vertical then horizontal parabola passes
	for c in 0..cols {
		let column: Vec<f64> = (0..rows).map(|r| sq[[r, c]]).collect();
		for (r, v) in distance_transform_1d(&column).into_iter().enumerate() {
			sq[[r, c]] = v;
		}
	}
	for r in 0..rows {
		let row: Vec<f64> = (0..cols).map(|c| sq[[r, c]]).collect();
		for (c, v) in distance_transform_1d(&row).into_iter().enumerate() {
			sq[[r, c]] = v;
		}
	}
	sq.mapv(|v| if v >= inf { 0.0 } else { v.sqrt() })
}

/// Square-window median filter with reflected boundaries.
pub fn median_filter(image: &Array2<f64>, size: usize) -> Array2<f64> {
	let (rows, cols) = image.dim();
	let mut out = Array2::<f64>::zeros((rows, cols));
	let radius = (size / 2) as isize;
	let mut window = Vec::with_capacity(size * size);
	for r in 0..rows {
		for c in 0..cols {
			window.clear();
			for dr in -radius..=radius {
				for dc in -radius..=radius {
					let rr = reflect(r as isize + dr, rows);
					let cc = reflect(c as isize + dc, cols);
					window.push(image[[rr, cc]]);
				}
			}
			window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
			out[[r, c]] = window[window.len() / 2];
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

#[cfg(test)]
mod tests {
	use super::*;

	fn mask_from(rows: usize, cols: usize, on: &[(usize, usize)]) -> Array2<bool> {
		let mut mask = Array2::<bool>::from_elem((rows, cols), false);
		for &(r, c) in on {
			mask[[r, c]] = true;
		}
		mask
	}

	#[test]
	fn test_label_two_components() {
		let mask = mask_from(5, 5, &[(0, 0), (0, 1), (4, 4)]);
		let (labels, count) = label(&mask, 2);
		assert_eq!(2, count);
		assert_eq!(labels[[0, 0]], labels[[0, 1]]);
		assert_ne!(labels[[0, 0]], labels[[4, 4]]);
	}

	#[test]
	fn test_label_diagonal_connectivity() {
		let mask = mask_from(3, 3, &[(0, 0), (1, 1)]);
		let (_, count_8) = label(&mask, 2);
		let (_, count_4) = label(&mask, 1);
		assert_eq!(1, count_8);
		assert_eq!(2, count_4);
	}

	#[test]
	fn test_dilation_grows_cross() {
		let mask = mask_from(5, 5, &[(2, 2)]);
		let dilated = binary_dilation(&mask, 1);
		assert_eq!(5, dilated.iter().filter(|&&v| v).count());
		assert!(dilated[[1, 2]] && dilated[[3, 2]] && dilated[[2, 1]] && dilated[[2, 3]]);
		assert!(!dilated[[1, 1]]);
	}

	#[test]
	fn test_fill_holes() {
		let mut mask = Array2::<bool>::from_elem((5, 5), false);
		for i in 0..5 {
			mask[[0, i]] = true;
			mask[[4, i]] = true;
			mask[[i, 0]] = true;
			mask[[i, 4]] = true;
		}
		let filled = binary_fill_holes(&mask);
		assert!(filled.iter().all(|&v| v));
	}

	#[test]
	fn test_remove_small_objects() {
		let mask = mask_from(6, 6, &[(0, 0), (3, 3), (3, 4), (4, 3), (4, 4)]);
		let cleaned = remove_small_objects(&mask, 2);
		assert!(!cleaned[[0, 0]]);
		assert!(cleaned[[3, 3]]);
	}

	#[test]
	fn test_remove_small_holes() {
		let mut mask = Array2::<bool>::from_elem((5, 5), true);
		mask[[2, 2]] = false;
		let filled = remove_small_holes(&mask, 4);
		assert!(filled[[2, 2]]);
	}

	#[test]
	fn test_distance_transform_band() {
		let mut mask = Array2::<bool>::from_elem((11, 11), false);
		for r in 2..9 {
			for c in 0..11 {
				mask[[r, c]] = true;
			}
		}
		let dist = distance_transform_edt(&mask);
		assert_eq!(0.0, dist[[0, 5]]);
		assert!((dist[[2, 5]] - 1.0).abs() < 1e-9);
		assert!((dist[[5, 5]] - 4.0).abs() < 1e-9);
	}

	#[test]
	fn test_distance_transform_diagonal_metric() {
		let mut mask = Array2::<bool>::from_elem((9, 9), true);
		mask[[0, 0]] = false;
		let dist = distance_transform_edt(&mask);
		assert!((dist[[3, 4]] - 25f64.sqrt()).abs() < 1e-9);
	}

	#[test]
	fn test_median_filter_removes_spike() {
		let mut image = Array2::<f64>::zeros((5, 5));
		image[[2, 2]] = 100.0;
		let filtered = median_filter(&image, 3);
		assert_eq!(0.0, filtered[[2, 2]]);
	}
}
