use ndarray::Array2;

use crate::filters::{eigvals_sym2, gaussian_filter, gradient, hessian_matrix};

/// A per-pixel symmetric 2x2 tensor field stored as its three independent
/// component maps.
#[derive(Debug, Clone)]
pub struct TensorField {
	pub t00: Array2<f64>,
	pub t01: Array2<f64>,
	pub t11: Array2<f64>,
}

impl TensorField {
	pub fn dim(&self) -> (usize, usize) {
		self.t00.dim()
	}

	/// Mean tensor over the whole field.
	pub fn mean(&self) -> (f64, f64, f64) {
		let n = self.t00.len() as f64;
		if n == 0.0 {
			return (0.0, 0.0, 0.0);
		}
		(
			self.t00.sum() / n,
			self.t01.sum() / n,
			self.t11.sum() / n,
		)
	}

	/// Crop to a bounding box (`min_row..max_row`, `min_col..max_col`).
	pub fn crop(&self, min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
		let slice = |map: &Array2<f64>| {
			let mut out = Array2::<f64>::zeros((max_row - min_row, max_col - min_col));
			for r in min_row..max_row {
				for c in min_col..max_col {
					out[[r - min_row, c - min_col]] = map[[r, c]];
				}
			}
			out
		};
		Self {
			t00: slice(&self.t00),
			t01: slice(&self.t01),
			t11: slice(&self.t11),
		}
	}
}

/// Classical structure tensor: Gaussian-smoothed products of the image
/// first derivatives.
pub fn structure_tensor(image: &Array2<f64>, sigma: f64) -> TensorField {
	let d_r = gradient(image, 0);
	let d_c = gradient(image, 1);
	let (rows, cols) = image.dim();
	let mut j_rr = Array2::<f64>::zeros((rows, cols));
	let mut j_rc = Array2::<f64>::zeros((rows, cols));
	let mut j_cc = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let gr = d_r[[r, c]];
			let gc = d_c[[r, c]];
			j_rr[[r, c]] = gr * gr;
			j_rc[[r, c]] = gr * gc;
			j_cc[[r, c]] = gc * gc;
		}
	}
	TensorField {
		t00: gaussian_filter(&j_rr, sigma),
		t01: gaussian_filter(&j_rc, sigma),
		t11: gaussian_filter(&j_cc, sigma),
	}
}

/// Hessian tensor at scale `sigma`.
pub fn hessian_tensor(image: &Array2<f64>, sigma: f64) -> TensorField {
	let (h_rr, h_rc, h_cc) = hessian_matrix(image, sigma);
	TensorField {
		t00: h_rr,
		t01: h_rc,
		t11: h_cc,
	}
}

/// Nematic orientation tensor. At pixels with a non-zero gradient
/// (g_r, g_c) and r2 = g_r^2 + g_c^2 the tensor is
/// [[g_c^2, -g_r g_c], [-g_r g_c, g_r^2]] / r2; zero-gradient pixels give
/// the zero tensor. Components are then Gaussian-smoothed.
pub fn nematic_tensor(image: &Array2<f64>, sigma: f64) -> TensorField {
	let d_r = gradient(image, 0);
	let d_c = gradient(image, 1);
	let (rows, cols) = image.dim();
	let mut n_rr = Array2::<f64>::zeros((rows, cols));
	let mut n_rc = Array2::<f64>::zeros((rows, cols));
	let mut n_cc = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let gr = d_r[[r, c]];
			let gc = d_c[[r, c]];
			let r2 = gr * gr + gc * gc;
			if r2 > 0.0 {
				n_rr[[r, c]] = gc * gc / r2;
				n_rc[[r, c]] = -gr * gc / r2;
				n_cc[[r, c]] = gr * gr / r2;
			}
		}
	}
	if sigma > 0.0 {
		TensorField {
			t00: gaussian_filter(&n_rr, sigma),
			t01: gaussian_filter(&n_rc, sigma),
			t11: gaussian_filter(&n_cc, sigma),
		}
	} else {
		TensorField {
			t00: n_rr,
			t01: n_rc,
			t11: n_cc,
		}
	}
}

/// Summary of one symmetric 2x2 tensor: (anisotropy, angle in degrees,
/// energy). Anisotropy is (l_max - l_min) / (l_max + l_min) when the sum is
/// non-zero, else 0; the angle is atan2(2 T01, T11 - T00) / 2; the energy is
/// |T00| + |T11|.
pub fn eigen_summary(t00: f64, t01: f64, t11: f64) -> (f64, f64, f64) {
	let (lo, hi) = eigvals_sym2(t00, t01, t11);
	let sum = lo + hi;
	let anisotropy = if sum != 0.0 { (hi - lo) / sum } else { 0.0 };
	let angle = 0.5 * (2.0 * t01).atan2(t11 - t00) * 180.0 / std::f64::consts::PI;
	let energy = t00.abs() + t11.abs();
	(anisotropy, angle, energy)
}

/// Per-pixel eigen summary of a tensor field, returning the anisotropy,
/// angle and energy maps.
pub fn tensor_analysis(field: &TensorField) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
	let (rows, cols) = field.dim();
	let mut anis = Array2::<f64>::zeros((rows, cols));
	let mut angle = Array2::<f64>::zeros((rows, cols));
	let mut energy = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let (a, th, e) =
				eigen_summary(field.t00[[r, c]], field.t01[[r, c]], field.t11[[r, c]]);
			anis[[r, c]] = a;
			angle[[r, c]] = th;
			energy[[r, c]] = e;
		}
	}
	(anis, angle, energy)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_eigen_summary_isotropic() {
		let (anis, _, energy) = eigen_summary(1.0, 0.0, 1.0);
		assert_eq!(0.0, anis);
		assert_eq!(2.0, energy);
	}

	#[test]
	fn test_eigen_summary_fully_anisotropic() {
		let (anis, angle, _) = eigen_summary(0.0, 0.0, 1.0);
		assert!((anis - 1.0).abs() < 1e-12);
		assert!(angle.abs() < 1e-12);
	}

	#[test]
	fn test_nematic_zero_gradient() {
		let image = Array2::<f64>::from_elem((8, 8), 0.4);
		let field = nematic_tensor(&image, 0.0);
		assert!(field.t00.iter().all(|&v| v == 0.0));
		assert!(field.t01.iter().all(|&v| v == 0.0));
		assert!(field.t11.iter().all(|&v| v == 0.0));
	}

	#[test]
	fn test_nematic_vertical_stripes() {
		// intensity varies along columns only: gradient points along c,
		// nematic tensor aligns with the row axis
		let mut image = Array2::<f64>::zeros((10, 10));
		for r in 0..10 {
			for c in 0..10 {
				image[[r, c]] = c as f64;
			}
		}
		let field = nematic_tensor(&image, 0.0);
		let (anis, _, _) = tensor_analysis(&field);
		// interior pixels have unit anisotropy
		assert!((field.t00[[5, 5]] - 0.0).abs() < 1e-12);
		assert!((field.t11[[5, 5]] - 1.0).abs() < 1e-12);
		assert!((anis[[5, 5]] - 1.0).abs() < 1e-12);
	}

	#[test]
	fn test_structure_tensor_ramp() {
		let mut image = Array2::<f64>::zeros((10, 10));
		for r in 0..10 {
			for c in 0..10 {
				image[[r, c]] = r as f64;
			}
		}
		let field = structure_tensor(&image, 0.0);
		assert!((field.t00[[5, 5]] - 1.0).abs() < 1e-12);
		assert!(field.t11[[5, 5]].abs() < 1e-12);
	}
}
