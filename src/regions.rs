use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};

use crate::error::{FibreError, Result};
use crate::morphology::label;

/// A contiguous set of pixels cut out of a labelled mask: bounding box,
/// bbox-local binary mask and the matching intensity sub-image. Regions are
/// immutable once built.
#[derive(Debug, Clone)]
pub struct Region {
	pub bbox: (usize, usize, usize, usize),
	pub mask: Array2<bool>,
	pub intensity: Array2<f64>,
}

impl Region {
	pub fn area(&self) -> usize {
		self.mask.iter().filter(|&&v| v).count()
	}

	pub fn bbox_shape(&self) -> (usize, usize) {
		self.mask.dim()
	}

	/// Mean intensity over the masked pixels.
	pub fn masked_mean(&self) -> f64 {
		let mut total = 0.0;
		let mut count = 0usize;
		for (m, v) in self.mask.iter().zip(self.intensity.iter()) {
			if *m {
				total += v;
				count += 1;
			}
		}
		if count > 0 {
			total / count as f64
		} else {
			0.0
		}
	}

	/// Raw moment m_pq of the binary mask in local coordinates.
	fn raw_moment(&self, p: u32, q: u32) -> f64 {
		let (rows, cols) = self.mask.dim();
		let mut total = 0.0;
		for r in 0..rows {
			for c in 0..cols {
				if self.mask[[r, c]] {
					total += (r as f64).powi(p as i32) * (c as f64).powi(q as i32);
				}
			}
		}
		total
	}

	fn central_moment(&self, p: u32, q: u32, centroid: (f64, f64)) -> f64 {
		let (rows, cols) = self.mask.dim();
		let mut total = 0.0;
		for r in 0..rows {
			for c in 0..cols {
				if self.mask[[r, c]] {
					total += (r as f64 - centroid.0).powi(p as i32)
						* (c as f64 - centroid.1).powi(q as i32);
				}
			}
		}
		total
	}

	pub fn centroid(&self) -> (f64, f64) {
		let m00 = self.raw_moment(0, 0);
		if m00 == 0.0 {
			return (0.0, 0.0);
		}
		(self.raw_moment(1, 0) / m00, self.raw_moment(0, 1) / m00)
	}

	/// The seven Hu moment invariants of the binary mask.
	pub fn moments_hu(&self) -> [f64; 7] {
		let m00 = self.raw_moment(0, 0);
		if m00 == 0.0 {
			return [0.0; 7];
		}
		let centroid = self.centroid();
		let eta = |p: u32, q: u32| {
			self.central_moment(p, q, centroid) / m00.powf(1.0 + (p + q) as f64 / 2.0)
		};
		let (n20, n02, n11) = (eta(2, 0), eta(0, 2), eta(1, 1));
		let (n30, n03, n21, n12) = (eta(3, 0), eta(0, 3), eta(2, 1), eta(1, 2));

		let h1 = n20 + n02;
		let h2 = (n20 - n02).powi(2) + 4.0 * n11 * n11;
		let h3 = (n30 - 3.0 * n12).powi(2) + (3.0 * n21 - n03).powi(2);
		let h4 = (n30 + n12).powi(2) + (n21 + n03).powi(2);
		let h5 = (n30 - 3.0 * n12)
			* (n30 + n12)
			* ((n30 + n12).powi(2) - 3.0 * (n21 + n03).powi(2))
			+ (3.0 * n21 - n03)
				* (n21 + n03)
				* (3.0 * (n30 + n12).powi(2) - (n21 + n03).powi(2));
		let h6 = (n20 - n02) * ((n30 + n12).powi(2) - (n21 + n03).powi(2))
			+ 4.0 * n11 * (n30 + n12) * (n21 + n03);
		let h7 = (3.0 * n21 - n03)
			* (n30 + n12)
			* ((n30 + n12).powi(2) - 3.0 * (n21 + n03).powi(2))
			- (n30 - 3.0 * n12)
				* (n21 + n03)
				* (3.0 * (n30 + n12).powi(2) - (n21 + n03).powi(2));
		[h1, h2, h3, h4, h5, h6, h7]
	}

	/// Eccentricity of the equivalent-inertia ellipse, in [0, 1).
	pub fn eccentricity(&self) -> f64 {
		let m00 = self.raw_moment(0, 0);
		if m00 == 0.0 {
			return 0.0;
		}
		let centroid = self.centroid();
		let mu20 = self.central_moment(2, 0, centroid) / m00;
		let mu02 = self.central_moment(0, 2, centroid) / m00;
		let mu11 = self.central_moment(1, 1, centroid) / m00;
		let common = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
		let l_max = (mu20 + mu02 + common) / 2.0;
		let l_min = (mu20 + mu02 - common) / 2.0;
		if l_max <= 0.0 {
			0.0
		} else {
			(1.0 - l_min / l_max).max(0.0).sqrt()
		}
	}

	/// Perimeter counted as exposed 4-neighbour edges of the mask.
	pub fn perimeter(&self) -> f64 {
		let (rows, cols) = self.mask.dim();
		let mut edges = 0usize;
		for r in 0..rows {
			for c in 0..cols {
				if !self.mask[[r, c]] {
					continue;
				}
				for &(dr, dc) in &[(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
					let rr = r as isize + dr;
					let cc = c as isize + dc;
					if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
						edges += 1;
					} else if !self.mask[[rr as usize, cc as usize]] {
						edges += 1;
					}
				}
			}
		}
		edges as f64
	}

	pub fn equivalent_diameter(&self) -> f64 {
		(4.0 * self.area() as f64 / std::f64::consts::PI).sqrt()
	}

	pub fn to_record(&self) -> RegionRecord {
		let (min_row, min_col, max_row, max_col) = self.bbox;
		let mut rle = Vec::new();
		let mut current = false;
		let mut run = 0usize;
		for &v in self.mask.iter() {
			if v == current {
				run += 1;
			} else {
				rle.push(run);
				current = v;
				run = 1;
			}
		}
		rle.push(run);
		RegionRecord {
			bbox: [min_row, min_col, max_row, max_col],
			rle,
		}
	}
}

/// Run-length encoded region: bbox plus alternating false/true run lengths
/// over the row-major bbox mask, starting with a false run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
	pub bbox: [usize; 4],
	pub rle: Vec<usize>,
}

impl RegionRecord {
	/// Rebuild a region, cropping its intensity sub-image from `image`.
	pub fn to_region(&self, image: &Array2<f64>) -> Result<Region> {
		let [min_row, min_col, max_row, max_col] = self.bbox;
		let (rows, cols) = image.dim();
		if max_row > rows || max_col > cols || min_row >= max_row || min_col >= max_col {
			return Err(FibreError::Serialization(format!(
				"region bbox {:?} does not fit image {}x{}",
				self.bbox, rows, cols
			)));
		}
		let shape = (max_row - min_row, max_col - min_col);
		let total: usize = self.rle.iter().sum();
		if total != shape.0 * shape.1 {
			return Err(FibreError::Serialization(
				"region run-length data does not match its bbox".into(),
			));
		}
		let mut flat = Vec::with_capacity(total);
		let mut value = false;
		for &run in &self.rle {
			flat.extend(std::iter::repeat(value).take(run));
			value = !value;
		}
		let mut mask = Array2::<bool>::from_elem(shape, false);
		for (i, v) in flat.into_iter().enumerate() {
			mask[[i / shape.1, i % shape.1]] = v;
		}
		let mut intensity = Array2::<f64>::zeros(shape);
		for r in 0..shape.0 {
			for c in 0..shape.1 {
				intensity[[r, c]] = image[[min_row + r, min_col + c]];
			}
		}
		Ok(Region {
			bbox: (min_row, min_col, max_row, max_col),
			mask,
			intensity,
		})
	}
}

/// Split a binary mask into labelled regions with intensity sub-images,
/// admitting those with at least `min_size` pixels and a masked mean
/// intensity of at least `min_frac`.
pub fn binary_to_regions(
	binary: &Array2<bool>,
	image: &Array2<f64>,
	min_size: usize,
	min_frac: f64,
) -> Vec<Region> {
	let (labels, count) = label(binary, 2);
	let (rows, cols) = binary.dim();
	let mut bboxes = vec![(rows, cols, 0usize, 0usize); count + 1];
	for r in 0..rows {
		for c in 0..cols {
			let l = labels[[r, c]];
			if l == 0 {
				continue;
			}
			let entry = &mut bboxes[l];
			entry.0 = entry.0.min(r);
			entry.1 = entry.1.min(c);
			entry.2 = entry.2.max(r + 1);
			entry.3 = entry.3.max(c + 1);
		}
	}
	let mut regions = Vec::new();
	for l in 1..=count {
		let (min_row, min_col, max_row, max_col) = bboxes[l];
		if min_row >= max_row || min_col >= max_col {
			continue;
		}
		let shape = (max_row - min_row, max_col - min_col);
		let mut mask = Array2::<bool>::from_elem(shape, false);
		let mut intensity = Array2::<f64>::zeros(shape);
		for r in 0..shape.0 {
			for c in 0..shape.1 {
				mask[[r, c]] = labels[[min_row + r, min_col + c]] == l;
				intensity[[r, c]] = image[[min_row + r, min_col + c]];
			}
		}
		let region = Region {
			bbox: (min_row, min_col, max_row, max_col),
			mask,
			intensity,
		};
		if region.area() >= min_size && region.masked_mean() >= min_frac {
			regions.push(region);
		}
	}
	regions
}

/// Paint a set of regions back onto a full-size binary mask.
pub fn regions_to_binary(regions: &[Region], shape: (usize, usize)) -> Array2<bool> {
	let mut binary = Array2::<bool>::from_elem(shape, false);
	for region in regions {
		let (min_row, min_col, _, _) = region.bbox;
		let (rows, cols) = region.mask.dim();
		for r in 0..rows {
			for c in 0..cols {
				if region.mask[[r, c]] {
					binary[[min_row + r, min_col + c]] = true;
				}
			}
		}
	}
	binary
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square_region(side: usize) -> Region {
		let mask = Array2::<bool>::from_elem((side, side), true);
		let intensity = Array2::<f64>::from_elem((side, side), 0.5);
		Region {
			bbox: (0, 0, side, side),
			mask,
			intensity,
		}
	}

	#[test]
	fn test_square_properties() {
		let region = square_region(10);
		assert_eq!(100, region.area());
		assert_eq!(40.0, region.perimeter());
		assert!(region.eccentricity() < 1e-6);
		assert!((region.masked_mean() - 0.5).abs() < 1e-12);
	}

	#[test]
	fn test_elongated_eccentricity() {
		let mask = Array2::<bool>::from_elem((2, 20), true);
		let intensity = Array2::<f64>::zeros((2, 20));
		let region = Region {
			bbox: (0, 0, 2, 20),
			mask,
			intensity,
		};
		assert!(region.eccentricity() > 0.9);
	}

	#[test]
	fn test_hu_translation_invariance() {
		let mut mask_a = Array2::<bool>::from_elem((12, 12), false);
		let mut mask_b = Array2::<bool>::from_elem((12, 12), false);
		for r in 0..4 {
			for c in 0..6 {
				mask_a[[r + 1, c + 1]] = true;
				mask_b[[r + 6, c + 4]] = true;
			}
		}
		let region_a = Region {
			bbox: (0, 0, 12, 12),
			mask: mask_a,
			intensity: Array2::<f64>::zeros((12, 12)),
		};
		let region_b = Region {
			bbox: (0, 0, 12, 12),
			mask: mask_b,
			intensity: Array2::<f64>::zeros((12, 12)),
		};
		let hu_a = region_a.moments_hu();
		let hu_b = region_b.moments_hu();
		for (a, b) in hu_a.iter().zip(hu_b.iter()) {
			assert!((a - b).abs() < 1e-9);
		}
	}

	#[test]
	fn test_binary_to_regions_filters() {
		let mut binary = Array2::<bool>::from_elem((20, 20), false);
		let mut image = Array2::<f64>::zeros((20, 20));
		// bright 4x4 block and a dim 4x4 block
		for r in 2..6 {
			for c in 2..6 {
				binary[[r, c]] = true;
				image[[r, c]] = 0.8;
			}
		}
		for r in 12..16 {
			for c in 12..16 {
				binary[[r, c]] = true;
				image[[r, c]] = 0.01;
			}
		}
		let regions = binary_to_regions(&binary, &image, 10, 0.1);
		assert_eq!(1, regions.len());
		assert_eq!((2, 2, 6, 6), regions[0].bbox);
	}

	#[test]
	fn test_rle_round_trip() {
		let mut binary = Array2::<bool>::from_elem((15, 15), false);
		let mut image = Array2::<f64>::zeros((15, 15));
		for r in 3..9 {
			for c in 4..11 {
				if (r + c) % 3 != 0 {
					binary[[r, c]] = true;
					image[[r, c]] = 0.6;
				}
			}
		}
		let regions = binary_to_regions(&binary, &image, 1, 0.0);
		for region in &regions {
			let record = region.to_record();
			let rebuilt = record.to_region(&image).unwrap();
			assert_eq!(region.bbox, rebuilt.bbox);
			assert_eq!(region.mask, rebuilt.mask);
		}
	}

	#[test]
	fn test_regions_to_binary_round_trip() {
		let mut binary = Array2::<bool>::from_elem((10, 10), false);
		for c in 1..9 {
			binary[[4, c]] = true;
			binary[[5, c]] = true;
		}
		let image = Array2::<f64>::from_elem((10, 10), 1.0);
		let regions = binary_to_regions(&binary, &image, 1, 0.0);
		let painted = regions_to_binary(&regions, (10, 10));
		assert_eq!(binary, painted);
	}
}
