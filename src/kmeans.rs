use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FibreError, Result};

/// Seeded mini-batch k-means with k-means++ initialisation. The best of
/// `n_init` runs (by inertia) is kept. Outputs are deterministic for a
/// given seed but, as with any floating-point clustering, may differ in the
/// last bits across platforms.
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
	pub n_clusters: usize,
	pub n_init: usize,
	pub batch_size: usize,
	pub max_iter: usize,
	pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
	pub centroids: Vec<Vec<f64>>,
	pub labels: Vec<usize>,
	pub inertia: f64,
}

impl MiniBatchKMeans {
	pub fn new(n_clusters: usize, n_init: usize, seed: u64) -> Self {
		Self {
			n_clusters,
			n_init,
			batch_size: crate::constants::bd::KMEANS_BATCH,
			max_iter: crate::constants::bd::KMEANS_MAX_ITER,
			seed,
		}
	}

	pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit> {
		if data.len() < self.n_clusters {
			return Err(FibreError::Segmentation(format!(
				"k-means needs at least {} samples, got {}",
				self.n_clusters,
				data.len()
			)));
		}
		let mut best: Option<KMeansFit> = None;
		for run in 0..self.n_init {
			let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(run as u64));
			let fit = self.fit_once(data, &mut rng);
			let better = match &best {
				Some(current) => fit.inertia < current.inertia,
				None => true,
			};
			if better {
				best = Some(fit);
			}
		}
		let fit = best.ok_or_else(|| {
			FibreError::Segmentation("k-means produced no clustering".into())
		})?;

		let mut counts = vec![0usize; self.n_clusters];
		for &label in &fit.labels {
			counts[label] += 1;
		}
		if counts.iter().any(|&n| n == 0) {
			return Err(FibreError::Segmentation(
				"k-means failed to converge: empty cluster".into(),
			));
		}
		Ok(fit)
	}

	fn fit_once(&self, data: &[Vec<f64>], rng: &mut StdRng) -> KMeansFit {
		let mut centroids = self.init_plus_plus(data, rng);
		let mut counts = vec![0usize; self.n_clusters];

		for _ in 0..self.max_iter {
			let previous = centroids.clone();
			for _ in 0..self.batch_size.min(data.len()) {
				let point = &data[rng.gen_range(0..data.len())];
				let nearest = nearest_centroid(point, &centroids);
				counts[nearest] += 1;
				let eta = 1.0 / counts[nearest] as f64;
				for (c, x) in centroids[nearest].iter_mut().zip(point.iter()) {
					*c += eta * (x - *c);
				}
			}
			let shift: f64 = centroids
				.iter()
				.zip(previous.iter())
				.map(|(a, b)| {
					a.iter()
						.zip(b.iter())
						.map(|(x, y)| (x - y) * (x - y))
						.sum::<f64>()
				})
				.sum();
			if shift < 1e-8 {
				break;
			}
		}

		let mut labels = Vec::with_capacity(data.len());
		let mut inertia = 0.0;
		for point in data {
			let nearest = nearest_centroid(point, &centroids);
			inertia += squared_distance(point, &centroids[nearest]);
			labels.push(nearest);
		}
		KMeansFit {
			centroids,
			labels,
			inertia,
		}
	}

	fn init_plus_plus(&self, data: &[Vec<f64>], rng: &mut StdRng) -> Vec<Vec<f64>> {
		let mut centroids = Vec::with_capacity(self.n_clusters);
		centroids.push(data[rng.gen_range(0..data.len())].clone());
		let mut distances: Vec<f64> = data
			.iter()
			.map(|p| squared_distance(p, &centroids[0]))
			.collect();
		while centroids.len() < self.n_clusters {
			let total: f64 = distances.iter().sum();
			let chosen = if total > 0.0 {
				let mut target = rng.gen::<f64>() * total;
				let mut index = 0;
				for (i, &d) in distances.iter().enumerate() {
					target -= d;
					if target <= 0.0 {
						index = i;
						break;
					}
				}
				index
			} else {
				rng.gen_range(0..data.len())
			};
			let centre = data[chosen].clone();
			for (d, p) in distances.iter_mut().zip(data.iter()) {
				let candidate = squared_distance(p, &centre);
				if candidate < *d {
					*d = candidate;
				}
			}
			centroids.push(centre);
		}
		centroids
	}
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
	a.iter()
		.zip(b.iter())
		.map(|(x, y)| (x - y) * (x - y))
		.sum()
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
	let mut best = 0;
	let mut best_dist = f64::INFINITY;
	for (i, centre) in centroids.iter().enumerate() {
		let dist = squared_distance(point, centre);
		if dist < best_dist {
			best_dist = dist;
			best = i;
		}
	}
	best
}
