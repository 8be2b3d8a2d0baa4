/// Percentile of a sample using linear interpolation between order
/// statistics, matching the numpy default.
pub fn percentile(values: &[f64], p: f64) -> f64 {
	if values.is_empty() {
		return f64::NAN;
	}
	let mut sorted: Vec<f64> = values.to_vec();
	sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
	let p = p.max(0.0).min(100.0);
	let rank = p / 100.0 * (sorted.len() - 1) as f64;
	let lo = rank.floor() as usize;
	let hi = rank.ceil() as usize;
	if lo == hi {
		sorted[lo]
	} else {
		let frac = rank - lo as f64;
		sorted[lo] * (1.0 - frac) + sorted[hi] * frac
	}
}

pub fn median(values: &[f64]) -> f64 {
	percentile(values, 50.0)
}

pub fn mean(values: &[f64]) -> f64 {
	if values.is_empty() {
		return f64::NAN;
	}
	values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
	if values.is_empty() {
		return f64::NAN;
	}
	let m = mean(values);
	(values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Pearson correlation coefficient of two equal-length samples.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
	if x.len() != y.len() || x.len() < 2 {
		return f64::NAN;
	}
	let mx = mean(x);
	let my = mean(y);
	let mut cov = 0.0;
	let mut vx = 0.0;
	let mut vy = 0.0;
	for (a, b) in x.iter().zip(y.iter()) {
		cov += (a - mx) * (b - my);
		vx += (a - mx) * (a - mx);
		vy += (b - my) * (b - my);
	}
	if vx <= 0.0 || vy <= 0.0 {
		return f64::NAN;
	}
	cov / (vx * vy).sqrt()
}
