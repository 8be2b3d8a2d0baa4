use std::path::{Path, PathBuf};

use fibrescan::config::AnalysisConfig;
use fibrescan::runner::BatchRunner;

fn cross_image_file(dir: &Path, name: &str) -> PathBuf {
	let path = dir.join(name);
	let size = 80u32;
	let mid = size as f64 / 2.0;
	let mut buffer = image::GrayImage::new(size, size);
	for y in 0..size {
		for x in 0..size {
			let d_row = (y as f64 - mid).abs();
			let d_col = (x as f64 - mid).abs();
			let ridge = (-d_row * d_row / 12.5).exp().max((-d_col * d_col / 12.5).exp());
			buffer.put_pixel(x, y, image::Luma([(ridge * 255.0) as u8]));
		}
	}
	buffer.save(&path).unwrap();
	path
}

#[test]
fn two_workers_four_images_one_corrupt() {
	let dir = tempfile::tempdir().unwrap();
	let mut paths = vec![
		cross_image_file(dir.path(), "a.png"),
		cross_image_file(dir.path(), "b.png"),
		cross_image_file(dir.path(), "c.png"),
	];
	// a file with an image extension but unreadable content
	let corrupt = dir.path().join("d.png");
	std::fs::write(&corrupt, b"not an image at all").unwrap();
	paths.push(corrupt.clone());

	let config = AnalysisConfig::builder().workers(2).p_denoise(5, 10).build();
	let runner = BatchRunner::new(config);
	let result = runner.run(&paths).unwrap();

	assert_eq!(3, result.completed);
	assert_eq!(1, result.failures.len());
	assert_eq!(corrupt, result.failures[0].0);
	assert_eq!(3, result.global.n_rows());

	// the healthy images carry per-image artifacts, the corrupt one none
	assert!(dir.path().join("data").join("a_network.json").is_file());
	assert!(!dir.path().join("data").join("d_network.json").is_file());
}

#[test]
fn batch_reuses_cached_artifacts_on_second_run() {
	let dir = tempfile::tempdir().unwrap();
	let paths = vec![cross_image_file(dir.path(), "single.png")];
	let config = AnalysisConfig::builder().workers(1).p_denoise(5, 10).build();

	let first = BatchRunner::new(config.clone()).run(&paths).unwrap();
	let second = BatchRunner::new(config).run(&paths).unwrap();
	assert_eq!(first.completed, second.completed);
	assert_eq!(first.global.n_rows(), second.global.n_rows());
	assert_eq!(first.global.columns(), second.global.columns());
}
