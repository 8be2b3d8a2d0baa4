use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{FibreError, Result};
use crate::image_stack::ImageStack;

fn luma_to_array(image: &image::DynamicImage) -> Array2<f64> {
	let grey = image.to_luma32f();
	let (width, height) = grey.dimensions();
	let mut out = Array2::<f64>::zeros((height as usize, width as usize));
	for (x, y, pixel) in grey.enumerate_pixels() {
		out[[y as usize, x as usize]] = pixel.0[0] as f64;
	}
	out
}

fn rgb_to_arrays(image: &image::DynamicImage) -> [Array2<f64>; 3] {
	let rgb = image.to_rgb32f();
	let (width, height) = rgb.dimensions();
	let shape = (height as usize, width as usize);
	let mut channels = [
		Array2::<f64>::zeros(shape),
		Array2::<f64>::zeros(shape),
		Array2::<f64>::zeros(shape),
	];
	for (x, y, pixel) in rgb.enumerate_pixels() {
		for i in 0..3 {
			channels[i][[y as usize, x as usize]] = pixel.0[i] as f64;
		}
	}
	channels
}

fn has_colour(image: &image::DynamicImage) -> bool {
	use image::ColorType::*;
	matches!(
		image.color(),
		Rgb8 | Rgba8 | Rgb16 | Rgba16 | Rgb32F | Rgba32F
	)
}

/// Sibling files sharing the stem of `path` with `-shg` / `-pl` / `-trans`
/// suffixes, e.g. `sample-shg.tif` next to `sample-pl.tif`.
fn sibling(path: &Path, tag: &str) -> Option<PathBuf> {
	let stem = path.file_stem()?.to_str()?;
	let base = stem
		.strip_suffix("-shg")
		.or_else(|| stem.strip_suffix("-pl"))
		.or_else(|| stem.strip_suffix("-trans"))?;
	let extension = path.extension()?.to_str()?;
	let candidate = path.with_file_name(format!("{}-{}.{}", base, tag, extension));
	if candidate.is_file() {
		Some(candidate)
	} else {
		None
	}
}

fn decode_grey(path: &Path) -> Result<Array2<f64>> {
	let decoded = image::open(path)?;
	Ok(luma_to_array(&decoded))
}

/// Read a multi-channel stack from disk.
///
/// An RGB file maps its channels onto (shg, pl, trans); a greyscale file is
/// an shg channel, collated with any `-pl` / `-trans` siblings of the same
/// stem. Channel shape mismatches are an `InputShape` error.
pub fn read_stack(path: &Path) -> Result<ImageStack> {
	if !path.is_file() {
		return Err(FibreError::FileNotFound(path.to_path_buf()));
	}
	let decoded = image::open(path)?;
	if has_colour(&decoded) {
		let [shg, pl, trans] = rgb_to_arrays(&decoded);
		return ImageStack::new(shg, Some(pl), Some(trans));
	}

	let shg = luma_to_array(&decoded);
	let pl = match sibling(path, "pl") {
		Some(pl_path) => Some(decode_grey(&pl_path)?),
		None => None,
	};
	let trans = match sibling(path, "trans") {
		Some(trans_path) => Some(decode_grey(&trans_path)?),
		None => None,
	};
	// a trans channel is only usable alongside pl
	let trans = if pl.is_some() { trans } else { None };
	ImageStack::new(shg, pl, trans)
}

/// Recursively collect analysable image files beneath each input path.
/// `-pl` / `-trans` companion files are folded into their `-shg` stem and
/// not listed separately.
pub fn collect_image_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
	let mut files = Vec::new();
	for path in paths {
		if path.is_dir() {
			collect_dir(path, &mut files)?;
		} else if path.is_file() {
			files.push(path.clone());
		} else {
			return Err(FibreError::FileNotFound(path.clone()));
		}
	}
	files.retain(|p| !is_companion(p));
	files.sort();
	files.dedup();
	Ok(files)
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_dir() {
			if path
				.file_name()
				.and_then(|n| n.to_str())
				.map(|n| n == crate::constants::file::DATA_DIR
					|| n == crate::constants::file::FIG_DIR)
				.unwrap_or(false)
			{
				continue;
			}
			collect_dir(&path, files)?;
		} else if is_image_file(&path) {
			files.push(path);
		}
	}
	Ok(())
}

fn is_image_file(path: &Path) -> bool {
	let valid_extensions = ["tif", "tiff", "png"];
	path.extension()
		.and_then(|e| e.to_str())
		.map(|e| valid_extensions.contains(&e.to_lowercase().as_str()))
		.unwrap_or(false)
}

fn is_companion(path: &Path) -> bool {
	path.file_stem()
		.and_then(|s| s.to_str())
		.map(|s| s.ends_with("-pl") || s.ends_with("-trans"))
		.unwrap_or(false)
}
