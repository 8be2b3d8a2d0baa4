use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::constants::file as file_names;
use crate::database::Database;
use crate::error::{FibreError, Result};
use crate::fibres::FibreRecord;
use crate::graph::{FibreGraph, NodeLinkGraph};
use crate::regions::{Region, RegionRecord};

/// Artifact locations for one analysed image: a `data/` directory beside
/// the image holds the JSON and metric files, `fig/` the optional figures.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
	data_dir: PathBuf,
	fig_dir: PathBuf,
	stem: String,
}

impl ArtifactPaths {
	pub fn new(image_path: &Path) -> Result<Self> {
		let parent = image_path
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.ok_or_else(|| FibreError::FileNotFound(image_path.to_path_buf()))?;
		let stem = image_path
			.file_stem()
			.and_then(|s| s.to_str())
			.ok_or_else(|| FibreError::FileNotFound(image_path.to_path_buf()))?;
		Ok(Self {
			data_dir: parent.join(file_names::DATA_DIR),
			fig_dir: parent.join(file_names::FIG_DIR),
			stem: stem.to_string(),
		})
	}

	pub fn ensure_data_dir(&self) -> Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		Ok(())
	}

	pub fn ensure_fig_dir(&self) -> Result<()> {
		std::fs::create_dir_all(&self.fig_dir)?;
		Ok(())
	}

	fn data_file(&self, suffix: &str) -> PathBuf {
		self.data_dir.join(format!("{}{}", self.stem, suffix))
	}

	pub fn network(&self) -> PathBuf {
		self.data_file(file_names::NETWORK_SUFFIX)
	}

	pub fn fibres(&self) -> PathBuf {
		self.data_file(file_names::FIBRE_SUFFIX)
	}

	pub fn fibre_segments(&self) -> PathBuf {
		self.data_file(file_names::FIBRE_SEGMENT_SUFFIX)
	}

	pub fn cell_segments(&self) -> PathBuf {
		self.data_file(file_names::CELL_SEGMENT_SUFFIX)
	}

	pub fn global_metric(&self) -> PathBuf {
		self.data_file(file_names::GLOBAL_METRIC_SUFFIX)
	}

	pub fn fibre_metric(&self) -> PathBuf {
		self.data_file(file_names::FIBRE_METRIC_SUFFIX)
	}

	pub fn cell_metric(&self) -> PathBuf {
		self.data_file(file_names::CELL_METRIC_SUFFIX)
	}

	pub fn figure(&self, name: &str) -> PathBuf {
		self.fig_dir.join(format!("{}_{}.png", self.stem, name))
	}
}

pub fn save_network(path: &Path, graph: &FibreGraph) -> Result<()> {
	let file = File::create(path)?;
	serde_json::to_writer(BufWriter::new(file), &graph.to_node_link())?;
	Ok(())
}

pub fn load_network(path: &Path) -> Result<FibreGraph> {
	let file = File::open(path)?;
	let data: NodeLinkGraph = serde_json::from_reader(BufReader::new(file))?;
	FibreGraph::from_node_link(&data)
}

pub fn save_fibres(path: &Path, fibres: &[FibreRecord]) -> Result<()> {
	let file = File::create(path)?;
	serde_json::to_writer(BufWriter::new(file), fibres)?;
	Ok(())
}

pub fn load_fibres(path: &Path) -> Result<Vec<FibreRecord>> {
	let file = File::open(path)?;
	Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub fn save_segments(path: &Path, segments: &[Region]) -> Result<()> {
	let records: Vec<RegionRecord> = segments.iter().map(|s| s.to_record()).collect();
	let file = File::create(path)?;
	serde_json::to_writer(BufWriter::new(file), &records)?;
	Ok(())
}

/// Load segments, re-attaching intensity sub-images cropped from `image`.
pub fn load_segments(path: &Path, image: &Array2<f64>) -> Result<Vec<Region>> {
	let file = File::open(path)?;
	let records: Vec<RegionRecord> = serde_json::from_reader(BufReader::new(file))?;
	records.iter().map(|r| r.to_region(image)).collect()
}

pub fn save_database(path: &Path, database: &Database) -> Result<()> {
	let file = File::create(path)?;
	database.to_csv(&mut BufWriter::new(file))
}

pub fn load_database(path: &Path) -> Result<Database> {
	let file = File::open(path)?;
	Database::from_csv(BufReader::new(file))
}

/// Write a float map as an 8-bit greyscale PNG, scaled onto its own range.
pub fn save_figure(path: &Path, map: &Array2<f64>) -> Result<()> {
	let (rows, cols) = map.dim();
	let max = map.iter().cloned().fold(0.0f64, f64::max);
	let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
	let mut buffer = Vec::with_capacity(rows * cols);
	for r in 0..rows {
		for c in 0..cols {
			buffer.push((map[[r, c]].max(0.0) * scale).min(255.0) as u8);
		}
	}
	let figure = image::GrayImage::from_raw(cols as u32, rows as u32, buffer)
		.ok_or_else(|| FibreError::Serialization("figure buffer size mismatch".into()))?;
	figure
		.save(path)
		.map_err(|e| FibreError::Image(e))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::generate_probe_graph;

	#[test]
	fn test_artifact_paths() {
		let paths = ArtifactPaths::new(Path::new("/tmp/images/sample.tif")).unwrap();
		assert_eq!(
			PathBuf::from("/tmp/images/data/sample_network.json"),
			paths.network()
		);
		assert_eq!(
			PathBuf::from("/tmp/images/fig/sample_tubeness.png"),
			paths.figure("tubeness")
		);
	}

	#[test]
	fn test_network_file_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("probe_network.json");
		let graph = generate_probe_graph();
		save_network(&path, &graph).unwrap();
		let loaded = load_network(&path).unwrap();
		assert_eq!(graph, loaded);
	}

	#[test]
	fn test_segment_file_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("probe_fibre_segment.json");
		let mut binary = Array2::<bool>::from_elem((20, 20), false);
		let mut image = Array2::<f64>::zeros((20, 20));
		for r in 5..12 {
			for c in 6..15 {
				binary[[r, c]] = true;
				image[[r, c]] = 0.7;
			}
		}
		let segments = crate::regions::binary_to_regions(&binary, &image, 1, 0.0);
		save_segments(&path, &segments).unwrap();
		let loaded = load_segments(&path, &image).unwrap();
		assert_eq!(segments.len(), loaded.len());
		assert_eq!(segments[0].bbox, loaded[0].bbox);
		assert_eq!(segments[0].mask, loaded[0].mask);
	}

	#[test]
	fn test_save_figure() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("map.png");
		let mut map = Array2::<f64>::zeros((6, 9));
		map[[3, 3]] = 2.0;
		save_figure(&path, &map).unwrap();
		assert!(path.is_file());
	}
}
