use std::path::Path;

use log::{info, warn};
use ndarray::Array2;

use crate::analysis::{network_metrics, segment_metrics, SegmentMetrics};
use crate::bd_filter::BDFilter;
use crate::config::AnalysisConfig;
use crate::database::{Database, Value};
use crate::error::Result;
use crate::extraction::{build_network, clean_network};
use crate::fibres::{fibre_network_assignment, FibreNetwork, FibreRecord};
use crate::filters::tubeness;
use crate::graph::FibreGraph;
use crate::image_stack::ImageStack;
use crate::object_io::{
	load_database, load_network, load_segments, save_database, save_fibres, save_figure,
	save_network, save_segments, ArtifactPaths,
};
use crate::preprocess::{clip_intensities, nl_means};
use crate::reader::read_stack;
use crate::regions::{regions_to_binary, Region};
use crate::segmentation::segment_image;
use crate::tensors::{nematic_tensor, tensor_analysis};

/// Per-image output tables.
#[derive(Debug, Clone, Default)]
pub struct ImageTables {
	pub global: Database,
	pub fibre: Database,
	pub cell: Database,
}

/// Run the full pipeline over one image file, persisting artifacts beside
/// it and returning the metric tables.
pub fn analyse_image(path: &Path, config: &AnalysisConfig) -> Result<ImageTables> {
	let stack = read_stack(path)?;
	let artifacts = ArtifactPaths::new(path)?;
	artifacts.ensure_data_dir()?;

	let (low, high) = config.p_intensity;
	let shg = clip_intensities(&stack.shg, low, high)?;
	let pl = match &stack.pl {
		Some(pl) => Some(clip_intensities(pl, low, high)?),
		None => None,
	};
	let trans = match &stack.trans {
		Some(trans) => Some(clip_intensities(trans, low, high)?),
		None => None,
	};
	let stack = ImageStack::new(shg, pl, trans)?;

	let denoised = nl_means(&stack.shg, config.p_denoise.0, config.p_denoise.1);

	let network = obtain_network(&artifacts, &denoised, config)?;
	let cleaned = clean_network(&network, config.clean_r_thresh);
	let networks = fibre_network_assignment(&cleaned);
	info!(
		"{}: {} nodes, {} networks",
		path.display(),
		network.number_of_nodes(),
		networks.len()
	);

	let records: Vec<FibreRecord> = networks
		.iter()
		.flat_map(|n| {
			n.fibres
				.iter()
				.map(move |f| FibreRecord::from_fibre(&n.graph, f))
		})
		.collect();
	save_fibres(&artifacts.fibres(), &records)?;

	let (fibre_segments, cell_segments) =
		obtain_segments(&artifacts, &stack, &networks, config)?;

	let tables = obtain_metrics(
		&artifacts,
		path,
		&stack,
		&denoised,
		&networks,
		&fibre_segments,
		&cell_segments,
		config,
	)?;

	if config.save_figures {
		write_figures(&artifacts, &denoised, &fibre_segments, &cell_segments, config)?;
	}

	Ok(tables)
}

fn obtain_network(
	artifacts: &ArtifactPaths,
	denoised: &Array2<f64>,
	config: &AnalysisConfig,
) -> Result<FibreGraph> {
	let path = artifacts.network();
	if path.is_file() && !config.ow_network {
		let network = load_network(&path)?;
		crate::extraction::check_network(&network)?;
		return Ok(network);
	}
	let network = build_network(denoised, config.sigma, config.alpha, config.fire);
	save_network(&path, &network)?;
	Ok(network)
}

fn obtain_segments(
	artifacts: &ArtifactPaths,
	stack: &ImageStack,
	networks: &[FibreNetwork],
	config: &AnalysisConfig,
) -> Result<(Vec<Region>, Vec<Region>)> {
	let fibre_path = artifacts.fibre_segments();
	let cell_path = artifacts.cell_segments();
	if fibre_path.is_file() && cell_path.is_file() && !config.ow_segment {
		let fibre_segments = load_segments(&fibre_path, &stack.shg)?;
		let cell_segments = load_segments(&cell_path, stack.cell_channel())?;
		return Ok((fibre_segments, cell_segments));
	}

	// an empty network produces an empty set of segments, not an error
	let (fibre_segments, cell_segments) = if networks.is_empty() {
		(Vec::new(), Vec::new())
	} else {
		segment_image(stack, networks, config.scale, &BDFilter::default())?
	};
	save_segments(&fibre_path, &fibre_segments)?;
	save_segments(&cell_path, &cell_segments)?;
	Ok((fibre_segments, cell_segments))
}

fn metrics_or_nan(
	region: &Region,
	nematic: &crate::tensors::TensorField,
	anis: &Array2<f64>,
	angle: &Array2<f64>,
	with_sdis: bool,
) -> SegmentMetrics {
	if region.area() == 0 {
		let err = crate::error::FibreError::Metric(format!(
			"degenerate region at {:?}",
			region.bbox
		));
		warn!("{}; emitting NaN metrics", err);
		return SegmentMetrics::nan();
	}
	segment_metrics(region, nematic, anis, angle, with_sdis)
}

#[allow(clippy::too_many_arguments)]
fn obtain_metrics(
	artifacts: &ArtifactPaths,
	path: &Path,
	stack: &ImageStack,
	denoised: &Array2<f64>,
	networks: &[FibreNetwork],
	fibre_segments: &[Region],
	cell_segments: &[Region],
	config: &AnalysisConfig,
) -> Result<ImageTables> {
	let global_path = artifacts.global_metric();
	let fibre_path = artifacts.fibre_metric();
	let cell_path = artifacts.cell_metric();
	if global_path.is_file()
		&& fibre_path.is_file()
		&& cell_path.is_file()
		&& !config.ow_metric
	{
		return Ok(ImageTables {
			global: load_database(&global_path)?,
			fibre: load_database(&fibre_path)?,
			cell: load_database(&cell_path)?,
		});
	}

	let mut tables = ImageTables::default();
	let file_value = Value::Text(path.display().to_string());

	if !networks.is_empty() {
		let nematic = nematic_tensor(denoised, config.sigma);
		let (anis_map, angle_map, _) = tensor_analysis(&nematic);

		for region in fibre_segments {
			let metrics = metrics_or_nan(region, &nematic, &anis_map, &angle_map, true);
			let mut row = vec![("file".to_string(), file_value.clone())];
			row.extend(
				metrics
					.to_columns("")
					.into_iter()
					.map(|(name, v)| (name, Value::Float(v))),
			);
			tables.fibre.push_row(row);
		}
		for region in cell_segments {
			let metrics = metrics_or_nan(region, &nematic, &anis_map, &angle_map, false);
			let mut row = vec![("file".to_string(), file_value.clone())];
			row.extend(
				metrics
					.to_columns("")
					.into_iter()
					.map(|(name, v)| (name, Value::Float(v))),
			);
			tables.cell.push_row(row);
		}

		let row = global_row(path, stack, networks, fibre_segments, &tables);
		tables.global.push_row(row);
	}

	save_database(&global_path, &tables.global)?;
	save_database(&fibre_path, &tables.fibre)?;
	save_database(&cell_path, &tables.cell)?;
	Ok(tables)
}

fn global_row(
	path: &Path,
	stack: &ImageStack,
	networks: &[FibreNetwork],
	fibre_segments: &[Region],
	tables: &ImageTables,
) -> Vec<(String, Value)> {
	let mut row = vec![(
		"file".to_string(),
		Value::Text(path.display().to_string()),
	)];

	let n_fibres: usize = networks.iter().map(|n| n.fibres.len()).sum();
	row.push(("no_networks".into(), Value::Float(networks.len() as f64)));
	row.push(("no_fibres".into(), Value::Float(n_fibres as f64)));
	row.push((
		"no_fibre_segments".into(),
		Value::Float(tables.fibre.n_rows() as f64),
	));
	row.push((
		"no_cell_segments".into(),
		Value::Float(tables.cell.n_rows() as f64),
	));

	// network spectra averaged over components
	let metrics: Vec<_> = networks
		.iter()
		.map(|n| network_metrics(&n.graph, &n.red_graph))
		.collect();
	let nanmean = |values: Vec<f64>| -> f64 {
		let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
		if finite.is_empty() {
			f64::NAN
		} else {
			finite.iter().sum::<f64>() / finite.len() as f64
		}
	};
	row.push((
		"network_degree".into(),
		Value::Float(nanmean(metrics.iter().map(|m| m.degree_r2).collect())),
	));
	row.push((
		"network_eigenvalue".into(),
		Value::Float(nanmean(metrics.iter().map(|m| m.eigen_max).collect())),
	));
	row.push((
		"network_connectivity".into(),
		Value::Float(nanmean(metrics.iter().map(|m| m.connectivity).collect())),
	));
	let cross_links: usize = metrics.iter().map(|m| m.cross_links).sum();
	row.push((
		"cross_link_density".into(),
		Value::Float(if n_fibres > 0 {
			cross_links as f64 / n_fibres as f64
		} else {
			f64::NAN
		}),
	));

	let wavinesses: Vec<f64> = networks
		.iter()
		.flat_map(|n| n.fibres.iter().map(|f| f.waviness()))
		.collect();
	let lengths: Vec<f64> = networks
		.iter()
		.flat_map(|n| n.fibres.iter().map(|f| f.fibre_l))
		.collect();
	row.push(("fibre_waviness".into(), Value::Float(nanmean(wavinesses))));
	row.push(("fibre_length".into(), Value::Float(nanmean(lengths))));

	let shape = stack.shape();
	let fibre_area: usize = fibre_segments.iter().map(|s| s.area()).sum();
	row.push((
		"fibre_coverage".into(),
		Value::Float(fibre_area as f64 / (shape.0 * shape.1) as f64),
	));

	row.extend(tables.fibre.column_means("fibre_"));
	row.extend(tables.cell.column_means("cell_"));
	row
}

fn write_figures(
	artifacts: &ArtifactPaths,
	denoised: &Array2<f64>,
	fibre_segments: &[Region],
	cell_segments: &[Region],
	config: &AnalysisConfig,
) -> Result<()> {
	artifacts.ensure_fig_dir()?;
	let shape = denoised.dim();
	save_figure(&artifacts.figure("tubeness"), &tubeness(denoised, config.sigma))?;
	let fibre_mask =
		regions_to_binary(fibre_segments, shape).mapv(|v| if v { 1.0 } else { 0.0 });
	save_figure(&artifacts.figure("fibre_segment"), &fibre_mask)?;
	let cell_mask =
		regions_to_binary(cell_segments, shape).mapv(|v| if v { 1.0 } else { 0.0 });
	save_figure(&artifacts.figure("cell_segment"), &cell_mask)?;
	Ok(())
}
