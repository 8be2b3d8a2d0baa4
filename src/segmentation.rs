use ndarray::Array2;

use crate::bd_filter::BDFilter;
use crate::constants::segment;
use crate::error::Result;
use crate::fibres::FibreNetwork;
use crate::filters::gaussian_filter;
use crate::graph::FibreGraph;
use crate::image_stack::{ImageStack, StackKind};
use crate::morphology::{binary_closing, binary_dilation, remove_small_holes};
use crate::preprocess::{equalize_adapthist, rescale, resize};
use crate::regions::{binary_to_regions, Region};

/// Integer Bresenham line between two pixels, inclusive.
fn draw_line(mask: &mut Array2<bool>, start: (isize, isize), end: (isize, isize)) {
	let (rows, cols) = mask.dim();
	let (mut r, mut c) = start;
	let dr = (end.0 - start.0).abs();
	let dc = (end.1 - start.1).abs();
	let step_r = if start.0 < end.0 { 1 } else { -1 };
	let step_c = if start.1 < end.1 { 1 } else { -1 };
	let mut err = dr - dc;
	loop {
		if r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols {
			mask[[r as usize, c as usize]] = true;
		}
		if r == end.0 && c == end.1 {
			break;
		}
		let e2 = 2 * err;
		if e2 > -dc {
			err -= dc;
			r += step_r;
		}
		if e2 < dr {
			err += dr;
			c += step_c;
		}
	}
}

/// Rasterise a network's nodes and edges onto a mask.
fn draw_network(graph: &FibreGraph, mask: &mut Array2<bool>) {
	let (rows, cols) = mask.dim();
	for (_, xy) in graph.node_coords() {
		let r = xy[0].round() as isize;
		let c = xy[1].round() as isize;
		if r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols {
			mask[[r as usize, c as usize]] = true;
		}
	}
	for (a, b, _) in graph.edges() {
		if let (Some(start), Some(end)) = (graph.node_xy(a), graph.node_xy(b)) {
			draw_line(
				mask,
				(start[0].round() as isize, start[1].round() as isize),
				(end[0].round() as isize, end[1].round() as isize),
			);
		}
	}
}

/// Rasterise, dilate, fill and smooth the networks into a fibre binary.
pub fn networks_to_binary(
	networks: &[FibreNetwork],
	shape: (usize, usize),
	area_threshold: usize,
	iterations: usize,
	sigma: f64,
) -> Array2<bool> {
	let mut mask = Array2::<bool>::from_elem(shape, false);
	for network in networks {
		draw_network(&network.graph, &mut mask);
	}
	let dilated = binary_dilation(&mask, iterations);
	let filled = remove_small_holes(&dilated, area_threshold);
	let smoothed = gaussian_filter(&filled.mapv(|v| if v { 1.0 } else { 0.0 }), sigma);
	smoothed.mapv(|v| v >= 0.5)
}

/// Soft fibre-emphasis filter used by the BD stack: 2 inside the network
/// regions, 0.25 outside, Gaussian-blended.
pub fn create_fibre_filter(networks: &[FibreNetwork], shape: (usize, usize)) -> Array2<f64> {
	let binary = networks_to_binary(
		networks,
		shape,
		segment::NETWORK_AREA_THRESHOLD,
		segment::FILTER_DILATION,
		segment::FILTER_SIGMA,
	);
	let raw = binary.mapv(|v| if v { 2.0 } else { 0.25 });
	gaussian_filter(&raw, segment::FILTER_SIGMA)
}

/// Combine binaries through their mean weighted by the image, keeping
/// pixels whose blended intensity reaches `min_intensity`.
pub fn mean_binary(
	binaries: &[&Array2<bool>],
	image: &Array2<f64>,
	min_intensity: f64,
) -> Array2<bool> {
	let (rows, cols) = image.dim();
	let mut blended = Array2::<f64>::zeros((rows, cols));
	for r in 0..rows {
		for c in 0..cols {
			let weight = binaries
				.iter()
				.map(|b| if b[[r, c]] { 1.0 } else { 0.0 })
				.sum::<f64>() / binaries.len() as f64;
			blended[[r, c]] = image[[r, c]] * weight;
		}
	}
	let binary = blended.mapv(|v| v >= min_intensity);
	remove_small_holes(&binary, segment::SMALL_HOLE_AREA)
}

/// Reassign regions sitting in the wrong mask: cell regions carrying real
/// SHG signal become fibre, fibre regions dominated by PL become cell.
pub fn region_swap(
	cell_mask: &mut Array2<bool>,
	fibre_mask: &mut Array2<bool>,
	shg: &Array2<f64>,
	pl: &Array2<f64>,
) {
	let shg_max = shg.iter().cloned().fold(0.0f64, f64::max);
	let pl_max = pl.iter().cloned().fold(0.0f64, f64::max);

	if shg_max > 0.0 {
		for region in binary_to_regions(cell_mask, shg, 1, 0.0) {
			if region.area() >= segment::SWAP_CELL_MIN_SIZE
				&& region.masked_mean() > segment::SWAP_CELL_MIN_FRAC * shg_max
			{
				move_region(&region, cell_mask, fibre_mask);
			}
		}
	}
	if pl_max > 0.0 {
		for region in binary_to_regions(fibre_mask, pl, 1, 0.0) {
			if region.area() >= segment::SWAP_FIBRE_MIN_SIZE
				&& region.masked_mean() > segment::SWAP_FIBRE_MIN_FRAC * pl_max
			{
				move_region(&region, fibre_mask, cell_mask);
			}
		}
	}
}

fn move_region(region: &Region, from: &mut Array2<bool>, to: &mut Array2<bool>) {
	let (min_row, min_col, _, _) = region.bbox;
	let (rows, cols) = region.mask.dim();
	for r in 0..rows {
		for c in 0..cols {
			if region.mask[[r, c]] {
				from[[min_row + r, min_col + c]] = false;
				to[[min_row + r, min_col + c]] = true;
			}
		}
	}
}

/// K-means segmentation of an RGB-mimicking stack into fibre and cell
/// masks. The pixel vectors are unit-normalised, the stack is rescaled for
/// clustering accuracy, and the resulting mask is resized back.
pub fn rgb_segmentation(
	stack: &[Array2<f64>; 3],
	scale: f64,
	bd_filter: &BDFilter,
) -> Result<(Array2<bool>, Array2<bool>)> {
	let (rows, cols) = stack[0].dim();
	let mut normalised = stack.clone();
	for r in 0..rows {
		for c in 0..cols {
			let mag = (0..3)
				.map(|i| stack[i][[r, c]] * stack[i][[r, c]])
				.sum::<f64>()
				.sqrt();
			if mag > 0.0 {
				for channel in normalised.iter_mut() {
					channel[[r, c]] /= mag;
				}
			}
		}
	}

	let scaled = [
		rescale(&normalised[0], scale),
		rescale(&normalised[1], scale),
		rescale(&normalised[2], scale),
	];
	let mask = bd_filter.filter_image(&scaled)?;

	let mask_float = mask.mapv(|v| if v { 1.0 } else { 0.0 });
	let restored = resize(&mask_float, rows, cols);
	let cell_mask = restored.mapv(|v| v > 0.0);
	let fibre_mask = cell_mask.mapv(|v| !v);
	Ok((fibre_mask, cell_mask))
}

/// SHG-only pipeline: the fibre binary is the rasterised network, the cell
/// binary its complement.
pub fn shg_segmentation(
	stack: &ImageStack,
	networks: &[FibreNetwork],
) -> Result<(Vec<Region>, Vec<Region>)> {
	let shape = stack.shape();
	let fibre_binary = networks_to_binary(
		networks,
		shape,
		segment::NETWORK_AREA_THRESHOLD,
		segment::NETWORK_DILATION,
		segment::NETWORK_SIGMA,
	);
	let cell_binary = fibre_binary.mapv(|v| !v);

	let fibre_segments = binary_to_regions(
		&fibre_binary,
		&stack.shg,
		segment::FIBRE_MIN_SIZE,
		segment::FIBRE_MIN_FRAC,
	);
	let cell_min_frac = if stack.pl.is_some() {
		segment::CELL_MIN_FRAC
	} else {
		segment::SHG_CELL_MIN_FRAC
	};
	let cell_segments = binary_to_regions(
		&cell_binary,
		stack.cell_channel(),
		segment::CELL_MIN_SIZE,
		cell_min_frac,
	);
	Ok((fibre_segments, cell_segments))
}

/// Full BD pipeline for shg + pl + trans stacks: k-means mask, region swap
/// against the channels, then reconciliation with the network binary.
pub fn shg_pl_trans_segmentation(
	stack: &ImageStack,
	networks: &[FibreNetwork],
	scale: f64,
	bd_filter: &BDFilter,
) -> Result<(Vec<Region>, Vec<Region>)> {
	let shape = stack.shape();
	let (pl, trans) = match (&stack.pl, &stack.trans) {
		(Some(pl), Some(trans)) => (pl, trans),
		// without the full stack the SHG pipeline applies
		_ => return shg_segmentation(stack, networks),
	};

	let fibre_filter = create_fibre_filter(networks, shape);
	let filter_mean = fibre_filter.sum() / fibre_filter.len() as f64;
	let original_binary = fibre_filter.mapv(|v| v >= filter_mean);

	let (rows, cols) = shape;
	let mut weighted_shg = Array2::<f64>::zeros(shape);
	let mut pl_trans = Array2::<f64>::zeros(shape);
	for r in 0..rows {
		for c in 0..cols {
			weighted_shg[[r, c]] = stack.shg[[r, c]] * fibre_filter[[r, c]];
			pl_trans[[r, c]] = (pl[[r, c]] * trans[[r, c]]).max(0.0).sqrt();
		}
	}
	let bd_stack = [weighted_shg, pl_trans, equalize_adapthist(trans)];

	let (mut fibre_mask, mut cell_mask) = rgb_segmentation(&bd_stack, scale, bd_filter)?;
	region_swap(&mut cell_mask, &mut fibre_mask, &stack.shg, pl);
	fibre_mask = remove_small_holes(&fibre_mask, segment::SMALL_HOLE_AREA);
	cell_mask = remove_small_holes(&cell_mask, segment::SMALL_HOLE_AREA);

	fibre_mask = binary_dilation(&fibre_mask, 2);
	fibre_mask = binary_closing(&fibre_mask, 1);

	let fibre_binary = mean_binary(
		&[&original_binary, &fibre_mask],
		&stack.shg,
		segment::MEAN_BINARY_MIN_INTENSITY,
	);
	let cell_binary = fibre_binary.mapv(|v| !v);

	let fibre_segments = binary_to_regions(
		&fibre_binary,
		&stack.shg,
		segment::FIBRE_MIN_SIZE,
		segment::FIBRE_MIN_FRAC,
	);
	let cell_segments = binary_to_regions(
		&cell_binary,
		pl,
		segment::CELL_MIN_SIZE,
		segment::CELL_MIN_FRAC,
	);
	Ok((fibre_segments, cell_segments))
}

/// Dispatch on the channels present. `{shg, pl}` stacks use the SHG
/// pipeline with cell intensities measured on the PL channel.
pub fn segment_image(
	stack: &ImageStack,
	networks: &[FibreNetwork],
	scale: f64,
	bd_filter: &BDFilter,
) -> Result<(Vec<Region>, Vec<Region>)> {
	match stack.kind() {
		StackKind::ShgPlTrans => shg_pl_trans_segmentation(stack, networks, scale, bd_filter),
		_ => shg_segmentation(stack, networks),
	}
}
