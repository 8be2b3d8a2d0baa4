use std::collections::BTreeMap;

use log::debug;
use ndarray::Array2;

use crate::config::FireParams;
use crate::constants::analysis::CLEAN_MIN_NODES;
use crate::constants::fire::GROW_RING_RADIUS;
use crate::filters::{hysteresis, local_maxima, tubeness};
use crate::graph::FibreGraph;
use crate::morphology::distance_transform_edt;

/// Candidate trajectory step found on a ring around a growth tip.
#[derive(Debug, Clone, Copy)]
struct Branch {
	coord: [f64; 2],
	// vector from the branch point towards the ring centre
	vector: [f64; 2],
	r: f64,
}

#[derive(Debug, Clone, Copy)]
struct GrowthState {
	nuc: usize,
	direction: [f64; 2],
	growing: bool,
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
	let dr = a[0] - b[0];
	let dc = a[1] - b[1];
	(dr * dr + dc * dc).sqrt()
}

/// Pixels on the square ring of Chebyshev radius `radius` around `centre`,
/// clipped to the image bounds, in raster order.
fn ring_points(
	shape: (usize, usize),
	centre: [f64; 2],
	radius: usize,
) -> Vec<(usize, usize)> {
	let (rows, cols) = shape;
	let cr = centre[0].round() as isize;
	let cc = centre[1].round() as isize;
	let radius = radius as isize;
	let mut points = Vec::new();
	for dr in -radius..=radius {
		for dc in -radius..=radius {
			if dr.abs().max(dc.abs()) != radius {
				continue;
			}
			let r = cr + dr;
			let c = cc + dc;
			if r >= 0 && c >= 0 && r < rows as isize && c < cols as isize {
				points.push((r as usize, c as usize));
			}
		}
	}
	points
}

/// Greedy co-location pruning: sort candidates by descending intensity and
/// keep one only when no previously kept candidate lies within `thresh`
/// pixels. Survivors are returned in raster order.
fn reduce_coord(
	coords: &[(usize, usize)],
	values: &[f64],
	thresh: f64,
) -> Vec<(usize, usize)> {
	let mut order: Vec<usize> = (0..coords.len()).collect();
	order.sort_by(|&a, &b| {
		values[b]
			.partial_cmp(&values[a])
			.unwrap_or(std::cmp::Ordering::Equal)
			.then(coords[a].cmp(&coords[b]))
	});
	let mut kept: Vec<(usize, usize)> = Vec::new();
	for &i in &order {
		let candidate = coords[i];
		let xy = [candidate.0 as f64, candidate.1 as f64];
		let close = kept
			.iter()
			.any(|&k| distance(xy, [k.0 as f64, k.1 as f64]) <= thresh);
		if !close {
			kept.push(candidate);
		}
	}
	kept.sort_unstable();
	kept
}

/// Local maxima of the image restricted to a ring of pixels, with plateau
/// suppression among equal-valued ring neighbours.
fn ring_maxima(image: &Array2<f64>, ring: &[(usize, usize)], thresh: f64) -> Vec<(usize, usize)> {
	let on_ring: std::collections::HashSet<(usize, usize)> = ring.iter().copied().collect();
	let neighbours = |p: (usize, usize)| -> Vec<(usize, usize)> {
		let mut out = Vec::new();
		for dr in -1isize..=1 {
			for dc in -1isize..=1 {
				if dr == 0 && dc == 0 {
					continue;
				}
				let r = p.0 as isize + dr;
				let c = p.1 as isize + dc;
				if r < 0 || c < 0 {
					continue;
				}
				let q = (r as usize, c as usize);
				if on_ring.contains(&q) {
					out.push(q);
				}
			}
		}
		out
	};

	let mut suppressed: BTreeMap<(usize, usize), bool> =
		ring.iter().map(|&p| (p, false)).collect();
	let mut stack = Vec::new();
	for &p in ring {
		if neighbours(p)
			.iter()
			.any(|&q| image[[q.0, q.1]] > image[[p.0, p.1]])
		{
			suppressed.insert(p, true);
			stack.push(p);
		}
	}
	while let Some(p) = stack.pop() {
		for q in neighbours(p) {
			if !suppressed[&q] && image[[q.0, q.1]] == image[[p.0, p.1]] {
				suppressed.insert(q, true);
				stack.push(q);
			}
		}
	}

	ring.iter()
		.filter(|&&p| !suppressed[&p] && image[[p.0, p.1]] >= thresh)
		.copied()
		.collect()
}

/// Branches leaving `centre` through ring maxima of the image.
fn new_branches(
	image: &Array2<f64>,
	centre: [f64; 2],
	ring: &[(usize, usize)],
	thresh: f64,
) -> Vec<Branch> {
	let candidates = ring_maxima(image, ring, thresh);
	let values: Vec<f64> = candidates.iter().map(|&p| image[[p.0, p.1]]).collect();
	let reduced = reduce_coord(&candidates, &values, 1.0);
	reduced
		.into_iter()
		.map(|p| {
			let coord = [p.0 as f64, p.1 as f64];
			let vector = [centre[0] - coord[0], centre[1] - coord[1]];
			let r = (vector[0] * vector[0] + vector[1] * vector[1]).sqrt();
			Branch { coord, vector, r }
		})
		.filter(|b| b.r > 0.0)
		.collect()
}

/// Modified FIRE network extraction: nucleation points seeded on a ridge
/// map grow trajectories outward until every tip terminates or merges.
pub struct NetworkExtraction {
	params: FireParams,
}

impl NetworkExtraction {
	pub fn new(params: FireParams) -> Self {
		Self { params }
	}

	/// Nucleation coordinates: plateau-aware local maxima at the nucleation
	/// connectivity, thresholded and pruned at `r_thresh` spacing.
	fn nucleation_points(&self, image: &Array2<f64>) -> Vec<(usize, usize)> {
		let maxima = local_maxima(image, self.params.nuc_radius);
		let (rows, cols) = image.dim();
		let mut coords = Vec::new();
		let mut values = Vec::new();
		for r in 0..rows {
			for c in 0..cols {
				if maxima[[r, c]] && image[[r, c]] >= self.params.nuc_thresh {
					coords.push((r, c));
					values.push(image[[r, c]]);
				}
			}
		}
		reduce_coord(&coords, &values, self.params.r_thresh)
	}

	/// Run the growth algorithm over a ridge-enhanced image and return the
	/// resulting graph. The graph may hold several connected components and
	/// keeps isolated nucleation nodes.
	pub fn create_network(&self, image: &Array2<f64>) -> FibreGraph {
		let mut graph = FibreGraph::new();
		let mut state: BTreeMap<usize, GrowthState> = BTreeMap::new();
		let shape = image.dim();

		let nuc_coords = self.nucleation_points(image);
		debug!("No. nucleation nodes = {}", nuc_coords.len());

		for &(r, c) in &nuc_coords {
			let nuc_xy = [r as f64, c as f64];
			let nuc_id = graph.add_node(nuc_xy);
			state.insert(
				nuc_id,
				GrowthState {
					nuc: nuc_id,
					direction: [0.0, 0.0],
					growing: false,
				},
			);

			let ring = ring_points(shape, nuc_xy, (self.params.r_thresh as usize) / 2);
			for branch in new_branches(image, nuc_xy, &ring, self.params.lmp_thresh) {
				let lmp = graph.add_node(branch.coord);
				graph.add_edge(nuc_id, lmp, branch.r);
				state.insert(
					lmp,
					GrowthState {
						nuc: nuc_id,
						// trajectory direction points away from the nucleation
						direction: [-branch.vector[0] / branch.r, -branch.vector[1] / branch.r],
						growing: true,
					},
				);
			}
		}

		// ~2 px of trajectory per iteration; no plausible image needs more
		const MAX_ITERATIONS: usize = 1000;

		let mut iteration = 0usize;
		while iteration < MAX_ITERATIONS {
			let mut grow_ids = Vec::new();
			for (&id, entry) in state.iter_mut() {
				if !entry.growing {
					continue;
				}
				if !graph.contains_node(id) || graph.degree(id) != 1 {
					entry.growing = false;
					continue;
				}
				grow_ids.push(id);
			}
			if grow_ids.is_empty() {
				break;
			}
			let snapshot = graph.node_coords();
			for id in grow_ids {
				if !graph.contains_node(id) || graph.degree(id) != 1 {
					if let Some(entry) = state.get_mut(&id) {
						entry.growing = false;
					}
					continue;
				}
				if state.get(&id).map(|s| s.growing) != Some(true) {
					continue;
				}
				self.grow_tip(&mut graph, &mut state, id, image, &snapshot);
			}
			iteration += 1;
			debug!(
				"Iteration {}: {} nodes",
				iteration,
				graph.number_of_nodes()
			);
		}
		graph
	}

	fn grow_tip(
		&self,
		graph: &mut FibreGraph,
		state: &mut BTreeMap<usize, GrowthState>,
		tip: usize,
		image: &Array2<f64>,
		snapshot: &[(usize, [f64; 2])],
	) {
		let tip_xy = match graph.node_xy(tip) {
			Some(xy) => xy,
			None => return,
		};
		let prior = graph.neighbours(tip)[0];
		let prior_xy = match graph.node_xy(prior) {
			Some(xy) => xy,
			None => return,
		};
		let tip_state = state[&tip];

		let ring = ring_points(image.dim(), tip_xy, GROW_RING_RADIUS);
		let branches = new_branches(image, tip_xy, &ring, self.params.lmp_thresh);

		let theta_thresh = self.params.theta_thresh();
		let surviving: Vec<Branch> = branches
			.into_iter()
			.filter(|b| {
				let cos_the = (tip_state.direction[0] * b.vector[0]
					+ tip_state.direction[1] * b.vector[1])
					/ b.r;
				(cos_the + 1.0).abs() <= theta_thresh
			})
			.collect();

		if surviving.is_empty() {
			if let Some(entry) = state.get_mut(&tip) {
				entry.growing = false;
			}
			// a freshly advanced tip with a short trailing edge is a stub
			if graph.edge_r(tip, prior).unwrap_or(f64::INFINITY) <= self.params.r_thresh / 10.0 {
				graph.transfer_edges(tip, prior);
				state.remove(&tip);
			}
			return;
		}

		// a branch landing on an unconnected node merges the trajectories
		let connected = graph.neighbours(tip);
		let mut close_nodes: Vec<usize> = snapshot
			.iter()
			.filter(|(id, xy)| {
				*id != tip
					&& !connected.contains(id)
					&& graph.contains_node(*id)
					&& surviving.iter().any(|b| distance(*xy, b.coord) <= 1.0)
			})
			.map(|(id, _)| *id)
			.collect();
		close_nodes.sort_unstable();

		if let Some(&new_end) = close_nodes.first() {
			graph.transfer_edges(tip, new_end);
			state.remove(&tip);
			if graph.degree(new_end) != 1 {
				if let Some(entry) = state.get_mut(&new_end) {
					entry.growing = false;
				}
			}
			return;
		}

		// otherwise extend along the longest surviving branch
		let mut best = surviving[0];
		for branch in surviving.iter().skip(1) {
			if branch.r > best.r {
				best = *branch;
			}
		}

		let new_coord = best.coord;
		let new_end_r = distance(new_coord, prior_xy);

		let nuc_xy = graph.node_xy(tip_state.nuc).unwrap_or(prior_xy);
		let dir_vector = [new_coord[0] - nuc_xy[0], new_coord[1] - nuc_xy[1]];
		let dir_r = (dir_vector[0] * dir_vector[0] + dir_vector[1] * dir_vector[1]).sqrt();
		let direction = if dir_r > 0.0 {
			[dir_vector[0] / dir_r, dir_vector[1] / dir_r]
		} else {
			tip_state.direction
		};

		if new_end_r >= self.params.r_thresh {
			let new_end = graph.add_node(new_coord);
			graph.add_edge(tip, new_end, distance(new_coord, tip_xy));
			state.insert(
				new_end,
				GrowthState {
					nuc: tip_state.nuc,
					direction,
					growing: true,
				},
			);
			if let Some(entry) = state.get_mut(&tip) {
				entry.growing = false;
			}
		} else {
			graph.set_node_xy(tip, new_coord);
			graph.set_edge_r(tip, prior, new_end_r);
			if let Some(entry) = state.get_mut(&tip) {
				entry.direction = direction;
			}
		}
	}
}

/// Ridge-enhance an image, gate it through hysteresis, and run the growth
/// algorithm on the Euclidean distance map of the resulting mask, so every
/// threshold reads as a pixel distance. Isolated nucleation nodes are
/// dropped from the result.
pub fn build_network(
	image: &Array2<f64>,
	sigma: f64,
	alpha: f64,
	params: FireParams,
) -> FibreGraph {
	let tube = tubeness(image, sigma);
	let mask = hysteresis(&tube, alpha);
	let distance = distance_transform_edt(&mask);
	let mut network = NetworkExtraction::new(params).create_network(&distance);
	network.remove_isolates();
	network
}

/// Validate the growth-graph invariants: simple, undirected, no
/// self-loops, and a positive length on every edge. Stored networks are
/// checked through this before reuse.
pub fn check_network(graph: &FibreGraph) -> crate::error::Result<()> {
	for (a, b, r) in graph.edges() {
		if a == b {
			return Err(crate::error::FibreError::Extraction(format!(
				"network contains a self-loop at node {}",
				a
			)));
		}
		if !(r > 0.0) {
			return Err(crate::error::FibreError::Extraction(format!(
				"edge ({}, {}) has non-positive length {}",
				a, b, r
			)));
		}
	}
	Ok(())
}

/// Merge nodes lying closer than `r_thresh` to each other (lower id
/// survives, edges transfer) and drop components with fewer than four
/// nodes. Surviving node ids are preserved.
pub fn clean_network(graph: &FibreGraph, r_thresh: f64) -> FibreGraph {
	let mut network = graph.clone();
	loop {
		let coords = network.node_coords();
		let mut merged = false;
		'scan: for i in 0..coords.len() {
			for j in i + 1..coords.len() {
				if distance(coords[i].1, coords[j].1) < r_thresh {
					network.transfer_edges(coords[j].0, coords[i].0);
					merged = true;
					break 'scan;
				}
			}
		}
		if !merged {
			break;
		}
	}

	for component in network.connected_components() {
		if component.len() < CLEAN_MIN_NODES {
			for id in component {
				network.remove_node(id);
			}
		}
	}
	network
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::generate_probe_graph;

	#[test]
	fn test_ring_points_radius() {
		let ring = ring_points((20, 20), [10.0, 10.0], 2);
		assert_eq!(16, ring.len());
		assert!(ring
			.iter()
			.all(|&(r, c)| (r as isize - 10).abs().max((c as isize - 10).abs()) == 2));
	}

	#[test]
	fn test_ring_points_clipped_at_border() {
		let ring = ring_points((20, 20), [0.0, 0.0], 2);
		assert!(ring.len() < 16);
		assert!(ring.iter().all(|&(r, c)| r < 20 && c < 20));
	}

	#[test]
	fn test_reduce_coord_keeps_brightest() {
		let coords = [(5, 5), (5, 6), (10, 10)];
		let values = [1.0, 2.0, 0.5];
		let reduced = reduce_coord(&coords, &values, 2.0);
		assert_eq!(vec![(5, 6), (10, 10)], reduced);
	}

	#[test]
	fn test_empty_image_gives_empty_network() {
		let image = Array2::<f64>::zeros((50, 50));
		let network = NetworkExtraction::new(FireParams::default()).create_network(&image);
		assert!(network.is_empty());
	}

	#[test]
	fn test_single_bright_pixel_gives_single_node() {
		let mut image = Array2::<f64>::zeros((50, 50));
		image[[25, 25]] = 5.0;
		let network = NetworkExtraction::new(FireParams::default()).create_network(&image);
		assert_eq!(1, network.number_of_nodes());
		assert_eq!(0, network.number_of_edges());
	}

	#[test]
	fn test_clean_network_preserves_probe_ids() {
		let graph = generate_probe_graph();
		let cleaned = clean_network(&graph, 1.0);
		assert_eq!(vec![2, 3, 4, 5], cleaned.node_ids());
	}

	#[test]
	fn test_clean_network_collapses_probe() {
		let graph = generate_probe_graph();
		let cleaned = clean_network(&graph, 2.0);
		assert!(cleaned.is_empty());
	}
}
