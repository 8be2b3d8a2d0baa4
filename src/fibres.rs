use std::collections::BTreeSet;

use serde_derive::{Deserialize, Serialize};

use crate::constants::analysis::MIN_FIBRE_NODES;
use crate::graph::{FibreGraph, NodeLinkGraph};
use crate::simplify::simplify_network;

/// An ordered, un-branched chain of nodes extracted from a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fibre {
	pub node_ids: Vec<usize>,
	pub euclid_l: f64,
	pub fibre_l: f64,
	pub direction: [f64; 2],
	pub angle: f64,
}

impl Fibre {
	/// Build a fibre from a node chain of a graph, accumulating edge `r`
	/// lengths along the chain.
	pub fn from_chain(graph: &FibreGraph, node_ids: Vec<usize>) -> Self {
		let mut fibre_l = 0.0;
		for pair in node_ids.windows(2) {
			fibre_l += graph.edge_r(pair[0], pair[1]).unwrap_or(0.0);
		}
		let start = node_ids
			.first()
			.and_then(|&id| graph.node_xy(id))
			.unwrap_or([0.0, 0.0]);
		let end = node_ids
			.last()
			.and_then(|&id| graph.node_xy(id))
			.unwrap_or([0.0, 0.0]);
		let d_coord = [end[0] - start[0], end[1] - start[1]];
		let euclid_l = (d_coord[0] * d_coord[0] + d_coord[1] * d_coord[1]).sqrt();
		let direction = if euclid_l > 0.0 {
			[-d_coord[0] / euclid_l, -d_coord[1] / euclid_l]
		} else {
			[0.0, 0.0]
		};
		let angle = direction[1].max(-1.0).min(1.0).acos() * 180.0 / std::f64::consts::PI;
		Self {
			node_ids,
			euclid_l,
			fibre_l,
			direction,
			angle,
		}
	}

	/// Ratio of end-to-end length to along-fibre length; 1 is perfectly
	/// straight. NaN for a degenerate chain.
	pub fn waviness(&self) -> f64 {
		if self.fibre_l > 0.0 {
			self.euclid_l / self.fibre_l
		} else {
			f64::NAN
		}
	}

	pub fn number_of_nodes(&self) -> usize {
		self.node_ids.len()
	}
}

/// A connected component of the extracted network together with its reduced
/// graph and assigned fibres.
#[derive(Debug, Clone)]
pub struct FibreNetwork {
	pub graph: FibreGraph,
	pub red_graph: FibreGraph,
	pub fibres: Vec<Fibre>,
}

impl FibreNetwork {
	pub fn node_list(&self) -> Vec<usize> {
		self.graph.node_ids()
	}
}

/// Serialisable record of one fibre: its chain subgraph in node-link form
/// plus the derived lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibreRecord {
	pub graph: NodeLinkGraph,
	pub euclid_l: f64,
	pub fibre_l: f64,
	pub waviness: f64,
	pub angle: f64,
}

impl FibreRecord {
	pub fn from_fibre(network: &FibreGraph, fibre: &Fibre) -> Self {
		let chain = network.subgraph(&fibre.node_ids);
		Self {
			graph: chain.to_node_link(),
			euclid_l: fibre.euclid_l,
			fibre_l: fibre.fibre_l,
			waviness: fibre.waviness(),
			angle: fibre.angle,
		}
	}
}

fn unit(from: [f64; 2], to: [f64; 2]) -> Option<[f64; 2]> {
	let v = [to[0] - from[0], to[1] - from[1]];
	let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
	if norm > 0.0 {
		Some([v[0] / norm, v[1] / norm])
	} else {
		None
	}
}

/// Decompose a connected graph into maximally linear chains.
///
/// Degree-1 endpoints are ranked by the longest shortest-path (over `r`) to
/// any other endpoint; walks start from the top-ranked unclaimed endpoint
/// and at every junction take the neighbour with the smallest angular
/// deviation from the running start-to-current direction. Walks stop at the
/// next endpoint or when every onward neighbour is claimed. Chains shorter
/// than four nodes are discarded, but their nodes stay claimed.
pub fn fibre_assignment(graph: &FibreGraph) -> Vec<Fibre> {
	let endpoints: Vec<usize> = graph
		.node_ids()
		.into_iter()
		.filter(|&id| graph.degree(id) == 1)
		.collect();

	let mut ranked: Vec<(f64, usize)> = endpoints
		.iter()
		.map(|&e| {
			let dist = graph.shortest_path_lengths(e);
			let reach = endpoints
				.iter()
				.filter(|&&other| other != e)
				.filter_map(|other| dist.get(other))
				.fold(0.0f64, |acc, &d| acc.max(d));
			(reach, e)
		})
		.collect();
	ranked.sort_by(|a, b| {
		b.0.partial_cmp(&a.0)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then(a.1.cmp(&b.1))
	});

	let mut claimed: BTreeSet<usize> = BTreeSet::new();
	let mut fibres = Vec::new();

	for &(_, start) in &ranked {
		if claimed.contains(&start) {
			continue;
		}
		let mut chain = vec![start];
		claimed.insert(start);
		let start_xy = graph.node_xy(start).unwrap_or([0.0, 0.0]);
		let mut current = start;

		loop {
			let current_xy = graph.node_xy(current).unwrap_or(start_xy);
			let running = unit(start_xy, current_xy);
			let candidates: Vec<usize> = graph
				.neighbours(current)
				.into_iter()
				.filter(|n| !claimed.contains(n))
				.collect();
			if candidates.is_empty() {
				break;
			}
			let next = match running {
				None => candidates[0],
				Some(dir) => {
					let mut best = candidates[0];
					let mut best_cos = f64::NEG_INFINITY;
					for &n in &candidates {
						let cos = match unit(current_xy, graph.node_xy(n).unwrap_or(current_xy)) {
							Some(seg) => dir[0] * seg[0] + dir[1] * seg[1],
							None => f64::NEG_INFINITY,
						};
						if cos > best_cos {
							best_cos = cos;
							best = n;
						}
					}
					best
				}
			};
			chain.push(next);
			claimed.insert(next);
			if graph.degree(next) == 1 {
				break;
			}
			current = next;
		}

		if chain.len() >= MIN_FIBRE_NODES {
			fibres.push(Fibre::from_chain(graph, chain));
		}
	}
	fibres
}

/// Split a graph into connected components and keep those yielding at least
/// one fibre, each paired with its reduced graph. Networks are ordered by
/// descending node count.
pub fn fibre_network_assignment(graph: &FibreGraph) -> Vec<FibreNetwork> {
	let mut networks = Vec::new();
	for component in graph.connected_components() {
		let subgraph = graph.subgraph(&component);
		let fibres = fibre_assignment(&subgraph);
		if fibres.is_empty() {
			continue;
		}
		let red_graph = simplify_network(&subgraph);
		networks.push(FibreNetwork {
			graph: subgraph,
			red_graph,
			fibres,
		});
	}
	networks.sort_by(|a, b| b.graph.number_of_nodes().cmp(&a.graph.number_of_nodes()));
	networks
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::generate_probe_graph;

	#[test]
	fn test_probe_fibre_attributes() {
		let graph = generate_probe_graph();
		let fibre = Fibre::from_chain(&graph, vec![2, 3, 4, 5]);
		assert!((fibre.euclid_l - 3.60555127).abs() < 1e-6);
		assert!((fibre.fibre_l - 3.82842712).abs() < 1e-6);
		assert!((fibre.waviness() - 0.94178396).abs() < 1e-6);
		assert!((fibre.direction[0] + 0.5547002).abs() < 1e-6);
		assert!((fibre.direction[1] + 0.83205029).abs() < 1e-6);
		assert!((fibre.angle - 146.30993247).abs() < 1e-6);
	}

	#[test]
	fn test_degenerate_fibre() {
		let mut graph = FibreGraph::new();
		graph.add_node_with_id(0, [1.0, 1.0]);
		let fibre = Fibre::from_chain(&graph, vec![0]);
		assert_eq!(0.0, fibre.euclid_l);
		assert!(fibre.waviness().is_nan());
		assert_eq!(90.0, fibre.angle);
	}

	#[test]
	fn test_probe_assignment_single_fibre() {
		let graph = generate_probe_graph();
		let fibres = fibre_assignment(&graph);
		assert_eq!(1, fibres.len());
		assert_eq!(vec![2, 3, 4, 5], fibres[0].node_ids);
		assert!(fibres[0].waviness() <= 1.0);
	}

	#[test]
	fn test_short_chain_discarded() {
		let mut graph = FibreGraph::new();
		graph.add_node_with_id(0, [0.0, 0.0]);
		graph.add_node_with_id(1, [0.0, 1.0]);
		graph.add_node_with_id(2, [0.0, 2.0]);
		graph.add_edge(0, 1, 1.0);
		graph.add_edge(1, 2, 1.0);
		assert!(fibre_assignment(&graph).is_empty());
	}

	#[test]
	fn test_straight_walk_through_junction() {
		// straight horizontal chain with a vertical spur at node 2
		let mut graph = FibreGraph::new();
		for i in 0..5 {
			graph.add_node_with_id(i, [0.0, i as f64]);
		}
		graph.add_node_with_id(5, [1.0, 2.0]);
		for i in 0..4 {
			graph.add_edge(i, i + 1, 1.0);
		}
		graph.add_edge(2, 5, 1.0);
		let fibres = fibre_assignment(&graph);
		// the longest fibre runs straight through the junction
		assert_eq!(vec![0, 1, 2, 3, 4], fibres[0].node_ids);
	}

	#[test]
	fn test_probe_network_assignment() {
		let graph = generate_probe_graph();
		let networks = fibre_network_assignment(&graph);
		assert_eq!(1, networks.len());
		assert_eq!(vec![2, 3, 4, 5], networks[0].node_list());
		assert_eq!(vec![0, 1], networks[0].red_graph.node_ids());
		assert_eq!(1, networks[0].fibres.len());
	}

	#[test]
	fn test_waviness_bounds() {
		let graph = generate_probe_graph();
		for fibre in fibre_assignment(&graph) {
			let w = fibre.waviness();
			assert!(w > 0.0 && w <= 1.0);
			assert!(fibre.euclid_l <= fibre.fibre_l + 1e-12);
		}
	}
}
