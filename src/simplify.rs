use std::collections::{BTreeMap, BTreeSet};

use crate::graph::FibreGraph;

/// Reduce a connected graph to its junction/end nodes. Every chain of
/// degree-2 nodes collapses to a single edge whose `r` is the summed length
/// along the chain; a closed chain yields a self-loop. The surviving nodes
/// are renumbered 0..k in ascending original-id order.
pub fn simplify_network(graph: &FibreGraph) -> FibreGraph {
	let mut survivors: Vec<usize> = graph
		.node_ids()
		.into_iter()
		.filter(|&id| graph.degree(id) != 2)
		.collect();

	// a pure cycle has no junctions; anchor it at its lowest id
	let pure_cycle = survivors.is_empty() && !graph.is_empty();
	if pure_cycle {
		survivors.push(graph.node_ids()[0]);
	}

	let survivor_set: BTreeSet<usize> = survivors.iter().copied().collect();
	let relabel: BTreeMap<usize, usize> = survivors
		.iter()
		.enumerate()
		.map(|(new, &old)| (old, new))
		.collect();

	let mut reduced = FibreGraph::new();
	for &id in &survivors {
		if let Some(xy) = graph.node_xy(id) {
			reduced.add_node_with_id(relabel[&id], xy);
		}
	}

	let mut visited: BTreeSet<usize> = BTreeSet::new();
	for &start in &survivors {
		for nbr in graph.neighbours(start) {
			if survivor_set.contains(&nbr) {
				// direct edge between survivors, added once
				if start <= nbr {
					let r = graph.edge_r(start, nbr).unwrap_or(0.0);
					reduced.add_edge(relabel[&start], relabel[&nbr], r);
				}
				continue;
			}
			if visited.contains(&nbr) {
				continue;
			}
			// walk the degree-2 chain until the next survivor
			let mut prev = start;
			let mut current = nbr;
			let mut total = graph.edge_r(start, current).unwrap_or(0.0);
			loop {
				visited.insert(current);
				if survivor_set.contains(&current) {
					break;
				}
				let next = graph
					.neighbours(current)
					.into_iter()
					.find(|&n| n != prev);
				let next = match next {
					Some(n) => n,
					None => break,
				};
				total += graph.edge_r(current, next).unwrap_or(0.0);
				prev = current;
				current = next;
				if survivor_set.contains(&current) {
					break;
				}
			}
			if survivor_set.contains(&current) {
				reduced.add_edge(relabel[&start], relabel[&current], total);
			}
		}
	}
	reduced
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::generate_probe_graph;

	#[test]
	fn test_probe_chain_reduces_to_endpoints() {
		let graph = generate_probe_graph();
		let reduced = simplify_network(&graph);
		assert_eq!(vec![0, 1], reduced.node_ids());
		let expected = 2.0 * 2f64.sqrt() + 1.0;
		assert!((reduced.edge_r(0, 1).unwrap() - expected).abs() < 1e-12);
	}

	#[test]
	fn test_junction_survives() {
		// a Y: three arms of two edges joined at node 0
		let mut graph = FibreGraph::new();
		graph.add_node_with_id(0, [0.0, 0.0]);
		let arms = [
			(1, 2, [1.0, 0.0], [2.0, 0.0]),
			(3, 4, [0.0, 1.0], [0.0, 2.0]),
			(5, 6, [1.0, 1.0], [2.0, 2.0]),
		];
		for &(mid, end, mid_xy, end_xy) in &arms {
			graph.add_node_with_id(mid, mid_xy);
			graph.add_node_with_id(end, end_xy);
			graph.add_edge(0, mid, 1.0);
			graph.add_edge(mid, end, 1.0);
		}
		let reduced = simplify_network(&graph);
		// junction + three arm ends
		assert_eq!(4, reduced.number_of_nodes());
		assert_eq!(3, reduced.number_of_edges());
		for (_, _, r) in reduced.edges() {
			assert!((r - 2.0).abs() < 1e-12);
		}
	}

	#[test]
	fn test_pure_cycle_keeps_self_loop() {
		let mut graph = FibreGraph::new();
		for i in 0..4 {
			graph.add_node_with_id(i, [i as f64, 0.0]);
		}
		for i in 0..4 {
			graph.add_edge(i, (i + 1) % 4, 1.0);
		}
		let reduced = simplify_network(&graph);
		assert_eq!(1, reduced.number_of_nodes());
		assert_eq!(Some(4.0), reduced.edge_r(0, 0));
	}

	#[test]
	fn test_connectivity_preserved() {
		// two chains joined at a junction: all degree!=2 nodes stay connected
		let graph = generate_probe_graph();
		let reduced = simplify_network(&graph);
		assert_eq!(1, reduced.connected_components().len());
	}
}
