use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::error::{FibreError, Result};

/// Undirected fibre network graph backed by an arena of integer node ids.
///
/// Node ids are stable for the lifetime of the graph: removing a node never
/// renumbers the others, and fresh nodes always take a previously unused id.
/// Iteration orders are ascending by id, which keeps every downstream
/// algorithm deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FibreGraph {
	nodes: BTreeMap<usize, [f64; 2]>,
	adjacency: BTreeMap<usize, BTreeMap<usize, f64>>,
	next_id: usize,
}

impl FibreGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn number_of_nodes(&self) -> usize {
		self.nodes.len()
	}

	pub fn number_of_edges(&self) -> usize {
		self.edges().len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn contains_node(&self, id: usize) -> bool {
		self.nodes.contains_key(&id)
	}

	/// Insert a node with the next free id and return it.
	pub fn add_node(&mut self, xy: [f64; 2]) -> usize {
		let id = self.next_id;
		self.add_node_with_id(id, xy);
		id
	}

	/// Insert a node under an explicit id (used when deserialising).
	pub fn add_node_with_id(&mut self, id: usize, xy: [f64; 2]) {
		self.nodes.insert(id, xy);
		self.adjacency.entry(id).or_insert_with(BTreeMap::new);
		if id >= self.next_id {
			self.next_id = id + 1;
		}
	}

	pub fn node_xy(&self, id: usize) -> Option<[f64; 2]> {
		self.nodes.get(&id).copied()
	}

	pub fn set_node_xy(&mut self, id: usize, xy: [f64; 2]) {
		if let Some(entry) = self.nodes.get_mut(&id) {
			*entry = xy;
		}
	}

	/// Node ids in ascending order.
	pub fn node_ids(&self) -> Vec<usize> {
		self.nodes.keys().copied().collect()
	}

	/// (id, xy) pairs in ascending id order.
	pub fn node_coords(&self) -> Vec<(usize, [f64; 2])> {
		self.nodes.iter().map(|(&id, &xy)| (id, xy)).collect()
	}

	/// Add an undirected edge with length attribute `r`. Re-adding an edge
	/// overwrites its attribute. Self-loops are stored once.
	pub fn add_edge(&mut self, a: usize, b: usize, r: f64) {
		self.adjacency.entry(a).or_insert_with(BTreeMap::new).insert(b, r);
		self.adjacency.entry(b).or_insert_with(BTreeMap::new).insert(a, r);
		self.nodes.entry(a).or_insert([0.0, 0.0]);
		self.nodes.entry(b).or_insert([0.0, 0.0]);
		if a >= self.next_id {
			self.next_id = a + 1;
		}
		if b >= self.next_id {
			self.next_id = b + 1;
		}
	}

	pub fn edge_r(&self, a: usize, b: usize) -> Option<f64> {
		self.adjacency.get(&a).and_then(|nbrs| nbrs.get(&b)).copied()
	}

	pub fn set_edge_r(&mut self, a: usize, b: usize, r: f64) {
		if let Some(nbrs) = self.adjacency.get_mut(&a) {
			if let Some(entry) = nbrs.get_mut(&b) {
				*entry = r;
			}
		}
		if let Some(nbrs) = self.adjacency.get_mut(&b) {
			if let Some(entry) = nbrs.get_mut(&a) {
				*entry = r;
			}
		}
	}

	/// Neighbour ids of a node in ascending order (self included for a
	/// self-loop).
	pub fn neighbours(&self, id: usize) -> Vec<usize> {
		self.adjacency
			.get(&id)
			.map(|nbrs| nbrs.keys().copied().collect())
			.unwrap_or_default()
	}

	/// Degree counting a self-loop twice, matching the usual convention.
	pub fn degree(&self, id: usize) -> usize {
		self.adjacency
			.get(&id)
			.map(|nbrs| {
				nbrs.len() + if nbrs.contains_key(&id) { 1 } else { 0 }
			})
			.unwrap_or(0)
	}

	/// Remove a node together with its incident edges.
	pub fn remove_node(&mut self, id: usize) {
		if let Some(nbrs) = self.adjacency.remove(&id) {
			for nbr in nbrs.keys() {
				if let Some(back) = self.adjacency.get_mut(nbr) {
					back.remove(&id);
				}
			}
		}
		self.nodes.remove(&id);
	}

	/// Edges as (a, b, r) with a <= b, ordered by (a, b).
	pub fn edges(&self) -> Vec<(usize, usize, f64)> {
		let mut edges = Vec::new();
		for (&a, nbrs) in &self.adjacency {
			for (&b, &r) in nbrs {
				if a <= b {
					edges.push((a, b, r));
				}
			}
		}
		edges
	}

	/// Move every edge of `source` (except any edge to `target`) onto
	/// `target`, then remove `source`.
	pub fn transfer_edges(&mut self, source: usize, target: usize) {
		let nbrs: Vec<(usize, f64)> = self
			.adjacency
			.get(&source)
			.map(|nbrs| nbrs.iter().map(|(&n, &r)| (n, r)).collect())
			.unwrap_or_default();
		for (nbr, r) in nbrs {
			if nbr != target && nbr != source {
				self.add_edge(target, nbr, r);
			}
		}
		self.remove_node(source);
	}

	/// Connected components as ascending id lists, ordered by smallest
	/// member id.
	pub fn connected_components(&self) -> Vec<Vec<usize>> {
		let mut seen = std::collections::BTreeSet::new();
		let mut components = Vec::new();
		for &start in self.nodes.keys() {
			if seen.contains(&start) {
				continue;
			}
			let mut component = Vec::new();
			let mut stack = vec![start];
			seen.insert(start);
			while let Some(id) = stack.pop() {
				component.push(id);
				for nbr in self.neighbours(id) {
					if seen.insert(nbr) {
						stack.push(nbr);
					}
				}
			}
			component.sort_unstable();
			components.push(component);
		}
		components
	}

	/// Subgraph induced by a node set.
	pub fn subgraph(&self, ids: &[usize]) -> FibreGraph {
		let wanted: std::collections::BTreeSet<usize> = ids.iter().copied().collect();
		let mut out = FibreGraph::new();
		for &id in &wanted {
			if let Some(&xy) = self.nodes.get(&id) {
				out.add_node_with_id(id, xy);
			}
		}
		for (a, b, r) in self.edges() {
			if wanted.contains(&a) && wanted.contains(&b) {
				out.add_edge(a, b, r);
			}
		}
		out
	}

	/// Remove all nodes without edges.
	pub fn remove_isolates(&mut self) {
		let isolates: Vec<usize> = self
			.nodes
			.keys()
			.filter(|id| self.degree(**id) == 0)
			.copied()
			.collect();
		for id in isolates {
			self.remove_node(id);
		}
	}

	/// Shortest-path distances over edge `r` weights from a source node
	/// (Dijkstra over the arena).
	pub fn shortest_path_lengths(&self, source: usize) -> BTreeMap<usize, f64> {
		use std::cmp::Ordering;
		use std::collections::BinaryHeap;

		#[derive(PartialEq)]
		struct Entry(f64, usize);
		impl Eq for Entry {}
		impl PartialOrd for Entry {
			fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
				// reversed for a min-heap
				other.0.partial_cmp(&self.0)
			}
		}
		impl Ord for Entry {
			fn cmp(&self, other: &Self) -> Ordering {
				self.partial_cmp(other).unwrap_or(Ordering::Equal)
			}
		}

		let mut dist = BTreeMap::new();
		if !self.contains_node(source) {
			return dist;
		}
		let mut heap = BinaryHeap::new();
		dist.insert(source, 0.0);
		heap.push(Entry(0.0, source));
		while let Some(Entry(d, id)) = heap.pop() {
			if d > *dist.get(&id).unwrap_or(&f64::INFINITY) {
				continue;
			}
			for nbr in self.neighbours(id) {
				let r = self.edge_r(id, nbr).unwrap_or(0.0);
				let candidate = d + r;
				if candidate < *dist.get(&nbr).unwrap_or(&f64::INFINITY) {
					dist.insert(nbr, candidate);
					heap.push(Entry(candidate, nbr));
				}
			}
		}
		dist
	}

	pub fn to_node_link(&self) -> NodeLinkGraph {
		NodeLinkGraph {
			directed: false,
			multigraph: false,
			graph: serde_json::Map::new(),
			nodes: self
				.nodes
				.iter()
				.map(|(&id, &xy)| NodeLinkNode { xy, id })
				.collect(),
			links: self
				.edges()
				.into_iter()
				.map(|(source, target, r)| NodeLinkEdge { r, source, target })
				.collect(),
		}
	}

	pub fn from_node_link(data: &NodeLinkGraph) -> Result<Self> {
		if data.directed || data.multigraph {
			return Err(FibreError::Serialization(
				"expected an undirected simple graph".into(),
			));
		}
		let mut graph = FibreGraph::new();
		for node in &data.nodes {
			graph.add_node_with_id(node.id, node.xy);
		}
		for link in &data.links {
			if !graph.contains_node(link.source) || !graph.contains_node(link.target) {
				return Err(FibreError::Serialization(format!(
					"link references unknown node ({}, {})",
					link.source, link.target
				)));
			}
			graph.add_edge(link.source, link.target, link.r);
		}
		Ok(graph)
	}
}

/// Node-link serialisation of a graph, compatible with the
/// `{directed, multigraph, graph, nodes, links}` JSON layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkGraph {
	pub directed: bool,
	pub multigraph: bool,
	#[serde(default)]
	pub graph: serde_json::Map<String, serde_json::Value>,
	pub nodes: Vec<NodeLinkNode>,
	pub links: Vec<NodeLinkEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkNode {
	pub xy: [f64; 2],
	pub id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLinkEdge {
	pub r: f64,
	pub source: usize,
	pub target: usize,
}

/// Probe fixture used across the test-suite: a four-node chain with ids
/// starting at 2.
pub fn generate_probe_graph() -> FibreGraph {
	let mut graph = FibreGraph::new();
	graph.add_node_with_id(2, [0.0, 0.0]);
	graph.add_node_with_id(3, [1.0, 1.0]);
	graph.add_node_with_id(4, [2.0, 2.0]);
	graph.add_node_with_id(5, [2.0, 3.0]);
	graph.add_edge(2, 3, 2f64.sqrt());
	graph.add_edge(3, 4, 2f64.sqrt());
	graph.add_edge(4, 5, 1.0);
	graph
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_node_ids_monotonic() {
		let mut graph = FibreGraph::new();
		let a = graph.add_node([0.0, 0.0]);
		let b = graph.add_node([1.0, 0.0]);
		graph.remove_node(b);
		let c = graph.add_node([2.0, 0.0]);
		assert_eq!(0, a);
		assert!(c > b, "removed ids must not be reused");
	}

	#[test]
	fn test_degree_and_neighbours() {
		let graph = generate_probe_graph();
		assert_eq!(1, graph.degree(2));
		assert_eq!(2, graph.degree(3));
		assert_eq!(vec![2, 4], graph.neighbours(3));
	}

	#[test]
	fn test_self_loop_degree() {
		let mut graph = FibreGraph::new();
		graph.add_node_with_id(0, [0.0, 0.0]);
		graph.add_edge(0, 0, 3.0);
		assert_eq!(2, graph.degree(0));
		assert_eq!(1, graph.number_of_edges());
	}

	#[test]
	fn test_transfer_edges() {
		let mut graph = generate_probe_graph();
		graph.transfer_edges(3, 4);
		assert!(!graph.contains_node(3));
		assert_eq!(Some(2f64.sqrt()), graph.edge_r(2, 4));
		assert_eq!(2, graph.degree(4));
	}

	#[test]
	fn test_connected_components() {
		let mut graph = generate_probe_graph();
		graph.add_node_with_id(10, [5.0, 5.0]);
		graph.add_node_with_id(11, [6.0, 5.0]);
		graph.add_edge(10, 11, 1.0);
		let components = graph.connected_components();
		assert_eq!(2, components.len());
		assert_eq!(vec![2, 3, 4, 5], components[0]);
		assert_eq!(vec![10, 11], components[1]);
	}

	#[test]
	fn test_shortest_path_lengths() {
		let graph = generate_probe_graph();
		let dist = graph.shortest_path_lengths(2);
		let expected = 2.0 * 2f64.sqrt() + 1.0;
		assert!((dist[&5] - expected).abs() < 1e-12);
	}

	#[test]
	fn test_node_link_round_trip() {
		let graph = generate_probe_graph();
		let data = graph.to_node_link();
		let json = serde_json::to_string(&data).unwrap();
		let parsed: NodeLinkGraph = serde_json::from_str(&json).unwrap();
		let rebuilt = FibreGraph::from_node_link(&parsed).unwrap();
		assert_eq!(graph, rebuilt);
		assert_eq!(vec![2, 3, 4, 5], rebuilt.node_ids());
		assert_eq!(Some(1.0), rebuilt.edge_r(4, 5));
	}
}
