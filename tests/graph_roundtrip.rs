use fibrescan::graph::{generate_probe_graph, FibreGraph, NodeLinkGraph};

#[test]
fn probe_graph_node_link_json() {
	let graph = generate_probe_graph();
	let data = graph.to_node_link();

	assert!(!data.directed);
	assert!(!data.multigraph);
	assert!(data.graph.is_empty());

	let ids: Vec<usize> = data.nodes.iter().map(|n| n.id).collect();
	assert_eq!(vec![2, 3, 4, 5], ids);
	assert_eq!([0.0, 0.0], data.nodes[0].xy);
	assert_eq!([2.0, 3.0], data.nodes[3].xy);

	let links: Vec<(usize, usize, f64)> =
		data.links.iter().map(|l| (l.source, l.target, l.r)).collect();
	assert_eq!(
		vec![
			(2, 3, 2f64.sqrt()),
			(3, 4, 2f64.sqrt()),
			(4, 5, 1.0)
		],
		links
	);
}

#[test]
fn serialised_graph_round_trips_bit_exact() {
	let graph = generate_probe_graph();
	let json = serde_json::to_string(&graph.to_node_link()).unwrap();
	let parsed: NodeLinkGraph = serde_json::from_str(&json).unwrap();
	let rebuilt = FibreGraph::from_node_link(&parsed).unwrap();

	assert_eq!(graph.node_ids(), rebuilt.node_ids());
	for (id, xy) in graph.node_coords() {
		let restored = rebuilt.node_xy(id).unwrap();
		assert_eq!(xy[0].to_bits(), restored[0].to_bits());
		assert_eq!(xy[1].to_bits(), restored[1].to_bits());
	}
	assert_eq!(graph.edges().len(), rebuilt.edges().len());
	for (a, b, r) in graph.edges() {
		assert_eq!(Some(r.to_bits()), rebuilt.edge_r(a, b).map(|v| v.to_bits()));
	}

	// serialising the rebuilt graph reproduces the identical document
	let json_again = serde_json::to_string(&rebuilt.to_node_link()).unwrap();
	assert_eq!(json, json_again);
}

#[test]
fn node_link_json_field_layout() {
	let graph = generate_probe_graph();
	let value = serde_json::to_value(graph.to_node_link()).unwrap();

	assert_eq!(Some(false), value["directed"].as_bool());
	assert_eq!(Some(false), value["multigraph"].as_bool());
	assert!(value["graph"].as_object().unwrap().is_empty());
	assert_eq!(4, value["nodes"].as_array().unwrap().len());
	assert_eq!(3, value["links"].as_array().unwrap().len());
	assert_eq!(Some(2), value["nodes"][0]["id"].as_u64());
	assert_eq!(Some(1.0), value["links"][2]["r"].as_f64());
}

#[test]
fn deserialising_rejects_directed_graphs() {
	let mut data = generate_probe_graph().to_node_link();
	data.directed = true;
	assert!(FibreGraph::from_node_link(&data).is_err());
}

#[test]
fn deserialising_rejects_dangling_links() {
	let mut data = generate_probe_graph().to_node_link();
	data.links[0].target = 99;
	assert!(FibreGraph::from_node_link(&data).is_err());
}
