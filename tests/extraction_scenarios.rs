use ndarray::Array2;

use fibrescan::config::FireParams;
use fibrescan::extraction::{build_network, clean_network, NetworkExtraction};
use fibrescan::fibres::fibre_network_assignment;
use fibrescan::graph::FibreGraph;

const SIGMA: f64 = 0.5;
const ALPHA: f64 = 0.5;

/// Axis-aligned cross: two smooth perpendicular ridges through the centre.
fn cross_image(size: usize) -> Array2<f64> {
	let mid = size as f64 / 2.0;
	let mut image = Array2::<f64>::zeros((size, size));
	for r in 0..size {
		for c in 0..size {
			let d_row = (r as f64 - mid).abs();
			let d_col = (c as f64 - mid).abs();
			let ridge = (-d_row * d_row / 12.5).exp().max((-d_col * d_col / 12.5).exp());
			image[[r, c]] = ridge;
		}
	}
	image
}

/// Concentric smooth annuli around the image centre.
fn rings_image(size: usize, radii: &[f64]) -> Array2<f64> {
	let mid = size as f64 / 2.0;
	let mut image = Array2::<f64>::zeros((size, size));
	for r in 0..size {
		for c in 0..size {
			let dist = ((r as f64 - mid).powi(2) + (c as f64 - mid).powi(2)).sqrt();
			let mut value: f64 = 0.0;
			for &radius in radii {
				let d = dist - radius;
				value = value.max((-d * d / 12.5).exp());
			}
			image[[r, c]] = value;
		}
	}
	image
}

/// A single radially symmetric blob.
fn blob_image(size: usize, sigma: f64) -> Array2<f64> {
	let mid = size as f64 / 2.0;
	let mut image = Array2::<f64>::zeros((size, size));
	for r in 0..size {
		for c in 0..size {
			let d2 = (r as f64 - mid).powi(2) + (c as f64 - mid).powi(2);
			image[[r, c]] = (-d2 / (2.0 * sigma * sigma)).exp();
		}
	}
	image
}

fn assert_graph_invariants(network: &FibreGraph) {
	for (a, b, r) in network.edges() {
		assert_ne!(a, b, "growth graphs carry no self-loops");
		assert!(r > 0.0, "every edge must have a positive length");
	}
}

#[test]
fn cross_yields_straight_fibres_in_one_component() {
	let network = build_network(&cross_image(80), SIGMA, ALPHA, FireParams::default());
	assert!(!network.is_empty());
	assert_graph_invariants(&network);
	assert_eq!(1, network.connected_components().len());

	let cleaned = clean_network(&network, 1.0);
	let networks = fibre_network_assignment(&cleaned);
	let fibres: Vec<_> = networks.iter().flat_map(|n| n.fibres.iter()).collect();
	assert!(fibres.len() >= 2, "expected at least two fibres, got {}", fibres.len());
	for fibre in fibres {
		let waviness = fibre.waviness();
		assert!(
			waviness >= 0.95 && waviness <= 1.0 + 1e-12,
			"cross fibres are straight, waviness = {}",
			waviness
		);
		assert!(fibre.euclid_l <= fibre.fibre_l + 1e-9);
	}
}

#[test]
fn rings_nucleate_but_stay_wavy() {
	let network = build_network(
		&rings_image(50, &[6.0, 13.0]),
		SIGMA,
		ALPHA,
		FireParams::default(),
	);
	assert!(network.number_of_nodes() >= 4);
	assert_graph_invariants(&network);

	let cleaned = clean_network(&network, 1.0);
	let networks = fibre_network_assignment(&cleaned);
	for network in &networks {
		for fibre in &network.fibres {
			// any chain long enough to bend must follow the ring curvature
			if fibre.fibre_l >= 20.0 {
				let waviness = fibre.waviness();
				assert!(
					waviness <= 0.9,
					"ring arcs must not be straight, waviness = {}",
					waviness
				);
			}
		}
	}
}

#[test]
fn blob_produces_no_fibres() {
	let network = build_network(&blob_image(50, 4.0), SIGMA, ALPHA, FireParams::default());
	let cleaned = clean_network(&network, 1.0);
	let networks = fibre_network_assignment(&cleaned);
	assert!(
		networks.is_empty(),
		"an isotropic blob must not produce fibre chains"
	);
}

#[test]
fn empty_image_produces_empty_outputs() {
	let network = build_network(
		&Array2::<f64>::zeros((50, 50)),
		SIGMA,
		ALPHA,
		FireParams::default(),
	);
	assert!(network.is_empty());
	assert!(fibre_network_assignment(&network).is_empty());
}

#[test]
fn constant_image_produces_no_nucleation() {
	let network = build_network(
		&Array2::<f64>::from_elem((50, 50), 0.7),
		SIGMA,
		ALPHA,
		FireParams::default(),
	);
	assert!(network.is_empty());
}

#[test]
fn extractor_handles_single_bright_pixel() {
	let mut image = Array2::<f64>::zeros((50, 50));
	image[[25, 25]] = 5.0;
	let network = NetworkExtraction::new(FireParams::default()).create_network(&image);
	assert_eq!(1, network.number_of_nodes());
	assert_eq!(0, network.number_of_edges());
	assert!(fibre_network_assignment(&network).is_empty());
}

#[test]
fn clean_network_matches_probe_reductions() {
	let graph = fibrescan::graph::generate_probe_graph();
	let kept = clean_network(&graph, 1.0);
	assert_eq!(vec![2, 3, 4, 5], kept.node_ids());
	let collapsed = clean_network(&graph, 2.0);
	assert!(collapsed.node_ids().is_empty());
}
