use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::Ordering;

use clap::ArgMatches;
use log::{error, info, warn};

use fibrescan::cli::build_cli;
use fibrescan::config::AnalysisConfig;
use fibrescan::error::{FibreError, Result};
use fibrescan::logging::init_logger;
use fibrescan::object_io::save_database;
use fibrescan::reader::collect_image_files;
use fibrescan::runner::BatchRunner;

fn main() {
	let matches = build_cli();
	init_logger(matches.occurrences_of("v"));

	let code = match matches.subcommand() {
		("analyse", Some(sub_m)) => match run_analyse(sub_m) {
			Ok(code) => code,
			Err(err) => {
				error!("{}", err);
				1
			}
		},
		_ => 1,
	};
	exit(code);
}

fn parse_f64(app_m: &ArgMatches, key: &str) -> Result<Option<f64>> {
	match app_m.value_of(key) {
		Some(raw) => raw
			.parse::<f64>()
			.map(Some)
			.map_err(|_| FibreError::InvalidParameter(format!("{}: '{}' is not a number", key, raw))),
		None => Ok(None),
	}
}

fn parse_usize(app_m: &ArgMatches, key: &str) -> Result<Option<usize>> {
	match app_m.value_of(key) {
		Some(raw) => raw
			.parse::<usize>()
			.map(Some)
			.map_err(|_| FibreError::InvalidParameter(format!("{}: '{}' is not an integer", key, raw))),
		None => Ok(None),
	}
}

fn build_config(app_m: &ArgMatches) -> Result<AnalysisConfig> {
	let defaults = AnalysisConfig::default();
	let config = AnalysisConfig::builder()
		.sigma(parse_f64(app_m, "SIGMA")?.unwrap_or(defaults.sigma))
		.alpha(parse_f64(app_m, "ALPHA")?.unwrap_or(defaults.alpha))
		.p_intensity(
			parse_f64(app_m, "LOW_CLIP")?.unwrap_or(defaults.p_intensity.0),
			parse_f64(app_m, "HIGH_CLIP")?.unwrap_or(defaults.p_intensity.1),
		)
		.p_denoise(
			parse_usize(app_m, "NL_PATCH")?.unwrap_or(defaults.p_denoise.0),
			parse_usize(app_m, "NL_DISTANCE")?.unwrap_or(defaults.p_denoise.1),
		)
		.ow_network(app_m.is_present("OW_NETWORK"))
		.ow_segment(app_m.is_present("OW_SEGMENT"))
		.ow_metric(app_m.is_present("OW_METRIC"))
		.save_figures(app_m.is_present("SAVE_FIGURES"))
		.workers(parse_usize(app_m, "WORKERS")?.unwrap_or(defaults.workers))
		.build();
	config.validate()?;
	Ok(config)
}

fn run_analyse(app_m: &ArgMatches) -> Result<i32> {
	let config = build_config(app_m)?;
	let inputs: Vec<PathBuf> = app_m
		.values_of("PATHS")
		.map(|values| values.map(PathBuf::from).collect())
		.unwrap_or_default();
	let files = collect_image_files(&inputs)?;
	if files.is_empty() {
		warn!("No analysable image files found");
		return Ok(0);
	}

	let runner = BatchRunner::new(config);
	let cancel = runner.cancel_flag();
	ctrlc::set_handler(move || {
		cancel.store(true, Ordering::SeqCst);
	})
	.map_err(|e| FibreError::InvalidParameter(format!("signal handler: {}", e)))?;

	let result = runner.run(&files)?;
	info!(
		"Analysed {}/{} images ({} failures)",
		result.completed,
		files.len(),
		result.failures.len()
	);

	// batch-level tables land beside the first input root
	if let Some(parent) = files[0].parent() {
		save_database(&parent.join("fibrescan_global.csv"), &result.global)?;
		save_database(&parent.join("fibrescan_fibre.csv"), &result.fibre)?;
		save_database(&parent.join("fibrescan_cell.csv"), &result.cell)?;
	}

	if !result.failures.is_empty() {
		eprintln!("{} image(s) failed to analyse", result.failures.len());
		if app_m.is_present("STRICT") {
			return Ok(1);
		}
	}
	Ok(0)
}
