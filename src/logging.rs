use chrono::Local;
use env_logger::{Builder, Target};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::io::Write;
use std::time::Duration;

/// Initialize the logging system with the specified verbosity level
pub fn init_logger(verbosity: u64) {
	let level = match verbosity {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};

	Builder::new()
		.format(|buf, record| {
			writeln!(
				buf,
				"[{} {} {}:{}] {}",
				Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
				record.level(),
				record.file().unwrap_or("unknown"),
				record.line().unwrap_or(0),
				record.args()
			)
		})
		.filter(None, level)
		.target(Target::Stderr)
		.init();
}

/// Create a progress bar for the image batch
pub fn create_batch_progress_bar(total_images: u64) -> ProgressBar {
	let pb = ProgressBar::new(total_images);
	pb.set_style(
		ProgressStyle::default_bar()
			.template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
			.expect("Failed to set progress bar template")
			.progress_chars("#>-"),
	);
	pb.set_message("Analysing images");
	pb.enable_steady_tick(Duration::from_millis(250));
	pb
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_create_batch_progress_bar() {
		let pb = create_batch_progress_bar(4);
		assert_eq!(pb.length(), Some(4));
		pb.finish();
	}
}
