use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::analyser::{analyse_image, ImageTables};
use crate::config::AnalysisConfig;
use crate::constants::runner::EVENT_WAKE_MS;
use crate::database::Database;
use crate::error::{FibreError, Result};
use crate::logging::create_batch_progress_bar;

/// One message per image, sent from a worker to the supervisor.
#[derive(Debug)]
pub enum AnalysisEvent {
	Completed {
		path: PathBuf,
		tables: Box<ImageTables>,
	},
	Failed {
		path: PathBuf,
		error: String,
	},
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchResult {
	pub global: Database,
	pub fibre: Database,
	pub cell: Database,
	pub completed: usize,
	pub failures: Vec<(PathBuf, String)>,
}

/// Concurrent per-image batch runner. Workers own disjoint slices of the
/// image list and share no mutable state; progress flows back over a single
/// mpsc channel, and the supervisor folds completion events into the three
/// output tables one event at a time.
pub struct BatchRunner {
	config: AnalysisConfig,
	cancel: Arc<AtomicBool>,
}

impl BatchRunner {
	pub fn new(config: AnalysisConfig) -> Self {
		Self {
			config,
			cancel: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Cooperative cancellation handle. Workers poll it between images;
	/// the image in flight is abandoned without partial results.
	pub fn cancel_flag(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.cancel)
	}

	pub fn run(&self, paths: &[PathBuf]) -> Result<BatchResult> {
		self.config.validate()?;
		let mut result = BatchResult::default();
		if paths.is_empty() {
			return Ok(result);
		}

		let n_proc = self.config.workers.min(paths.len());
		let pool = rayon::ThreadPoolBuilder::new()
			.num_threads(n_proc)
			.build()
			.map_err(|e| FibreError::InvalidParameter(format!("worker pool: {}", e)))?;

		info!("Analysing {} images over {} workers", paths.len(), n_proc);

		let (tx, rx) = channel::<AnalysisEvent>();
		let chunk_size = (paths.len() + n_proc - 1) / n_proc;
		for chunk in paths.chunks(chunk_size) {
			let chunk: Vec<PathBuf> = chunk.to_vec();
			let tx = tx.clone();
			let cancel = Arc::clone(&self.cancel);
			let config = self.config.clone();
			pool.spawn(move || {
				for path in chunk {
					if cancel.load(Ordering::SeqCst) {
						break;
					}
					let event = match analyse_image(&path, &config) {
						Ok(tables) => AnalysisEvent::Completed {
							path,
							tables: Box::new(tables),
						},
						Err(err) => AnalysisEvent::Failed {
							path,
							error: err.to_string(),
						},
					};
					if tx.send(event).is_err() {
						break;
					}
				}
			});
		}
		drop(tx);

		let progress = create_batch_progress_bar(paths.len() as u64);
		loop {
			match rx.recv_timeout(Duration::from_millis(EVENT_WAKE_MS)) {
				Ok(AnalysisEvent::Completed { path, tables }) => {
					progress.inc(1);
					progress.set_message(format!("{}", path.display()));
					result.global.append(&tables.global);
					result.fibre.append(&tables.fibre);
					result.cell.append(&tables.cell);
					result.completed += 1;
				}
				Ok(AnalysisEvent::Failed { path, error: message }) => {
					progress.inc(1);
					error!("{}: {}", path.display(), message);
					result.failures.push((path, message));
				}
				Err(RecvTimeoutError::Timeout) => {
					progress.tick();
				}
				Err(RecvTimeoutError::Disconnected) => break,
			}
		}
		progress.finish_with_message(if self.cancel.load(Ordering::SeqCst) {
			"Cancelled"
		} else {
			"Batch complete"
		});
		Ok(result)
	}
}
