pub mod stats;

pub use stats::{mean, median, pearson, percentile, std_dev};
