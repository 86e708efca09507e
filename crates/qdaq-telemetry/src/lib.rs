pub mod acquisition_metrics;

pub use acquisition_metrics::*;
