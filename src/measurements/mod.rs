//! Latency comparison of the document and relational backends.

pub mod harness;
pub mod report;
pub mod suite;

pub use harness::{measure_backend, run_comparison, BackendOutcome, IterationOutcome, MeasurementResult, Winner};
pub use report::{generate_report, save_report, Report};
pub use suite::{ComparisonTest, MeasurementRunner};
