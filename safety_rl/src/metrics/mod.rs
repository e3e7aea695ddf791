//! Training metrics logging.
//!
//! - [`ConsoleLogger`]: fixed-width console table
//! - [`CsvLogger`]: CSV file logging for analysis
//! - [`MultiLogger`]: combine multiple loggers

pub mod logger;

pub use logger::{ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
