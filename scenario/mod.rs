//! File-facing side of the engine: scenario configuration, survey rows in,
//! effect tables out.

pub mod config;
pub mod io;

pub use config::{ScenarioConfig, ScenarioError};
pub use io::{IoError, LoadOptions, OutputFormat, load_rows, write_results};
