pub mod corpus;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod harness;
pub mod pipeline;
pub mod provenance;
pub mod runner;
pub mod runtime;
pub mod schema;
pub mod stats;

pub use error::{BenchError, Result};
pub use runner::{run_benchmark, run_benchmark_with, RunOutcome};
