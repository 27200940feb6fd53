pub mod core;
pub mod engine;
pub mod errors;
pub mod input;
pub mod output;
mod statistics;

#[macro_use]
extern crate is_close;


pub use crate::engine::Engine;
pub use crate::errors::EngineError;
pub use crate::input::ingest_for_processing;
pub use crate::output::{write_results, RunResults};

use std::io::Read;

/// Ingests a JSON analysis input and runs the full competition analysis:
/// uncompeted savings, measure competition, competed savings and finalized
/// per-measure and aggregate outputs.
pub fn run_analysis(input: impl Read) -> Result<RunResults, EngineError> {
    let input = ingest_for_processing(input)?;
    Engine::from_input(input)?.run()
}
