//! Thinking-seed generation.
//!
//! Stage one of the pipeline. A seed is either produced directly from
//! the task or synthesised through the three-phase retrieval recipe:
//! plan the search, gather evidence, synthesise a grounded summary.
//! Every phase has a degraded branch; the stage never fails.

mod generator;
mod types;

pub use generator::SeedGenerator;
pub use types::{SearchDepth, SearchPlan};
