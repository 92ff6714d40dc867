//! Reasoning-path archetypes and path generation.
//!
//! - **Templates**: the fixed catalogue of reasoning archetypes. Strategy
//!   ids defined here are the single source of truth for bandit arm keys.
//! - **Types**: seeds, seed analysis, and instantiated paths.
//! - **Generator**: seed analysis plus template selection and
//!   instantiation, with a creative-bypass mode for aha-moment thinking.

mod generator;
mod templates;
mod types;

pub use generator::{GenerationMode, PathGenerator};
pub use templates::{PathTemplate, PathTemplateLibrary};
pub use types::{
    GroundingStatus, ReasoningPath, SeedAnalysis, SeedGrounding, ThinkingSeed, Urgency,
};
