//! Tool collaborator interface.
//!
//! Tools are registered explicitly at engine construction and addressed
//! by name (with optional aliases). The registry is the only execution
//! path: the verifier and the tool-selection bandit both go through
//! [`ToolRegistry::execute`].

mod registry;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolArgs, ToolCapabilities, ToolCategory, ToolResult};
