//! Tool trait and result types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse tool classification used for filtered lookups.
///
/// The verifier restricts itself to `Search` tools when grounding a
/// feasibility analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Llm,
    System,
    DataProcessing,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Llm => write!(f, "llm"),
            Self::System => write!(f, "system"),
            Self::DataProcessing => write!(f, "data_processing"),
        }
    }
}

/// Capability flags a tool advertises.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolCapabilities {
    /// Tool reaches out to the network
    pub requires_network: bool,
    /// Tool mutates external state
    pub has_side_effects: bool,
    /// Tool output is suitable as verification evidence
    pub supports_verification: bool,
}

/// Arguments passed to a tool invocation.
///
/// Free-form JSON keeps the registry uniform; individual tools validate
/// the shape they expect.
pub type ToolArgs = Value;

/// Outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    /// Wall-clock execution time in seconds
    pub execution_time: f64,
}

impl ToolResult {
    pub fn ok(data: Value, execution_time: f64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            execution_time,
        }
    }

    pub fn err(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            execution_time,
        }
    }

    /// Render the payload as display text for prompt embedding.
    pub fn data_as_text(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A registered external capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable registry key.
    fn name(&self) -> &str;

    /// One-line description shown to the LLM during tool selection.
    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities::default()
    }

    /// Execute with free-form JSON arguments.
    async fn execute(&self, args: ToolArgs) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_text_rendering() {
        let plain = ToolResult::ok(json!("snippet text"), 0.1);
        assert_eq!(plain.data_as_text(), "snippet text");

        let structured = ToolResult::ok(json!({"hits": 3}), 0.1);
        assert_eq!(structured.data_as_text(), r#"{"hits":3}"#);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ToolCategory::DataProcessing.to_string(), "data_processing");
        assert_eq!(ToolCategory::Search.to_string(), "search");
    }
}
