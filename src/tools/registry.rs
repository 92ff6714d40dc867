//! Strongly-typed tool registry with alias resolution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::types::{Tool, ToolArgs, ToolCategory, ToolResult};

/// Registry of all tools available to the engine.
///
/// Registration happens explicitly at engine construction; there is no
/// load-time magic. Lookups resolve aliases before names so deployments
/// can rename tools without retraining the tool bandit.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Re-registering replaces the
    /// previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register an alternate name for an existing tool.
    pub fn register_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// Resolve a name or alias to the canonical tool name.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.tools.contains_key(name) {
            return Some(name);
        }
        self.aliases
            .get(name)
            .map(String::as_str)
            .filter(|target| self.tools.contains_key(*target))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let canonical = self.resolve(name)?;
        self.tools.get(canonical).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// All registered tools, unordered.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Canonical tool names, sorted for stable prompts.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tools in the given category, sorted by name.
    pub fn by_category(&self, category: ToolCategory) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self
            .tools
            .values()
            .filter(|tool| tool.category() == category)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Execute a tool by name or alias.
    ///
    /// An unknown name produces a failed `ToolResult` rather than an
    /// error: the bandit learns from the negative signal.
    pub async fn execute(&self, name: &str, args: ToolArgs) -> ToolResult {
        let start = Instant::now();
        match self.get(name) {
            Some(tool) => {
                tracing::debug!(tool = tool.name(), "executing tool");
                tool.execute(args).await
            }
            None => {
                tracing::warn!(tool = name, "tool not found in registry");
                ToolResult::err(
                    format!("tool '{name}' is not registered"),
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }

    /// One line per tool, for LLM-facing selection prompts.
    pub fn describe_all(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect();
        lines.sort();
        if lines.is_empty() {
            "No tools are currently available.".to_string()
        } else {
            format!("Available tools:\n{}", lines.join("\n"))
        }
    }
}
