//! Seeds, seed analysis, and reasoning paths.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A candidate strategy instance produced by the path generator.
///
/// `strategy_id` names the archetype and keys the bandit arm; it is
/// identical across every instantiation of the same template.
/// `instance_id` is unique per instantiation and only used for tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPath {
    pub strategy_id: String,
    pub instance_id: String,
    /// Human label for the archetype
    pub path_type: String,
    pub description: String,
    pub prompt_template: String,
}

impl ReasoningPath {
    /// Render the prompt template against the task and seed text.
    pub fn render_prompt(&self, task: &str, thinking_seed: &str) -> String {
        self.prompt_template
            .replace("{task}", task)
            .replace("{thinking_seed}", thinking_seed)
    }
}

/// Task urgency extracted from seed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

/// Structured analysis of a thinking seed.
///
/// `relevance` maps strategy ids to scores in `[0, 1]`. Characteristic
/// flags steer template selection; complexity indicators boost the
/// systematic archetype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAnalysis {
    pub relevance: HashMap<String, f64>,
    pub urgency: Urgency,
    pub needs_collaboration: bool,
    pub needs_innovation: bool,
    pub needs_critique: bool,
    pub needs_practicality: bool,
    pub needs_comprehensive_scope: bool,
    pub needs_research: bool,
    pub needs_adaptivity: bool,
    pub complexity_indicators: Vec<String>,
    /// Overall complexity in `[0, 1]`
    pub complexity_score: f64,
    pub domain_hints: Vec<String>,
}

impl SeedAnalysis {
    /// Uniform conservative analysis used when no LLM is available or
    /// its output cannot be parsed: 0.4 relevance for every archetype,
    /// no characteristic flags.
    pub fn uniform(strategy_ids: &[&str]) -> Self {
        let relevance = strategy_ids
            .iter()
            .map(|id| (id.to_string(), 0.4))
            .collect();
        Self {
            relevance,
            urgency: Urgency::Normal,
            needs_collaboration: false,
            needs_innovation: false,
            needs_critique: false,
            needs_practicality: false,
            needs_comprehensive_scope: false,
            needs_research: false,
            needs_adaptivity: false,
            complexity_indicators: Vec::new(),
            complexity_score: 0.5,
            domain_hints: Vec::new(),
        }
    }

    pub fn relevance_for(&self, strategy_id: &str) -> f64 {
        self.relevance
            .get(strategy_id)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }
}

/// Provenance of a synthesised seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingStatus {
    /// Seed produced directly from the task, no retrieval
    #[default]
    Unverified,
    /// Seed synthesised over retrieved search evidence
    SearchBacked,
    /// Templated fallback after an LLM or search failure
    Fallback,
}

/// Retrieval metadata attached to a synthesised seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedGrounding {
    pub key_insights: Vec<String>,
    pub knowledge_gaps: Vec<String>,
    /// Synthesis confidence in `[0, 1]`
    pub confidence_score: f64,
    pub status: GroundingStatus,
    /// A degraded branch was taken somewhere in the recipe
    pub fallback_used: bool,
}

/// A grounded summary of the task, used to condition path generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingSeed {
    pub text: String,
    pub analysis: SeedAnalysis,
    pub grounding: SeedGrounding,
}

impl ThinkingSeed {
    /// Wrap bare text with a conservative analysis.
    pub fn from_text(text: impl Into<String>, strategy_ids: &[&str]) -> Self {
        Self {
            text: text.into(),
            analysis: SeedAnalysis::uniform(strategy_ids),
            grounding: SeedGrounding::default(),
        }
    }

    /// The minimal last-resort seed. Every upstream failure path ends here.
    pub fn minimal(task: &str, strategy_ids: &[&str]) -> Self {
        let mut seed = Self::from_text(
            format!("Based on '{task}', outline the requirements, constraints, and a workable first approach."),
            strategy_ids,
        );
        seed.grounding.status = GroundingStatus::Fallback;
        seed.grounding.fallback_used = true;
        seed
    }

    /// Truncate the seed text to the configured cap, on a char boundary.
    pub fn truncate_to(&mut self, max_chars: usize) {
        if self.text.chars().count() > max_chars {
            self.text = self.text.chars().take(max_chars).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_substitutes_both_slots() {
        let path = ReasoningPath {
            strategy_id: "systematic_analytical".into(),
            instance_id: "systematic_analytical_1_0001".into(),
            path_type: "Systematic analysis".into(),
            description: "d".into(),
            prompt_template: "Task: {task}\nSeed: {thinking_seed}".into(),
        };
        let rendered = path.render_prompt("build a cache", "seed text");
        assert_eq!(rendered, "Task: build a cache\nSeed: seed text");
    }

    #[test]
    fn test_uniform_analysis() {
        let analysis = SeedAnalysis::uniform(&["a", "b"]);
        assert_eq!(analysis.relevance_for("a"), 0.4);
        assert_eq!(analysis.relevance_for("missing"), 0.0);
        assert!(!analysis.needs_innovation);
    }

    #[test]
    fn test_relevance_is_clamped() {
        let mut analysis = SeedAnalysis::uniform(&["a"]);
        analysis.relevance.insert("a".into(), 3.0);
        assert_eq!(analysis.relevance_for("a"), 1.0);
    }

    #[test]
    fn test_minimal_seed_marks_fallback() {
        let seed = ThinkingSeed::minimal("sort a list", &["a"]);
        assert!(seed.text.contains("'sort a list'"));
        assert!(seed.grounding.fallback_used);
        assert_eq!(seed.grounding.status, GroundingStatus::Fallback);
    }

    #[test]
    fn test_truncate_to_respects_char_boundaries() {
        let mut seed = ThinkingSeed::from_text("héllo wörld", &[]);
        seed.truncate_to(5);
        assert_eq!(seed.text, "héllo");
    }
}
