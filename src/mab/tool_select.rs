//! Hybrid tool selection: bandit experience with LLM-guided cold starts.
//!
//! A second bandit instance learns which tool helps which kind of query.
//! Cold arms (barely used or low confidence) hand the decision to the
//! LLM, which reads the registry's descriptions and answers with a
//! `**TOOL_CALL**` marker; warm arms are trusted directly. Every mode
//! switch is recorded for diagnostics.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock, Mutex};

use crate::config::MabConfig;
use crate::llm::{ChatRequest, LlmInvoker};
use crate::tools::{ToolRegistry, ToolResult};

use super::converger::{ArmCandidate, ArmStatistics, MabConverger, SelectionAlgorithm};

/// Synthetic arm name for declining to use any tool.
pub const NO_TOOL: &str = "no_tool";

const COLD_USE_THRESHOLD: u64 = 5;
const COLD_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DIAGNOSTICS_CAP: usize = 50;

/// Coarse query classification feeding the no-tool probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Search,
    Analysis,
    Creative,
    General,
}

static SEARCH_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(search|find|look\s+up|latest|news|current|what\s+is|who\s+is)")
        .expect("invalid regex")
});

static ANALYSIS_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(analy|compare|evaluate|assess|explain|why|how\s+does)")
        .expect("invalid regex")
});

static CREATIVE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(write|create|design|brainstorm|generate|compose)").expect("invalid regex")
});

impl TaskType {
    pub fn classify(query: &str) -> Self {
        if SEARCH_MARKERS.is_match(query) {
            Self::Search
        } else if ANALYSIS_MARKERS.is_match(query) {
            Self::Analysis
        } else if CREATIVE_MARKERS.is_match(query) {
            Self::Creative
        } else {
            Self::General
        }
    }
}

/// Session facts the selector weighs before consulting the bandit.
#[derive(Debug, Clone, Default)]
pub struct ToolSelectionState {
    /// Tool calls already made this session
    pub session_tool_calls: usize,
}

/// How the final tool was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Warm arm, bandit decision accepted
    Experience,
    /// Cold arm, LLM consulted over the tool descriptions
    Exploration,
    /// The state layer decided against using any tool
    NoTool,
}

/// Outcome of one tool selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    /// `None` means no tool is invoked
    pub tool: Option<String>,
    pub mode: SelectionMode,
    /// What the bandit wanted, kept for diagnostics
    pub bandit_suggestion: Option<String>,
}

/// Diagnostic record of a hybrid mode switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSwitchRecord {
    pub bandit_suggestion: String,
    pub final_choice: String,
    pub mode: SelectionMode,
    pub reason: String,
}

/// Tool-selection bandit with the hybrid decision layer.
pub struct ToolSelector {
    mab: MabConverger,
    invoker: Option<Arc<dyn LlmInvoker>>,
    rng: Mutex<StdRng>,
    diagnostics: Mutex<VecDeque<ModeSwitchRecord>>,
}

impl ToolSelector {
    pub fn new(config: MabConfig, invoker: Option<Arc<dyn LlmInvoker>>) -> Self {
        Self {
            mab: MabConverger::new(config).without_golden_templates(),
            invoker,
            rng: Mutex::new(StdRng::from_entropy()),
            diagnostics: Mutex::new(VecDeque::new()),
        }
    }

    /// Fix the internal RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Choose a tool (or decline) for the query.
    pub async fn choose(
        &self,
        query: &str,
        state: &ToolSelectionState,
        registry: &ToolRegistry,
    ) -> ToolChoice {
        let names = registry.names();
        if names.is_empty() {
            return ToolChoice {
                tool: None,
                mode: SelectionMode::NoTool,
                bandit_suggestion: None,
            };
        }

        let p_no_tool = no_tool_probability(query, state);
        let draw: f64 = self.rng.lock().expect("rng lock").gen();
        if draw < p_no_tool {
            tracing::debug!(p_no_tool, "state layer declined tool use");
            return ToolChoice {
                tool: None,
                mode: SelectionMode::NoTool,
                bandit_suggestion: None,
            };
        }

        let candidates: Vec<ArmCandidate> = names
            .iter()
            .map(|name| ArmCandidate {
                id: name.clone(),
                label: name.clone(),
                description: registry
                    .get(name)
                    .map(|tool| tool.description().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        let suggestion = match self.mab.select_id(&candidates, SelectionAlgorithm::Auto) {
            Ok((id, _, _)) => id,
            Err(_) => {
                return ToolChoice {
                    tool: None,
                    mode: SelectionMode::NoTool,
                    bandit_suggestion: None,
                }
            }
        };

        let uses = self.mab.arm_activations(&suggestion);
        let confidence = self.mab.confidence(&suggestion);
        let cold = uses < COLD_USE_THRESHOLD || confidence < COLD_CONFIDENCE_THRESHOLD;

        if cold {
            if let Some(invoker) = &self.invoker {
                let final_choice = self
                    .explore_with_llm(invoker, query, registry, &suggestion)
                    .await;
                self.record_switch(ModeSwitchRecord {
                    bandit_suggestion: suggestion.clone(),
                    final_choice: final_choice.clone(),
                    mode: SelectionMode::Exploration,
                    reason: format!(
                        "cold arm: {uses} uses, confidence {confidence:.2}"
                    ),
                });
                return ToolChoice {
                    tool: Some(final_choice),
                    mode: SelectionMode::Exploration,
                    bandit_suggestion: Some(suggestion),
                };
            }
        }

        ToolChoice {
            tool: Some(suggestion.clone()),
            mode: SelectionMode::Experience,
            bandit_suggestion: Some(suggestion),
        }
    }

    /// Exploration mode: let the LLM pick from the tool descriptions.
    /// Unknown answers are fuzzy-matched; the bandit suggestion is the
    /// final fallback.
    async fn explore_with_llm(
        &self,
        invoker: &Arc<dyn LlmInvoker>,
        query: &str,
        registry: &ToolRegistry,
        suggestion: &str,
    ) -> String {
        let prompt = format!(
            "{}\n\nQuery: {query}\n\n\
             Pick the single most helpful tool for this query and answer with one line of \
             the form `**TOOL_CALL**: <tool_name> | <arguments>`.",
            registry.describe_all()
        );

        let response = invoker.chat(ChatRequest::new(prompt).with_temperature(0.3)).await;
        if !response.success {
            tracing::warn!("exploration LLM call failed; keeping bandit suggestion");
            return suggestion.to_string();
        }

        let Some((requested, _args)) = crate::verify::parse_tool_call(&response.content) else {
            return suggestion.to_string();
        };

        if registry.contains(&requested) {
            return registry
                .resolve(&requested)
                .map(str::to_string)
                .unwrap_or_else(|| suggestion.to_string());
        }

        fuzzy_match(&requested, &registry.names()).unwrap_or_else(|| suggestion.to_string())
    }

    /// Feed an executed tool's outcome back into the bandit.
    ///
    /// The reward comes from an LLM judge scoring how much the output
    /// helped the query; the legacy lexical heuristic covers judge
    /// failures.
    pub async fn feedback(&self, tool: &str, query: &str, result: &ToolResult, success: bool) {
        let reward = match &self.invoker {
            Some(invoker) => match self.judge_reward(invoker, query, result).await {
                Some(reward) => reward,
                None => heuristic_reward(query, result, success),
            },
            None => heuristic_reward(query, result, success),
        };
        self.mab.update(tool, success, reward);
    }

    async fn judge_reward(
        &self,
        invoker: &Arc<dyn LlmInvoker>,
        query: &str,
        result: &ToolResult,
    ) -> Option<f64> {
        let output = result.data_as_text();
        let prompt = format!(
            "A tool was run to help answer this query.\n\
             Query: {query}\n\
             Tool output: {output}\n\n\
             On a scale from -1.0 (actively harmful or useless) to 1.0 (decisive help), \
             how helpful was the output? Answer with the number only."
        );

        let response = invoker.chat(ChatRequest::new(prompt).with_temperature(0.0)).await;
        if !response.success {
            return None;
        }
        parse_signed_score(&response.content)
    }

    /// Diagnostic log of hybrid mode switches, oldest first.
    pub fn mode_switches(&self) -> Vec<ModeSwitchRecord> {
        self.diagnostics
            .lock()
            .expect("diagnostics lock")
            .iter()
            .cloned()
            .collect()
    }

    /// Per-tool bandit statistics.
    pub fn tool_statistics(&self) -> Vec<ArmStatistics> {
        self.mab.arm_statistics()
    }

    fn record_switch(&self, record: ModeSwitchRecord) {
        let mut diagnostics = self.diagnostics.lock().expect("diagnostics lock");
        diagnostics.push_back(record);
        while diagnostics.len() > DIAGNOSTICS_CAP {
            diagnostics.pop_front();
        }
    }
}

/// Probability of declining tool use given the query and session state.
fn no_tool_probability(query: &str, state: &ToolSelectionState) -> f64 {
    let mut probability: f64 = 0.2;

    if TaskType::classify(query) == TaskType::General {
        probability += 0.3;
    }
    if state.session_tool_calls >= 2 {
        probability += 0.4;
    }
    if !SEARCH_MARKERS.is_match(query) && !ANALYSIS_MARKERS.is_match(query) {
        probability += 0.2;
    }

    probability.min(0.8)
}

/// Match a requested tool name against the registry by substring, then
/// by token overlap on `_`-separated name parts.
fn fuzzy_match(requested: &str, names: &[String]) -> Option<String> {
    let requested_lower = requested.to_lowercase();

    if let Some(hit) = names.iter().find(|name| {
        let name_lower = name.to_lowercase();
        name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower)
    }) {
        return Some(hit.clone());
    }

    let requested_tokens: Vec<&str> = requested_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    names
        .iter()
        .map(|name| {
            let overlap = name
                .to_lowercase()
                .split('_')
                .filter(|part| requested_tokens.contains(part))
                .count();
            (name.clone(), overlap)
        })
        .filter(|(_, overlap)| *overlap > 0)
        .max_by_key(|(_, overlap)| *overlap)
        .map(|(name, _)| name)
}

static SIGNED_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("invalid regex"));

fn parse_signed_score(content: &str) -> Option<f64> {
    SIGNED_SCORE
        .find(content)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| score.clamp(-1.0, 1.0))
}

static ERROR_WORDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(error|failed|exception|timeout|denied)").expect("invalid regex")
});

/// Legacy lexical reward: output length plus query-term overlap, with a
/// penalty for error wording.
fn heuristic_reward(query: &str, result: &ToolResult, success: bool) -> f64 {
    if !success {
        return -0.5;
    }

    let output = result.data_as_text();
    let length_score = (output.len() as f64 / 1000.0).min(1.0) * 0.3;

    let query_words: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect();
    let output_lower = output.to_lowercase();
    let overlap = if query_words.is_empty() {
        0.0
    } else {
        query_words
            .iter()
            .filter(|word| output_lower.contains(*word))
            .count() as f64
            / query_words.len() as f64
    };

    let mut reward = 0.1 + length_score + 0.4 * overlap;
    if ERROR_WORDING.is_match(&output) {
        reward -= 0.3;
    }
    reward.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::tools::{Tool, ToolArgs, ToolCategory};
    use async_trait::async_trait;
    use serde_json::json;

    struct NamedTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "a tool"
        }

        fn category(&self) -> ToolCategory {
            ToolCategory::Search
        }

        async fn execute(&self, _args: ToolArgs) -> ToolResult {
            ToolResult::ok(json!("ok"), 0.0)
        }
    }

    struct ScriptedInvoker {
        content: String,
    }

    #[async_trait]
    impl LlmInvoker for ScriptedInvoker {
        async fn chat(&self, _request: ChatRequest) -> LlmResponse {
            LlmResponse::ok(self.content.clone())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool { name: "web_search" }));
        registry.register(Arc::new(NamedTool { name: "data_analyzer" }));
        registry
    }

    fn search_state() -> ToolSelectionState {
        ToolSelectionState::default()
    }

    /// The no-tool layer fires with probability ≥ 0.2; retry until the
    /// selector actually picks a tool.
    async fn choose_until_tool(
        selector: &ToolSelector,
        query: &str,
        registry: &ToolRegistry,
    ) -> ToolChoice {
        for _ in 0..64 {
            let choice = selector.choose(query, &search_state(), registry).await;
            if choice.tool.is_some() {
                return choice;
            }
        }
        panic!("selector declined a tool 64 times in a row");
    }

    #[test]
    fn test_task_type_classification() {
        assert_eq!(TaskType::classify("search for the latest rust news"), TaskType::Search);
        assert_eq!(TaskType::classify("compare these two approaches"), TaskType::Analysis);
        assert_eq!(TaskType::classify("write a poem"), TaskType::Creative);
        assert_eq!(TaskType::classify("hello there"), TaskType::General);
    }

    #[test]
    fn test_no_tool_probability_factors() {
        let searchy = no_tool_probability("search for rust news", &search_state());
        assert!((searchy - 0.2).abs() < 1e-9);

        let general = no_tool_probability("hello there", &search_state());
        assert!((general - 0.7).abs() < 1e-9); // +0.3 general, +0.2 no markers

        let saturated = no_tool_probability(
            "hello there",
            &ToolSelectionState {
                session_tool_calls: 3,
            },
        );
        assert!((saturated - 0.8).abs() < 1e-9); // capped
    }

    #[tokio::test]
    async fn test_cold_start_triggers_exploration_and_records_switch() {
        let invoker = Arc::new(ScriptedInvoker {
            content: "**TOOL_CALL**: web_search | rust bandit crates".to_string(),
        });
        // Seed chosen so the no-tool draw does not fire for a search query.
        let selector = ToolSelector::new(MabConfig::default(), Some(invoker)).with_seed(3);
        let registry = registry();

        let choice = choose_until_tool(&selector, "search for rust bandit crates", &registry).await;

        assert_eq!(choice.mode, SelectionMode::Exploration);
        assert_eq!(choice.tool.as_deref(), Some("web_search"));
        assert!(choice.bandit_suggestion.is_some());

        let switches = selector.mode_switches();
        assert!(!switches.is_empty());
        assert!(switches[0].reason.contains("cold arm"));
    }

    #[tokio::test]
    async fn test_warm_arm_uses_experience_mode() {
        let invoker = Arc::new(ScriptedInvoker {
            content: "**TOOL_CALL**: data_analyzer | irrelevant".to_string(),
        });
        let selector = ToolSelector::new(MabConfig::default(), Some(invoker)).with_seed(3);
        let registry = registry();

        // Warm up both arms past the cold thresholds.
        for _ in 0..30 {
            selector
                .feedback("web_search", "q", &ToolResult::ok(json!("ok"), 0.0), true)
                .await;
            selector
                .feedback("data_analyzer", "q", &ToolResult::ok(json!("ok"), 0.0), true)
                .await;
        }

        let choice = choose_until_tool(&selector, "search for rust bandit crates", &registry).await;
        assert_eq!(choice.mode, SelectionMode::Experience);
        assert_eq!(choice.tool, choice.bandit_suggestion);
    }

    #[tokio::test]
    async fn test_unknown_llm_choice_fuzzy_matches() {
        let invoker = Arc::new(ScriptedInvoker {
            content: "**TOOL_CALL**: search | rust crates".to_string(),
        });
        let selector = ToolSelector::new(MabConfig::default(), Some(invoker)).with_seed(3);
        let registry = registry();

        let choice = choose_until_tool(&selector, "search for rust crates", &registry).await;
        // "search" is a substring of "web_search".
        assert_eq!(choice.tool.as_deref(), Some("web_search"));
    }

    #[tokio::test]
    async fn test_empty_registry_declines() {
        let selector = ToolSelector::new(MabConfig::default(), None).with_seed(3);
        let registry = ToolRegistry::new();
        let choice = selector.choose("anything", &search_state(), &registry).await;
        assert_eq!(choice.mode, SelectionMode::NoTool);
        assert!(choice.tool.is_none());
    }

    #[tokio::test]
    async fn test_judge_reward_parsed_from_llm() {
        let invoker = Arc::new(ScriptedInvoker {
            content: "0.8".to_string(),
        });
        let selector = ToolSelector::new(MabConfig::default(), Some(invoker)).with_seed(3);

        selector
            .feedback(
                "web_search",
                "find rust crates",
                &ToolResult::ok(json!("rust crates list"), 0.0),
                true,
            )
            .await;

        let stats = selector.tool_statistics();
        assert_eq!(stats[0].strategy_id, "web_search");
        assert_eq!(stats[0].mean_reward, 0.8);
    }

    #[tokio::test]
    async fn test_heuristic_reward_on_judge_failure() {
        // No invoker at all: the legacy heuristic is the only reward source.
        let selector = ToolSelector::new(MabConfig::default(), None).with_seed(3);
        selector
            .feedback(
                "web_search",
                "find rust crates quickly",
                &ToolResult::ok(json!("a long list of rust crates matching the query"), 0.0),
                true,
            )
            .await;
        let stats = selector.tool_statistics();
        assert!(stats[0].mean_reward > 0.0);
    }

    #[test]
    fn test_heuristic_reward_penalises_errors() {
        let clean = heuristic_reward(
            "find rust crates",
            &ToolResult::ok(json!("rust crates found here"), 0.0),
            true,
        );
        let noisy = heuristic_reward(
            "find rust crates",
            &ToolResult::ok(json!("error: connection failed while fetching rust crates"), 0.0),
            true,
        );
        assert!(clean > noisy);
        assert_eq!(heuristic_reward("q", &ToolResult::err("boom", 0.0), false), -0.5);
    }

    #[test]
    fn test_fuzzy_match_token_overlap() {
        let names = vec!["web_search".to_string(), "data_analyzer".to_string()];
        assert_eq!(
            fuzzy_match("searcher of webs", &names).as_deref(),
            None // no substring or token match ("search" != "searcher")
        );
        assert_eq!(fuzzy_match("web search", &names).as_deref(), Some("web_search"));
        assert_eq!(fuzzy_match("analyzer", &names).as_deref(), Some("data_analyzer"));
    }

    #[test]
    fn test_parse_signed_score() {
        assert_eq!(parse_signed_score("0.8"), Some(0.8));
        assert_eq!(parse_signed_score("I'd say -0.4 overall"), Some(-0.4));
        assert_eq!(parse_signed_score("score: 5"), Some(1.0)); // clamped
        assert_eq!(parse_signed_score("no score"), None);
    }
}
