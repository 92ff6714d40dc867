//! Feasibility verification for seeds and paths.
//!
//! The verifier asks the LLM to judge a piece of text, optionally letting
//! it ground the analysis with up to two search-tool calls, then extracts
//! a feasibility score through a prioritised regex ladder. It never
//! throws out of the hot path: every failure mode collapses into the
//! fallback result, whose strongly negative reward teaches the bandit to
//! steer away.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::llm::{ChatRequest, LlmInvoker};
use crate::tools::{ToolCategory, ToolRegistry};

/// Which pipeline stage the text under verification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    ThinkingSeed,
    ReasoningPath,
    InnovativeDetour,
}

impl VerificationStage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ThinkingSeed => "thinking_seed",
            Self::ReasoningPath => "reasoning_path",
            Self::InnovativeDetour => "innovative_detour",
        }
    }
}

/// Outcome of one verification.
///
/// The fallback variant is first-class data: `{0.0, -0.5, fallback_used}`
/// marks a verification that could not run, not an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Feasibility in `[0, 1]`
    pub feasibility_score: f64,
    /// Bandit reward in `[-1, 1]`
    pub reward: f64,
    pub analysis_summary: String,
    pub tool_calls_made: u32,
    pub fallback_used: bool,
}

impl VerificationResult {
    /// The strong-negative result returned when verification itself fails.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            feasibility_score: 0.0,
            reward: -0.5,
            analysis_summary: reason.into(),
            tool_calls_made: 0,
            fallback_used: true,
        }
    }

    pub fn is_feasible(&self, threshold: f64) -> bool {
        self.feasibility_score > threshold
    }
}

const MAX_TOOL_CALLS: u32 = 2;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const SUMMARY_CHARS: usize = 400;

/// Scores text feasibility, optionally grounded by search tools.
pub struct Verifier {
    invoker: Arc<dyn LlmInvoker>,
    registry: Option<Arc<ToolRegistry>>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(invoker: Arc<dyn LlmInvoker>, registry: Option<Arc<ToolRegistry>>) -> Self {
        Self {
            invoker,
            registry,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Verify a piece of text for the given stage.
    ///
    /// Deterministic for fixed text, stage, and collaborator behaviour;
    /// the only side effects are the tool executions themselves.
    pub async fn verify(&self, text: &str, stage: VerificationStage) -> VerificationResult {
        match tokio::time::timeout(self.timeout, self.verify_inner(text, stage)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(stage = stage.tag(), "verification exceeded its time budget");
                VerificationResult::fallback("verification timed out")
            }
        }
    }

    async fn verify_inner(&self, text: &str, stage: VerificationStage) -> VerificationResult {
        let search_tools = self
            .registry
            .as_ref()
            .map(|r| r.by_category(ToolCategory::Search))
            .unwrap_or_default();

        let mut evidence: Vec<String> = Vec::new();
        let mut tool_calls = 0u32;

        loop {
            let prompt = verification_prompt(stage, text, &evidence, !search_tools.is_empty());
            let response = self
                .invoker
                .chat(ChatRequest::new(prompt).with_temperature(0.2))
                .await;

            if !response.success {
                tracing::warn!(
                    stage = stage.tag(),
                    error = response.error.as_deref().unwrap_or("unknown"),
                    "verification LLM call failed"
                );
                return VerificationResult::fallback("verification LLM call failed");
            }

            if tool_calls < MAX_TOOL_CALLS {
                if let Some((tool_name, args)) = parse_tool_call(&response.content) {
                    if let Some(tool) = search_tools.iter().find(|t| t.name() == tool_name) {
                        tool_calls += 1;
                        let result = tool.execute(json!({ "query": args })).await;
                        let rendered = if result.success {
                            result.data_as_text()
                        } else {
                            format!(
                                "tool failed: {}",
                                result.error.as_deref().unwrap_or("unknown error")
                            )
                        };
                        evidence.push(format!("[{tool_name}] {rendered}"));
                        continue;
                    }
                    // Requests outside the search subset are ignored; the
                    // analysis text still counts as the final answer.
                }
            }

            let feasibility = parse_feasibility(&response.content)
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            let tool_bonus = (0.05 * f64::from(tool_calls)).min(0.1);
            let reward = (feasibility - 0.5 + tool_bonus).clamp(-1.0, 1.0);

            return VerificationResult {
                feasibility_score: feasibility,
                reward,
                analysis_summary: summarise(&response.content),
                tool_calls_made: tool_calls,
                fallback_used: false,
            };
        }
    }
}

fn verification_prompt(
    stage: VerificationStage,
    text: &str,
    evidence: &[String],
    tools_available: bool,
) -> String {
    let framing = match stage {
        VerificationStage::ThinkingSeed => {
            "Assess whether this thinking seed captures the task well enough to guide \
             strategy selection."
        }
        VerificationStage::ReasoningPath => {
            "Assess whether this reasoning strategy is likely to succeed on the task it \
             describes."
        }
        VerificationStage::InnovativeDetour => {
            "Assess whether this unconventional strategy is workable despite earlier \
             approaches failing verification."
        }
    };

    let mut prompt = format!(
        "{framing}\n\nText under review:\n{text}\n\n\
         Conclude with a line of the form `feasibility score: <value between 0.0 and 1.0>` \
         and name the main risks."
    );

    if tools_available && evidence.len() < MAX_TOOL_CALLS as usize {
        prompt.push_str(
            "\n\nIf you need supporting evidence, request one search with a line of the form \
             `**TOOL_CALL**: web_search | <query>` and wait for the result.",
        );
    }

    if !evidence.is_empty() {
        prompt.push_str("\n\nEvidence gathered so far:\n");
        for item in evidence {
            prompt.push_str(item);
            prompt.push('\n');
        }
    }

    prompt
}

static TOOL_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*TOOL_CALL\*\*:\s*([A-Za-z0-9_\-]+)\s*\|\s*(.+)").expect("invalid regex")
});

/// Parse a `**TOOL_CALL**: <name> | <args>` marker.
pub(crate) fn parse_tool_call(content: &str) -> Option<(String, String)> {
    let captures = TOOL_CALL_PATTERN.captures(content)?;
    Some((
        captures[1].to_string(),
        captures[2].trim().to_string(),
    ))
}

// Score extraction ladder, most specific first.
static FEASIBILITY_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)feasibility[_\s]*score\s*[:=]\s*([01](?:\.\d+)?)").expect("invalid regex")
});

static FEASIBILITY_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)feasibility\s*[:=]\s*([01](?:\.\d+)?)").expect("invalid regex")
});

static SCORE_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bscore\s*[:=]\s*([01](?:\.\d+)?)").expect("invalid regex")
});

static FEASIBILITY_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)feasibility\D{0,12}(\d{1,3})\s*%").expect("invalid regex")
});

static LOOSE_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(0?\.\d+)\b").expect("invalid regex"));

/// Extract a feasibility score from analysis text.
pub(crate) fn parse_feasibility(content: &str) -> Option<f64> {
    for pattern in [&*FEASIBILITY_LABELED, &*FEASIBILITY_BARE, &*SCORE_LABELED] {
        if let Some(captures) = pattern.captures(content) {
            if let Ok(value) = captures[1].parse::<f64>() {
                return Some(value);
            }
        }
    }

    if let Some(captures) = FEASIBILITY_PERCENT.captures(content) {
        if let Ok(value) = captures[1].parse::<f64>() {
            return Some(value / 100.0);
        }
    }

    LOOSE_DECIMAL
        .captures(content)
        .and_then(|captures| captures[1].parse::<f64>().ok())
}

fn summarise(content: &str) -> String {
    if content.chars().count() <= SUMMARY_CHARS {
        content.trim().to_string()
    } else {
        let truncated: String = content.chars().take(SUMMARY_CHARS).collect();
        format!("{}…", truncated.trim_end())
    }
}
