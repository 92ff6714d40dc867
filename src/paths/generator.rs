//! Seed analysis and path generation.
//!
//! The generator turns a thinking seed into a diverse set of candidate
//! reasoning paths. Analysis prefers the LLM and falls back to pattern
//! heuristics; template selection is fully deterministic in normal mode
//! and deliberately randomised in creative-bypass mode so repeated
//! bypasses explore different creative mixes.

use lru::LruCache;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use crate::llm::{ChatRequest, LlmInvoker};

use super::templates::{
    self, PathTemplate, PathTemplateLibrary, BALANCED_PRESET, HIGH_CREATIVITY_PRESET,
};
use super::types::{ReasoningPath, SeedAnalysis, ThinkingSeed, Urgency};

const GENERATION_CACHE_CAP: usize = 100;

/// How templates are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationMode {
    /// Score templates against the seed analysis
    Normal,
    /// Sample creativity-heavy presets, ignoring cached selections
    CreativeBypass,
}

/// Generates candidate reasoning paths from a thinking seed.
pub struct PathGenerator {
    invoker: Option<Arc<dyn LlmInvoker>>,
    caching_enabled: bool,
    /// Cache of selected template ids; instances are always re-materialised
    /// so instance ids stay unique across runs.
    selection_cache: Mutex<LruCache<String, Vec<String>>>,
    selection_stats: Mutex<HashMap<String, u64>>,
    bypass_invocations: AtomicU64,
}

impl PathGenerator {
    pub fn new(invoker: Option<Arc<dyn LlmInvoker>>) -> Self {
        if invoker.is_none() {
            tracing::warn!("path generator running without an LLM; seed analysis is heuristic");
        }
        Self {
            invoker,
            caching_enabled: true,
            selection_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(GENERATION_CACHE_CAP).expect("cache capacity is nonzero"),
            )),
            selection_stats: Mutex::new(HashMap::new()),
            bypass_invocations: AtomicU64::new(0),
        }
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Analyse a thinking seed into relevance scores and characteristic
    /// flags. Never fails: LLM trouble degrades to the heuristic branch.
    pub async fn analyze(&self, seed_text: &str) -> SeedAnalysis {
        let Some(invoker) = &self.invoker else {
            return heuristic_analysis(seed_text);
        };

        let request = ChatRequest::new(analysis_prompt(seed_text)).with_temperature(0.2);
        let response = invoker.chat(request).await;
        if !response.success {
            tracing::warn!(
                error = response.error.as_deref().unwrap_or("unknown"),
                "seed analysis LLM call failed; using heuristics"
            );
            return heuristic_analysis(seed_text);
        }

        match parse_analysis(&response.content) {
            Ok(analysis) => analysis,
            Err(message) => {
                tracing::warn!(%message, "seed analysis parse failed; using heuristics");
                heuristic_analysis(seed_text)
            }
        }
    }

    /// Generate up to `max_paths` candidate paths (minimum two).
    ///
    /// Every returned path carries a template-derived `strategy_id` and a
    /// fresh, unique `instance_id`.
    pub async fn generate(
        &self,
        seed: &ThinkingSeed,
        task: &str,
        max_paths: usize,
        mode: GenerationMode,
    ) -> Vec<ReasoningPath> {
        let max_paths = max_paths.max(1);
        let cache_key = selection_cache_key(&seed.text, task, max_paths, mode);

        // Bypass mode skips cache reads so repeated aha-moments diversify.
        if self.caching_enabled && mode == GenerationMode::Normal {
            if let Some(ids) = self.selection_cache.lock().expect("cache lock").get(&cache_key) {
                tracing::debug!("path selection served from cache");
                return self.instantiate(ids.clone());
            }
        }

        let selected: Vec<String> = match mode {
            GenerationMode::Normal => {
                select_templates(&seed.analysis, max_paths)
                    .iter()
                    .map(|t| t.strategy_id.to_string())
                    .collect()
            }
            GenerationMode::CreativeBypass => {
                self.bypass_invocations.fetch_add(1, Ordering::Relaxed);
                select_bypass_templates(max_paths, &mut rand::thread_rng())
            }
        };

        if self.caching_enabled {
            self.selection_cache
                .lock()
                .expect("cache lock")
                .put(cache_key, selected.clone());
        }

        tracing::info!(count = selected.len(), ?mode, "generated reasoning paths");
        self.instantiate(selected)
    }

    fn instantiate(&self, strategy_ids: Vec<String>) -> Vec<ReasoningPath> {
        let mut stats = self.selection_stats.lock().expect("stats lock");
        let mut rng = rand::thread_rng();

        strategy_ids
            .iter()
            .filter_map(|id| PathTemplateLibrary::get(id))
            .map(|template| {
                *stats.entry(template.path_type.to_string()).or_insert(0) += 1;
                let instance_id = format!(
                    "{}_{}_{:04}",
                    template.strategy_id,
                    chrono::Utc::now().timestamp_millis(),
                    rng.gen_range(0..10_000)
                );
                template.instantiate(instance_id)
            })
            .collect()
    }

    /// Per-archetype selection counts.
    pub fn selection_stats(&self) -> HashMap<String, u64> {
        self.selection_stats.lock().expect("stats lock").clone()
    }

    /// How many creative-bypass generations have run.
    pub fn creative_bypass_count(&self) -> u64 {
        self.bypass_invocations.load(Ordering::Relaxed)
    }
}

fn selection_cache_key(seed: &str, task: &str, max_paths: usize, mode: GenerationMode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"\x00");
    hasher.update(task.as_bytes());
    format!("{:x}:{}:{:?}", hasher.finalize(), max_paths, mode)
}

/// Normal-mode template selection.
///
/// Scores each template from the analysis, keeps the strictly positive
/// scores, and guarantees a minimum of two paths plus critical coverage
/// when a slot remains.
fn select_templates(analysis: &SeedAnalysis, max_paths: usize) -> Vec<&'static PathTemplate> {
    let mut scored: Vec<(f64, &'static PathTemplate)> = PathTemplateLibrary::all()
        .iter()
        .map(|template| (score_template(template, analysis), template))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    // Stable by catalogue order on ties.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<&'static PathTemplate> =
        scored.into_iter().take(max_paths).map(|(_, t)| t).collect();

    // Too narrow a selection starves the bandit of signal.
    if selected.len() < 2 {
        for id in [templates::SYSTEMATIC_ANALYTICAL, templates::PRACTICAL_PRAGMATIC] {
            if !selected.iter().any(|t| t.strategy_id == id) {
                if let Some(template) = PathTemplateLibrary::get(id) {
                    selected.push(template);
                }
            }
        }
    }

    let has_critical = selected
        .iter()
        .any(|t| t.strategy_id == templates::CRITICAL_QUESTIONING);
    if !has_critical && selected.len() < max_paths {
        if let Some(template) = PathTemplateLibrary::get(templates::CRITICAL_QUESTIONING) {
            selected.push(template);
        }
    }

    selected
}

fn score_template(template: &PathTemplate, analysis: &SeedAnalysis) -> f64 {
    let mut score = analysis.relevance_for(template.strategy_id) * 10.0;

    let flag_bonus = match template.strategy_id {
        templates::COLLABORATIVE_CONSULTATIVE => analysis.needs_collaboration,
        templates::CREATIVE_INNOVATIVE => analysis.needs_innovation,
        templates::CRITICAL_QUESTIONING => analysis.needs_critique,
        templates::PRACTICAL_PRAGMATIC => analysis.needs_practicality,
        templates::HOLISTIC_COMPREHENSIVE => analysis.needs_comprehensive_scope,
        templates::EXPLORATORY_INVESTIGATIVE => analysis.needs_research,
        templates::ADAPTIVE_FLEXIBLE => analysis.needs_adaptivity,
        _ => false,
    };
    if flag_bonus {
        score += 2.0;
    }

    if template.strategy_id == templates::SYSTEMATIC_ANALYTICAL {
        score += 0.5 * analysis.complexity_indicators.len() as f64;
    }

    match analysis.urgency {
        Urgency::High if template.strategy_id == templates::PRACTICAL_PRAGMATIC => score += 1.0,
        Urgency::Low
            if matches!(
                template.strategy_id,
                templates::EXPLORATORY_INVESTIGATIVE | templates::HOLISTIC_COMPREHENSIVE
            ) =>
        {
            score += 1.0
        }
        _ => {}
    }

    score
}

/// Creative-bypass selection: at least half the slots from the
/// high-creativity preset, then balanced archetypes, then anything left.
/// Randomised so consecutive bypasses differ.
fn select_bypass_templates<R: Rng>(max_paths: usize, rng: &mut R) -> Vec<String> {
    let creative_slots = max_paths.div_ceil(2);

    let mut creative: Vec<&str> = HIGH_CREATIVITY_PRESET.to_vec();
    creative.shuffle(rng);
    let mut selected: Vec<String> = creative
        .into_iter()
        .take(creative_slots)
        .map(str::to_string)
        .collect();

    let mut balanced: Vec<&str> = BALANCED_PRESET.to_vec();
    balanced.shuffle(rng);
    for id in balanced {
        if selected.len() >= max_paths {
            break;
        }
        if !selected.iter().any(|s| s == id) {
            selected.push(id.to_string());
        }
    }

    let mut remaining: Vec<&str> = PathTemplateLibrary::strategy_ids()
        .into_iter()
        .filter(|id| !selected.iter().any(|s| s == id))
        .collect();
    remaining.shuffle(rng);
    for id in remaining {
        if selected.len() >= max_paths {
            break;
        }
        selected.push(id.to_string());
    }

    selected
}

fn analysis_prompt(seed_text: &str) -> String {
    let ids = PathTemplateLibrary::strategy_ids().join(", ");
    format!(
        "Analyze this thinking seed and respond with a single JSON object.\n\n\
         Thinking seed:\n{seed_text}\n\n\
         The JSON object must contain:\n\
         - \"relevance\": an object scoring each of [{ids}] from 0.0 to 1.0\n\
         - \"urgency\": one of \"low\", \"normal\", \"high\"\n\
         - \"needs_collaboration\", \"needs_innovation\", \"needs_critique\", \
           \"needs_practicality\", \"needs_comprehensive_scope\", \"needs_research\", \
           \"needs_adaptivity\": booleans\n\
         - \"complexity_indicators\": array of short phrases that make the task complex\n\
         - \"complexity_score\": number from 0.0 to 1.0\n\
         - \"domain_hints\": array of domain keywords\n\n\
         Respond with the JSON object only."
    )
}

#[derive(Debug, Default, Deserialize)]
struct RawSeedAnalysis {
    #[serde(default)]
    relevance: HashMap<String, f64>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    needs_collaboration: bool,
    #[serde(default)]
    needs_innovation: bool,
    #[serde(default)]
    needs_critique: bool,
    #[serde(default)]
    needs_practicality: bool,
    #[serde(default)]
    needs_comprehensive_scope: bool,
    #[serde(default)]
    needs_research: bool,
    #[serde(default)]
    needs_adaptivity: bool,
    #[serde(default)]
    complexity_indicators: Vec<String>,
    #[serde(default)]
    complexity_score: Option<f64>,
    #[serde(default)]
    domain_hints: Vec<String>,
}

fn parse_analysis(content: &str) -> Result<SeedAnalysis, String> {
    let json =
        crate::llm::extract_json_object(content).ok_or("no JSON object in response")?;
    let raw: RawSeedAnalysis =
        serde_json::from_str(json).map_err(|e| format!("malformed analysis JSON: {e}"))?;

    let mut analysis = SeedAnalysis::uniform(&PathTemplateLibrary::strategy_ids());
    for (id, value) in raw.relevance {
        if PathTemplateLibrary::get(&id).is_some() {
            analysis.relevance.insert(id, value.clamp(0.0, 1.0));
        }
    }
    analysis.urgency = match raw.urgency.as_deref() {
        Some("high") => Urgency::High,
        Some("low") => Urgency::Low,
        _ => Urgency::Normal,
    };
    analysis.needs_collaboration = raw.needs_collaboration;
    analysis.needs_innovation = raw.needs_innovation;
    analysis.needs_critique = raw.needs_critique;
    analysis.needs_practicality = raw.needs_practicality;
    analysis.needs_comprehensive_scope = raw.needs_comprehensive_scope;
    analysis.needs_research = raw.needs_research;
    analysis.needs_adaptivity = raw.needs_adaptivity;
    analysis.complexity_indicators = raw.complexity_indicators;
    analysis.complexity_score = raw.complexity_score.unwrap_or(0.5).clamp(0.0, 1.0);
    analysis.domain_hints = raw.domain_hints;
    Ok(analysis)
}

// Heuristic fallback patterns, matching on seed text.
static URGENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(urgent|immediately|asap|right\s+away|deadline|time.critical)")
        .expect("invalid regex")
});

static LEISURELY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(eventually|long.term|no\s+rush|exploratory|background)")
        .expect("invalid regex")
});

static COLLABORATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(team|stakeholder|coordinate|collaborat|consensus|cross.functional)")
        .expect("invalid regex")
});

static INNOVATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(novel|creative|innovat|original|brainstorm|out.of.the.box)")
        .expect("invalid regex")
});

static CRITIQUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(review|audit|validate|verify|challenge|rigorous|prove)")
        .expect("invalid regex")
});

static PRACTICAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(quick|simple|practical|implement|ship|fix|workaround)")
        .expect("invalid regex")
});

static RESEARCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(research|investigate|explore|survey|compare|learn)").expect("invalid regex")
});

static COMPLEXITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(complex|architecture|distributed|concurren\w*|scalab\w*|integrat\w*|migration|multi\S+|trade.?offs?)\b",
    )
    .expect("invalid regex")
});

/// Pattern-based analysis used when the LLM is unavailable or unparseable.
/// Relevance stays uniform at 0.4; flags are set only on strong markers.
fn heuristic_analysis(seed_text: &str) -> SeedAnalysis {
    let mut analysis = SeedAnalysis::uniform(&PathTemplateLibrary::strategy_ids());

    analysis.urgency = if URGENT_PATTERN.is_match(seed_text) {
        Urgency::High
    } else if LEISURELY_PATTERN.is_match(seed_text) {
        Urgency::Low
    } else {
        Urgency::Normal
    };

    analysis.needs_collaboration = COLLABORATION_PATTERN.is_match(seed_text);
    analysis.needs_innovation = INNOVATION_PATTERN.is_match(seed_text);
    analysis.needs_critique = CRITIQUE_PATTERN.is_match(seed_text);
    analysis.needs_practicality = PRACTICAL_PATTERN.is_match(seed_text);
    analysis.needs_research = RESEARCH_PATTERN.is_match(seed_text);

    analysis.complexity_indicators = COMPLEXITY_PATTERN
        .find_iter(seed_text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    analysis.complexity_score =
        (0.3 + 0.1 * analysis.complexity_indicators.len() as f64).clamp(0.0, 1.0);

    analysis
}
