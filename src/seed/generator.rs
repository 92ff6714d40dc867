//! Seed synthesis with graceful degradation.

use futures::stream::{self, StreamExt};
use lru::LruCache;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::config::RagConfig;
use crate::llm::{ChatRequest, LlmInvoker};
use crate::paths::{GroundingStatus, PathTemplateLibrary, ThinkingSeed};
use crate::search::{SearchClient, SearchHit, SearchRateLimiter};

use super::types::{SearchDepth, SearchPlan};

const SEED_CACHE_CAP: usize = 100;
const PLAN_CACHE_CAP: usize = 100;

/// Produces a thinking seed for a task.
///
/// With retrieval enabled and a search client present, seeds are
/// synthesised over ranked evidence; otherwise a direct LLM summary is
/// used. The ultimate fallback is the minimal templated seed; this
/// stage never raises.
pub struct SeedGenerator {
    invoker: Arc<dyn LlmInvoker>,
    search: Option<Arc<dyn SearchClient>>,
    config: RagConfig,
    rag_enabled: bool,
    rate_limiter: Arc<SearchRateLimiter>,
    seed_cache: Mutex<LruCache<String, ThinkingSeed>>,
    plan_cache: Mutex<LruCache<String, SearchPlan>>,
}

impl SeedGenerator {
    pub fn new(
        invoker: Arc<dyn LlmInvoker>,
        search: Option<Arc<dyn SearchClient>>,
        config: RagConfig,
        rag_enabled: bool,
    ) -> Self {
        let rate_limiter = Arc::new(SearchRateLimiter::new(config.search_rate_limit_interval_s));
        Self {
            invoker,
            search,
            config,
            rag_enabled,
            rate_limiter,
            seed_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(SEED_CACHE_CAP).expect("cache capacity is nonzero"),
            )),
            plan_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(PLAN_CACHE_CAP).expect("cache capacity is nonzero"),
            )),
        }
    }

    /// Generate a seed for the task, optionally conditioned on context.
    pub async fn generate(&self, task: &str, context: Option<&str>) -> ThinkingSeed {
        let cache_key = cache_key(task, context);
        if let Some(seed) = self.seed_cache.lock().expect("cache lock").get(&cache_key) {
            tracing::debug!("seed served from cache");
            return seed.clone();
        }

        let seed = if self.rag_enabled && self.search.is_some() {
            self.rag_generate(task, context).await
        } else {
            self.direct_generate(task, context).await
        };

        self.seed_cache
            .lock()
            .expect("cache lock")
            .put(cache_key, seed.clone());
        seed
    }

    /// Direct LLM seed, no retrieval.
    async fn direct_generate(&self, task: &str, context: Option<&str>) -> ThinkingSeed {
        let mut prompt = format!(
            "Summarise the following task into a concise \"thinking seed\": a grounded \
             paragraph naming what is being asked, the constraints that matter, and the \
             most promising angles of attack.\n\nTask: {task}"
        );
        if let Some(context) = context {
            prompt.push_str(&format!("\n\nContext: {context}"));
        }

        let response = self
            .invoker
            .chat(ChatRequest::new(prompt).with_temperature(0.4))
            .await;

        if response.success && response.content.trim().len() > 20 {
            ThinkingSeed::from_text(
                response.content.trim().to_string(),
                &PathTemplateLibrary::strategy_ids(),
            )
        } else {
            tracing::warn!("direct seed generation failed; using minimal seed");
            ThinkingSeed::minimal(task, &PathTemplateLibrary::strategy_ids())
        }
    }

    /// Three-phase retrieval recipe: plan, search, synthesise.
    async fn rag_generate(&self, task: &str, context: Option<&str>) -> ThinkingSeed {
        let plan = self.plan(task, context).await;
        let hits = self.gather(&plan).await;
        self.synthesise(task, &plan, &hits).await
    }

    /// Plan phase: ask the LLM what to search for; heuristic plan on failure.
    async fn plan(&self, task: &str, context: Option<&str>) -> SearchPlan {
        let cache_key = cache_key(task, context);
        if let Some(plan) = self.plan_cache.lock().expect("cache lock").get(&cache_key) {
            return plan.clone();
        }

        let response = self
            .invoker
            .chat(ChatRequest::new(plan_prompt(task, context)).with_temperature(0.2))
            .await;

        let plan = if response.success {
            parse_plan(&response.content).unwrap_or_else(|message| {
                tracing::warn!(%message, "search-plan parse failed; using heuristic plan");
                heuristic_plan(task)
            })
        } else {
            tracing::warn!("search-plan LLM call failed; using heuristic plan");
            heuristic_plan(task)
        };

        self.plan_cache
            .lock()
            .expect("cache lock")
            .put(cache_key, plan.clone());
        plan
    }

    /// Search phase: bounded fan-out, URL dedup, keyword ranking.
    /// A failed query contributes nothing; partial results are fine.
    async fn gather(&self, plan: &SearchPlan) -> Vec<SearchHit> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        let queries = plan.queries();
        if queries.is_empty() {
            return Vec::new();
        }

        let max_results = self.config.max_search_results;
        let limiter = Arc::clone(&self.rate_limiter);

        let mut hits: Vec<SearchHit> = if self.config.enable_parallel_search {
            stream::iter(queries)
                .map(|query| {
                    let search = Arc::clone(search);
                    let limiter = Arc::clone(&limiter);
                    async move {
                        limiter.wait().await;
                        search.search(&query, max_results).await
                    }
                })
                .buffer_unordered(self.config.max_search_workers.max(1))
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .filter(|response| response.success)
                .flat_map(|response| response.results)
                .collect()
        } else {
            let mut collected = Vec::new();
            for query in queries {
                limiter.wait().await;
                let response = search.search(&query, max_results).await;
                if response.success {
                    collected.extend(response.results);
                }
            }
            collected
        };

        dedupe_by_url(&mut hits);
        rank_hits(&mut hits, &plan.ranking_terms());
        hits.truncate(self.config.max_search_results);
        hits
    }

    /// Synthesis phase: LLM summary over the evidence, templated fallback.
    async fn synthesise(
        &self,
        task: &str,
        plan: &SearchPlan,
        hits: &[SearchHit],
    ) -> ThinkingSeed {
        let response = self
            .invoker
            .chat(ChatRequest::new(synthesis_prompt(task, plan, hits)).with_temperature(0.4))
            .await;

        if response.success {
            if let Ok(mut seed) = parse_synthesis(&response.content) {
                seed.grounding.status = if hits.is_empty() {
                    GroundingStatus::Unverified
                } else {
                    GroundingStatus::SearchBacked
                };
                return seed;
            }
            tracing::warn!("seed synthesis parse failed; using templated fallback");
        } else {
            tracing::warn!("seed synthesis LLM call failed; using templated fallback");
        }

        templated_fallback(task, hits)
    }
}

fn cache_key(task: &str, context: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    hasher.update(b"\x00");
    if let Some(context) = context {
        hasher.update(context.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn plan_prompt(task: &str, context: Option<&str>) -> String {
    let context_line = context
        .map(|c| format!("\nContext: {c}"))
        .unwrap_or_default();
    format!(
        "Plan a short web-search campaign that would ground an approach to this task.\n\
         Task: {task}{context_line}\n\n\
         Respond with a single JSON object containing:\n\
         - \"search_intent\": one sentence\n\
         - \"primary_keywords\": up to 3 strings\n\
         - \"secondary_keywords\": up to 3 strings\n\
         - \"domain_focus\": one phrase\n\
         - \"information_types\": array of strings\n\
         - \"search_depth\": \"shallow\", \"standard\", or \"deep\"\n\n\
         Respond with the JSON object only."
    )
}

#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    search_intent: String,
    #[serde(default)]
    primary_keywords: Vec<String>,
    #[serde(default)]
    secondary_keywords: Vec<String>,
    #[serde(default)]
    domain_focus: String,
    #[serde(default)]
    information_types: Vec<String>,
    #[serde(default)]
    search_depth: Option<String>,
}

fn parse_plan(content: &str) -> Result<SearchPlan, String> {
    let json = crate::llm::extract_json_object(content).ok_or("no JSON object")?;
    let raw: RawPlan = serde_json::from_str(json).map_err(|e| format!("malformed plan: {e}"))?;
    if raw.primary_keywords.iter().all(|k| k.trim().is_empty()) {
        return Err("plan has no primary keywords".to_string());
    }
    Ok(SearchPlan {
        search_intent: raw.search_intent,
        primary_keywords: raw.primary_keywords,
        secondary_keywords: raw.secondary_keywords,
        domain_focus: raw.domain_focus,
        information_types: raw.information_types,
        search_depth: match raw.search_depth.as_deref() {
            Some("shallow") => SearchDepth::Shallow,
            Some("deep") => SearchDepth::Deep,
            _ => SearchDepth::Standard,
        },
    })
}

/// Keyword plan built from the task text alone.
fn heuristic_plan(task: &str) -> SearchPlan {
    let mut seen = std::collections::HashSet::new();
    let primary: Vec<String> = task
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|word| word.len() > 3 && seen.insert(word.clone()))
        .take(3)
        .collect();

    SearchPlan {
        search_intent: format!("Ground an approach to: {task}"),
        primary_keywords: if primary.is_empty() {
            vec![task.to_string()]
        } else {
            primary
        },
        secondary_keywords: vec!["best practices".to_string()],
        domain_focus: String::new(),
        information_types: vec!["documentation".to_string(), "prior art".to_string()],
        search_depth: SearchDepth::Standard,
    }
}

fn dedupe_by_url(hits: &mut Vec<SearchHit>) {
    let mut seen = std::collections::HashSet::new();
    hits.retain(|hit| seen.insert(hit.url.clone()));
}

/// Rank by how many plan terms appear in the title or snippet.
fn rank_hits(hits: &mut [SearchHit], terms: &[String]) {
    let score = |hit: &SearchHit| -> usize {
        let haystack = format!("{} {}", hit.title, hit.snippet).to_lowercase();
        terms.iter().filter(|term| haystack.contains(*term)).count()
    };
    hits.sort_by_key(|hit| std::cmp::Reverse(score(hit)));
}

fn synthesis_prompt(task: &str, plan: &SearchPlan, hits: &[SearchHit]) -> String {
    let evidence = if hits.is_empty() {
        "No search evidence is available; rely on general knowledge.".to_string()
    } else {
        hits.iter()
            .take(5)
            .map(|hit| format!("- {}: {}", hit.title, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Synthesise a \"thinking seed\" for this task from the evidence below.\n\n\
         Task: {task}\n\
         Search intent: {}\n\
         Evidence:\n{evidence}\n\n\
         Respond with a single JSON object containing:\n\
         - \"seed\": a grounded paragraph summarising the task and promising approaches\n\
         - \"key_insights\": array of strings\n\
         - \"knowledge_gaps\": array of strings\n\
         - \"confidence_score\": number from 0.0 to 1.0\n\
         - \"verification_status\": \"verified\" or \"unverified\"\n\n\
         Respond with the JSON object only.",
        plan.search_intent
    )
}

#[derive(Debug, Default, Deserialize)]
struct RawSynthesis {
    #[serde(default)]
    seed: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    knowledge_gaps: Vec<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
}

fn parse_synthesis(content: &str) -> Result<ThinkingSeed, String> {
    let json = crate::llm::extract_json_object(content).ok_or("no JSON object")?;
    let raw: RawSynthesis =
        serde_json::from_str(json).map_err(|e| format!("malformed synthesis: {e}"))?;
    if raw.seed.trim().len() < 20 {
        return Err("synthesised seed too short".to_string());
    }

    let mut seed = ThinkingSeed::from_text(
        raw.seed.trim().to_string(),
        &PathTemplateLibrary::strategy_ids(),
    );
    seed.grounding.key_insights = raw.key_insights;
    seed.grounding.knowledge_gaps = raw.knowledge_gaps;
    seed.grounding.confidence_score = raw.confidence_score.unwrap_or(0.5).clamp(0.0, 1.0);
    Ok(seed)
}

/// Fixed-form seed over the top snippets, used when synthesis fails.
fn templated_fallback(task: &str, hits: &[SearchHit]) -> ThinkingSeed {
    let mut text = format!("Based on '{task}', the gathered evidence suggests:");
    if hits.is_empty() {
        text = ThinkingSeed::minimal(task, &PathTemplateLibrary::strategy_ids()).text;
    } else {
        for (i, hit) in hits.iter().take(3).enumerate() {
            text.push_str(&format!(" ({}) {}", i + 1, hit.snippet));
        }
        text.push_str(" A workable approach should build on these findings.");
    }

    let mut seed = ThinkingSeed::from_text(text, &PathTemplateLibrary::strategy_ids());
    seed.grounding.status = GroundingStatus::Fallback;
    seed.grounding.fallback_used = true;
    seed.grounding.confidence_score = 0.3;
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::search::SearchResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedInvoker {
        responses: Mutex<Vec<LlmResponse>>,
    }

    impl ScriptedInvoker {
        fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl LlmInvoker for ScriptedInvoker {
        async fn chat(&self, _request: ChatRequest) -> LlmResponse {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                LlmResponse::err("script exhausted")
            } else {
                responses.remove(0)
            }
        }
    }

    struct StaticSearch {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchClient for StaticSearch {
        async fn search(&self, query: &str, _max_results: usize) -> SearchResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SearchResponse::ok(
                vec![
                    SearchHit {
                        title: format!("{query} guide"),
                        snippet: format!("all about {query}"),
                        url: format!("https://example.com/{}", query.replace(' ', "-")),
                    },
                    SearchHit {
                        title: "duplicate".into(),
                        snippet: "dup".into(),
                        url: "https://example.com/shared".into(),
                    },
                ],
                0.01,
            )
        }
    }

    fn rag_config() -> RagConfig {
        RagConfig {
            search_rate_limit_interval_s: 0.0,
            ..Default::default()
        }
    }

    const PLAN_JSON: &str = r#"{"search_intent": "ground the task",
        "primary_keywords": ["rate limiting"],
        "secondary_keywords": ["token bucket"],
        "domain_focus": "networking", "information_types": ["docs"],
        "search_depth": "standard"}"#;

    const SYNTHESIS_JSON: &str = r#"{"seed": "A rate-limited client should wrap a token bucket around each request path.",
        "key_insights": ["token bucket fits bursty traffic"],
        "knowledge_gaps": ["provider quotas"],
        "confidence_score": 0.8,
        "verification_status": "verified"}"#;

    #[tokio::test]
    async fn test_rag_pipeline_produces_search_backed_seed() {
        let invoker = ScriptedInvoker::new(vec![
            LlmResponse::ok(PLAN_JSON),
            LlmResponse::ok(SYNTHESIS_JSON),
        ]);
        let search = Arc::new(StaticSearch {
            calls: AtomicU32::new(0),
        });
        let generator = SeedGenerator::new(invoker, Some(search.clone()), rag_config(), true);

        let seed = generator.generate("design a rate-limited HTTP client", None).await;
        assert_eq!(seed.grounding.status, GroundingStatus::SearchBacked);
        assert!(seed.text.contains("token bucket"));
        assert_eq!(seed.grounding.confidence_score, 0.8);
        // two queries from the plan: primary + primary⊗secondary
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_plan_failure_uses_heuristic_plan() {
        let invoker = ScriptedInvoker::new(vec![
            LlmResponse::err("plan model down"),
            LlmResponse::ok(SYNTHESIS_JSON),
        ]);
        let search = Arc::new(StaticSearch {
            calls: AtomicU32::new(0),
        });
        let generator = SeedGenerator::new(invoker, Some(search.clone()), rag_config(), true);

        let seed = generator.generate("design a rate-limited HTTP client", None).await;
        assert!(seed.text.len() > 20);
        assert!(search.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_synthesis_failure_yields_templated_fallback() {
        let invoker = ScriptedInvoker::new(vec![
            LlmResponse::ok(PLAN_JSON),
            LlmResponse::err("synthesis model down"),
        ]);
        let search = Arc::new(StaticSearch {
            calls: AtomicU32::new(0),
        });
        let generator = SeedGenerator::new(invoker, Some(search), rag_config(), true);

        let seed = generator.generate("design a cache", None).await;
        assert_eq!(seed.grounding.status, GroundingStatus::Fallback);
        assert!(seed.grounding.fallback_used);
        assert!(seed.text.starts_with("Based on 'design a cache'"));
    }

    #[tokio::test]
    async fn test_everything_failing_still_yields_minimal_seed() {
        let invoker = ScriptedInvoker::new(vec![]);
        let generator = SeedGenerator::new(invoker, None, rag_config(), true);

        let seed = generator.generate("impossible task", None).await;
        assert!(seed.text.starts_with("Based on 'impossible task'"));
        assert!(seed.grounding.fallback_used);
    }

    #[tokio::test]
    async fn test_seed_cache_hits_by_task_and_context() {
        let invoker = ScriptedInvoker::new(vec![
            LlmResponse::ok("A direct seed about parsing that is long enough to keep."),
        ]);
        let generator = SeedGenerator::new(invoker, None, rag_config(), false);

        let first = generator.generate("parse logs", Some("ctx")).await;
        // Script is exhausted: a cache miss would now fall back to minimal.
        let second = generator.generate("parse logs", Some("ctx")).await;
        assert_eq!(first.text, second.text);

        let third = generator.generate("parse logs", Some("other ctx")).await;
        assert_ne!(first.text, third.text);
    }

    #[test]
    fn test_dedupe_and_rank() {
        let mut hits = vec![
            SearchHit {
                title: "unrelated".into(),
                snippet: "nothing here".into(),
                url: "https://a".into(),
            },
            SearchHit {
                title: "rate limiting deep dive".into(),
                snippet: "token bucket implementation".into(),
                url: "https://b".into(),
            },
            SearchHit {
                title: "dup".into(),
                snippet: "dup".into(),
                url: "https://a".into(),
            },
        ];
        dedupe_by_url(&mut hits);
        assert_eq!(hits.len(), 2);
        rank_hits(&mut hits, &["rate limiting".into(), "token bucket".into()]);
        assert_eq!(hits[0].url, "https://b");
    }
}
