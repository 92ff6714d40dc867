//! The five-stage decision pipeline.
//!
//! 1. SEED: produce a grounded thinking seed for the task
//! 2. SEED VERIFICATION: score the seed's feasibility
//! 3. PATH GENERATION: expand the seed into candidate reasoning paths
//! 4. PATH VERIFICATION: score each path, feeding the bandit instantly
//! 5. SELECTION: pick a path, with aha-moment and detour branches
//!
//! The pipeline never raises under normal operation: every stage
//! degrades into a fallback so a decision always completes and the
//! bandit learns from the negative signal. Invariant violations and
//! cancellation are the only errors surfaced to the caller.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::llm::{ChatRequest, LlmInvoker};
use crate::mab::{AlgorithmUsed, MabConverger, MabSelection, SelectionAlgorithm, ToolSelector};
use crate::paths::{
    GenerationMode, PathGenerator, PathTemplateLibrary, ReasoningPath, ThinkingSeed,
};
use crate::search::SearchClient;
use crate::seed::SeedGenerator;
use crate::state::StateManager;
use crate::tools::ToolRegistry;
use crate::verify::{VerificationResult, VerificationStage, Verifier};

/// Feasibility above this counts as a success for regular paths.
const PATH_FEASIBILITY_THRESHOLD: f64 = 0.3;
/// Detour paths update the bandit with this lower success bar.
const DETOUR_SUCCESS_THRESHOLD: f64 = 0.4;
/// Minimum innovative feasibility to accept a detour path at all.
const DETOUR_ACCEPT_FLOOR: f64 = 0.2;
/// Seed feasibility below this logs a warning but does not stop the run.
const SEED_WARN_THRESHOLD: f64 = 0.3;
/// Maximum innovative paths generated by the detour.
const DETOUR_MAX_PATHS: usize = 3;

const AHA_CONFIDENCE_THRESHOLD: f64 = 0.3;
const AHA_CONSECUTIVE_FAILURES: u32 = 3;
const AHA_RECENT_FAILURES: usize = 3;
const AHA_RECENT_WINDOW_SECS: i64 = 300;
const AHA_TRIGGER_LOG_CAP: usize = 50;

/// Per-stage wall-clock timings in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub seed_ms: f64,
    pub seed_verification_ms: f64,
    pub path_generation_ms: f64,
    pub path_verification_ms: f64,
    pub selection_ms: f64,
}

/// A path together with its verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedPath {
    pub path: ReasoningPath,
    pub verification: VerificationResult,
}

/// The record a completed decision leaves behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub round: u64,
    pub user_query: String,
    pub thinking_seed: ThinkingSeed,
    pub seed_verification: VerificationResult,
    pub available_paths: Vec<ReasoningPath>,
    pub verified_paths: Vec<VerifiedPath>,
    pub chosen_path: ReasoningPath,
    pub mab_decision: MabSelection,
    pub timings: StageTimings,
    pub detour_triggered: bool,
    pub aha_triggered: bool,
    pub fallback_used: bool,
    pub emergency_fallback: bool,
    /// Human-readable account of how the choice was made
    pub reason: String,
}

/// Aggregate statistics of the aha-moment and detour machinery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AhaStats {
    pub total_aha_moments: u64,
    pub total_detours: u64,
    pub successes: u64,
    pub failures: u64,
    pub triggers: Vec<String>,
}

#[derive(Debug, Default)]
struct AhaTracking {
    stats: AhaStats,
    consecutive_failures: u32,
    recent_failures: VecDeque<DateTime<Utc>>,
}

impl AhaTracking {
    fn record_trigger(&mut self, reason: String) {
        self.stats.total_aha_moments += 1;
        self.stats.triggers.push(reason);
        while self.stats.triggers.len() > AHA_TRIGGER_LOG_CAP {
            self.stats.triggers.remove(0);
        }
    }

    fn recent_failure_count(&self, now: DateTime<Utc>) -> usize {
        let window = ChronoDuration::seconds(AHA_RECENT_WINDOW_SECS);
        self.recent_failures
            .iter()
            .filter(|t| now - **t <= window)
            .count()
    }
}

struct FailureAnalysis {
    failed_paths: usize,
    average_feasibility: f64,
    risk_patterns: Vec<String>,
}

/// Runs the five-stage pipeline and owns the engine's moving parts.
pub struct DecisionOrchestrator {
    invoker: Arc<dyn LlmInvoker>,
    seed_generator: SeedGenerator,
    path_generator: PathGenerator,
    verifier: Verifier,
    mab: Arc<MabConverger>,
    tool_selector: ToolSelector,
    state: Arc<StateManager>,
    config: EngineConfig,
    round: AtomicU64,
    cancelled: AtomicBool,
    decision_history: Mutex<VecDeque<DecisionResult>>,
    aha: Mutex<AhaTracking>,
}

impl DecisionOrchestrator {
    pub fn new(
        invoker: Arc<dyn LlmInvoker>,
        search: Option<Arc<dyn SearchClient>>,
        registry: Option<Arc<ToolRegistry>>,
        config: EngineConfig,
    ) -> Self {
        let seed_generator = SeedGenerator::new(
            Arc::clone(&invoker),
            search,
            config.rag.clone(),
            config.features.rag_seed_generation,
        );
        let path_generator = PathGenerator::new(Some(Arc::clone(&invoker)))
            .with_caching(config.performance.enable_intelligent_caching);
        let verifier = Verifier::new(Arc::clone(&invoker), registry);
        let mut strategy_mab = MabConverger::new(config.mab.clone());
        if !config.features.golden_template_system {
            strategy_mab = strategy_mab.without_golden_templates();
        }
        let mab = Arc::new(strategy_mab);
        let tool_selector = ToolSelector::new(config.mab.clone(), Some(Arc::clone(&invoker)));

        Self {
            invoker,
            seed_generator,
            path_generator,
            verifier,
            mab,
            tool_selector,
            state: Arc::new(StateManager::new()),
            config,
            round: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            decision_history: Mutex::new(VecDeque::new()),
            aha: Mutex::new(AhaTracking::default()),
        }
    }

    /// The strategy bandit, for observation and post-hoc updates.
    pub fn mab(&self) -> &Arc<MabConverger> {
        &self.mab
    }

    /// The tool-selection bandit used by the agent loop.
    pub fn tool_selector(&self) -> &ToolSelector {
        &self.tool_selector
    }

    /// The session state ledger.
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Request cancellation; the running pipeline aborts at the next
    /// stage boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.swap(false, Ordering::SeqCst) {
            Err(Error::cancelled("session cancelled the pipeline"))
        } else {
            Ok(())
        }
    }

    /// Run one decision for the task.
    pub async fn decide(
        &self,
        task: &str,
        prior_confidence: f64,
        context: Option<&str>,
    ) -> Result<DecisionResult> {
        let round = self.round.fetch_add(1, Ordering::SeqCst) + 1;
        let mut timings = StageTimings::default();
        tracing::info!(round, task, "decision pipeline started");

        // Stage 1: thinking seed.
        self.check_cancelled()?;
        let stage = Instant::now();
        let mut seed = self.seed_generator.generate(task, context).await;
        seed.truncate_to(self.config.limits.max_thinking_seed_length);
        timings.seed_ms = stage.elapsed().as_secs_f64() * 1000.0;

        // Stage 2: seed verification.
        self.check_cancelled()?;
        let stage = Instant::now();
        let seed_verification = if self.config.features.real_time_verification {
            self.verifier
                .verify(&seed.text, VerificationStage::ThinkingSeed)
                .await
        } else {
            VerificationResult {
                feasibility_score: 0.5,
                reward: 0.0,
                analysis_summary: "seed verification disabled".to_string(),
                tool_calls_made: 0,
                fallback_used: false,
            }
        };
        if seed_verification.feasibility_score < SEED_WARN_THRESHOLD {
            tracing::warn!(
                feasibility = seed_verification.feasibility_score,
                "seed verification scored low; proceeding anyway"
            );
        }
        timings.seed_verification_ms = stage.elapsed().as_secs_f64() * 1000.0;

        // Stage 3: path generation.
        self.check_cancelled()?;
        let stage = Instant::now();
        seed.analysis = self.path_generator.analyze(&seed.text).await;
        let available_paths = self
            .path_generator
            .generate(
                &seed,
                task,
                self.config.limits.max_reasoning_paths,
                GenerationMode::Normal,
            )
            .await;
        ensure_template_derived(&available_paths)?;
        timings.path_generation_ms = stage.elapsed().as_secs_f64() * 1000.0;

        // Stage 4: path verification with instant learning.
        self.check_cancelled()?;
        let stage = Instant::now();
        let verify_count = self.verification_count(prior_confidence, &seed, available_paths.len());
        let verified_paths = self.verify_paths(&available_paths[..verify_count]).await;
        let any_feasible = verified_paths
            .iter()
            .any(|v| v.verification.is_feasible(PATH_FEASIBILITY_THRESHOLD));
        timings.path_verification_ms = stage.elapsed().as_secs_f64() * 1000.0;

        // Stage 5: final selection.
        self.check_cancelled()?;
        let stage = Instant::now();
        let mut all_paths = available_paths;
        let mut detour_triggered = false;
        let mut aha_triggered = false;
        let mut emergency_fallback = false;
        let mut reason;

        let selection = if any_feasible {
            let mut selection = self.mab.select_best(&all_paths, SelectionAlgorithm::Auto)?;
            reason = format!(
                "selected '{}' via {}",
                selection.chosen.strategy_id,
                selection.algorithm.as_str()
            );

            if self.config.features.aha_moment_system {
                if let Some(trigger) = self.aha_trigger(&selection.chosen.strategy_id) {
                    aha_triggered = true;
                    tracing::info!(%trigger, "aha moment: generating creative bypass paths");
                    self.aha.lock().expect("aha lock").record_trigger(trigger.clone());

                    let extra = self
                        .path_generator
                        .generate(
                            &seed,
                            task,
                            self.config.limits.max_reasoning_paths,
                            GenerationMode::CreativeBypass,
                        )
                        .await;
                    merge_paths(&mut all_paths, extra);
                    selection = self.mab.select_best(&all_paths, SelectionAlgorithm::Auto)?;
                    reason = format!(
                        "aha moment ({trigger}); re-selected '{}' via {}",
                        selection.chosen.strategy_id,
                        selection.algorithm.as_str()
                    );
                }
            }
            selection
        } else {
            detour_triggered = true;
            self.aha.lock().expect("aha lock").stats.total_detours += 1;
            let (selection, detour_paths, was_emergency, detour_reason) =
                self.intelligent_detour(task, &seed, &verified_paths).await;
            emergency_fallback = was_emergency;
            merge_paths(&mut all_paths, detour_paths);
            reason = detour_reason;
            selection
        };
        timings.selection_ms = stage.elapsed().as_secs_f64() * 1000.0;

        let result = DecisionResult {
            decision_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            round,
            user_query: task.to_string(),
            thinking_seed: seed,
            seed_verification,
            available_paths: all_paths,
            verified_paths,
            chosen_path: selection.chosen.clone(),
            mab_decision: selection,
            timings,
            detour_triggered,
            aha_triggered,
            fallback_used: detour_triggered || emergency_fallback,
            emergency_fallback,
            reason,
        };

        let mut history = self.decision_history.lock().expect("history lock");
        history.push_back(result.clone());
        while history.len() > self.config.limits.max_decision_history {
            history.pop_front();
        }
        drop(history);

        tracing::info!(
            round,
            chosen = %result.chosen_path.strategy_id,
            detour = detour_triggered,
            "decision pipeline finished"
        );
        Ok(result)
    }

    /// Post-hoc feedback: the caller reports how the chosen strategy
    /// actually fared. Feeds the bandit and the aha failure counters.
    ///
    /// Reward composition: `0.5·outcome + 0.3·(2·satisfaction − 1) +
    /// 0.2·rl_reward`, minus a penalty growing with execution time and
    /// capped at 0.2.
    pub fn update_outcome(
        &self,
        decision: &DecisionResult,
        success: bool,
        execution_time: f64,
        user_satisfaction: f64,
        rl_reward: f64,
    ) {
        let outcome = if success { 0.5 } else { -0.5 };
        let satisfaction = 0.3 * (2.0 * user_satisfaction.clamp(0.0, 1.0) - 1.0);
        let rl = 0.2 * rl_reward.clamp(-1.0, 1.0);
        let time_penalty = (execution_time / 300.0).clamp(0.0, 0.2);
        let reward = (outcome + satisfaction + rl - time_penalty).clamp(-1.0, 1.0);

        self.mab
            .update(&decision.chosen_path.strategy_id, success, reward);

        let mut aha = self.aha.lock().expect("aha lock");
        if success {
            aha.consecutive_failures = 0;
        } else {
            aha.consecutive_failures += 1;
            aha.recent_failures.push_back(Utc::now());
            while aha.recent_failures.len() > 20 {
                aha.recent_failures.pop_front();
            }
        }
        if decision.aha_triggered || decision.detour_triggered {
            if success {
                aha.stats.successes += 1;
            } else {
                aha.stats.failures += 1;
            }
        }
    }

    /// Bounded history of completed decisions, oldest first.
    pub fn decision_history(&self) -> Vec<DecisionResult> {
        self.decision_history
            .lock()
            .expect("history lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn aha_stats(&self) -> AhaStats {
        self.aha.lock().expect("aha lock").stats.clone()
    }

    /// How many paths stage 4 should verify.
    fn verification_count(
        &self,
        prior_confidence: f64,
        seed: &ThinkingSeed,
        available: usize,
    ) -> usize {
        let performance = &self.config.performance;
        if !(self.config.features.performance_optimization
            && performance.enable_adaptive_path_count)
        {
            return available;
        }

        let base = performance.paths_for_confidence(prior_confidence.clamp(0.0, 1.0));
        let nudged = if seed.analysis.complexity_score > 0.7 {
            base + 1
        } else if seed.analysis.complexity_score < 0.3 {
            base.saturating_sub(1)
        } else {
            base
        };
        nudged.clamp(1, available)
    }

    /// Stage 4 body: verify paths (bounded-parallel or serial), apply
    /// instant bandit updates in completion order, and optionally stop
    /// early once results agree.
    async fn verify_paths(&self, paths: &[ReasoningPath]) -> Vec<VerifiedPath> {
        let performance = &self.config.performance;
        let parallel = self.config.features.performance_optimization
            && performance.enable_parallel_path_verification;
        let early_termination = self.config.features.performance_optimization
            && performance.enable_early_termination;

        let mut verified: Vec<VerifiedPath> = Vec::with_capacity(paths.len());

        if parallel {
            let mut results = stream::iter(paths.iter().cloned())
                .map(|path| async move {
                    let verification = self
                        .verifier
                        .verify(&path_text(&path), VerificationStage::ReasoningPath)
                        .await;
                    (path, verification)
                })
                .buffer_unordered(performance.max_concurrent_verifications.max(1));

            while let Some((path, verification)) = results.next().await {
                self.apply_instant_update(&path, &verification);
                verified.push(VerifiedPath { path, verification });
                if early_termination
                    && should_stop_early(&verified, performance.path_consistency_threshold)
                {
                    tracing::debug!(
                        verified = verified.len(),
                        "early termination: verification results agree"
                    );
                    break;
                }
            }
        } else {
            for path in paths {
                let verification = self
                    .verifier
                    .verify(&path_text(path), VerificationStage::ReasoningPath)
                    .await;
                self.apply_instant_update(path, &verification);
                verified.push(VerifiedPath {
                    path: path.clone(),
                    verification,
                });
                if early_termination
                    && should_stop_early(&verified, performance.path_consistency_threshold)
                {
                    tracing::debug!(
                        verified = verified.len(),
                        "early termination: verification results agree"
                    );
                    break;
                }
            }
        }

        verified
    }

    fn apply_instant_update(&self, path: &ReasoningPath, verification: &VerificationResult) {
        self.mab.update(
            &path.strategy_id,
            verification.is_feasible(PATH_FEASIBILITY_THRESHOLD),
            verification.reward,
        );
    }

    /// The secondary creative-bypass trigger, checked after a normal
    /// selection succeeds.
    fn aha_trigger(&self, chosen_strategy: &str) -> Option<String> {
        let confidence = self.mab.confidence(chosen_strategy);
        if confidence < AHA_CONFIDENCE_THRESHOLD {
            return Some(format!(
                "chosen strategy confidence {confidence:.2} below {AHA_CONFIDENCE_THRESHOLD}"
            ));
        }
        if self.mab.all_low_confidence(AHA_CONFIDENCE_THRESHOLD) {
            return Some("all strategies below the confidence threshold".to_string());
        }

        let aha = self.aha.lock().expect("aha lock");
        if aha.consecutive_failures >= AHA_CONSECUTIVE_FAILURES {
            return Some(format!(
                "{} consecutive failed decisions",
                aha.consecutive_failures
            ));
        }
        let recent = aha.recent_failure_count(Utc::now());
        if recent >= AHA_RECENT_FAILURES {
            return Some(format!("{recent} failures in the last five minutes"));
        }
        None
    }

    /// Detour branch for unanimous verification failure: analyse the
    /// failures, reseed away from them, verify innovative alternatives,
    /// and fall back to the conservative path if nothing clears the bar.
    async fn intelligent_detour(
        &self,
        task: &str,
        seed: &ThinkingSeed,
        failed: &[VerifiedPath],
    ) -> (MabSelection, Vec<ReasoningPath>, bool, String) {
        let analysis = analyse_failures(failed);
        tracing::info!(
            failed = analysis.failed_paths,
            average_feasibility = analysis.average_feasibility,
            "intelligent detour engaged"
        );

        let innovative_seed = self.innovative_seed(task, &seed.text, &analysis).await;
        let mut innovative_paths = self
            .path_generator
            .generate(
                &innovative_seed,
                task,
                DETOUR_MAX_PATHS,
                GenerationMode::CreativeBypass,
            )
            .await;
        innovative_paths.truncate(DETOUR_MAX_PATHS);
        if innovative_paths.is_empty() {
            innovative_paths = emergency_paths();
        }

        let mut best: Option<(ReasoningPath, f64)> = None;
        for path in &innovative_paths {
            let verification = self
                .verifier
                .verify(&path_text(path), VerificationStage::InnovativeDetour)
                .await;
            self.mab.update(
                &path.strategy_id,
                verification.is_feasible(DETOUR_SUCCESS_THRESHOLD),
                verification.reward,
            );
            if best
                .as_ref()
                .map_or(true, |(_, score)| verification.feasibility_score > *score)
            {
                best = Some((path.clone(), verification.feasibility_score));
            }
        }

        match best {
            Some((path, feasibility)) if feasibility >= DETOUR_ACCEPT_FLOOR => {
                let reason = format!(
                    "detour accepted innovative path '{}' at feasibility {feasibility:.2}",
                    path.strategy_id
                );
                let selection = MabSelection {
                    chosen: path,
                    algorithm: AlgorithmUsed::IntelligentDetour,
                    round: self.mab.total_selections(),
                };
                (selection, innovative_paths, false, reason)
            }
            _ => {
                tracing::warn!("all innovative attempts failed; emitting conservative fallback");
                let selection = MabSelection {
                    chosen: conservative_fallback_path(),
                    algorithm: AlgorithmUsed::EmergencyFallback,
                    round: self.mab.total_selections(),
                };
                let reason =
                    "detour found no workable path; conservative fallback emitted".to_string();
                (selection, innovative_paths, true, reason)
            }
        }
    }

    /// New seed that explicitly avoids the observed failure patterns.
    async fn innovative_seed(
        &self,
        task: &str,
        original_seed: &str,
        analysis: &FailureAnalysis,
    ) -> ThinkingSeed {
        let excerpt: String = original_seed.chars().take(200).collect();
        let risks = if analysis.risk_patterns.is_empty() {
            "none recorded".to_string()
        } else {
            analysis.risk_patterns.join("; ")
        };
        let prompt = format!(
            "Every candidate strategy for this task failed verification. Rethink it.\n\n\
             Task: {task}\n\
             Original thinking seed: {excerpt}\n\
             Failed paths: {}\n\
             Average feasibility: {:.2}\n\
             Observed risks: {risks}\n\n\
             Produce a new thinking seed that avoids the failed patterns, reframes the \
             problem from a different angle, and lowers the identified risks. Respond with \
             the seed text only.",
            analysis.failed_paths, analysis.average_feasibility
        );

        let response = self
            .invoker
            .chat(ChatRequest::new(prompt).with_temperature(0.8))
            .await;
        if response.success && response.content.trim().len() > 50 {
            return ThinkingSeed::from_text(
                response.content.trim().to_string(),
                &PathTemplateLibrary::strategy_ids(),
            );
        }

        tracing::warn!("innovative seed generation failed; using heuristic reframing");
        heuristic_reframing(task)
    }
}

fn path_text(path: &ReasoningPath) -> String {
    format!("{}: {}", path.path_type, path.description)
}

fn ensure_template_derived(paths: &[ReasoningPath]) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::invariant("path generation produced no candidates"));
    }
    for path in paths {
        if PathTemplateLibrary::get(&path.strategy_id).is_none() {
            return Err(Error::invariant(format!(
                "path '{}' has no template-derived strategy id",
                path.instance_id
            )));
        }
    }
    Ok(())
}

/// Merge extra paths, keeping the first instance per strategy.
fn merge_paths(paths: &mut Vec<ReasoningPath>, extra: Vec<ReasoningPath>) {
    for path in extra {
        if !paths.iter().any(|p| p.strategy_id == path.strategy_id) {
            paths.push(path);
        }
    }
}

/// Stop once at least three results exist, the first three agree, and
/// the majority share clears the configured consistency threshold.
fn should_stop_early(verified: &[VerifiedPath], consistency_threshold: f64) -> bool {
    if verified.len() < 3 {
        return false;
    }
    let feasible: Vec<bool> = verified
        .iter()
        .map(|v| v.verification.is_feasible(PATH_FEASIBILITY_THRESHOLD))
        .collect();

    let first_three_agree = feasible[..3].iter().all(|f| *f == feasible[0]);
    let feasible_count = feasible.iter().filter(|f| **f).count();
    let majority = feasible_count.max(feasible.len() - feasible_count);
    let share = majority as f64 / feasible.len() as f64;

    first_three_agree && share >= consistency_threshold
}

fn analyse_failures(failed: &[VerifiedPath]) -> FailureAnalysis {
    let failed_paths = failed
        .iter()
        .filter(|v| !v.verification.is_feasible(PATH_FEASIBILITY_THRESHOLD))
        .count();
    let average_feasibility = if failed.is_empty() {
        0.0
    } else {
        failed
            .iter()
            .map(|v| v.verification.feasibility_score)
            .sum::<f64>()
            / failed.len() as f64
    };
    let risk_patterns = failed
        .iter()
        .filter(|v| !v.verification.analysis_summary.is_empty())
        .take(3)
        .map(|v| {
            v.verification
                .analysis_summary
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(120)
                .collect::<String>()
        })
        .collect();

    FailureAnalysis {
        failed_paths,
        average_feasibility,
        risk_patterns,
    }
}

/// Fixed reframings used when the LLM cannot produce an innovative seed.
fn heuristic_reframing(task: &str) -> ThinkingSeed {
    let reframings = [
        format!("Redefine the problem from first principles: {task}"),
        format!("Work backwards from the desired outcome: {task}"),
        format!("Borrow an approach from an unrelated domain: {task}"),
        format!("Strip the task to its minimal viable core: {task}"),
        format!("Split the task into independently shippable stages: {task}"),
    ];
    let text = reframings
        .choose(&mut rand::thread_rng())
        .expect("reframings are non-empty")
        .clone();
    let mut seed = ThinkingSeed::from_text(text, &PathTemplateLibrary::strategy_ids());
    seed.grounding.fallback_used = true;
    seed
}

/// Innovative templates instantiated directly when the generator yields
/// nothing during a detour.
fn emergency_paths() -> Vec<ReasoningPath> {
    ["creative_innovative", "practical_pragmatic", "adaptive_flexible"]
        .iter()
        .filter_map(|id| PathTemplateLibrary::get(id))
        .map(|template| template.instantiate(fresh_instance_id(template.strategy_id)))
        .collect()
}

/// The hard-coded conservative choice when even the detour fails.
fn conservative_fallback_path() -> ReasoningPath {
    let template = PathTemplateLibrary::get("practical_pragmatic")
        .expect("practical_pragmatic template exists");
    template.instantiate(fresh_instance_id(template.strategy_id))
}

fn fresh_instance_id(strategy_id: &str) -> String {
    format!(
        "{strategy_id}_{}_{:04}",
        Utc::now().timestamp_millis(),
        rand::random::<u16>() % 10_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    /// Routes prompts to canned responses by the distinctive phrasing of
    /// each pipeline stage.
    struct RoutingInvoker {
        path_score: f64,
        detour_score: f64,
    }

    #[async_trait]
    impl LlmInvoker for RoutingInvoker {
        async fn chat(&self, request: ChatRequest) -> LlmResponse {
            let prompt = &request.prompt;
            if prompt.contains("captures the task") {
                LlmResponse::ok("Solid seed. feasibility score: 0.8")
            } else if prompt.contains("likely to succeed") {
                LlmResponse::ok(format!("Assessed. feasibility score: {}", self.path_score))
            } else if prompt.contains("unconventional") {
                LlmResponse::ok(format!("Assessed. feasibility score: {}", self.detour_score))
            } else if prompt.contains("Summarise the following task") {
                LlmResponse::ok(
                    "A direct seed describing the task in enough detail to guide path choice.",
                )
            } else if prompt.contains("\"relevance\"") {
                // Unparseable analysis pushes the generator to heuristics.
                LlmResponse::ok("cannot produce structured output")
            } else if prompt.contains("Produce a new thinking seed") {
                LlmResponse::ok(
                    "Reframe the problem around incremental delivery, validating each stage \
                     against the smallest useful outcome before widening scope.",
                )
            } else {
                LlmResponse::ok("ok")
            }
        }
    }

    fn engine(path_score: f64, detour_score: f64) -> DecisionOrchestrator {
        let mut config = EngineConfig::default();
        config.features.rag_seed_generation = false;
        DecisionOrchestrator::new(
            Arc::new(RoutingInvoker {
                path_score,
                detour_score,
            }),
            None,
            None,
            config,
        )
    }

    #[tokio::test]
    async fn test_happy_path_decision() {
        let engine = engine(0.8, 0.5);
        let result = engine
            .decide("Design a rate-limited HTTP client", 0.5, None)
            .await
            .unwrap();

        assert!(!result.detour_triggered);
        assert!(!result.emergency_fallback);
        assert!(!result.verified_paths.is_empty());
        for verified in &result.verified_paths {
            assert_eq!(verified.verification.feasibility_score, 0.8);
        }
        // Chosen path must be one of the candidates, template-derived.
        assert!(result
            .available_paths
            .iter()
            .any(|p| p.instance_id == result.chosen_path.instance_id));
        assert!(PathTemplateLibrary::get(&result.chosen_path.strategy_id).is_some());
        // Instant learning: one arm update per verified path.
        let stats = engine.mab().arm_statistics();
        let total: u64 = stats.iter().map(|s| s.success_count + s.failure_count).sum();
        assert_eq!(total, result.verified_paths.len() as u64);
        assert_eq!(engine.decision_history().len(), 1);
    }

    #[tokio::test]
    async fn test_unanimous_failure_triggers_detour() {
        let engine = engine(0.1, 0.5);
        let result = engine.decide("An impossible request", 0.5, None).await.unwrap();

        assert!(result.detour_triggered);
        assert!(result.fallback_used);
        assert!(!result.emergency_fallback);
        assert_eq!(result.mab_decision.algorithm, AlgorithmUsed::IntelligentDetour);
        // The chosen innovative path cleared the acceptance floor.
        assert!(PathTemplateLibrary::get(&result.chosen_path.strategy_id).is_some());
        assert_eq!(engine.aha_stats().total_detours, 1);
    }

    #[tokio::test]
    async fn test_detour_collapse_emits_conservative_fallback() {
        let engine = engine(0.1, 0.1);
        let result = engine.decide("A doubly impossible request", 0.5, None).await.unwrap();

        assert!(result.detour_triggered);
        assert!(result.emergency_fallback);
        assert_eq!(result.mab_decision.algorithm, AlgorithmUsed::EmergencyFallback);
        assert_eq!(result.chosen_path.strategy_id, "practical_pragmatic");
    }

    #[tokio::test]
    async fn test_cancel_aborts_between_stages() {
        let engine = engine(0.8, 0.5);
        engine.cancel();
        let result = engine.decide("anything", 0.5, None).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));

        // The flag is consumed; the next decision runs normally.
        assert!(engine.decide("anything", 0.5, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_outcome_feeds_bandit_and_failure_counters() {
        let engine = engine(0.8, 0.5);
        let result = engine.decide("task", 0.5, None).await.unwrap();
        let strategy = result.chosen_path.strategy_id.clone();
        let before = engine
            .mab()
            .arm_statistics()
            .into_iter()
            .find(|s| s.strategy_id == strategy)
            .map(|s| s.success_count + s.failure_count)
            .unwrap_or(0);

        engine.update_outcome(&result, false, 10.0, 0.2, -0.3);

        let after = engine
            .mab()
            .arm_statistics()
            .into_iter()
            .find(|s| s.strategy_id == strategy)
            .map(|s| s.success_count + s.failure_count)
            .unwrap();
        assert_eq!(after, before + 1);

        engine.update_outcome(&result, false, 10.0, 0.2, -0.3);
        engine.update_outcome(&result, false, 10.0, 0.2, -0.3);
        // Three consecutive failures arm the aha trigger.
        assert!(engine.aha_trigger(&strategy).is_some());

        engine.update_outcome(&result, true, 5.0, 0.9, 0.5);
        let aha = engine.aha.lock().unwrap();
        assert_eq!(aha.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_decision_history_is_bounded() {
        let mut config = EngineConfig::default();
        config.features.rag_seed_generation = false;
        config.limits.max_decision_history = 3;
        let engine = DecisionOrchestrator::new(
            Arc::new(RoutingInvoker {
                path_score: 0.8,
                detour_score: 0.5,
            }),
            None,
            None,
            config,
        );

        for i in 0..5 {
            engine.decide(&format!("task {i}"), 0.5, None).await.unwrap();
        }
        let history = engine.decision_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().round, 5);
    }

    #[tokio::test]
    async fn test_adaptive_count_limits_verification() {
        let mut config = EngineConfig::default();
        config.features.rag_seed_generation = false;
        config.performance.enable_adaptive_path_count = true;
        let engine = DecisionOrchestrator::new(
            Arc::new(RoutingInvoker {
                path_score: 0.8,
                detour_score: 0.5,
            }),
            None,
            None,
            config,
        );

        // High prior confidence maps to two verifications.
        let result = engine.decide("simple task", 0.95, None).await.unwrap();
        assert!(result.verified_paths.len() <= 3);
        assert!(result.verified_paths.len() >= 2);
    }

    #[test]
    fn test_should_stop_early_agreement() {
        let verified: Vec<VerifiedPath> = [0.8, 0.9, 0.7]
            .iter()
            .map(|score| VerifiedPath {
                path: conservative_fallback_path(),
                verification: VerificationResult {
                    feasibility_score: *score,
                    reward: 0.0,
                    analysis_summary: String::new(),
                    tool_calls_made: 0,
                    fallback_used: false,
                },
            })
            .collect();
        assert!(should_stop_early(&verified, 0.8));

        let mixed: Vec<VerifiedPath> = [0.8, 0.1, 0.7]
            .iter()
            .map(|score| VerifiedPath {
                path: conservative_fallback_path(),
                verification: VerificationResult {
                    feasibility_score: *score,
                    reward: 0.0,
                    analysis_summary: String::new(),
                    tool_calls_made: 0,
                    fallback_used: false,
                },
            })
            .collect();
        assert!(!should_stop_early(&mixed, 0.8));
        assert!(!should_stop_early(&verified[..2].to_vec(), 0.8));
    }

    #[test]
    fn test_merge_paths_dedupes_by_strategy() {
        let mut paths = vec![conservative_fallback_path()];
        let extra = vec![conservative_fallback_path(), {
            let template = PathTemplateLibrary::get("creative_innovative").unwrap();
            template.instantiate("creative_innovative_1_0001".into())
        }];
        merge_paths(&mut paths, extra);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_emergency_paths_are_template_derived() {
        let paths = emergency_paths();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(PathTemplateLibrary::get(&path.strategy_id).is_some());
        }
    }
}
