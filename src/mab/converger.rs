//! Arm selection, reward updates, and the trial-ground lifecycle.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::config::MabConfig;
use crate::error::{Error, Result};
use crate::paths::ReasoningPath;

use super::arm::DecisionArm;
use super::golden::{GoldenTemplate, GoldenTemplateCache};

const SELECTION_HISTORY_CAP: usize = 50;
const FEEDBACK_LOG_CAP: usize = 50;
/// Below this many total selections the population is too young for
/// convergence inspection and Thompson sampling is used outright.
const AUTO_WARMUP_SELECTIONS: u64 = 15;
/// Golden-shortcut acceptance threshold.
const GOLDEN_MATCH_THRESHOLD: f64 = 0.85;
/// Stability required for promotion.
const PROMOTION_STABILITY_FLOOR: f64 = 0.5;
/// Arms at or past this activation count with a success rate below
/// `CULL_SUCCESS_RATE` become culling candidates.
const CULL_MIN_ACTIVATIONS: u64 = 10;
const CULL_SUCCESS_RATE: f64 = 0.15;

/// Requested selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAlgorithm {
    /// Pick by population convergence level
    Auto,
    Thompson,
    Ucb1,
    EpsilonGreedy,
}

/// Algorithm actually used for a selection, for attribution and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmUsed {
    Thompson,
    Ucb1,
    EpsilonGreedy,
    GoldenTemplateMatch,
    SingleCandidate,
    /// Unanimous verification failure routed through the detour
    IntelligentDetour,
    /// Detour found nothing workable; conservative fallback emitted
    EmergencyFallback,
}

impl AlgorithmUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thompson => "thompson",
            Self::Ucb1 => "ucb1",
            Self::EpsilonGreedy => "epsilon_greedy",
            Self::GoldenTemplateMatch => "golden_template_match",
            Self::SingleCandidate => "single_candidate",
            Self::IntelligentDetour => "intelligent_detour",
            Self::EmergencyFallback => "emergency_fallback",
        }
    }
}

/// A generic arm candidate: reasoning paths and tools both reduce to this.
#[derive(Debug, Clone)]
pub struct ArmCandidate {
    pub id: String,
    pub label: String,
    pub description: String,
}

impl From<&ReasoningPath> for ArmCandidate {
    fn from(path: &ReasoningPath) -> Self {
        Self {
            id: path.strategy_id.clone(),
            label: path.path_type.clone(),
            description: path.description.clone(),
        }
    }
}

/// One entry of the bounded selection history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub strategy_id: String,
    pub path_type: String,
    pub algorithm: AlgorithmUsed,
    pub round: u64,
}

/// Outcome of `select_best` over reasoning paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MabSelection {
    pub chosen: ReasoningPath,
    pub algorithm: AlgorithmUsed,
    pub round: u64,
}

/// Read-only statistics for one arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmStatistics {
    pub strategy_id: String,
    pub path_type: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub total_reward: f64,
    pub mean_reward: f64,
    pub activation_count: u64,
    pub confidence: f64,
}

/// Per-algorithm attribution tallies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AlgorithmStats {
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct ConvergerState {
    arms: HashMap<String, DecisionArm>,
    golden: GoldenTemplateCache,
    total_selections: u64,
    selection_history: VecDeque<SelectionRecord>,
    /// Algorithm behind the most recent selection of each arm
    last_algorithm: HashMap<String, AlgorithmUsed>,
    algorithm_stats: HashMap<AlgorithmUsed, AlgorithmStats>,
    feedback_log: VecDeque<String>,
}

/// The bandit: owns the arm map and golden-template cache.
///
/// All mutating operations serialise on one internal mutex; none of them
/// perform I/O, so the lock is never held across a suspension point.
pub struct MabConverger {
    state: Mutex<ConvergerState>,
    config: MabConfig,
    golden_enabled: bool,
}

impl MabConverger {
    pub fn new(config: MabConfig) -> Self {
        let capacity = config.max_golden_templates;
        Self {
            state: Mutex::new(ConvergerState {
                arms: HashMap::new(),
                golden: GoldenTemplateCache::new(capacity),
                total_selections: 0,
                selection_history: VecDeque::new(),
                last_algorithm: HashMap::new(),
                algorithm_stats: HashMap::new(),
                feedback_log: VecDeque::new(),
            }),
            config,
            golden_enabled: true,
        }
    }

    /// Disable the golden-template shortcut and promotion (used by the
    /// tool-selection instance).
    pub fn without_golden_templates(mut self) -> Self {
        self.golden_enabled = false;
        self
    }

    /// Select the best reasoning path among the candidates.
    pub fn select_best(
        &self,
        candidates: &[ReasoningPath],
        algorithm: SelectionAlgorithm,
    ) -> Result<MabSelection> {
        if candidates.is_empty() {
            return Err(Error::invariant("select_best called with no candidates"));
        }

        // Golden shortcut: a proven strategy matching a candidate skips
        // bandit selection entirely.
        if self.golden_enabled && candidates.len() > 1 {
            let mut state = self.state.lock().expect("mab lock");
            if let Some((index, score)) = state.golden.best_match(candidates) {
                if score >= GOLDEN_MATCH_THRESHOLD {
                    let chosen = candidates[index].clone();
                    tracing::info!(
                        strategy = %chosen.strategy_id,
                        score,
                        "golden template shortcut"
                    );
                    state.golden.record_usage(&chosen.strategy_id);
                    let round = state.mark_selection(
                        &ArmCandidate::from(&chosen),
                        AlgorithmUsed::GoldenTemplateMatch,
                    );
                    return Ok(MabSelection {
                        chosen,
                        algorithm: AlgorithmUsed::GoldenTemplateMatch,
                        round,
                    });
                }
            }
        }

        let arm_candidates: Vec<ArmCandidate> = candidates.iter().map(ArmCandidate::from).collect();
        let (chosen_id, used, round) = self.select_id(&arm_candidates, algorithm)?;

        let chosen = candidates
            .iter()
            .find(|path| path.strategy_id == chosen_id)
            .cloned()
            .ok_or_else(|| Error::invariant("selected strategy missing from candidates"))?;

        Ok(MabSelection {
            chosen,
            algorithm: used,
            round,
        })
    }

    /// Select among generic arm candidates (used by the tool bandit).
    /// Returns the chosen id, the algorithm used, and the round number.
    pub fn select_id(
        &self,
        candidates: &[ArmCandidate],
        algorithm: SelectionAlgorithm,
    ) -> Result<(String, AlgorithmUsed, u64)> {
        if candidates.is_empty() {
            return Err(Error::invariant("selection requires at least one candidate"));
        }

        let mut state = self.state.lock().expect("mab lock");

        if candidates.len() == 1 {
            let round = state.mark_selection(&candidates[0], AlgorithmUsed::SingleCandidate);
            return Ok((candidates[0].id.clone(), AlgorithmUsed::SingleCandidate, round));
        }

        for candidate in candidates {
            state.ensure_arm(candidate);
        }

        let resolved = match algorithm {
            SelectionAlgorithm::Auto => state.auto_algorithm(&self.config),
            SelectionAlgorithm::Thompson => AlgorithmUsed::Thompson,
            SelectionAlgorithm::Ucb1 => AlgorithmUsed::Ucb1,
            SelectionAlgorithm::EpsilonGreedy => AlgorithmUsed::EpsilonGreedy,
        };

        let mut rng = rand::thread_rng();
        let chosen_id = match resolved {
            AlgorithmUsed::Thompson => state.thompson(candidates, &mut rng),
            AlgorithmUsed::Ucb1 => state.ucb1(candidates),
            AlgorithmUsed::EpsilonGreedy => {
                state.epsilon_greedy(candidates, &self.config, &mut rng)
            }
            _ => unreachable!("resolved algorithm is always a bandit variant"),
        };

        let candidate = candidates
            .iter()
            .find(|c| c.id == chosen_id)
            .expect("chosen id originates from candidates");
        let round = state.mark_selection(candidate, resolved);

        tracing::debug!(
            strategy = %chosen_id,
            algorithm = resolved.as_str(),
            round,
            "bandit selection"
        );
        Ok((chosen_id, resolved, round))
    }

    /// Apply one reward observation to an arm, creating it if needed.
    ///
    /// Rewards outside `[-1, 1]` are clamped and the event is recorded in
    /// the feedback log.
    pub fn update(&self, strategy_id: &str, success: bool, reward: f64) {
        let clamped = reward.clamp(-1.0, 1.0);
        let mut state = self.state.lock().expect("mab lock");

        if clamped != reward {
            tracing::warn!(strategy = strategy_id, reward, "reward out of range; clamped");
            let entry = format!(
                "reward {reward} for '{strategy_id}' clamped to {clamped}"
            );
            push_bounded(&mut state.feedback_log, entry, FEEDBACK_LOG_CAP);
        }

        let arm = state
            .arms
            .entry(strategy_id.to_string())
            .or_insert_with(|| DecisionArm::new(strategy_id));
        arm.record(success, clamped);

        if let Some(algorithm) = state.last_algorithm.get(strategy_id).copied() {
            let stats = state.algorithm_stats.entry(algorithm).or_default();
            if success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
        }

        if self.golden_enabled {
            state.check_promotion(strategy_id, &self.config);
        }
    }

    /// Confidence in a strategy, in `[0, 1]`.
    ///
    /// `0.3·base + 0.4·success_rate + 0.2·stability + 0.1·recent rate`,
    /// with the base stepping up by sample count.
    pub fn confidence(&self, strategy_id: &str) -> f64 {
        let state = self.state.lock().expect("mab lock");
        state
            .arms
            .get(strategy_id)
            .map(confidence_of)
            .unwrap_or(0.0)
    }

    /// True when no arm reaches the confidence threshold (or none exist).
    pub fn all_low_confidence(&self, threshold: f64) -> bool {
        let state = self.state.lock().expect("mab lock");
        state
            .arms
            .values()
            .map(confidence_of)
            .fold(f64::NEG_INFINITY, f64::max)
            < threshold
    }

    /// Pre-seed a golden template (test and bootstrap hook).
    pub fn seed_golden_template(&self, template: GoldenTemplate) {
        let mut state = self.state.lock().expect("mab lock");
        state.golden.promote(template);
    }

    /// Arms that persistently fail and qualify for a reset.
    pub fn culling_candidates(&self) -> Vec<String> {
        let state = self.state.lock().expect("mab lock");
        state
            .arms
            .values()
            .filter(|arm| {
                arm.activation_count >= CULL_MIN_ACTIVATIONS
                    && arm.success_rate() < CULL_SUCCESS_RATE
            })
            .map(|arm| arm.strategy_id.clone())
            .collect()
    }

    /// Scheduled maintenance: reset persistently failing arms so they do
    /// not poison future selection. Returns the reset count.
    pub fn run_maintenance(&self) -> usize {
        let candidates = self.culling_candidates();
        let mut state = self.state.lock().expect("mab lock");
        for strategy_id in &candidates {
            if let Some(arm) = state.arms.get_mut(strategy_id) {
                tracing::info!(strategy = %strategy_id, "culling persistently failing arm");
                let mut fresh = DecisionArm::new(strategy_id.clone());
                fresh.path_type = arm.path_type.clone();
                fresh.description = arm.description.clone();
                *arm = fresh;
            }
        }
        candidates.len()
    }

    // Read-only observability.

    pub fn arm_statistics(&self) -> Vec<ArmStatistics> {
        let state = self.state.lock().expect("mab lock");
        let mut stats: Vec<ArmStatistics> = state
            .arms
            .values()
            .map(|arm| ArmStatistics {
                strategy_id: arm.strategy_id.clone(),
                path_type: arm.path_type.clone(),
                success_count: arm.success_count,
                failure_count: arm.failure_count,
                success_rate: arm.success_rate(),
                total_reward: arm.total_reward,
                mean_reward: arm.mean_reward(),
                activation_count: arm.activation_count,
                confidence: confidence_of(arm),
            })
            .collect();
        stats.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        stats
    }

    pub fn golden_templates(&self) -> Vec<GoldenTemplate> {
        self.state.lock().expect("mab lock").golden.templates()
    }

    pub fn golden_template(&self, strategy_id: &str) -> Option<GoldenTemplate> {
        self.state
            .lock()
            .expect("mab lock")
            .golden
            .get(strategy_id)
            .cloned()
    }

    pub fn selection_history(&self) -> Vec<SelectionRecord> {
        self.state
            .lock()
            .expect("mab lock")
            .selection_history
            .iter()
            .cloned()
            .collect()
    }

    pub fn feedback_log(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mab lock")
            .feedback_log
            .iter()
            .cloned()
            .collect()
    }

    pub fn algorithm_stats(&self) -> HashMap<AlgorithmUsed, AlgorithmStats> {
        self.state.lock().expect("mab lock").algorithm_stats.clone()
    }

    pub fn total_selections(&self) -> u64 {
        self.state.lock().expect("mab lock").total_selections
    }

    /// Whether the arm population has converged: the variance of success
    /// rates across sampled arms sits below the configured threshold.
    pub fn is_converged(&self) -> bool {
        let state = self.state.lock().expect("mab lock");
        let rates: Vec<f64> = state
            .arms
            .values()
            .filter(|arm| arm.sample_count() >= self.config.min_samples)
            .map(|arm| arm.success_rate())
            .collect();
        if rates.len() < 2 {
            return false;
        }
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64;
        variance < self.config.convergence_threshold
    }

    pub fn arm_count(&self) -> usize {
        self.state.lock().expect("mab lock").arms.len()
    }

    /// Usage count of a strategy (selections plus updates).
    pub fn arm_activations(&self, strategy_id: &str) -> u64 {
        self.state
            .lock()
            .expect("mab lock")
            .arms
            .get(strategy_id)
            .map(|arm| arm.activation_count)
            .unwrap_or(0)
    }
}

impl ConvergerState {
    fn ensure_arm(&mut self, candidate: &ArmCandidate) {
        let arm = self
            .arms
            .entry(candidate.id.clone())
            .or_insert_with(|| DecisionArm::new(candidate.id.clone()));
        if arm.path_type.is_empty() {
            arm.path_type = candidate.label.clone();
            arm.description = candidate.description.clone();
        }
    }

    fn mark_selection(&mut self, candidate: &ArmCandidate, algorithm: AlgorithmUsed) -> u64 {
        self.ensure_arm(candidate);
        if let Some(arm) = self.arms.get_mut(&candidate.id) {
            arm.mark_selected();
        }
        self.total_selections += 1;
        self.last_algorithm.insert(candidate.id.clone(), algorithm);
        let record = SelectionRecord {
            strategy_id: candidate.id.clone(),
            path_type: candidate.label.clone(),
            algorithm,
            round: self.total_selections,
        };
        push_bounded(&mut self.selection_history, record, SELECTION_HISTORY_CAP);
        self.total_selections
    }

    /// Algorithm choice for `auto`: Thompson while young, then by the
    /// variance of per-arm success rates. High variance means the
    /// population has not converged and sampling should keep exploring;
    /// low variance lets epsilon-greedy exploit with a guaranteed
    /// exploration floor. Path selection deliberately keeps more
    /// exploration than pure exploitation would.
    fn auto_algorithm(&self, config: &MabConfig) -> AlgorithmUsed {
        if self.total_selections < AUTO_WARMUP_SELECTIONS {
            return AlgorithmUsed::Thompson;
        }

        let rates: Vec<f64> = self
            .arms
            .values()
            .filter(|arm| arm.sample_count() >= config.min_samples / 2)
            .map(|arm| arm.success_rate())
            .collect();
        if rates.len() < 2 {
            return AlgorithmUsed::Thompson;
        }

        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64;
        let convergence_level = (1.0 - 3.5 * variance).max(0.0);

        if convergence_level < 0.4 {
            AlgorithmUsed::Thompson
        } else if convergence_level < 0.7 {
            AlgorithmUsed::Ucb1
        } else {
            AlgorithmUsed::EpsilonGreedy
        }
    }

    /// Thompson sampling blended with recent reward, penalised by usage
    /// share so no single strategy monopolises selection.
    fn thompson<R: Rng>(&self, candidates: &[ArmCandidate], rng: &mut R) -> String {
        let total_activations: u64 = candidates
            .iter()
            .filter_map(|c| self.arms.get(&c.id))
            .map(|arm| arm.activation_count)
            .sum();

        candidates
            .iter()
            .map(|candidate| {
                let arm = &self.arms[&candidate.id];
                let alpha = arm.success_count as f64 + 1.0;
                let beta = arm.failure_count as f64 + 1.0;
                let sample = Beta::new(alpha, beta)
                    .map(|dist| dist.sample(rng))
                    .unwrap_or(0.5);

                let blended = 0.8 * sample + 0.2 * arm.normalized_reward();
                let share = if total_activations == 0 {
                    0.0
                } else {
                    arm.activation_count as f64 / total_activations as f64
                };
                (candidate.id.clone(), blended - 0.1 * share)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
            .expect("candidates are non-empty")
    }

    /// UCB1 with a 1.2 exploration boost; untried arms go first.
    fn ucb1(&self, candidates: &[ArmCandidate]) -> String {
        if let Some(untried) = candidates
            .iter()
            .find(|c| self.arms[&c.id].activation_count == 0)
        {
            return untried.id.clone();
        }

        let total: u64 = candidates
            .iter()
            .map(|c| self.arms[&c.id].activation_count)
            .sum();
        let ln_total = (total.max(1) as f64).ln();

        candidates
            .iter()
            .map(|candidate| {
                let arm = &self.arms[&candidate.id];
                let exploitation = 0.7 * arm.success_rate() + 0.3 * arm.normalized_reward();
                let exploration =
                    1.2 * (2.0 * ln_total / arm.activation_count as f64).sqrt();
                (candidate.id.clone(), exploitation + exploration)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
            .expect("candidates are non-empty")
    }

    /// Epsilon-greedy with a decaying epsilon and a mild penalty on arms
    /// that dominate the selection history.
    fn epsilon_greedy<R: Rng>(
        &self,
        candidates: &[ArmCandidate],
        config: &MabConfig,
        rng: &mut R,
    ) -> String {
        let epsilon = (0.4 / (1.0 + 0.008 * self.total_selections as f64))
            .max(config.exploration_epsilon_min);

        if rng.gen::<f64>() < epsilon {
            let index = rng.gen_range(0..candidates.len());
            return candidates[index].id.clone();
        }

        candidates
            .iter()
            .map(|candidate| {
                let arm = &self.arms[&candidate.id];
                let mut score = 0.7 * arm.success_rate() + 0.3 * arm.normalized_reward();
                if self.total_selections > 0
                    && arm.activation_count as f64 > 0.5 * self.total_selections as f64
                {
                    score -= 0.05;
                }
                (candidate.id.clone(), score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
            .expect("candidates are non-empty")
    }

    /// Promote the arm when every gate passes: overall and recent success
    /// rates, activation floor, and stability.
    fn check_promotion(&mut self, strategy_id: &str, config: &MabConfig) {
        let Some(arm) = self.arms.get(strategy_id) else {
            return;
        };

        let success_rate = arm.success_rate();
        if success_rate < config.golden_success_rate_threshold {
            return;
        }
        if arm.activation_count < config.golden_min_samples {
            return;
        }
        let stability = arm.stability_score();
        if stability < PROMOTION_STABILITY_FLOOR {
            return;
        }
        if arm.recent_success_rate(20) < 0.95 * success_rate {
            return;
        }

        tracing::info!(
            strategy = %strategy_id,
            success_rate,
            stability,
            "promoting arm to golden template"
        );
        self.golden.promote(GoldenTemplate::from_arm(arm));
    }
}

fn confidence_of(arm: &DecisionArm) -> f64 {
    let base = match arm.sample_count() {
        0..=4 => 0.2,
        5..=9 => 0.4,
        10..=19 => 0.6,
        _ => 0.8,
    };
    (0.3 * base
        + 0.4 * arm.success_rate()
        + 0.2 * arm.stability_score()
        + 0.1 * arm.recent_success_rate(10))
    .clamp(0.0, 1.0)
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}
