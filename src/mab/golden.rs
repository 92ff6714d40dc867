//! Golden templates: promoted snapshots of high-performing arms.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::paths::ReasoningPath;

use super::arm::DecisionArm;

/// A snapshot of an arm that demonstrated sustained success.
///
/// Keyed by `strategy_id`; used to short-circuit bandit selection when a
/// candidate matches a proven strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenTemplate {
    pub strategy_id: String,
    pub path_type: String,
    pub description: String,
    /// Success rate at promotion time
    pub success_rate: f64,
    pub stability_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub usage_count_as_template: u64,
}

impl GoldenTemplate {
    /// Snapshot an arm at promotion time.
    pub fn from_arm(arm: &DecisionArm) -> Self {
        let now = Utc::now();
        Self {
            strategy_id: arm.strategy_id.clone(),
            path_type: arm.path_type.clone(),
            description: arm.description.clone(),
            success_rate: arm.success_rate(),
            stability_score: arm.stability_score(),
            created_at: now,
            last_updated: now,
            usage_count_as_template: 0,
        }
    }

    /// Composite quality used for eviction ordering.
    ///
    /// `0.4·success_rate + 0.3·min(1, usage/10) + 0.2·stability + 0.1·recency`,
    /// where recency decays linearly from 1.0 at 24 h old to 0.0 at 7 days.
    pub fn quality_score(&self, now: DateTime<Utc>) -> f64 {
        let usage = (self.usage_count_as_template as f64 / 10.0).min(1.0);
        0.4 * self.success_rate
            + 0.3 * usage
            + 0.2 * self.stability_score
            + 0.1 * self.recency(now)
    }

    fn recency(&self, now: DateTime<Utc>) -> f64 {
        let age = now - self.last_updated;
        let day = Duration::hours(24);
        let week = Duration::days(7);
        if age <= day {
            1.0
        } else if age >= week {
            0.0
        } else {
            let span = (week - day).num_seconds() as f64;
            (week - age).num_seconds() as f64 / span
        }
    }

    /// Match quality against a candidate path.
    ///
    /// Strategy-id match scores 0.6, path-type match 0.4, plus
    /// `0.2·Jaccard(description words)` and any success-rate excess over
    /// 0.8. Returns `None` when neither key matches.
    pub fn match_score(&self, candidate: &ReasoningPath) -> Option<f64> {
        let base = if self.strategy_id == candidate.strategy_id {
            0.6
        } else if self.path_type == candidate.path_type {
            0.4
        } else {
            return None;
        };

        let similarity = jaccard(&self.description, &candidate.description);
        Some(base + 0.2 * similarity + (self.success_rate - 0.8).max(0.0))
    }
}

fn jaccard(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count() as f64;
    let union = words_a.union(&words_b).count() as f64;
    intersection / union
}

/// Bounded cache of golden templates with quality-based eviction.
#[derive(Debug, Clone)]
pub struct GoldenTemplateCache {
    templates: HashMap<String, GoldenTemplate>,
    capacity: usize,
}

impl GoldenTemplateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            templates: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, strategy_id: &str) -> Option<&GoldenTemplate> {
        self.templates.get(strategy_id)
    }

    pub fn templates(&self) -> Vec<GoldenTemplate> {
        self.templates.values().cloned().collect()
    }

    /// Insert or refresh a promotion snapshot.
    ///
    /// Re-promotion of an existing key refreshes the snapshot but keeps
    /// the accumulated usage count. When a new key would exceed capacity,
    /// the template with the lowest composite quality is evicted first.
    pub fn promote(&mut self, template: GoldenTemplate) {
        if let Some(existing) = self.templates.get_mut(&template.strategy_id) {
            let usage = existing.usage_count_as_template;
            *existing = template;
            existing.usage_count_as_template = usage;
            existing.last_updated = Utc::now();
            return;
        }

        if self.templates.len() >= self.capacity {
            let now = Utc::now();
            if let Some(worst) = self
                .templates
                .values()
                .min_by(|a, b| {
                    a.quality_score(now)
                        .partial_cmp(&b.quality_score(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|t| t.strategy_id.clone())
            {
                tracing::info!(evicted = %worst, "golden cache full, evicting lowest quality");
                self.templates.remove(&worst);
            }
        }

        self.templates.insert(template.strategy_id.clone(), template);
    }

    /// Best `(candidate index, score)` pair across the cache, if any
    /// template matches any candidate.
    pub fn best_match(&self, candidates: &[ReasoningPath]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for template in self.templates.values() {
            for (index, candidate) in candidates.iter().enumerate() {
                if let Some(score) = template.match_score(candidate) {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((index, score));
                    }
                }
            }
        }
        best
    }

    /// Count one golden-shortcut use of the template for this strategy.
    pub fn record_usage(&mut self, strategy_id: &str) {
        if let Some(template) = self.templates.get_mut(strategy_id) {
            template.usage_count_as_template += 1;
            template.last_updated = Utc::now();
        }
    }
}
