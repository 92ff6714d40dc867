//! One bandit arm and its bounded performance history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Cap on `recent_rewards`.
pub const RECENT_REWARDS_CAP: usize = 20;
/// Cap on `recent_results`.
pub const RECENT_RESULTS_CAP: usize = 50;
/// Cap on `reward_history`.
pub const REWARD_HISTORY_CAP: usize = 50;

/// Width of the sliding window used by the stability score.
const STABILITY_WINDOW: usize = 5;
/// How many trailing results the stability score inspects.
const STABILITY_SPAN: usize = 20;

/// Performance record for one strategy (or tool).
///
/// Histories are bounded; the oldest entry is discarded on overflow.
/// Arms are created lazily the first time a key is addressed and are
/// never destroyed by normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionArm {
    pub strategy_id: String,
    /// Human label, filled in when the arm is first selected
    pub path_type: String,
    pub description: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_reward: f64,
    pub recent_rewards: VecDeque<f64>,
    pub recent_results: VecDeque<bool>,
    pub reward_history: VecDeque<f64>,
    pub activation_count: u64,
    pub last_used: DateTime<Utc>,
}

impl DecisionArm {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            path_type: String::new(),
            description: String::new(),
            success_count: 0,
            failure_count: 0,
            total_reward: 0.0,
            recent_rewards: VecDeque::new(),
            recent_results: VecDeque::new(),
            reward_history: VecDeque::new(),
            activation_count: 0,
            last_used: Utc::now(),
        }
    }

    /// Record one outcome. `reward` must already be clamped to `[-1, 1]`.
    pub fn record(&mut self, success: bool, reward: f64) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_reward += reward;

        push_bounded(&mut self.recent_rewards, reward, RECENT_REWARDS_CAP);
        push_bounded(&mut self.reward_history, reward, REWARD_HISTORY_CAP);
        push_bounded(&mut self.recent_results, success, RECENT_RESULTS_CAP);

        self.activation_count += 1;
        self.last_used = Utc::now();
    }

    /// Mark this arm as chosen by a selection round.
    pub fn mark_selected(&mut self) {
        self.activation_count += 1;
        self.last_used = Utc::now();
    }

    pub fn sample_count(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / (self.sample_count().max(1)) as f64
    }

    /// Mean over `recent_rewards`, zero when empty.
    pub fn mean_reward(&self) -> f64 {
        if self.recent_rewards.is_empty() {
            0.0
        } else {
            self.recent_rewards.iter().sum::<f64>() / self.recent_rewards.len() as f64
        }
    }

    /// Mean reward mapped from `[-1, 1]` to `[0, 1]` for score blending.
    pub fn normalized_reward(&self) -> f64 {
        ((self.mean_reward() + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Success rate over the trailing `n` results.
    pub fn recent_success_rate(&self, n: usize) -> f64 {
        let len = self.recent_results.len();
        if len == 0 {
            return 0.0;
        }
        let window = self.recent_results.iter().skip(len.saturating_sub(n));
        let total = len.min(n);
        let successes = window.filter(|s| **s).count();
        successes as f64 / total as f64
    }

    /// Stability of recent performance in `[0, 1]`.
    ///
    /// Over the trailing 20 results, success rates are computed for every
    /// sliding window of width 5; `stability = max(0, 1 − 4·variance)` of
    /// those rates. Fewer than 5 results cannot establish stability.
    pub fn stability_score(&self) -> f64 {
        let len = self.recent_results.len();
        if len < STABILITY_WINDOW {
            return 0.0;
        }
        let trailing: Vec<bool> = self
            .recent_results
            .iter()
            .skip(len.saturating_sub(STABILITY_SPAN))
            .copied()
            .collect();

        let rates: Vec<f64> = trailing
            .windows(STABILITY_WINDOW)
            .map(|window| {
                window.iter().filter(|s| **s).count() as f64 / STABILITY_WINDOW as f64
            })
            .collect();

        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let variance =
            rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64;

        (1.0 - 4.0 * variance).max(0.0)
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tracks_counts_and_reward() {
        let mut arm = DecisionArm::new("systematic_analytical");
        arm.record(true, 0.7);
        assert_eq!(arm.success_count, 1);
        assert_eq!(arm.failure_count, 0);
        assert_eq!(arm.total_reward, 0.7);
        assert_eq!(arm.recent_rewards, vec![0.7]);
        assert_eq!(arm.activation_count, 1);
    }

    #[test]
    fn test_success_rate_guards_empty() {
        let arm = DecisionArm::new("x");
        assert_eq!(arm.success_rate(), 0.0);
    }

    #[test]
    fn test_histories_are_bounded_and_drop_oldest() {
        let mut arm = DecisionArm::new("x");
        for i in 0..200 {
            arm.record(i % 2 == 0, (i % 3) as f64 / 3.0);
        }
        assert_eq!(arm.recent_rewards.len(), RECENT_REWARDS_CAP);
        assert_eq!(arm.reward_history.len(), REWARD_HISTORY_CAP);
        assert_eq!(arm.recent_results.len(), RECENT_RESULTS_CAP);
        // Entry 199 is the newest; entry 180 the oldest surviving reward.
        assert_eq!(*arm.recent_rewards.back().unwrap(), (199 % 3) as f64 / 3.0);
        assert_eq!(*arm.recent_rewards.front().unwrap(), (180 % 3) as f64 / 3.0);
    }

    #[test]
    fn test_normalized_reward_range() {
        let mut arm = DecisionArm::new("x");
        arm.record(false, -1.0);
        assert_eq!(arm.normalized_reward(), 0.0);
        let mut arm = DecisionArm::new("y");
        arm.record(true, 1.0);
        assert_eq!(arm.normalized_reward(), 1.0);
    }

    #[test]
    fn test_recent_success_rate_windows() {
        let mut arm = DecisionArm::new("x");
        for _ in 0..10 {
            arm.record(false, -0.5);
        }
        for _ in 0..10 {
            arm.record(true, 0.9);
        }
        assert_eq!(arm.recent_success_rate(10), 1.0);
        assert_eq!(arm.recent_success_rate(20), 0.5);
    }

    #[test]
    fn test_stability_high_for_consistent_results() {
        let mut arm = DecisionArm::new("x");
        for _ in 0..20 {
            arm.record(true, 0.9);
        }
        assert_eq!(arm.stability_score(), 1.0);
    }

    #[test]
    fn test_stability_low_for_alternating_results() {
        let mut arm = DecisionArm::new("x");
        for i in 0..20 {
            arm.record(i % 2 == 0, 0.0);
        }
        let stability = arm.stability_score();
        assert!(stability < 1.0, "alternating results are not fully stable");
    }

    #[test]
    fn test_stability_needs_minimum_samples() {
        let mut arm = DecisionArm::new("x");
        for _ in 0..4 {
            arm.record(true, 0.5);
        }
        assert_eq!(arm.stability_score(), 0.0);
    }
}
