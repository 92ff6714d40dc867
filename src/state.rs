//! Session-scoped state ledger.
//!
//! An append-only record of a session: turns with their tool calls and
//! bandit decisions, goals with progress, and intermediate results.
//! Within a session, entries appear in exactly the order the calls were
//! made. Nothing is persisted across sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::tools::ToolResult;

/// One executed tool call inside a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: serde_json::Value,
    pub success: Option<bool>,
    pub output: Option<String>,
    pub execution_time: Option<f64>,
}

/// One bandit decision made during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MabDecisionRecord {
    pub strategy_id: String,
    pub algorithm: String,
    pub round: u64,
}

/// One conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: u64,
    pub user_input: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<String>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub mab_decisions: Vec<MabDecisionRecord>,
}

/// Goal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    PartiallyAchieved,
    Achieved,
    Failed,
}

/// A tracked goal with progress in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: u64,
    pub query: String,
    pub goal_type: String,
    pub priority: f64,
    pub progress: f64,
    pub status: GoalStatus,
}

/// An intermediate artifact worth remembering within the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateResult {
    pub source: String,
    pub content: String,
    pub relevance: f64,
    pub quality: f64,
    pub used_in_final_answer: bool,
}

/// Plain-data snapshot handed to tool-selection prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session_id: String,
    pub turn_count: usize,
    pub tool_call_count: usize,
    pub last_user_input: Option<String>,
    pub open_goals: Vec<String>,
}

#[derive(Debug, Default)]
struct SessionLedger {
    turns: Vec<Turn>,
    goals: Vec<Goal>,
    intermediate_results: Vec<IntermediateResult>,
    next_turn_id: u64,
    next_goal_id: u64,
}

/// Per-session record of goals, turns, and results.
pub struct StateManager {
    session_id: Uuid,
    ledger: Mutex<SessionLedger>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            ledger: Mutex::new(SessionLedger::default()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Open a new turn and return its id.
    pub fn start_turn(&self, user_input: impl Into<String>) -> u64 {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        let id = ledger.next_turn_id;
        ledger.next_turn_id += 1;
        ledger.turns.push(Turn {
            id,
            user_input: user_input.into(),
            started_at: Utc::now(),
            completed_at: None,
            response: None,
            success: None,
            error: None,
            tool_calls: Vec::new(),
            mab_decisions: Vec::new(),
        });
        id
    }

    /// Close a turn with its outcome. Unknown ids are ignored.
    pub fn complete_turn(
        &self,
        turn_id: u64,
        response: impl Into<String>,
        success: bool,
        error: Option<String>,
    ) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        if let Some(turn) = ledger.turns.iter_mut().find(|t| t.id == turn_id) {
            turn.completed_at = Some(Utc::now());
            turn.response = Some(response.into());
            turn.success = Some(success);
            turn.error = error;
        }
    }

    /// Append a tool call (and its result, when already known) to a turn.
    pub fn add_tool_call(
        &self,
        turn_id: u64,
        tool: impl Into<String>,
        args: serde_json::Value,
        result: Option<&ToolResult>,
    ) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        if let Some(turn) = ledger.turns.iter_mut().find(|t| t.id == turn_id) {
            turn.tool_calls.push(ToolCallRecord {
                tool: tool.into(),
                args,
                success: result.map(|r| r.success),
                output: result.map(|r| r.data_as_text()),
                execution_time: result.map(|r| r.execution_time),
            });
        }
    }

    /// Append a bandit decision to a turn.
    pub fn add_mab_decision(&self, turn_id: u64, decision: MabDecisionRecord) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        if let Some(turn) = ledger.turns.iter_mut().find(|t| t.id == turn_id) {
            turn.mab_decisions.push(decision);
        }
    }

    /// Register a goal; returns its id.
    pub fn add_goal(
        &self,
        query: impl Into<String>,
        goal_type: impl Into<String>,
        priority: f64,
    ) -> u64 {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        let id = ledger.next_goal_id;
        ledger.next_goal_id += 1;
        ledger.goals.push(Goal {
            id,
            query: query.into(),
            goal_type: goal_type.into(),
            priority: priority.clamp(0.0, 1.0),
            progress: 0.0,
            status: GoalStatus::Pending,
        });
        id
    }

    /// Update goal progress (clamped) and optionally its status.
    pub fn update_goal_progress(&self, goal_id: u64, progress: f64, status: Option<GoalStatus>) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        if let Some(goal) = ledger.goals.iter_mut().find(|g| g.id == goal_id) {
            goal.progress = progress.clamp(0.0, 1.0);
            if let Some(status) = status {
                goal.status = status;
            } else if goal.progress >= 1.0 {
                goal.status = GoalStatus::Achieved;
            } else if goal.progress > 0.0 {
                goal.status = GoalStatus::InProgress;
            }
        }
    }

    /// Remember an intermediate artifact.
    pub fn add_intermediate_result(
        &self,
        source: impl Into<String>,
        content: impl Into<String>,
        relevance: f64,
        quality: f64,
    ) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        ledger.intermediate_results.push(IntermediateResult {
            source: source.into(),
            content: content.into(),
            relevance: relevance.clamp(0.0, 1.0),
            quality: quality.clamp(0.0, 1.0),
            used_in_final_answer: false,
        });
    }

    /// Flag the n-th intermediate result as used in the final answer.
    pub fn mark_result_used(&self, index: usize) {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        if let Some(result) = ledger.intermediate_results.get_mut(index) {
            result.used_in_final_answer = true;
        }
    }

    /// Total tool calls across the session.
    pub fn tool_call_count(&self) -> usize {
        let ledger = self.ledger.lock().expect("ledger lock");
        ledger.turns.iter().map(|t| t.tool_calls.len()).sum()
    }

    /// Plain-data snapshot for tool-selection prompts.
    pub fn snapshot(&self) -> StateSnapshot {
        let ledger = self.ledger.lock().expect("ledger lock");
        StateSnapshot {
            session_id: self.session_id.to_string(),
            turn_count: ledger.turns.len(),
            tool_call_count: ledger.turns.iter().map(|t| t.tool_calls.len()).sum(),
            last_user_input: ledger.turns.last().map(|t| t.user_input.clone()),
            open_goals: ledger
                .goals
                .iter()
                .filter(|g| !matches!(g.status, GoalStatus::Achieved | GoalStatus::Failed))
                .map(|g| g.query.clone())
                .collect(),
        }
    }

    /// Normalised session features for reinforcement signals.
    /// Every value is clamped to `[0, 1]`.
    pub fn features_for_rl(&self) -> HashMap<String, f64> {
        let ledger = self.ledger.lock().expect("ledger lock");

        let goal_progress = mean(ledger.goals.iter().map(|g| g.progress));

        let turn_count = ledger.turns.len();
        let tool_calls: usize = ledger.turns.iter().map(|t| t.tool_calls.len()).sum();
        let tool_usage_rate = tool_calls as f64 / turn_count.max(1) as f64;

        let completed: Vec<&Turn> = ledger
            .turns
            .iter()
            .filter(|t| t.success.is_some())
            .collect();
        let execution_success_rate = if completed.is_empty() {
            0.0
        } else {
            completed.iter().filter(|t| t.success == Some(true)).count() as f64
                / completed.len() as f64
        };

        let result_quality = mean(ledger.intermediate_results.iter().map(|r| r.quality));
        let mean_relevance = mean(ledger.intermediate_results.iter().map(|r| r.relevance));

        let unique_tools: HashSet<&str> = ledger
            .turns
            .iter()
            .flat_map(|t| t.tool_calls.iter().map(|c| c.tool.as_str()))
            .collect();
        let tool_diversity = if tool_calls == 0 {
            0.0
        } else {
            unique_tools.len() as f64 / tool_calls as f64
        };

        let decisions: Vec<&str> = ledger
            .turns
            .iter()
            .flat_map(|t| t.mab_decisions.iter().map(|d| d.strategy_id.as_str()))
            .collect();
        let decision_consistency = if decisions.len() < 2 {
            1.0
        } else {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for decision in &decisions {
                *counts.entry(decision).or_insert(0) += 1;
            }
            *counts.values().max().unwrap_or(&0) as f64 / decisions.len() as f64
        };

        let mut features = HashMap::new();
        features.insert("goal_progress".to_string(), goal_progress);
        features.insert("tool_usage_rate".to_string(), tool_usage_rate);
        features.insert("execution_success_rate".to_string(), execution_success_rate);
        features.insert("result_quality".to_string(), result_quality);
        features.insert("mean_relevance".to_string(), mean_relevance);
        features.insert("tool_diversity".to_string(), tool_diversity);
        features.insert("decision_consistency".to_string(), decision_consistency);

        for value in features.values_mut() {
            *value = value.clamp(0.0, 1.0);
        }
        features
    }

    /// Full turn history, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.ledger.lock().expect("ledger lock").turns.clone()
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.ledger.lock().expect("ledger lock").goals.clone()
    }

    pub fn intermediate_results(&self) -> Vec<IntermediateResult> {
        self.ledger
            .lock()
            .expect("ledger lock")
            .intermediate_results
            .clone()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.iter().sum::<f64>() / collected.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_lifecycle_preserves_order() {
        let state = StateManager::new();
        let turn = state.start_turn("first question");
        state.add_tool_call(turn, "web_search", json!({"query": "a"}), None);
        state.add_tool_call(
            turn,
            "summarizer",
            json!({}),
            Some(&ToolResult::ok(json!("summary"), 0.2)),
        );
        state.add_mab_decision(
            turn,
            MabDecisionRecord {
                strategy_id: "systematic_analytical".into(),
                algorithm: "thompson".into(),
                round: 1,
            },
        );
        state.complete_turn(turn, "answer", true, None);

        let turns = state.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].tool_calls[0].tool, "web_search");
        assert_eq!(turns[0].tool_calls[1].tool, "summarizer");
        assert_eq!(turns[0].tool_calls[1].success, Some(true));
        assert_eq!(turns[0].mab_decisions[0].strategy_id, "systematic_analytical");
        assert_eq!(turns[0].success, Some(true));
    }

    #[test]
    fn test_goal_progress_and_auto_status() {
        let state = StateManager::new();
        let goal = state.add_goal("ship the parser", "execution", 0.8);

        state.update_goal_progress(goal, 0.4, None);
        assert_eq!(state.goals()[0].status, GoalStatus::InProgress);

        state.update_goal_progress(goal, 2.0, None);
        let goals = state.goals();
        assert_eq!(goals[0].progress, 1.0); // clamped
        assert_eq!(goals[0].status, GoalStatus::Achieved);

        state.update_goal_progress(goal, 0.9, Some(GoalStatus::PartiallyAchieved));
        assert_eq!(state.goals()[0].status, GoalStatus::PartiallyAchieved);
    }

    #[test]
    fn test_snapshot_counts_open_goals() {
        let state = StateManager::new();
        let done = state.add_goal("done goal", "execution", 0.5);
        state.update_goal_progress(done, 1.0, None);
        state.add_goal("open goal", "research", 0.5);
        state.start_turn("hello");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.turn_count, 1);
        assert_eq!(snapshot.open_goals, vec!["open goal"]);
        assert_eq!(snapshot.last_user_input.as_deref(), Some("hello"));
    }

    #[test]
    fn test_features_all_in_unit_range() {
        let state = StateManager::new();
        let turn = state.start_turn("do things");
        for i in 0..5 {
            state.add_tool_call(
                turn,
                format!("tool_{}", i % 2),
                json!({}),
                Some(&ToolResult::ok(json!("x"), 0.1)),
            );
        }
        state.add_mab_decision(
            turn,
            MabDecisionRecord {
                strategy_id: "a".into(),
                algorithm: "ucb1".into(),
                round: 1,
            },
        );
        state.complete_turn(turn, "done", true, None);
        state.add_goal("g", "t", 0.9);
        state.add_intermediate_result("search", "content", 0.7, 0.9);

        let features = state.features_for_rl();
        assert_eq!(features.len(), 7);
        for (name, value) in &features {
            assert!(
                (0.0..=1.0).contains(value),
                "feature {name} out of range: {value}"
            );
        }
        // 5 calls in 1 turn would be 5.0 unclamped.
        assert_eq!(features["tool_usage_rate"], 1.0);
        assert_eq!(features["tool_diversity"], 0.4);
    }

    #[test]
    fn test_features_on_empty_session() {
        let state = StateManager::new();
        let features = state.features_for_rl();
        for value in features.values() {
            assert!((0.0..=1.0).contains(value));
        }
        assert_eq!(features["goal_progress"], 0.0);
        assert_eq!(features["decision_consistency"], 1.0);
    }

    #[test]
    fn test_intermediate_results_clamped_and_markable() {
        let state = StateManager::new();
        state.add_intermediate_result("verifier", "evidence", 1.7, -0.2);
        let results = state.intermediate_results();
        assert_eq!(results[0].relevance, 1.0);
        assert_eq!(results[0].quality, 0.0);
        assert!(!results[0].used_in_final_answer);

        state.mark_result_used(0);
        assert!(state.intermediate_results()[0].used_in_final_answer);
    }
}
