//! Multi-armed-bandit learning substrate.
//!
//! One [`MabConverger`] instance learns which reasoning strategies
//! succeed; a second instance inside [`ToolSelector`] learns which tools
//! help. Arms are created lazily, updated with clamped rewards, promoted
//! into golden templates when they demonstrate sustained success, and
//! reset when they persistently fail.

mod arm;
mod converger;
mod golden;
mod tool_select;

pub use arm::{DecisionArm, RECENT_RESULTS_CAP, RECENT_REWARDS_CAP, REWARD_HISTORY_CAP};
pub use converger::{
    AlgorithmStats, AlgorithmUsed, ArmCandidate, ArmStatistics, MabConverger, MabSelection,
    SelectionAlgorithm, SelectionRecord,
};
pub use golden::{GoldenTemplate, GoldenTemplateCache};
pub use tool_select::{
    ModeSwitchRecord, SelectionMode, TaskType, ToolChoice, ToolSelectionState, ToolSelector,
    NO_TOOL,
};
