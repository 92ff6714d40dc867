//! # noesis-core
//!
//! A meta-cognitive decision engine. Given a natural-language task, the
//! engine selects a reasoning strategy through a five-stage pipeline,
//! learns from verification and execution feedback through a
//! multi-armed bandit, and over time converges on strategies that work
//! while keeping room to explore.
//!
//! ## Core Components
//!
//! - **Seed**: grounded task summaries, optionally retrieval-augmented
//! - **Paths**: the archetype catalogue and path generation
//! - **Verify**: LLM-scored feasibility with tool grounding
//! - **Mab**: the bandit substrate, golden templates, tool selection
//! - **Orchestrator**: the five-stage pipeline and detour logic
//! - **State**: the per-session ledger
//!
//! ## Example
//!
//! ```rust,ignore
//! use noesis_core::{DecisionOrchestrator, EngineConfig};
//! use std::sync::Arc;
//!
//! let engine = DecisionOrchestrator::new(invoker, None, None, EngineConfig::default());
//! let decision = engine.decide("Design a rate-limited HTTP client", 0.5, None).await?;
//! println!("chosen strategy: {}", decision.chosen_path.strategy_id);
//! engine.update_outcome(&decision, true, 12.0, 0.9, 0.4);
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod mab;
pub mod orchestrator;
pub mod paths;
pub mod search;
pub mod seed;
pub mod state;
pub mod tools;
pub mod verify;

// Re-exports for convenience
pub use config::{
    EngineConfig, FeatureFlags, MabConfig, PerformanceConfig, RagConfig, SystemLimits,
};
pub use error::{Error, Result};
pub use llm::{ChatRequest, LlmInvoker, LlmResponse, RateLimiter, RetryConfig, RetryingInvoker, TokenUsage};
pub use mab::{
    AlgorithmStats, AlgorithmUsed, ArmCandidate, ArmStatistics, DecisionArm, GoldenTemplate,
    MabConverger, MabSelection, ModeSwitchRecord, SelectionAlgorithm, SelectionMode,
    SelectionRecord, TaskType, ToolChoice, ToolSelectionState, ToolSelector, RECENT_RESULTS_CAP,
    RECENT_REWARDS_CAP, REWARD_HISTORY_CAP,
};
pub use orchestrator::{
    AhaStats, DecisionOrchestrator, DecisionResult, StageTimings, VerifiedPath,
};
pub use paths::{
    GenerationMode, GroundingStatus, PathGenerator, PathTemplate, PathTemplateLibrary,
    ReasoningPath, SeedAnalysis, SeedGrounding, ThinkingSeed, Urgency,
};
pub use search::{SearchClient, SearchHit, SearchRateLimiter, SearchResponse};
pub use seed::{SearchDepth, SearchPlan, SeedGenerator};
pub use state::{
    Goal, GoalStatus, IntermediateResult, MabDecisionRecord, StateManager, StateSnapshot,
    ToolCallRecord, Turn,
};
pub use tools::{Tool, ToolArgs, ToolCapabilities, ToolCategory, ToolRegistry, ToolResult};
pub use verify::{VerificationResult, VerificationStage, Verifier};
