//! Engine configuration surface.
//!
//! A nested, fully-typed configuration object. The engine never reads
//! undeclared keys: every recognised option is a struct field with an
//! explicit default. Groups mirror the engine's concerns: bandit
//! learning, retrieval-augmented seeding, pipeline performance, hard
//! limits, and feature gates.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Multi-armed-bandit learning parameters
    pub mab: MabConfig,
    /// Retrieval-augmented seed generation
    pub rag: RagConfig,
    /// Pipeline performance knobs
    pub performance: PerformanceConfig,
    /// Hard system limits
    pub limits: SystemLimits,
    /// Feature gates
    pub features: FeatureFlags,
}

/// Bandit learning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MabConfig {
    /// Success-rate variance below which the arm population counts as converged
    pub convergence_threshold: f64,
    /// Minimum samples before convergence inspection is meaningful
    pub min_samples: u64,
    /// Success rate required for golden-template promotion
    pub golden_success_rate_threshold: f64,
    /// Activations required for golden-template promotion
    pub golden_min_samples: u64,
    /// Cap on the golden-template cache
    pub max_golden_templates: usize,
    /// Floor for the epsilon-greedy exploration rate
    pub exploration_epsilon_min: f64,
}

impl Default for MabConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 0.05,
            min_samples: 10,
            golden_success_rate_threshold: 0.90,
            golden_min_samples: 20,
            max_golden_templates: 50,
            exploration_epsilon_min: 0.1,
        }
    }
}

/// Retrieval-augmented seed generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Maximum search results retained per query
    pub max_search_results: usize,
    /// Run search queries through a bounded concurrent pool
    pub enable_parallel_search: bool,
    /// Width of the search pool
    pub max_search_workers: usize,
    /// Minimum interval between outbound search requests, in seconds
    pub search_rate_limit_interval_s: f64,
    /// Issue real web searches instead of treating search as unavailable
    pub enable_real_web_search: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_search_results: 8,
            enable_parallel_search: true,
            max_search_workers: 3,
            search_rate_limit_interval_s: 1.5,
            enable_real_web_search: false,
        }
    }
}

/// Pipeline performance knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Verify candidate paths through a bounded concurrent pool
    pub enable_parallel_path_verification: bool,
    /// Width of the verification pool
    pub max_concurrent_verifications: usize,
    /// Cache seeds and generated paths
    pub enable_intelligent_caching: bool,
    /// Cache entry time-to-live, in seconds
    pub cache_ttl_s: u64,
    /// Scale the number of verified paths with prior confidence
    pub enable_adaptive_path_count: bool,
    /// Stop verifying once early results agree
    pub enable_early_termination: bool,
    /// Agreement share required for early termination
    pub path_consistency_threshold: f64,
    /// Confidence floor → verification count table, highest floor first
    pub confidence_path_mapping: Vec<(f64, usize)>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_parallel_path_verification: false,
            max_concurrent_verifications: 3,
            enable_intelligent_caching: true,
            cache_ttl_s: 3600,
            enable_adaptive_path_count: false,
            enable_early_termination: false,
            path_consistency_threshold: 0.8,
            confidence_path_mapping: vec![(0.9, 2), (0.7, 3), (0.5, 4), (0.3, 5), (0.0, 6)],
        }
    }
}

impl PerformanceConfig {
    /// Number of paths to verify for a given prior confidence.
    pub fn paths_for_confidence(&self, confidence: f64) -> usize {
        self.confidence_path_mapping
            .iter()
            .find(|(floor, _)| confidence >= *floor)
            .map(|(_, count)| *count)
            .unwrap_or(6)
    }
}

/// Hard system limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLimits {
    /// Cap on retained decision records
    pub max_decision_history: usize,
    /// Cap on candidate paths per decision
    pub max_reasoning_paths: usize,
    /// Cap on thinking-seed length, in characters
    pub max_thinking_seed_length: usize,
}

impl Default for SystemLimits {
    fn default() -> Self {
        Self {
            max_decision_history: 50,
            max_reasoning_paths: 6,
            max_thinking_seed_length: 1000,
        }
    }
}

/// Feature gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Use retrieval-augmented synthesis for seed generation
    pub rag_seed_generation: bool,
    /// Verify seeds and paths as they are produced
    pub real_time_verification: bool,
    /// Allow the aha-moment creative bypass
    pub aha_moment_system: bool,
    /// Maintain the golden-template cache
    pub golden_template_system: bool,
    /// Honor the performance group (adaptive count, early termination)
    pub performance_optimization: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            rag_seed_generation: true,
            real_time_verification: true,
            aha_moment_system: true,
            golden_template_system: true,
            performance_optimization: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mab(mut self, mab: MabConfig) -> Self {
        self.mab = mab;
        self
    }

    pub fn with_rag(mut self, rag: RagConfig) -> Self {
        self.rag = rag;
        self
    }

    pub fn with_performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_limits(mut self, limits: SystemLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }
}
