//! The fixed catalogue of reasoning-path archetypes.
//!
//! Eight archetypes cover the thinking styles the engine can deploy.
//! Strategy ids defined here are the single source of truth for bandit
//! arm keys: a path's `strategy_id` always equals the key of the template
//! that produced it.

use super::types::ReasoningPath;

/// Stable strategy identifiers.
pub const SYSTEMATIC_ANALYTICAL: &str = "systematic_analytical";
pub const CREATIVE_INNOVATIVE: &str = "creative_innovative";
pub const CRITICAL_QUESTIONING: &str = "critical_questioning";
pub const PRACTICAL_PRAGMATIC: &str = "practical_pragmatic";
pub const HOLISTIC_COMPREHENSIVE: &str = "holistic_comprehensive";
pub const EXPLORATORY_INVESTIGATIVE: &str = "exploratory_investigative";
pub const COLLABORATIVE_CONSULTATIVE: &str = "collaborative_consultative";
pub const ADAPTIVE_FLEXIBLE: &str = "adaptive_flexible";

/// One catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTemplate {
    pub strategy_id: &'static str,
    pub path_type: &'static str,
    pub description: &'static str,
    pub prompt_template: &'static str,
}

impl PathTemplate {
    /// Materialise this template into a concrete path instance.
    ///
    /// `instance_id` uniqueness is the caller's responsibility; the
    /// strategy id is fixed by the template.
    pub fn instantiate(&self, instance_id: String) -> ReasoningPath {
        ReasoningPath {
            strategy_id: self.strategy_id.to_string(),
            instance_id,
            path_type: self.path_type.to_string(),
            description: self.description.to_string(),
            prompt_template: self.prompt_template.to_string(),
        }
    }
}

static TEMPLATES: &[PathTemplate] = &[
    PathTemplate {
        strategy_id: SYSTEMATIC_ANALYTICAL,
        path_type: "Systematic analysis",
        description: "Decompose the problem into parts, map dependencies, and build a structured solution. Suited to complex or technical tasks.",
        prompt_template: "Analyze the task systematically: {task}\n\n\
            1. Decompose the problem into manageable sub-problems.\n\
            2. Identify the factors that determine success.\n\
            3. Map the dependencies between the parts.\n\
            4. Assess risks and likely failure points.\n\
            5. Design a structured solution from the analysis.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a structured, systematic analysis and solution.",
    },
    PathTemplate {
        strategy_id: CREATIVE_INNOVATIVE,
        path_type: "Creative breakthrough",
        description: "Step outside conventional approaches and look for novel angles. Suited to tasks that reward originality.",
        prompt_template: "Solve the task with a creative approach: {task}\n\n\
            1. Question the conventional method and its assumptions.\n\
            2. Borrow ideas from unrelated domains.\n\
            3. Consider an inverted or unconventional route.\n\
            4. Combine existing techniques in new ways.\n\
            5. Factor in emerging tools and trends.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a novel yet workable solution.",
    },
    PathTemplate {
        strategy_id: CRITICAL_QUESTIONING,
        path_type: "Critical questioning",
        description: "Interrogate assumptions, evidence, and logic. Suited to tasks that demand rigorous argument.",
        prompt_template: "Examine the task critically: {task}\n\n\
            1. Challenge the stated assumptions and premises.\n\
            2. Weigh the reliability and sufficiency of the evidence.\n\
            3. Check the reasoning for logical gaps.\n\
            4. View the problem from opposing positions.\n\
            5. Anticipate counter-arguments and address them.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a rigorous critical analysis.",
    },
    PathTemplate {
        strategy_id: PRACTICAL_PRAGMATIC,
        path_type: "Practical execution",
        description: "Favor what can be done now with the resources at hand. Suited to problems that need a fast, concrete resolution.",
        prompt_template: "Resolve the task pragmatically: {task}\n\n\
            1. Prefer steps that can start immediately.\n\
            2. Work within the current resource constraints.\n\
            3. Choose low-risk, high-success-rate methods.\n\
            4. Focus on actions with measurable effect.\n\
            5. Iterate in small increments.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a direct, immediately actionable plan.",
    },
    PathTemplate {
        strategy_id: HOLISTIC_COMPREHENSIVE,
        path_type: "Holistic synthesis",
        description: "Consider the whole system and balance competing concerns. Suited to situations with many interacting factors.",
        prompt_template: "Consider the task as a whole: {task}\n\n\
            1. Place the problem in its wider context.\n\
            2. Balance the needs of every affected party.\n\
            3. Weigh long-term consequences, not just immediate effects.\n\
            4. Trace interactions between the system's parts.\n\
            5. Find the trade-off that best balances the factors.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a balanced, comprehensive recommendation.",
    },
    PathTemplate {
        strategy_id: EXPLORATORY_INVESTIGATIVE,
        path_type: "Exploratory research",
        description: "Gather and verify information before committing. Suited to research and learning tasks.",
        prompt_template: "Investigate the task thoroughly: {task}\n\n\
            1. Collect relevant information from a broad base.\n\
            2. Cross-check findings against multiple sources.\n\
            3. Look for recurring patterns in the material.\n\
            4. Form hypotheses and ways to test them.\n\
            5. Integrate the findings into a coherent picture.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a deep, well-sourced investigation.",
    },
    PathTemplate {
        strategy_id: COLLABORATIVE_CONSULTATIVE,
        path_type: "Collaborative consultation",
        description: "Frame the solution around the people involved. Suited to tasks that depend on coordination and consensus.",
        prompt_template: "Approach the task collaboratively: {task}\n\n\
            1. Identify the stakeholders and their interests.\n\
            2. Design the communication and coordination channels.\n\
            3. Find the solution each party can accept.\n\
            4. Divide responsibilities to match strengths.\n\
            5. Plan for the conflicts likely to arise.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a plan that builds consensus and shared ownership.",
    },
    PathTemplate {
        strategy_id: ADAPTIVE_FLEXIBLE,
        path_type: "Adaptive response",
        description: "Stay flexible under uncertainty and keep options open. Suited to volatile or poorly-specified environments.",
        prompt_template: "Handle the task adaptively: {task}\n\n\
            1. Gauge how uncertain and changeable the situation is.\n\
            2. Prepare alternatives for the likely contingencies.\n\
            3. Build in fast feedback and correction loops.\n\
            4. Adjust the strategy as evidence arrives.\n\
            5. Keep the solution resilient to surprises.\n\n\
            Thinking seed: {thinking_seed}\n\
            Provide a flexible plan that survives changing conditions.",
    },
];

/// Archetypes favored by the creative-bypass sampler.
pub const HIGH_CREATIVITY_PRESET: &[&str] = &[
    CREATIVE_INNOVATIVE,
    CRITICAL_QUESTIONING,
    EXPLORATORY_INVESTIGATIVE,
    ADAPTIVE_FLEXIBLE,
];

/// Balanced archetypes used to fill the remaining bypass slots.
pub const BALANCED_PRESET: &[&str] = &[
    SYSTEMATIC_ANALYTICAL,
    PRACTICAL_PRAGMATIC,
    HOLISTIC_COMPREHENSIVE,
    COLLABORATIVE_CONSULTATIVE,
];

/// Static catalogue of reasoning-path archetypes.
pub struct PathTemplateLibrary;

impl PathTemplateLibrary {
    /// All templates, in catalogue order.
    pub fn all() -> &'static [PathTemplate] {
        TEMPLATES
    }

    /// Look up a template by strategy id.
    pub fn get(strategy_id: &str) -> Option<&'static PathTemplate> {
        TEMPLATES.iter().find(|t| t.strategy_id == strategy_id)
    }

    /// All strategy ids, in catalogue order.
    pub fn strategy_ids() -> Vec<&'static str> {
        TEMPLATES.iter().map(|t| t.strategy_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_has_eight_archetypes() {
        assert_eq!(PathTemplateLibrary::all().len(), 8);
    }

    #[test]
    fn test_strategy_ids_are_unique() {
        let ids: HashSet<&str> = PathTemplateLibrary::strategy_ids().into_iter().collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_every_template_has_both_prompt_slots() {
        for template in PathTemplateLibrary::all() {
            assert!(
                template.prompt_template.contains("{task}"),
                "{} lacks {{task}}",
                template.strategy_id
            );
            assert!(
                template.prompt_template.contains("{thinking_seed}"),
                "{} lacks {{thinking_seed}}",
                template.strategy_id
            );
        }
    }

    #[test]
    fn test_instantiate_fixes_strategy_id() {
        let template = PathTemplateLibrary::get(SYSTEMATIC_ANALYTICAL).unwrap();
        let path = template.instantiate("systematic_analytical_123_0042".into());
        assert_eq!(path.strategy_id, SYSTEMATIC_ANALYTICAL);
        assert_eq!(path.path_type, template.path_type);
        assert_eq!(path.description, template.description);
    }

    #[test]
    fn test_presets_cover_distinct_archetypes() {
        for id in HIGH_CREATIVITY_PRESET {
            assert!(PathTemplateLibrary::get(id).is_some());
            assert!(!BALANCED_PRESET.contains(id));
        }
    }
}
