//! Search-plan types for retrieval-augmented seeding.

use serde::{Deserialize, Serialize};

/// How deep the evidence gathering should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Shallow,
    #[default]
    Standard,
    Deep,
}

/// The plan phase output: what to search for and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPlan {
    /// One-line statement of what the searches should establish
    pub search_intent: String,
    pub primary_keywords: Vec<String>,
    pub secondary_keywords: Vec<String>,
    pub domain_focus: String,
    /// Kinds of information worth retrieving (docs, benchmarks, prior art)
    pub information_types: Vec<String>,
    pub search_depth: SearchDepth,
}

impl SearchPlan {
    /// Build the query list: each primary keyword alone, then the first
    /// primary crossed with each secondary, capped at five queries.
    pub fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self
            .primary_keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.trim().to_string())
            .collect();

        if let Some(first) = queries.first().cloned() {
            for secondary in &self.secondary_keywords {
                let secondary = secondary.trim();
                if !secondary.is_empty() {
                    queries.push(format!("{first} {secondary}"));
                }
            }
        }

        queries.truncate(5);
        queries
    }

    /// All keywords, lowercased, for relevance ranking.
    pub fn ranking_terms(&self) -> Vec<String> {
        self.primary_keywords
            .iter()
            .chain(self.secondary_keywords.iter())
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(primary: &[&str], secondary: &[&str]) -> SearchPlan {
        SearchPlan {
            primary_keywords: primary.iter().map(|s| s.to_string()).collect(),
            secondary_keywords: secondary.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_queries_combine_primary_and_secondary() {
        let plan = plan(&["rate limiting"], &["token bucket", "sliding window"]);
        assert_eq!(
            plan.queries(),
            vec![
                "rate limiting",
                "rate limiting token bucket",
                "rate limiting sliding window"
            ]
        );
    }

    #[test]
    fn test_queries_capped_at_five() {
        let plan = plan(&["a", "b", "c", "d"], &["x", "y", "z"]);
        assert_eq!(plan.queries().len(), 5);
    }

    #[test]
    fn test_queries_skip_blank_keywords() {
        let plan = plan(&["  ", "http client"], &[""]);
        assert_eq!(plan.queries(), vec!["http client"]);
    }

    #[test]
    fn test_ranking_terms_lowercased() {
        let plan = plan(&["HTTP Client"], &["Retry"]);
        assert_eq!(plan.ranking_terms(), vec!["http client", "retry"]);
    }
}
