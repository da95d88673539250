use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

pub mod attempt;
pub mod hint;
pub mod mastery;
pub mod practice;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref TOPIC_SEPARATORS: Regex = Regex::new(r"[\s_]+").unwrap();
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub statement: String,
    pub topics: Vec<String>,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl Problem {
    /// Builds a problem whose id is derived from its statement.
    /// `topics` are expected to be canonical already.
    pub fn new(
        title: String,
        statement: String,
        topics: Vec<String>,
        difficulty: Difficulty,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: problem_id_for(&statement),
            title,
            statement,
            topics,
            difficulty,
            created_at,
        }
    }
}

/// Trim, collapse whitespace runs and lowercase, so cosmetic edits of the
/// same statement hash to the same id.
pub fn normalize_statement(statement: &str) -> String {
    WHITESPACE_RUN
        .replace_all(statement.trim(), " ")
        .to_lowercase()
}

pub fn problem_id_for(statement: &str) -> String {
    let digest = Sha256::digest(normalize_statement(statement).as_bytes());
    hex::encode(digest)
}

/// "Dynamic Programming" and "dynamic_programming" both become "dynamic-programming".
pub fn canonical_topic(tag: &str) -> String {
    TOPIC_SEPARATORS
        .replace_all(tag.trim(), "-")
        .to_lowercase()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterProblemRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    pub title: String,

    #[validate(length(
        min = 10,
        max = 10000,
        message = "Statement must be between 10 and 10000 characters"
    ))]
    pub statement: String,

    #[validate(length(min = 1, max = 8, message = "Provide between 1 and 8 topic tags"))]
    pub topics: Vec<String>,

    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VariationRequest {
    #[validate(range(min = 1, max = 10, message = "Between 1 and 10 variations"))]
    #[serde(default = "default_variation_count")]
    pub count: u8,

    #[serde(default)]
    pub context_options: Vec<String>,
}

fn default_variation_count() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CodeReviewRequest {
    #[validate(length(min = 1, max = 10000, message = "Code must be 1-10000 characters"))]
    pub code: String,

    #[validate(length(min = 1, max = 32))]
    pub language: String,

    pub problem_id: Option<String>,

    #[serde(default)]
    pub focus_aspects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_id_ignores_cosmetic_whitespace_and_case() {
        let a = problem_id_for("Given an array, return the  two indices\nthat sum to target.");
        let b = problem_id_for("  given an array, return the two indices that sum to TARGET. ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_statements_get_different_ids() {
        assert_ne!(
            problem_id_for("Reverse a linked list."),
            problem_id_for("Reverse a doubly linked list.")
        );
    }

    #[test]
    fn canonical_topic_normalizes_separators() {
        assert_eq!(canonical_topic(" Dynamic Programming "), "dynamic-programming");
        assert_eq!(canonical_topic("two_pointers"), "two-pointers");
        assert_eq!(canonical_topic("graphs"), "graphs");
    }

    #[test]
    fn register_request_validation() {
        let ok = RegisterProblemRequest {
            title: "Two Sum".into(),
            statement: "Find two numbers adding up to target.".into(),
            topics: vec!["arrays".into()],
            difficulty: Difficulty::Easy,
        };
        assert!(ok.validate().is_ok());

        let no_topics = RegisterProblemRequest {
            topics: vec![],
            ..ok
        };
        assert!(no_topics.validate().is_err());
    }
}
