use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetGoal {
    TechnicalInterviews,
    CompetitiveProgramming,
    #[default]
    GeneralImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub skill_level: SkillLevel,
    pub target_goal: TargetGoal,
    pub daily_goal: u8,
    /// Canonical topic tags.
    pub focus_areas: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub skill_level: SkillLevel,

    #[serde(default)]
    pub target_goal: TargetGoal,

    #[validate(range(min = 1, max = 20, message = "Daily goal must be between 1 and 20"))]
    #[serde(default = "default_daily_goal")]
    pub daily_goal: u8,

    #[validate(length(max = 8, message = "At most 8 focus areas"))]
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

fn default_daily_goal() -> u8 {
    3
}

/// A stored code review. The submitted code itself is not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReviewRecord {
    pub id: String,
    pub user_id: String,
    pub language: String,
    pub problem_id: Option<String>,
    pub code_length: usize,
    pub focus_aspects: Vec<String>,
    pub review: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationRecord {
    pub id: String,
    pub user_id: String,
    pub problem_id: String,
    pub problem_title: String,
    pub count: u8,
    pub context_options: Vec<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    10
}
