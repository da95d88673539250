use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::hint::SessionVerdict;
use super::mastery::{AchievementUnlock, MasteryRecord};

/// One graded submission. Topics are copied from the problem at submission
/// time so later catalog edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    pub problem_id: String,
    pub correct: bool,
    pub topics: Vec<String>,
    pub hints_used: u8,
    pub elapsed_secs: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(length(min = 1, max = 100))]
    pub attempt_id: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub problem_id: String,

    pub correct: bool,

    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt: Attempt,
    pub updated_records: Vec<MasteryRecord>,
    pub newly_unlocked: Vec<AchievementUnlock>,
    pub duplicate: bool,
    pub session_verdict: Option<SessionVerdict>,
}
