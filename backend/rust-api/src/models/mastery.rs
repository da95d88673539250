use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::Attempt;
use super::hint::HintSession;
use super::practice::{CodeReviewRecord, UserProfile, VariationRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub user_id: String,
    pub topic: String,
    pub success_rate: f64,
    pub attempts: u32,
    pub correct: u32,
    pub updated_at: DateTime<Utc>,
}

impl MasteryRecord {
    pub fn new(user_id: &str, topic: &str, initial_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            success_rate: initial_rate.clamp(0.0, 1.0),
            attempts: 0,
            correct: 0,
            updated_at: now,
        }
    }

    /// Fixed-decay moving average: `rate += alpha * (outcome - rate)`.
    /// With `alpha` in (0, 1] the rate stays inside [0, 1].
    pub fn apply(&mut self, correct: bool, alpha: f64, at: DateTime<Utc>) {
        let outcome = if correct { 1.0 } else { 0.0 };
        let rate = self.success_rate + alpha * (outcome - self.success_rate);
        self.success_rate = rate.clamp(0.0, 1.0);
        self.attempts += 1;
        if correct {
            self.correct += 1;
        }
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementId {
    FirstSolve,
    SoloSolver,
    HintlessFive,
    ProblemSolver,
    TopicMaster,
    WellRounded,
}

impl AchievementId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementId::FirstSolve => "first_solve",
            AchievementId::SoloSolver => "solo_solver",
            AchievementId::HintlessFive => "hintless_five",
            AchievementId::ProblemSolver => "problem_solver",
            AchievementId::TopicMaster => "topic_master",
            AchievementId::WellRounded => "well_rounded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub id: AchievementId,
    pub title: String,
    pub description: String,
    pub unlocked_at: DateTime<Utc>,
    /// Attempt whose ingestion made the predicate true.
    pub attempt_id: Option<String>,
}

/// Running totals over a user's attempt history, updated per ingestion so
/// progress and achievement checks never read the history itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_attempts: u32,
    pub correct_attempts: u32,
    /// Distinct problems with at least one correct attempt.
    pub solved_problems: BTreeSet<String>,
    /// Distinct problems solved by an attempt that used no hints.
    pub hintless_problems: BTreeSet<String>,
    pub hints_used: u32,
    pub current_streak: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

impl ActivityStats {
    pub fn record(&mut self, attempt: &Attempt) {
        self.total_attempts += 1;
        self.hints_used += u32::from(attempt.hints_used);
        if attempt.correct {
            self.correct_attempts += 1;
            self.current_streak += 1;
            self.solved_problems.insert(attempt.problem_id.clone());
            if attempt.hints_used == 0 {
                self.hintless_problems.insert(attempt.problem_id.clone());
            }
        } else {
            self.current_streak = 0;
        }
        self.last_activity = Some(
            self.last_activity
                .map_or(attempt.completed_at, |last| last.max(attempt.completed_at)),
        );
    }
}

/// Documents an ingestion or rebuild still has to write. It is committed as
/// part of the user's `MasteryState` first, then copied to the record and
/// attempt documents, so a crash between the two is rolled forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub attempt: Option<Attempt>,
    pub records: Vec<MasteryRecord>,
}

/// Per-user commit document of the tracker. Records and attempts live in
/// their own (user, topic) and (user, attempt id) documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryState {
    pub user_id: String,
    pub stats: ActivityStats,
    pub achievements: Vec<AchievementUnlock>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub pending: Option<PendingWrite>,
}

impl MasteryState {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    pub fn unlocked_ids(&self) -> Vec<AchievementId> {
        self.achievements.iter().map(|a| a.id).collect()
    }

    pub fn has_achievement(&self, id: AchievementId) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub updated_records: Vec<MasteryRecord>,
    pub newly_unlocked: Vec<AchievementUnlock>,
    /// The attempt id had already been applied; nothing changed.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub problems_solved: u32,
    pub solved_without_hints: u32,
    pub hints_used: u32,
    /// Consecutive correct attempts ending with the most recent one.
    pub current_streak: u32,
    pub topics: Vec<MasteryRecord>,
    pub achievements: Vec<AchievementUnlock>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct MasteryExport {
    pub stats: ActivityStats,
    pub records: Vec<MasteryRecord>,
    /// Ordered by completion time.
    pub attempts: Vec<Attempt>,
    pub achievements: Vec<AchievementUnlock>,
}

#[derive(Debug, Serialize)]
pub struct UserExport {
    pub user_id: String,
    pub profile: Option<UserProfile>,
    pub sessions: Vec<HintSession>,
    pub mastery: MasteryExport,
    pub code_reviews: Vec<CodeReviewRecord>,
    pub variations: Vec<VariationRecord>,
    pub exported_at: DateTime<Utc>,
}
