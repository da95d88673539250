//! Achievement catalog and predicates.
//!
//! Predicates are pure functions of an immutable snapshot. Evaluation order
//! does not matter and nothing here touches storage.

use std::collections::BTreeMap;

use crate::models::mastery::{AchievementId, ActivityStats, MasteryRecord};

const HINTLESS_TARGET: usize = 5;
const SOLVED_TARGET: usize = 10;
const TOPIC_MASTER_RATE: f64 = 0.8;
const TOPIC_MASTER_MIN_ATTEMPTS: u32 = 5;
const WELL_ROUNDED_RATE: f64 = 0.6;
const WELL_ROUNDED_TOPICS: usize = 3;

pub const CATALOG: &[AchievementId] = &[
    AchievementId::FirstSolve,
    AchievementId::SoloSolver,
    AchievementId::HintlessFive,
    AchievementId::ProblemSolver,
    AchievementId::TopicMaster,
    AchievementId::WellRounded,
];

pub struct AchievementSnapshot<'a> {
    pub records: &'a BTreeMap<String, MasteryRecord>,
    pub stats: &'a ActivityStats,
}

pub fn title(id: AchievementId) -> &'static str {
    match id {
        AchievementId::FirstSolve => "First Solve",
        AchievementId::SoloSolver => "Solo Solver",
        AchievementId::HintlessFive => "Hintless Five",
        AchievementId::ProblemSolver => "Problem Solver",
        AchievementId::TopicMaster => "Topic Master",
        AchievementId::WellRounded => "Well Rounded",
    }
}

pub fn description(id: AchievementId) -> &'static str {
    match id {
        AchievementId::FirstSolve => "Solve your first problem",
        AchievementId::SoloSolver => "Solve a problem without using any hints",
        AchievementId::HintlessFive => "Solve 5 different problems without hints",
        AchievementId::ProblemSolver => "Solve 10 different problems",
        AchievementId::TopicMaster => "Reach 80% mastery in a topic over at least 5 attempts",
        AchievementId::WellRounded => "Reach 60% mastery in 3 different topics",
    }
}

pub fn is_satisfied(id: AchievementId, snapshot: &AchievementSnapshot<'_>) -> bool {
    match id {
        AchievementId::FirstSolve => !snapshot.stats.solved_problems.is_empty(),
        AchievementId::SoloSolver => !snapshot.stats.hintless_problems.is_empty(),
        AchievementId::HintlessFive => snapshot.stats.hintless_problems.len() >= HINTLESS_TARGET,
        AchievementId::ProblemSolver => snapshot.stats.solved_problems.len() >= SOLVED_TARGET,
        AchievementId::TopicMaster => snapshot.records.values().any(|r| {
            r.attempts >= TOPIC_MASTER_MIN_ATTEMPTS && r.success_rate >= TOPIC_MASTER_RATE
        }),
        AchievementId::WellRounded => {
            snapshot
                .records
                .values()
                .filter(|r| r.attempts > 0 && r.success_rate >= WELL_ROUNDED_RATE)
                .count()
                >= WELL_ROUNDED_TOPICS
        }
    }
}

/// Ids that hold for `snapshot` and are not in `unlocked`, in catalog order.
pub fn evaluate(snapshot: &AchievementSnapshot<'_>, unlocked: &[AchievementId]) -> Vec<AchievementId> {
    CATALOG
        .iter()
        .copied()
        .filter(|id| !unlocked.contains(id))
        .filter(|id| is_satisfied(*id, snapshot))
        .collect()
}
