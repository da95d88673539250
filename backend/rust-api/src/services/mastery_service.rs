use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::MasteryConfig;
use crate::error::{CoachError, Result};
use crate::metrics::{ACHIEVEMENTS_UNLOCKED_TOTAL, ATTEMPTS_INGESTED_TOTAL};
use crate::models::attempt::Attempt;
use crate::models::canonical_topic;
use crate::models::mastery::{
    AchievementUnlock, IngestOutcome, MasteryExport, MasteryRecord, MasteryState, PendingWrite,
    UserProgress,
};
use crate::services::achievements::{self, AchievementSnapshot};
use crate::services::store::{Collection, DocKey, DocumentStore, KeyedLocks};

pub const RECORDS_COLLECTION: &str = "mastery";
pub const ATTEMPTS_COLLECTION: &str = "attempts";
pub const STATE_COLLECTION: &str = "mastery_state";
const STATE_ID: &str = "state";

/// Per-user skill estimates and achievements.
///
/// Records are stored per (user, topic) and attempts per (user, attempt id).
/// A small per-user `MasteryState` is the commit point: an ingestion first
/// writes the state with the new documents attached as `pending`, then copies
/// them into place. Anything left pending by a crash is finished by the next
/// call for that user, so an ingestion is applied entirely or not at all.
#[derive(Clone)]
pub struct MasteryTracker {
    records: Collection<MasteryRecord>,
    attempts: Collection<Attempt>,
    states: Collection<MasteryState>,
    locks: Arc<KeyedLocks>,
    config: MasteryConfig,
}

impl MasteryTracker {
    pub fn new(store: Arc<dyn DocumentStore>, config: MasteryConfig) -> Self {
        Self {
            records: Collection::new(store.clone(), RECORDS_COLLECTION),
            attempts: Collection::new(store.clone(), ATTEMPTS_COLLECTION),
            states: Collection::new(store, STATE_COLLECTION),
            locks: Arc::new(KeyedLocks::new()),
            config,
        }
    }

    fn state_key(user_id: &str) -> DocKey {
        DocKey::new(user_id, STATE_ID)
    }

    async fn lock_user(&self, user_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks
            .lock(&Self::state_key(user_id).lock_key(STATE_COLLECTION))
            .await
    }

    pub async fn ingest(&self, attempt: Attempt) -> Result<IngestOutcome> {
        let attempt = Attempt {
            topics: self.canonical_topics(&attempt.topics)?,
            ..attempt
        };
        let horizon = Utc::now() + Duration::seconds(i64::from(self.config.max_clock_skew_secs));
        if attempt.completed_at > horizon {
            return Err(CoachError::Validation(format!(
                "completed_at {} is in the future",
                attempt.completed_at
            )));
        }

        let user_id = attempt.user_id.clone();
        let _guard = self.lock_user(&user_id).await;
        let mut state = self.settle(&user_id).await?;

        if self
            .attempts
            .find_one(&DocKey::new(user_id.as_str(), attempt.id.as_str()))
            .await?
            .is_some()
        {
            tracing::debug!(user_id = %user_id, attempt_id = %attempt.id, "Attempt already ingested");
            return Ok(IngestOutcome {
                duplicate: true,
                ..Default::default()
            });
        }
        if let Some(last) = state.last_completed_at {
            if attempt.completed_at < last {
                return Err(CoachError::OutOfOrder {
                    completed_at: attempt.completed_at,
                    last_ingested: last,
                });
            }
        }

        let mut records = self.load_records(&user_id).await?;
        let updated_records = self.apply_attempt(&mut records, &attempt);
        state.stats.record(&attempt);
        let newly_unlocked = unlock_new_achievements(&mut state, &records, &attempt);
        state.last_completed_at = Some(attempt.completed_at);

        self.commit(
            state,
            PendingWrite {
                attempt: Some(attempt.clone()),
                records: updated_records.clone(),
            },
        )
        .await?;

        ATTEMPTS_INGESTED_TOTAL
            .with_label_values(&[if attempt.correct { "true" } else { "false" }])
            .inc();
        for unlock in &newly_unlocked {
            ACHIEVEMENTS_UNLOCKED_TOTAL
                .with_label_values(&[unlock.id.as_str()])
                .inc();
        }
        tracing::info!(
            user_id = %user_id,
            problem_id = %attempt.problem_id,
            correct = attempt.correct,
            topics = ?attempt.topics,
            unlocked = newly_unlocked.len(),
            "Attempt ingested"
        );

        Ok(IngestOutcome {
            updated_records,
            newly_unlocked,
            duplicate: false,
        })
    }

    /// Point read of one (user, topic) record.
    pub async fn record(&self, user_id: &str, topic: &str) -> Result<MasteryRecord> {
        let topic = canonical_topic(topic);
        if !self.config.knows_topic(&topic) {
            return Err(CoachError::UnknownTopic(topic));
        }
        let _guard = self.lock_user(user_id).await;
        self.settle(user_id).await?;
        self.records
            .find_one(&DocKey::new(user_id, topic.as_str()))
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("mastery record for topic {}", topic)))
    }

    pub async fn progress(&self, user_id: &str) -> Result<UserProgress> {
        let _guard = self.lock_user(user_id).await;
        let state = self.settle(user_id).await?;
        let records = self.load_records(user_id).await?;
        Ok(summarize(state, records))
    }

    /// Everything stored for the user, attempts in completion order.
    pub async fn export(&self, user_id: &str) -> Result<MasteryExport> {
        let _guard = self.lock_user(user_id).await;
        let state = self.settle(user_id).await?;
        let records = self.load_records(user_id).await?;
        let attempts = self.history(user_id).await?;

        Ok(MasteryExport {
            stats: state.stats,
            records: records.into_values().collect(),
            attempts,
            achievements: state.achievements,
        })
    }

    /// Recomputes every record and the running totals from the stored attempt
    /// history. Existing unlocks are kept; predicates that now hold are appended.
    pub async fn rebuild(&self, user_id: &str) -> Result<IngestOutcome> {
        let _guard = self.lock_user(user_id).await;
        let stored = self.settle(user_id).await?;
        let history = self.history(user_id).await?;

        let mut state = MasteryState {
            stats: Default::default(),
            last_completed_at: None,
            ..stored
        };
        let mut records = BTreeMap::new();
        let mut newly_unlocked = Vec::new();
        for attempt in &history {
            let skipped: Vec<&String> = attempt
                .topics
                .iter()
                .filter(|t| !self.config.knows_topic(t))
                .collect();
            if !skipped.is_empty() {
                tracing::warn!(user_id, attempt_id = %attempt.id, topics = ?skipped, "Skipping topics no longer configured");
            }
            self.apply_attempt(&mut records, attempt);
            state.stats.record(attempt);
            newly_unlocked.extend(unlock_new_achievements(&mut state, &records, attempt));
            state.last_completed_at = Some(attempt.completed_at);
        }

        let updated_records: Vec<MasteryRecord> = records.into_values().collect();
        self.commit(
            state,
            PendingWrite {
                attempt: None,
                records: updated_records.clone(),
            },
        )
        .await?;
        tracing::info!(
            user_id,
            attempts = history.len(),
            topics = updated_records.len(),
            "Mastery records rebuilt"
        );

        Ok(IngestOutcome {
            updated_records,
            newly_unlocked,
            duplicate: false,
        })
    }

    /// Loads the user's state, finishing any write a previous call committed
    /// but did not copy into place. The caller holds the user's lock.
    async fn settle(&self, user_id: &str) -> Result<MasteryState> {
        let key = Self::state_key(user_id);
        let Some(mut state) = self.states.find_one(&key).await? else {
            return Ok(MasteryState::new(user_id));
        };
        if let Some(pending) = state.pending.take() {
            tracing::warn!(user_id, version = state.version, "Completing interrupted mastery write");
            self.write_pending(user_id, &pending).await?;
            self.states.replace_one(&key, &state).await?;
        }
        Ok(state)
    }

    /// Writes the state with `pending` attached, which makes the change
    /// durable, then copies the pending documents into place. A failure after
    /// the first write is left for the next `settle`.
    async fn commit(&self, mut state: MasteryState, pending: PendingWrite) -> Result<()> {
        let key = Self::state_key(&state.user_id);
        state.version += 1;
        state.pending = Some(pending.clone());
        self.states.replace_one(&key, &state).await?;

        state.pending = None;
        let copied = async {
            self.write_pending(&state.user_id, &pending).await?;
            self.states.replace_one(&key, &state).await?;
            Ok::<(), CoachError>(())
        }
        .await;
        if let Err(e) = copied {
            tracing::warn!(user_id = %state.user_id, version = state.version, error = %e, "Mastery write committed but not yet copied");
        }
        Ok(())
    }

    async fn write_pending(&self, user_id: &str, pending: &PendingWrite) -> Result<()> {
        if let Some(attempt) = &pending.attempt {
            self.attempts
                .replace_one(&DocKey::new(user_id, attempt.id.as_str()), attempt)
                .await?;
        }
        for record in &pending.records {
            self.records
                .replace_one(&DocKey::new(user_id, record.topic.as_str()), record)
                .await?;
        }
        Ok(())
    }

    /// Records of configured topics, keyed by topic.
    async fn load_records(&self, user_id: &str) -> Result<BTreeMap<String, MasteryRecord>> {
        Ok(self
            .records
            .find_all(user_id)
            .await?
            .into_iter()
            .filter(|r| self.config.knows_topic(&r.topic))
            .map(|r| (r.topic.clone(), r))
            .collect())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<Attempt>> {
        let mut history = self.attempts.find_all(user_id).await?;
        history.sort_by_key(|a| a.completed_at);
        Ok(history)
    }

    /// Canonical, deduplicated tags; fails on the first tag outside the
    /// configured set before anything is touched.
    fn canonical_topics(&self, topics: &[String]) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        for tag in topics {
            let topic = canonical_topic(tag);
            if !self.config.knows_topic(&topic) {
                return Err(CoachError::UnknownTopic(topic));
            }
            seen.insert(topic);
        }
        Ok(seen.into_iter().collect())
    }

    fn apply_attempt(
        &self,
        records: &mut BTreeMap<String, MasteryRecord>,
        attempt: &Attempt,
    ) -> Vec<MasteryRecord> {
        let mut updated = Vec::new();
        for topic in attempt
            .topics
            .iter()
            .filter(|t| self.config.knows_topic(t))
        {
            let record = records.entry(topic.clone()).or_insert_with(|| {
                MasteryRecord::new(
                    &attempt.user_id,
                    topic,
                    self.config.initial_rate,
                    attempt.completed_at,
                )
            });
            record.apply(attempt.correct, self.config.alpha, attempt.completed_at);
            updated.push(record.clone());
        }
        updated
    }
}

fn unlock_new_achievements(
    state: &mut MasteryState,
    records: &BTreeMap<String, MasteryRecord>,
    attempt: &Attempt,
) -> Vec<AchievementUnlock> {
    let fresh = achievements::evaluate(
        &AchievementSnapshot {
            records,
            stats: &state.stats,
        },
        &state.unlocked_ids(),
    );

    let unlocks: Vec<AchievementUnlock> = fresh
        .into_iter()
        .map(|id| AchievementUnlock {
            id,
            title: achievements::title(id).to_string(),
            description: achievements::description(id).to_string(),
            unlocked_at: attempt.completed_at,
            attempt_id: Some(attempt.id.clone()),
        })
        .collect();
    state.achievements.extend(unlocks.iter().cloned());
    unlocks
}

fn summarize(state: MasteryState, records: BTreeMap<String, MasteryRecord>) -> UserProgress {
    let stats = state.stats;
    UserProgress {
        user_id: state.user_id,
        total_attempts: stats.total_attempts,
        correct_attempts: stats.correct_attempts,
        problems_solved: stats.solved_problems.len() as u32,
        solved_without_hints: stats.hintless_problems.len() as u32,
        hints_used: stats.hints_used,
        current_streak: stats.current_streak,
        topics: records.into_values().collect(),
        achievements: state.achievements,
        last_activity: stats.last_activity,
    }
}
