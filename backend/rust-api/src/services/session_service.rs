use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CoachError, Result};
use crate::metrics::SESSIONS_TOTAL;
use crate::models::hint::{HintKind, HintSession, HintUnlock, SessionVerdict};
use crate::services::store::{Collection, DocKey, DocumentStore, KeyedLocks};

pub const SESSIONS_COLLECTION: &str = "sessions";

/// Result of committing an unlock. `applied` is false when the level was
/// already unlocked, typically by a concurrent request that won the race.
#[derive(Debug, Clone)]
pub struct UnlockCommit {
    pub session: HintSession,
    pub applied: bool,
}

/// Durable per-(user, problem) ladder progress. Every mutation runs under
/// the key's lock and is written back before the call returns.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Collection<HintSession>,
    locks: Arc<KeyedLocks>,
    total_levels: u8,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>, total_levels: u8) -> Self {
        Self {
            sessions: Collection::new(store, SESSIONS_COLLECTION),
            locks: Arc::new(KeyedLocks::new()),
            total_levels,
        }
    }

    pub fn total_levels(&self) -> u8 {
        self.total_levels
    }

    fn key(user_id: &str, problem_id: &str) -> DocKey {
        DocKey::new(user_id, problem_id)
    }

    pub async fn get(&self, user_id: &str, problem_id: &str) -> Result<Option<HintSession>> {
        Ok(self.sessions.find_one(&Self::key(user_id, problem_id)).await?)
    }

    /// The only path that creates sessions. Creation happens under the key's
    /// lock so concurrent callers all see the same session.
    pub async fn get_or_create(&self, user_id: &str, problem_id: &str) -> Result<HintSession> {
        let key = Self::key(user_id, problem_id);
        if let Some(existing) = self.sessions.find_one(&key).await? {
            return Ok(existing);
        }

        let _guard = self.locks.lock(&key.lock_key(SESSIONS_COLLECTION)).await;
        if let Some(existing) = self.sessions.find_one(&key).await? {
            return Ok(existing);
        }

        let session = HintSession::new(user_id, problem_id, self.total_levels, Utc::now());
        self.sessions.replace_one(&key, &session).await?;
        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(user_id, problem_id, "Hint session created");
        Ok(session)
    }

    /// Applies `mutate` to a copy of the session and persists it only when the
    /// closure succeeds, so a failed update leaves the stored document as it was.
    pub async fn update<R, F>(&self, user_id: &str, problem_id: &str, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut HintSession) -> Result<R>,
    {
        self.apply(user_id, problem_id, mutate)
            .await
            .map(|(_, result)| result)
    }

    /// Same as `update`, also returning the session as persisted.
    async fn apply<R, F>(
        &self,
        user_id: &str,
        problem_id: &str,
        mutate: F,
    ) -> Result<(HintSession, R)>
    where
        F: FnOnce(&mut HintSession) -> Result<R>,
    {
        let key = Self::key(user_id, problem_id);
        let _guard = self.locks.lock(&key.lock_key(SESSIONS_COLLECTION)).await;

        let current = self
            .sessions
            .find_one(&key)
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("session for problem {}", problem_id)))?;

        let mut draft = current.clone();
        let result = mutate(&mut draft)?;

        if draft != current {
            draft.version = current.version + 1;
            draft.updated_at = Utc::now();
            self.sessions.replace_one(&key, &draft).await?;
        }
        Ok((draft, result))
    }

    pub async fn record_unlock(
        &self,
        user_id: &str,
        problem_id: &str,
        level: u8,
        kind: HintKind,
        text: String,
        at: DateTime<Utc>,
    ) -> Result<UnlockCommit> {
        let (session, applied) = self
            .apply(user_id, problem_id, |session| {
                let current = session.unlocked_level();
                if level == 0 {
                    return Err(CoachError::InvalidLevel {
                        total: session.total_levels,
                    });
                }
                if level <= current {
                    return Ok(false);
                }
                if level > session.total_levels {
                    return Err(CoachError::LadderExhausted {
                        total: session.total_levels,
                    });
                }
                if level > current + 1 {
                    return Err(CoachError::SkipNotAllowed {
                        requested: level,
                        next: current + 1,
                    });
                }

                session.unlocks.push(HintUnlock {
                    level,
                    kind,
                    text,
                    unlocked_at: at,
                });
                Ok(true)
            })
            .await?;

        Ok(UnlockCommit { session, applied })
    }

    /// Only `solved` is final. Other verdicts may be replaced, so a user who
    /// abandoned a problem can come back and solve it.
    pub async fn mark_terminal(
        &self,
        user_id: &str,
        problem_id: &str,
        verdict: SessionVerdict,
    ) -> Result<HintSession> {
        let (session, changed) = self
            .apply(user_id, problem_id, |session| {
                if session.is_solved() {
                    return Err(CoachError::AlreadyTerminal);
                }
                if session.verdict == Some(verdict) {
                    return Ok(false);
                }
                session.verdict = Some(verdict);
                session.terminal_at = Some(Utc::now());
                Ok(true)
            })
            .await?;

        if changed {
            SESSIONS_TOTAL.with_label_values(&[verdict.as_str()]).inc();
            tracing::info!(user_id, problem_id, verdict = verdict.as_str(), "Session marked terminal");
        }
        Ok(session)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<HintSession>> {
        let mut sessions = Vec::new();
        for problem_id in self.sessions.ids(user_id).await? {
            if let Some(session) = self.sessions.find_one(&Self::key(user_id, &problem_id)).await? {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{FileStore, MemoryStore};

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), 4)
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_session() {
        let sessions = store();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_or_create("alice", "p1").await.unwrap() })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap());
        }
        assert!(created.iter().all(|s| s.created_at == created[0].created_at));
        assert_eq!(sessions.list_for_user("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn solved_is_final_but_abandoned_is_not() {
        let sessions = store();
        sessions.get_or_create("bob", "p1").await.unwrap();

        let abandoned = sessions
            .mark_terminal("bob", "p1", SessionVerdict::Abandoned)
            .await
            .unwrap();
        assert_eq!(abandoned.verdict, Some(SessionVerdict::Abandoned));

        let solved = sessions
            .mark_terminal("bob", "p1", SessionVerdict::Solved)
            .await
            .unwrap();
        assert_eq!(solved.verdict, Some(SessionVerdict::Solved));

        let again = sessions
            .mark_terminal("bob", "p1", SessionVerdict::Solved)
            .await;
        assert!(matches!(again, Err(CoachError::AlreadyTerminal)));

        let back = sessions
            .mark_terminal("bob", "p1", SessionVerdict::Abandoned)
            .await;
        assert!(matches!(back, Err(CoachError::AlreadyTerminal)));

        let stored = sessions.get("bob", "p1").await.unwrap().unwrap();
        assert_eq!(stored.verdict, Some(SessionVerdict::Solved));
    }

    #[tokio::test]
    async fn repeated_verdict_is_counted_once() {
        let sessions = store();
        sessions.get_or_create("frank", "p1").await.unwrap();
        let counter = SESSIONS_TOTAL.with_label_values(&["gave_up"]);

        let first = sessions
            .mark_terminal("frank", "p1", SessionVerdict::GaveUp)
            .await
            .unwrap();
        let after_first = counter.get();
        let again = sessions
            .mark_terminal("frank", "p1", SessionVerdict::GaveUp)
            .await
            .unwrap();

        assert_eq!(counter.get(), after_first);
        assert_eq!(again.version, first.version);
        assert_eq!(again.terminal_at, first.terminal_at);
    }

    #[tokio::test]
    async fn unlocks_survive_reopening_the_file_store() {
        let root = std::env::temp_dir().join(format!("dsa-coach-sessions-{}", uuid::Uuid::new_v4()));
        let at = Utc::now();
        {
            let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(&root).await.unwrap());
            let sessions = SessionStore::new(store, 4);
            sessions.get_or_create("gina", "p1").await.unwrap();
            sessions
                .record_unlock("gina", "p1", 1, HintKind::Clarifying, "What are the bounds?".into(), at)
                .await
                .unwrap();
        }

        let reopened: Arc<dyn DocumentStore> = Arc::new(FileStore::open(&root).await.unwrap());
        let sessions = SessionStore::new(reopened, 4);
        let session = sessions.get("gina", "p1").await.unwrap().unwrap();
        assert_eq!(session.unlocked_level(), 1);
        let unlock = session.unlock(1).unwrap();
        assert_eq!(unlock.text, "What are the bounds?");
        assert_eq!(unlock.unlocked_at, at);

        let replay = sessions
            .record_unlock("gina", "p1", 1, HintKind::Clarifying, "regenerated".into(), at)
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.session.unlock(1).unwrap().text, "What are the bounds?");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn record_unlock_is_ordered_and_idempotent() {
        let sessions = store();
        sessions.get_or_create("carol", "p1").await.unwrap();
        let now = Utc::now();

        let first = sessions
            .record_unlock("carol", "p1", 1, HintKind::Clarifying, "one".into(), now)
            .await
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.session.unlocked_level(), 1);

        let replay = sessions
            .record_unlock("carol", "p1", 1, HintKind::Clarifying, "different".into(), now)
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.session.unlock(1).unwrap().text, "one");

        let skip = sessions
            .record_unlock("carol", "p1", 3, HintKind::Structure, "three".into(), now)
            .await;
        assert!(matches!(
            skip,
            Err(CoachError::SkipNotAllowed {
                requested: 3,
                next: 2
            })
        ));
    }

    #[tokio::test]
    async fn failed_update_rolls_back() {
        let sessions = store();
        sessions.get_or_create("dave", "p1").await.unwrap();
        let before = sessions.get("dave", "p1").await.unwrap().unwrap();

        let result: Result<()> = sessions
            .update("dave", "p1", |session| {
                session.verdict = Some(SessionVerdict::GaveUp);
                Err(CoachError::Validation("rejected".into()))
            })
            .await;
        assert!(result.is_err());

        let after = sessions.get("dave", "p1").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn update_of_missing_session_is_not_found() {
        let sessions = store();
        let result = sessions
            .mark_terminal("erin", "missing", SessionVerdict::Solved)
            .await;
        assert!(matches!(result, Err(CoachError::NotFound(_))));
    }
}
