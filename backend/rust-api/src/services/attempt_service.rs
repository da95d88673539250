use chrono::Utc;
use uuid::Uuid;

use crate::error::{CoachError, Result};
use crate::models::attempt::{Attempt, SubmitAttemptRequest, SubmitAttemptResponse};
use crate::models::hint::SessionVerdict;
use crate::services::mastery_service::MasteryTracker;
use crate::services::problem_catalog::ProblemCatalog;
use crate::services::session_service::SessionStore;

/// Turns a graded submission into an `Attempt`, feeds it to the tracker and
/// closes the hint session when the answer was correct.
pub struct AttemptService {
    catalog: ProblemCatalog,
    sessions: SessionStore,
    tracker: MasteryTracker,
}

impl AttemptService {
    pub fn new(catalog: ProblemCatalog, sessions: SessionStore, tracker: MasteryTracker) -> Self {
        Self {
            catalog,
            sessions,
            tracker,
        }
    }

    pub async fn submit(&self, user_id: &str, req: SubmitAttemptRequest) -> Result<SubmitAttemptResponse> {
        let problem = self.catalog.get(&req.problem_id).await?;
        let session = self.sessions.get(user_id, &problem.id).await?;
        let completed_at = req.completed_at.unwrap_or_else(Utc::now);

        let attempt = Attempt {
            id: req
                .attempt_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: user_id.to_string(),
            problem_id: problem.id.clone(),
            correct: req.correct,
            topics: problem.topics.clone(),
            hints_used: session.as_ref().map_or(0, |s| s.unlocked_level()),
            elapsed_secs: session
                .as_ref()
                .map(|s| (completed_at - s.created_at).num_seconds().max(0)),
            completed_at,
        };

        let outcome = self.tracker.ingest(attempt.clone()).await?;

        // Duplicates still close the session: the earlier submission may have
        // been ingested before closing it failed.
        let mut session_verdict = session.as_ref().and_then(|s| s.verdict);
        if req.correct && session.as_ref().is_some_and(|s| !s.is_solved()) {
            match self
                .sessions
                .mark_terminal(user_id, &problem.id, SessionVerdict::Solved)
                .await
            {
                Ok(closed) => session_verdict = closed.verdict,
                Err(CoachError::AlreadyTerminal) => session_verdict = Some(SessionVerdict::Solved),
                Err(e) => return Err(e),
            }
        }

        Ok(SubmitAttemptResponse {
            attempt,
            updated_records: outcome.updated_records,
            newly_unlocked: outcome.newly_unlocked,
            duplicate: outcome.duplicate,
            session_verdict,
        })
    }
}
