use std::sync::Arc;

use chrono::Utc;

use crate::error::{CoachError, Result};
use crate::metrics::{HINTS_SERVED_TOTAL, HINT_REQUESTS_REJECTED_TOTAL};
use crate::models::hint::{HintKind, HintSession, RequestHintRequest, RequestHintResponse};
use crate::models::Problem;
use crate::services::generation::{
    generate_tracked, GenerationPort, GenerationRequest, HintPrompt, ProblemBrief,
};
use crate::services::session_service::SessionStore;

/// What a request resolves to before anything is generated.
enum LadderStep {
    Replay(u8),
    Advance(u8),
}

pub struct HintLadder {
    sessions: SessionStore,
    generator: Arc<dyn GenerationPort>,
}

impl HintLadder {
    pub fn new(sessions: SessionStore, generator: Arc<dyn GenerationPort>) -> Self {
        Self {
            sessions,
            generator,
        }
    }

    pub async fn request_hint(
        &self,
        problem: &Problem,
        user_id: &str,
        req: &RequestHintRequest,
    ) -> Result<RequestHintResponse> {
        let result = self.resolve(problem, user_id, req).await;
        if let Err(e) = &result {
            HINT_REQUESTS_REJECTED_TOTAL
                .with_label_values(&[e.kind()])
                .inc();
            tracing::info!(
                user_id,
                problem_id = %problem.id,
                requested = ?req.level,
                error = %e,
                "Hint request rejected"
            );
        }
        result
    }

    async fn resolve(
        &self,
        problem: &Problem,
        user_id: &str,
        req: &RequestHintRequest,
    ) -> Result<RequestHintResponse> {
        let session = self.sessions.get_or_create(user_id, &problem.id).await?;

        let level = match plan(&session, req)? {
            LadderStep::Replay(level) => {
                HINTS_SERVED_TOTAL
                    .with_label_values(&[level.to_string().as_str(), "replay"])
                    .inc();
                tracing::debug!(user_id, problem_id = %problem.id, level, "Hint replayed");
                return respond(&session, level, true);
            }
            LadderStep::Advance(level) => level,
        };

        // Generation runs outside the session lock on a snapshot of the ladder.
        let kind = HintKind::for_level(level, session.total_levels);
        let prompt = GenerationRequest::Hint(HintPrompt {
            problem: ProblemBrief::from(problem),
            level,
            total_levels: session.total_levels,
            kind,
            previous_hints: session.previous_texts(),
            user_approach: req.user_approach.clone(),
        });
        let text = generate_tracked(self.generator.as_ref(), &prompt).await?;

        let commit = self
            .sessions
            .record_unlock(
                user_id,
                &problem.id,
                level,
                kind,
                text.into_string(),
                Utc::now(),
            )
            .await?;

        if commit.applied {
            HINTS_SERVED_TOTAL
                .with_label_values(&[level.to_string().as_str(), "generated"])
                .inc();
            tracing::info!(
                user_id,
                problem_id = %problem.id,
                level,
                kind = kind.as_str(),
                backend = self.generator.name(),
                "Hint unlocked"
            );
        } else {
            tracing::info!(
                user_id,
                problem_id = %problem.id,
                level,
                "Hint level unlocked concurrently, returning stored text"
            );
        }

        respond(&commit.session, level, !commit.applied)
    }
}

/// Decides replay or advance against the current session, rejecting requests
/// that skip levels, run past the end or reach the final level unconfirmed.
fn plan(session: &HintSession, req: &RequestHintRequest) -> Result<LadderStep> {
    let total = session.total_levels;
    let current = session.unlocked_level();

    let target = match req.level {
        Some(0) => return Err(CoachError::InvalidLevel { total }),
        Some(k) if k <= current => return Ok(LadderStep::Replay(k)),
        Some(k) if k > current + 1 => {
            return Err(CoachError::SkipNotAllowed {
                requested: k,
                next: current + 1,
            })
        }
        Some(k) => k,
        None => current + 1,
    };

    if target > total {
        return Err(CoachError::LadderExhausted { total });
    }
    if target == total && !req.confirm {
        return Err(CoachError::ConfirmationRequired { level: target });
    }
    Ok(LadderStep::Advance(target))
}

fn respond(session: &HintSession, level: u8, replayed: bool) -> Result<RequestHintResponse> {
    let hint = session
        .hint_level(level)
        .ok_or_else(|| CoachError::NotFound(format!("hint level {}", level)))?;
    let unlocked_level = session.unlocked_level();
    Ok(RequestHintResponse {
        hint,
        unlocked_level,
        total_levels: session.total_levels,
        next_available: unlocked_level < session.total_levels,
        replayed,
    })
}
