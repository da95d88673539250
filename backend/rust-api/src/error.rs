//! Error types shared by the hint ladder, session store and mastery tracker.
//!
//! Every variant is recoverable at the HTTP boundary. Only generation and
//! storage failures are worth retrying with the same request.

use chrono::{DateTime, Utc};

use crate::services::store::StoreError;

pub type Result<T> = std::result::Result<T, CoachError>;

#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    /// Requested a level more than one step past the unlocked one.
    #[error("hint level {requested} cannot be unlocked before level {next}")]
    SkipNotAllowed { requested: u8, next: u8 },

    #[error("all {total} hint levels are already unlocked")]
    LadderExhausted { total: u8 },

    /// The final level borders a full solution and needs an explicit confirm.
    #[error("hint level {level} reveals most of the solution; resend with confirm=true")]
    ConfirmationRequired { level: u8 },

    #[error("session is already marked solved")]
    AlreadyTerminal,

    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("generation unavailable: {0}")]
    GenerationUnavailable(#[from] GenerationFailure),

    #[error("{0} not found")]
    NotFound(String),

    #[error("hint level must be between 1 and {total}")]
    InvalidLevel { total: u8 },

    #[error("attempt completed at {completed_at} precedes last ingested attempt at {last_ingested}")]
    OutOfOrder {
        completed_at: DateTime<Utc>,
        last_ingested: DateTime<Utc>,
    },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CoachError {
    /// Stable machine-readable kind, used in HTTP bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CoachError::SkipNotAllowed { .. } => "skip_not_allowed",
            CoachError::LadderExhausted { .. } => "ladder_exhausted",
            CoachError::ConfirmationRequired { .. } => "confirmation_required",
            CoachError::AlreadyTerminal => "already_terminal",
            CoachError::UnknownTopic(_) => "unknown_topic",
            CoachError::GenerationUnavailable(_) => "generation_unavailable",
            CoachError::NotFound(_) => "not_found",
            CoachError::InvalidLevel { .. } => "invalid_level",
            CoachError::OutOfOrder { .. } => "out_of_order",
            CoachError::Validation(_) => "validation",
            CoachError::Storage(_) => "storage",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoachError::GenerationUnavailable(_) | CoachError::Storage(_)
        )
    }
}

/// Structured failure of the AI generation port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationFailure {
    #[error("generation backend timed out")]
    Timeout,

    #[error("generation quota exhausted")]
    QuotaExceeded,

    #[error("generation backend returned status {0}")]
    Upstream(u16),

    #[error("could not reach generation backend: {0}")]
    Transport(String),

    #[error("generation backend returned a malformed response: {0}")]
    Malformed(String),

    #[error("generation backend returned empty text")]
    Empty,

    #[error("generation backend is not configured")]
    NotConfigured,
}

impl GenerationFailure {
    /// Failures that a second attempt against the same backend might fix.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationFailure::Timeout
            | GenerationFailure::QuotaExceeded
            | GenerationFailure::Transport(_) => true,
            GenerationFailure::Upstream(status) => *status >= 500,
            _ => false,
        }
    }
}
