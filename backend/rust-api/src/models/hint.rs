use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// What a level is allowed to reveal, from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Clarifying,
    Direction,
    Structure,
    Implementation,
}

impl HintKind {
    /// Level 1 clarifies, level 2 points a direction, the final level helps
    /// with implementation and everything in between outlines structure.
    pub fn for_level(level: u8, total_levels: u8) -> Self {
        if level >= total_levels {
            HintKind::Implementation
        } else if level <= 1 {
            HintKind::Clarifying
        } else if level == 2 {
            HintKind::Direction
        } else {
            HintKind::Structure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HintKind::Clarifying => "clarifying",
            HintKind::Direction => "direction",
            HintKind::Structure => "structure",
            HintKind::Implementation => "implementation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintUnlock {
    pub level: u8,
    pub kind: HintKind,
    pub text: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVerdict {
    Solved,
    GaveUp,
    Abandoned,
}

impl SessionVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionVerdict::Solved => "solved",
            SessionVerdict::GaveUp => "gave_up",
            SessionVerdict::Abandoned => "abandoned",
        }
    }
}

/// Ladder progress of one user on one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintSession {
    pub user_id: String,
    pub problem_id: String,
    pub total_levels: u8,
    /// Unlocks in level order; `unlocks[i].level == i + 1`.
    pub unlocks: Vec<HintUnlock>,
    pub verdict: Option<SessionVerdict>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl HintSession {
    pub fn new(user_id: &str, problem_id: &str, total_levels: u8, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            problem_id: problem_id.to_string(),
            total_levels,
            unlocks: Vec::new(),
            verdict: None,
            terminal_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn unlocked_level(&self) -> u8 {
        self.unlocks.len() as u8
    }

    pub fn unlock(&self, level: u8) -> Option<&HintUnlock> {
        if level == 0 {
            return None;
        }
        self.unlocks.get(usize::from(level) - 1)
    }

    pub fn previous_texts(&self) -> Vec<String> {
        self.unlocks.iter().map(|u| u.text.clone()).collect()
    }

    pub fn is_solved(&self) -> bool {
        self.verdict == Some(SessionVerdict::Solved)
    }

    pub fn hint_level(&self, level: u8) -> Option<HintLevel> {
        self.unlock(level)
            .map(|unlock| HintLevel::from_unlock(unlock, self.total_levels))
    }
}

/// A single rung of the ladder as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintLevel {
    pub level: u8,
    pub total_levels: u8,
    pub kind: HintKind,
    pub text: String,
    pub reveal_adjacent: bool,
    pub unlocked_at: DateTime<Utc>,
}

impl HintLevel {
    pub fn from_unlock(unlock: &HintUnlock, total_levels: u8) -> Self {
        Self {
            level: unlock.level,
            total_levels,
            kind: unlock.kind,
            text: unlock.text.clone(),
            reveal_adjacent: unlock.level == total_levels,
            unlocked_at: unlock.unlocked_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RequestHintRequest {
    pub level: Option<u8>,

    pub confirm: bool,

    #[validate(length(max = 4000, message = "Approach must be at most 4000 characters"))]
    pub user_approach: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestHintResponse {
    pub hint: HintLevel,
    pub unlocked_level: u8,
    pub total_levels: u8,
    pub next_available: bool,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkTerminalRequest {
    pub verdict: SessionVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_kinds_follow_the_ladder() {
        assert_eq!(HintKind::for_level(1, 4), HintKind::Clarifying);
        assert_eq!(HintKind::for_level(2, 4), HintKind::Direction);
        assert_eq!(HintKind::for_level(3, 4), HintKind::Structure);
        assert_eq!(HintKind::for_level(4, 4), HintKind::Implementation);

        assert_eq!(HintKind::for_level(4, 6), HintKind::Structure);
        assert_eq!(HintKind::for_level(2, 2), HintKind::Implementation);
    }

    #[test]
    fn unlock_lookup_is_one_based() {
        let now = Utc::now();
        let mut session = HintSession::new("u", "p", 4, now);
        assert!(session.unlock(0).is_none());
        assert!(session.unlock(1).is_none());

        session.unlocks.push(HintUnlock {
            level: 1,
            kind: HintKind::Clarifying,
            text: "What are the inputs?".into(),
            unlocked_at: now,
        });
        assert_eq!(session.unlocked_level(), 1);
        assert_eq!(session.unlock(1).map(|u| u.level), Some(1));
        assert!(!session.hint_level(1).unwrap().reveal_adjacent);
    }
}
