use std::sync::Arc;

use chrono::Utc;

use crate::config::MasteryConfig;
use crate::error::{CoachError, Result};
use crate::models::canonical_topic;
use crate::models::practice::{UpdateProfileRequest, UserProfile};
use crate::services::store::{Collection, DocKey, DocumentStore, KeyedLocks};

pub const PROFILES_COLLECTION: &str = "profiles";
const PROFILE_ID: &str = "profile";

#[derive(Clone)]
pub struct ProfileStore {
    profiles: Collection<UserProfile>,
    locks: Arc<KeyedLocks>,
    topics: MasteryConfig,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn DocumentStore>, topics: MasteryConfig) -> Self {
        Self {
            profiles: Collection::new(store, PROFILES_COLLECTION),
            locks: Arc::new(KeyedLocks::new()),
            topics,
        }
    }

    fn key(user_id: &str) -> DocKey {
        DocKey::new(user_id, PROFILE_ID)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.find_one(&Self::key(user_id)).await?)
    }

    /// Creates or replaces the profile, keeping the original `created_at`.
    pub async fn upsert(&self, user_id: &str, req: UpdateProfileRequest) -> Result<UserProfile> {
        let mut focus_areas = Vec::with_capacity(req.focus_areas.len());
        for tag in &req.focus_areas {
            let topic = canonical_topic(tag);
            if !self.topics.knows_topic(&topic) {
                return Err(CoachError::UnknownTopic(topic));
            }
            if !focus_areas.contains(&topic) {
                focus_areas.push(topic);
            }
        }

        let key = Self::key(user_id);
        let _guard = self.locks.lock(&key.lock_key(PROFILES_COLLECTION)).await;
        let now = Utc::now();
        let created_at = self
            .profiles
            .find_one(&key)
            .await?
            .map_or(now, |existing| existing.created_at);

        let profile = UserProfile {
            user_id: user_id.to_string(),
            skill_level: req.skill_level,
            target_goal: req.target_goal,
            daily_goal: req.daily_goal,
            focus_areas,
            created_at,
            updated_at: now,
        };
        self.profiles.replace_one(&key, &profile).await?;
        tracing::info!(user_id, skill_level = profile.skill_level.as_str(), "Profile updated");
        Ok(profile)
    }
}
