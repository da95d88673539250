use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::config::PracticeConfig;
use crate::error::Result;
use crate::models::practice::{CodeReviewRecord, VariationRecord};
use crate::models::{CodeReviewRequest, VariationRequest};
use crate::services::generation::{
    generate_tracked, GenerationPort, GenerationRequest, ProblemBrief, ReviewPrompt,
    VariationPrompt,
};
use crate::services::problem_catalog::ProblemCatalog;
use crate::services::profile_service::ProfileStore;
use crate::services::store::{Collection, DocKey, DocumentStore};

pub const REVIEWS_COLLECTION: &str = "code_reviews";
pub const VARIATIONS_COLLECTION: &str = "variations";

static HISTORY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Ids sort by creation time, then by a process-wide sequence for entries in
/// the same millisecond, so the store's id order is history order.
fn history_id(at: DateTime<Utc>) -> String {
    format!(
        "{:020}-{:012}-{}",
        at.timestamp_millis().max(0),
        HISTORY_SEQ.fetch_add(1, Ordering::Relaxed),
        Uuid::new_v4().simple()
    )
}

/// Bounded per-user history over one collection.
struct History<T> {
    docs: Collection<T>,
    retain: usize,
}

impl<T: Serialize + DeserializeOwned> History<T> {
    async fn append(&self, user_id: &str, id: &str, doc: &T) -> Result<()> {
        self.docs.replace_one(&DocKey::new(user_id, id), doc).await?;

        let ids = self.docs.ids(user_id).await?;
        let excess = ids.len().saturating_sub(self.retain);
        for old in &ids[..excess] {
            self.docs.delete_one(&DocKey::new(user_id, old.as_str())).await?;
        }
        if excess > 0 {
            tracing::debug!(user_id, collection = self.docs.name(), pruned = excess, "History pruned");
        }
        Ok(())
    }

    /// Newest first.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<T>> {
        let ids = self.docs.ids(user_id).await?;
        let mut docs = Vec::new();
        for id in ids.iter().rev().take(limit) {
            if let Some(doc) = self.docs.find_one(&DocKey::new(user_id, id.as_str())).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}

/// Problem variations and code reviews, generated through the port and kept
/// per user.
pub struct PracticeService {
    catalog: ProblemCatalog,
    profiles: ProfileStore,
    generator: Arc<dyn GenerationPort>,
    reviews: History<CodeReviewRecord>,
    variations: History<VariationRecord>,
}

impl PracticeService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: &PracticeConfig,
        catalog: ProblemCatalog,
        profiles: ProfileStore,
        generator: Arc<dyn GenerationPort>,
    ) -> Self {
        Self {
            catalog,
            profiles,
            generator,
            reviews: History {
                docs: Collection::new(store.clone(), REVIEWS_COLLECTION),
                retain: config.review_history,
            },
            variations: History {
                docs: Collection::new(store, VARIATIONS_COLLECTION),
                retain: config.variation_history,
            },
        }
    }

    pub async fn variations(
        &self,
        user_id: &str,
        problem_id: &str,
        req: VariationRequest,
    ) -> Result<VariationRecord> {
        let problem = self.catalog.get(problem_id).await?;
        let learner_level = self.profiles.get(user_id).await?.map(|p| p.skill_level);
        let request = GenerationRequest::Variation(VariationPrompt {
            problem: ProblemBrief::from(&problem),
            count: req.count,
            context_options: req.context_options.clone(),
            learner_level,
        });
        let text = generate_tracked(self.generator.as_ref(), &request).await?;

        let created_at = Utc::now();
        let record = VariationRecord {
            id: history_id(created_at),
            user_id: user_id.to_string(),
            problem_id: problem.id,
            problem_title: problem.title,
            count: req.count,
            context_options: req.context_options,
            text: text.into_string(),
            created_at,
        };
        self.variations.append(user_id, &record.id, &record).await?;
        tracing::info!(user_id, problem_id, variation_id = %record.id, "Variations stored");
        Ok(record)
    }

    pub async fn review(&self, user_id: &str, req: CodeReviewRequest) -> Result<CodeReviewRecord> {
        let problem = match req.problem_id.as_deref() {
            Some(id) => Some(ProblemBrief::from(&self.catalog.get(id).await?)),
            None => None,
        };
        let learner_level = self.profiles.get(user_id).await?.map(|p| p.skill_level);
        let code_length = req.code.chars().count();
        let request = GenerationRequest::Review(ReviewPrompt {
            code: req.code,
            language: req.language.clone(),
            problem,
            focus_aspects: req.focus_aspects.clone(),
            learner_level,
        });
        let text = generate_tracked(self.generator.as_ref(), &request).await?;

        let created_at = Utc::now();
        let record = CodeReviewRecord {
            id: history_id(created_at),
            user_id: user_id.to_string(),
            language: req.language,
            problem_id: req.problem_id,
            code_length,
            focus_aspects: req.focus_aspects,
            review: text.into_string(),
            created_at,
        };
        self.reviews.append(user_id, &record.id, &record).await?;
        tracing::info!(user_id, review_id = %record.id, language = %record.language, "Code review stored");
        Ok(record)
    }

    pub async fn recent_reviews(&self, user_id: &str, limit: usize) -> Result<Vec<CodeReviewRecord>> {
        self.reviews.recent(user_id, limit).await
    }

    pub async fn recent_variations(&self, user_id: &str, limit: usize) -> Result<Vec<VariationRecord>> {
        self.variations.recent(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasteryConfig;
    use crate::error::{CoachError, GenerationFailure};
    use crate::models::practice::{SkillLevel, TargetGoal, UpdateProfileRequest};
    use crate::models::{Difficulty, RegisterProblemRequest};
    use crate::services::generation::GeneratedText;
    use crate::services::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the prompt it was given.
    #[derive(Default)]
    struct PromptEcho {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationPort for PromptEcho {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<GeneratedText, GenerationFailure> {
            let prompt = crate::services::generation::build_prompt(request);
            self.prompts.lock().unwrap().push(prompt.clone());
            GeneratedText::sanitize(&prompt)
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct Fixture {
        service: PracticeService,
        catalog: ProblemCatalog,
        profiles: ProfileStore,
        generator: Arc<PromptEcho>,
    }

    fn fixture(review_history: usize) -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let catalog = ProblemCatalog::new(store.clone(), MasteryConfig::default());
        let profiles = ProfileStore::new(store.clone(), MasteryConfig::default());
        let generator = Arc::new(PromptEcho::default());
        let config = PracticeConfig {
            review_history,
            variation_history: 50,
        };
        Fixture {
            service: PracticeService::new(
                store,
                &config,
                catalog.clone(),
                profiles.clone(),
                generator.clone(),
            ),
            catalog,
            profiles,
            generator,
        }
    }

    fn review_request(language: &str) -> CodeReviewRequest {
        CodeReviewRequest {
            code: "def solve(): pass".into(),
            language: language.into(),
            problem_id: None,
            focus_aspects: vec!["complexity".into()],
        }
    }

    #[tokio::test]
    async fn reviews_are_kept_newest_first_and_pruned() {
        let f = fixture(2);
        for language in ["python", "rust", "go"] {
            f.service.review("u1", review_request(language)).await.unwrap();
        }

        let recent = f.service.recent_reviews("u1", 10).await.unwrap();
        let languages: Vec<_> = recent.iter().map(|r| r.language.as_str()).collect();
        assert_eq!(languages, vec!["go", "rust"]);
        assert_eq!(recent[0].code_length, 17);
        assert!(f.service.recent_reviews("someone-else", 10).await.unwrap().is_empty());
        assert_eq!(f.service.recent_reviews("u1", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn variations_use_profile_level_and_are_stored() {
        let f = fixture(10);
        let (problem, _) = f
            .catalog
            .register(RegisterProblemRequest {
                title: "Climbing Stairs".into(),
                statement: "Count the distinct ways to climb n stairs taking 1 or 2 steps.".into(),
                topics: vec!["dynamic programming".into()],
                difficulty: Difficulty::Easy,
            })
            .await
            .unwrap();
        f.profiles
            .upsert(
                "u1",
                UpdateProfileRequest {
                    skill_level: SkillLevel::Intermediate,
                    target_goal: TargetGoal::CompetitiveProgramming,
                    daily_goal: 3,
                    focus_areas: vec![],
                },
            )
            .await
            .unwrap();

        let record = f
            .service
            .variations(
                "u1",
                &problem.id,
                VariationRequest {
                    count: 2,
                    context_options: vec!["sports".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(record.problem_title, "Climbing Stairs");
        assert!(f.generator.prompts.lock().unwrap()[0].contains("intermediate learner"));
        assert_eq!(
            f.service.recent_variations("u1", 10).await.unwrap(),
            vec![record]
        );

        let missing = f
            .service
            .variations(
                "u1",
                "missing",
                VariationRequest {
                    count: 1,
                    context_options: vec![],
                },
            )
            .await;
        assert!(matches!(missing, Err(CoachError::NotFound(_))));
    }
}
