use std::sync::Arc;

use chrono::Utc;

use crate::config::MasteryConfig;
use crate::error::{CoachError, Result};
use crate::models::{canonical_topic, Problem, RegisterProblemRequest};
use crate::services::store::{Collection, DocKey, DocumentStore, KeyedLocks};

pub const PROBLEMS_COLLECTION: &str = "problems";
const CATALOG_PARTITION: &str = "catalog";

#[derive(Clone)]
pub struct ProblemCatalog {
    problems: Collection<Problem>,
    locks: Arc<KeyedLocks>,
    topics: MasteryConfig,
}

impl ProblemCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, topics: MasteryConfig) -> Self {
        Self {
            problems: Collection::new(store, PROBLEMS_COLLECTION),
            locks: Arc::new(KeyedLocks::new()),
            topics,
        }
    }

    /// Registers a problem under its content-derived id. Registering the same
    /// statement again returns the stored problem unchanged.
    pub async fn register(&self, req: RegisterProblemRequest) -> Result<(Problem, bool)> {
        let mut topics = Vec::with_capacity(req.topics.len());
        for tag in &req.topics {
            let topic = canonical_topic(tag);
            if !self.topics.knows_topic(&topic) {
                return Err(CoachError::UnknownTopic(topic));
            }
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }

        let problem = Problem::new(
            req.title.trim().to_string(),
            req.statement,
            topics,
            req.difficulty,
            Utc::now(),
        );
        let key = DocKey::new(CATALOG_PARTITION, problem.id.clone());
        let _guard = self.locks.lock(&key.lock_key(PROBLEMS_COLLECTION)).await;

        if let Some(existing) = self.problems.find_one(&key).await? {
            tracing::debug!(problem_id = %existing.id, "Problem already registered");
            return Ok((existing, false));
        }

        self.problems.replace_one(&key, &problem).await?;
        tracing::info!(problem_id = %problem.id, title = %problem.title, topics = ?problem.topics, "Problem registered");
        Ok((problem, true))
    }

    pub async fn get(&self, problem_id: &str) -> Result<Problem> {
        self.problems
            .find_one(&DocKey::new(CATALOG_PARTITION, problem_id))
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("problem {}", problem_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::services::store::MemoryStore;

    fn catalog() -> ProblemCatalog {
        ProblemCatalog::new(Arc::new(MemoryStore::new()), MasteryConfig::default())
    }

    fn request(statement: &str, topics: &[&str]) -> RegisterProblemRequest {
        RegisterProblemRequest {
            title: " Two Sum ".into(),
            statement: statement.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            difficulty: Difficulty::Easy,
        }
    }

    #[tokio::test]
    async fn same_statement_resolves_to_same_problem() {
        let catalog = catalog();
        let (first, created) = catalog
            .register(request("Find two numbers that add to target.", &["Arrays", "hash_tables"]))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.title, "Two Sum");
        assert_eq!(first.topics, vec!["arrays", "hash-tables"]);

        let (second, created) = catalog
            .register(request("  find two numbers that add   to TARGET. ", &["arrays"]))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second, first);
        assert_eq!(catalog.get(&first.id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn concurrent_registration_creates_once() {
        let catalog = catalog();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    catalog
                        .register(request("Merge two sorted linked lists into one.", &["linked lists"]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let stored = catalog.get(&results[0].0.id).await.unwrap();
        assert!(results.iter().all(|(p, _)| p.created_at == stored.created_at));
    }

    #[tokio::test]
    async fn unknown_topics_and_ids_are_rejected() {
        let catalog = catalog();
        let err = catalog
            .register(request("Count the stars in the sky tonight.", &["astrology"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::UnknownTopic(_)));
        assert!(matches!(
            catalog.get("deadbeef").await,
            Err(CoachError::NotFound(_))
        ));
    }
}
