use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::services::generation::{FallbackGenerator, GeminiGenerator, GenerationPort};
use crate::services::store::{DocumentStore, FileStore, MemoryStore};

use attempt_service::AttemptService;
use hint_service::HintLadder;
use mastery_service::MasteryTracker;
use practice_service::PracticeService;
use problem_catalog::ProblemCatalog;
use profile_service::ProfileStore;
use session_service::SessionStore;

pub mod achievements;
pub mod attempt_service;
pub mod generation;
pub mod hint_service;
pub mod mastery_service;
pub mod practice_service;
pub mod problem_catalog;
pub mod profile_service;
pub mod session_service;
pub mod store;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn GenerationPort>,
    pub catalog: ProblemCatalog,
    pub profiles: ProfileStore,
    pub sessions: SessionStore,
    pub ladder: HintLadder,
    pub tracker: MasteryTracker,
    pub attempts: AttemptService,
    pub practice: PracticeService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.storage.backend {
            StorageBackend::File => Arc::new(FileStore::open(&config.storage.data_dir).await?),
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; progress is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let generator: Arc<dyn GenerationPort> = match GeminiGenerator::from_config(&config.gemini)? {
            Some(gemini) => {
                tracing::info!(model = %config.gemini.model, "Gemini generation backend configured");
                Arc::new(gemini)
            }
            None => {
                tracing::warn!("No Gemini API key configured, serving static fallback hints");
                Arc::new(FallbackGenerator)
            }
        };

        Ok(Self::with_parts(config, store, generator))
    }

    /// Wires services over an existing store and generator.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn GenerationPort>,
    ) -> Self {
        let catalog = ProblemCatalog::new(store.clone(), config.mastery.clone());
        let profiles = ProfileStore::new(store.clone(), config.mastery.clone());
        let sessions = SessionStore::new(store.clone(), config.hints.levels);
        let tracker = MasteryTracker::new(store.clone(), config.mastery.clone());

        Self {
            ladder: HintLadder::new(sessions.clone(), generator.clone()),
            attempts: AttemptService::new(catalog.clone(), sessions.clone(), tracker.clone()),
            practice: PracticeService::new(
                store.clone(),
                &config.practice,
                catalog.clone(),
                profiles.clone(),
                generator.clone(),
            ),
            config,
            store,
            generator,
            catalog,
            profiles,
            sessions,
            tracker,
        }
    }
}
