use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::models::canonical_topic;

pub const DEFAULT_TOPICS: &[&str] = &[
    "arrays",
    "strings",
    "hash-tables",
    "linked-lists",
    "stacks",
    "queues",
    "trees",
    "graphs",
    "heaps",
    "sorting",
    "searching",
    "two-pointers",
    "sliding-window",
    "recursion",
    "backtracking",
    "dynamic-programming",
    "greedy",
    "bit-manipulation",
    "math",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub hints: HintConfig,
    pub mastery: MasteryConfig,
    pub practice: PracticeConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HintConfig {
    /// Ladder length N. The last level is reveal-adjacent.
    pub levels: u8,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self { levels: 4 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    pub alpha: f64,
    pub initial_rate: f64,
    pub topics: Vec<String>,
    /// How far past the server clock a client-supplied `completed_at` may be.
    pub max_clock_skew_secs: u32,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            initial_rate: 0.5,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            max_clock_skew_secs: 300,
        }
    }
}

impl MasteryConfig {
    pub fn knows_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// Per-user retention of generated practice material. Older entries are
/// pruned on write.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub review_history: usize,
    pub variation_history: usize,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            review_history: 100,
            variation_history: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 20,
            max_retries: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("mastery.topics"),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;

        if cfg.gemini.api_key.is_none() {
            cfg.gemini.api_key = env::var("GOOGLE_API_KEY")
                .or_else(|_| env::var("GEMINI_API_KEY"))
                .ok()
                .filter(|key| !key.trim().is_empty());
        }

        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Canonicalize and deduplicate topic tags.
    pub fn normalize(&mut self) {
        let mut topics: Vec<String> = self
            .mastery
            .topics
            .iter()
            .map(|t| canonical_topic(t))
            .filter(|t| !t.is_empty())
            .collect();
        topics.sort();
        topics.dedup();
        self.mastery.topics = topics;
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(2..=10).contains(&self.hints.levels) {
            return Err(config::ConfigError::Message(format!(
                "hints.levels must be between 2 and 10, got {}",
                self.hints.levels
            )));
        }
        if !(self.mastery.alpha > 0.0 && self.mastery.alpha <= 1.0) {
            return Err(config::ConfigError::Message(format!(
                "mastery.alpha must be in (0, 1], got {}",
                self.mastery.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.mastery.initial_rate) {
            return Err(config::ConfigError::Message(format!(
                "mastery.initial_rate must be in [0, 1], got {}",
                self.mastery.initial_rate
            )));
        }
        if self.mastery.topics.is_empty() {
            return Err(config::ConfigError::Message(
                "mastery.topics must list at least one topic".to_string(),
            ));
        }
        if self.practice.review_history == 0 || self.practice.variation_history == 0 {
            return Err(config::ConfigError::Message(
                "practice history limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = Config::default();
        cfg.normalize();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.hints.levels, 4);
        assert!((cfg.mastery.alpha - 0.2).abs() < f64::EPSILON);
        assert!(cfg.mastery.knows_topic("dynamic-programming"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.mastery.alpha = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.hints.levels = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.mastery.initial_rate = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.practice.review_history = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn normalize_canonicalizes_topics() {
        let mut cfg = Config::default();
        cfg.mastery.topics = vec!["Graphs".into(), "graphs".into(), "Two Pointers".into()];
        cfg.normalize();
        assert_eq!(cfg.mastery.topics, vec!["graphs", "two-pointers"]);
    }
}
