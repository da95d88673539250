//! AI generation port.
//!
//! The core only sees `GenerationPort::generate`, which returns either
//! sanitized text or a structured `GenerationFailure`. Nothing downstream
//! trusts the raw shape of a model response.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::config::GeminiConfig;
use crate::error::GenerationFailure;
use crate::metrics::{GENERATION_CALLS_TOTAL, GENERATION_DURATION_SECONDS};
use crate::models::hint::HintKind;
use crate::models::practice::SkillLevel;
use crate::models::Problem;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const MAX_GENERATED_CHARS: usize = 8000;

const COACH_PREAMBLE: &str = "You are a data structures and algorithms coach. \
Guide the learner toward discovering the solution on their own. \
Prefer questions and direction over finished answers, and stay consistent with earlier guidance.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Hint,
    Variation,
    Review,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Hint => "hint",
            GenerationKind::Variation => "variation",
            GenerationKind::Review => "review",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProblemBrief {
    pub title: String,
    pub statement: String,
    pub topics: Vec<String>,
}

impl From<&Problem> for ProblemBrief {
    fn from(problem: &Problem) -> Self {
        Self {
            title: problem.title.clone(),
            statement: problem.statement.clone(),
            topics: problem.topics.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HintPrompt {
    pub problem: ProblemBrief,
    pub level: u8,
    pub total_levels: u8,
    pub kind: HintKind,
    /// Texts of levels 1..level-1, in order.
    pub previous_hints: Vec<String>,
    pub user_approach: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationPrompt {
    pub problem: ProblemBrief,
    pub count: u8,
    pub context_options: Vec<String>,
    pub learner_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPrompt {
    pub code: String,
    pub language: String,
    pub problem: Option<ProblemBrief>,
    pub focus_aspects: Vec<String>,
    pub learner_level: Option<SkillLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Hint(HintPrompt),
    Variation(VariationPrompt),
    Review(ReviewPrompt),
}

impl GenerationRequest {
    pub fn kind(&self) -> GenerationKind {
        match self {
            GenerationRequest::Hint(_) => GenerationKind::Hint,
            GenerationRequest::Variation(_) => GenerationKind::Variation,
            GenerationRequest::Review(_) => GenerationKind::Review,
        }
    }
}

/// Text that passed sanitization and is safe to cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText(String);

impl GeneratedText {
    /// Strips control characters (keeping newlines and tabs), trims, caps the
    /// length and rejects empty output.
    pub fn sanitize(raw: &str) -> Result<Self, GenerationFailure> {
        let cleaned: String = raw
            .chars()
            .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
            .collect();
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            return Err(GenerationFailure::Empty);
        }
        Ok(Self(trimmed.chars().take(MAX_GENERATED_CHARS).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedText, GenerationFailure>;

    fn name(&self) -> &'static str;
}

/// Calls the port and records latency and outcome.
pub async fn generate_tracked(
    port: &dyn GenerationPort,
    request: &GenerationRequest,
) -> Result<GeneratedText, GenerationFailure> {
    let kind = request.kind().as_str();
    let start = Instant::now();
    let result = port.generate(request).await;

    GENERATION_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(start.elapsed().as_secs_f64());

    match &result {
        Ok(text) => {
            GENERATION_CALLS_TOTAL
                .with_label_values(&[kind, "success"])
                .inc();
            tracing::debug!(kind, backend = port.name(), chars = text.as_str().len(), "Generated text");
        }
        Err(failure) => {
            GENERATION_CALLS_TOTAL
                .with_label_values(&[kind, "failure"])
                .inc();
            tracing::warn!(kind, backend = port.name(), error = %failure, "Generation failed");
        }
    }
    result
}

pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::from(COACH_PREAMBLE);
    prompt.push_str("\n\n");

    match request {
        GenerationRequest::Hint(hint) => {
            push_problem(&mut prompt, &hint.problem);
            prompt.push_str(&format!(
                "Write hint {} of {} ({}).\n",
                hint.level,
                hint.total_levels,
                hint.kind.as_str()
            ));
            prompt.push_str(match hint.kind {
                HintKind::Clarifying => {
                    "Ask two or three questions about inputs, constraints and edge cases. Do not name an algorithm.\n"
                }
                HintKind::Direction => {
                    "Suggest the family of algorithm or data structure that fits and why. No implementation details.\n"
                }
                HintKind::Structure => {
                    "Outline the high-level steps and the state each step keeps. No code.\n"
                }
                HintKind::Implementation => {
                    "Give concrete implementation guidance with pseudocode for the tricky parts and common pitfalls.\n"
                }
            });
            if !hint.previous_hints.is_empty() {
                prompt.push_str("\nHints already given (build on them, never contradict them):\n");
                for (i, text) in hint.previous_hints.iter().enumerate() {
                    prompt.push_str(&format!("{}. {}\n", i + 1, text));
                }
            }
            if let Some(approach) = hint.user_approach.as_deref().filter(|a| !a.trim().is_empty()) {
                prompt.push_str(&format!("\nLearner's current approach: {}\n", approach.trim()));
            }
        }
        GenerationRequest::Variation(variation) => {
            push_problem(&mut prompt, &variation.problem);
            prompt.push_str(&format!(
                "Write {} variations of this problem that exercise the same core concept in a new setting.\n",
                variation.count
            ));
            if !variation.context_options.is_empty() {
                prompt.push_str(&format!(
                    "Preferred settings: {}\n",
                    variation.context_options.join(", ")
                ));
            }
            push_learner_level(&mut prompt, variation.learner_level);
        }
        GenerationRequest::Review(review) => {
            if let Some(problem) = &review.problem {
                push_problem(&mut prompt, problem);
            }
            prompt.push_str(&format!(
                "Review this {} solution for correctness, complexity and style.\n",
                review.language
            ));
            if !review.focus_aspects.is_empty() {
                prompt.push_str(&format!("Focus on: {}\n", review.focus_aspects.join(", ")));
            }
            push_learner_level(&mut prompt, review.learner_level);
            prompt.push_str("\n```\n");
            prompt.push_str(&review.code);
            prompt.push_str("\n```\n");
        }
    }
    prompt
}

fn push_learner_level(prompt: &mut String, level: Option<SkillLevel>) {
    if let Some(level) = level {
        prompt.push_str(&format!("Pitch it at a {} learner.\n", level.as_str()));
    }
}

fn push_problem(prompt: &mut String, problem: &ProblemBrief) {
    prompt.push_str(&format!("Problem: {}\n{}\n", problem.title, problem.statement));
    if !problem.topics.is_empty() {
        prompt.push_str(&format!("Topics: {}\n", problem.topics.join(", ")));
    }
    prompt.push('\n');
}

/// Google Gemini `generateContent` over HTTP.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryConfig,
}

impl GeminiGenerator {
    /// `None` when no API key is configured.
    pub fn from_config(cfg: &GeminiConfig) -> Result<Option<Self>, reqwest::Error> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Some(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            retry: RetryConfig::with_attempts(cfg.max_retries),
        }))
    }

    async fn call_once(&self, prompt: &str) -> Result<GeneratedText, GenerationFailure> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.7,
                "topP": 0.8,
                "topK": 40,
                "maxOutputTokens": 2048
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationFailure::Timeout
                } else {
                    GenerationFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationFailure::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(GenerationFailure::Upstream(status.as_u16()));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationFailure::Malformed(e.to_string()))?;

        let text = extract_candidate_text(&payload)?;
        GeneratedText::sanitize(&text)
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_candidate_text(payload: &serde_json::Value) -> Result<String, GenerationFailure> {
    let parts = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    match parts {
        Some(parts) => Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")),
        None => {
            let reason = payload
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
                .map(|r| format!("blocked: {}", r))
                .unwrap_or_else(|| "no candidates in response".to_string());
            Err(GenerationFailure::Malformed(reason))
        }
    }
}

#[async_trait]
impl GenerationPort for GeminiGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, GenerationFailure> {
        let prompt = build_prompt(request);
        retry_async_with_config(
            self.retry.clone(),
            GenerationFailure::is_transient,
            || self.call_once(&prompt),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Canned hints used when no model is configured. Variations and reviews
/// have no sensible static form and report `NotConfigured`.
pub struct FallbackGenerator;

impl FallbackGenerator {
    fn hint_text(kind: HintKind) -> &'static str {
        match kind {
            HintKind::Clarifying => {
                "Start by pinning down the problem. What exactly are the inputs and the expected output? Which constraints matter, and what edge cases could break a naive approach?"
            }
            HintKind::Direction => {
                "Think about which data structure or algorithm family makes the expensive step cheap. What time complexity do the constraints allow?"
            }
            HintKind::Structure => {
                "Split the solution into phases. What does each phase compute, and what state must carry over from one phase to the next?"
            }
            HintKind::Implementation => {
                "Implement one phase at a time. Get the core loop right on a small example first, then add the edge cases you listed earlier."
            }
        }
    }
}

#[async_trait]
impl GenerationPort for FallbackGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, GenerationFailure> {
        match request {
            GenerationRequest::Hint(hint) => GeneratedText::sanitize(Self::hint_text(hint.kind)),
            _ => Err(GenerationFailure::NotConfigured),
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> ProblemBrief {
        ProblemBrief {
            title: "Two Sum".into(),
            statement: "Return indices of two numbers adding up to target.".into(),
            topics: vec!["arrays".into(), "hash-tables".into()],
        }
    }

    #[test]
    fn sanitize_strips_control_characters_and_trims() {
        let text = GeneratedText::sanitize("  \u{0007}Think about\u{0000} pairs.\n\tWhy?  ").unwrap();
        assert_eq!(text.as_str(), "Think about pairs.\n\tWhy?");
    }

    #[test]
    fn sanitize_rejects_blank_output() {
        assert_eq!(
            GeneratedText::sanitize(" \n\u{0001} "),
            Err(GenerationFailure::Empty)
        );
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(MAX_GENERATED_CHARS + 50);
        let text = GeneratedText::sanitize(&long).unwrap();
        assert_eq!(text.as_str().chars().count(), MAX_GENERATED_CHARS);
    }

    #[test]
    fn hint_prompt_carries_previous_hints_in_order() {
        let request = GenerationRequest::Hint(HintPrompt {
            problem: brief(),
            level: 3,
            total_levels: 4,
            kind: HintKind::Structure,
            previous_hints: vec!["What is the target?".into(), "Consider a hash map.".into()],
            user_approach: Some("nested loops".into()),
        });
        let prompt = build_prompt(&request);
        let first = prompt.find("1. What is the target?").unwrap();
        let second = prompt.find("2. Consider a hash map.").unwrap();
        assert!(first < second);
        assert!(prompt.contains("hint 3 of 4 (structure)"));
        assert!(prompt.contains("nested loops"));
    }

    #[test]
    fn practice_prompts_mention_learner_level() {
        let request = GenerationRequest::Variation(VariationPrompt {
            problem: brief(),
            count: 2,
            context_options: vec!["games".into()],
            learner_level: Some(SkillLevel::Advanced),
        });
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Write 2 variations"));
        assert!(prompt.contains("Preferred settings: games"));
        assert!(prompt.contains("advanced learner"));

        let review = GenerationRequest::Review(ReviewPrompt {
            code: "print(1)".into(),
            language: "python".into(),
            problem: None,
            focus_aspects: vec![],
            learner_level: None,
        });
        assert!(!build_prompt(&review).contains("learner."));
    }

    #[test]
    fn extracts_text_from_candidate_parts() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Ask " }, { "text": "questions." }] } }]
        });
        assert_eq!(extract_candidate_text(&payload).unwrap(), "Ask questions.");

        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(
            extract_candidate_text(&blocked),
            Err(GenerationFailure::Malformed("blocked: SAFETY".into()))
        );
    }

    #[tokio::test]
    async fn fallback_serves_hints_only() {
        let hint = GenerationRequest::Hint(HintPrompt {
            problem: brief(),
            level: 1,
            total_levels: 4,
            kind: HintKind::Clarifying,
            previous_hints: vec![],
            user_approach: None,
        });
        assert!(FallbackGenerator.generate(&hint).await.is_ok());

        let review = GenerationRequest::Review(ReviewPrompt {
            code: "fn main() {}".into(),
            language: "rust".into(),
            problem: None,
            focus_aspects: vec![],
            learner_level: None,
        });
        assert_eq!(
            FallbackGenerator.generate(&review).await,
            Err(GenerationFailure::NotConfigured)
        );
    }

    #[test]
    fn no_api_key_means_no_gemini_client() {
        let cfg = GeminiConfig::default();
        assert!(GeminiGenerator::from_config(&cfg).unwrap().is_none());
    }
}
