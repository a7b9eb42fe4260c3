//! Vocabulary model: LLM-backed word selection and translation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::CollaboratorError;
use crate::store::{NewWord, Theme, VocabEntry};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Attempts before giving up on a response that won't parse as JSON.
const PARSE_ATTEMPTS: usize = 3;

/// Selects, translates, and invents vocabulary.
#[async_trait]
pub trait VocabularyModel: Send + Sync {
    /// Pick `count` words from an article, excluding already-known lemmas.
    async fn select_and_translate(
        &self,
        article_text: &str,
        known_lemmas: &[String],
        user_prompt: &str,
        count: usize,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<NewWord>, CollaboratorError>;

    /// Generate `count` words for a theme, excluding already-known lemmas.
    async fn generate_themed(
        &self,
        theme: &str,
        known_lemmas: &[String],
        count: usize,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<NewWord>, CollaboratorError>;

    /// Decide whether a requested theme matches one that already exists.
    /// Returns the existing theme's name, or `None` for a genuinely new theme.
    async fn detect_related_theme(
        &self,
        description: &str,
        existing: &[Theme],
    ) -> Result<Option<String>, CollaboratorError>;

    /// Pick the single entry best matching a semantic prompt.
    async fn pick_word(
        &self,
        entries: &[VocabEntry],
        prompt: &str,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// Production model client against the Anthropic messages API.
pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicModel {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Model(format!(
                "API returned {status}: {detail}"
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| CollaboratorError::InvalidResponse("empty content".to_string()))
    }

    /// Request a word list and parse it, re-asking the model when the
    /// response is not valid JSON.
    async fn complete_word_list(
        &self,
        system: &str,
        user: &str,
        count: usize,
    ) -> Result<Vec<NewWord>, CollaboratorError> {
        // Rough per-word token allowance plus headroom.
        let max_tokens = (count as u32) * 150 + 1000;

        let mut last_error = String::new();
        for attempt in 1..=PARSE_ATTEMPTS {
            let text = self.complete(system, user, max_tokens).await?;
            match parse_word_list(&text) {
                Ok(words) => return Ok(words),
                Err(e) => {
                    warn!(attempt, error = %e, "Model response did not parse as a word list");
                    last_error = e.to_string();
                }
            }
        }
        Err(CollaboratorError::InvalidResponse(format!(
            "no valid word list after {PARSE_ATTEMPTS} attempts: {last_error}"
        )))
    }
}

#[async_trait]
impl VocabularyModel for AnthropicModel {
    async fn select_and_translate(
        &self,
        article_text: &str,
        known_lemmas: &[String],
        user_prompt: &str,
        count: usize,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<NewWord>, CollaboratorError> {
        debug!(count, known = known_lemmas.len(), "Selecting vocabulary from article");

        let system = format!(
            "You are a {source_lang}-{target_lang} vocabulary assistant. Given a {source_lang} \
             news article, select vocabulary words for a {target_lang} speaker learning \
             {source_lang}.\n\n\
             Rules:\n\
             - Return exactly {count} words as a JSON array\n\
             - Exclude words already known (provided in list)\n\
             - For verbs: \"word\" = conjugated form found, \"lemma\" = infinitive\n\
             - Include 1-2 example sentences from the article for each word\n\
             - \"translation\" should match the context, plus infinitive for verbs\n\
             - For nouns include \"gender\" when the language has one\n\
             - Prioritize useful vocabulary over obscure terms\n\
             - Include a mix: verbs, nouns, adjectives, adverbs, prepositions, conjunctions\n\n\
             Output format (JSON array only, no markdown):\n\
             [{{\"word\": \"quiere\", \"lemma\": \"querer\", \"pos\": \"verb\", \
             \"translation\": \"veut (vouloir)\", \
             \"examples\": [\"Trump quiere imponer su ley\"]}}]"
        );

        let known = if known_lemmas.is_empty() {
            "none".to_string()
        } else {
            known_lemmas.join(", ")
        };
        let user = format!(
            "Article text:\n{article_text}\n\n\
             Known words (exclude these):\n{known}\n\n\
             User request: {user_prompt}\n\n\
             Select {count} vocabulary words. Return JSON array only."
        );

        self.complete_word_list(&system, &user, count).await
    }

    async fn generate_themed(
        &self,
        theme: &str,
        known_lemmas: &[String],
        count: usize,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<NewWord>, CollaboratorError> {
        debug!(theme, count, "Generating themed vocabulary");

        let system = format!(
            "You are a {source_lang}-{target_lang} vocabulary assistant. Generate vocabulary \
             for a {target_lang} speaker learning {source_lang}, focused on a given theme.\n\n\
             Rules:\n\
             - Return exactly {count} words as a JSON array\n\
             - Exclude words already known (provided in list)\n\
             - Every word must belong to the theme\n\
             - Include 1-2 short example sentences you write yourself\n\
             - For nouns include \"gender\" when the language has one\n\n\
             Output format (JSON array only, no markdown):\n\
             [{{\"word\": \"remo\", \"lemma\": \"remo\", \"pos\": \"noun\", \"gender\": \"m\", \
             \"translation\": \"rame\", \"examples\": [\"El remo golpea el agua\"]}}]"
        );

        let known = if known_lemmas.is_empty() {
            "none".to_string()
        } else {
            known_lemmas.join(", ")
        };
        let user = format!(
            "Theme: {theme}\n\n\
             Known words (exclude these):\n{known}\n\n\
             Generate {count} vocabulary words. Return JSON array only."
        );

        self.complete_word_list(&system, &user, count).await
    }

    async fn detect_related_theme(
        &self,
        description: &str,
        existing: &[Theme],
    ) -> Result<Option<String>, CollaboratorError> {
        if existing.is_empty() {
            return Ok(None);
        }

        let listing = existing
            .iter()
            .map(|t| format!("- {} ({})", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You decide whether a requested vocabulary theme is the same subject as \
                      an existing one. Answer with the exact name of the matching existing \
                      theme, or NONE if no existing theme covers the same subject. Answer with \
                      one line only.";
        let user = format!(
            "Requested theme: {description}\n\nExisting themes:\n{listing}\n\n\
             Which existing theme matches, if any?"
        );

        let reply = self.complete(system, &user, 100).await?;
        Ok(match_theme_reply(&reply, existing))
    }

    async fn pick_word(
        &self,
        entries: &[VocabEntry],
        prompt: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        if entries.is_empty() {
            return Ok(None);
        }

        let listing = entries
            .iter()
            .map(|e| format!("- {}: {}", e.lemma, e.translation))
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You pick the single vocabulary word best matching a request. Answer with \
                      exactly one lemma from the list, nothing else.";
        let user = format!("Request: {prompt}\n\nVocabulary:\n{listing}\n\nPick one lemma.");

        let reply = self.complete(system, &user, 50).await?;
        let picked = reply.trim().to_lowercase();
        Ok(entries
            .iter()
            .find(|e| e.lemma.to_lowercase() == picked)
            .map(|e| e.lemma.clone()))
    }
}

fn parse_word_list(text: &str) -> Result<Vec<NewWord>, serde_json::Error> {
    let json_str = extract_json_array(text);
    serde_json::from_str(&json_str)
}

/// Map a one-line theme reply back onto a registered theme, tolerating case
/// differences and stray punctuation. `NONE` and unrecognized names both mean
/// no match.
fn match_theme_reply(reply: &str, existing: &[Theme]) -> Option<String> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .to_lowercase();
    if cleaned.is_empty() || cleaned == "none" {
        return None;
    }
    existing
        .iter()
        .find(|t| t.name.to_lowercase() == cleaned || t.description.to_lowercase() == cleaned)
        .map(|t| t.name.clone())
}

/// Extract a JSON array from model output that might contain markdown fences
/// or surrounding prose.
fn extract_json_array(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('[') {
                return inner.to_string();
            }
        }
    }

    if let Some(start) = trimmed.find('[') {
        if let Some(end) = trimmed.rfind(']') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    error!(text = trimmed, "Could not extract JSON array from model response");
    trimmed.to_string()
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}
