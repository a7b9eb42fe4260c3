//! Deck synchronizer: pushes vocabulary entries to Anki through the
//! AnkiConnect add-on's JSON-RPC endpoint.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::CollaboratorError;
use crate::store::VocabEntry;

/// AnkiConnect protocol version this client speaks.
const PROTOCOL_VERSION: i64 = 6;

/// Note type created for vocabulary cards.
const NOTE_MODEL: &str = "Vocabulary (vocab-assist)";

/// Per-sync outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Pushes entries into a flashcard deck.
#[async_trait]
pub trait DeckSynchronizer: Send + Sync {
    /// Whether the deck backend is reachable and speaks a compatible version.
    async fn check_connection(&self) -> bool;

    /// Sync entries into `deck_name`, creating the deck if needed.
    /// Existing notes (matched by lemma) are skipped; per-entry failures are
    /// counted, not fatal.
    async fn sync_entries(
        &self,
        entries: &[VocabEntry],
        deck_name: &str,
    ) -> Result<SyncOutcome, CollaboratorError>;
}

/// Production synchronizer against a local AnkiConnect instance.
pub struct AnkiConnectClient {
    client: reqwest::Client,
    url: String,
    audio_dir: PathBuf,
}

impl AnkiConnectClient {
    pub fn new(url: impl Into<String>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            audio_dir: audio_dir.into(),
        }
    }

    async fn invoke(&self, action: &str, params: Value) -> Result<Value, CollaboratorError> {
        let body = json!({
            "action": action,
            "version": PROTOCOL_VERSION,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| CollaboratorError::DeckConnection(e.to_string()))?;

        let reply: AnkiReply = response
            .json()
            .await
            .map_err(|e| CollaboratorError::DeckConnection(e.to_string()))?;
        if let Some(error) = reply.error {
            return Err(CollaboratorError::Deck(error));
        }
        Ok(reply.result)
    }

    async fn ensure_deck(&self, deck_name: &str) -> Result<(), CollaboratorError> {
        let decks = self.invoke("deckNames", json!({})).await?;
        let exists = decks
            .as_array()
            .is_some_and(|names| names.iter().any(|n| n.as_str() == Some(deck_name)));
        if !exists {
            self.invoke("createDeck", json!({"deck": deck_name})).await?;
            info!(deck = deck_name, "Created deck");
        }
        Ok(())
    }

    async fn ensure_note_model(&self) -> Result<(), CollaboratorError> {
        let models = self.invoke("modelNames", json!({})).await?;
        let exists = models
            .as_array()
            .is_some_and(|names| names.iter().any(|n| n.as_str() == Some(NOTE_MODEL)));
        if exists {
            return Ok(());
        }

        self.invoke(
            "createModel",
            json!({
                "modelName": NOTE_MODEL,
                "inOrderFields": [
                    "Lemma", "Translation", "PartOfSpeech", "WordAsFound",
                    "Example1", "Example2", "Audio", "Source"
                ],
                "cardTemplates": [{
                    "Name": "Recognition",
                    "Front": "<div class=\"front\">{{Lemma}}</div>\n<div class=\"pos\">({{PartOfSpeech}})</div>\n{{Audio}}",
                    "Back": "{{FrontSide}}\n<hr id=\"answer\">\n<div class=\"translation\">{{Translation}}</div>\n{{#WordAsFound}}<div class=\"context\">Form found: <i>{{WordAsFound}}</i></div>{{/WordAsFound}}\n{{#Example1}}<div class=\"example\">{{Example1}}</div>{{/Example1}}\n{{#Example2}}<div class=\"example\">{{Example2}}</div>{{/Example2}}"
                }]
            }),
        )
        .await?;
        info!(model = NOTE_MODEL, "Created note type");
        Ok(())
    }

    async fn note_exists(&self, lemma: &str, deck_name: &str) -> Result<bool, CollaboratorError> {
        let escaped = lemma.replace('"', "\\\"");
        let query = format!("deck:\"{deck_name}\" Lemma:\"{escaped}\"");
        let found = self.invoke("findNotes", json!({"query": query})).await?;
        Ok(found.as_array().is_some_and(|ids| !ids.is_empty()))
    }

    /// Upload a lemma's audio file to the media collection. Returns the
    /// `[sound:...]` reference, or empty when no file exists or the upload
    /// fails; audio is never worth failing the note over.
    async fn upload_audio(&self, lemma: &str) -> String {
        let filename = format!("{lemma}.mp3");
        let path = self.audio_dir.join(&filename);
        let Ok(bytes) = tokio::fs::read(&path).await else {
            return String::new();
        };

        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        match self
            .invoke("storeMediaFile", json!({"filename": filename, "data": data}))
            .await
        {
            Ok(_) => format!("[sound:{filename}]"),
            Err(e) => {
                warn!(lemma, error = %e, "Failed to upload audio to media collection");
                String::new()
            }
        }
    }

    async fn add_note(
        &self,
        entry: &VocabEntry,
        deck_name: &str,
    ) -> Result<(), CollaboratorError> {
        let audio = self.upload_audio(&entry.lemma).await;
        let example1 = entry.examples.first().cloned().unwrap_or_default();
        let example2 = entry.examples.get(1).cloned().unwrap_or_default();

        self.invoke(
            "addNote",
            json!({
                "note": {
                    "deckName": deck_name,
                    "modelName": NOTE_MODEL,
                    "fields": {
                        "Lemma": entry.lemma,
                        "Translation": entry.translation,
                        "PartOfSpeech": entry.pos.clone().unwrap_or_default(),
                        "WordAsFound": entry.word,
                        "Example1": example1,
                        "Example2": example2,
                        "Audio": audio,
                        "Source": entry.source.clone().unwrap_or_default(),
                    },
                    "options": {"allowDuplicate": false},
                    "tags": [entry.theme],
                }
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DeckSynchronizer for AnkiConnectClient {
    async fn check_connection(&self) -> bool {
        match self.invoke("version", json!({})).await {
            Ok(version) => version.as_i64().is_some_and(|v| v >= PROTOCOL_VERSION),
            Err(_) => false,
        }
    }

    async fn sync_entries(
        &self,
        entries: &[VocabEntry],
        deck_name: &str,
    ) -> Result<SyncOutcome, CollaboratorError> {
        if !self.check_connection().await {
            return Err(CollaboratorError::DeckConnection(
                "Anki is not running or the AnkiConnect add-on is missing".to_string(),
            ));
        }

        self.ensure_deck(deck_name).await?;
        self.ensure_note_model().await?;

        let mut outcome = SyncOutcome::default();
        for entry in entries {
            match self.note_exists(&entry.lemma, deck_name).await {
                Ok(true) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(lemma = %entry.lemma, error = %e, "Lookup failed during sync");
                    outcome.failed += 1;
                    continue;
                }
            }
            match self.add_note(entry, deck_name).await {
                Ok(()) => {
                    debug!(lemma = %entry.lemma, deck = deck_name, "Added note");
                    outcome.added += 1;
                }
                Err(e) => {
                    warn!(lemma = %entry.lemma, error = %e, "Failed to add note");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            deck = deck_name,
            added = outcome.added,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Deck sync finished"
        );
        Ok(outcome)
    }
}

#[derive(Debug, Deserialize)]
struct AnkiReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_error_field() {
        let raw = r#"{"result": null, "error": "deck was not found"}"#;
        let reply: AnkiReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.error.as_deref(), Some("deck was not found"));
    }

    #[test]
    fn reply_with_result_only() {
        let raw = r#"{"result": 6, "error": null}"#;
        let reply: AnkiReply = serde_json::from_str(raw).unwrap();
        assert!(reply.error.is_none());
        assert_eq!(reply.result.as_i64(), Some(6));
    }
}
