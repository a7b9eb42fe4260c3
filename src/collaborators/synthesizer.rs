//! Speech synthesizer: MP3 pronunciations via the Google Translate TTS
//! endpoint, cached on disk per lemma.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CollaboratorError;

const TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Pause between consecutive synthesis requests; the endpoint throttles
/// rapid-fire clients.
const REQUEST_GAP: Duration = Duration::from_millis(500);

/// Outcome of synthesizing one lemma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Generated(PathBuf),
    /// File already existed; nothing was fetched.
    Skipped(PathBuf),
}

/// Produces pronunciation audio files.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one lemma, reusing an existing file when present.
    async fn synthesize(&self, lemma: &str) -> Result<Synthesis, CollaboratorError>;

    /// Where the audio file for `lemma` lives (whether or not it exists yet).
    fn audio_path(&self, lemma: &str) -> PathBuf;

    /// Synthesize a batch, tolerating per-lemma failures.
    /// Returns `(generated, skipped)`; failures are logged and not counted.
    async fn synthesize_all(&self, lemmas: &[String]) -> (usize, usize) {
        let mut generated = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for lemma in lemmas {
            match self.synthesize(lemma).await {
                Ok(Synthesis::Generated(_)) => generated += 1,
                Ok(Synthesis::Skipped(_)) => skipped += 1,
                Err(e) => {
                    warn!(lemma, error = %e, "Audio synthesis failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!(failed, "Some lemmas failed audio synthesis");
        }
        (generated, skipped)
    }
}

/// Production synthesizer using the unauthenticated Translate TTS endpoint.
pub struct GoogleTts {
    client: reqwest::Client,
    audio_dir: PathBuf,
    lang: String,
}

impl GoogleTts {
    pub fn new(audio_dir: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            audio_dir: audio_dir.into(),
            lang: lang.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, lemma: &str) -> Result<Synthesis, CollaboratorError> {
        validate_lemma(lemma)?;
        let path = self.audio_path(lemma);
        if path.exists() {
            return Ok(Synthesis::Skipped(path));
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;

        let response = self
            .client
            .get(TTS_URL)
            .query(&[
                ("ie", "UTF-8"),
                ("q", lemma),
                ("tl", self.lang.as_str()),
                ("client", "tw-ob"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CollaboratorError::Synthesis {
                lemma: lemma.to_string(),
                reason: e.to_string(),
            })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::Synthesis {
                lemma: lemma.to_string(),
                reason: e.to_string(),
            })?;
        tokio::fs::write(&path, &bytes).await?;
        debug!(lemma, path = %path.display(), "Generated pronunciation audio");

        tokio::time::sleep(REQUEST_GAP).await;
        Ok(Synthesis::Generated(path))
    }

    fn audio_path(&self, lemma: &str) -> PathBuf {
        self.audio_dir.join(format!("{lemma}.mp3"))
    }
}

/// Lemmas become filenames, so anything that could escape the audio
/// directory is rejected outright.
fn validate_lemma(lemma: &str) -> Result<(), CollaboratorError> {
    let trimmed = lemma.trim();
    if trimmed.is_empty()
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed.starts_with('.')
        || Path::new(trimmed).components().count() != 1
    {
        return Err(CollaboratorError::Synthesis {
            lemma: lemma.to_string(),
            reason: "not a valid audio filename".to_string(),
        });
    }
    Ok(())
}
