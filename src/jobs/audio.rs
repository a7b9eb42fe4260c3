//! Audio generation job: fill in missing pronunciation files.

use serde_json::{json, Value};
use tracing::info;

use crate::error::Error;

use super::JobDeps;

/// Generate audio for every lemma in `theme`, or across all themes when
/// `None`. Existing files are skipped.
pub async fn run(deps: JobDeps, theme: Option<String>) -> Result<Value, Error> {
    let entries = deps.vocab.get_all(theme.as_deref()).await?;
    let lemmas: Vec<String> = entries.into_iter().map(|e| e.lemma).collect();
    let total = lemmas.len();

    let (generated, skipped) = deps.synthesizer.synthesize_all(&lemmas).await;
    info!(generated, skipped, total, "Audio generation finished");

    Ok(json!({
        "generated": generated,
        "skipped": skipped,
        "total_lemmas": total,
    }))
}
