//! Article extraction job: fetch, select vocabulary, store, synthesize audio.

use serde_json::{json, Value};
use tracing::info;

use crate::error::Error;
use crate::store::MAIN_THEME;

use super::JobDeps;

/// Number of words to extract when the caller doesn't say.
pub const DEFAULT_WORD_COUNT: usize = 10;

pub async fn run(deps: JobDeps, url: String, prompt: String, count: usize) -> Result<Value, Error> {
    let article_text = deps.fetcher.fetch_article(&url).await?;
    info!(url = %url, chars = article_text.len(), "Fetched article");

    let known: Vec<String> = deps
        .vocab
        .get_known_lemmas(MAIN_THEME)
        .await?
        .into_iter()
        .collect();

    let words = deps
        .model
        .select_and_translate(
            &article_text,
            &known,
            &prompt,
            count,
            &deps.source_lang,
            &deps.target_lang,
        )
        .await?;

    let (new_words, updated_words) = deps
        .vocab
        .add_words(
            &words,
            Some(&url),
            &deps.source_lang,
            &deps.target_lang,
            MAIN_THEME,
        )
        .await?;

    // Synthesis is cached per lemma, so feeding the whole batch is safe.
    let lemmas: Vec<String> = words.iter().map(|w| w.lemma.clone()).collect();
    let (generated, skipped) = deps.synthesizer.synthesize_all(&lemmas).await;

    info!(
        url = %url,
        new_words,
        updated_words,
        audio_generated = generated,
        "Article extraction finished"
    );

    Ok(json!({
        "new_words": new_words,
        "updated_words": updated_words,
        "words": words,
        "source_url": url,
        "audio": {"generated": generated, "skipped": skipped},
    }))
}
