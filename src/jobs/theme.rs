//! Theme creation job: reuse a related theme when one exists, otherwise
//! register a new one, then generate vocabulary for it.

use serde_json::{json, Value};
use tracing::info;

use crate::error::Error;
use crate::store::sanitize_theme_name;

use super::JobDeps;

pub const DEFAULT_WORD_COUNT: usize = 20;

pub async fn run(
    deps: JobDeps,
    description: String,
    count: usize,
    deck_name: Option<String>,
) -> Result<Value, Error> {
    let existing = deps.themes.list().await?;
    let related = deps
        .model
        .detect_related_theme(&description, &existing)
        .await?;

    let (theme, reused) = match related {
        Some(name) => {
            let theme = deps
                .themes
                .get_by_name(&name)
                .await?
                .ok_or_else(|| crate::error::StoreError::NotFound {
                    entity: "theme".to_string(),
                    id: name.clone(),
                })?;
            info!(theme = %theme.name, "Extending related theme");
            (theme, true)
        }
        None => {
            let name = sanitize_theme_name(&description);
            let deck = deck_name.unwrap_or_else(|| default_deck_name(&description));
            let theme = deps
                .themes
                .create_or_get(
                    &name,
                    &description,
                    &deps.source_lang,
                    &deps.target_lang,
                    &deck,
                )
                .await?;
            (theme, false)
        }
    };

    let known: Vec<String> = deps
        .vocab
        .get_known_lemmas(&theme.name)
        .await?
        .into_iter()
        .collect();

    let words = deps
        .model
        .generate_themed(
            &description,
            &known,
            count,
            &theme.source_lang,
            &theme.target_lang,
        )
        .await?;

    let (new_words, updated_words) = deps
        .vocab
        .add_words(
            &words,
            None,
            &theme.source_lang,
            &theme.target_lang,
            &theme.name,
        )
        .await?;

    let lemmas: Vec<String> = words.iter().map(|w| w.lemma.clone()).collect();
    let (generated, skipped) = deps.synthesizer.synthesize_all(&lemmas).await;

    info!(
        theme = %theme.name,
        reused,
        new_words,
        updated_words,
        "Theme vocabulary generated"
    );

    let related_theme_name = reused.then(|| theme.description.clone());
    Ok(json!({
        "theme": theme.name,
        "theme_description": theme.description,
        "deck_name": theme.deck_name,
        "is_related_theme": reused,
        "related_theme_name": related_theme_name,
        "new_words": new_words,
        "updated_words": updated_words,
        "words": words,
        "audio": {"generated": generated, "skipped": skipped},
    }))
}

/// Deck name from a free-text description: significant words, title-cased,
/// joined with hyphens.
fn default_deck_name(description: &str) -> String {
    description
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
