//! Deck sync job: push the main vocabulary and themed lists to their decks.

use serde_json::{json, Value};
use tracing::info;

use crate::collaborators::SyncOutcome;
use crate::error::{Error, StoreError};
use crate::store::MAIN_THEME;

use super::JobDeps;

/// Deck receiving the main (article-sourced) vocabulary.
pub const MAIN_DECK: &str = "el-pais";

/// Sync a single theme when `theme` is given; otherwise the main vocabulary
/// and/or every registered theme per the two flags.
pub async fn run(
    deps: JobDeps,
    include_main: bool,
    include_themes: bool,
    theme: Option<String>,
) -> Result<Value, Error> {
    let mut targets: Vec<(String, String)> = Vec::new();
    if let Some(name) = theme {
        let theme = deps
            .themes
            .get_by_name(&name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "theme".to_string(),
                id: name.clone(),
            })?;
        targets.push((theme.name, theme.deck_name));
    } else {
        if include_main {
            targets.push((MAIN_THEME.to_string(), MAIN_DECK.to_string()));
        }
        if include_themes {
            for theme in deps.themes.list().await? {
                targets.push((theme.name, theme.deck_name));
            }
        }
    }

    let mut results = serde_json::Map::new();
    let mut total = SyncOutcome::default();
    for (theme_name, deck_name) in targets {
        let entries = deps.vocab.get_all(Some(&theme_name)).await?;
        let outcome = deps.deck.sync_entries(&entries, &deck_name).await?;
        total.added += outcome.added;
        total.skipped += outcome.skipped;
        total.failed += outcome.failed;
        results.insert(
            deck_name,
            json!({
                "added": outcome.added,
                "skipped": outcome.skipped,
                "failed": outcome.failed,
            }),
        );
    }

    info!(
        total_added = total.added,
        total_skipped = total.skipped,
        total_failed = total.failed,
        "Deck sync job finished"
    );

    Ok(json!({
        "results": results,
        "total_added": total.added,
        "total_skipped": total.skipped,
        "total_failed": total.failed,
    }))
}
