//! Theme registry — catalog of dynamically created vocabulary partitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::StoreError;

use super::db::LexiconDb;
use super::vocab::VocabEntry;

/// The reserved main partition (article extraction writes here).
pub const MAIN_THEME: &str = "el_pais";

/// Prefix for generated theme names, so they can never collide with
/// `MAIN_THEME` or any other reserved name.
const THEME_PREFIX: &str = "vocab_";

/// Maximum length of a sanitized theme name, prefix included.
const MAX_NAME_LEN: usize = 48;

/// A registered theme.
#[derive(Debug, Clone, Serialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub source_lang: String,
    pub target_lang: String,
    pub deck_name: String,
    pub word_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Derive a stable identifier from a free-text theme description.
///
/// Lower-cases, collapses runs of non-alphanumerics to a single underscore,
/// trims leading/trailing underscores, truncates, and prefixes `vocab_`.
/// Idempotent: sanitizing an already-sanitized name returns it unchanged.
/// Input with no alphanumerics at all sanitizes to the empty string, which
/// `is_valid_theme_name` rejects.
pub fn sanitize_theme_name(free_text: &str) -> String {
    static NON_ALNUM: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| regex::Regex::new(r"[^a-z0-9]+").expect("static regex"));
    let body = re
        .replace_all(&free_text.to_lowercase(), "_")
        .trim_matches('_')
        .to_string();
    if body.is_empty() {
        return body;
    }

    let mut name = if body.starts_with(THEME_PREFIX) {
        body
    } else {
        format!("{THEME_PREFIX}{body}")
    };

    if name.len() > MAX_NAME_LEN {
        // Truncate on a char boundary, then drop any dangling separator.
        let mut end = MAX_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
        name = name.trim_end_matches('_').to_string();
    }
    name
}

/// Allow-list check before a name is used anywhere.
fn is_valid_theme_name(name: &str) -> bool {
    !name.is_empty()
        && name != THEME_PREFIX
        && name != THEME_PREFIX.trim_end_matches('_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Registry of dynamically created themes.
pub struct ThemeRegistry {
    db: Arc<LexiconDb>,
}

impl ThemeRegistry {
    pub fn new(db: Arc<LexiconDb>) -> Self {
        Self { db }
    }

    /// Create a theme if it doesn't exist, or return the existing record
    /// unchanged. Idempotent, including repeated calls with identical
    /// arguments.
    pub async fn create_or_get(
        &self,
        name: &str,
        description: &str,
        source_lang: &str,
        target_lang: &str,
        deck_name: &str,
    ) -> Result<Theme, StoreError> {
        if !is_valid_theme_name(name) {
            return Err(StoreError::Validation(format!(
                "invalid theme name: '{name}'"
            )));
        }

        if let Some(existing) = self.get_by_name(name).await? {
            return Ok(existing);
        }

        let insert = self
            .db
            .conn()
            .execute(
                "INSERT INTO theme_registry
                     (name, description, source_lang, target_lang, deck_name, word_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                libsql::params![
                    name,
                    description,
                    source_lang,
                    target_lang,
                    deck_name,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await;

        match insert {
            Ok(_) => {
                info!(theme = name, deck = deck_name, "Theme created");
            }
            // Raced another creator — the existing row wins.
            Err(e) if e.to_string().contains("UNIQUE") => {}
            Err(e) => {
                return Err(StoreError::Query(format!("create_or_get '{name}': {e}")));
            }
        }

        self.get_by_name(name).await?.ok_or_else(|| {
            StoreError::Query(format!("theme '{name}' missing after create"))
        })
    }

    /// Look up a theme by its sanitized name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Theme>, StoreError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {THEME_COLUMNS} FROM theme_registry WHERE name = ?1"),
                libsql::params![name],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_theme(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_by_name: {e}"))),
        }
    }

    /// All themes, most recently created first.
    pub async fn list(&self) -> Result<Vec<Theme>, StoreError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!(
                    "SELECT {THEME_COLUMNS} FROM theme_registry
                     ORDER BY created_at DESC, id DESC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list: {e}")))?;

        let mut themes = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            themes.push(row_to_theme(&row)?);
        }
        Ok(themes)
    }

    /// Search a theme's entries by a term against lemma, surface form, and
    /// translation. A `None` term returns the whole theme. Used by the
    /// extractor's topic-matching tools.
    pub async fn search_words(
        &self,
        name: &str,
        term: Option<&str>,
    ) -> Result<Vec<VocabEntry>, StoreError> {
        let conn = self.db.conn();
        let mut rows = match term {
            Some(t) => {
                let pattern = format!("%{t}%");
                conn.query(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM vocabulary
                         WHERE theme = ?1
                           AND (lemma LIKE ?2 OR word LIKE ?2 OR translation LIKE ?2)
                         ORDER BY added_at DESC, id DESC"
                    ),
                    libsql::params![name, pattern],
                )
                .await
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM vocabulary WHERE theme = ?1
                         ORDER BY added_at DESC, id DESC"
                    ),
                    libsql::params![name],
                )
                .await
            }
        }
        .map_err(|e| StoreError::Query(format!("search_words: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(super::vocab::row_to_entry(&row)?);
        }
        Ok(entries)
    }
}

const THEME_COLUMNS: &str =
    "id, name, description, source_lang, target_lang, deck_name, word_count, created_at";

const ENTRY_COLUMNS: &str = "id, word, lemma, pos, gender, translation, \
                             source_lang, target_lang, examples, source, theme, added_at";

fn row_to_theme(row: &libsql::Row) -> Result<Theme, StoreError> {
    let created_at_str: Option<String> = row.get(7).ok();
    Ok(Theme {
        id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("theme id: {e}")))?,
        name: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("theme name: {e}")))?,
        description: row
            .get(2)
            .map_err(|e| StoreError::Query(format!("theme description: {e}")))?,
        source_lang: row
            .get(3)
            .map_err(|e| StoreError::Query(format!("theme source_lang: {e}")))?,
        target_lang: row
            .get(4)
            .map_err(|e| StoreError::Query(format!("theme target_lang: {e}")))?,
        deck_name: row
            .get(5)
            .map_err(|e| StoreError::Query(format!("theme deck_name: {e}")))?,
        word_count: row
            .get(6)
            .map_err(|e| StoreError::Query(format!("theme word_count: {e}")))?,
        created_at: created_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vocab::{NewWord, VocabStore};

    async fn test_registry() -> (Arc<LexiconDb>, ThemeRegistry) {
        let db = Arc::new(LexiconDb::open_in_memory().await.unwrap());
        let registry = ThemeRegistry::new(Arc::clone(&db));
        (db, registry)
    }

    #[test]
    fn sanitize_basic() {
        assert_eq!(
            sanitize_theme_name("cooking vocabulary"),
            "vocab_cooking_vocabulary"
        );
        assert_eq!(sanitize_theme_name("Cooking Utensils!!"), "vocab_cooking_utensils");
        assert_eq!(sanitize_theme_name("Test!@#$%"), "vocab_test");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "Cooking Utensils!!",
            "Dutch words for active recall",
            "  --- spaced --- ",
            "vocab_already_clean",
            "a very long theme description that should certainly get truncated somewhere",
            "",
            "!!!",
            "---",
            "vocab_",
            "vocab",
        ];
        for input in inputs {
            let once = sanitize_theme_name(input);
            assert_eq!(sanitize_theme_name(&once), once, "input: {input}");
        }
    }

    #[test]
    fn sanitize_rejects_input_with_no_alphanumerics() {
        for input in ["", "!!!", "---", "  ¿? ", "___"] {
            let name = sanitize_theme_name(input);
            assert_eq!(name, "", "input: {input}");
            assert!(!is_valid_theme_name(&name), "input: {input}");
        }
    }

    #[test]
    fn sanitize_never_collides_with_main() {
        assert_ne!(sanitize_theme_name("el pais"), MAIN_THEME);
        assert!(sanitize_theme_name("el pais").starts_with("vocab_"));
    }

    #[test]
    fn sanitize_truncates() {
        let name = sanitize_theme_name(
            "a very long theme description that should certainly get truncated",
        );
        assert!(name.len() <= 48);
        assert!(!name.ends_with('_'));
    }

    #[test]
    fn valid_names() {
        assert!(is_valid_theme_name("vocab_cooking"));
        assert!(is_valid_theme_name("el_pais"));
        assert!(!is_valid_theme_name(""));
        assert!(!is_valid_theme_name("vocab"));
        assert!(!is_valid_theme_name("vocab_"));
        assert!(!is_valid_theme_name("DROP TABLE"));
        assert!(!is_valid_theme_name("name; --"));
    }

    #[tokio::test]
    async fn create_or_get_is_idempotent() {
        let (_db, registry) = test_registry().await;

        let first = registry
            .create_or_get("vocab_cooking", "cooking vocabulary", "Dutch", "English", "Cooking")
            .await
            .unwrap();
        let second = registry
            .create_or_get("vocab_cooking", "cooking vocabulary", "Dutch", "English", "Cooking")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description, "cooking vocabulary");
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_name() {
        let (_db, registry) = test_registry().await;
        let err = registry
            .create_or_get("DROP TABLE", "x", "Dutch", "English", "X")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn list_most_recent_first() {
        let (_db, registry) = test_registry().await;
        registry
            .create_or_get("vocab_first", "first", "Dutch", "English", "First")
            .await
            .unwrap();
        registry
            .create_or_get("vocab_second", "second", "Dutch", "English", "Second")
            .await
            .unwrap();

        let themes = registry.list().await.unwrap();
        assert_eq!(themes.len(), 2);
        assert_eq!(themes[0].name, "vocab_second");
    }

    #[tokio::test]
    async fn word_count_refreshes_on_write() {
        let (db, registry) = test_registry().await;
        registry
            .create_or_get("vocab_cooking", "cooking", "Dutch", "English", "Cooking")
            .await
            .unwrap();

        let store = VocabStore::new(db);
        let words = vec![NewWord {
            word: "koken".to_string(),
            lemma: "koken".to_string(),
            pos: Some("verb".to_string()),
            gender: None,
            translation: "to cook".to_string(),
            examples: vec!["Ik kook graag".to_string()],
        }];
        store
            .add_words(&words, None, "Dutch", "English", "vocab_cooking")
            .await
            .unwrap();

        let theme = registry.get_by_name("vocab_cooking").await.unwrap().unwrap();
        assert_eq!(theme.word_count, 1);
    }

    #[tokio::test]
    async fn search_words_filters_by_term() {
        let (db, registry) = test_registry().await;
        registry
            .create_or_get("vocab_cooking", "cooking", "Dutch", "English", "Cooking")
            .await
            .unwrap();

        let store = VocabStore::new(db);
        let words = vec![
            NewWord {
                word: "koken".to_string(),
                lemma: "koken".to_string(),
                pos: None,
                gender: None,
                translation: "to cook".to_string(),
                examples: vec![],
            },
            NewWord {
                word: "mes".to_string(),
                lemma: "mes".to_string(),
                pos: None,
                gender: None,
                translation: "knife".to_string(),
                examples: vec![],
            },
        ];
        store
            .add_words(&words, None, "Dutch", "English", "vocab_cooking")
            .await
            .unwrap();

        let hits = registry.search_words("vocab_cooking", Some("cook")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].lemma, "koken");

        let all = registry.search_words("vocab_cooking", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
