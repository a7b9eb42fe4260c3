//! Vocabulary store — merge-or-insert writes, filtered reads, aggregate stats.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

use super::db::LexiconDb;

/// Example sentences kept per entry. FIFO: the first distinct five win.
pub const MAX_EXAMPLES: usize = 5;

/// A stored vocabulary entry.
#[derive(Debug, Clone, Serialize)]
pub struct VocabEntry {
    pub id: i64,
    /// The form as encountered (e.g. a conjugated verb).
    pub word: String,
    /// Canonical form; unique per (lemma, theme).
    pub lemma: String,
    pub pos: Option<String>,
    pub gender: Option<String>,
    pub translation: String,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub examples: Vec<String>,
    pub source: Option<String>,
    pub theme: String,
    pub added_at: Option<DateTime<Utc>>,
}

/// A candidate entry from a collaborator, destined for a write batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWord {
    pub word: String,
    pub lemma: String,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    pub translation: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub examples: Vec<String>,
}

/// Accept either a JSON list or a bare string for `examples`.
/// Models occasionally return a single sentence instead of an array.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Aggregate statistics over the store.
#[derive(Debug, Clone, Serialize)]
pub struct VocabStats {
    pub total_words: i64,
    pub by_pos: HashMap<String, i64>,
    pub by_theme: HashMap<String, i64>,
}

/// Deduplicating vocabulary store.
///
/// All write batches are serialized through `write_lock` so the
/// check-then-write in `add_words` is atomic per batch; the
/// `UNIQUE(lemma, theme)` index is the backstop — a conflicting insert
/// falls back to the merge path instead of surfacing an error.
pub struct VocabStore {
    db: Arc<LexiconDb>,
    write_lock: Mutex<()>,
}

impl VocabStore {
    pub fn new(db: Arc<LexiconDb>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Merge-or-insert a batch of candidate words into `theme`.
    ///
    /// Returns `(new_count, updated_count)`; every candidate is accounted for
    /// in one of the two. A candidate with an empty lemma fails the whole
    /// batch before anything is written.
    pub async fn add_words(
        &self,
        words: &[NewWord],
        source: Option<&str>,
        source_lang: &str,
        target_lang: &str,
        theme: &str,
    ) -> Result<(usize, usize), StoreError> {
        for w in words {
            if w.lemma.trim().is_empty() {
                return Err(StoreError::Validation(format!(
                    "candidate '{}' has an empty lemma",
                    w.word
                )));
            }
        }

        let _guard = self.write_lock.lock().await;
        let conn = self.db.conn();

        let mut new_count = 0;
        let mut updated_count = 0;

        for w in words {
            let existing = self.find_entry(&w.lemma, theme).await?;

            match existing {
                Some((id, examples)) => {
                    self.merge_into(id, &examples, &w.examples, source).await?;
                    updated_count += 1;
                }
                None => {
                    let examples_json = serde_json::to_string(&truncate(&w.examples))?;
                    let insert = conn
                        .execute(
                            "INSERT INTO vocabulary
                                 (word, lemma, pos, gender, translation,
                                  source_lang, target_lang, examples, source, theme, added_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                            libsql::params![
                                w.word.as_str(),
                                w.lemma.as_str(),
                                opt_text(w.pos.as_deref()),
                                opt_text(w.gender.as_deref()),
                                w.translation.as_str(),
                                source_lang,
                                target_lang,
                                examples_json,
                                opt_text(source),
                                theme,
                                Utc::now().to_rfc3339(),
                            ],
                        )
                        .await;

                    match insert {
                        Ok(_) => new_count += 1,
                        // Lost a race on (lemma, theme) — merge instead.
                        Err(e) if e.to_string().contains("UNIQUE") => {
                            let (id, examples) =
                                self.find_entry(&w.lemma, theme).await?.ok_or_else(|| {
                                    StoreError::Constraint(format!(
                                        "insert conflict for '{}' but no existing row",
                                        w.lemma
                                    ))
                                })?;
                            self.merge_into(id, &examples, &w.examples, source).await?;
                            updated_count += 1;
                        }
                        Err(e) => {
                            return Err(StoreError::Query(format!(
                                "add_words insert '{}': {e}",
                                w.lemma
                            )));
                        }
                    }
                }
            }
        }

        self.refresh_theme_count(theme).await?;

        info!(
            theme,
            new = new_count,
            updated = updated_count,
            "Vocabulary batch written"
        );
        Ok((new_count, updated_count))
    }

    /// Look up an entry's id and current examples by (lemma, theme).
    async fn find_entry(
        &self,
        lemma: &str,
        theme: &str,
    ) -> Result<Option<(i64, Vec<String>)>, StoreError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT id, examples FROM vocabulary WHERE lemma = ?1 AND theme = ?2",
                libsql::params![lemma, theme],
            )
            .await
            .map_err(|e| StoreError::Query(format!("find_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("find_entry id: {e}")))?;
                let examples_json: String = row.get(1).unwrap_or_else(|_| "[]".to_string());
                let examples: Vec<String> =
                    serde_json::from_str(&examples_json).unwrap_or_default();
                Ok(Some((id, examples)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("find_entry: {e}"))),
        }
    }

    /// Union incoming examples onto an existing entry, capped at `MAX_EXAMPLES`.
    /// `source` is deliberately refreshed to the most recent sighting when the
    /// incoming batch carries one, so an entry always points at the latest
    /// article it appeared in. Every other field keeps its first-seen value.
    async fn merge_into(
        &self,
        id: i64,
        existing: &[String],
        incoming: &[String],
        source: Option<&str>,
    ) -> Result<(), StoreError> {
        let merged = merge_examples(existing, incoming);
        let examples_json = serde_json::to_string(&merged)?;

        self.db
            .conn()
            .execute(
                "UPDATE vocabulary SET examples = ?1, source = COALESCE(?2, source) WHERE id = ?3",
                libsql::params![examples_json, opt_text(source), id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("merge_into: {e}")))?;

        debug!(entry_id = id, "Merged examples onto existing entry");
        Ok(())
    }

    /// All entries, optionally filtered to one theme, most recent first.
    pub async fn get_all(&self, theme: Option<&str>) -> Result<Vec<VocabEntry>, StoreError> {
        let conn = self.db.conn();
        let mut rows = match theme {
            Some(t) => conn
                .query(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM vocabulary WHERE theme = ?1
                         ORDER BY added_at DESC, id DESC"
                    ),
                    libsql::params![t],
                )
                .await,
            None => conn
                .query(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM vocabulary
                         ORDER BY added_at DESC, id DESC"
                    ),
                    (),
                )
                .await,
        }
        .map_err(|e| StoreError::Query(format!("get_all: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// A single entry by id.
    pub async fn get(&self, id: i64) -> Result<VocabEntry, StoreError> {
        let mut rows = self
            .db
            .conn()
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM vocabulary WHERE id = ?1"),
                libsql::params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_entry(&row),
            Ok(None) => Err(StoreError::NotFound {
                entity: "vocabulary entry".to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    /// Remove an entry by id (user-initiated).
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let entry = self.get(id).await?;
        self.db
            .conn()
            .execute("DELETE FROM vocabulary WHERE id = ?1", libsql::params![id])
            .await
            .map_err(|e| StoreError::Query(format!("delete: {e}")))?;
        self.refresh_theme_count(&entry.theme).await?;
        info!(entry_id = id, lemma = %entry.lemma, "Vocabulary entry deleted");
        Ok(())
    }

    /// Total count plus breakdowns by part of speech and by theme.
    /// Empty/null tags are excluded from the pos breakdown.
    pub async fn get_stats(&self, theme: Option<&str>) -> Result<VocabStats, StoreError> {
        let conn = self.db.conn();
        let filter = theme.map(|t| t.to_string());

        let total_words = {
            let mut rows = match &filter {
                Some(t) => {
                    conn.query(
                        "SELECT COUNT(*) FROM vocabulary WHERE theme = ?1",
                        libsql::params![t.as_str()],
                    )
                    .await
                }
                None => conn.query("SELECT COUNT(*) FROM vocabulary", ()).await,
            }
            .map_err(|e| StoreError::Query(format!("get_stats total: {e}")))?;
            match rows.next().await {
                Ok(Some(row)) => row
                    .get::<i64>(0)
                    .map_err(|e| StoreError::Query(format!("get_stats total: {e}")))?,
                _ => 0,
            }
        };

        let mut by_pos = HashMap::new();
        {
            let mut rows = match &filter {
                Some(t) => {
                    conn.query(
                        "SELECT pos, COUNT(*) FROM vocabulary
                         WHERE theme = ?1 AND pos IS NOT NULL AND pos != ''
                         GROUP BY pos ORDER BY COUNT(*) DESC",
                        libsql::params![t.as_str()],
                    )
                    .await
                }
                None => {
                    conn.query(
                        "SELECT pos, COUNT(*) FROM vocabulary
                         WHERE pos IS NOT NULL AND pos != ''
                         GROUP BY pos ORDER BY COUNT(*) DESC",
                        (),
                    )
                    .await
                }
            }
            .map_err(|e| StoreError::Query(format!("get_stats by_pos: {e}")))?;
            while let Ok(Some(row)) = rows.next().await {
                let pos: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_stats pos: {e}")))?;
                let count: i64 = row
                    .get(1)
                    .map_err(|e| StoreError::Query(format!("get_stats count: {e}")))?;
                by_pos.insert(pos, count);
            }
        }

        let mut by_theme = HashMap::new();
        {
            let mut rows = conn
                .query(
                    "SELECT theme, COUNT(*) FROM vocabulary GROUP BY theme",
                    (),
                )
                .await
                .map_err(|e| StoreError::Query(format!("get_stats by_theme: {e}")))?;
            while let Ok(Some(row)) = rows.next().await {
                let t: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_stats theme: {e}")))?;
                let count: i64 = row
                    .get(1)
                    .map_err(|e| StoreError::Query(format!("get_stats count: {e}")))?;
                by_theme.insert(t, count);
            }
        }

        Ok(VocabStats {
            total_words,
            by_pos,
            by_theme,
        })
    }

    /// The set of lemmas already stored in a theme. Collaborators use this to
    /// avoid re-selecting known vocabulary.
    pub async fn get_known_lemmas(&self, theme: &str) -> Result<HashSet<String>, StoreError> {
        let mut rows = self
            .db
            .conn()
            .query(
                "SELECT lemma FROM vocabulary WHERE theme = ?1",
                libsql::params![theme],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_known_lemmas: {e}")))?;

        let mut lemmas = HashSet::new();
        while let Ok(Some(row)) = rows.next().await {
            let lemma: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("get_known_lemmas: {e}")))?;
            lemmas.insert(lemma);
        }
        Ok(lemmas)
    }

    /// Refresh the cached word count on the theme registry row, if one exists.
    async fn refresh_theme_count(&self, theme: &str) -> Result<(), StoreError> {
        self.db
            .conn()
            .execute(
                "UPDATE theme_registry
                 SET word_count = (SELECT COUNT(*) FROM vocabulary WHERE theme = ?1)
                 WHERE name = ?1",
                libsql::params![theme],
            )
            .await
            .map_err(|e| StoreError::Query(format!("refresh_theme_count: {e}")))?;
        Ok(())
    }
}

const ENTRY_COLUMNS: &str = "id, word, lemma, pos, gender, translation, \
                             source_lang, target_lang, examples, source, theme, added_at";

/// Union of existing and incoming examples: existing order preserved,
/// new distinct examples appended, truncated to `MAX_EXAMPLES`.
fn merge_examples(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    for example in incoming {
        if !merged.contains(example) {
            merged.push(example.clone());
        }
    }
    merged.truncate(MAX_EXAMPLES);
    merged
}

fn truncate(examples: &[String]) -> Vec<String> {
    merge_examples(&[], examples)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn row_to_entry(row: &libsql::Row) -> Result<VocabEntry, StoreError> {
    let examples_json: String = row.get(8).unwrap_or_else(|_| "[]".to_string());
    let examples: Vec<String> = serde_json::from_str(&examples_json).unwrap_or_default();
    let added_at_str: Option<String> = row.get(11).ok();

    Ok(VocabEntry {
        id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("row id: {e}")))?,
        word: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("row word: {e}")))?,
        lemma: row
            .get(2)
            .map_err(|e| StoreError::Query(format!("row lemma: {e}")))?,
        pos: row.get(3).ok(),
        gender: row.get(4).ok(),
        translation: row
            .get(5)
            .map_err(|e| StoreError::Query(format!("row translation: {e}")))?,
        source_lang: row.get(6).ok(),
        target_lang: row.get(7).ok(),
        examples,
        source: row.get(9).ok(),
        theme: row
            .get(10)
            .map_err(|e| StoreError::Query(format!("row theme: {e}")))?,
        added_at: added_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> VocabStore {
        let db = Arc::new(LexiconDb::open_in_memory().await.unwrap());
        VocabStore::new(db)
    }

    fn word(lemma: &str, examples: &[&str]) -> NewWord {
        NewWord {
            word: lemma.to_string(),
            lemma: lemma.to_string(),
            pos: Some("verb".to_string()),
            gender: None,
            translation: "translation".to_string(),
            examples: examples.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn add(store: &VocabStore, words: &[NewWord]) -> (usize, usize) {
        store
            .add_words(words, Some("url"), "Spanish", "French", "el_pais")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn inserts_new_word() {
        let store = test_store().await;
        let (new, updated) = add(&store, &[word("querer", &["Quiero aprender"])]).await;
        assert_eq!((new, updated), (1, 0));

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].lemma, "querer");
        assert_eq!(all[0].examples, vec!["Quiero aprender"]);
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let store = test_store().await;
        add(&store, &[word("querer", &["A"])]).await;
        let (new, updated) = add(&store, &[word("querer", &["A"])]).await;

        assert_eq!((new, updated), (0, 1));
        let all = store.get_all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].examples, vec!["A"]);
    }

    #[tokio::test]
    async fn merge_accumulates_examples() {
        let store = test_store().await;
        add(&store, &[word("querer", &["A"])]).await;
        add(&store, &[word("querer", &["B"])]).await;

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all[0].examples, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn examples_capped_fifo() {
        let store = test_store().await;
        add(&store, &[word("querer", &["1", "2", "3"])]).await;
        add(&store, &[word("querer", &["4", "5", "6"])]).await;

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all[0].examples, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn merge_keeps_other_fields() {
        let store = test_store().await;
        add(&store, &[word("querer", &["A"])]).await;

        let mut changed = word("querer", &["B"]);
        changed.word = "quiere".to_string();
        changed.translation = "different".to_string();
        add(&store, &[changed]).await;

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all[0].word, "querer");
        assert_eq!(all[0].translation, "translation");
    }

    #[tokio::test]
    async fn empty_lemma_fails_whole_batch() {
        let store = test_store().await;
        let batch = vec![word("querer", &[]), word("", &[])];
        let err = store
            .add_words(&batch, None, "Spanish", "French", "el_pais")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Nothing written
        assert!(store.get_all(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_lemma_different_theme_coexists() {
        let store = test_store().await;
        add(&store, &[word("querer", &[])]).await;
        store
            .add_words(&[word("querer", &[])], None, "Spanish", "French", "other")
            .await
            .unwrap();

        assert_eq!(store.get_all(None).await.unwrap().len(), 2);
        assert_eq!(store.get_all(Some("el_pais")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_writers_same_lemma() {
        let store = Arc::new(test_store().await);
        let mut handles = Vec::new();
        for i in 0..100 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .add_words(
                        &[word("querer", &[&format!("example {i}")])],
                        None,
                        "Spanish",
                        "French",
                        "el_pais",
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut total_new = 0;
        let mut total_updated = 0;
        for h in handles {
            let (n, u) = h.await.unwrap();
            total_new += n;
            total_updated += u;
        }

        assert_eq!(total_new, 1);
        assert_eq!(total_updated, 99);

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        // No duplicate examples, still capped
        let mut seen = HashSet::new();
        for e in &all[0].examples {
            assert!(seen.insert(e.clone()));
        }
        assert!(all[0].examples.len() <= MAX_EXAMPLES);
    }

    #[tokio::test]
    async fn stats_exclude_empty_pos() {
        let store = test_store().await;
        let mut no_pos = word("casa", &[]);
        no_pos.pos = None;
        add(&store, &[word("querer", &[]), no_pos]).await;

        let stats = store.get_stats(None).await.unwrap();
        assert_eq!(stats.total_words, 2);
        assert_eq!(stats.by_pos.get("verb"), Some(&1));
        assert_eq!(stats.by_pos.len(), 1);
        assert_eq!(stats.by_theme.get("el_pais"), Some(&2));
    }

    #[tokio::test]
    async fn known_lemmas() {
        let store = test_store().await;
        add(&store, &[word("querer", &[]), word("casa", &[])]).await;

        let known = store.get_known_lemmas("el_pais").await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("querer"));
        assert!(store.get_known_lemmas("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_and_delete() {
        let store = test_store().await;
        add(&store, &[word("querer", &[])]).await;
        let id = store.get_all(None).await.unwrap()[0].id;

        assert_eq!(store.get(id).await.unwrap().lemma, "querer");
        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap_err().is_not_found());
        assert!(store.delete(id).await.unwrap_err().is_not_found());
    }

    #[test]
    fn merge_examples_dedups_and_caps() {
        let existing = vec!["a".to_string(), "b".to_string()];
        let incoming = vec![
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
            "e".to_string(),
            "f".to_string(),
        ];
        let merged = merge_examples(&existing, &incoming);
        assert_eq!(merged, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn examples_string_coerced_to_list() {
        let json = serde_json::json!({
            "word": "quiere",
            "lemma": "querer",
            "translation": "veut",
            "examples": "Trump quiere imponer su ley"
        });
        let w: NewWord = serde_json::from_value(json).unwrap();
        assert_eq!(w.examples, vec!["Trump quiere imponer su ley"]);
    }

    #[test]
    fn examples_missing_defaults_empty() {
        let json = serde_json::json!({
            "word": "casa",
            "lemma": "casa",
            "translation": "maison"
        });
        let w: NewWord = serde_json::from_value(json).unwrap();
        assert!(w.examples.is_empty());
    }
}
