//! Vocabulary endpoints: paginated listing, stats, lookup, delete, and
//! model-assisted search.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::{VocabEntry, VocabStats};

use super::{not_found, ApiResult, AppState};

const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub theme: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

/// Paginated response envelope.
#[derive(Debug, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// GET /api/vocabulary
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<VocabEntry>>> {
    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, MAX_PAGE_SIZE);

    let all = state.deps.vocab.get_all(params.theme.as_deref()).await?;
    let total = all.len();
    let total_pages = total.div_ceil(page_size);
    // Saturate so an absurd page number yields an empty page, not an overflow.
    let offset = page.saturating_sub(1).saturating_mul(page_size);
    let items = all.into_iter().skip(offset).take(page_size).collect();

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
        total_pages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub theme: Option<String>,
}

/// GET /api/vocabulary/stats
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<VocabStats>> {
    let stats = state.deps.vocab.get_stats(params.theme.as_deref()).await?;
    Ok(Json(stats))
}

/// GET /api/vocabulary/{id}
pub async fn get_word(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<VocabEntry>> {
    let entry = state.deps.vocab.get(id).await?;
    Ok(Json(entry))
}

/// DELETE /api/vocabulary/{id}
pub async fn delete_word(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.deps.vocab.delete(id).await?;
    Ok(Json(json!({"message": "Word deleted successfully"})))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub theme: Option<String>,
}

/// POST /api/vocabulary/search
///
/// Semantic search: the vocabulary model picks the entry best matching the
/// query.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let entries = state.deps.vocab.get_all(request.theme.as_deref()).await?;
    if entries.is_empty() {
        return Err(not_found("No words found to search"));
    }

    let picked = state
        .deps
        .model
        .pick_word(&entries, &request.query)
        .await?
        .and_then(|lemma| entries.into_iter().find(|e| e.lemma == lemma));

    match picked {
        Some(entry) => Ok(Json(json!({"word": entry}))),
        None => Err(not_found("No word matched the query")),
    }
}
