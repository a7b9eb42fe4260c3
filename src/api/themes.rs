//! Theme endpoints: listing, detail with words, and background creation.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::jobs::theme;
use crate::store::Theme;
use crate::tasks::{Task, TaskKind};

use super::{not_found, ApiResult, AppState};

/// GET /api/themes
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Theme>>> {
    let themes = state.deps.themes.list().await?;
    Ok(Json(themes))
}

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    /// Optional term matched against lemma, surface form, and translation.
    #[serde(default)]
    pub q: Option<String>,
}

/// GET /api/themes/{name}
pub async fn get_theme(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<Value>> {
    let theme = state
        .deps
        .themes
        .get_by_name(&name)
        .await?
        .ok_or_else(|| not_found("Theme not found"))?;
    let words = state
        .deps
        .themes
        .search_words(&theme.name, params.q.as_deref())
        .await?;
    Ok(Json(json!({"theme": theme, "words": words})))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub description: String,
    #[serde(default = "default_word_count")]
    pub word_count: usize,
    #[serde(default)]
    pub deck_name: Option<String>,
}

fn default_word_count() -> usize {
    theme::DEFAULT_WORD_COUNT
}

/// POST /api/themes
///
/// Kicks off themed vocabulary generation; poll the returned task.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<Task>> {
    let id = state
        .orchestrator
        .create_task(TaskKind::TopicCreation)
        .await;
    state
        .orchestrator
        .run(
            id,
            theme::run(
                state.deps.clone(),
                request.description,
                request.word_count,
                request.deck_name,
            ),
        )
        .await?;

    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(task))
}
