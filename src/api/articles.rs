//! Article extraction endpoint. Returns a task snapshot to poll.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::jobs::extract;
use crate::tasks::{Task, TaskKind};

use super::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_word_count")]
    pub word_count: usize,
}

fn default_word_count() -> usize {
    extract::DEFAULT_WORD_COUNT
}

/// POST /api/articles/extract
pub async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<Json<Task>> {
    let id = state.orchestrator.create_task(TaskKind::Extraction).await;
    state
        .orchestrator
        .run(
            id,
            extract::run(
                state.deps.clone(),
                request.url,
                request.prompt,
                request.word_count,
            ),
        )
        .await?;

    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(task))
}
