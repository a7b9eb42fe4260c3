//! Deck sync endpoints: connectivity probe and background sync.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::jobs::sync;
use crate::tasks::{Task, TaskKind};

use super::{ApiResult, AppState};

/// GET /api/sync/status
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let connected = state.deps.deck.check_connection().await;
    let message = if connected {
        "AnkiConnect is running"
    } else {
        "Cannot connect to AnkiConnect. Ensure Anki is running with the AnkiConnect add-on installed."
    };
    Json(json!({"connected": connected, "message": message}))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default = "default_true")]
    pub include_main: bool,
    #[serde(default = "default_true")]
    pub include_themes: bool,
    #[serde(default)]
    pub theme_name: Option<String>,
}

fn default_true() -> bool {
    true
}

/// POST /api/sync/anki
pub async fn sync_anki(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<Task>> {
    let id = state.orchestrator.create_task(TaskKind::DeckSync).await;
    state
        .orchestrator
        .run(
            id,
            sync::run(
                state.deps.clone(),
                request.include_main,
                request.include_themes,
                request.theme_name,
            ),
        )
        .await?;

    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(task))
}
