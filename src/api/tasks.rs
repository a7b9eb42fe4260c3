//! Task polling endpoint.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::tasks::Task;

use super::{ApiResult, AppState};

/// GET /api/tasks/{id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(task))
}
