//! Audio endpoints: background generation and MP3 serving.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::jobs::audio;
use crate::tasks::{Task, TaskKind};

use super::{not_found, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub theme: Option<String>,
}

/// POST /api/audio/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<Task>> {
    let id = state
        .orchestrator
        .create_task(TaskKind::AudioGeneration)
        .await;
    state
        .orchestrator
        .run(id, audio::run(state.deps.clone(), request.theme))
        .await?;

    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(task))
}

/// GET /api/audio/{filename}
///
/// Serves `{lemma}.mp3` from the audio directory. The filename is validated
/// so a crafted path can't reach outside it.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !is_safe_mp3_name(&filename) {
        return Err(not_found("Audio file not found"));
    }

    let path = state.audio_dir.join(&filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| not_found("Audio file not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

fn is_safe_mp3_name(filename: &str) -> bool {
    let Some(stem) = filename.strip_suffix(".mp3") else {
        return false;
    };
    !stem.is_empty()
        && !stem.starts_with('.')
        && !stem.contains(['/', '\\', '\0'])
        && !stem.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp3_name_validation() {
        assert!(is_safe_mp3_name("casa.mp3"));
        assert!(is_safe_mp3_name("está.mp3"));
        assert!(!is_safe_mp3_name("casa.wav"));
        assert!(!is_safe_mp3_name(".mp3"));
        assert!(!is_safe_mp3_name("../secret.mp3"));
        assert!(!is_safe_mp3_name("a/b.mp3"));
    }
}
