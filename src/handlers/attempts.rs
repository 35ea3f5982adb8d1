// src/handlers/attempts.rs

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    handlers::{ok, ok_with_message},
    models::{
        attempt::AttemptStatus,
        ids::{ChapterId, SetId, TitleId},
        question_set::QuizType,
    },
    services::attempts::SubmitAnswer,
    state::AppState,
    store::HistoryFilter,
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRef {
    pub question_set_id: SetId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub quiz_type: Option<QuizType>,
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub status: Option<AttemptStatus>,
}

impl From<HistoryQuery> for HistoryFilter {
    fn from(q: HistoryQuery) -> Self {
        HistoryFilter {
            quiz_type: q.quiz_type,
            title_id: q.title_id,
            chapter_id: q.chapter_id,
            status: q.status,
        }
    }
}

/// Records one answer on the caller's live attempt.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitAnswer>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = state.tracker.submit_answer(user_id, &payload).await?;
    Ok(ok_with_message("Answer saved", attempt))
}

/// Returns the caller's live attempt for resuming, or `data: null`.
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SetRef>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let progress = state
        .tracker
        .get_progress(user_id, params.question_set_id)
        .await?;
    Ok(ok(progress))
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let history = state
        .tracker
        .get_history(user_id, &HistoryFilter::from(params))
        .await?;
    Ok(ok(history))
}

/// Retires the caller's attempts on a set. Resetting twice is harmless.
pub async fn reset_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SetRef>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let reset = state
        .tracker
        .reset_progress(user_id, payload.question_set_id)
        .await?;
    Ok(ok(json!({ "success": true, "reset": reset })))
}

pub async fn complete_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SetRef>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = state
        .tracker
        .complete_attempt(user_id, payload.question_set_id)
        .await?;
    Ok(ok_with_message("Test submitted", attempt))
}
