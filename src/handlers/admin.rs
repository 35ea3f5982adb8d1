// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{ok, ok_with_message},
    models::{
        ids::{ChapterId, QuestionId, TitleId},
        question::{CreateQuestionRequest, OptionKey, Question, QuestionOption, QuestionStatus},
    },
    services::ingest::{self, BulkImportRequest},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleChapterRebuild {
    pub title_id: Option<TitleId>,
}

/// Imports a batch of questions and packs them into every universe they belong to.
///
/// Rows that fail are reported in `errors`; the rest are still imported.
pub async fn bulk_import(
    State(state): State<AppState>,
    Json(payload): Json<BulkImportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = ingest::ingest(&state.store, &state.packer, payload).await?;

    tracing::info!(
        "Bulk import: {}/{} created, {} errors, {} sets created",
        report.created,
        report.total,
        report.errors.len(),
        report.sets_created
    );

    let message = format!("Imported {} of {} questions", report.created, report.total);
    Ok((StatusCode::CREATED, ok_with_message(message, report)))
}

/// Creates a single question. A question placed in a chapter is packed
/// into that chapter's sets immediately.
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let Some(chapter_id) = payload.chapter_id {
        state
            .store
            .taxonomy
            .get_chapter(chapter_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Chapter {} not found", chapter_id)))?;
    }

    let question = build_question(payload)?;
    state.store.questions.insert_questions(std::slice::from_ref(&question)).await?;
    tracing::info!("Created question {}", question.id);

    let pack = match question.chapter_id {
        Some(chapter_id) => Some(state.packer.pack_chapter(chapter_id).await?),
        None => None,
    };

    Ok((
        StatusCode::CREATED,
        ok_with_message(
            "Question created",
            json!({ "question": question, "pack": pack }),
        ),
    ))
}

fn build_question(payload: CreateQuestionRequest) -> Result<Question, AppError> {
    let correct_option_key = payload
        .correct_option_key
        .trim()
        .to_uppercase()
        .parse::<OptionKey>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let question = Question {
        id: QuestionId::new(),
        subject_id: payload.subject_id,
        unit_id: payload.unit_id,
        chapter_id: payload.chapter_id,
        title_id: payload.title_id,
        exam_id: payload.exam_id,
        question_number: payload.question_number,
        text: payload.text.sanitized(),
        options: payload
            .options
            .into_iter()
            .map(|o| QuestionOption {
                key: o.key,
                text: o.text.sanitized(),
            })
            .collect(),
        correct_option_key,
        explanation: payload.explanation.sanitized(),
        difficulty: payload.difficulty,
        status: QuestionStatus::Active,
        is_previous_year: payload.is_previous_year,
        previous_exam_code: payload.previous_exam_code,
        created_at: Utc::now(),
    };

    question
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(question)
}

/// Deletes a question. Sets that referenced it simply stop showing it.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<QuestionId>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.questions.delete_question(id).await? {
        return Err(AppError::NotFound(format!("Question {} not found", id)));
    }
    tracing::info!("Deleted question {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Incrementally packs every chapter's unpacked questions.
pub async fn pack_all_chapters(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let reports = state.packer.pack_all_chapters().await?;
    let sets_created: usize = reports.iter().map(|r| r.sets_created).sum();
    Ok(ok_with_message(
        format!("Processed {} chapters, created {} sets", reports.len(), sets_created),
        reports,
    ))
}

pub async fn pack_chapter(
    State(state): State<AppState>,
    Path(chapter_id): Path<ChapterId>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.packer.pack_chapter(chapter_id).await?;
    Ok(ok_with_message(report.message.clone(), report))
}

/// Replaces a title's sets with a fresh packing of its active questions.
pub async fn rebuild_title(
    State(state): State<AppState>,
    Path(title_id): Path<TitleId>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.packer.rebuild_title(title_id).await?;
    if !report.success {
        return Err(AppError::BadRequest(report.message));
    }
    Ok(ok_with_message(report.message.clone(), report))
}

/// Rebuilds `title-chapter` sets for one title, or for every title when the body is `{}`.
pub async fn rebuild_title_chapters(
    State(state): State<AppState>,
    Json(payload): Json<TitleChapterRebuild>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.packer.rebuild_title_chapters(payload.title_id).await?;
    Ok(ok(report))
}
