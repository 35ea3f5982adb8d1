// src/handlers/sets.rs

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    handlers::ok,
    models::{
        ids::{ChapterId, ExamId, SetId, TitleId, UnitId},
        question_set::{QuizType, SetScope},
        taxonomy::Chapter,
    },
    services::{
        catalog,
        progress::{self, AnnotatedSet},
    },
    state::AppState,
    store::Store,
    utils::jwt::Claims,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetListQuery {
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub exam_id: Option<ExamId>,
    pub quiz_type: Option<QuizType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSetsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSetsQuery {
    pub title_id: Option<TitleId>,
    pub quiz_type: Option<QuizType>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedChapter {
    pub chapter: Chapter,
    pub sets: Vec<AnnotatedSet>,
}

/// Active sets matching the tag filters, by set number.
pub async fn list_sets(
    State(store): State<Store>,
    Query(params): Query<SetListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let scope = SetScope {
        title_id: params.title_id,
        chapter_id: params.chapter_id,
        exam_id: params.exam_id,
    };
    let sets = catalog::list_active_sets(&store, scope, params.quiz_type).await?;
    Ok(ok(sets))
}

/// A set with its active questions. Answer keys are never included.
pub async fn get_set(
    State(store): State<Store>,
    Path(id): Path<SetId>,
) -> Result<impl IntoResponse, AppError> {
    let set = catalog::set_with_questions(&store, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question set {} not found", id)))?;
    Ok(ok(set))
}

pub async fn chapter_sets(
    State(store): State<Store>,
    Path(chapter_id): Path<ChapterId>,
    Query(params): Query<ChapterSetsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = catalog::chapter_sets_page(
        &store,
        chapter_id,
        params.page,
        params.limit,
        params.active_only,
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Chapter {} not found", chapter_id)))?;
    Ok(ok(page))
}

/// Chapters of a unit with their sets, annotated with the caller's progress.
pub async fn unit_sets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(unit_id): Path<UnitId>,
    Query(params): Query<UnitSetsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let grouped = catalog::unit_sets(
        &state.store,
        unit_id,
        params.title_id,
        params.quiz_type,
        params.active_only,
    )
    .await?;

    // One attempt lookup for the whole unit, then split back per chapter.
    let all_sets: Vec<_> = grouped.iter().flat_map(|g| g.sets.iter().cloned()).collect();
    let mut annotated = progress::annotate(&state.store, user_id, &all_sets)
        .await?
        .into_iter();

    let chapters: Vec<AnnotatedChapter> = grouped
        .into_iter()
        .map(|group| AnnotatedChapter {
            sets: annotated.by_ref().take(group.sets.len()).collect(),
            chapter: group.chapter,
        })
        .collect();
    Ok(ok(chapters))
}
