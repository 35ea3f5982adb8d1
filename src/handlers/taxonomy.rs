// src/handlers/taxonomy.rs

//! Public browsing of titles, exams, subjects and units, so clients can
//! discover the ids the set endpoints take.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    handlers::ok,
    models::ids::{SubjectId, TitleId, UnitId},
    services::catalog,
    store::Store,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectQuery {
    pub title_id: Option<TitleId>,
}

pub async fn list_titles(State(store): State<Store>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(store.taxonomy.list_titles().await?))
}

pub async fn list_exams(State(store): State<Store>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(store.taxonomy.list_exams().await?))
}

/// All subjects; with `titleId`, only those that title has questions in.
pub async fn list_subjects(
    State(store): State<Store>,
    Query(params): Query<SubjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(catalog::list_subjects(&store, params.title_id).await?))
}

pub async fn subject_units(
    State(store): State<Store>,
    Path(subject_id): Path<SubjectId>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(store.taxonomy.list_units(Some(subject_id)).await?))
}

pub async fn get_unit(
    State(store): State<Store>,
    Path(unit_id): Path<UnitId>,
) -> Result<impl IntoResponse, AppError> {
    let detail = catalog::unit_detail(&store, unit_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unit {} not found", unit_id)))?;
    Ok(ok(detail))
}
