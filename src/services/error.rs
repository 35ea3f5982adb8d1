// src/services/error.rs

use thiserror::Error;

use crate::{
    models::ids::{ChapterId, SetId},
    store::StoreError,
};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("chapter {0} not found")]
    ChapterNotFound(ChapterId),

    #[error("set numbers for this universe are exhausted")]
    SetNumberOverflow,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("question set {0} not found")]
    SetNotFound(SetId),

    #[error("no ongoing attempt for question set {0}")]
    NoLiveAttempt(SetId),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
