//! Persistence contracts for the exam bank.
//!
//! The services only see these traits; `PgStore` and `MemoryStore` are the
//! two interchangeable backends.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    attempt::{Attempt, AttemptStatus},
    ids::{ChapterId, ExamId, QuestionId, SetId, SubjectId, TitleId, UnitId, UserId},
    question::Question,
    question_set::{QuestionSet, QuizType, SetScope},
    taxonomy::{Chapter, Exam, Subject, Title, Unit},
    text::Bilingual,
    user::User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// A uniqueness rule was violated; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached in time; the caller may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Which active questions to load.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionFilter {
    pub chapter_id: Option<ChapterId>,
    pub title_id: Option<TitleId>,
    pub exam_id: Option<ExamId>,
    /// Only questions carrying both a title and a chapter tag.
    pub require_title_and_chapter: bool,
}

impl QuestionFilter {
    pub fn matches(&self, q: &Question) -> bool {
        q.is_active()
            && self.chapter_id.is_none_or(|c| q.chapter_id == Some(c))
            && self.title_id.is_none_or(|t| q.title_id == Some(t))
            && self.exam_id.is_none_or(|e| q.exam_id == Some(e))
            && (!self.require_title_and_chapter || (q.title_id.is_some() && q.chapter_id.is_some()))
    }
}

/// Which sets to list. Results are ordered by set number.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetFilter {
    pub scope: SetScope,
    pub quiz_type: Option<QuizType>,
    pub active_only: bool,
}

impl SetFilter {
    pub fn matches(&self, set: &QuestionSet) -> bool {
        self.scope.matches(&set.scope)
            && self.quiz_type.is_none_or(|t| set.quiz_type == t)
            && (!self.active_only || set.is_active)
    }
}

/// Filters for a user's attempt history. Reset attempts are always excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    pub quiz_type: Option<QuizType>,
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub status: Option<AttemptStatus>,
}

impl HistoryFilter {
    pub fn matches(&self, a: &Attempt) -> bool {
        !a.is_reset
            && self.quiz_type.is_none_or(|t| a.quiz_type == t)
            && self.title_id.is_none_or(|t| a.title_id == Some(t))
            && self.chapter_id.is_none_or(|c| a.chapter_id == Some(c))
            && self.status.is_none_or(|s| a.status == s)
    }
}

#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    /// Finds a subject whose Hindi or English name equals `name`.
    async fn find_subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError>;
    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError>;

    async fn find_unit_by_name(
        &self,
        subject_id: SubjectId,
        name: &str,
    ) -> Result<Option<Unit>, StoreError>;
    async fn insert_unit(&self, unit: &Unit) -> Result<(), StoreError>;

    async fn find_chapter_by_name(
        &self,
        unit_id: UnitId,
        name: &str,
    ) -> Result<Option<Chapter>, StoreError>;
    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError>;
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError>;
    /// Chapters of one unit (or all chapters), ordered by English name.
    async fn list_chapters(&self, unit_id: Option<UnitId>) -> Result<Vec<Chapter>, StoreError>;

    async fn find_title_by_name(&self, name: &str) -> Result<Option<Title>, StoreError>;
    async fn insert_title(&self, title: &Title) -> Result<(), StoreError>;

    async fn find_exam_by_name(&self, name: &str) -> Result<Option<Exam>, StoreError>;
    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError>;

    // Browsing. Every list is ordered by English name, then id.
    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;
    async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError>;
    /// Units of one subject, or all units.
    async fn list_units(&self, subject_id: Option<SubjectId>) -> Result<Vec<Unit>, StoreError>;
    async fn list_titles(&self) -> Result<Vec<Title>, StoreError>;
    async fn list_exams(&self) -> Result<Vec<Exam>, StoreError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn insert_questions(&self, questions: &[Question]) -> Result<(), StoreError>;
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError>;
    /// Fetches the given questions; missing ids are skipped.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StoreError>;
    /// Active questions matching `filter`, ordered by question number (unnumbered last).
    async fn list_active(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError>;
    /// True if the chapter already holds a question with exactly this text in
    /// the same title/exam scope.
    async fn text_exists(
        &self,
        chapter_id: ChapterId,
        title_id: Option<TitleId>,
        exam_id: Option<ExamId>,
        text: &Bilingual,
    ) -> Result<bool, StoreError>;
    /// Returns false if no such question existed.
    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait QuestionSetRepository: Send + Sync {
    async fn get_set(&self, id: SetId) -> Result<Option<QuestionSet>, StoreError>;
    async fn get_sets(&self, ids: &[SetId]) -> Result<Vec<QuestionSet>, StoreError>;
    /// Highest-numbered set of exactly this (scope, quiz type) universe; with
    /// `inactive_only`, only among unfilled sets.
    async fn latest_set(
        &self,
        scope: &SetScope,
        quiz_type: QuizType,
        inactive_only: bool,
    ) -> Result<Option<QuestionSet>, StoreError>;
    /// Highest set number in the universe, 0 if it is empty.
    async fn max_set_number(&self, scope: &SetScope, quiz_type: QuizType)
    -> Result<u32, StoreError>;
    async fn insert_set(&self, set: &QuestionSet) -> Result<(), StoreError>;
    /// Persists the question list, active flag and timestamps of an existing set.
    async fn update_set(&self, set: &QuestionSet) -> Result<(), StoreError>;
    async fn list_sets(&self, filter: &SetFilter) -> Result<Vec<QuestionSet>, StoreError>;
    /// Deletes every set of exactly this universe and returns how many were removed.
    async fn delete_sets(&self, scope: &SetScope, quiz_type: QuizType) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// The live attempt of the pair: ongoing and not reset, most recently updated first.
    async fn find_live(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Option<Attempt>, StoreError>;
    /// Fails with `Conflict` if the pair already has a live attempt.
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;
    async fn save_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;
    /// Every attempt of the pair that has not been reset, any status.
    async fn find_unreset(&self, user_id: UserId, set_id: SetId)
    -> Result<Vec<Attempt>, StoreError>;
    /// Non-reset attempts of the user over the given sets, in one lookup.
    async fn find_for_sets(
        &self,
        user_id: UserId,
        set_ids: &[SetId],
    ) -> Result<Vec<Attempt>, StoreError>;
    /// Non-reset attempts of the user, most recently updated first.
    async fn history(
        &self,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Attempt>, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` if the username is taken.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Store {
    pub taxonomy: Arc<dyn TaxonomyRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub sets: Arc<dyn QuestionSetRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self::from_backend(MemoryStore::new())
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(PgStore::new(pool))
    }

    fn from_backend<B>(backend: B) -> Self
    where
        B: TaxonomyRepository
            + QuestionRepository
            + QuestionSetRepository
            + AttemptRepository
            + UserRepository
            + Clone
            + 'static,
    {
        Self {
            taxonomy: Arc::new(backend.clone()),
            questions: Arc::new(backend.clone()),
            sets: Arc::new(backend.clone()),
            attempts: Arc::new(backend.clone()),
            users: Arc::new(backend),
        }
    }
}
