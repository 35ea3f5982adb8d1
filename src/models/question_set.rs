// src/models/question_set.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::{EXAM_SET_CAPACITY, SET_CAPACITY},
    models::{
        ids::{ChapterId, ExamId, QuestionId, SetId, TitleId, UnitId},
        text::Bilingual,
    },
};

/// Which taxonomy universe a set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuizType {
    Title,
    Chapter,
    Exam,
    TitleChapter,
    Practice,
    Unit,
}

/// Capacity and activation rule for one quiz type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingPolicy {
    pub capacity: usize,
    /// Sets are published immediately instead of when they reach capacity.
    pub always_active: bool,
}

impl PackingPolicy {
    /// Free slots in a set currently holding `current` questions.
    pub fn room(&self, current: usize) -> usize {
        self.capacity.saturating_sub(current)
    }

    pub fn is_active_at(&self, count: usize) -> bool {
        self.always_active || count >= self.capacity
    }
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizType::Title => "title",
            QuizType::Chapter => "chapter",
            QuizType::Exam => "exam",
            QuizType::TitleChapter => "title-chapter",
            QuizType::Practice => "practice",
            QuizType::Unit => "unit",
        }
    }

    pub fn policy(&self) -> PackingPolicy {
        match self {
            QuizType::Exam => PackingPolicy {
                capacity: EXAM_SET_CAPACITY,
                always_active: true,
            },
            QuizType::Title
            | QuizType::Chapter
            | QuizType::TitleChapter
            | QuizType::Practice
            | QuizType::Unit => PackingPolicy {
                capacity: SET_CAPACITY,
                always_active: false,
            },
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(QuizType::Title),
            "chapter" => Ok(QuizType::Chapter),
            "exam" => Ok(QuizType::Exam),
            "title-chapter" => Ok(QuizType::TitleChapter),
            "practice" => Ok(QuizType::Practice),
            "unit" => Ok(QuizType::Unit),
            other => Err(format!("unknown quiz type: {other}")),
        }
    }
}

/// The scope tags of a set. A packing universe is (scope, quiz type).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScope {
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub exam_id: Option<ExamId>,
}

impl SetScope {
    pub fn title(title_id: TitleId) -> Self {
        Self {
            title_id: Some(title_id),
            ..Self::default()
        }
    }

    pub fn chapter(chapter_id: ChapterId) -> Self {
        Self {
            chapter_id: Some(chapter_id),
            ..Self::default()
        }
    }

    pub fn exam(exam_id: ExamId) -> Self {
        Self {
            exam_id: Some(exam_id),
            ..Self::default()
        }
    }

    pub fn title_chapter(title_id: TitleId, chapter_id: ChapterId) -> Self {
        Self {
            title_id: Some(title_id),
            chapter_id: Some(chapter_id),
            exam_id: None,
        }
    }

    /// True if every tag present in `self` equals the same tag of `other`.
    /// Absent tags do not constrain the match.
    pub fn matches(&self, other: &SetScope) -> bool {
        fn tag<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            match want {
                Some(w) => have.as_ref() == Some(w),
                None => true,
            }
        }
        tag(&self.title_id, &other.title_id)
            && tag(&self.chapter_id, &other.chapter_id)
            && tag(&self.exam_id, &other.exam_id)
    }
}

/// A numbered, ordered bag of question references.
///
/// The id list is private: it only ever grows by [`QuestionSet::append`], so
/// `total_questions` can never drift from its length.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "QuestionSetView")]
pub struct QuestionSet {
    pub id: SetId,
    pub scope: SetScope,
    /// Informational; copied from the chapter for chapter-type sets.
    pub unit_id: Option<UnitId>,
    pub quiz_type: QuizType,
    pub name: Bilingual,
    question_ids: Vec<QuestionId>,
    pub set_number: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionSet {
    /// Creates set number `set_number` holding `question_ids`, activated per the quiz type policy.
    pub fn new(
        scope: SetScope,
        quiz_type: QuizType,
        set_number: u32,
        question_ids: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Self {
        let is_active = quiz_type.policy().is_active_at(question_ids.len());
        Self {
            id: SetId::new(),
            scope,
            unit_id: None,
            quiz_type,
            name: Self::default_name(set_number),
            question_ids,
            set_number,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a set from persisted fields without re-deriving the active flag.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: SetId,
        scope: SetScope,
        unit_id: Option<UnitId>,
        quiz_type: QuizType,
        name: Bilingual,
        question_ids: Vec<QuestionId>,
        set_number: u32,
        is_active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            scope,
            unit_id,
            quiz_type,
            name,
            question_ids,
            set_number,
            is_active,
            created_at,
            updated_at,
        }
    }

    pub fn default_name(set_number: u32) -> Bilingual {
        Bilingual::new(format!("सेट {set_number}"), format!("Set {set_number}"))
    }

    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    pub fn contains(&self, id: &QuestionId) -> bool {
        self.question_ids.contains(id)
    }

    /// Free slots left under the quiz type capacity.
    pub fn room(&self) -> usize {
        self.quiz_type.policy().room(self.total_questions())
    }

    /// Appends ids in order and recomputes the active flag.
    pub fn append(&mut self, ids: &[QuestionId], now: DateTime<Utc>) {
        self.question_ids.extend_from_slice(ids);
        self.is_active = self.quiz_type.policy().is_active_at(self.total_questions());
        self.updated_at = now;
    }
}

/// Wire shape of a set, with the derived question count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetView {
    pub id: SetId,
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub exam_id: Option<ExamId>,
    pub unit_id: Option<UnitId>,
    pub quiz_type: QuizType,
    pub name: Bilingual,
    pub question_ids: Vec<QuestionId>,
    pub total_questions: usize,
    pub set_number: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuestionSet> for QuestionSetView {
    fn from(set: QuestionSet) -> Self {
        let total_questions = set.total_questions();
        Self {
            id: set.id,
            title_id: set.scope.title_id,
            chapter_id: set.scope.chapter_id,
            exam_id: set.scope.exam_id,
            unit_id: set.unit_id,
            quiz_type: set.quiz_type,
            name: set.name,
            question_ids: set.question_ids,
            total_questions,
            set_number: set.set_number,
            is_active: set.is_active,
            created_at: set.created_at,
            updated_at: set.updated_at,
        }
    }
}

/// Compact set entry for listings (no question ids).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSummary {
    pub id: SetId,
    pub name: Bilingual,
    pub set_number: u32,
    pub quiz_type: QuizType,
    pub total_questions: usize,
    pub is_active: bool,
}

impl From<&QuestionSet> for SetSummary {
    fn from(set: &QuestionSet) -> Self {
        Self {
            id: set.id,
            name: set.name.clone(),
            set_number: set.set_number,
            quiz_type: set.quiz_type,
            total_questions: set.total_questions(),
            is_active: set.is_active,
        }
    }
}
