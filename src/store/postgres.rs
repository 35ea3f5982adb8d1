// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::{
    models::{
        attempt::{AnswerSheet, Attempt, QuestionTimes, TestDuration},
        ids::{
            AttemptId, ChapterId, ExamId, QuestionId, SetId, SubjectId, TitleId, UnitId, UserId,
        },
        question::{Question, QuestionOption},
        question_set::{QuestionSet, QuizType, SetScope},
        taxonomy::{Chapter, Exam, Subject, Title, Unit},
        text::Bilingual,
        user::User,
    },
    store::{
        AttemptRepository, HistoryFilter, QuestionFilter, QuestionRepository,
        QuestionSetRepository, SetFilter, StoreError, TaxonomyRepository, UserRepository,
    },
};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_err(what: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(format!("invalid {what} in database: {value}"))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(what: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| decode_err(what, value))
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct TaxonomyRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    code: String,
    name_hi: String,
    name_en: String,
    description_hi: String,
    description_en: String,
}

impl TaxonomyRow {
    fn name(&self) -> Bilingual {
        Bilingual::new(self.name_hi.clone(), self.name_en.clone())
    }

    fn description(&self) -> Bilingual {
        Bilingual::new(self.description_hi.clone(), self.description_en.clone())
    }

    fn parent(&self, what: &str) -> Result<Uuid, StoreError> {
        self.parent_id.ok_or_else(|| decode_err(what, "missing parent"))
    }
}

#[derive(sqlx::FromRow)]
struct TitleRow {
    id: Uuid,
    code: String,
    name_hi: String,
    name_en: String,
    description_hi: String,
    description_en: String,
    ai_generated: bool,
}

impl From<TitleRow> for Title {
    fn from(row: TitleRow) -> Self {
        Title {
            id: TitleId::from_uuid(row.id),
            code: row.code,
            name: Bilingual::new(row.name_hi, row.name_en),
            description: Bilingual::new(row.description_hi, row.description_en),
            ai_generated: row.ai_generated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExamRow {
    id: Uuid,
    code: String,
    name_hi: String,
    name_en: String,
}

impl From<ExamRow> for Exam {
    fn from(row: ExamRow) -> Self {
        Exam {
            id: ExamId::from_uuid(row.id),
            code: row.code,
            name: Bilingual::new(row.name_hi, row.name_en),
        }
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    subject_id: Option<Uuid>,
    unit_id: Option<Uuid>,
    chapter_id: Option<Uuid>,
    title_id: Option<Uuid>,
    exam_id: Option<Uuid>,
    question_number: Option<i32>,
    text_hi: String,
    text_en: String,
    options: Json<Vec<QuestionOption>>,
    correct_option_key: String,
    explanation_hi: String,
    explanation_en: String,
    difficulty: String,
    status: String,
    is_previous_year: bool,
    previous_exam_code: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: QuestionId::from_uuid(row.id),
            subject_id: row.subject_id.map(SubjectId::from_uuid),
            unit_id: row.unit_id.map(UnitId::from_uuid),
            chapter_id: row.chapter_id.map(ChapterId::from_uuid),
            title_id: row.title_id.map(TitleId::from_uuid),
            exam_id: row.exam_id.map(ExamId::from_uuid),
            question_number: row.question_number,
            text: Bilingual::new(row.text_hi, row.text_en),
            options: row.options.0,
            correct_option_key: row
                .correct_option_key
                .parse()
                .map_err(|e| decode_err("correct_option_key", e))?,
            explanation: Bilingual::new(row.explanation_hi, row.explanation_en),
            difficulty: row
                .difficulty
                .parse()
                .map_err(|e| decode_err("difficulty", e))?,
            status: row.status.parse().map_err(|e| decode_err("status", e))?,
            is_previous_year: row.is_previous_year,
            previous_exam_code: row.previous_exam_code,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SetRow {
    id: Uuid,
    title_id: Option<Uuid>,
    chapter_id: Option<Uuid>,
    exam_id: Option<Uuid>,
    unit_id: Option<Uuid>,
    quiz_type: String,
    name_hi: String,
    name_en: String,
    question_ids: Vec<Uuid>,
    set_number: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SetRow> for QuestionSet {
    type Error = StoreError;

    fn try_from(row: SetRow) -> Result<Self, Self::Error> {
        let quiz_type: QuizType = row
            .quiz_type
            .parse()
            .map_err(|e| decode_err("quiz_type", e))?;
        Ok(QuestionSet::from_parts(
            SetId::from_uuid(row.id),
            SetScope {
                title_id: row.title_id.map(TitleId::from_uuid),
                chapter_id: row.chapter_id.map(ChapterId::from_uuid),
                exam_id: row.exam_id.map(ExamId::from_uuid),
            },
            row.unit_id.map(UnitId::from_uuid),
            quiz_type,
            Bilingual::new(row.name_hi, row.name_en),
            row.question_ids
                .into_iter()
                .map(QuestionId::from_uuid)
                .collect(),
            to_u32("set_number", row.set_number)?,
            row.is_active,
            row.created_at,
            row.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    user_id: Uuid,
    question_set_id: Uuid,
    status: String,
    attempted_questions: Vec<Uuid>,
    user_answers: Json<AnswerSheet>,
    question_times: Json<QuestionTimes>,
    score: f64,
    correct_answers: i32,
    total_questions: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    time_taken: i32,
    is_reset: bool,
    quiz_type: String,
    title_id: Option<Uuid>,
    chapter_id: Option<Uuid>,
    exam_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: AttemptId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            question_set_id: SetId::from_uuid(row.question_set_id),
            status: row.status.parse().map_err(|e| decode_err("status", e))?,
            attempted_questions: row
                .attempted_questions
                .into_iter()
                .map(QuestionId::from_uuid)
                .collect(),
            user_answers: row.user_answers.0,
            question_times: row.question_times.0,
            score: row.score,
            correct_answers: to_u32("correct_answers", row.correct_answers)?,
            total_questions: to_u32("total_questions", row.total_questions)?,
            test_duration: TestDuration {
                start_time: row.start_time,
                end_time: row.end_time,
                time_taken: to_u32("time_taken", row.time_taken)?,
            },
            is_reset: row.is_reset,
            quiz_type: row
                .quiz_type
                .parse()
                .map_err(|e| decode_err("quiz_type", e))?,
            title_id: row.title_id.map(TitleId::from_uuid),
            chapter_id: row.chapter_id.map(ChapterId::from_uuid),
            exam_id: row.exam_id.map(ExamId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            password: row.password,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

const QUESTION_COLUMNS: &str = "id, subject_id, unit_id, chapter_id, title_id, exam_id, \
     question_number, text_hi, text_en, options, correct_option_key, explanation_hi, \
     explanation_en, difficulty, status, is_previous_year, previous_exam_code, created_at";

const SET_COLUMNS: &str = "id, title_id, chapter_id, exam_id, unit_id, quiz_type, name_hi, \
     name_en, question_ids, set_number, is_active, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, user_id, question_set_id, status, attempted_questions, \
     user_answers, question_times, score, correct_answers, total_questions, start_time, \
     end_time, time_taken, is_reset, quiz_type, title_id, chapter_id, exam_id, created_at, \
     updated_at";

/// Browsing predicate over `$1..$3` = (title, chapter, exam); absent tags match anything.
const SCOPE_MATCH: &str = "($1::uuid IS NULL OR title_id = $1) \
     AND ($2::uuid IS NULL OR chapter_id = $2) \
     AND ($3::uuid IS NULL OR exam_id = $3)";

/// Exact universe predicate over `$1..$3`; an absent tag only matches NULL.
const SCOPE_EXACT: &str = "title_id IS NOT DISTINCT FROM $1::uuid \
     AND chapter_id IS NOT DISTINCT FROM $2::uuid \
     AND exam_id IS NOT DISTINCT FROM $3::uuid";

fn scope_binds(scope: &SetScope) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>) {
    (
        scope.title_id.map(|t| t.as_uuid()),
        scope.chapter_id.map(|c| c.as_uuid()),
        scope.exam_id.map(|e| e.as_uuid()),
    )
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

#[async_trait]
impl TaxonomyRepository for PgStore {
    async fn find_subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, NULL::uuid AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM subjects
            WHERE name_hi = $1 OR name_en = $1
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(subject_from_row))
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subjects (id, code, name_hi, name_en, description_hi, description_en)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(subject.id.as_uuid())
        .bind(&subject.code)
        .bind(&subject.name.hi)
        .bind(&subject.name.en)
        .bind(&subject.description.hi)
        .bind(&subject.description.en)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_unit_by_name(
        &self,
        subject_id: SubjectId,
        name: &str,
    ) -> Result<Option<Unit>, StoreError> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, subject_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM units
            WHERE subject_id = $1 AND (name_hi = $2 OR name_en = $2)
            LIMIT 1
            "#,
        )
        .bind(subject_id.as_uuid())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(unit_from_row).transpose()
    }

    async fn insert_unit(&self, unit: &Unit) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO units (id, subject_id, code, name_hi, name_en, description_hi, description_en)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(unit.id.as_uuid())
        .bind(unit.subject_id.as_uuid())
        .bind(&unit.code)
        .bind(&unit.name.hi)
        .bind(&unit.name.en)
        .bind(&unit.description.hi)
        .bind(&unit.description.en)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_chapter_by_name(
        &self,
        unit_id: UnitId,
        name: &str,
    ) -> Result<Option<Chapter>, StoreError> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, unit_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM chapters
            WHERE unit_id = $1 AND (name_hi = $2 OR name_en = $2)
            LIMIT 1
            "#,
        )
        .bind(unit_id.as_uuid())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(chapter_from_row).transpose()
    }

    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chapters (id, unit_id, code, name_hi, name_en, description_hi, description_en)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(chapter.id.as_uuid())
        .bind(chapter.unit_id.as_uuid())
        .bind(&chapter.code)
        .bind(&chapter.name.hi)
        .bind(&chapter.name.en)
        .bind(&chapter.description.hi)
        .bind(&chapter.description.en)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, unit_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM chapters
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(chapter_from_row).transpose()
    }

    async fn list_chapters(&self, unit_id: Option<UnitId>) -> Result<Vec<Chapter>, StoreError> {
        let rows = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, unit_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM chapters
            WHERE $1::uuid IS NULL OR unit_id = $1
            ORDER BY name_en, id
            "#,
        )
        .bind(unit_id.map(|u| u.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(chapter_from_row).collect()
    }

    async fn find_title_by_name(&self, name: &str) -> Result<Option<Title>, StoreError> {
        let row = sqlx::query_as::<_, TitleRow>(
            r#"
            SELECT id, code, name_hi, name_en, description_hi, description_en, ai_generated
            FROM titles
            WHERE name_hi = $1 OR name_en = $1
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Title::from))
    }

    async fn insert_title(&self, title: &Title) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO titles (id, code, name_hi, name_en, description_hi, description_en, ai_generated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(title.id.as_uuid())
        .bind(&title.code)
        .bind(&title.name.hi)
        .bind(&title.name.en)
        .bind(&title.description.hi)
        .bind(&title.description.en)
        .bind(title.ai_generated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_exam_by_name(&self, name: &str) -> Result<Option<Exam>, StoreError> {
        let row = sqlx::query_as::<_, ExamRow>(
            r#"
            SELECT id, code, name_hi, name_en
            FROM exams
            WHERE name_hi = $1 OR name_en = $1
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Exam::from))
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO exams (id, code, name_hi, name_en) VALUES ($1, $2, $3, $4)")
            .bind(exam.id.as_uuid())
            .bind(&exam.code)
            .bind(&exam.name.hi)
            .bind(&exam.name.en)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let rows = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, NULL::uuid AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM subjects
            ORDER BY name_en, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(subject_from_row).collect())
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError> {
        let row = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, subject_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM units
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(unit_from_row).transpose()
    }

    async fn list_units(&self, subject_id: Option<SubjectId>) -> Result<Vec<Unit>, StoreError> {
        let rows = sqlx::query_as::<_, TaxonomyRow>(
            r#"
            SELECT id, subject_id AS parent_id, code, name_hi, name_en, description_hi, description_en
            FROM units
            WHERE $1::uuid IS NULL OR subject_id = $1
            ORDER BY name_en, id
            "#,
        )
        .bind(subject_id.map(|s| s.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(unit_from_row).collect()
    }

    async fn list_titles(&self) -> Result<Vec<Title>, StoreError> {
        let rows = sqlx::query_as::<_, TitleRow>(
            r#"
            SELECT id, code, name_hi, name_en, description_hi, description_en, ai_generated
            FROM titles
            ORDER BY name_en, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Title::from).collect())
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, StoreError> {
        let rows = sqlx::query_as::<_, ExamRow>(
            "SELECT id, code, name_hi, name_en FROM exams ORDER BY name_en, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Exam::from).collect())
    }
}

fn subject_from_row(r: TaxonomyRow) -> Subject {
    Subject {
        id: SubjectId::from_uuid(r.id),
        name: r.name(),
        description: r.description(),
        code: r.code,
    }
}

fn unit_from_row(r: TaxonomyRow) -> Result<Unit, StoreError> {
    Ok(Unit {
        id: UnitId::from_uuid(r.id),
        subject_id: SubjectId::from_uuid(r.parent("unit")?),
        name: r.name(),
        description: r.description(),
        code: r.code,
    })
}

fn chapter_from_row(r: TaxonomyRow) -> Result<Chapter, StoreError> {
    Ok(Chapter {
        id: ChapterId::from_uuid(r.id),
        unit_id: UnitId::from_uuid(r.parent("chapter")?),
        name: r.name(),
        description: r.description(),
        code: r.code,
    })
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

#[async_trait]
impl QuestionRepository for PgStore {
    async fn insert_questions(&self, questions: &[Question]) -> Result<(), StoreError> {
        // One transaction so a failed batch leaves no half-inserted rows.
        let mut tx = self.pool.begin().await?;
        for q in questions {
            sqlx::query(
                r#"
                INSERT INTO questions (
                    id, subject_id, unit_id, chapter_id, title_id, exam_id, question_number,
                    text_hi, text_en, options, correct_option_key, explanation_hi, explanation_en,
                    difficulty, status, is_previous_year, previous_exam_code, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                "#,
            )
            .bind(q.id.as_uuid())
            .bind(q.subject_id.map(|v| v.as_uuid()))
            .bind(q.unit_id.map(|v| v.as_uuid()))
            .bind(q.chapter_id.map(|v| v.as_uuid()))
            .bind(q.title_id.map(|v| v.as_uuid()))
            .bind(q.exam_id.map(|v| v.as_uuid()))
            .bind(q.question_number)
            .bind(&q.text.hi)
            .bind(&q.text.en)
            .bind(Json(&q.options))
            .bind(q.correct_option_key.as_str())
            .bind(&q.explanation.hi)
            .bind(&q.explanation.en)
            .bind(q.difficulty.as_str())
            .bind(q.status.as_str())
            .bind(q.is_previous_year)
            .bind(&q.previous_exam_code)
            .bind(q.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Question::try_from).transpose()
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;

        let mut by_id: HashMap<QuestionId, Question> = HashMap::with_capacity(rows.len());
        for row in rows {
            let q = Question::try_from(row)?;
            by_id.insert(q.id, q);
        }
        // Keep the caller's order.
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_active(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError> {
        let sql = format!(
            r#"
            SELECT {QUESTION_COLUMNS}
            FROM questions
            WHERE status = 'active'
              AND ($1::uuid IS NULL OR chapter_id = $1)
              AND ($2::uuid IS NULL OR title_id = $2)
              AND ($3::uuid IS NULL OR exam_id = $3)
              AND (NOT $4 OR (title_id IS NOT NULL AND chapter_id IS NOT NULL))
            ORDER BY question_number ASC NULLS LAST, seq ASC
            "#
        );
        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(filter.chapter_id.map(|v| v.as_uuid()))
            .bind(filter.title_id.map(|v| v.as_uuid()))
            .bind(filter.exam_id.map(|v| v.as_uuid()))
            .bind(filter.require_title_and_chapter)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Question::try_from).collect()
    }

    async fn text_exists(
        &self,
        chapter_id: ChapterId,
        title_id: Option<TitleId>,
        exam_id: Option<ExamId>,
        text: &Bilingual,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM questions
                WHERE chapter_id = $1
                  AND ($2::uuid IS NULL OR title_id = $2)
                  AND ($3::uuid IS NULL OR exam_id = $3)
                  AND text_hi = $4
                  AND text_en = $5
            )
            "#,
        )
        .bind(chapter_id.as_uuid())
        .bind(title_id.map(|v| v.as_uuid()))
        .bind(exam_id.map(|v| v.as_uuid()))
        .bind(&text.hi)
        .bind(&text.en)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Question sets
// ---------------------------------------------------------------------------

#[async_trait]
impl QuestionSetRepository for PgStore {
    async fn get_set(&self, id: SetId) -> Result<Option<QuestionSet>, StoreError> {
        let sql = format!("SELECT {SET_COLUMNS} FROM question_sets WHERE id = $1");
        let row = sqlx::query_as::<_, SetRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(QuestionSet::try_from).transpose()
    }

    async fn get_sets(&self, ids: &[SetId]) -> Result<Vec<QuestionSet>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {SET_COLUMNS} FROM question_sets WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, SetRow>(&sql)
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(QuestionSet::try_from).collect()
    }

    async fn latest_set(
        &self,
        scope: &SetScope,
        quiz_type: QuizType,
        inactive_only: bool,
    ) -> Result<Option<QuestionSet>, StoreError> {
        let (title, chapter, exam) = scope_binds(scope);
        let sql = format!(
            "SELECT {SET_COLUMNS} FROM question_sets \
             WHERE {SCOPE_EXACT} AND quiz_type = $4 AND (NOT $5 OR NOT is_active) \
             ORDER BY set_number DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SetRow>(&sql)
            .bind(title)
            .bind(chapter)
            .bind(exam)
            .bind(quiz_type.as_str())
            .bind(inactive_only)
            .fetch_optional(&self.pool)
            .await?;
        row.map(QuestionSet::try_from).transpose()
    }

    async fn max_set_number(
        &self,
        scope: &SetScope,
        quiz_type: QuizType,
    ) -> Result<u32, StoreError> {
        let (title, chapter, exam) = scope_binds(scope);
        let sql = format!(
            "SELECT COALESCE(MAX(set_number), 0) FROM question_sets \
             WHERE {SCOPE_EXACT} AND quiz_type = $4"
        );
        let max = sqlx::query_scalar::<_, i32>(&sql)
            .bind(title)
            .bind(chapter)
            .bind(exam)
            .bind(quiz_type.as_str())
            .fetch_one(&self.pool)
            .await?;
        to_u32("set_number", max)
    }

    async fn insert_set(&self, set: &QuestionSet) -> Result<(), StoreError> {
        let raw: Vec<Uuid> = set.question_ids().iter().map(|id| id.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO question_sets (
                id, title_id, chapter_id, exam_id, unit_id, quiz_type, name_hi, name_en,
                question_ids, total_questions, set_number, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, cardinality($9::uuid[]), $10, $11, $12, $13)
            "#,
        )
        .bind(set.id.as_uuid())
        .bind(set.scope.title_id.map(|v| v.as_uuid()))
        .bind(set.scope.chapter_id.map(|v| v.as_uuid()))
        .bind(set.scope.exam_id.map(|v| v.as_uuid()))
        .bind(set.unit_id.map(|v| v.as_uuid()))
        .bind(set.quiz_type.as_str())
        .bind(&set.name.hi)
        .bind(&set.name.en)
        .bind(&raw)
        .bind(to_i32(set.set_number))
        .bind(set.is_active)
        .bind(set.created_at)
        .bind(set.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_set(&self, set: &QuestionSet) -> Result<(), StoreError> {
        let raw: Vec<Uuid> = set.question_ids().iter().map(|id| id.as_uuid()).collect();
        let result = sqlx::query(
            r#"
            UPDATE question_sets
            SET question_ids = $2,
                total_questions = cardinality($2::uuid[]),
                is_active = $3,
                name_hi = $4,
                name_en = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(set.id.as_uuid())
        .bind(&raw)
        .bind(set.is_active)
        .bind(&set.name.hi)
        .bind(&set.name.en)
        .bind(set.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_sets(&self, filter: &SetFilter) -> Result<Vec<QuestionSet>, StoreError> {
        let (title, chapter, exam) = scope_binds(&filter.scope);
        let sql = format!(
            "SELECT {SET_COLUMNS} FROM question_sets \
             WHERE {SCOPE_MATCH} \
               AND ($4::text IS NULL OR quiz_type = $4) \
               AND (NOT $5 OR is_active) \
             ORDER BY set_number ASC, created_at ASC"
        );
        let rows = sqlx::query_as::<_, SetRow>(&sql)
            .bind(title)
            .bind(chapter)
            .bind(exam)
            .bind(filter.quiz_type.map(|t| t.as_str()))
            .bind(filter.active_only)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(QuestionSet::try_from).collect()
    }

    async fn delete_sets(&self, scope: &SetScope, quiz_type: QuizType) -> Result<u64, StoreError> {
        let (title, chapter, exam) = scope_binds(scope);
        let sql = format!("DELETE FROM question_sets WHERE {SCOPE_EXACT} AND quiz_type = $4");
        let result = sqlx::query(&sql)
            .bind(title)
            .bind(chapter)
            .bind(exam)
            .bind(quiz_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

#[async_trait]
impl AttemptRepository for PgStore {
    async fn find_live(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Option<Attempt>, StoreError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND question_set_id = $2 AND status = 'ongoing' AND NOT is_reset \
             ORDER BY updated_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id.as_uuid())
            .bind(set_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn insert_attempt(&self, a: &Attempt) -> Result<(), StoreError> {
        let attempted: Vec<Uuid> = a.attempted_questions.iter().map(|q| q.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, user_id, question_set_id, status, attempted_questions, user_answers,
                question_times, score, correct_answers, total_questions, start_time, end_time,
                time_taken, is_reset, quiz_type, title_id, chapter_id, exam_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(a.id.as_uuid())
        .bind(a.user_id.as_uuid())
        .bind(a.question_set_id.as_uuid())
        .bind(a.status.as_str())
        .bind(&attempted)
        .bind(Json(&a.user_answers))
        .bind(Json(&a.question_times))
        .bind(a.score)
        .bind(to_i32(a.correct_answers))
        .bind(to_i32(a.total_questions))
        .bind(a.test_duration.start_time)
        .bind(a.test_duration.end_time)
        .bind(to_i32(a.test_duration.time_taken))
        .bind(a.is_reset)
        .bind(a.quiz_type.as_str())
        .bind(a.title_id.map(|v| v.as_uuid()))
        .bind(a.chapter_id.map(|v| v.as_uuid()))
        .bind(a.exam_id.map(|v| v.as_uuid()))
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_attempt(&self, a: &Attempt) -> Result<(), StoreError> {
        let attempted: Vec<Uuid> = a.attempted_questions.iter().map(|q| q.as_uuid()).collect();
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET status = $2,
                attempted_questions = $3,
                user_answers = $4,
                question_times = $5,
                score = $6,
                correct_answers = $7,
                end_time = $8,
                time_taken = $9,
                is_reset = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(a.id.as_uuid())
        .bind(a.status.as_str())
        .bind(&attempted)
        .bind(Json(&a.user_answers))
        .bind(Json(&a.question_times))
        .bind(a.score)
        .bind(to_i32(a.correct_answers))
        .bind(a.test_duration.end_time)
        .bind(to_i32(a.test_duration.time_taken))
        .bind(a.is_reset)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_unreset(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Vec<Attempt>, StoreError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND question_set_id = $2 AND NOT is_reset \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id.as_uuid())
            .bind(set_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Attempt::try_from).collect()
    }

    async fn find_for_sets(
        &self,
        user_id: UserId,
        set_ids: &[SetId],
    ) -> Result<Vec<Attempt>, StoreError> {
        if set_ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = set_ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND question_set_id = ANY($2) AND NOT is_reset \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id.as_uuid())
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Attempt::try_from).collect()
    }

    async fn history(
        &self,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Attempt>, StoreError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND NOT is_reset \
               AND ($2::text IS NULL OR quiz_type = $2) \
               AND ($3::uuid IS NULL OR title_id = $3) \
               AND ($4::uuid IS NULL OR chapter_id = $4) \
               AND ($5::text IS NULL OR status = $5) \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id.as_uuid())
            .bind(filter.quiz_type.map(|t| t.as_str()))
            .bind(filter.title_id.map(|v| v.as_uuid()))
            .bind(filter.chapter_id.map(|v| v.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Attempt::try_from).collect()
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password, role, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }
}
