// src/services/ingest.rs

//! Bulk question import: validates rows, finds or creates the taxonomy,
//! skips duplicates, inserts what is left and packs it into sets.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{
        ids::{ChapterId, ExamId, QuestionId, SubjectId, TitleId, UnitId},
        question::{Difficulty, OptionKey, Question, QuestionOption, QuestionStatus, validate_option_keys},
        question_set::{QuizType, SetScope},
        taxonomy::{Chapter, Exam, Subject, Title, Unit, generate_code},
        text::Bilingual,
    },
    services::{
        error::IngestError,
        packer::{PackOutcome, SetPacker},
    },
    store::{Store, StoreError},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOption {
    pub key: String,
    #[serde(default)]
    pub text_hi: String,
    #[serde(default)]
    pub text_en: String,
}

/// One row of a bulk upload, in the flat shape the admin spreadsheets export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuestion {
    pub subject_name: String,
    pub subject_description_hi: Option<String>,
    pub subject_description_en: Option<String>,

    pub unit_name: String,
    pub unit_description_hi: Option<String>,
    pub unit_description_en: Option<String>,

    pub chapter_name: String,
    pub chapter_description_hi: Option<String>,
    pub chapter_description_en: Option<String>,

    #[serde(default)]
    pub question_text_hi: String,
    #[serde(default)]
    pub question_text_en: String,
    pub question_number: Option<i32>,
    #[serde(default)]
    pub options: Vec<BulkOption>,
    pub correct_option_key: String,
    pub explanation_hi: Option<String>,
    pub explanation_en: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub is_previous_year: bool,
    pub previous_exam_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportRequest {
    /// Title tag for every row, e.g. "Networking 500 Questions".
    #[validate(length(max = 200))]
    pub title: Option<String>,
    /// Exam tag for every row, e.g. "RAS 2025 Mains".
    #[validate(length(max = 200))]
    pub exam: Option<String>,
    /// Keep the rows out of the shared chapter sets (title and exam sets still apply).
    #[serde(default)]
    pub exclude_from_global_chapter_sets: bool,
    #[validate(length(min = 1, max = 5000, message = "questions must contain 1 to 5000 rows"))]
    pub questions: Vec<BulkQuestion>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub total: usize,
    pub created: usize,
    pub titles_created: usize,
    pub exams_created: usize,
    pub subjects_created: usize,
    pub units_created: usize,
    pub chapters_created: usize,
    pub sets_created: usize,
    pub sets_updated: usize,
    pub errors: Vec<String>,
    /// Up to five ids of inserted questions.
    pub sample_ids: Vec<QuestionId>,
}

impl IngestReport {
    fn absorb(&mut self, outcome: &PackOutcome) {
        self.sets_created += outcome.sets_created;
        self.sets_updated += outcome.sets_updated;
    }
}

/// Name lookups already resolved in this batch.
#[derive(Default)]
struct TaxonomyCache {
    subjects: HashMap<String, SubjectId>,
    units: HashMap<(SubjectId, String), UnitId>,
    chapters: HashMap<(UnitId, String), ChapterId>,
}

struct Placement {
    subject_id: SubjectId,
    unit_id: UnitId,
    chapter_id: ChapterId,
}

/// Imports a batch. Problems with individual rows land in `errors`; only
/// storage failures on the whole batch abort.
pub async fn ingest(
    store: &Store,
    packer: &SetPacker,
    req: BulkImportRequest,
) -> Result<IngestReport, IngestError> {
    req.validate()
        .map_err(|e| IngestError::Validation(e.to_string()))?;

    let mut report = IngestReport {
        total: req.questions.len(),
        ..IngestReport::default()
    };

    let title_id = match non_blank(req.title.as_deref()) {
        Some(name) => Some(
            find_or_create_title(store, name, req.exclude_from_global_chapter_sets, &mut report)
                .await?,
        ),
        None => None,
    };
    let exam_id = match non_blank(req.exam.as_deref()) {
        Some(name) => Some(find_or_create_exam(store, name, &mut report).await?),
        None => None,
    };

    let mut cache = TaxonomyCache::default();
    let mut seen_in_batch: HashSet<(ChapterId, Bilingual)> = HashSet::new();
    let mut to_insert: Vec<Question> = Vec::new();

    for (index, row) in req.questions.iter().enumerate() {
        let label = format!("Q{}", index + 1);

        let (options, correct_option_key) = match parse_options(row) {
            Ok(parsed) => parsed,
            Err(message) => {
                report.errors.push(format!("{label}: {message}"));
                continue;
            }
        };

        let text = Bilingual::new(row.question_text_hi.trim(), row.question_text_en.trim()).sanitized();
        if text.is_blank() {
            report.errors.push(format!("{label}: question text is required"));
            continue;
        }

        let placement = match place(store, row, &mut cache, &mut report).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Bulk import row {} failed: {}", index + 1, e);
                report.errors.push(format!("{label} ERROR: {e}"));
                continue;
            }
        };

        let duplicate = !seen_in_batch.insert((placement.chapter_id, text.clone()))
            || store
                .questions
                .text_exists(placement.chapter_id, title_id, exam_id, &text)
                .await?;
        if duplicate {
            let preview: String = row.question_text_hi.chars().take(50).collect();
            report.errors.push(format!("{label} DUPLICATE: {preview}..."));
            continue;
        }

        let question = Question {
            id: QuestionId::new(),
            subject_id: Some(placement.subject_id),
            unit_id: Some(placement.unit_id),
            chapter_id: Some(placement.chapter_id),
            title_id,
            exam_id,
            question_number: Some(
                row.question_number
                    .unwrap_or_else(|| i32::try_from(index + 1).unwrap_or(i32::MAX)),
            ),
            text,
            options,
            correct_option_key,
            explanation: Bilingual::new(
                row.explanation_hi.clone().unwrap_or_default(),
                row.explanation_en.clone().unwrap_or_default(),
            )
            .sanitized(),
            difficulty: row.difficulty.unwrap_or_default(),
            status: QuestionStatus::Active,
            is_previous_year: row.is_previous_year,
            previous_exam_code: non_blank(row.previous_exam_code.as_deref()).map(str::to_string),
            created_at: Utc::now(),
        };
        to_insert.push(question);
    }

    if to_insert.is_empty() {
        tracing::info!("Bulk import: nothing to insert ({} errors)", report.errors.len());
        return Ok(report);
    }

    store.questions.insert_questions(&to_insert).await?;
    report.created = to_insert.len();
    report.sample_ids = to_insert.iter().take(5).map(|q| q.id).collect();

    // Pack per chapter so each universe sees the batch in row order.
    let mut by_chapter: BTreeMap<ChapterId, (UnitId, Vec<QuestionId>)> = BTreeMap::new();
    for q in &to_insert {
        if let (Some(chapter), Some(unit)) = (q.chapter_id, q.unit_id) {
            by_chapter
                .entry(chapter)
                .or_insert_with(|| (unit, Vec::new()))
                .1
                .push(q.id);
        }
    }

    for (chapter_id, (unit_id, ids)) in by_chapter {
        let mut runs: Vec<(SetScope, QuizType, Option<UnitId>)> = Vec::new();
        if let Some(t) = title_id {
            runs.push((SetScope::title(t), QuizType::Title, None));
        }
        if let Some(e) = exam_id {
            runs.push((SetScope::exam(e), QuizType::Exam, None));
        }
        if !req.exclude_from_global_chapter_sets {
            runs.push((SetScope::chapter(chapter_id), QuizType::Chapter, Some(unit_id)));
        }
        if let Some(t) = title_id {
            runs.push((SetScope::title_chapter(t, chapter_id), QuizType::TitleChapter, None));
        }

        for (scope, quiz_type, unit) in runs {
            match packer.pack_questions_in_unit(scope, quiz_type, unit, &ids).await {
                Ok(outcome) => report.absorb(&outcome),
                Err(e) => {
                    tracing::error!(
                        "Failed to pack {} questions of chapter {} into {} sets: {}",
                        ids.len(),
                        chapter_id,
                        quiz_type,
                        e
                    );
                    report
                        .errors
                        .push(format!("Packing {quiz_type} sets for chapter {chapter_id} failed: {e}"));
                }
            }
        }
    }

    tracing::info!(
        "Bulk import: {} of {} questions created, {} sets created, {} updated, {} errors",
        report.created,
        report.total,
        report.sets_created,
        report.sets_updated,
        report.errors.len()
    );
    Ok(report)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses the option list and checks the correct key against it.
fn parse_options(row: &BulkQuestion) -> Result<(Vec<QuestionOption>, OptionKey), String> {
    let mut options = Vec::with_capacity(row.options.len());
    for opt in &row.options {
        let key: OptionKey = opt.key.parse().map_err(|e| format!("{e}"))?;
        options.push(QuestionOption {
            key,
            text: Bilingual::new(opt.text_hi.trim(), opt.text_en.trim()).sanitized(),
        });
    }
    let correct = row.correct_option_key.trim();
    validate_option_keys(&options, correct).map_err(|e| e.to_string())?;
    let correct: OptionKey = correct.parse().map_err(|e| format!("{e}"))?;
    Ok((options, correct))
}

fn describe(hi: &Option<String>, en: &Option<String>) -> Bilingual {
    Bilingual::new(hi.clone().unwrap_or_default(), en.clone().unwrap_or_default()).sanitized()
}

/// Resolves the row's subject, unit and chapter, creating whichever is missing.
async fn place(
    store: &Store,
    row: &BulkQuestion,
    cache: &mut TaxonomyCache,
    report: &mut IngestReport,
) -> Result<Placement, IngestError> {
    let subject_name = row.subject_name.trim();
    let unit_name = row.unit_name.trim();
    let chapter_name = row.chapter_name.trim();
    if subject_name.is_empty() || unit_name.is_empty() || chapter_name.is_empty() {
        return Err(IngestError::Validation(
            "subjectName, unitName and chapterName are required".to_string(),
        ));
    }

    let subject_id = match cache.subjects.get(subject_name) {
        Some(id) => *id,
        None => {
            let id = match store.taxonomy.find_subject_by_name(subject_name).await? {
                Some(existing) => existing.id,
                None => {
                    let subject = Subject {
                        id: SubjectId::new(),
                        code: generate_code(subject_name, "SUB_", Utc::now()),
                        name: Bilingual::same(subject_name),
                        description: describe(&row.subject_description_hi, &row.subject_description_en),
                    };
                    store.taxonomy.insert_subject(&subject).await?;
                    report.subjects_created += 1;
                    subject.id
                }
            };
            cache.subjects.insert(subject_name.to_string(), id);
            id
        }
    };

    let unit_key = (subject_id, unit_name.to_string());
    let unit_id = match cache.units.get(&unit_key) {
        Some(id) => *id,
        None => {
            let id = match store.taxonomy.find_unit_by_name(subject_id, unit_name).await? {
                Some(existing) => existing.id,
                None => {
                    let unit = Unit {
                        id: UnitId::new(),
                        subject_id,
                        code: generate_code(unit_name, "U_", Utc::now()),
                        name: Bilingual::same(unit_name),
                        description: describe(&row.unit_description_hi, &row.unit_description_en),
                    };
                    store.taxonomy.insert_unit(&unit).await?;
                    report.units_created += 1;
                    unit.id
                }
            };
            cache.units.insert(unit_key, id);
            id
        }
    };

    let chapter_key = (unit_id, chapter_name.to_string());
    let chapter_id = match cache.chapters.get(&chapter_key) {
        Some(id) => *id,
        None => {
            let id = match store.taxonomy.find_chapter_by_name(unit_id, chapter_name).await? {
                Some(existing) => existing.id,
                None => {
                    let chapter = Chapter {
                        id: ChapterId::new(),
                        unit_id,
                        code: generate_code(chapter_name, "C_", Utc::now()),
                        name: Bilingual::same(chapter_name),
                        description: describe(
                            &row.chapter_description_hi,
                            &row.chapter_description_en,
                        ),
                    };
                    store.taxonomy.insert_chapter(&chapter).await?;
                    report.chapters_created += 1;
                    chapter.id
                }
            };
            cache.chapters.insert(chapter_key, id);
            id
        }
    };

    Ok(Placement {
        subject_id,
        unit_id,
        chapter_id,
    })
}

async fn find_or_create_title(
    store: &Store,
    name: &str,
    ai_generated: bool,
    report: &mut IngestReport,
) -> Result<TitleId, StoreError> {
    if let Some(existing) = store.taxonomy.find_title_by_name(name).await? {
        return Ok(existing.id);
    }
    let title = Title {
        id: TitleId::new(),
        code: generate_code(name, "T_", Utc::now()),
        name: Bilingual::same(name),
        description: Bilingual::default(),
        ai_generated,
    };
    store.taxonomy.insert_title(&title).await?;
    report.titles_created += 1;
    tracing::info!("Created title '{}' ({})", name, title.id);
    Ok(title.id)
}

async fn find_or_create_exam(
    store: &Store,
    name: &str,
    report: &mut IngestReport,
) -> Result<ExamId, StoreError> {
    if let Some(existing) = store.taxonomy.find_exam_by_name(name).await? {
        return Ok(existing.id);
    }
    let exam = Exam {
        id: ExamId::new(),
        code: generate_code(name, "E_", Utc::now()),
        name: Bilingual::same(name),
    };
    store.taxonomy.insert_exam(&exam).await?;
    report.exams_created += 1;
    tracing::info!("Created exam '{}' ({})", name, exam.id);
    Ok(exam.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SetFilter;

    fn row(chapter: &str, text: &str, correct: &str) -> BulkQuestion {
        BulkQuestion {
            subject_name: "Computer Science".into(),
            subject_description_hi: None,
            subject_description_en: None,
            unit_name: "DBMS".into(),
            unit_description_hi: None,
            unit_description_en: None,
            chapter_name: chapter.into(),
            chapter_description_hi: None,
            chapter_description_en: None,
            question_text_hi: text.into(),
            question_text_en: text.into(),
            question_number: None,
            options: ["A", "B", "C", "D"]
                .iter()
                .map(|k| BulkOption {
                    key: k.to_string(),
                    text_hi: format!("विकल्प {k}"),
                    text_en: format!("Option {k}"),
                })
                .collect(),
            correct_option_key: correct.into(),
            explanation_hi: None,
            explanation_en: None,
            difficulty: None,
            is_previous_year: false,
            previous_exam_code: None,
        }
    }

    fn request(title: Option<&str>, questions: Vec<BulkQuestion>) -> BulkImportRequest {
        BulkImportRequest {
            title: title.map(str::to_string),
            exam: None,
            exclude_from_global_chapter_sets: false,
            questions,
        }
    }

    #[tokio::test]
    async fn bad_rows_are_reported_and_the_rest_imported() {
        let store = Store::in_memory();
        let packer = SetPacker::new(store.clone());

        let rows = vec![
            row("Normalization", "What is 1NF?", "A"),
            row("Normalization", "What is 2NF?", "E"),
            row("Normalization", "What is 1NF?", "B"),
            row("Transactions", "What is ACID?", "C"),
        ];
        let report = ingest(&store, &packer, request(Some("DBMS 500"), rows)).await.unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Q2: INVALID OPTION \"E\""));
        assert!(report.errors[1].starts_with("Q3 DUPLICATE"));
        assert_eq!(report.subjects_created, 1);
        assert_eq!(report.units_created, 1);
        assert_eq!(report.chapters_created, 2);
        assert_eq!(report.titles_created, 1);
        assert_eq!(report.sample_ids.len(), 2);
    }

    #[tokio::test]
    async fn imported_rows_are_packed_into_every_universe() {
        let store = Store::in_memory();
        let packer = SetPacker::new(store.clone());

        let rows = (0..3).map(|i| row("Joins", &format!("Join question {i}"), "A")).collect();
        let report = ingest(&store, &packer, request(Some("SQL Drill"), rows)).await.unwrap();
        assert_eq!(report.created, 3);
        // title, chapter and title-chapter sets.
        assert_eq!(report.sets_created, 3);

        let all = store.sets.list_sets(&SetFilter::default()).await.unwrap();
        let types: HashSet<QuizType> = all.iter().map(|s| s.quiz_type).collect();
        assert_eq!(
            types,
            HashSet::from([QuizType::Title, QuizType::Chapter, QuizType::TitleChapter])
        );
        assert!(all.iter().all(|s| s.total_questions() == 3));

        // Importing the same rows again finds every one as a duplicate.
        let rows = (0..3).map(|i| row("Joins", &format!("Join question {i}"), "A")).collect();
        let again = ingest(&store, &packer, request(Some("SQL Drill"), rows)).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.errors.len(), 3);
        assert_eq!(again.titles_created, 0);
        assert_eq!(again.chapters_created, 0);
    }

    #[tokio::test]
    async fn excluded_rows_skip_global_chapter_sets() {
        let store = Store::in_memory();
        let packer = SetPacker::new(store.clone());

        let mut req = request(Some("Generated Pack"), vec![row("Indexes", "What is a B-tree?", "B")]);
        req.exam = Some("RAS 2025 Mains".into());
        req.exclude_from_global_chapter_sets = true;

        let report = ingest(&store, &packer, req).await.unwrap();
        assert_eq!(report.exams_created, 1);

        let all = store.sets.list_sets(&SetFilter::default()).await.unwrap();
        assert!(all.iter().all(|s| s.quiz_type != QuizType::Chapter));
        let exam_set = all.iter().find(|s| s.quiz_type == QuizType::Exam).unwrap();
        assert!(exam_set.is_active);
    }

    #[tokio::test]
    async fn empty_batches_fail_validation() {
        let store = Store::in_memory();
        let packer = SetPacker::new(store.clone());
        let err = ingest(&store, &packer, request(None, Vec::new())).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
