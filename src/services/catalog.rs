// src/services/catalog.rs

//! Read-side queries over sets and their questions.

use std::collections::HashSet;

use serde::Serialize;

use crate::{
    config::DEFAULT_PAGE_SIZE,
    models::{
        ids::{ChapterId, SetId, SubjectId, TitleId, UnitId},
        question::PublicQuestion,
        question_set::{QuestionSet, QuizType, SetScope, SetSummary},
        taxonomy::{Chapter, Subject, Unit},
    },
    store::{QuestionFilter, SetFilter, Store, StoreError},
};

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_sets: usize,
    pub limit: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: usize) -> Self {
        let total_pages = u32::try_from(total.div_ceil(limit as usize)).unwrap_or(u32::MAX);
        Self {
            current_page: page,
            total_pages,
            total_sets: total,
            limit,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSetsPage {
    pub chapter: Chapter,
    pub sets: Vec<SetSummary>,
    pub pagination: Pagination,
}

/// A chapter and its sets, before progress annotation.
#[derive(Debug, Clone)]
pub struct ChapterWithSets {
    pub chapter: Chapter,
    pub sets: Vec<QuestionSet>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWithQuestions {
    pub set: QuestionSet,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDetail {
    pub unit: Unit,
    pub chapters: Vec<Chapter>,
}

/// All subjects, or only those holding active questions of `title_id`.
pub async fn list_subjects(
    store: &Store,
    title_id: Option<TitleId>,
) -> Result<Vec<Subject>, StoreError> {
    let subjects = store.taxonomy.list_subjects().await?;
    let Some(title_id) = title_id else {
        return Ok(subjects);
    };

    let used: HashSet<SubjectId> = store
        .questions
        .list_active(&QuestionFilter {
            title_id: Some(title_id),
            ..QuestionFilter::default()
        })
        .await?
        .into_iter()
        .filter_map(|q| q.subject_id)
        .collect();

    Ok(subjects.into_iter().filter(|s| used.contains(&s.id)).collect())
}

/// The unit with its chapters. `None` if the unit does not exist.
pub async fn unit_detail(store: &Store, unit_id: UnitId) -> Result<Option<UnitDetail>, StoreError> {
    let Some(unit) = store.taxonomy.get_unit(unit_id).await? else {
        return Ok(None);
    };
    let chapters = store.taxonomy.list_chapters(Some(unit_id)).await?;
    Ok(Some(UnitDetail { unit, chapters }))
}

/// Active sets matching the given tags, ordered by set number.
pub async fn list_active_sets(
    store: &Store,
    scope: SetScope,
    quiz_type: Option<QuizType>,
) -> Result<Vec<SetSummary>, StoreError> {
    let sets = store
        .sets
        .list_sets(&SetFilter {
            scope,
            quiz_type,
            active_only: true,
        })
        .await?;
    Ok(sets.iter().map(SetSummary::from).collect())
}

/// One page of the chapter's `chapter`-type sets. `None` if the chapter does not exist.
pub async fn chapter_sets_page(
    store: &Store,
    chapter_id: ChapterId,
    page: Option<u32>,
    limit: Option<u32>,
    active_only: bool,
) -> Result<Option<ChapterSetsPage>, StoreError> {
    let Some(chapter) = store.taxonomy.get_chapter(chapter_id).await? else {
        return Ok(None);
    };

    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let all = store
        .sets
        .list_sets(&SetFilter {
            scope: SetScope::chapter(chapter_id),
            quiz_type: Some(QuizType::Chapter),
            active_only,
        })
        .await?;

    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let sets = all
        .iter()
        .skip(skip)
        .take(limit as usize)
        .map(SetSummary::from)
        .collect();

    Ok(Some(ChapterSetsPage {
        chapter,
        sets,
        pagination: Pagination::new(page, limit, all.len()),
    }))
}

/// Chapters of a unit with their sets.
///
/// The quiz type defaults to `title-chapter` when a title is given and to
/// `chapter` otherwise.
pub async fn unit_sets(
    store: &Store,
    unit_id: UnitId,
    title_id: Option<TitleId>,
    quiz_type: Option<QuizType>,
    active_only: bool,
) -> Result<Vec<ChapterWithSets>, StoreError> {
    let quiz_type = quiz_type.unwrap_or(if title_id.is_some() {
        QuizType::TitleChapter
    } else {
        QuizType::Chapter
    });

    let chapters = store.taxonomy.list_chapters(Some(unit_id)).await?;
    let mut grouped = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let sets = store
            .sets
            .list_sets(&SetFilter {
                scope: SetScope {
                    title_id,
                    chapter_id: Some(chapter.id),
                    exam_id: None,
                },
                quiz_type: Some(quiz_type),
                active_only,
            })
            .await?;
        grouped.push(ChapterWithSets { chapter, sets });
    }
    Ok(grouped)
}

/// The set with its active questions in set order, answer keys stripped.
pub async fn set_with_questions(
    store: &Store,
    set_id: SetId,
) -> Result<Option<SetWithQuestions>, StoreError> {
    let Some(set) = store.sets.get_set(set_id).await? else {
        return Ok(None);
    };

    let questions = store
        .questions
        .get_questions(set.question_ids())
        .await?
        .into_iter()
        .filter(|q| q.is_active())
        .map(PublicQuestion::from)
        .collect();

    Ok(Some(SetWithQuestions { set, questions }))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{
        ids::QuestionId,
        question::{OptionKey, QuestionStatus, tests::sample_question},
        text::Bilingual,
    };

    async fn seed_chapter(store: &Store, unit_id: UnitId, name: &str) -> Chapter {
        let chapter = Chapter {
            id: ChapterId::new(),
            unit_id,
            code: format!("CH_{name}"),
            name: Bilingual::same(name),
            description: Bilingual::default(),
        };
        store.taxonomy.insert_chapter(&chapter).await.unwrap();
        chapter
    }

    async fn seed_sets(store: &Store, scope: SetScope, quiz_type: QuizType, sizes: &[usize]) {
        for (i, n) in sizes.iter().enumerate() {
            let ids = (0..*n).map(|_| QuestionId::new()).collect();
            let set = QuestionSet::new(scope, quiz_type, i as u32 + 1, ids, Utc::now());
            store.sets.insert_set(&set).await.unwrap();
        }
    }

    #[test]
    fn pagination_block() {
        let p = Pagination::new(2, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let empty = Pagination::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[tokio::test]
    async fn chapter_pages_slice_in_set_order() {
        let store = Store::in_memory();
        let chapter = seed_chapter(&store, UnitId::new(), "Algebra").await;
        seed_sets(&store, SetScope::chapter(chapter.id), QuizType::Chapter, &[100; 12]).await;

        let page = chapter_sets_page(&store, chapter.id, Some(2), Some(5), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.sets.len(), 5);
        assert_eq!(page.sets[0].set_number, 6);
        assert_eq!(page.pagination.total_sets, 12);
        assert_eq!(page.pagination.total_pages, 3);

        assert!(
            chapter_sets_page(&store, ChapterId::new(), None, None, false)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unit_listing_picks_quiz_type_from_title() {
        let store = Store::in_memory();
        let unit = UnitId::new();
        let title = TitleId::new();
        let a = seed_chapter(&store, unit, "A").await;
        let b = seed_chapter(&store, unit, "B").await;
        seed_sets(&store, SetScope::chapter(a.id), QuizType::Chapter, &[100, 20]).await;
        seed_sets(&store, SetScope::title_chapter(title, b.id), QuizType::TitleChapter, &[7]).await;

        let plain = unit_sets(&store, unit, None, None, false).await.unwrap();
        assert_eq!(plain.len(), 2);
        assert_eq!(plain[0].chapter.id, a.id);
        assert_eq!(plain[0].sets.len(), 2);
        assert!(plain[1].sets.is_empty());

        let active = unit_sets(&store, unit, None, None, true).await.unwrap();
        assert_eq!(active[0].sets.len(), 1);

        let titled = unit_sets(&store, unit, Some(title), None, false).await.unwrap();
        assert!(titled[0].sets.is_empty());
        assert_eq!(titled[1].sets.len(), 1);
    }

    #[tokio::test]
    async fn subjects_can_be_narrowed_to_a_title() {
        let store = Store::in_memory();
        let title = TitleId::new();
        let mut subjects = Vec::new();
        for name in ["History", "Geography"] {
            let subject = Subject {
                id: SubjectId::new(),
                code: format!("SUB_{name}"),
                name: Bilingual::same(name),
                description: Bilingual::default(),
            };
            store.taxonomy.insert_subject(&subject).await.unwrap();
            subjects.push(subject);
        }
        let mut tagged = sample_question(OptionKey::A);
        tagged.subject_id = Some(subjects[0].id);
        tagged.title_id = Some(title);
        store.questions.insert_questions(&[tagged]).await.unwrap();

        let all = list_subjects(&store, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name.en, "Geography");

        let narrowed = list_subjects(&store, Some(title)).await.unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, subjects[0].id);
    }

    #[tokio::test]
    async fn unit_detail_lists_its_chapters() {
        let store = Store::in_memory();
        let unit = Unit {
            id: UnitId::new(),
            subject_id: SubjectId::new(),
            code: "UNIT_RAJ-000001".into(),
            name: Bilingual::same("Rajasthan"),
            description: Bilingual::default(),
        };
        store.taxonomy.insert_unit(&unit).await.unwrap();
        seed_chapter(&store, unit.id, "Rivers").await;
        seed_chapter(&store, UnitId::new(), "Elsewhere").await;

        let detail = unit_detail(&store, unit.id).await.unwrap().unwrap();
        assert_eq!(detail.chapters.len(), 1);
        assert_eq!(detail.chapters[0].name.en, "Rivers");
        assert!(unit_detail(&store, UnitId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_questions_hide_inactive_ones() {
        let store = Store::in_memory();
        let live = sample_question(OptionKey::A);
        let mut retired = sample_question(OptionKey::B);
        retired.status = QuestionStatus::Inactive;
        store
            .questions
            .insert_questions(&[live.clone(), retired.clone()])
            .await
            .unwrap();

        let set = QuestionSet::new(
            SetScope::default(),
            QuizType::Practice,
            1,
            vec![live.id, retired.id],
            Utc::now(),
        );
        store.sets.insert_set(&set).await.unwrap();

        let loaded = set_with_questions(&store, set.id).await.unwrap().unwrap();
        assert_eq!(loaded.questions.len(), 1);
        assert_eq!(loaded.questions[0].id, live.id);

        let json = serde_json::to_value(&loaded).unwrap();
        assert!(json["questions"][0].get("correctOptionKey").is_none());
    }
}
