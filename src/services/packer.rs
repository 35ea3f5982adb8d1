// src/services/packer.rs

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::{
    models::{
        ids::{ChapterId, QuestionId, SetId, TitleId, UnitId},
        question_set::{QuestionSet, QuizType, SetScope},
    },
    services::{error::PackError, locks::KeyedLocks},
    store::{QuestionFilter, SetFilter, Store},
};

/// What one packing run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackOutcome {
    pub sets_created: usize,
    pub sets_updated: usize,
    pub questions_packed: usize,
    pub created_set_ids: Vec<SetId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPackReport {
    pub chapter_id: ChapterId,
    pub success: bool,
    pub message: String,
    pub total_questions: usize,
    pub newly_added: usize,
    pub sets_created: usize,
    pub sets_updated: usize,
    pub active_sets: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRebuildReport {
    pub title_id: TitleId,
    pub success: bool,
    pub message: String,
    pub total_questions: usize,
    pub sets_created: usize,
    pub sets_deleted: u64,
    pub active_sets: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleChapterReport {
    pub groups_processed: usize,
    pub groups_failed: usize,
    pub sets_created: usize,
    pub questions_processed: usize,
}

type Universe = (SetScope, QuizType);

/// Distributes questions into bounded sets, filling the newest open set
/// before creating new ones.
#[derive(Clone)]
pub struct SetPacker {
    store: Store,
    locks: Arc<KeyedLocks<Universe>>,
}

impl SetPacker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Incremental fill-then-create for one (scope, quiz type) universe.
    ///
    /// `questions` must not already be in a set of this universe; callers
    /// that need deduplication do it first (see [`SetPacker::pack_chapter`]).
    pub async fn pack_questions(
        &self,
        scope: SetScope,
        quiz_type: QuizType,
        questions: &[QuestionId],
    ) -> Result<PackOutcome, PackError> {
        self.pack_questions_in_unit(scope, quiz_type, None, questions)
            .await
    }

    /// Same as [`SetPacker::pack_questions`], tagging newly created sets with `unit_id`.
    pub async fn pack_questions_in_unit(
        &self,
        scope: SetScope,
        quiz_type: QuizType,
        unit_id: Option<UnitId>,
        questions: &[QuestionId],
    ) -> Result<PackOutcome, PackError> {
        let _guard = self.locks.lock((scope, quiz_type)).await;
        self.fill_then_create(scope, quiz_type, unit_id, questions)
            .await
    }

    /// Caller must hold the universe lock.
    async fn fill_then_create(
        &self,
        scope: SetScope,
        quiz_type: QuizType,
        unit_id: Option<UnitId>,
        questions: &[QuestionId],
    ) -> Result<PackOutcome, PackError> {
        let policy = quiz_type.policy();
        let now = Utc::now();
        let mut outcome = PackOutcome::default();
        let mut remaining = questions;

        if remaining.is_empty() {
            return Ok(outcome);
        }

        // Bounded types only fill sets that have not been published yet.
        let target = self
            .store
            .sets
            .latest_set(&scope, quiz_type, !policy.always_active)
            .await?;

        if let Some(mut set) = target {
            let take = set.room().min(remaining.len());
            if take > 0 {
                set.append(&remaining[..take], now);
                self.store.sets.update_set(&set).await?;
                tracing::debug!(
                    "Filled {} set {} with {} questions (now {}, active: {})",
                    quiz_type,
                    set.set_number,
                    take,
                    set.total_questions(),
                    set.is_active
                );
                outcome.sets_updated += 1;
                outcome.questions_packed += take;
                remaining = &remaining[take..];
            }
        }

        if remaining.is_empty() {
            return Ok(outcome);
        }

        let mut pool = remaining.to_vec();
        pool.shuffle(&mut rand::rng());

        for chunk in pool.chunks(policy.capacity) {
            let set_number = self
                .store
                .sets
                .max_set_number(&scope, quiz_type)
                .await?
                .checked_add(1)
                .ok_or(PackError::SetNumberOverflow)?;
            let mut set = QuestionSet::new(scope, quiz_type, set_number, chunk.to_vec(), now);
            set.unit_id = unit_id;
            self.store.sets.insert_set(&set).await?;

            tracing::debug!(
                "Created {} set {} with {} questions (active: {})",
                quiz_type,
                set_number,
                chunk.len(),
                set.is_active
            );
            outcome.sets_created += 1;
            outcome.questions_packed += chunk.len();
            outcome.created_set_ids.push(set.id);
        }

        Ok(outcome)
    }

    /// Packs the chapter's active questions that are not yet in any of its chapter sets.
    pub async fn pack_chapter(&self, chapter_id: ChapterId) -> Result<ChapterPackReport, PackError> {
        let chapter = self
            .store
            .taxonomy
            .get_chapter(chapter_id)
            .await?
            .ok_or(PackError::ChapterNotFound(chapter_id))?;

        let scope = SetScope::chapter(chapter_id);
        let _guard = self.locks.lock((scope, QuizType::Chapter)).await;

        let questions = self
            .store
            .questions
            .list_active(&QuestionFilter {
                chapter_id: Some(chapter_id),
                ..QuestionFilter::default()
            })
            .await?;

        let mut report = ChapterPackReport {
            chapter_id,
            success: false,
            message: String::new(),
            total_questions: questions.len(),
            newly_added: 0,
            sets_created: 0,
            sets_updated: 0,
            active_sets: 0,
        };

        if questions.is_empty() {
            report.message = "No questions found for this chapter".to_string();
            return Ok(report);
        }

        let existing = self.chapter_sets(chapter_id).await?;
        let assigned: HashSet<QuestionId> = existing
            .iter()
            .flat_map(|s| s.question_ids().iter().copied())
            .collect();

        let fresh: Vec<QuestionId> = questions
            .iter()
            .map(|q| q.id)
            .filter(|id| !assigned.contains(id))
            .collect();

        if fresh.is_empty() {
            report.message = "All questions are already assigned to sets".to_string();
            report.active_sets = existing.iter().filter(|s| s.is_active).count();
            return Ok(report);
        }

        let outcome = self
            .fill_then_create(scope, QuizType::Chapter, Some(chapter.unit_id), &fresh)
            .await?;

        report.success = true;
        report.newly_added = fresh.len();
        report.sets_created = outcome.sets_created;
        report.sets_updated = outcome.sets_updated;
        report.active_sets = self
            .chapter_sets(chapter_id)
            .await?
            .iter()
            .filter(|s| s.is_active)
            .count();
        report.message = format!(
            "Added {} questions: {} new sets, {} updated",
            fresh.len(),
            outcome.sets_created,
            outcome.sets_updated
        );

        tracing::info!(
            "Packed chapter {} ({}): {}",
            chapter.name.en,
            chapter_id,
            report.message
        );
        Ok(report)
    }

    async fn chapter_sets(&self, chapter_id: ChapterId) -> Result<Vec<QuestionSet>, PackError> {
        Ok(self
            .store
            .sets
            .list_sets(&SetFilter {
                scope: SetScope::chapter(chapter_id),
                quiz_type: Some(QuizType::Chapter),
                active_only: false,
            })
            .await?)
    }

    /// Runs [`SetPacker::pack_chapter`] for every chapter. One failing chapter
    /// is reported and does not stop the rest.
    pub async fn pack_all_chapters(&self) -> Result<Vec<ChapterPackReport>, PackError> {
        let chapters = self.store.taxonomy.list_chapters(None).await?;
        let mut reports = Vec::with_capacity(chapters.len());

        for chapter in chapters {
            match self.pack_chapter(chapter.id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!("Failed to pack chapter {}: {}", chapter.id, e);
                    reports.push(ChapterPackReport {
                        chapter_id: chapter.id,
                        success: false,
                        message: e.to_string(),
                        total_questions: 0,
                        newly_added: 0,
                        sets_created: 0,
                        sets_updated: 0,
                        active_sets: 0,
                    });
                }
            }
        }

        tracing::info!("Chapter packing finished for {} chapters", reports.len());
        Ok(reports)
    }

    /// Replaces the title's sets with a fresh shuffle of all its active questions.
    pub async fn rebuild_title(&self, title_id: TitleId) -> Result<TitleRebuildReport, PackError> {
        let scope = SetScope::title(title_id);
        let _guard = self.locks.lock((scope, QuizType::Title)).await;

        let questions = self
            .store
            .questions
            .list_active(&QuestionFilter {
                title_id: Some(title_id),
                ..QuestionFilter::default()
            })
            .await?;

        if questions.is_empty() {
            return Ok(TitleRebuildReport {
                title_id,
                success: false,
                message: "No questions found for this title".to_string(),
                total_questions: 0,
                sets_created: 0,
                sets_deleted: 0,
                active_sets: 0,
            });
        }

        let ids: Vec<QuestionId> = questions.iter().map(|q| q.id).collect();
        let (sets_deleted, created) = self.rebuild_locked(scope, QuizType::Title, &ids).await?;
        let active_sets = created.iter().filter(|s| s.is_active).count();

        tracing::info!(
            "Rebuilt title {}: {} questions into {} sets ({} replaced)",
            title_id,
            ids.len(),
            created.len(),
            sets_deleted
        );

        Ok(TitleRebuildReport {
            title_id,
            success: true,
            message: format!("Created {} sets", created.len()),
            total_questions: ids.len(),
            sets_created: created.len(),
            sets_deleted,
            active_sets,
        })
    }

    /// Rebuilds `title-chapter` sets for every (title, chapter) pair among
    /// active questions, optionally limited to one title.
    pub async fn rebuild_title_chapters(
        &self,
        title_id: Option<TitleId>,
    ) -> Result<TitleChapterReport, PackError> {
        let questions = self
            .store
            .questions
            .list_active(&QuestionFilter {
                title_id,
                require_title_and_chapter: true,
                ..QuestionFilter::default()
            })
            .await?;

        // BTreeSet keeps group processing order stable across runs.
        let mut groups: BTreeSet<(TitleId, ChapterId)> = BTreeSet::new();
        for q in &questions {
            if let (Some(t), Some(c)) = (q.title_id, q.chapter_id) {
                groups.insert((t, c));
            }
        }

        let mut report = TitleChapterReport::default();
        for (title, chapter) in groups {
            let ids: Vec<QuestionId> = questions
                .iter()
                .filter(|q| q.title_id == Some(title) && q.chapter_id == Some(chapter))
                .map(|q| q.id)
                .collect();

            let scope = SetScope::title_chapter(title, chapter);
            let _guard = self.locks.lock((scope, QuizType::TitleChapter)).await;

            match self.rebuild_locked(scope, QuizType::TitleChapter, &ids).await {
                Ok((_, created)) => {
                    report.groups_processed += 1;
                    report.sets_created += created.len();
                    report.questions_processed += ids.len();
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to rebuild title-chapter sets for title {} chapter {}: {}",
                        title,
                        chapter,
                        e
                    );
                    report.groups_failed += 1;
                }
            }
        }

        tracing::info!(
            "Title-chapter rebuild: {} groups, {} sets, {} questions",
            report.groups_processed,
            report.sets_created,
            report.questions_processed
        );
        Ok(report)
    }

    /// Deletes the universe and recreates it from `ids`, shuffled, numbered from 1.
    /// Caller must hold the universe lock.
    async fn rebuild_locked(
        &self,
        scope: SetScope,
        quiz_type: QuizType,
        ids: &[QuestionId],
    ) -> Result<(u64, Vec<QuestionSet>), PackError> {
        let deleted = self.store.sets.delete_sets(&scope, quiz_type).await?;

        let mut pool = ids.to_vec();
        pool.shuffle(&mut rand::rng());

        let now = Utc::now();
        let mut created = Vec::new();
        for (index, chunk) in pool.chunks(quiz_type.policy().capacity).enumerate() {
            let set_number = nth_set_number(index)?;
            let set = QuestionSet::new(scope, quiz_type, set_number, chunk.to_vec(), now);
            self.store.sets.insert_set(&set).await?;
            created.push(set);
        }
        Ok((deleted, created))
    }
}

/// 1-based set number of the chunk at `index`.
fn nth_set_number(index: usize) -> Result<u32, PackError> {
    index
        .checked_add(1)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(PackError::SetNumberOverflow)
}
