use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    models::{
        attempt::Attempt,
        ids::{AttemptId, ChapterId, ExamId, QuestionId, SetId, SubjectId, TitleId, UnitId, UserId},
        question::Question,
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

#[derive(Default)]
struct Tables {
    subjects: HashMap<SubjectId, Subject>,
    units: HashMap<UnitId, Unit>,
    chapters: HashMap<ChapterId, Chapter>,
    titles: HashMap<TitleId, Title>,
    exams: HashMap<ExamId, Exam>,
    questions: HashMap<QuestionId, Question>,
    /// Insertion order, so unnumbered questions list deterministically.
    question_order: Vec<QuestionId>,
    sets: HashMap<SetId, QuestionSet>,
    attempts: HashMap<AttemptId, Attempt>,
    users: HashMap<UserId, User>,
}

/// Process-local store for tests and development.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// Numbered questions first by number; unnumbered keep insertion order after them.
fn question_number_order(a: &Question, b: &Question) -> Ordering {
    match (a.question_number, b.question_number) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn newest_first(a: &Attempt, b: &Attempt) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl TaxonomyRepository for MemoryStore {
    async fn find_subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.subjects.values().find(|s| s.name.matches(name)).cloned())
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.subjects.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn find_unit_by_name(
        &self,
        subject_id: SubjectId,
        name: &str,
    ) -> Result<Option<Unit>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .units
            .values()
            .find(|u| u.subject_id == subject_id && u.name.matches(name))
            .cloned())
    }

    async fn insert_unit(&self, unit: &Unit) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn find_chapter_by_name(
        &self,
        unit_id: UnitId,
        name: &str,
    ) -> Result<Option<Chapter>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .chapters
            .values()
            .find(|c| c.unit_id == unit_id && c.name.matches(name))
            .cloned())
    }

    async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.chapters.insert(chapter.id, chapter.clone());
        Ok(())
    }

    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.chapters.get(&id).cloned())
    }

    async fn list_chapters(&self, unit_id: Option<UnitId>) -> Result<Vec<Chapter>, StoreError> {
        let guard = self.lock()?;
        let mut chapters: Vec<Chapter> = guard
            .chapters
            .values()
            .filter(|c| unit_id.is_none_or(|u| c.unit_id == u))
            .cloned()
            .collect();
        chapters.sort_by(|a, b| a.name.en.cmp(&b.name.en).then_with(|| a.id.cmp(&b.id)));
        Ok(chapters)
    }

    async fn find_title_by_name(&self, name: &str) -> Result<Option<Title>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.titles.values().find(|t| t.name.matches(name)).cloned())
    }

    async fn insert_title(&self, title: &Title) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.titles.insert(title.id, title.clone());
        Ok(())
    }

    async fn find_exam_by_name(&self, name: &str) -> Result<Option<Exam>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.exams.values().find(|e| e.name.matches(name)).cloned())
    }

    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.exams.insert(exam.id, exam.clone());
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let guard = self.lock()?;
        let mut subjects: Vec<Subject> = guard.subjects.values().cloned().collect();
        subjects.sort_by(|a, b| a.name.en.cmp(&b.name.en).then_with(|| a.id.cmp(&b.id)));
        Ok(subjects)
    }

    async fn get_unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.units.get(&id).cloned())
    }

    async fn list_units(&self, subject_id: Option<SubjectId>) -> Result<Vec<Unit>, StoreError> {
        let guard = self.lock()?;
        let mut units: Vec<Unit> = guard
            .units
            .values()
            .filter(|u| subject_id.is_none_or(|s| u.subject_id == s))
            .cloned()
            .collect();
        units.sort_by(|a, b| a.name.en.cmp(&b.name.en).then_with(|| a.id.cmp(&b.id)));
        Ok(units)
    }

    async fn list_titles(&self) -> Result<Vec<Title>, StoreError> {
        let guard = self.lock()?;
        let mut titles: Vec<Title> = guard.titles.values().cloned().collect();
        titles.sort_by(|a, b| a.name.en.cmp(&b.name.en).then_with(|| a.id.cmp(&b.id)));
        Ok(titles)
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, StoreError> {
        let guard = self.lock()?;
        let mut exams: Vec<Exam> = guard.exams.values().cloned().collect();
        exams.sort_by(|a, b| a.name.en.cmp(&b.name.en).then_with(|| a.id.cmp(&b.id)));
        Ok(exams)
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn insert_questions(&self, questions: &[Question]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        for q in questions {
            if guard.questions.insert(q.id, q.clone()).is_none() {
                guard.question_order.push(q.id);
            }
        }
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.questions.get(&id).cloned())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StoreError> {
        let guard = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| guard.questions.get(id).cloned())
            .collect())
    }

    async fn list_active(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError> {
        let guard = self.lock()?;
        let mut found: Vec<Question> = guard
            .question_order
            .iter()
            .filter_map(|id| guard.questions.get(id))
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal numbers.
        found.sort_by(question_number_order);
        Ok(found)
    }

    async fn text_exists(
        &self,
        chapter_id: ChapterId,
        title_id: Option<TitleId>,
        exam_id: Option<ExamId>,
        text: &Bilingual,
    ) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        Ok(guard.questions.values().any(|q| {
            q.chapter_id == Some(chapter_id)
                && title_id.is_none_or(|t| q.title_id == Some(t))
                && exam_id.is_none_or(|e| q.exam_id == Some(e))
                && q.text == *text
        }))
    }

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let removed = guard.questions.remove(&id).is_some();
        if removed {
            guard.question_order.retain(|q| *q != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl QuestionSetRepository for MemoryStore {
    async fn get_set(&self, id: SetId) -> Result<Option<QuestionSet>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.sets.get(&id).cloned())
    }

    async fn get_sets(&self, ids: &[SetId]) -> Result<Vec<QuestionSet>, StoreError> {
        let guard = self.lock()?;
        Ok(ids.iter().filter_map(|id| guard.sets.get(id).cloned()).collect())
    }

    async fn latest_set(
        &self,
        scope: &SetScope,
        quiz_type: QuizType,
        inactive_only: bool,
    ) -> Result<Option<QuestionSet>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .sets
            .values()
            .filter(|s| s.quiz_type == quiz_type && s.scope == *scope)
            .filter(|s| !inactive_only || !s.is_active)
            .max_by_key(|s| s.set_number)
            .cloned())
    }

    async fn max_set_number(
        &self,
        scope: &SetScope,
        quiz_type: QuizType,
    ) -> Result<u32, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .sets
            .values()
            .filter(|s| s.quiz_type == quiz_type && s.scope == *scope)
            .map(|s| s.set_number)
            .max()
            .unwrap_or(0))
    }

    async fn insert_set(&self, set: &QuestionSet) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let taken = guard.sets.values().any(|s| {
            s.quiz_type == set.quiz_type && s.scope == set.scope && s.set_number == set.set_number
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "set number {} already exists for this {} scope",
                set.set_number, set.quiz_type
            )));
        }
        guard.sets.insert(set.id, set.clone());
        Ok(())
    }

    async fn update_set(&self, set: &QuestionSet) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        match guard.sets.get_mut(&set.id) {
            Some(existing) => {
                *existing = set.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_sets(&self, filter: &SetFilter) -> Result<Vec<QuestionSet>, StoreError> {
        let guard = self.lock()?;
        let mut sets: Vec<QuestionSet> = guard
            .sets
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sets.sort_by_key(|s| (s.set_number, s.created_at));
        Ok(sets)
    }

    async fn delete_sets(&self, scope: &SetScope, quiz_type: QuizType) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let before = guard.sets.len();
        guard
            .sets
            .retain(|_, s| !(s.quiz_type == quiz_type && s.scope == *scope));
        Ok((before - guard.sets.len()) as u64)
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn find_live(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Option<Attempt>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.question_set_id == set_id && a.is_live())
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if attempt.is_live() {
            let clash = guard.attempts.values().any(|a| {
                a.user_id == attempt.user_id
                    && a.question_set_id == attempt.question_set_id
                    && a.is_live()
            });
            if clash {
                return Err(StoreError::Conflict(
                    "an ongoing attempt already exists for this set".to_string(),
                ));
            }
        }
        guard.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn save_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        match guard.attempts.get_mut(&attempt.id) {
            Some(existing) => {
                *existing = attempt.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn find_unreset(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Vec<Attempt>, StoreError> {
        let guard = self.lock()?;
        let mut found: Vec<Attempt> = guard
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.question_set_id == set_id && !a.is_reset)
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }

    async fn find_for_sets(
        &self,
        user_id: UserId,
        set_ids: &[SetId],
    ) -> Result<Vec<Attempt>, StoreError> {
        let guard = self.lock()?;
        let mut found: Vec<Attempt> = guard
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && !a.is_reset && set_ids.contains(&a.question_set_id))
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }

    async fn history(
        &self,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Attempt>, StoreError> {
        let guard = self.lock()?;
        let mut found: Vec<Attempt> = guard
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        guard.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.users.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn set(scope: SetScope, quiz_type: QuizType, number: u32, size: usize) -> QuestionSet {
        let ids = (0..size).map(|_| QuestionId::new()).collect();
        QuestionSet::new(scope, quiz_type, number, ids, Utc::now())
    }

    #[tokio::test]
    async fn latest_set_respects_universe_and_activity() {
        let store = MemoryStore::new();
        let chapter = ChapterId::new();
        let scope = SetScope::chapter(chapter);

        store.insert_set(&set(scope, QuizType::Chapter, 1, 100)).await.unwrap();
        store.insert_set(&set(scope, QuizType::Chapter, 2, 40)).await.unwrap();
        store.insert_set(&set(scope, QuizType::Practice, 7, 10)).await.unwrap();

        let target = store
            .latest_set(&scope, QuizType::Chapter, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.set_number, 2);
        assert_eq!(store.max_set_number(&scope, QuizType::Chapter).await.unwrap(), 2);
        assert_eq!(
            store
                .max_set_number(&SetScope::chapter(ChapterId::new()), QuizType::Chapter)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn duplicate_set_numbers_conflict() {
        let store = MemoryStore::new();
        let scope = SetScope::title(TitleId::new());
        store.insert_set(&set(scope, QuizType::Title, 1, 5)).await.unwrap();
        let err = store
            .insert_set(&set(scope, QuizType::Title, 1, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_live_attempt_conflicts() {
        let store = MemoryStore::new();
        let s = set(SetScope::default(), QuizType::Chapter, 1, 3);
        let user = UserId::new();

        store.insert_attempt(&Attempt::start(user, &s, Utc::now())).await.unwrap();
        let err = store
            .insert_attempt(&Attempt::start(user, &s, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
