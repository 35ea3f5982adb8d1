// src/services/attempts.rs

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    models::{
        attempt::{AnswerSheet, Attempt, AttemptStatus, QuestionTimes, TestDuration},
        ids::{AttemptId, QuestionId, SetId, UserId},
        question::OptionKey,
        question_set::QuestionSet,
        text::Bilingual,
    },
    services::{error::AttemptError, locks::KeyedLocks},
    store::{HistoryFilter, Store},
};

/// One answer submission as it arrives from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswer {
    pub question_set_id: SetId,
    pub question_id: QuestionId,
    pub answer_key: String,
    /// Seconds spent on this question.
    #[serde(default)]
    pub question_time: i64,
    /// Cumulative seconds for the whole attempt.
    #[serde(default)]
    pub total_time: i64,
}

impl SubmitAnswer {
    fn parse(&self) -> Result<(OptionKey, u32, u32), AttemptError> {
        let answer: OptionKey = self
            .answer_key
            .parse()
            .map_err(|_| AttemptError::Validation(format!("invalid answer key '{}'", self.answer_key)))?;
        let seconds = |name: &str, value: i64| {
            u32::try_from(value)
                .map_err(|_| AttemptError::Validation(format!("{name} must be a non-negative number of seconds")))
        };
        Ok((
            answer,
            seconds("questionTime", self.question_time)?,
            seconds("totalTime", self.total_time)?,
        ))
    }
}

/// The resumable state of a live attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub attempt_id: AttemptId,
    pub status: AttemptStatus,
    pub attempted_questions: Vec<QuestionId>,
    pub user_answers: AnswerSheet,
    pub question_times: QuestionTimes,
    pub test_duration: TestDuration,
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
}

impl From<Attempt> for ProgressSnapshot {
    fn from(a: Attempt) -> Self {
        Self {
            attempt_id: a.id,
            status: a.status,
            attempted_questions: a.attempted_questions,
            user_answers: a.user_answers,
            question_times: a.question_times,
            test_duration: a.test_duration,
            score: a.score,
            correct_answers: a.correct_answers,
            total_questions: a.total_questions,
        }
    }
}

/// An attempt joined with its set's name and size. The set may have been
/// deleted by a rebuild, in which case the join fields are empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub set_name: Option<Bilingual>,
    pub set_total_questions: Option<usize>,
}

/// Tracks users' answers against question sets with negative marking.
#[derive(Clone)]
pub struct AttemptTracker {
    store: Store,
    locks: Arc<KeyedLocks<(UserId, SetId)>>,
}

impl AttemptTracker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Records one answer on the user's live attempt, opening one if needed.
    ///
    /// Re-answering a question replaces the previous answer and moves the
    /// score by the difference. A question that is unknown or not part of the
    /// set leaves the attempt as is.
    pub async fn submit_answer(
        &self,
        user_id: UserId,
        req: &SubmitAnswer,
    ) -> Result<Attempt, AttemptError> {
        let (answer, question_time, total_time) = req.parse()?;
        let set_id = req.question_set_id;

        let _guard = self.locks.lock((user_id, set_id)).await;

        let set = self
            .store
            .sets
            .get_set(set_id)
            .await?
            .ok_or(AttemptError::SetNotFound(set_id))?;

        let now = Utc::now();
        let mut attempt = match self.store.attempts.find_live(user_id, set_id).await? {
            Some(existing) => existing,
            None => {
                let fresh = Attempt::start(user_id, &set, now);
                self.store.attempts.insert_attempt(&fresh).await?;
                tracing::info!("User {} started attempt {} on set {}", user_id, fresh.id, set_id);
                fresh
            }
        };

        if !set.question_ids().contains(&req.question_id) {
            tracing::warn!(
                "Answer for question {} outside set {} ignored",
                req.question_id,
                set_id
            );
            return Ok(attempt);
        }

        let Some(question) = self.store.questions.get_question(req.question_id).await? else {
            tracing::warn!(
                "Answer for unknown question {} on set {} ignored",
                req.question_id,
                set_id
            );
            return Ok(attempt);
        };

        attempt.record_answer(&question, answer, question_time, total_time, now);
        self.store.attempts.save_attempt(&attempt).await?;

        tracing::debug!(
            "Attempt {}: question {} -> {} (score {})",
            attempt.id,
            question.id,
            answer,
            attempt.score
        );
        Ok(attempt)
    }

    pub async fn get_progress(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Option<ProgressSnapshot>, AttemptError> {
        let live = self.store.attempts.find_live(user_id, set_id).await?;
        Ok(live.map(ProgressSnapshot::from))
    }

    pub async fn get_history(
        &self,
        user_id: UserId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, AttemptError> {
        let attempts = self.store.attempts.history(user_id, filter).await?;

        let mut set_ids: Vec<SetId> = attempts.iter().map(|a| a.question_set_id).collect();
        set_ids.sort();
        set_ids.dedup();
        let sets: HashMap<SetId, QuestionSet> = self
            .store
            .sets
            .get_sets(&set_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        Ok(attempts
            .into_iter()
            .map(|attempt| {
                let set = sets.get(&attempt.question_set_id);
                HistoryEntry {
                    set_name: set.map(|s| s.name.clone()),
                    set_total_questions: set.map(QuestionSet::total_questions),
                    attempt,
                }
            })
            .collect())
    }

    /// Retires every non-reset attempt of the pair. Returns how many were reset.
    pub async fn reset_progress(&self, user_id: UserId, set_id: SetId) -> Result<usize, AttemptError> {
        let _guard = self.locks.lock((user_id, set_id)).await;

        let attempts = self.store.attempts.find_unreset(user_id, set_id).await?;
        let now = Utc::now();
        for mut attempt in attempts.iter().cloned() {
            attempt.mark_reset(now);
            self.store.attempts.save_attempt(&attempt).await?;
        }

        tracing::info!("User {} reset {} attempts on set {}", user_id, attempts.len(), set_id);
        Ok(attempts.len())
    }

    /// Final submit: moves the live attempt to `completed`.
    pub async fn complete_attempt(
        &self,
        user_id: UserId,
        set_id: SetId,
    ) -> Result<Attempt, AttemptError> {
        let _guard = self.locks.lock((user_id, set_id)).await;

        let mut attempt = self
            .store
            .attempts
            .find_live(user_id, set_id)
            .await?
            .ok_or(AttemptError::NoLiveAttempt(set_id))?;

        attempt.complete(Utc::now());
        self.store.attempts.save_attempt(&attempt).await?;

        tracing::info!(
            "User {} completed attempt {} with score {}",
            user_id,
            attempt.id,
            attempt.score
        );
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        question::{Question, tests::sample_question},
        question_set::{QuizType, SetScope},
    };

    struct Fixture {
        tracker: AttemptTracker,
        store: Store,
        set: QuestionSet,
        questions: Vec<Question>,
    }

    /// A three-question chapter set with correct answers A, B, C.
    async fn fixture() -> Fixture {
        let store = Store::in_memory();
        let questions: Vec<Question> = [OptionKey::A, OptionKey::B, OptionKey::C]
            .into_iter()
            .map(sample_question)
            .collect();
        store.questions.insert_questions(&questions).await.unwrap();

        let set = QuestionSet::new(
            SetScope::default(),
            QuizType::Chapter,
            1,
            questions.iter().map(|q| q.id).collect(),
            Utc::now(),
        );
        store.sets.insert_set(&set).await.unwrap();

        Fixture {
            tracker: AttemptTracker::new(store.clone()),
            store,
            set,
            questions,
        }
    }

    fn answer(set: &QuestionSet, q: &Question, key: &str, total: i64) -> SubmitAnswer {
        SubmitAnswer {
            question_set_id: set.id,
            question_id: q.id,
            answer_key: key.to_string(),
            question_time: 5,
            total_time: total,
        }
    }

    #[tokio::test]
    async fn answers_resume_the_same_attempt() {
        let f = fixture().await;
        let user = UserId::new();

        let first = f.tracker.submit_answer(user, &answer(&f.set, &f.questions[0], "A", 5)).await.unwrap();
        let second = f.tracker.submit_answer(user, &answer(&f.set, &f.questions[1], "D", 12)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.score, 0.67);
        assert_eq!(second.correct_answers, 1);
        assert_eq!(second.test_duration.time_taken, 12);

        let progress = f.tracker.get_progress(user, f.set.id).await.unwrap().unwrap();
        assert_eq!(progress.attempt_id, first.id);
        assert_eq!(progress.user_answers.get(&f.questions[1].id), Some(OptionKey::D));
        assert_eq!(progress.question_times.get(&f.questions[0].id), Some(5));
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_attempt() {
        let f = fixture().await;
        let user = UserId::new();

        let old = f.tracker.submit_answer(user, &answer(&f.set, &f.questions[0], "A", 5)).await.unwrap();
        assert_eq!(f.tracker.reset_progress(user, f.set.id).await.unwrap(), 1);
        assert!(f.tracker.get_progress(user, f.set.id).await.unwrap().is_none());

        let fresh = f.tracker.submit_answer(user, &answer(&f.set, &f.questions[2], "C", 3)).await.unwrap();
        assert_ne!(fresh.id, old.id);
        assert_eq!(fresh.score, 1.0);
        assert_eq!(fresh.attempted_questions, vec![f.questions[2].id]);

        let history = f.tracker.get_history(user, &HistoryFilter::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].attempt.id, fresh.id);
        assert_eq!(history[0].set_total_questions, Some(3));
    }

    #[tokio::test]
    async fn users_do_not_share_attempts() {
        let f = fixture().await;
        let (alice, bob) = (UserId::new(), UserId::new());

        f.tracker.submit_answer(alice, &answer(&f.set, &f.questions[0], "A", 1)).await.unwrap();
        f.tracker.submit_answer(bob, &answer(&f.set, &f.questions[0], "B", 1)).await.unwrap();
        f.tracker.reset_progress(bob, f.set.id).await.unwrap();

        let alice_progress = f.tracker.get_progress(alice, f.set.id).await.unwrap().unwrap();
        assert_eq!(alice_progress.score, 1.0);
        assert!(f.tracker.get_progress(bob, f.set.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_first_answers_open_one_attempt() {
        let f = fixture().await;
        let user = UserId::new();

        let mut handles = Vec::new();
        for q in f.questions.clone() {
            let tracker = f.tracker.clone();
            let req = answer(&f.set, &q, "A", 1);
            handles.push(tokio::spawn(async move { tracker.submit_answer(user, &req).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let attempts = f.store.attempts.find_unreset(user, f.set.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempted_questions.len(), 3);
        // One right (q1), two wrong.
        assert_eq!(attempts[0].score, 0.34);
    }

    #[tokio::test]
    async fn unknown_question_leaves_attempt_unchanged() {
        let f = fixture().await;
        let user = UserId::new();
        let stray = sample_question(OptionKey::A);

        let attempt = f.tracker.submit_answer(user, &answer(&f.set, &stray, "A", 9)).await.unwrap();
        assert!(attempt.user_answers.is_empty());
        assert_eq!(attempt.score, 0.0);
        assert!(f.tracker.get_progress(user, f.set.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn questions_outside_the_set_do_not_score() {
        let f = fixture().await;
        let user = UserId::new();
        let outsiders: Vec<Question> = (0..4).map(|_| sample_question(OptionKey::A)).collect();
        f.store.questions.insert_questions(&outsiders).await.unwrap();

        for (q, key) in f.questions.iter().zip(["A", "B", "C"]) {
            f.tracker.submit_answer(user, &answer(&f.set, q, key, 1)).await.unwrap();
        }
        for q in &outsiders {
            f.tracker.submit_answer(user, &answer(&f.set, q, "A", 2)).await.unwrap();
        }

        let progress = f.tracker.get_progress(user, f.set.id).await.unwrap().unwrap();
        assert_eq!(progress.score, 3.0);
        assert_eq!(progress.correct_answers, 3);
        assert_eq!(progress.attempted_questions.len(), 3);
        assert!(progress.score <= f.set.total_questions() as f64);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let f = fixture().await;
        let user = UserId::new();

        let mut bad_key = answer(&f.set, &f.questions[0], "F", 1);
        assert!(matches!(
            f.tracker.submit_answer(user, &bad_key).await,
            Err(AttemptError::Validation(_))
        ));

        bad_key.answer_key = "A".into();
        bad_key.total_time = -1;
        assert!(matches!(
            f.tracker.submit_answer(user, &bad_key).await,
            Err(AttemptError::Validation(_))
        ));
        assert!(f.tracker.get_progress(user, f.set.id).await.unwrap().is_none());

        let missing = SubmitAnswer {
            question_set_id: SetId::new(),
            ..answer(&f.set, &f.questions[0], "A", 1)
        };
        assert!(matches!(
            f.tracker.submit_answer(user, &missing).await,
            Err(AttemptError::SetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn completing_ends_the_live_attempt() {
        let f = fixture().await;
        let user = UserId::new();

        assert!(matches!(
            f.tracker.complete_attempt(user, f.set.id).await,
            Err(AttemptError::NoLiveAttempt(_))
        ));

        f.tracker.submit_answer(user, &answer(&f.set, &f.questions[0], "A", 4)).await.unwrap();
        let done = f.tracker.complete_attempt(user, f.set.id).await.unwrap();
        assert_eq!(done.status, AttemptStatus::Completed);
        assert!(f.tracker.get_progress(user, f.set.id).await.unwrap().is_none());

        let completed = f
            .tracker
            .get_history(
                user,
                &HistoryFilter {
                    status: Some(AttemptStatus::Completed),
                    ..HistoryFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
    }
}
