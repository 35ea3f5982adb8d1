// src/services/progress.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    models::{
        attempt::{Attempt, AttemptStatus},
        ids::{AttemptId, SetId, UserId},
        question_set::{QuestionSet, SetSummary},
    },
    store::{Store, StoreError},
};

/// Where the caller stands on a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    Ongoing,
    Completed,
    Paused,
}

impl From<AttemptStatus> for ProgressStatus {
    fn from(status: AttemptStatus) -> Self {
        match status {
            AttemptStatus::Ongoing => ProgressStatus::Ongoing,
            AttemptStatus::Completed => ProgressStatus::Completed,
            AttemptStatus::Paused => ProgressStatus::Paused,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultSummary {
    /// `None` when the set has not been started.
    pub id: Option<AttemptId>,
    pub score: f64,
    pub status: ProgressStatus,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub is_reset: bool,
}

/// A set listing entry decorated with the caller's progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSet {
    #[serde(flatten)]
    pub set: SetSummary,
    pub score: f64,
    pub total_attempted: usize,
    /// Percent of the set answered, 0..=100.
    pub progress: u32,
    pub status: ProgressStatus,
    pub is_ongoing: bool,
    pub test_result: TestResultSummary,
}

impl AnnotatedSet {
    pub fn not_started(set: &QuestionSet) -> Self {
        Self {
            set: SetSummary::from(set),
            score: 0.0,
            total_attempted: 0,
            progress: 0,
            status: ProgressStatus::NotStarted,
            is_ongoing: false,
            test_result: TestResultSummary {
                id: None,
                score: 0.0,
                status: ProgressStatus::NotStarted,
                correct_answers: 0,
                total_questions: u32::try_from(set.total_questions()).unwrap_or(u32::MAX),
                is_reset: false,
            },
        }
    }

    pub fn from_attempt(set: &QuestionSet, attempt: &Attempt) -> Self {
        let total_attempted = attempt.attempted_questions.len();
        let status = ProgressStatus::from(attempt.status);
        Self {
            set: SetSummary::from(set),
            score: attempt.score,
            total_attempted,
            progress: percent(total_attempted, set.total_questions()),
            status,
            is_ongoing: attempt.status == AttemptStatus::Ongoing,
            test_result: TestResultSummary {
                id: Some(attempt.id),
                score: attempt.score,
                status,
                correct_answers: attempt.correct_answers,
                total_questions: attempt.total_questions,
                is_reset: attempt.is_reset,
            },
        }
    }
}

/// `round(100 * part / whole)`, 0 for an empty set.
fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u32
}

/// Annotates `sets` with the user's progress using one batch attempt lookup.
///
/// When several non-reset attempts exist for a set, the most recently
/// updated one wins (ties broken by attempt id).
pub async fn annotate(
    store: &Store,
    user_id: UserId,
    sets: &[QuestionSet],
) -> Result<Vec<AnnotatedSet>, StoreError> {
    if sets.is_empty() {
        return Ok(Vec::new());
    }

    let set_ids: Vec<SetId> = sets.iter().map(|s| s.id).collect();
    let attempts = store.attempts.find_for_sets(user_id, &set_ids).await?;
    tracing::debug!(
        "Annotating {} sets for user {} with {} attempts",
        sets.len(),
        user_id,
        attempts.len()
    );

    let mut latest: HashMap<SetId, &Attempt> = HashMap::new();
    for attempt in &attempts {
        latest
            .entry(attempt.question_set_id)
            .and_modify(|current| {
                if (attempt.updated_at, attempt.id) > (current.updated_at, current.id) {
                    *current = attempt;
                }
            })
            .or_insert(attempt);
    }

    Ok(sets
        .iter()
        .map(|set| match latest.get(&set.id) {
            Some(attempt) => AnnotatedSet::from_attempt(set, attempt),
            None => AnnotatedSet::not_started(set),
        })
        .collect())
}
