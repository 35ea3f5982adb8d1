// src/models/attempt.rs

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::WRONG_ANSWER_PENALTY,
    models::{
        ids::{AttemptId, ChapterId, ExamId, QuestionId, SetId, TitleId, UserId},
        question::{OptionKey, Question},
        question_set::{QuestionSet, QuizType},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Ongoing,
    Completed,
    /// Reserved; no operation currently pauses an attempt.
    Paused,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Ongoing => "ongoing",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(AttemptStatus::Ongoing),
            "completed" => Ok(AttemptStatus::Completed),
            "paused" => Ok(AttemptStatus::Paused),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Chosen option per question. One entry per question; a new answer replaces the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSheet(BTreeMap<QuestionId, OptionKey>);

impl AnswerSheet {
    /// Records `answer` for `question`, returning the answer it replaced.
    pub fn upsert(&mut self, question: QuestionId, answer: OptionKey) -> Option<OptionKey> {
        self.0.insert(question, answer)
    }

    pub fn get(&self, question: &QuestionId) -> Option<OptionKey> {
        self.0.get(question).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &OptionKey)> {
        self.0.iter()
    }
}

/// Seconds spent per question, last report wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionTimes(BTreeMap<QuestionId, u32>);

impl QuestionTimes {
    pub fn upsert(&mut self, question: QuestionId, seconds: u32) -> Option<u32> {
        self.0.insert(question, seconds)
    }

    pub fn get(&self, question: &QuestionId) -> Option<u32> {
        self.0.get(question).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDuration {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Cumulative seconds as reported by the client.
    pub time_taken: u32,
}

/// Points for one answer under negative marking.
pub fn point_value(answer: Option<OptionKey>, correct: OptionKey) -> f64 {
    match answer {
        None => 0.0,
        Some(a) if a == correct => 1.0,
        Some(_) => -WRONG_ANSWER_PENALTY,
    }
}

/// Rounds to two decimals, half away from zero.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// One user's run through one question set (a.k.a. test result).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub question_set_id: SetId,
    pub status: AttemptStatus,

    /// Questions touched, in first-answer order, without duplicates.
    pub attempted_questions: Vec<QuestionId>,
    pub user_answers: AnswerSheet,
    pub question_times: QuestionTimes,

    pub score: f64,
    pub correct_answers: u32,
    /// Size of the set when the attempt started.
    pub total_questions: u32,
    pub test_duration: TestDuration,
    pub is_reset: bool,

    pub quiz_type: QuizType,
    pub title_id: Option<TitleId>,
    pub chapter_id: Option<ChapterId>,
    pub exam_id: Option<ExamId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    /// Opens a fresh ongoing attempt, snapshotting the set's size and scope.
    pub fn start(user_id: UserId, set: &QuestionSet, now: DateTime<Utc>) -> Self {
        Self {
            id: AttemptId::new(),
            user_id,
            question_set_id: set.id,
            status: AttemptStatus::Ongoing,
            attempted_questions: Vec::new(),
            user_answers: AnswerSheet::default(),
            question_times: QuestionTimes::default(),
            score: 0.0,
            correct_answers: 0,
            total_questions: u32::try_from(set.total_questions()).unwrap_or(u32::MAX),
            test_duration: TestDuration {
                start_time: now,
                end_time: now,
                time_taken: 0,
            },
            is_reset: false,
            quiz_type: set.quiz_type,
            title_id: set.scope.title_id,
            chapter_id: set.scope.chapter_id,
            exam_id: set.scope.exam_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// The attempt that answer submissions and progress lookups operate on.
    pub fn is_live(&self) -> bool {
        self.status == AttemptStatus::Ongoing && !self.is_reset
    }

    /// Applies one answer: overwrite the sheet entry, then move the score and
    /// correct count by the difference between the old and new point values.
    pub fn record_answer(
        &mut self,
        question: &Question,
        answer: OptionKey,
        question_time: u32,
        total_time: u32,
        now: DateTime<Utc>,
    ) {
        let old_answer = self.user_answers.upsert(question.id, answer);
        self.question_times.upsert(question.id, question_time);

        if !self.attempted_questions.contains(&question.id) {
            self.attempted_questions.push(question.id);
        }

        let old_points = point_value(old_answer, question.correct_option_key);
        let new_points = point_value(Some(answer), question.correct_option_key);
        self.score = round_score(self.score - old_points + new_points);

        if old_points > 0.0 {
            self.correct_answers = self.correct_answers.saturating_sub(1);
        }
        if new_points > 0.0 {
            self.correct_answers += 1;
        }

        self.test_duration.time_taken = total_time;
        self.test_duration.end_time = now;
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = AttemptStatus::Completed;
        self.test_duration.end_time = now;
        self.updated_at = now;
    }

    /// Flags the attempt out of the live lookup. Reset attempts never come back.
    pub fn mark_reset(&mut self, now: DateTime<Utc>) {
        self.is_reset = true;
        self.status = AttemptStatus::Completed;
        self.updated_at = now;
    }
}
