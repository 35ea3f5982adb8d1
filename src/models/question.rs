// src/models/question.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::models::{
    ids::{ChapterId, ExamId, QuestionId, SubjectId, TitleId, UnitId},
    text::Bilingual,
};

/// Option label of a multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
    E,
}

impl OptionKey {
    pub const ALL: [OptionKey; 5] = [
        OptionKey::A,
        OptionKey::B,
        OptionKey::C,
        OptionKey::D,
        OptionKey::E,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
            OptionKey::E => "E",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(OptionKey::A),
            "B" => Ok(OptionKey::B),
            "C" => Ok(OptionKey::C),
            "D" => Ok(OptionKey::D),
            "E" => Ok(OptionKey::E),
            other => Err(QuestionError::UnknownOptionKey(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(QuestionError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// Publication state. Only `Active` questions are packed into sets or served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    #[default]
    Active,
    Inactive,
    Draft,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Active => "active",
            QuestionStatus::Inactive => "inactive",
            QuestionStatus::Draft => "draft",
        }
    }
}

impl FromStr for QuestionStatus {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(QuestionStatus::Active),
            "inactive" => Ok(QuestionStatus::Inactive),
            "draft" => Ok(QuestionStatus::Draft),
            other => Err(QuestionError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionError {
    #[error("question has no options")]
    NoOptions,
    #[error("option key {0} appears more than once")]
    DuplicateOptionKey(OptionKey),
    #[error("INVALID OPTION \"{key}\" - Options: [{available}]")]
    InvalidCorrectKey { key: String, available: String },
    #[error("unknown option key: {0}")]
    UnknownOptionKey(String),
    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("question text is required (en or hi)")]
    MissingText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: OptionKey,
    pub text: Bilingual,
}

/// A multiple-choice question with its taxonomy tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,

    pub subject_id: Option<SubjectId>,
    pub unit_id: Option<UnitId>,
    pub chapter_id: Option<ChapterId>,
    pub title_id: Option<TitleId>,
    pub exam_id: Option<ExamId>,

    /// Position within the source paper; used as the canonical ordering.
    pub question_number: Option<i32>,

    pub text: Bilingual,
    pub options: Vec<QuestionOption>,
    pub correct_option_key: OptionKey,
    pub explanation: Bilingual,

    pub difficulty: Difficulty,
    pub status: QuestionStatus,
    pub is_previous_year: bool,
    pub previous_exam_code: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Checks the content invariants: non-empty text, unique option keys,
    /// and a correct key that is one of the options.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.text.is_blank() {
            return Err(QuestionError::MissingText);
        }
        validate_option_keys(&self.options, self.correct_option_key.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestionStatus::Active
    }

    pub fn is_correct(&self, answer: OptionKey) -> bool {
        self.correct_option_key == answer
    }
}

/// Validates an option list against a raw correct-key string.
pub fn validate_option_keys(
    options: &[QuestionOption],
    correct_key: &str,
) -> Result<(), QuestionError> {
    if options.is_empty() {
        return Err(QuestionError::NoOptions);
    }

    let mut seen = Vec::with_capacity(options.len());
    for opt in options {
        if seen.contains(&opt.key) {
            return Err(QuestionError::DuplicateOptionKey(opt.key));
        }
        seen.push(opt.key);
    }

    if !options.iter().any(|o| o.key.as_str() == correct_key) {
        let available = seen
            .iter()
            .map(OptionKey::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(QuestionError::InvalidCorrectKey {
            key: correct_key.to_string(),
            available,
        });
    }
    Ok(())
}

/// DTO for sending a question to a quiz taker (excludes the answer key and explanation).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub question_number: Option<i32>,
    pub text: Bilingual,
    pub options: Vec<QuestionOption>,
    pub difficulty: Difficulty,
    pub chapter_id: Option<ChapterId>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_number: q.question_number,
            text: q.text,
            options: q.options,
            difficulty: q.difficulty,
            chapter_id: q.chapter_id,
        }
    }
}

/// DTO for creating a single question from the admin panel.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub subject_id: Option<SubjectId>,
    pub unit_id: Option<UnitId>,
    pub chapter_id: Option<ChapterId>,
    pub title_id: Option<TitleId>,
    pub exam_id: Option<ExamId>,
    #[validate(range(min = 1))]
    pub question_number: Option<i32>,
    #[validate(custom(function = validate_text))]
    pub text: Bilingual,
    #[validate(custom(function = validate_options))]
    pub options: Vec<QuestionOption>,
    #[validate(length(min = 1, max = 1))]
    pub correct_option_key: String,
    #[serde(default)]
    pub explanation: Bilingual,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub is_previous_year: bool,
    #[validate(length(max = 100))]
    pub previous_exam_code: Option<String>,
}

fn validate_text(text: &Bilingual) -> Result<(), validator::ValidationError> {
    if text.is_blank() {
        return Err(validator::ValidationError::new("question_text_required"));
    }
    if text.hi.len() > 5000 || text.en.len() > 5000 {
        return Err(validator::ValidationError::new("question_text_too_long"));
    }
    Ok(())
}

fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.text.hi.len() > 1000 || opt.text.en.len() > 1000 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_question(correct: OptionKey) -> Question {
        Question {
            id: QuestionId::new(),
            subject_id: None,
            unit_id: None,
            chapter_id: None,
            title_id: None,
            exam_id: None,
            question_number: Some(1),
            text: Bilingual::same("What is 2 + 2?"),
            options: OptionKey::ALL[..4]
                .iter()
                .map(|k| QuestionOption {
                    key: *k,
                    text: Bilingual::same(format!("Option {k}")),
                })
                .collect(),
            correct_option_key: correct,
            explanation: Bilingual::default(),
            difficulty: Difficulty::Medium,
            status: QuestionStatus::Active,
            is_previous_year: false,
            previous_exam_code: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn correct_key_must_be_an_option() {
        let mut q = sample_question(OptionKey::A);
        assert!(q.validate().is_ok());

        q.correct_option_key = OptionKey::E;
        let err = q.validate().unwrap_err();
        assert_eq!(
            err,
            QuestionError::InvalidCorrectKey {
                key: "E".into(),
                available: "A, B, C, D".into()
            }
        );
    }

    #[test]
    fn duplicate_option_keys_are_rejected() {
        let mut q = sample_question(OptionKey::A);
        q.options[1].key = OptionKey::A;
        assert_eq!(
            q.validate(),
            Err(QuestionError::DuplicateOptionKey(OptionKey::A))
        );
    }

    #[test]
    fn option_keys_parse_strictly() {
        assert_eq!("C".parse::<OptionKey>(), Ok(OptionKey::C));
        assert!("c".parse::<OptionKey>().is_err());
        assert!("F".parse::<OptionKey>().is_err());
    }
}
