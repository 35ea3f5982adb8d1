// src/models/taxonomy.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{
    ids::{ChapterId, ExamId, SubjectId, TitleId, UnitId},
    text::Bilingual,
};

/// Characters that survive into a generated code: ASCII alphanumerics and Devanagari.
static CODE_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\x{0900}-\x{097F}]").expect("static regex"));

/// Builds a short human-readable code such as `SUB_COMP-123456`.
///
/// The first four characters of `name` are stripped of anything outside
/// `[A-Za-z0-9]` and Devanagari, uppercased, and suffixed with the last six
/// digits of the millisecond timestamp.
pub fn generate_code(name: &str, prefix: &str, now: DateTime<Utc>) -> String {
    let head: String = name.chars().take(4).collect();
    let code_part = CODE_STRIP.replace_all(&head, "").to_uppercase();
    let millis = now.timestamp_millis().unsigned_abs().to_string();
    let suffix = &millis[millis.len().saturating_sub(6)..];
    format!("{prefix}{code_part}-{suffix}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: Bilingual,
    pub description: Bilingual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: UnitId,
    pub subject_id: SubjectId,
    pub code: String,
    pub name: Bilingual,
    pub description: Bilingual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub unit_id: UnitId,
    pub code: String,
    pub name: Bilingual,
    pub description: Bilingual,
}

/// An independent question-paper tag, e.g. "Networking 500 Questions".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    pub id: TitleId,
    pub code: String,
    pub name: Bilingual,
    pub description: Bilingual,
    /// Titles imported with `excludeFromGlobalChapterSets` are flagged as generated content.
    pub ai_generated: bool,
}

/// An exam tag, e.g. "RAS 2025 Mains".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: ExamId,
    pub code: String,
    pub name: Bilingual,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn code_strips_punctuation_and_uppercases() {
        let now = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        assert_eq!(generate_code("c++ basics", "SUB_", now), "SUB_C-123456");
        assert_eq!(generate_code("Networking", "T_", now), "T_NETW-123456");
    }

    #[test]
    fn code_keeps_devanagari() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_042).unwrap();
        assert_eq!(generate_code("इतिहास", "U_", now), "U_इतिह-000042");
    }
}
