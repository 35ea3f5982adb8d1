use serde::{Deserialize, Serialize};

use crate::utils::html::clean_html;

/// A Hindi/English text pair. Every user-facing string in the exam bank is bilingual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bilingual {
    #[serde(default)]
    pub hi: String,
    #[serde(default)]
    pub en: String,
}

impl Bilingual {
    pub fn new(hi: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            hi: hi.into(),
            en: en.into(),
        }
    }

    /// Same text for both languages.
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            hi: text.clone(),
            en: text,
        }
    }

    /// True if `name` equals either language variant.
    pub fn matches(&self, name: &str) -> bool {
        self.hi == name || self.en == name
    }

    pub fn is_blank(&self) -> bool {
        self.hi.trim().is_empty() && self.en.trim().is_empty()
    }

    /// Returns a copy with both variants passed through the HTML sanitizer.
    pub fn sanitized(&self) -> Self {
        Self {
            hi: clean_html(&self.hi),
            en: clean_html(&self.en),
        }
    }
}
