use crate::core::{PromptTurn, Role};

// ---------------------------------------------------------------------------
// LanguageClass — single-pass script detection
// ---------------------------------------------------------------------------

/// Codepoint range of the canonical script (CJK Unified Ideographs).
const CANONICAL_SCRIPT: std::ops::RangeInclusive<char> = '\u{4e00}'..='\u{9fff}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LanguageClass {
    Canonical,
    Foreign,
}

/// A turn is foreign iff it contains no character of the canonical script.
pub fn detect(text: &str) -> LanguageClass {
    if text.chars().any(|c| CANONICAL_SCRIPT.contains(&c)) {
        LanguageClass::Canonical
    } else {
        LanguageClass::Foreign
    }
}

// ---------------------------------------------------------------------------
// Translation instruction prompts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ToCanonical,
    FromCanonical,
}

/// Language names as they appear inside the instruction prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageNames {
    pub canonical: String,
    pub foreign: String,
}

impl Default for LanguageNames {
    fn default() -> Self {
        Self {
            canonical: "中文".to_owned(),
            foreign: "英文".to_owned(),
        }
    }
}

impl LanguageNames {
    pub fn translation_prompt(&self, text: &str, direction: Direction) -> String {
        let target = match direction {
            Direction::ToCanonical => &self.canonical,
            Direction::FromCanonical => &self.foreign,
        };
        format!("把以下的文字翻译成{target}：\n\n{text}\n\n只输出{target}即可。\n")
    }
}

// ---------------------------------------------------------------------------
// History rewrite
// ---------------------------------------------------------------------------

/// Substitute the trailing user utterance with its canonical translation.
///
/// Every earlier turn is passed through as stored; no other turn is translated.
pub fn canonical_history(mut history: Vec<PromptTurn>, translated_latest: &str) -> Vec<PromptTurn> {
    if let Some(last) = history.last_mut() {
        if last.role == Role::User {
            last.content = translated_latest.to_owned();
        }
    }
    history
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
