//! Values flowing between segmentation, resolution and replay.

use serde::{Deserialize, Serialize};

/// A finalized word and the character that ended it.
///
/// The delimiter is carried alongside the word, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordBoundary {
    pub word: String,
    pub delimiter: char,
}

impl WordBoundary {
    pub fn new(word: impl Into<String>, delimiter: char) -> Self {
        Self {
            word: word.into(),
            delimiter,
        }
    }

    /// A result for this word. An empty `correction` means "checked, no change".
    pub fn resolved(self, correction: impl Into<String>) -> CorrectionResult {
        CorrectionResult {
            word: self.word,
            correction: correction.into(),
            delimiter: self.delimiter,
        }
    }

    /// A result saying the word needs no change.
    pub fn unchanged(self) -> CorrectionResult {
        self.resolved(String::new())
    }
}

/// Outcome of checking one [`WordBoundary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub word: String,
    /// Replacement text; empty if the word was fine.
    pub correction: String,
    pub delimiter: char,
}

impl CorrectionResult {
    pub fn is_correction(&self) -> bool {
        !self.correction.is_empty()
    }

    /// Key used to match a result with the word it answers.
    pub fn boundary(&self) -> WordBoundary {
        WordBoundary::new(self.word.clone(), self.delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_keeps_word_and_delimiter() {
        let result = WordBoundary::new("teh", ',').resolved("the");
        assert_eq!(result.word, "teh");
        assert_eq!(result.delimiter, ',');
        assert!(result.is_correction());
        assert_eq!(result.boundary(), WordBoundary::new("teh", ','));

        assert!(!WordBoundary::new("the", ' ').unchanged().is_correction());
    }
}
