//! Word segmentation.
//!
//! [`WordSegmenter`] turns a stream of key events into finalized words. Only
//! key releases are buffered. For each release the first matching rule wins:
//!
//! 1. Backspace removes the last buffered character.
//! 2. Control characters (Enter, Tab, Escape, ...) and navigation keys clear
//!    the buffer without emitting anything: the cursor has moved, so a
//!    correction there would overwrite the wrong text.
//! 3. Letters, marks, digits and apostrophes are appended.
//! 4. Punctuation, symbols and whitespace finalize the buffered word, if
//!    there is one, as a [`WordBoundary`].
//! 5. Anything else (modifiers on their own, function keys) is ignored.
//!
//! Classification uses the Unicode general category tables, not ASCII ranges.

use crate::correction::WordBoundary;
use crate::keyboard::KeyEvent;
use unicode_general_category::{get_general_category, GeneralCategory};

/// What a character means to the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Part of a word
    Word,
    /// Terminates a word
    Delimiter,
    /// Resets the buffer
    Control,
    Other,
}

/// Classify a character using its Unicode general category.
pub fn classify(c: char) -> CharClass {
    if is_apostrophe(c) {
        return CharClass::Word;
    }

    use GeneralCategory::*;
    match get_general_category(c) {
        Control => CharClass::Control,
        UppercaseLetter | LowercaseLetter | TitlecaseLetter | ModifierLetter | OtherLetter
        | NonspacingMark | SpacingMark | EnclosingMark | DecimalNumber | LetterNumber
        | OtherNumber => CharClass::Word,
        ConnectorPunctuation | DashPunctuation | OpenPunctuation | ClosePunctuation
        | InitialPunctuation | FinalPunctuation | OtherPunctuation | MathSymbol
        | CurrencySymbol | ModifierSymbol | OtherSymbol | SpaceSeparator | LineSeparator
        | ParagraphSeparator => CharClass::Delimiter,
        _ if c.is_whitespace() => CharClass::Delimiter,
        _ => CharClass::Other,
    }
}

fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '\u{2019}' | '\u{02BC}')
}

/// The effect a single event had on the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmented {
    /// Key press, repeat, or a key with no meaning for word building.
    Ignored,
    Appended,
    Erased,
    Reset,
    Boundary(WordBoundary),
}

/// Buffers typed characters and emits a [`WordBoundary`] per finished word.
#[derive(Debug, Default)]
pub struct WordSegmenter {
    buffer: Vec<char>,
}

impl WordSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns the finalized word, if this event ended one.
    pub fn observe(&mut self, event: &KeyEvent) -> Option<WordBoundary> {
        match self.step(event) {
            Segmented::Boundary(boundary) => Some(boundary),
            _ => None,
        }
    }

    /// Feed one event and report exactly what happened.
    pub fn step(&mut self, event: &KeyEvent) -> Segmented {
        if !event.is_release() {
            return Segmented::Ignored;
        }

        if event.is_backspace() {
            self.buffer.pop();
            return Segmented::Erased;
        }

        if event.is_navigation() {
            self.buffer.clear();
            return Segmented::Reset;
        }

        let Some(c) = event.character else {
            return Segmented::Ignored;
        };

        match classify(c) {
            CharClass::Control => {
                self.buffer.clear();
                Segmented::Reset
            }
            CharClass::Word => {
                self.buffer.push(c);
                Segmented::Appended
            }
            // Consecutive delimiters see an empty buffer and emit nothing
            CharClass::Delimiter if self.buffer.is_empty() => Segmented::Ignored,
            CharClass::Delimiter => {
                let word: String = self.buffer.drain(..).collect();
                Segmented::Boundary(WordBoundary::new(word, c))
            }
            CharClass::Other => Segmented::Ignored,
        }
    }

    /// The word typed so far.
    pub fn pending(&self) -> String {
        self.buffer.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::codes;
    use proptest::prelude::*;

    fn type_str(segmenter: &mut WordSegmenter, text: &str) -> Vec<WordBoundary> {
        text.chars()
            .filter_map(|c| segmenter.observe(&KeyEvent::release_char(c)))
            .collect()
    }

    #[test]
    fn test_word_then_space_emits_boundary() {
        let mut seg = WordSegmenter::new();
        let out = type_str(&mut seg, "teh ");
        assert_eq!(out, vec![WordBoundary::new("teh", ' ')]);
        assert_eq!(seg.pending(), "");
    }

    #[test]
    fn test_backspace_truncates_buffer() {
        let mut seg = WordSegmenter::new();
        type_str(&mut seg, "helllo");
        assert_eq!(seg.observe(&KeyEvent::release_code(codes::KEY_BACKSPACE)), None);
        assert_eq!(seg.observe(&KeyEvent::release_code(codes::KEY_BACKSPACE)), None);
        let out = type_str(&mut seg, " ");
        assert_eq!(out, vec![WordBoundary::new("hell", ' ')]);
    }

    #[test]
    fn test_backspace_on_empty_buffer_is_noop() {
        let mut seg = WordSegmenter::new();
        assert_eq!(
            seg.step(&KeyEvent::release_code(codes::KEY_BACKSPACE)),
            Segmented::Erased
        );
        assert_eq!(seg.pending(), "");
    }

    #[test]
    fn test_consecutive_delimiters_do_not_refire() {
        let mut seg = WordSegmenter::new();
        assert!(type_str(&mut seg, "  ").is_empty());

        let out = type_str(&mut seg, "word.  ,");
        assert_eq!(out, vec![WordBoundary::new("word", '.')]);
    }

    #[test]
    fn test_enter_resets_without_boundary() {
        let mut seg = WordSegmenter::new();
        type_str(&mut seg, "teh");
        assert_eq!(
            seg.step(&KeyEvent::release_code(codes::KEY_ENTER)),
            Segmented::Reset
        );
        assert_eq!(seg.pending(), "");
        assert!(type_str(&mut seg, " ").is_empty());
    }

    #[test]
    fn test_navigation_resets() {
        let mut seg = WordSegmenter::new();
        type_str(&mut seg, "abc");
        seg.observe(&KeyEvent::release_code(codes::KEY_LEFT));
        assert_eq!(type_str(&mut seg, "d "), vec![WordBoundary::new("d", ' ')]);
    }

    #[test]
    fn test_modifiers_and_presses_are_ignored() {
        let mut seg = WordSegmenter::new();
        type_str(&mut seg, "ab");
        assert_eq!(
            seg.step(&KeyEvent::release_code(codes::KEY_LEFTSHIFT)),
            Segmented::Ignored
        );
        assert_eq!(seg.step(&KeyEvent::press_char('z')), Segmented::Ignored);
        assert_eq!(seg.pending(), "ab");
    }

    #[test]
    fn test_apostrophe_stays_in_word() {
        let mut seg = WordSegmenter::new();
        let out = type_str(&mut seg, "dont' don\u{2019}t!");
        assert_eq!(
            out,
            vec![
                WordBoundary::new("dont'", ' '),
                WordBoundary::new("don\u{2019}t", '!'),
            ]
        );
    }

    #[test]
    fn test_unicode_words_and_delimiters() {
        let mut seg = WordSegmenter::new();
        let out = type_str(&mut seg, "café¿ привет« 42€");
        assert_eq!(
            out,
            vec![
                WordBoundary::new("café", '¿'),
                WordBoundary::new("привет", '«'),
                WordBoundary::new("42", '€'),
            ]
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify('a'), CharClass::Word);
        assert_eq!(classify('9'), CharClass::Word);
        assert_eq!(classify('\u{0301}'), CharClass::Word);
        assert_eq!(classify(','), CharClass::Delimiter);
        assert_eq!(classify('+'), CharClass::Delimiter);
        assert_eq!(classify('\u{00A0}'), CharClass::Delimiter);
        assert_eq!(classify('\n'), CharClass::Control);
        assert_eq!(classify('\t'), CharClass::Control);
        assert_eq!(classify('\u{200B}'), CharClass::Other);
    }

    fn arb_event() -> impl Strategy<Value = KeyEvent> {
        prop_oneof![
            4 => proptest::char::any().prop_map(KeyEvent::release_char),
            2 => proptest::sample::select(vec!['a', 'e', 't', ' ', '.', '\'']).prop_map(KeyEvent::release_char),
            1 => proptest::char::any().prop_map(KeyEvent::press_char),
            1 => Just(KeyEvent::release_code(codes::KEY_BACKSPACE)),
            1 => Just(KeyEvent::release_code(codes::KEY_LEFT)),
        ]
    }

    proptest! {
        #[test]
        fn same_events_give_same_words(events in proptest::collection::vec(arb_event(), 0..200)) {
            let run = |events: &[KeyEvent]| {
                let mut segmenter = WordSegmenter::new();
                events.iter().filter_map(|e| segmenter.observe(e)).collect::<Vec<_>>()
            };
            let first = run(&events);
            prop_assert_eq!(&first, &run(&events));
            prop_assert!(first.iter().all(|b| !b.word.is_empty()));
        }
    }
}
