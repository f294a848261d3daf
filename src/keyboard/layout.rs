//! US keyboard layout for backends that deliver raw key codes.
//!
//! [`KeyTranslator`] turns raw code/value pairs into [`KeyEvent`]s, tracking
//! shift and caps lock. [`keystroke_for`] is the reverse mapping the virtual
//! keyboard uses to type text.

use crate::keyboard::types::{codes, KeyEvent, KeyState};

pub const KEY_CAPSLOCK: u16 = 58;

/// `(code, plain, shifted)` for every key that types a printable character.
const PRINTABLE: [(u16, char, char); 47] = [
    (2, '1', '!'),
    (3, '2', '@'),
    (4, '3', '#'),
    (5, '4', '$'),
    (6, '5', '%'),
    (7, '6', '^'),
    (8, '7', '&'),
    (9, '8', '*'),
    (10, '9', '('),
    (11, '0', ')'),
    (12, '-', '_'),
    (13, '=', '+'),
    (16, 'q', 'Q'),
    (17, 'w', 'W'),
    (18, 'e', 'E'),
    (19, 'r', 'R'),
    (20, 't', 'T'),
    (21, 'y', 'Y'),
    (22, 'u', 'U'),
    (23, 'i', 'I'),
    (24, 'o', 'O'),
    (25, 'p', 'P'),
    (26, '[', '{'),
    (27, ']', '}'),
    (30, 'a', 'A'),
    (31, 's', 'S'),
    (32, 'd', 'D'),
    (33, 'f', 'F'),
    (34, 'g', 'G'),
    (35, 'h', 'H'),
    (36, 'j', 'J'),
    (37, 'k', 'K'),
    (38, 'l', 'L'),
    (39, ';', ':'),
    (40, '\'', '"'),
    (41, '`', '~'),
    (43, '\\', '|'),
    (44, 'z', 'Z'),
    (45, 'x', 'X'),
    (46, 'c', 'C'),
    (47, 'v', 'V'),
    (48, 'b', 'B'),
    (49, 'n', 'N'),
    (50, 'm', 'M'),
    (51, ',', '<'),
    (52, '.', '>'),
    (53, '/', '?'),
];

/// A key to press, with or without shift held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub code: u16,
    pub shift: bool,
}

/// Key codes the virtual keyboard must be able to emit.
pub fn injectable_codes() -> impl Iterator<Item = u16> {
    PRINTABLE.iter().map(|&(code, _, _)| code).chain([
        codes::KEY_SPACE,
        codes::KEY_ENTER,
        codes::KEY_TAB,
        codes::KEY_BACKSPACE,
        codes::KEY_LEFTSHIFT,
    ])
}

/// The keystroke that types `c`, if the layout has one.
pub fn keystroke_for(c: char) -> Option<Keystroke> {
    let unshifted = |code| Some(Keystroke { code, shift: false });
    match c {
        ' ' => unshifted(codes::KEY_SPACE),
        '\n' => unshifted(codes::KEY_ENTER),
        '\t' => unshifted(codes::KEY_TAB),
        '\u{8}' => unshifted(codes::KEY_BACKSPACE),
        _ => PRINTABLE.iter().find_map(|&(code, plain, shifted)| {
            if c == plain {
                Some(Keystroke { code, shift: false })
            } else if c == shifted {
                Some(Keystroke { code, shift: true })
            } else {
                None
            }
        }),
    }
}

/// Stateful raw-code translator.
#[derive(Debug, Default)]
pub struct KeyTranslator {
    left_shift: bool,
    right_shift: bool,
    caps_lock: bool,
}

impl KeyTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one key event. `value` is 0 for release, 1 for press and 2
    /// for auto-repeat; anything else is ignored.
    pub fn translate(&mut self, code: u16, value: i32) -> Option<KeyEvent> {
        let state = match value {
            0 => KeyState::Release,
            1 => KeyState::Press,
            2 => KeyState::Repeat,
            _ => return None,
        };

        match code {
            codes::KEY_LEFTSHIFT => self.left_shift = state != KeyState::Release,
            codes::KEY_RIGHTSHIFT => self.right_shift = state != KeyState::Release,
            KEY_CAPSLOCK if state == KeyState::Press => self.caps_lock = !self.caps_lock,
            _ => {}
        }

        Some(KeyEvent::new(code, self.character(code), state))
    }

    fn character(&self, code: u16) -> Option<char> {
        let Some(&(_, plain, shifted)) = PRINTABLE.iter().find(|&&(c, _, _)| c == code) else {
            return KeyEvent::release_code(code).character;
        };
        let shift = self.left_shift || self.right_shift;
        // Caps lock only affects letters
        let upper = if plain.is_ascii_alphabetic() {
            shift != self.caps_lock
        } else {
            shift
        };
        Some(if upper { shifted } else { plain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_tracks_shift() {
        let mut t = KeyTranslator::new();
        assert_eq!(t.translate(30, 1).unwrap().character, Some('a'));

        t.translate(codes::KEY_LEFTSHIFT, 1);
        let upper = t.translate(30, 0).unwrap();
        assert_eq!(upper.character, Some('A'));
        assert!(upper.is_release());
        assert_eq!(t.translate(2, 1).unwrap().character, Some('!'));

        t.translate(codes::KEY_LEFTSHIFT, 0);
        assert_eq!(t.translate(2, 1).unwrap().character, Some('1'));
    }

    #[test]
    fn test_caps_lock_only_affects_letters() {
        let mut t = KeyTranslator::new();
        t.translate(KEY_CAPSLOCK, 1);
        t.translate(KEY_CAPSLOCK, 0);
        assert_eq!(t.translate(17, 1).unwrap().character, Some('W'));
        assert_eq!(t.translate(52, 1).unwrap().character, Some('.'));

        t.translate(codes::KEY_RIGHTSHIFT, 1);
        assert_eq!(t.translate(17, 1).unwrap().character, Some('w'));
    }

    #[test]
    fn test_special_keys_keep_their_characters() {
        let mut t = KeyTranslator::new();
        let space = t.translate(codes::KEY_SPACE, 0).unwrap();
        assert_eq!(space.character, Some(' '));
        assert!(t.translate(codes::KEY_BACKSPACE, 2).unwrap().is_backspace());
        assert_eq!(t.translate(codes::KEY_LEFT, 1).unwrap().character, None);
        assert!(t.translate(30, 7).is_none());
    }

    #[test]
    fn test_keystroke_for() {
        assert_eq!(keystroke_for('e'), Some(Keystroke { code: 18, shift: false }));
        assert_eq!(keystroke_for('E'), Some(Keystroke { code: 18, shift: true }));
        assert_eq!(keystroke_for('?'), Some(Keystroke { code: 53, shift: true }));
        assert_eq!(keystroke_for(' ').map(|k| k.code), Some(codes::KEY_SPACE));
        assert_eq!(keystroke_for('é'), None);
    }

    #[test]
    fn test_layout_tables_agree() {
        let mut t = KeyTranslator::new();
        for &(code, plain, _) in &PRINTABLE {
            assert_eq!(keystroke_for(plain).map(|k| k.code), Some(code));
            assert_eq!(t.translate(code, 1).unwrap().character, Some(plain));
        }
    }
}
