//! Key event types shared by every keyboard backend.
//!
//! A [`KeyEvent`] is transient: it is produced by a [`KeyEventSource`] and
//! consumed within one segmentation step. Nothing here is ever persisted.
//!
//! [`KeyEventSource`]: crate::keyboard::KeyEventSource

use serde::{Deserialize, Serialize};

/// Raw key codes (Linux input-event numbering) the core needs to recognize.
pub mod codes {
    pub const KEY_ESC: u16 = 1;
    pub const KEY_BACKSPACE: u16 = 14;
    pub const KEY_TAB: u16 = 15;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_RIGHTSHIFT: u16 = 54;
    pub const KEY_LEFTALT: u16 = 56;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_KPENTER: u16 = 96;
    pub const KEY_RIGHTCTRL: u16 = 97;
    pub const KEY_RIGHTALT: u16 = 100;
    pub const KEY_HOME: u16 = 102;
    pub const KEY_UP: u16 = 103;
    pub const KEY_PAGEUP: u16 = 104;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_END: u16 = 107;
    pub const KEY_DOWN: u16 = 108;
    pub const KEY_PAGEDOWN: u16 = 109;
    pub const KEY_LEFTMETA: u16 = 125;
    pub const KEY_RIGHTMETA: u16 = 126;

    /// Cursor movement keys. Typing after one of these happens somewhere else
    /// in the document, so a half-typed word must be forgotten.
    pub const NAVIGATION: [u16; 8] = [
        KEY_HOME,
        KEY_UP,
        KEY_PAGEUP,
        KEY_LEFT,
        KEY_RIGHT,
        KEY_END,
        KEY_DOWN,
        KEY_PAGEDOWN,
    ];

    pub const MODIFIERS: [u16; 8] = [
        KEY_LEFTCTRL,
        KEY_RIGHTCTRL,
        KEY_LEFTSHIFT,
        KEY_RIGHTSHIFT,
        KEY_LEFTALT,
        KEY_RIGHTALT,
        KEY_LEFTMETA,
        KEY_RIGHTMETA,
    ];
}

/// Whether a key went down, came up, or is auto-repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Press,
    Release,
    Repeat,
}

/// A single keyboard event with its resolved character, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Device key code
    pub raw_code: u16,
    /// Character the key produces under the active layout and modifiers.
    /// `None` for modifiers, function keys and navigation keys.
    pub character: Option<char>,
    pub state: KeyState,
}

impl KeyEvent {
    pub fn new(raw_code: u16, character: Option<char>, state: KeyState) -> Self {
        Self {
            raw_code,
            character,
            state,
        }
    }

    /// Release of a key that produces `c`.
    ///
    /// The raw code is filled in for the handful of keys the segmenter cares
    /// about; everything else reports 0.
    pub fn release_char(c: char) -> Self {
        let raw_code = match c {
            ' ' => codes::KEY_SPACE,
            '\n' | '\r' => codes::KEY_ENTER,
            '\t' => codes::KEY_TAB,
            '\u{8}' => codes::KEY_BACKSPACE,
            _ => 0,
        };
        Self::new(raw_code, Some(c), KeyState::Release)
    }

    /// Press of a key that produces `c`.
    pub fn press_char(c: char) -> Self {
        Self {
            state: KeyState::Press,
            ..Self::release_char(c)
        }
    }

    /// Release of a key that has no character (modifier, arrow, ...).
    pub fn release_code(raw_code: u16) -> Self {
        let character = match raw_code {
            codes::KEY_BACKSPACE => Some('\u{8}'),
            codes::KEY_ENTER | codes::KEY_KPENTER => Some('\n'),
            codes::KEY_TAB => Some('\t'),
            codes::KEY_SPACE => Some(' '),
            codes::KEY_ESC => Some('\u{1b}'),
            _ => None,
        };
        Self::new(raw_code, character, KeyState::Release)
    }

    pub fn is_press(&self) -> bool {
        self.state == KeyState::Press
    }

    pub fn is_release(&self) -> bool {
        self.state == KeyState::Release
    }

    pub fn is_backspace(&self) -> bool {
        self.raw_code == codes::KEY_BACKSPACE || self.character == Some('\u{8}')
    }

    pub fn is_navigation(&self) -> bool {
        codes::NAVIGATION.contains(&self.raw_code)
    }

    pub fn is_modifier(&self) -> bool {
        codes::MODIFIERS.contains(&self.raw_code)
    }

    /// Whether this event changes the text or moves the cursor.
    ///
    /// Presses count as well as releases: the character appears on press.
    pub fn edits_text(&self) -> bool {
        !self.is_modifier()
            && (self.character.is_some() || self.is_backspace() || self.is_navigation())
    }
}

/// One action written to the virtual keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injected {
    Backspace,
    Text(String),
}
