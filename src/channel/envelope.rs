//! Application messages carried inside encrypted packets.
//!
//! Plaintext layout is `[tag][payload]`:
//!
//! | tag | payload |
//! |-----|---------|
//! | 0   | control state, 1 byte |
//! | 1   | word (u32 BE length + UTF-8), delimiter (u32 BE scalar) |
//! | 2   | word, correction (both length-prefixed UTF-8), delimiter |

use super::error::DecodeError;
use crate::correction::{CorrectionResult, WordBoundary};
use serde::{Deserialize, Serialize};

const TAG_CONTROL: u8 = 0;
const TAG_WORD: u8 = 1;
const TAG_CORRECTION: u8 = 2;

/// Whether the daemon may apply corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlState {
    Pause,
    Resume,
    /// Daemon lifecycle: a daemon is up and waiting for instructions
    Start,
    /// Daemon lifecycle: the daemon is going away
    Stop,
}

impl ControlState {
    fn to_byte(self) -> u8 {
        match self {
            ControlState::Pause => 0,
            ControlState::Resume => 1,
            ControlState::Start => 2,
            ControlState::Stop => 3,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(ControlState::Pause),
            1 => Ok(ControlState::Resume),
            2 => Ok(ControlState::Start),
            3 => Ok(ControlState::Stop),
            other => Err(DecodeError::UnknownControl(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Control(ControlState),
    Word(WordBoundary),
    Correction(CorrectionResult),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Control(_) => "control",
            Envelope::Word(_) => "word",
            Envelope::Correction(_) => "correction",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        match self {
            Envelope::Control(state) => {
                buf.push(TAG_CONTROL);
                buf.push(state.to_byte());
            }
            Envelope::Word(boundary) => {
                buf.push(TAG_WORD);
                put_str(&mut buf, &boundary.word);
                put_char(&mut buf, boundary.delimiter);
            }
            Envelope::Correction(result) => {
                buf.push(TAG_CORRECTION);
                put_str(&mut buf, &result.word);
                put_str(&mut buf, &result.correction);
                put_char(&mut buf, result.delimiter);
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (&tag, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
        let mut cursor = Cursor { rest };

        let envelope = match tag {
            TAG_CONTROL => Envelope::Control(ControlState::from_byte(cursor.byte()?)?),
            TAG_WORD => {
                let word = cursor.string()?;
                let delimiter = cursor.scalar()?;
                Envelope::Word(WordBoundary { word, delimiter })
            }
            TAG_CORRECTION => {
                let word = cursor.string()?;
                let correction = cursor.string()?;
                let delimiter = cursor.scalar()?;
                Envelope::Correction(CorrectionResult {
                    word,
                    correction,
                    delimiter,
                })
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };

        if !cursor.rest.is_empty() {
            return Err(DecodeError::TrailingBytes(cursor.rest.len()));
        }
        Ok(envelope)
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_char(buf: &mut Vec<u8>, c: char) {
    buf.extend_from_slice(&u32::from(c).to_be_bytes());
}

struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.rest.len() < n {
            return Err(DecodeError::Truncated);
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn scalar(&mut self) -> Result<char, DecodeError> {
        let value = self.u32()?;
        char::from_u32(value).ok_or(DecodeError::InvalidScalar(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_control_wire_bytes() {
        assert_eq!(Envelope::Control(ControlState::Resume).encode(), vec![0, 1]);
        assert_eq!(
            Envelope::decode(&[0, 3]).unwrap(),
            Envelope::Control(ControlState::Stop)
        );
    }

    #[test]
    fn test_word_wire_bytes() {
        let bytes = Envelope::Word(WordBoundary::new("teh", ' ')).encode();
        assert_eq!(bytes, vec![1, 0, 0, 0, 3, b't', b'e', b'h', 0, 0, 0, 0x20]);
    }

    #[test]
    fn test_correction_survives_codec() {
        let envelope = Envelope::Correction(WordBoundary::new("naïve", '…').resolved("naive"));
        assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Envelope::decode(&[]), Err(DecodeError::Empty));
        assert_eq!(Envelope::decode(&[9]), Err(DecodeError::UnknownTag(9)));
        assert_eq!(Envelope::decode(&[0, 7]), Err(DecodeError::UnknownControl(7)));
        assert_eq!(Envelope::decode(&[1, 0, 0, 0, 5, b'a']), Err(DecodeError::Truncated));
        assert_eq!(
            Envelope::decode(&[1, 0, 0, 0, 1, 0xff, 0, 0, 0, 0x20]),
            Err(DecodeError::InvalidUtf8)
        );
        assert_eq!(
            Envelope::decode(&[1, 0, 0, 0, 0, 0, 0, 0xd8, 0]),
            Err(DecodeError::InvalidScalar(0xd800))
        );
        assert_eq!(Envelope::decode(&[0, 1, 0]), Err(DecodeError::TrailingBytes(1)));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = Envelope::decode(&bytes);
        }

        #[test]
        fn word_envelopes_decode_to_themselves(word in "\\PC{0,24}", delimiter in any::<char>()) {
            let envelope = Envelope::Word(WordBoundary::new(word, delimiter));
            prop_assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
        }
    }
}
