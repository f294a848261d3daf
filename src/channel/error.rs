//! Error types for the secure channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("malformed public key")]
    MalformedKey,
    #[error("packet too short: {len} bytes")]
    ShortPacket { len: usize },
    #[error("encryption failed")]
    Seal,
    #[error("packet failed authentication")]
    Open,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection during the handshake")]
    Closed,
    #[error("peer sent a bad key: {0}")]
    Key(#[from] CryptoError),
    #[error("handshake timed out")]
    TimedOut,
}

/// A payload that decrypted fine but is not a valid envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty envelope")]
    Empty,
    #[error("unknown envelope tag {0}")]
    UnknownTag(u8),
    #[error("unknown control state {0}")]
    UnknownControl(u8),
    #[error("envelope truncated")]
    Truncated,
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0:#x} is not a Unicode scalar value")]
    InvalidScalar(u32),
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not ready")]
    NotReady,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("channel has shut down")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
}
