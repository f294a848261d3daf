//! Encrypted, length-framed, reconnecting transport between the privileged
//! daemon and the user's client.
//!
//! Wire layout once a connection is ready:
//!
//! ```text
//! [u32 BE length][24-byte nonce][ciphertext of [tag][payload]]
//! ```
//!
//! preceded by a bare 32-byte public key from each side.

pub mod backoff;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod transport;

pub use backoff::{Backoff, BackoffPolicy};
pub use crypto::{Packet, SessionKeyPair, SharedKey, NONCE_LEN, PUBLIC_KEY_LEN};
pub use envelope::{ControlState, Envelope};
pub use error::{ChannelError, CryptoError, DecodeError, FrameError, HandshakeError};
pub use frame::{encode_frame, read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
pub use handshake::{handshake_with_timeout, perform_handshake};
pub use transport::{
    socket_path, ChannelConfig, ChannelEvent, ChannelHandle, ChannelSender, ChannelState,
    SecureChannel, SocketOwner,
};
