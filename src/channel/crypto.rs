//! Per-connection encryption.
//!
//! Each connection attempt generates a fresh [`SessionKeyPair`]. After the
//! public keys are swapped the shared key is precomputed once and used for
//! every packet on that connection. Nothing here is ever written to disk.

use super::error::CryptoError;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

pub struct SessionKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl SessionKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Derive the connection key from the peer's public key.
    pub fn precompute(&self, peer_public: [u8; PUBLIC_KEY_LEN]) -> Result<SharedKey, CryptoError> {
        if peer_public == [0u8; PUBLIC_KEY_LEN] {
            return Err(CryptoError::MalformedKey);
        }
        let peer = PublicKey::from(peer_public);
        Ok(SharedKey {
            cipher: SalsaBox::new(&peer, &self.secret),
        })
    }
}

impl std::fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Symmetric key for one connection.
pub struct SharedKey {
    cipher: SalsaBox,
}

impl SharedKey {
    /// Encrypt `plaintext` under a freshly generated random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Packet, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Seal)?;
        Ok(Packet { nonce, ciphertext })
    }

    /// Authenticate and decrypt a packet.
    pub fn open(&self, packet: &Packet) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(
                GenericArray::from_slice(&packet.nonce),
                packet.ciphertext.as_slice(),
            )
            .map_err(|_| CryptoError::Open)
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// One encrypted message: nonce followed by ciphertext on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl Packet {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_LEN {
            return Err(CryptoError::ShortPacket { len: bytes.len() });
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}
