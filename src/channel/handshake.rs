//! Public-key exchange.
//!
//! Straight after the connection is established each side writes its 32-byte
//! public key and reads the peer's. Nothing else may cross the wire first.

use super::crypto::{SessionKeyPair, SharedKey, PUBLIC_KEY_LEN};
use super::error::HandshakeError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Swap fresh public keys with the peer and derive the connection key.
pub async fn perform_handshake<S>(stream: &mut S) -> Result<SharedKey, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let keys = SessionKeyPair::generate();
    stream.write_all(&keys.public_bytes()).await?;
    stream.flush().await?;

    let mut peer = [0u8; PUBLIC_KEY_LEN];
    match stream.read_exact(&mut peer).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(HandshakeError::Closed)
        }
        Err(e) => return Err(e.into()),
    }

    Ok(keys.precompute(peer)?)
}

/// [`perform_handshake`] bounded by `limit`.
pub async fn handshake_with_timeout<S>(
    stream: &mut S,
    limit: Duration,
) -> Result<SharedKey, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(limit, perform_handshake(stream))
        .await
        .map_err(|_| HandshakeError::TimedOut)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_both_sides_derive_matching_keys() {
        let (mut a, mut b) = tokio::io::duplex(128);
        let (ka, kb) = tokio::join!(perform_handshake(&mut a), perform_handshake(&mut b));
        let (ka, kb) = (ka.unwrap(), kb.unwrap());

        let packet = ka.seal(b"ping").unwrap();
        assert_eq!(kb.open(&packet).unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_zero_key_is_malformed() {
        let (mut a, mut b) = tokio::io::duplex(128);
        let peer = tokio::spawn(async move {
            b.write_all(&[0u8; PUBLIC_KEY_LEN]).await.unwrap();
            let mut sink = [0u8; PUBLIC_KEY_LEN];
            b.read_exact(&mut sink).await.unwrap();
        });
        assert!(matches!(
            perform_handshake(&mut a).await,
            Err(HandshakeError::Key(_))
        ));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_short_key_means_closed() {
        let (mut a, mut b) = tokio::io::duplex(128);
        b.write_all(&[7u8; 10]).await.unwrap();
        drop(b);
        assert!(matches!(
            perform_handshake(&mut a).await,
            Err(HandshakeError::Closed) | Err(HandshakeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (mut a, _b) = tokio::io::duplex(128);
        assert!(matches!(
            handshake_with_timeout(&mut a, Duration::from_millis(50)).await,
            Err(HandshakeError::TimedOut)
        ));
    }
}
