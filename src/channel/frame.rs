//! Length framing: `[u32 BE length][body]`.

use super::error::FrameError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_HEADER_LEN: usize = 4;

/// Default cap on a frame body.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

pub fn encode_frame(payload: &[u8], max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    if payload.len() > max_frame_bytes || u32::try_from(payload.len()).is_err() {
        return Err(FrameError::FrameTooLarge {
            max_frame_bytes,
            got_bytes: payload.len(),
        });
    }
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write one frame and flush it.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_bytes: usize,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload, max_frame_bytes)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame body.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly between frames.
/// A body over `max_frame_bytes` is read and discarded before
/// [`FrameError::FrameTooLarge`] is returned, so the next call starts at the
/// following frame.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut read = 0usize;
    while read < header.len() {
        let n = reader.read(&mut header[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "frame header truncated",
            )
            .into());
        }
        read += n;
    }

    let length = u32::from_be_bytes(header) as usize;
    if length > max_frame_bytes {
        // Skip the body so the stream stays aligned on the next frame
        let mut body = (&mut *reader).take(length as u64);
        let skipped = tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        if skipped < length as u64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "oversized frame truncated",
            )
            .into());
        }
        return Err(FrameError::FrameTooLarge {
            max_frame_bytes,
            got_bytes: length,
        });
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_in_sequence_then_eof() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, b"one", 1024).await.unwrap();
        write_frame(&mut a, b"", 1024).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 1024).await.unwrap().unwrap(), b"one");
        assert_eq!(read_frame(&mut b, 1024).await.unwrap().unwrap(), b"");
        assert!(read_frame(&mut b, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversize_frame_is_rejected() {
        assert!(matches!(
            encode_frame(&[0u8; 10], 5),
            Err(FrameError::FrameTooLarge { got_bytes: 10, .. })
        ));

        let mut stream = encode_frame(&[0u8; 10], 1024).unwrap();
        stream.extend(encode_frame(b"next", 1024).unwrap());
        let mut reader = stream.as_slice();
        assert!(matches!(
            read_frame(&mut reader, 5).await,
            Err(FrameError::FrameTooLarge { got_bytes: 10, .. })
        ));
        assert_eq!(read_frame(&mut reader, 5).await.unwrap().unwrap(), b"next");
        assert!(read_frame(&mut reader, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let frame = encode_frame(b"hello", 1024).unwrap();
        let mut reader = &frame[..6];
        assert!(matches!(
            read_frame(&mut reader, 1024).await,
            Err(FrameError::Io(_))
        ));
    }
}
