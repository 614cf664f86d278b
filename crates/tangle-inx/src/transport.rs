//! Length-prefixed postcard framing over any async byte stream.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::InxError;

/// Maximum frame size: 16 MiB. Milestone payloads are a few KiB; white-flag
/// requests carry at most a few hundred parents.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Write one frame: 4-byte big-endian length, then the postcard payload.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), InxError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = postcard::to_allocvec(value)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(InxError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` if the peer closed the stream before a new frame
/// started.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, InxError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(InxError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(postcard::from_bytes(&payload)?))
}
