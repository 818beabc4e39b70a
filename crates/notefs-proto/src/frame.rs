//! Size-prefixed frame I/O on async byte streams.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::HEADER_SIZE;

/// Read one complete frame (size prefix included).
///
/// Returns `Ok(None)` on a clean end of stream before the first byte of a
/// frame. A declared size below the header size or above `max_size` is an
/// `InvalidData` error; the stream cannot be resynchronized after it.
pub async fn read_frame<R>(reader: &mut R, max_size: u32) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut size_buf = [0u8; 4];
    match reader.read_exact(&mut size_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size = u32::from_le_bytes(size_buf);
    if (size as usize) < HEADER_SIZE || size > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {} outside {}..={}", size, HEADER_SIZE, max_size),
        ));
    }

    let mut frame = vec![0u8; size as usize];
    frame[..4].copy_from_slice(&size_buf);
    reader.read_exact(&mut frame[4..]).await?;
    Ok(Some(frame))
}

/// Write one encoded frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}
