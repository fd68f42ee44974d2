//! Frame I/O shared by the host and client roles.
//!
//! Reading is a loop of "read the 32-byte header, read the body it
//! announces, hand the frame on". Writing goes through one task per
//! socket that owns the write half and pulls encoded frames off a queue,
//! so two frames can never interleave on the wire no matter how many
//! threads enqueue at once.

use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tablesync_protocol::{Frame, FrameHeader, HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::TransportError;

/// Queue feeding a socket's writer task.
pub(crate) type OutboundQueue = mpsc::UnboundedSender<Bytes>;

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream before a new
/// header started. End of stream inside a body is an error.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_body_len: u64,
) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    match reader.read_exact(&mut raw).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::ReceiveFailed(e)),
    }

    let header = FrameHeader::decode(&raw, max_body_len)?;

    // `decode` already bounded body_len by max_body_len.
    let mut body = BytesMut::zeroed(header.body_len as usize);
    reader
        .read_exact(&mut body)
        .await
        .map_err(TransportError::ReceiveFailed)?;

    Ok(Some(Frame {
        header,
        body: body.freeze(),
    }))
}

/// Drains `queue` onto `writer` until every sender is dropped.
///
/// Once it is running, this is the only code that writes to the socket.
pub(crate) async fn write_frames<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        writer
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}
