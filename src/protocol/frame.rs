//! Frame assembly and stream I/O.
//!
//! Outbound frames are pre-encoded into up to four slices (header, metadata,
//! body length prefix, body) and written with scatter/gather I/O. Inbound
//! frames are read in two steps: header plus metadata, then the body only
//! when the decoded metadata says one follows.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use rntbd_client::protocol::{tokens, OutboundFrame, TokenSchema, HEADER_SIZE};
//! use uuid::Uuid;
//!
//! let mut metadata = TokenSchema::new(&tokens::request::SCHEMA);
//! let frame = OutboundFrame::build(Uuid::new_v4(), 0x0003_0003, &mut metadata, Some(Bytes::from_static(b"{}")))
//!     .unwrap();
//!
//! assert_eq!(frame.header().metadata_length(), frame.metadata_len());
//! assert_eq!(frame.size(), HEADER_SIZE + frame.metadata_len() + 4 + 2);
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::schema::{SchemaDef, TokenSchema};
use super::token::TokenValue;
use super::wire_format::{FrameHeader, BODY_LENGTH_PREFIX_SIZE, HEADER_SIZE};
use crate::error::{Result, RntbdError};

/// A frame ready to be written to the stream.
#[derive(Debug)]
pub struct OutboundFrame {
    header: FrameHeader,
    encoded_header: [u8; HEADER_SIZE],
    metadata: Bytes,
    body_prefix: [u8; BODY_LENGTH_PREFIX_SIZE],
    body: Option<Bytes>,
}

impl OutboundFrame {
    /// Encode `metadata` and frame it behind a header.
    ///
    /// When the schema carries a payload-present flag it is set to match
    /// `body` before encoding. A body on a schema without that flag is an
    /// error: the peer would have no way to know it follows.
    pub fn build(
        activity_id: Uuid,
        status_or_opcode: u32,
        metadata: &mut TokenSchema,
        body: Option<Bytes>,
    ) -> Result<Self> {
        match payload_present_id(metadata.definition()) {
            Some(id) => {
                metadata.set(id, TokenValue::Byte(u8::from(body.is_some())))?;
            }
            None if body.is_some() => {
                return Err(RntbdError::Protocol(format!(
                    "the {} schema cannot carry a body",
                    metadata.name()
                )));
            }
            None => {}
        }

        let metadata = metadata.to_bytes()?;
        let header = FrameHeader::for_metadata(metadata.len(), status_or_opcode, activity_id)?;

        let mut body_prefix = [0u8; BODY_LENGTH_PREFIX_SIZE];
        if let Some(body) = &body {
            let len = u32::try_from(body.len()).map_err(|_| {
                RntbdError::Protocol(format!("body of {} bytes overflows a frame", body.len()))
            })?;
            body_prefix = len.to_le_bytes();
        }

        Ok(Self {
            header,
            encoded_header: header.encode(),
            metadata,
            body_prefix,
            body,
        })
    }

    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    #[inline]
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Total bytes this frame puts on the wire.
    pub fn size(&self) -> usize {
        HEADER_SIZE
            + self.metadata.len()
            + self
                .body
                .as_ref()
                .map_or(0, |b| BODY_LENGTH_PREFIX_SIZE + b.len())
    }

    /// Contiguous copy of the wire bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for part in self.parts() {
            out.extend_from_slice(part);
        }
        out
    }

    fn parts(&self) -> impl Iterator<Item = &[u8]> {
        let body = self
            .body
            .as_ref()
            .map(|b| [&self.body_prefix[..], &b[..]]);
        [&self.encoded_header[..], &self.metadata[..]]
            .into_iter()
            .chain(body.into_iter().flatten())
            .filter(|part| !part.is_empty())
    }

    /// Slices for the bytes not yet written after `skip_bytes` went out.
    fn remaining_slices(&self, skip_bytes: usize) -> Vec<IoSlice<'_>> {
        let mut slices = Vec::with_capacity(4);
        let mut skipped = 0;

        for part in self.parts() {
            let start = skipped;
            let end = skipped + part.len();
            if skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(start)..]));
            }
            skipped = end;
        }

        slices
    }
}

fn payload_present_id(def: &SchemaDef) -> Option<u16> {
    def.tokens
        .iter()
        .find(|t| t.name == "PAYLOAD_PRESENT")
        .map(|t| t.id)
}

/// Write a frame using scatter/gather I/O, continuing after partial writes.
pub async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_size = frame.size();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = frame.remaining_slices(total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RntbdError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Fill `buf` completely, treating a zero-length read as a closed channel.
async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(RntbdError::ChannelClosed {
                read: filled,
                expected: buf.len(),
            });
        }
        filled += n;
    }
    Ok(())
}

/// Read a frame header and its token metadata.
///
/// The length claim is checked against `max_frame_length` before any
/// metadata is buffered. `activity_id` is the id the caller sent; a frame
/// echoing a different one is logged and otherwise accepted.
pub async fn read_header_and_metadata<R>(
    reader: &mut R,
    max_frame_length: u32,
    activity_id: Uuid,
) -> Result<(FrameHeader, Bytes)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    read_exact_or_closed(reader, &mut header_buf).await?;

    let header = FrameHeader::decode(&header_buf)
        .ok_or_else(|| RntbdError::Protocol("short frame header".to_string()))?;
    header.validate(max_frame_length)?;

    if header.activity_id != activity_id {
        tracing::warn!(
            expected = %activity_id,
            received = %header.activity_id,
            "Response activity id does not match request"
        );
    }

    let mut metadata = vec![0u8; header.metadata_length()];
    read_exact_or_closed(reader, &mut metadata).await?;

    Ok((header, Bytes::from(metadata)))
}

/// Read a length-prefixed body.
pub async fn read_body<R>(reader: &mut R, max_body_length: u32) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; BODY_LENGTH_PREFIX_SIZE];
    read_exact_or_closed(reader, &mut prefix).await?;

    let length = u32::from_le_bytes(prefix);
    if length > max_body_length {
        return Err(RntbdError::FrameLength {
            length,
            min: 0,
            max: max_body_length,
        });
    }

    let mut body = vec![0u8; length as usize];
    read_exact_or_closed(reader, &mut body).await?;
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::protocol::tokens::{context_request, request};
    use tokio::io::duplex;

    /// Accepts at most `chunk` bytes per call to force the partial-write path.
    struct TrickleWriter {
        chunk: usize,
        out: Vec<u8>,
        calls: usize,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.chunk);
            self.out.extend_from_slice(&buf[..n]);
            self.calls += 1;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn sample_request() -> TokenSchema {
        let mut schema = TokenSchema::new(&request::SCHEMA);
        schema
            .set(request::RESOURCE_ID, TokenValue::Bytes(Bytes::from_static(b"AbC123=")))
            .unwrap();
        schema
            .set(request::PAGE_SIZE, TokenValue::ULong32(10))
            .unwrap();
        schema
    }

    #[test]
    fn test_total_length_excludes_body() {
        let mut without = sample_request();
        let a = OutboundFrame::build(Uuid::nil(), 0, &mut without, None).unwrap();

        let mut with = sample_request();
        let b = OutboundFrame::build(
            Uuid::nil(),
            0,
            &mut with,
            Some(Bytes::from_static(b"0123456789")),
        )
        .unwrap();

        assert_eq!(a.header().total_length as usize, HEADER_SIZE + a.metadata_len());
        assert_eq!(b.header().total_length as usize, HEADER_SIZE + b.metadata_len());
        // Only the payload-present value differs, never the length.
        assert_eq!(a.metadata_len(), b.metadata_len());
        assert_eq!(b.size(), a.size() + 4 + 10);
    }

    #[test]
    fn test_payload_present_follows_body() {
        let mut schema = sample_request();
        OutboundFrame::build(Uuid::nil(), 0, &mut schema, Some(Bytes::from_static(b"x"))).unwrap();
        assert_eq!(schema.byte(request::PAYLOAD_PRESENT), Some(1));

        OutboundFrame::build(Uuid::nil(), 0, &mut schema, None).unwrap();
        assert_eq!(schema.byte(request::PAYLOAD_PRESENT), Some(0));
    }

    #[test]
    fn test_body_rejected_without_payload_flag() {
        let mut schema = TokenSchema::new(&context_request::SCHEMA);
        schema
            .set(context_request::PROTOCOL_VERSION, TokenValue::ULong32(1))
            .unwrap();
        schema
            .set(context_request::CLIENT_VERSION, TokenValue::SmallString("1".into()))
            .unwrap();
        schema
            .set(context_request::USER_AGENT, TokenValue::SmallString("ua".into()))
            .unwrap();

        let err = OutboundFrame::build(Uuid::nil(), 0, &mut schema, Some(Bytes::new())).unwrap_err();
        assert!(matches!(err, RntbdError::Protocol(_)));
        assert!(OutboundFrame::build(Uuid::nil(), 0, &mut schema, None).is_ok());
    }

    #[test]
    fn test_remaining_slices_partial_header() {
        let mut schema = sample_request();
        let frame =
            OutboundFrame::build(Uuid::nil(), 0, &mut schema, Some(Bytes::from_static(b"hello")))
                .unwrap();

        let slices = frame.remaining_slices(5);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[3].len(), 5);

        let slices = frame.remaining_slices(HEADER_SIZE + frame.metadata_len() + 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 2);
    }

    #[tokio::test]
    async fn test_write_frame_survives_partial_writes() {
        let mut schema = sample_request();
        let frame =
            OutboundFrame::build(Uuid::new_v4(), 7, &mut schema, Some(Bytes::from_static(b"body")))
                .unwrap();

        let mut writer = TrickleWriter {
            chunk: 3,
            out: Vec::new(),
            calls: 0,
        };
        write_frame(&mut writer, &frame).await.unwrap();

        assert_eq!(writer.out, frame.to_vec());
        assert!(writer.calls > 1);
    }

    #[tokio::test]
    async fn test_read_frame_split_across_writes() {
        let id = Uuid::new_v4();
        let mut schema = sample_request();
        let frame = OutboundFrame::build(id, 200, &mut schema, Some(Bytes::from_static(b"{\"a\":1}")))
            .unwrap();
        let bytes = frame.to_vec();

        let (mut client, mut server) = duplex(64);
        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(5) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let (header, metadata) = read_header_and_metadata(&mut client, 1024, id).await.unwrap();
        assert_eq!(header.status(), 200);
        assert_eq!(header.activity_id, id);

        let decoded = TokenSchema::decode(&request::SCHEMA, &metadata).unwrap();
        assert_eq!(decoded.byte(request::PAYLOAD_PRESENT), Some(1));
        assert_eq!(decoded.u32(request::PAGE_SIZE), Some(10));

        let body = read_body(&mut client, 1024).await.unwrap();
        assert_eq!(&body[..], b"{\"a\":1}");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_read_mid_header_is_channel_closed() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&[30, 0, 0, 0, 200]).await.unwrap();
        drop(server);

        let err = read_header_and_metadata(&mut client, 1024, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RntbdError::ChannelClosed {
                read: 5,
                expected: HEADER_SIZE
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_read_mid_metadata_is_channel_closed() {
        let (mut client, mut server) = duplex(64);
        let header = FrameHeader::new(HEADER_SIZE as u32 + 10, 200, Uuid::nil());
        server.write_all(&header.encode()).await.unwrap();
        server.write_all(&[0, 0, 0]).await.unwrap();
        drop(server);

        let err = read_header_and_metadata(&mut client, 1024, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(err, RntbdError::ChannelClosed { read: 3, expected: 10 }));
    }

    #[tokio::test]
    async fn test_oversized_length_claim_rejected_before_metadata() {
        let (mut client, mut server) = duplex(64);
        let header = FrameHeader::new(u32::MAX, 200, Uuid::nil());
        server.write_all(&header.encode()).await.unwrap();

        let err = read_header_and_metadata(&mut client, 4096, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(err, RntbdError::FrameLength { length: u32::MAX, .. }));
    }

    #[tokio::test]
    async fn test_body_length_guard() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&2048u32.to_le_bytes()).await.unwrap();

        let err = read_body(&mut client, 1024).await.unwrap_err();
        assert!(matches!(err, RntbdError::FrameLength { length: 2048, .. }));
    }
}
