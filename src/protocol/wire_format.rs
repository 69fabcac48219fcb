//! Frame header encoding and decoding.
//!
//! Implements the 24-byte header that opens every frame:
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────┐
//! │ Total length │ Status / opcode  │ Activity id      │
//! │ 4 bytes      │ 4 bytes          │ 16 bytes         │
//! │ uint32 LE    │ uint32 LE        │ GUID (mixed LE)  │
//! └──────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! `total_length` covers the header and the token metadata only. A body, when
//! present, follows the metadata with its own 4-byte length prefix.

use uuid::Uuid;

use crate::error::{Result, RntbdError};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// Size of the length prefix in front of a body.
pub const BODY_LENGTH_PREFIX_SIZE: usize = 4;

/// Default ceiling on a frame's `total_length` claim (16 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 16 * 1024 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Header plus metadata length in bytes.
    pub total_length: u32,
    /// Opcode on requests, status code on responses.
    pub status_or_opcode: u32,
    /// Correlation id echoed by the server.
    pub activity_id: Uuid,
}

impl FrameHeader {
    pub fn new(total_length: u32, status_or_opcode: u32, activity_id: Uuid) -> Self {
        Self {
            total_length,
            status_or_opcode,
            activity_id,
        }
    }

    /// Header for a frame carrying `metadata_len` bytes of tokens.
    pub fn for_metadata(
        metadata_len: usize,
        status_or_opcode: u32,
        activity_id: Uuid,
    ) -> Result<Self> {
        let total = HEADER_SIZE
            .checked_add(metadata_len)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                RntbdError::Protocol(format!("metadata of {} bytes overflows a frame", metadata_len))
            })?;
        Ok(Self::new(total, status_or_opcode, activity_id))
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use rntbd_client::protocol::FrameHeader;
    /// use uuid::Uuid;
    ///
    /// let header = FrameHeader::new(30, 200, Uuid::nil());
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 24);
    /// assert_eq!(&bytes[0..4], &[30, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (24 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.total_length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.status_or_opcode.to_le_bytes());
        buf[8..24].copy_from_slice(&self.activity_id.to_bytes_le());
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[8..24]);
        Some(Self {
            total_length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            status_or_opcode: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            activity_id: Uuid::from_bytes_le(id),
        })
    }

    /// Reject a length claim that cannot hold the header or exceeds `max_frame_length`.
    pub fn validate(&self, max_frame_length: u32) -> Result<()> {
        let min = HEADER_SIZE as u32;
        if self.total_length < min || self.total_length > max_frame_length {
            return Err(RntbdError::FrameLength {
                length: self.total_length,
                min,
                max: max_frame_length,
            });
        }
        Ok(())
    }

    /// Number of metadata bytes that follow the header.
    #[inline]
    pub fn metadata_length(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Status code of a response frame.
    #[inline]
    pub fn status(&self) -> u32 {
        self.status_or_opcode
    }
}
