//! Typed token values and their wire layout.
//!
//! Every metadata field on the wire is written as:
//! ```text
//! ┌──────────┬──────────┬──────────────────────────┐
//! │ Token ID │ Type tag │ Value (layout per type)  │
//! │ u16 LE   │ u8       │                          │
//! └──────────┴──────────┴──────────────────────────┘
//! ```
//!
//! Value layouts:
//!
//! | Type          | Tag  | Layout                              |
//! |---------------|------|-------------------------------------|
//! | `Byte`        | 0x00 | 1 byte                              |
//! | `ULong32`     | 0x02 | u32 LE                              |
//! | `LongLong64`  | 0x05 | i64 LE                              |
//! | `SmallString` | 0x07 | u8 length + UTF-8 (≤ 255 bytes)     |
//! | `String`      | 0x08 | u32 LE length + UTF-8               |
//! | `Bytes`       | 0x0B | u32 LE length + raw bytes           |
//! | `Double64`    | 0x0E | IEEE-754 f64 LE                     |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RntbdError};

/// Size of the `(id, type tag)` prefix in front of every token value.
pub const TOKEN_PREFIX_SIZE: usize = 3;

/// Wire type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    Byte = 0x00,
    ULong32 = 0x02,
    LongLong64 = 0x05,
    SmallString = 0x07,
    String = 0x08,
    Bytes = 0x0B,
    Double64 = 0x0E,
}

impl TokenType {
    /// Map a wire tag to a token type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(TokenType::Byte),
            0x02 => Some(TokenType::ULong32),
            0x05 => Some(TokenType::LongLong64),
            0x07 => Some(TokenType::SmallString),
            0x08 => Some(TokenType::String),
            0x0B => Some(TokenType::Bytes),
            0x0E => Some(TokenType::Double64),
            _ => None,
        }
    }

    /// Wire tag of this type.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Skip over one encoded value of this type.
    ///
    /// Used for tokens the target schema does not know about.
    pub fn skip(self, buf: &mut &[u8]) -> Result<()> {
        let len = match self {
            TokenType::Byte => 1,
            TokenType::ULong32 => 4,
            TokenType::LongLong64 | TokenType::Double64 => 8,
            TokenType::SmallString => {
                ensure(buf, 1, "small string length")?;
                buf.get_u8() as usize
            }
            TokenType::String | TokenType::Bytes => {
                ensure(buf, 4, "length prefix")?;
                buf.get_u32_le() as usize
            }
        };
        ensure(buf, len, "skipped token value")?;
        buf.advance(len);
        Ok(())
    }
}

/// Decoded token value. The variant always matches its [`TokenType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    Byte(u8),
    ULong32(u32),
    LongLong64(i64),
    Double64(f64),
    SmallString(String),
    String(String),
    Bytes(Bytes),
}

impl TokenValue {
    /// The [`TokenType`] this value encodes as.
    pub fn token_type(&self) -> TokenType {
        match self {
            TokenValue::Byte(_) => TokenType::Byte,
            TokenValue::ULong32(_) => TokenType::ULong32,
            TokenValue::LongLong64(_) => TokenType::LongLong64,
            TokenValue::Double64(_) => TokenType::Double64,
            TokenValue::SmallString(_) => TokenType::SmallString,
            TokenValue::String(_) => TokenType::String,
            TokenValue::Bytes(_) => TokenType::Bytes,
        }
    }

    /// Encoded size of the value alone (without id and type tag).
    pub fn encoded_len(&self) -> usize {
        match self {
            TokenValue::Byte(_) => 1,
            TokenValue::ULong32(_) => 4,
            TokenValue::LongLong64(_) | TokenValue::Double64(_) => 8,
            TokenValue::SmallString(s) => 1 + s.len(),
            TokenValue::String(s) => 4 + s.len(),
            TokenValue::Bytes(b) => 4 + b.len(),
        }
    }

    /// Append `(id, tag, value)` to `buf`.
    pub fn encode(&self, id: u16, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(TOKEN_PREFIX_SIZE + self.encoded_len());
        buf.put_u16_le(id);
        buf.put_u8(self.token_type().tag());

        match self {
            TokenValue::Byte(v) => buf.put_u8(*v),
            TokenValue::ULong32(v) => buf.put_u32_le(*v),
            TokenValue::LongLong64(v) => buf.put_i64_le(*v),
            TokenValue::Double64(v) => buf.put_f64_le(*v),
            TokenValue::SmallString(s) => {
                let len = u8::try_from(s.len()).map_err(|_| {
                    RntbdError::Protocol(format!(
                        "Token 0x{:04x}: small string of {} bytes exceeds 255",
                        id,
                        s.len()
                    ))
                })?;
                buf.put_u8(len);
                buf.put_slice(s.as_bytes());
            }
            TokenValue::String(s) => {
                buf.put_u32_le(length_prefix(id, s.len())?);
                buf.put_slice(s.as_bytes());
            }
            TokenValue::Bytes(b) => {
                buf.put_u32_le(length_prefix(id, b.len())?);
                buf.put_slice(b);
            }
        }

        Ok(())
    }

    /// Decode one value of type `kind` from the front of `buf`.
    pub fn decode(kind: TokenType, buf: &mut &[u8]) -> Result<Self> {
        let value = match kind {
            TokenType::Byte => {
                ensure(buf, 1, "byte")?;
                TokenValue::Byte(buf.get_u8())
            }
            TokenType::ULong32 => {
                ensure(buf, 4, "ulong")?;
                TokenValue::ULong32(buf.get_u32_le())
            }
            TokenType::LongLong64 => {
                ensure(buf, 8, "longlong")?;
                TokenValue::LongLong64(buf.get_i64_le())
            }
            TokenType::Double64 => {
                ensure(buf, 8, "double")?;
                TokenValue::Double64(buf.get_f64_le())
            }
            TokenType::SmallString => {
                ensure(buf, 1, "small string length")?;
                let len = buf.get_u8() as usize;
                TokenValue::SmallString(take_utf8(buf, len)?)
            }
            TokenType::String => {
                ensure(buf, 4, "string length")?;
                let len = buf.get_u32_le() as usize;
                TokenValue::String(take_utf8(buf, len)?)
            }
            TokenType::Bytes => {
                ensure(buf, 4, "bytes length")?;
                let len = buf.get_u32_le() as usize;
                ensure(buf, len, "bytes value")?;
                let value = Bytes::copy_from_slice(&buf[..len]);
                buf.advance(len);
                TokenValue::Bytes(value)
            }
        };
        Ok(value)
    }

    /// Render the value as header text.
    pub fn to_header_value(&self) -> String {
        match self {
            TokenValue::Byte(v) => v.to_string(),
            TokenValue::ULong32(v) => v.to_string(),
            TokenValue::LongLong64(v) => v.to_string(),
            TokenValue::Double64(v) => v.to_string(),
            TokenValue::SmallString(s) | TokenValue::String(s) => s.clone(),
            TokenValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

fn length_prefix(id: u16, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        RntbdError::Protocol(format!(
            "Token 0x{:04x}: value of {} bytes exceeds u32 length prefix",
            id, len
        ))
    })
}

#[inline]
fn ensure(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(RntbdError::Protocol(format!(
            "Truncated token {}: need {} bytes, have {}",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}

fn take_utf8(buf: &mut &[u8], len: usize) -> Result<String> {
    ensure(buf, len, "string value")?;
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|e| RntbdError::Protocol(format!("Invalid UTF-8 in string token: {}", e)))?
        .to_owned();
    buf.advance(len);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(id: u16, value: &TokenValue) -> BytesMut {
        let mut buf = BytesMut::new();
        value.encode(id, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_type_tags_are_stable() {
        assert_eq!(TokenType::Byte.tag(), 0x00);
        assert_eq!(TokenType::ULong32.tag(), 0x02);
        assert_eq!(TokenType::LongLong64.tag(), 0x05);
        assert_eq!(TokenType::SmallString.tag(), 0x07);
        assert_eq!(TokenType::String.tag(), 0x08);
        assert_eq!(TokenType::Bytes.tag(), 0x0B);
        assert_eq!(TokenType::Double64.tag(), 0x0E);
        assert_eq!(TokenType::from_tag(0x01), None);
        assert_eq!(TokenType::from_tag(0x0B), Some(TokenType::Bytes));
    }

    #[test]
    fn test_ulong_little_endian_layout() {
        let buf = encode_one(0x0102, &TokenValue::ULong32(0x0A0B0C0D));
        assert_eq!(&buf[..], &[0x02, 0x01, 0x02, 0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn test_small_string_layout() {
        let buf = encode_one(0x0001, &TokenValue::SmallString("abc".into()));
        assert_eq!(&buf[..], &[0x01, 0x00, 0x07, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_string_and_bytes_use_u32_length() {
        let buf = encode_one(0x0005, &TokenValue::String("hi".into()));
        assert_eq!(&buf[..], &[0x05, 0x00, 0x08, 2, 0, 0, 0, b'h', b'i']);

        let buf = encode_one(0x0000, &TokenValue::Bytes(Bytes::from_static(&[9, 8])));
        assert_eq!(&buf[..], &[0x00, 0x00, 0x0B, 2, 0, 0, 0, 9, 8]);
    }

    #[test]
    fn test_small_string_too_long_rejected() {
        let mut buf = BytesMut::new();
        let value = TokenValue::SmallString("x".repeat(256));
        let err = value.encode(7, &mut buf).unwrap_err();
        assert!(err.to_string().contains("exceeds 255"));
    }

    #[test]
    fn test_decode_each_type() {
        let values = [
            TokenValue::Byte(1),
            TokenValue::ULong32(u32::MAX),
            TokenValue::LongLong64(-42),
            TokenValue::Double64(2.5),
            TokenValue::SmallString("agent".into()),
            TokenValue::String("session:1#2".into()),
            TokenValue::Bytes(Bytes::from_static(b"\x00\x01rid")),
        ];

        for value in values {
            let buf = encode_one(0x10, &value);
            let mut slice = &buf[TOKEN_PREFIX_SIZE..];
            let decoded = TokenValue::decode(value.token_type(), &mut slice).unwrap();
            assert_eq!(decoded, value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_decode_truncated_value() {
        let mut slice: &[u8] = &[5, 0, 0, 0, b'a'];
        let err = TokenValue::decode(TokenType::String, &mut slice).unwrap_err();
        assert!(err.to_string().contains("Truncated"));
    }

    #[test]
    fn test_skip_advances_past_value() {
        let mut buf = encode_one(0x99, &TokenValue::String("skip me".into()));
        buf.extend_from_slice(&[0xAA]);
        let mut slice = &buf[TOKEN_PREFIX_SIZE..];
        TokenType::String.skip(&mut slice).unwrap();
        assert_eq!(slice, &[0xAA]);
    }

    #[test]
    fn test_header_rendering() {
        assert_eq!(TokenValue::ULong32(12).to_header_value(), "12");
        assert_eq!(TokenValue::Double64(1.5).to_header_value(), "1.5");
        assert_eq!(TokenValue::SmallString("a".into()).to_header_value(), "a");
    }
}
