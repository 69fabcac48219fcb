//! Sparse token schemas.
//!
//! A [`SchemaDef`] is a static, id-sorted table of [`TokenDef`]s. A
//! [`TokenSchema`] is a fresh per-frame instance of that table: one slot per
//! definition, each with its own present bit. Only present tokens are written,
//! so a schema with a hundred optional fields costs nothing for the ones left
//! empty.

use bytes::{Buf, Bytes, BytesMut};

use super::token::{TokenType, TokenValue, TOKEN_PREFIX_SIZE};
use crate::error::{Result, RntbdError};

/// Static definition of one token.
#[derive(Debug)]
pub struct TokenDef {
    /// Wire id, unique within its schema.
    pub id: u16,
    pub kind: TokenType,
    pub required: bool,
    pub name: &'static str,
    /// Header name this token maps to on the request/response surface.
    pub header: Option<&'static str>,
}

/// Static, id-sorted token table for one frame role.
#[derive(Debug)]
pub struct SchemaDef {
    pub name: &'static str,
    pub tokens: &'static [TokenDef],
}

impl SchemaDef {
    fn index_of(&self, id: u16) -> Option<usize> {
        self.tokens.binary_search_by_key(&id, |def| def.id).ok()
    }

    /// Look up a definition by header name (case-insensitive).
    pub fn by_header(&self, header: &str) -> Option<&'static TokenDef> {
        self.tokens.iter().find(|def| {
            def.header
                .map(|h| h.eq_ignore_ascii_case(header))
                .unwrap_or(false)
        })
    }
}

/// One token slot of a schema instance.
#[derive(Debug, Clone)]
pub struct Token {
    def: &'static TokenDef,
    value: Option<TokenValue>,
}

impl Token {
    /// Token id on the wire.
    #[inline]
    pub fn id(&self) -> u16 {
        self.def.id
    }

    /// Declared value type.
    #[inline]
    pub fn kind(&self) -> TokenType {
        self.def.kind
    }

    /// Whether encode and decode fail when this token is absent.
    #[inline]
    pub fn required(&self) -> bool {
        self.def.required
    }

    /// Whether a value is set.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Token name, for logs and errors.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Header name the token maps to, if any.
    pub fn header(&self) -> Option<&'static str> {
        self.def.header
    }

    /// The value, if present.
    pub fn value(&self) -> Option<&TokenValue> {
        self.value.as_ref()
    }
}

/// Per-frame instance of a [`SchemaDef`].
#[derive(Debug, Clone)]
pub struct TokenSchema {
    def: &'static SchemaDef,
    tokens: Vec<Token>,
}

impl TokenSchema {
    /// Create an instance with every token absent.
    pub fn new(def: &'static SchemaDef) -> Self {
        Self {
            def,
            tokens: def
                .tokens
                .iter()
                .map(|def| Token { def, value: None })
                .collect(),
        }
    }

    /// Schema role name, e.g. `"request"`.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Static definition this instance was built from.
    pub fn definition(&self) -> &'static SchemaDef {
        self.def
    }

    /// Token slot for `id`, or `None` if the schema has no such token.
    pub fn get(&self, id: u16) -> Option<&Token> {
        self.def.index_of(id).map(|i| &self.tokens[i])
    }

    /// Value of token `id`, if present.
    pub fn value(&self, id: u16) -> Option<&TokenValue> {
        self.get(id).and_then(Token::value)
    }

    /// Whether token `id` has a value.
    pub fn is_present(&self, id: u16) -> bool {
        self.value(id).is_some()
    }

    /// Set a token's value. The value's type must match the definition.
    pub fn set(&mut self, id: u16, value: TokenValue) -> Result<()> {
        let index = self.def.index_of(id).ok_or_else(|| {
            RntbdError::Protocol(format!(
                "Token 0x{:04x} is not part of the {} schema",
                id, self.def.name
            ))
        })?;

        let token = &mut self.tokens[index];
        if value.token_type() != token.def.kind {
            return Err(RntbdError::Protocol(format!(
                "Token 0x{:04x} ({}) expects {:?}, got {:?}",
                id,
                token.def.name,
                token.def.kind,
                value.token_type()
            )));
        }

        token.value = Some(value);
        Ok(())
    }

    /// Mark token `id` absent. Unknown ids are ignored.
    pub fn clear(&mut self, id: u16) {
        if let Some(index) = self.def.index_of(id) {
            self.tokens[index].value = None;
        }
    }

    /// Iterate over present tokens in id order.
    pub fn present(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.is_present())
    }

    /// Number of present tokens.
    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    /// `Byte` value of token `id`.
    pub fn byte(&self, id: u16) -> Option<u8> {
        match self.value(id)? {
            TokenValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// `ULong32` value of token `id`.
    pub fn u32(&self, id: u16) -> Option<u32> {
        match self.value(id)? {
            TokenValue::ULong32(v) => Some(*v),
            _ => None,
        }
    }

    /// `LongLong64` value of token `id`.
    pub fn i64(&self, id: u16) -> Option<i64> {
        match self.value(id)? {
            TokenValue::LongLong64(v) => Some(*v),
            _ => None,
        }
    }

    /// `Double64` value of token `id`.
    pub fn f64(&self, id: u16) -> Option<f64> {
        match self.value(id)? {
            TokenValue::Double64(v) => Some(*v),
            _ => None,
        }
    }

    /// String value of token `id`, small or long.
    pub fn str(&self, id: u16) -> Option<&str> {
        match self.value(id)? {
            TokenValue::SmallString(s) | TokenValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// `Bytes` value of token `id`.
    pub fn bytes(&self, id: u16) -> Option<&Bytes> {
        match self.value(id)? {
            TokenValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Fail if any required token is absent.
    pub fn check_required(&self) -> Result<()> {
        match self.tokens.iter().find(|t| t.required() && !t.is_present()) {
            Some(missing) => Err(RntbdError::MissingRequiredToken {
                schema: self.def.name,
                id: missing.id(),
                name: missing.name(),
            }),
            None => Ok(()),
        }
    }

    /// Exact number of bytes [`encode`](Self::encode) will append.
    pub fn encoded_len(&self) -> usize {
        self.present()
            .filter_map(|t| t.value.as_ref())
            .map(|v| TOKEN_PREFIX_SIZE + v.encoded_len())
            .sum()
    }

    /// Append every present token to `buf`.
    ///
    /// Fails before writing anything if a required token is absent.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.check_required()?;
        buf.reserve(self.encoded_len());
        for token in &self.tokens {
            if let Some(value) = &token.value {
                value.encode(token.def.id, buf)?;
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a metadata section against `def`.
    ///
    /// Tokens with ids unknown to `def` are skipped using their type tag. An
    /// unknown type tag, a type that disagrees with the definition, or a
    /// missing required token is a hard failure.
    pub fn decode(def: &'static SchemaDef, bytes: &[u8]) -> Result<Self> {
        let mut schema = TokenSchema::new(def);
        let mut buf = bytes;

        while buf.has_remaining() {
            if buf.len() < TOKEN_PREFIX_SIZE {
                return Err(RntbdError::Protocol(format!(
                    "Truncated token header in {} metadata ({} trailing bytes)",
                    def.name,
                    buf.len()
                )));
            }

            let id = buf.get_u16_le();
            let tag = buf.get_u8();
            let kind = TokenType::from_tag(tag).ok_or(RntbdError::UnknownTokenType { id, tag })?;

            match def.index_of(id) {
                Some(index) => {
                    let token = &mut schema.tokens[index];
                    if token.def.kind != kind {
                        return Err(RntbdError::Protocol(format!(
                            "Token 0x{:04x} ({}) arrived as {:?}, expected {:?}",
                            id, token.def.name, kind, token.def.kind
                        )));
                    }
                    token.value = Some(TokenValue::decode(kind, &mut buf)?);
                }
                None => {
                    tracing::trace!(
                        "Skipping unknown token 0x{:04x} ({:?}) in {} metadata",
                        id,
                        kind,
                        def.name
                    );
                    kind.skip(&mut buf)?;
                }
            }
        }

        schema.check_required()?;
        Ok(schema)
    }
}

impl PartialEq for TokenSchema {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.def, other.def)
            && self
                .tokens
                .iter()
                .zip(other.tokens.iter())
                .all(|(a, b)| a.value == b.value)
    }
}

/// Declare a static token schema together with id constants for its tokens.
///
/// ```ignore
/// token_schema! {
///     pub mod context_request("context-request") {
///         PROTOCOL_VERSION = 0x0000, ULong32, required, None;
///     }
/// }
/// ```
macro_rules! token_schema {
    (
        $(#[$meta:meta])*
        $vis:vis mod $module:ident ($schema:literal) {
            $( $name:ident = $id:literal, $kind:ident, $req:ident, $header:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[allow(missing_docs, dead_code)]
        $vis mod $module {
            use $crate::protocol::schema::{SchemaDef, TokenDef};
            use $crate::protocol::token::TokenType;

            $( pub const $name: u16 = $id; )*

            pub static SCHEMA: SchemaDef = SchemaDef {
                name: $schema,
                tokens: &[
                    $( TokenDef {
                        id: $id,
                        kind: TokenType::$kind,
                        required: $crate::protocol::schema::token_schema!(@required $req),
                        name: stringify!($name),
                        header: $header,
                    }, )*
                ],
            };
        }
    };
    (@required required) => { true };
    (@required optional) => { false };
}

pub(crate) use token_schema;

#[cfg(test)]
mod tests {
    use super::*;

    token_schema! {
        mod sample("sample") {
            FLAG = 0x0000, Byte, required, None;
            COUNT = 0x0001, ULong32, optional, Some("x-count");
            LSN = 0x0002, LongLong64, optional, None;
            CHARGE = 0x0003, Double64, optional, None;
            AGENT = 0x0004, SmallString, optional, None;
            SESSION = 0x0005, String, optional, Some("x-session");
            RID = 0x0006, Bytes, optional, None;
        }
    }

    token_schema! {
        mod wide("wide") {
            REQUIRED = 0x0000, Byte, required, None;
            F01 = 0x0001, ULong32, optional, None;
            F02 = 0x0002, ULong32, optional, None;
            F03 = 0x0003, ULong32, optional, None;
            F04 = 0x0004, ULong32, optional, None;
            F05 = 0x0005, ULong32, optional, None;
            F06 = 0x0006, ULong32, optional, None;
            F07 = 0x0007, ULong32, optional, None;
            F08 = 0x0008, ULong32, optional, None;
            F09 = 0x0009, ULong32, optional, None;
            F10 = 0x000A, String, optional, None;
            F11 = 0x000B, String, optional, None;
            F12 = 0x000C, String, optional, None;
            F13 = 0x000D, String, optional, None;
            F14 = 0x000E, String, optional, None;
            F15 = 0x000F, String, optional, None;
            F16 = 0x0010, Bytes, optional, None;
            F17 = 0x0011, Bytes, optional, None;
            F18 = 0x0012, Bytes, optional, None;
            F19 = 0x0013, Bytes, optional, None;
        }
    }

    fn full_sample() -> TokenSchema {
        let mut schema = TokenSchema::new(&sample::SCHEMA);
        schema.set(sample::FLAG, TokenValue::Byte(1)).unwrap();
        schema.set(sample::COUNT, TokenValue::ULong32(7)).unwrap();
        schema.set(sample::LSN, TokenValue::LongLong64(-3)).unwrap();
        schema.set(sample::CHARGE, TokenValue::Double64(4.25)).unwrap();
        schema
            .set(sample::AGENT, TokenValue::SmallString("agent/1.0".into()))
            .unwrap();
        schema
            .set(sample::SESSION, TokenValue::String("0:1#5".into()))
            .unwrap();
        schema
            .set(sample::RID, TokenValue::Bytes(Bytes::from_static(b"\x01\x02")))
            .unwrap();
        schema
    }

    #[test]
    fn test_schema_tables_sorted_by_id() {
        for def in [&sample::SCHEMA, &wide::SCHEMA] {
            assert!(def.tokens.windows(2).all(|w| w[0].id < w[1].id));
        }
    }

    #[test]
    fn test_round_trip_all_types() {
        let schema = full_sample();
        let bytes = schema.to_bytes().unwrap();
        let decoded = TokenSchema::decode(&sample::SCHEMA, &bytes).unwrap();
        assert_eq!(decoded, schema);
        assert_eq!(decoded.str(sample::SESSION), Some("0:1#5"));
        assert_eq!(decoded.f64(sample::CHARGE), Some(4.25));
    }

    #[test]
    fn test_absent_optional_tokens_stay_absent() {
        let mut schema = TokenSchema::new(&sample::SCHEMA);
        schema.set(sample::FLAG, TokenValue::Byte(0)).unwrap();
        schema.set(sample::LSN, TokenValue::LongLong64(99)).unwrap();

        let decoded = TokenSchema::decode(&sample::SCHEMA, &schema.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.i64(sample::LSN), Some(99));
        assert!(!decoded.is_present(sample::COUNT));
        assert!(!decoded.is_present(sample::RID));
        assert_eq!(decoded.present_count(), 2);
    }

    #[test]
    fn test_missing_required_fails_encode_and_decode() {
        let schema = TokenSchema::new(&sample::SCHEMA);
        assert!(matches!(
            schema.to_bytes(),
            Err(RntbdError::MissingRequiredToken { id: 0, .. })
        ));

        let mut buf = BytesMut::new();
        TokenValue::ULong32(1).encode(sample::COUNT, &mut buf).unwrap();
        assert!(matches!(
            TokenSchema::decode(&sample::SCHEMA, &buf),
            Err(RntbdError::MissingRequiredToken { id: 0, .. })
        ));
    }

    #[test]
    fn test_sparse_encoding_cost() {
        let mut schema = TokenSchema::new(&wide::SCHEMA);
        schema.set(wide::REQUIRED, TokenValue::Byte(1)).unwrap();
        schema.set(wide::F05, TokenValue::ULong32(5)).unwrap();

        let bytes = schema.to_bytes().unwrap();
        assert_eq!(bytes.len(), (TOKEN_PREFIX_SIZE + 1) + (TOKEN_PREFIX_SIZE + 4));
        assert_eq!(bytes.len(), schema.encoded_len());
    }

    #[test]
    fn test_unknown_token_id_is_skipped() {
        let mut buf = BytesMut::new();
        TokenValue::Byte(1).encode(sample::FLAG, &mut buf).unwrap();
        TokenValue::String("from the future".into())
            .encode(0x7F00, &mut buf)
            .unwrap();
        TokenValue::ULong32(3).encode(sample::COUNT, &mut buf).unwrap();

        let decoded = TokenSchema::decode(&sample::SCHEMA, &buf).unwrap();
        assert_eq!(decoded.byte(sample::FLAG), Some(1));
        assert_eq!(decoded.u32(sample::COUNT), Some(3));
        assert_eq!(decoded.present_count(), 2);
    }

    #[test]
    fn test_unknown_type_tag_is_fatal() {
        let mut buf = BytesMut::new();
        TokenValue::Byte(1).encode(sample::FLAG, &mut buf).unwrap();
        buf.extend_from_slice(&[0x00, 0x7F, 0x01, 0xFF]);

        let err = TokenSchema::decode(&sample::SCHEMA, &buf).unwrap_err();
        assert!(matches!(
            err,
            RntbdError::UnknownTokenType {
                id: 0x7F00,
                tag: 0x01
            }
        ));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut schema = TokenSchema::new(&sample::SCHEMA);
        assert!(schema.set(sample::COUNT, TokenValue::Byte(1)).is_err());
        assert!(schema.set(0x0F00, TokenValue::Byte(1)).is_err());

        let mut buf = BytesMut::new();
        TokenValue::Byte(1).encode(sample::FLAG, &mut buf).unwrap();
        TokenValue::Byte(1).encode(sample::COUNT, &mut buf).unwrap();
        assert!(TokenSchema::decode(&sample::SCHEMA, &buf).is_err());
    }

    #[test]
    fn test_truncated_token_header() {
        let mut buf = BytesMut::new();
        TokenValue::Byte(1).encode(sample::FLAG, &mut buf).unwrap();
        buf.extend_from_slice(&[0x01, 0x00]);
        assert!(TokenSchema::decode(&sample::SCHEMA, &buf).is_err());
    }

    #[test]
    fn test_lookup_by_header() {
        let def = sample::SCHEMA.by_header("X-Session").unwrap();
        assert_eq!(def.id, sample::SESSION);
        assert!(sample::SCHEMA.by_header("x-missing").is_none());
    }

    #[test]
    fn test_clear_removes_value() {
        let mut schema = full_sample();
        schema.clear(sample::RID);
        assert!(!schema.is_present(sample::RID));
        assert!(schema.bytes(sample::RID).is_none());
    }
}
