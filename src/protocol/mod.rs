//! Protocol module - token codec, schemas, framing and opcodes.
//!
//! This module implements the binary wire format of the data plane:
//! - Tagged little-endian tokens and sparse token schemas
//! - The concrete handshake, request and response schemas
//! - 24-byte header encoding/decoding
//! - Frame assembly and exact-length stream reads

mod frame;
mod operation;
pub(crate) mod schema;
mod token;
pub mod tokens;
mod wire_format;

pub use frame::{read_body, read_header_and_metadata, write_frame, OutboundFrame};
pub use operation::{opcode, OperationType, ResourceType};
pub use schema::{SchemaDef, Token, TokenDef, TokenSchema};
pub use token::{TokenType, TokenValue, TOKEN_PREFIX_SIZE};
pub use wire_format::{FrameHeader, BODY_LENGTH_PREFIX_SIZE, DEFAULT_MAX_FRAME_LENGTH, HEADER_SIZE};
