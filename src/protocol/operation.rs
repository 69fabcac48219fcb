//! Resource and operation codes carried in the request opcode word.
//!
//! ```text
//! ┌───────────────┬────────────────┐
//! │ Resource type │ Operation type │
//! │ u16 LE        │ u16 LE         │
//! └───────────────┴────────────────┘
//! ```

use std::fmt;

/// Resource type half of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResourceType {
    Connection = 0x0000,
    Database = 0x0001,
    Collection = 0x0002,
    Document = 0x0003,
    Attachment = 0x0004,
    User = 0x0005,
    Permission = 0x0006,
    StoredProcedure = 0x0007,
    Conflict = 0x0008,
    Trigger = 0x0009,
    UserDefinedFunction = 0x000A,
    Offer = 0x000F,
    DatabaseAccount = 0x0014,
    PartitionKeyRange = 0x0016,
    Schema = 0x0018,
    UserDefinedType = 0x001D,
}

impl ResourceType {
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Operation type half of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OperationType {
    Connection = 0x0000,
    Create = 0x0001,
    Patch = 0x0002,
    Read = 0x0003,
    ReadFeed = 0x0004,
    Delete = 0x0005,
    Replace = 0x0006,
    ExecuteJavaScript = 0x0009,
    SqlQuery = 0x000A,
    Query = 0x0010,
    Head = 0x0012,
    HeadFeed = 0x0013,
    Upsert = 0x0014,
    Batch = 0x0025,
}

impl OperationType {
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether the operation has no side effects on the replica.
    ///
    /// Transport failures on read-only operations are safe to re-route to
    /// another replica; failures on anything else are ambiguous.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            OperationType::Read
                | OperationType::ReadFeed
                | OperationType::Query
                | OperationType::SqlQuery
                | OperationType::Head
                | OperationType::HeadFeed
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Packs a request opcode: resource type in the low half, operation type in the high half.
#[inline]
pub fn opcode(resource_type: ResourceType, operation_type: OperationType) -> u32 {
    u32::from(resource_type.code()) | (u32::from(operation_type.code()) << 16)
}
