use hartcap_cm::{CmError, ErrorKind, ObjectKind};
use thiserror::Error;

/// Errors raised while building or decoding an RHCT.
#[derive(Debug, Error)]
pub enum RhctError {
    /// The caller asked for a table revision this generator cannot emit.
    #[error("requested table revision {requested} is not supported (supported: {min}..={max})")]
    UnsupportedRevision {
        /// Revision from the table info.
        requested: u8,
        /// Lowest supported revision.
        min: u8,
        /// Highest supported revision.
        max: u8,
    },

    /// A record kind the table cannot do without is absent from the store.
    #[error("no {kind} records to build the table from")]
    MissingRecords {
        /// Kind that was fetched.
        kind: ObjectKind,
    },

    /// A node would not fit its 16-bit length field.
    #[error("{node} node length {length} exceeds 65535 bytes")]
    NodeTooLarge {
        /// Node type being sized.
        node: &'static str,
        /// Computed length in bytes.
        length: usize,
    },

    /// The whole table would not fit the 32-bit header length.
    #[error("table size {size} exceeds 4 GiB")]
    TableTooLarge {
        /// Computed table size in bytes.
        size: u64,
    },

    /// Buffer or index storage could not be reserved.
    #[error("could not reserve {count} bytes for {what}")]
    OutOfResources {
        /// What the storage was for.
        what: &'static str,
        /// Amount requested.
        count: usize,
    },

    /// A node was written somewhere other than its planned offset.
    #[error("node at offset {offset:#x} landed at {actual:#x}")]
    LayoutMismatch {
        /// Offset the plan assigned.
        offset: u32,
        /// Offset the writer reached.
        actual: usize,
    },

    /// Fetching records from the configuration store failed.
    #[error(transparent)]
    Store(#[from] CmError),

    /// The table bytes end before a header or node does.
    #[error("table truncated: need {needed} bytes at offset {offset:#x}")]
    Truncated {
        /// Offset of the structure being read.
        offset: usize,
        /// Bytes the structure needs.
        needed: usize,
    },

    /// The header signature is not `RHCT`.
    #[error("bad signature {0:?}, expected \"RHCT\"")]
    BadSignature([u8; 4]),

    /// The header length disagrees with the bytes supplied.
    #[error("header length {header} does not match table size {actual}")]
    LengthMismatch {
        /// Length recorded in the header.
        header: u32,
        /// Number of bytes supplied.
        actual: usize,
    },

    /// The table bytes do not sum to zero.
    #[error("checksum mismatch: bytes sum to {sum:#04x}")]
    BadChecksum {
        /// Byte sum of the whole table.
        sum: u8,
    },

    /// A node header or body is inconsistent with its length or the table.
    #[error("malformed node at offset {offset:#x}: {detail}")]
    BadNode {
        /// Offset of the node within the table.
        offset: usize,
        /// What was wrong with it.
        detail: String,
    },
}

impl RhctError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RhctError::MissingRecords { .. } => ErrorKind::NotFound,
            RhctError::OutOfResources { .. } => ErrorKind::OutOfResources,
            RhctError::LayoutMismatch { .. } => ErrorKind::Aborted,
            RhctError::Store(e) => e.kind(),
            RhctError::UnsupportedRevision { .. }
            | RhctError::NodeTooLarge { .. }
            | RhctError::TableTooLarge { .. }
            | RhctError::Truncated { .. }
            | RhctError::BadSignature(_)
            | RhctError::LengthMismatch { .. }
            | RhctError::BadChecksum { .. }
            | RhctError::BadNode { .. } => ErrorKind::InvalidParameter,
        }
    }
}

pub type Result<T> = std::result::Result<T, RhctError>;
