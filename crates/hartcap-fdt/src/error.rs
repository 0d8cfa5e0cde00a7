//! Error types for device tree operations.

use crate::tree::NodeId;

/// Errors that can occur while decoding, encoding or editing a device tree.
#[derive(Debug, thiserror::Error)]
pub enum FdtError {
    /// The header does not start with the FDT magic number.
    #[error("invalid magic 0x{0:08x}: expected 0xd00dfeed")]
    InvalidMagic(u32),

    /// The blob is not readable as version 16 or 17.
    #[error("unsupported blob version {version} (last compatible {last_compatible})")]
    UnsupportedVersion {
        /// Version recorded in the header.
        version: u32,
        /// Oldest version the blob claims compatibility with.
        last_compatible: u32,
    },

    /// A read ran past the end of the blob or one of its blocks.
    #[error("blob truncated at offset {offset}")]
    Truncated {
        /// Byte offset where data ran out.
        offset: usize,
    },

    /// A structure token does not start on a 4-byte boundary.
    #[error("token at offset {offset} is not 4-byte aligned")]
    TokenUnaligned {
        /// Byte offset of the token.
        offset: usize,
    },

    /// The structure block holds a token this decoder does not know.
    #[error("unknown token 0x{token:08x} at offset {offset}")]
    BadToken {
        /// The raw token value.
        token: u32,
        /// Byte offset of the token.
        offset: usize,
    },

    /// A node name or property name is unterminated or not UTF-8.
    #[error("malformed string at offset {offset}")]
    BadString {
        /// Byte offset of the string.
        offset: usize,
    },

    /// Begin-node and end-node tokens do not pair up.
    #[error("structure block has unbalanced node tokens")]
    Unbalanced,

    /// A `NodeId` does not belong to this tree.
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    /// A node name is empty, holds a `/`, or repeats a sibling's name.
    #[error("invalid node name '{0}'")]
    InvalidNodeName(String),

    /// A `phandle` property is not a single cell, or is 0 or `0xffffffff`.
    #[error("invalid phandle value on node {node}")]
    InvalidPhandle {
        /// Node carrying the bad value.
        node: NodeId,
    },

    /// Two nodes carry the same phandle.
    #[error("phandle {phandle:#x} is used by both {first} and {second}")]
    DuplicatePhandle {
        /// The shared phandle value.
        phandle: u32,
        /// Node that claimed the phandle first.
        first: NodeId,
        /// Node whose claim was refused.
        second: NodeId,
    },
}

/// Result type for device tree operations.
pub type Result<T> = std::result::Result<T, FdtError>;
