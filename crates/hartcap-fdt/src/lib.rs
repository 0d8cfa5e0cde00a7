//! Flattened device tree (FDT) support for hartcap.
//!
//! Provides an in-memory [`DeviceTree`], a codec for the binary blob format
//! handed over by firmware, and the read-only [`TreeReader`] interface the
//! hardware-information parsers are written against.
//!
//! ## Blob Layout
//!
//! ```text
//! FDT Blob Layout:
//! ┌──────────────────────────────┐
//! │ Header (10 x u32, BE)        │  40 bytes
//! │   magic: 0xd00dfeed          │
//! │   totalsize, offsets, sizes  │
//! ├──────────────────────────────┤
//! │ Memory reservation map       │  (u64, u64)* + terminator
//! ├──────────────────────────────┤
//! │ Structure block              │
//! │   BEGIN_NODE / PROP /        │
//! │   END_NODE / NOP / END       │
//! ├──────────────────────────────┤
//! │ Strings block                │  NUL-terminated property names
//! └──────────────────────────────┘
//! ```

pub mod blob;
pub mod error;
pub mod reader;
pub mod tree;

pub use error::{FdtError, Result};
pub use reader::{RegRegion, TreeReader};
pub use tree::{DeviceTree, Node, NodeId, Property};
