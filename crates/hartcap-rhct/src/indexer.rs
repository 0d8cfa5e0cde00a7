//! Side index of where each source record landed in the table.

use serde::Serialize;

use crate::error::{Result, RhctError};

/// Which record a table node was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeSource {
    IsaString,
    /// Position in the CMO record list.
    Cmo(usize),
    /// Position in the hart record list.
    HartInfo { index: usize, acpi_processor_uid: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeIndexEntry {
    pub source: NodeSource,
    /// Byte offset of the node from the start of the table.
    pub offset: u32,
}

/// Node offsets in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeIndexer {
    entries: Vec<NodeIndexEntry>,
}

impl NodeIndexer {
    pub fn with_capacity(count: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(count)
            .map_err(|_| RhctError::OutOfResources {
                what: "node indexer",
                count: count * std::mem::size_of::<NodeIndexEntry>(),
            })?;
        Ok(Self { entries })
    }

    pub fn push(&mut self, source: NodeSource, offset: u32) {
        self.entries.push(NodeIndexEntry { source, offset });
    }

    pub fn entries(&self) -> &[NodeIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offset_of(&self, source: NodeSource) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.offset)
    }
}
