//! Read-only view over a generated (or firmware-provided) RHCT.
//!
//! Decoding checks the signature, the header length and the checksum, then
//! walks the node list. Hart info offsets must land on a node start.

use serde::Serialize;

use crate::acpi::byte_sum;
use crate::error::{Result, RhctError};
use crate::layout::*;

/// Standard ACPI description header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdtHeader {
    pub signature: String,
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: String,
    pub oem_table_id: String,
    pub oem_revision: u32,
    pub creator_id: String,
    pub creator_revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeBody {
    IsaString {
        isa: String,
    },
    Cmo {
        cbom_block_size: u8,
        cbop_block_size: u8,
        cboz_block_size: u8,
    },
    HartInfo {
        acpi_processor_uid: u32,
        offsets: Vec<u32>,
    },
    /// A node type this decoder does not interpret (MMU nodes included).
    Unknown {
        node_type: u16,
        length: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RhctNode {
    pub offset: u32,
    pub node_type: u16,
    pub revision: u16,
    pub body: NodeBody,
}

/// Decoded RHCT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RhctView {
    pub header: SdtHeader,
    pub flags: u32,
    pub timebase_frequency: u64,
    pub node_offset: u32,
    pub nodes: Vec<RhctNode>,
}

impl RhctView {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = parse_sdt_header(&mut cursor)?;

        if header.signature.as_bytes() != RHCT_SIGNATURE {
            let mut signature = [0u8; 4];
            signature.copy_from_slice(&data[0..4]);
            return Err(RhctError::BadSignature(signature));
        }
        if header.length as usize != data.len() {
            return Err(RhctError::LengthMismatch {
                header: header.length,
                actual: data.len(),
            });
        }
        let sum = byte_sum(data);
        if sum != 0 {
            return Err(RhctError::BadChecksum { sum });
        }

        let flags = cursor.u32()?;
        let timebase_frequency = cursor.u64()?;
        let node_count = cursor.u32()?;
        let node_offset = cursor.u32()?;

        let mut nodes = Vec::new();
        let mut offset = node_offset as usize;
        for _ in 0..node_count {
            let (node, length) = parse_node(data, offset)?;
            nodes.push(node);
            offset += length;
        }

        let view = RhctView {
            header,
            flags,
            timebase_frequency,
            node_offset,
            nodes,
        };
        view.check_references()?;
        Ok(view)
    }

    pub fn timer_cannot_wake_cpu(&self) -> bool {
        self.flags & FLAG_TIMER_CANNOT_WAKE_CPU != 0
    }

    pub fn node_at(&self, offset: u32) -> Option<&RhctNode> {
        self.nodes.iter().find(|n| n.offset == offset)
    }

    pub fn isa_string(&self) -> Option<&str> {
        self.nodes.iter().find_map(|n| match &n.body {
            NodeBody::IsaString { isa } => Some(isa.as_str()),
            _ => None,
        })
    }

    /// `(acpi_processor_uid, offsets)` of every hart info node, in table order.
    pub fn harts(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.nodes.iter().filter_map(|n| match &n.body {
            NodeBody::HartInfo {
                acpi_processor_uid,
                offsets,
            } => Some((*acpi_processor_uid, offsets.as_slice())),
            _ => None,
        })
    }

    fn check_references(&self) -> Result<()> {
        for node in &self.nodes {
            if let NodeBody::HartInfo { offsets, .. } = &node.body {
                for &target in offsets {
                    if self.node_at(target).is_none() {
                        return Err(RhctError::BadNode {
                            offset: node.offset as usize,
                            detail: format!("offset {target:#x} is not a node"),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(RhctError::Truncated {
                offset: self.pos,
                needed: n,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_sdt_header(cursor: &mut Cursor<'_>) -> Result<SdtHeader> {
    if cursor.data.len() < RHCT_HEADER_SIZE {
        return Err(RhctError::Truncated {
            offset: cursor.data.len(),
            needed: RHCT_HEADER_SIZE,
        });
    }
    Ok(SdtHeader {
        signature: ascii(cursor.take(4)?),
        length: cursor.u32()?,
        revision: cursor.u8()?,
        checksum: cursor.u8()?,
        oem_id: ascii(cursor.take(6)?),
        oem_table_id: ascii(cursor.take(8)?),
        oem_revision: cursor.u32()?,
        creator_id: ascii(cursor.take(4)?),
        creator_revision: cursor.u32()?,
    })
}

/// Decode the node at `offset`, returning it with its length.
fn parse_node(data: &[u8], offset: usize) -> Result<(RhctNode, usize)> {
    let mut cursor = Cursor::at(data, offset);
    let node_type = cursor.u16()?;
    let length = cursor.u16()?;
    let revision = cursor.u16()?;

    let bad = |detail: String| RhctError::BadNode { offset, detail };
    if usize::from(length) < NODE_HEADER_SIZE {
        return Err(bad(format!("length {length} is shorter than a node header")));
    }
    let end = offset + usize::from(length);
    if end > data.len() {
        return Err(RhctError::Truncated {
            offset,
            needed: usize::from(length),
        });
    }
    let node = &data[..end];
    let mut cursor = Cursor::at(node, offset + NODE_HEADER_SIZE);

    let body = match node_type {
        NODE_TYPE_ISA_STRING => {
            let isa_length = usize::from(cursor.u16()?);
            let raw = cursor
                .take(isa_length)
                .map_err(|_| bad(format!("ISA length {isa_length} overruns the node")))?;
            let isa = raw.split(|&b| b == 0).next().unwrap_or_default();
            NodeBody::IsaString { isa: ascii(isa) }
        }
        NODE_TYPE_CMO => {
            let _reserved = cursor.u8()?;
            NodeBody::Cmo {
                cbom_block_size: cursor.u8()?,
                cbop_block_size: cursor.u8()?,
                cboz_block_size: cursor.u8()?,
            }
        }
        NODE_TYPE_HART_INFO => {
            let count = usize::from(cursor.u16()?);
            let acpi_processor_uid = cursor.u32()?;
            if hart_info_node_size(count) > usize::from(length) {
                return Err(bad(format!("{count} offsets overrun the node")));
            }
            let offsets = (0..count)
                .map(|_| cursor.u32())
                .collect::<Result<Vec<_>>>()?;
            NodeBody::HartInfo {
                acpi_processor_uid,
                offsets,
            }
        }
        _ => NodeBody::Unknown { node_type, length },
    };

    let node = RhctNode {
        offset: offset as u32,
        node_type,
        revision,
        body,
    };
    Ok((node, usize::from(length)))
}
