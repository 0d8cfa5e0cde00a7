//! Flattened device tree blob codec.
//!
//! Decodes blobs of version 16 or 17 (anything whose last compatible version
//! is at most 17) and encodes version 17 blobs with an empty memory
//! reservation map.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{FdtError, Result};
use crate::tree::{DeviceTree, NodeId};

/// Magic number at the start of every blob.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

const FDT_BEGIN_NODE: u32 = 0x0000_0001;
const FDT_END_NODE: u32 = 0x0000_0002;
const FDT_PROP: u32 = 0x0000_0003;
const FDT_NOP: u32 = 0x0000_0004;
const FDT_END: u32 = 0x0000_0009;

/// 10 big-endian u32 fields.
const HEADER_SIZE: usize = 40;

/// One all-zero reservation entry terminates the map.
const RSVMAP_TERMINATOR_SIZE: usize = 16;

const CURRENT_VERSION: u32 = 17;
const LAST_COMPATIBLE_VERSION: u32 = 16;

/// Parsed blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    totalsize: u32,
    off_dt_struct: u32,
    off_dt_strings: u32,
    version: u32,
    last_comp_version: u32,
    boot_cpuid_phys: u32,
    size_dt_strings: u32,
    size_dt_struct: u32,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(FdtError::Truncated { offset: data.len() });
        }
        let field = |i: usize| be_u32(data, i * 4).unwrap_or(0);

        let magic = field(0);
        if magic != FDT_MAGIC {
            return Err(FdtError::InvalidMagic(magic));
        }

        let header = Header {
            totalsize: field(1),
            off_dt_struct: field(2),
            off_dt_strings: field(3),
            version: field(5),
            last_comp_version: field(6),
            boot_cpuid_phys: field(7),
            size_dt_strings: field(8),
            size_dt_struct: field(9),
        };

        if header.version < LAST_COMPATIBLE_VERSION || header.last_comp_version > CURRENT_VERSION
        {
            return Err(FdtError::UnsupportedVersion {
                version: header.version,
                last_compatible: header.last_comp_version,
            });
        }
        if header.totalsize as usize > data.len() {
            return Err(FdtError::Truncated { offset: data.len() });
        }
        Ok(header)
    }

    /// Structure block bounds. Version 16 blobs have no `size_dt_struct`.
    fn struct_range(&self) -> (usize, usize) {
        let start = self.off_dt_struct as usize;
        let end = if self.version >= 17 {
            start.saturating_add(self.size_dt_struct as usize)
        } else {
            self.totalsize as usize
        };
        (start, end)
    }
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Read a NUL-terminated string starting at `offset` within `block`.
fn c_string(block: &[u8], offset: usize) -> Result<&str> {
    let tail = block
        .get(offset..)
        .ok_or(FdtError::BadString { offset })?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(FdtError::BadString { offset })?;
    std::str::from_utf8(&tail[..len]).map_err(|_| FdtError::BadString { offset })
}

impl DeviceTree {
    /// Decode a flattened device tree blob.
    pub fn from_blob(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let data = &data[..header.totalsize as usize];

        let (struct_start, struct_end) = header.struct_range();
        let structure = data
            .get(struct_start..struct_end)
            .ok_or(FdtError::Truncated { offset: struct_end })?;
        let strings_start = header.off_dt_strings as usize;
        let strings_end = strings_start.saturating_add(header.size_dt_strings as usize);
        let strings = data
            .get(strings_start..strings_end)
            .ok_or(FdtError::Truncated {
                offset: strings_end,
            })?;

        let mut tree = DeviceTree::new();
        tree.set_boot_cpuid_phys(header.boot_cpuid_phys);

        let mut stack: Vec<NodeId> = Vec::new();
        let mut root_seen = false;
        let mut offset = 0usize;

        loop {
            if offset % 4 != 0 {
                return Err(FdtError::TokenUnaligned {
                    offset: struct_start + offset,
                });
            }
            let token = be_u32(structure, offset).ok_or(FdtError::Truncated {
                offset: struct_start + offset,
            })?;
            let token_offset = offset;
            offset += 4;

            match token {
                FDT_BEGIN_NODE => {
                    let name = c_string(structure, offset).map_err(|_| FdtError::BadString {
                        offset: struct_start + offset,
                    })?;
                    offset = align4(offset + name.len() + 1);
                    let id = match stack.last() {
                        None if !root_seen => {
                            root_seen = true;
                            NodeId::ROOT
                        }
                        None => return Err(FdtError::Unbalanced),
                        Some(&parent) => tree.add_node(parent, name)?,
                    };
                    stack.push(id);
                }
                FDT_END_NODE => {
                    stack.pop().ok_or(FdtError::Unbalanced)?;
                }
                FDT_PROP => {
                    let len = be_u32(structure, offset).ok_or(FdtError::Truncated {
                        offset: struct_start + offset,
                    })? as usize;
                    let name_off = be_u32(structure, offset + 4).ok_or(FdtError::Truncated {
                        offset: struct_start + offset + 4,
                    })? as usize;
                    offset += 8;
                    let value = structure
                        .get(offset..offset + len)
                        .ok_or(FdtError::Truncated {
                            offset: struct_start + offset + len,
                        })?
                        .to_vec();
                    offset = align4(offset + len);
                    let name = c_string(strings, name_off).map_err(|_| FdtError::BadString {
                        offset: strings_start + name_off,
                    })?;
                    let node = *stack.last().ok_or(FdtError::Unbalanced)?;
                    tree.set_property(node, name, value)?;
                }
                FDT_NOP => {}
                FDT_END => {
                    if !stack.is_empty() || !root_seen {
                        return Err(FdtError::Unbalanced);
                    }
                    break;
                }
                other => {
                    return Err(FdtError::BadToken {
                        token: other,
                        offset: struct_start + token_offset,
                    })
                }
            }
        }

        debug!(
            nodes = tree.node_count(),
            version = header.version,
            "decoded device tree blob"
        );
        Ok(tree)
    }

    /// Encode the tree as a version 17 blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut structure = Vec::new();
        let mut strings = Vec::new();
        let mut string_offsets: HashMap<&str, u32> = HashMap::new();

        self.encode_node(NodeId::ROOT, &mut structure, &mut strings, &mut string_offsets);
        structure.extend_from_slice(&FDT_END.to_be_bytes());

        let off_mem_rsvmap = HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + RSVMAP_TERMINATOR_SIZE;
        let off_dt_strings = off_dt_struct + structure.len();
        let totalsize = off_dt_strings + strings.len();

        let mut blob = Vec::with_capacity(totalsize);
        for field in [
            FDT_MAGIC,
            totalsize as u32,
            off_dt_struct as u32,
            off_dt_strings as u32,
            off_mem_rsvmap as u32,
            CURRENT_VERSION,
            LAST_COMPATIBLE_VERSION,
            self.boot_cpuid_phys(),
            strings.len() as u32,
            structure.len() as u32,
        ] {
            blob.extend_from_slice(&field.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; RSVMAP_TERMINATOR_SIZE]);
        blob.extend_from_slice(&structure);
        blob.extend_from_slice(&strings);
        blob
    }

    fn encode_node<'a>(
        &'a self,
        id: NodeId,
        structure: &mut Vec<u8>,
        strings: &mut Vec<u8>,
        string_offsets: &mut HashMap<&'a str, u32>,
    ) {
        let Some(node) = self.node(id) else {
            return;
        };

        structure.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        structure.extend_from_slice(node.name().as_bytes());
        structure.push(0);
        pad4(structure);

        for prop in node.properties() {
            let name_off = *string_offsets.entry(prop.name.as_str()).or_insert_with(|| {
                let off = strings.len() as u32;
                strings.extend_from_slice(prop.name.as_bytes());
                strings.push(0);
                off
            });
            structure.extend_from_slice(&FDT_PROP.to_be_bytes());
            structure.extend_from_slice(&(prop.value.len() as u32).to_be_bytes());
            structure.extend_from_slice(&name_off.to_be_bytes());
            structure.extend_from_slice(&prop.value);
            pad4(structure);
        }

        for &child in node.children() {
            self.encode_node(child, structure, strings, string_offsets);
        }
        structure.extend_from_slice(&FDT_END_NODE.to_be_bytes());
    }
}

fn pad4(buf: &mut Vec<u8>) {
    buf.resize(align4(buf.len()), 0);
}
