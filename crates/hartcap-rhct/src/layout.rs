//! RHCT structure sizes, node types and revisions (ACPI 6.6, section 5.2.37).

pub const RHCT_SIGNATURE: [u8; 4] = *b"RHCT";

/// Table revisions this generator can emit.
pub const MIN_TABLE_REVISION: u8 = 1;
pub const MAX_TABLE_REVISION: u8 = 1;

/// Standard ACPI description header.
pub const SDT_HEADER_SIZE: usize = 36;

/// SDT header + flags (4) + time base frequency (8) + node count (4) +
/// node offset (4) = 56 bytes
pub const RHCT_HEADER_SIZE: usize = SDT_HEADER_SIZE + 20;

/// Offset of the checksum byte inside the SDT header.
pub const CHECKSUM_OFFSET: usize = 9;

pub const FLAG_TIMER_CANNOT_WAKE_CPU: u32 = 1 << 0;

/// type (2) + length (2) + revision (2)
pub const NODE_HEADER_SIZE: usize = 6;

pub const NODE_TYPE_ISA_STRING: u16 = 0;
pub const NODE_TYPE_CMO: u16 = 1;
pub const NODE_TYPE_MMU: u16 = 2;
pub const NODE_TYPE_HART_INFO: u16 = 0xFFFF;

pub const ISA_STRING_NODE_REVISION: u16 = 1;
pub const CMO_NODE_REVISION: u16 = 1;
pub const HART_INFO_NODE_REVISION: u16 = 1;

/// Node header + ISA length (2).
pub const ISA_STRING_NODE_FIXED_SIZE: usize = NODE_HEADER_SIZE + 2;

/// Node header + reserved (1) + cbom/cbop/cboz sizes (3).
pub const CMO_NODE_SIZE: usize = NODE_HEADER_SIZE + 4;

/// Node header + number of offsets (2) + ACPI processor UID (4).
pub const HART_INFO_NODE_FIXED_SIZE: usize = NODE_HEADER_SIZE + 6;

/// Length of an ISA string node: the string plus its NUL terminator, padded
/// to a 2-byte boundary.
pub fn isa_string_node_size(isa: &str) -> usize {
    ISA_STRING_NODE_FIXED_SIZE + align2(isa.len() + 1)
}

pub fn hart_info_node_size(num_offsets: usize) -> usize {
    HART_INFO_NODE_FIXED_SIZE + 4 * num_offsets
}

pub fn align2(n: usize) -> usize {
    (n + 1) & !1
}
