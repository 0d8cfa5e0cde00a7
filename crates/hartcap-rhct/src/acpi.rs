//! ACPI description header stamping and checksums.

use hartcap_cm::TableIdentity;

use crate::error::Result;
use crate::layout::{CHECKSUM_OFFSET, SDT_HEADER_SIZE};

/// Identity and revision of the table being generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcpiTableInfo {
    /// Requested table revision.
    pub revision: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

impl Default for AcpiTableInfo {
    fn default() -> Self {
        Self::from(&TableIdentity::default())
    }
}

impl From<&TableIdentity> for AcpiTableInfo {
    fn from(identity: &TableIdentity) -> Self {
        Self {
            revision: identity.revision,
            oem_id: identity.oem_id_bytes(),
            oem_table_id: identity.oem_table_id_bytes(),
            oem_revision: identity.oem_revision,
            creator_id: identity.creator_id_bytes(),
            creator_revision: identity.creator_revision,
        }
    }
}

/// Fills in the standard description header of a generated table.
///
/// The checksum byte is left at zero; the generator fixes it up once the
/// whole table is written.
pub trait HeaderStamper {
    fn stamp(
        &self,
        header: &mut [u8; SDT_HEADER_SIZE],
        signature: [u8; 4],
        length: u32,
        info: &AcpiTableInfo,
    ) -> Result<()>;
}

/// Stamps the header straight from [`AcpiTableInfo`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OemHeaderStamper;

impl HeaderStamper for OemHeaderStamper {
    fn stamp(
        &self,
        header: &mut [u8; SDT_HEADER_SIZE],
        signature: [u8; 4],
        length: u32,
        info: &AcpiTableInfo,
    ) -> Result<()> {
        header[0..4].copy_from_slice(&signature);
        header[4..8].copy_from_slice(&length.to_le_bytes());
        header[8] = info.revision;
        header[CHECKSUM_OFFSET] = 0;
        header[10..16].copy_from_slice(&info.oem_id);
        header[16..24].copy_from_slice(&info.oem_table_id);
        header[24..28].copy_from_slice(&info.oem_revision.to_le_bytes());
        header[28..32].copy_from_slice(&info.creator_id);
        header[32..36].copy_from_slice(&info.creator_revision.to_le_bytes());
        Ok(())
    }
}

/// Byte that makes `data` sum to zero when added.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// Recompute the header checksum of a complete table in place.
pub fn finalize_checksum(table: &mut [u8]) {
    if table.len() < SDT_HEADER_SIZE {
        return;
    }
    table[CHECKSUM_OFFSET] = 0;
    table[CHECKSUM_OFFSET] = checksum(table);
}

/// Wrapping byte sum; zero for a correctly checksummed table.
pub fn byte_sum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
