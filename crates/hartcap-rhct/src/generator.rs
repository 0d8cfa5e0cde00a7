//! RHCT construction.

use hartcap_cm::{
    fetch_optional, fetch_records, fetch_single, CacheBlockRecord, ConfigStore, HartRecord,
    IsaStringRecord, ObjectKind, TimerRecord,
};
use tracing::{debug, info};

use crate::acpi::{finalize_checksum, AcpiTableInfo, HeaderStamper, OemHeaderStamper};
use crate::error::{Result, RhctError};
use crate::indexer::{NodeIndexer, NodeSource};
use crate::layout::*;

/// A generated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhctTable {
    bytes: Vec<u8>,
}

impl RhctTable {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builds RHCTs from configuration records.
///
/// The generator keeps the node indexer of its last successful build until
/// [`free_table_resources`](Self::free_table_resources) is called or the next
/// build starts.
#[derive(Debug, Default)]
pub struct RhctGenerator<H = OemHeaderStamper> {
    stamper: H,
    indexer: Option<NodeIndexer>,
}

impl RhctGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Records a build consumes, fetched up front.
struct Inputs<'a> {
    timer: &'a TimerRecord,
    isa: Option<&'a IsaStringRecord>,
    cmo: Vec<&'a CacheBlockRecord>,
    harts: Vec<&'a HartRecord>,
}

impl<H: HeaderStamper> RhctGenerator<H> {
    pub fn with_stamper(stamper: H) -> Self {
        Self {
            stamper,
            indexer: None,
        }
    }

    /// Node offsets of the last successful build.
    pub fn node_indexer(&self) -> Option<&NodeIndexer> {
        self.indexer.as_ref()
    }

    /// Build the table. On failure nothing is retained.
    pub fn build_table<S>(&mut self, info: &AcpiTableInfo, store: &S) -> Result<RhctTable>
    where
        S: ConfigStore + ?Sized,
    {
        self.indexer = None;

        if !(MIN_TABLE_REVISION..=MAX_TABLE_REVISION).contains(&info.revision) {
            return Err(RhctError::UnsupportedRevision {
                requested: info.revision,
                min: MIN_TABLE_REVISION,
                max: MAX_TABLE_REVISION,
            });
        }

        let inputs = fetch_inputs(store)?;
        let (indexer, hart_offsets, table_size) = plan_layout(&inputs)?;
        let bytes = self.write_table(info, &inputs, &indexer, &hart_offsets, table_size)?;

        info!(
            nodes = indexer.len(),
            harts = inputs.harts.len(),
            size = bytes.len(),
            "built RHCT"
        );
        self.indexer = Some(indexer);
        Ok(RhctTable { bytes })
    }

    /// Release a table and the indexer built with it.
    pub fn free_table_resources(&mut self, table: RhctTable) {
        self.indexer = None;
        drop(table);
    }

    fn write_table(
        &self,
        info: &AcpiTableInfo,
        inputs: &Inputs<'_>,
        indexer: &NodeIndexer,
        hart_offsets: &[u32],
        table_size: u32,
    ) -> Result<Vec<u8>> {
        let size = table_size as usize;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| RhctError::OutOfResources {
                what: "RHCT",
                count: size,
            })?;

        let mut header = [0u8; SDT_HEADER_SIZE];
        self.stamper
            .stamp(&mut header, RHCT_SIGNATURE, table_size, info)?;
        bytes.extend_from_slice(&header);

        let flags = if inputs.timer.timer_cannot_wake_cpu {
            FLAG_TIMER_CANNOT_WAKE_CPU
        } else {
            0
        };
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&inputs.timer.timebase_frequency.to_le_bytes());
        bytes.extend_from_slice(&(indexer.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(RHCT_HEADER_SIZE as u32).to_le_bytes());

        let mut entries = indexer.entries().iter();
        if let Some(isa) = inputs.isa {
            check_offset(entries.next().map(|e| e.offset), bytes.len())?;
            write_isa_string_node(&mut bytes, &isa.isa);
        }
        for cmo in &inputs.cmo {
            check_offset(entries.next().map(|e| e.offset), bytes.len())?;
            write_cmo_node(&mut bytes, cmo);
        }
        for hart in &inputs.harts {
            check_offset(entries.next().map(|e| e.offset), bytes.len())?;
            write_hart_info_node(&mut bytes, hart.acpi_processor_uid, hart_offsets);
        }

        if bytes.len() != size {
            return Err(RhctError::LayoutMismatch {
                offset: table_size,
                actual: bytes.len(),
            });
        }
        finalize_checksum(&mut bytes);
        Ok(bytes)
    }
}

fn fetch_inputs<S>(store: &S) -> Result<Inputs<'_>>
where
    S: ConfigStore + ?Sized,
{
    let timer = fetch_single::<TimerRecord, S>(store)?;
    let isa = fetch_optional::<IsaStringRecord, S>(store)?;
    let cmo = fetch_records::<CacheBlockRecord, S>(store);
    let harts = fetch_records::<HartRecord, S>(store);
    if harts.is_empty() {
        return Err(RhctError::MissingRecords {
            kind: ObjectKind::Rintc,
        });
    }
    Ok(Inputs {
        timer,
        isa,
        cmo,
        harts,
    })
}

/// Compute every node offset and the total table size.
///
/// Returns the indexer, the offsets each hart info node references, and the
/// table size.
fn plan_layout(inputs: &Inputs<'_>) -> Result<(NodeIndexer, Vec<u32>, u32)> {
    let node_count = usize::from(inputs.isa.is_some()) + inputs.cmo.len() + inputs.harts.len();
    let mut indexer = NodeIndexer::with_capacity(node_count)?;
    let mut hart_offsets = Vec::new();
    let mut size = RHCT_HEADER_SIZE as u64;

    if let Some(isa) = inputs.isa {
        let length = isa_string_node_size(&isa.isa);
        if length > usize::from(u16::MAX) {
            return Err(RhctError::NodeTooLarge {
                node: "ISA string",
                length,
            });
        }
        let offset = table_offset(size)?;
        indexer.push(NodeSource::IsaString, offset);
        hart_offsets.push(offset);
        debug!(offset, length, "ISA string node");
        size += length as u64;
    }

    for (i, _) in inputs.cmo.iter().enumerate() {
        let offset = table_offset(size)?;
        indexer.push(NodeSource::Cmo(i), offset);
        if i == 0 {
            hart_offsets.push(offset);
        }
        debug!(offset, index = i, "CMO node");
        size += CMO_NODE_SIZE as u64;
    }

    let hart_size = hart_info_node_size(hart_offsets.len()) as u64;
    for (index, hart) in inputs.harts.iter().enumerate() {
        let offset = table_offset(size)?;
        indexer.push(
            NodeSource::HartInfo {
                index,
                acpi_processor_uid: hart.acpi_processor_uid,
            },
            offset,
        );
        debug!(offset, uid = hart.acpi_processor_uid, "hart info node");
        size += hart_size;
    }

    let size = table_offset(size)?;
    Ok((indexer, hart_offsets, size))
}

fn table_offset(size: u64) -> Result<u32> {
    u32::try_from(size).map_err(|_| RhctError::TableTooLarge { size })
}

fn check_offset(planned: Option<u32>, actual: usize) -> Result<()> {
    match planned {
        Some(offset) if offset as usize == actual => Ok(()),
        Some(offset) => Err(RhctError::LayoutMismatch { offset, actual }),
        None => Err(RhctError::LayoutMismatch { offset: 0, actual }),
    }
}

fn write_node_header(bytes: &mut Vec<u8>, node_type: u16, length: usize, revision: u16) {
    bytes.extend_from_slice(&node_type.to_le_bytes());
    bytes.extend_from_slice(&(length as u16).to_le_bytes());
    bytes.extend_from_slice(&revision.to_le_bytes());
}

fn write_isa_string_node(bytes: &mut Vec<u8>, isa: &str) {
    let length = isa_string_node_size(isa);
    let start = bytes.len();
    write_node_header(bytes, NODE_TYPE_ISA_STRING, length, ISA_STRING_NODE_REVISION);
    // Includes the NUL terminator.
    bytes.extend_from_slice(&((isa.len() + 1) as u16).to_le_bytes());
    bytes.extend_from_slice(isa.as_bytes());
    bytes.resize(start + length, 0);
}

fn write_cmo_node(bytes: &mut Vec<u8>, cmo: &CacheBlockRecord) {
    write_node_header(bytes, NODE_TYPE_CMO, CMO_NODE_SIZE, CMO_NODE_REVISION);
    bytes.push(0);
    bytes.push(cmo.cbom_block_size);
    bytes.push(cmo.cbop_block_size);
    bytes.push(cmo.cboz_block_size);
}

fn write_hart_info_node(bytes: &mut Vec<u8>, acpi_processor_uid: u32, offsets: &[u32]) {
    let length = hart_info_node_size(offsets.len());
    write_node_header(bytes, NODE_TYPE_HART_INFO, length, HART_INFO_NODE_REVISION);
    bytes.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&acpi_processor_uid.to_le_bytes());
    for offset in offsets {
        bytes.extend_from_slice(&offset.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acpi::byte_sum;
    use hartcap_cm::{CmObject, ConfigRepository, ErrorKind};

    fn store(isa: Option<&str>, cmo: usize, harts: u32) -> ConfigRepository {
        let mut store = ConfigRepository::new();
        let mut objects = vec![CmObject::Timer(TimerRecord {
            timebase_frequency: 10_000_000,
            timer_cannot_wake_cpu: false,
        })];
        if let Some(isa) = isa {
            objects.push(IsaStringRecord { isa: isa.into() }.into());
        }
        for _ in 0..cmo {
            objects.push(CacheBlockRecord::from_bytes(64, 64, 64).unwrap().into());
        }
        for uid in 0..harts {
            objects.push(HartRecord::new(u64::from(uid), uid).into());
        }
        store.publish(objects).unwrap();
        store
    }

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn minimal_table() {
        let mut generator = RhctGenerator::new();
        let table = generator
            .build_table(&AcpiTableInfo::default(), &store(None, 0, 1))
            .unwrap();
        let bytes = table.as_bytes();
        assert_eq!(bytes.len(), 56 + 12);
        assert_eq!(&bytes[0..4], b"RHCT");
        assert_eq!(u32_at(bytes, 4), 68);
        assert_eq!(byte_sum(bytes), 0);
        assert_eq!(u32_at(bytes, 36), 0);
        assert_eq!(
            u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
            10_000_000
        );
        assert_eq!(u32_at(bytes, 48), 1);
        assert_eq!(u32_at(bytes, 52), 56);
        assert_eq!(u16_at(bytes, 56), NODE_TYPE_HART_INFO);
        assert_eq!(u16_at(bytes, 58), 12);
        assert_eq!(u16_at(bytes, 62), 0);
    }

    #[test]
    fn isa_and_cmo_nodes_are_referenced() {
        let mut generator = RhctGenerator::new();
        let table = generator
            .build_table(&AcpiTableInfo::default(), &store(Some("rv64gc"), 2, 2))
            .unwrap();
        let bytes = table.as_bytes();

        // ISA node at 56 (16 bytes), CMO nodes at 72 and 82, harts at 92 and 112.
        let indexer = generator.node_indexer().unwrap();
        let offsets: Vec<u32> = indexer.entries().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![56, 72, 82, 92, 112]);
        assert_eq!(bytes.len(), 132);

        assert_eq!(u16_at(bytes, 56), NODE_TYPE_ISA_STRING);
        assert_eq!(u16_at(bytes, 58), 16);
        assert_eq!(u16_at(bytes, 62), 7);
        assert_eq!(&bytes[64..71], b"rv64gc\0");

        assert_eq!(u16_at(bytes, 72), NODE_TYPE_CMO);
        assert_eq!(&bytes[78..82], &[0, 6, 6, 6]);

        assert_eq!(u16_at(bytes, 112 + 6), 2);
        assert_eq!(u32_at(bytes, 112 + 8), 1);
        assert_eq!(u32_at(bytes, 112 + 12), 56);
        assert_eq!(u32_at(bytes, 112 + 16), 72);
    }

    #[test]
    fn timer_flag() {
        let mut repo = ConfigRepository::new();
        repo.publish(vec![
            CmObject::Timer(TimerRecord {
                timebase_frequency: 1,
                timer_cannot_wake_cpu: true,
            }),
            HartRecord::new(0, 0).into(),
        ])
        .unwrap();
        let table = RhctGenerator::new()
            .build_table(&AcpiTableInfo::default(), &repo)
            .unwrap();
        assert_eq!(u32_at(table.as_bytes(), 36), FLAG_TIMER_CANNOT_WAKE_CPU);
    }

    #[test]
    fn missing_inputs() {
        let mut generator = RhctGenerator::new();
        let no_harts = store(None, 0, 0);
        let err = generator
            .build_table(&AcpiTableInfo::default(), &no_harts)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut no_timer = ConfigRepository::new();
        no_timer.publish(vec![HartRecord::new(0, 0).into()]).unwrap();
        let err = generator
            .build_table(&AcpiTableInfo::default(), &no_timer)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(generator.node_indexer().is_none());
    }

    #[test]
    fn two_isa_strings_are_invalid() {
        let mut repo = store(Some("rv64gc"), 0, 1);
        repo.publish(vec![IsaStringRecord { isa: "rv32i".into() }.into()])
            .unwrap();
        let err = RhctGenerator::new()
            .build_table(&AcpiTableInfo::default(), &repo)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn unsupported_revision() {
        let info = AcpiTableInfo {
            revision: 2,
            ..AcpiTableInfo::default()
        };
        let err = RhctGenerator::new()
            .build_table(&info, &store(None, 0, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            RhctError::UnsupportedRevision { requested: 2, .. }
        ));
    }

    #[test]
    fn oversized_isa_node_fails_and_retains_nothing() {
        let mut generator = RhctGenerator::new();
        generator
            .build_table(&AcpiTableInfo::default(), &store(Some("rv64gc"), 0, 1))
            .unwrap();
        assert!(generator.node_indexer().is_some());

        let isa = "a".repeat(65527);
        let err = generator
            .build_table(&AcpiTableInfo::default(), &store(Some(&isa), 0, 1))
            .unwrap_err();
        assert!(matches!(err, RhctError::NodeTooLarge { length: 65536, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert!(generator.node_indexer().is_none());
    }

    #[test]
    fn free_releases_indexer() {
        let mut generator = RhctGenerator::new();
        let table = generator
            .build_table(&AcpiTableInfo::default(), &store(None, 1, 3))
            .unwrap();
        assert_eq!(generator.node_indexer().unwrap().len(), 4);
        generator.free_table_resources(table);
        assert!(generator.node_indexer().is_none());
    }

    struct FixedOem;

    impl HeaderStamper for FixedOem {
        fn stamp(
            &self,
            header: &mut [u8; SDT_HEADER_SIZE],
            signature: [u8; 4],
            length: u32,
            info: &AcpiTableInfo,
        ) -> Result<()> {
            OemHeaderStamper.stamp(header, signature, length, info)?;
            header[10..16].copy_from_slice(b"FIXED ");
            Ok(())
        }
    }

    #[test]
    fn custom_stamper_is_used_and_checksum_still_holds() {
        let mut generator = RhctGenerator::with_stamper(FixedOem);
        let table = generator
            .build_table(&AcpiTableInfo::default(), &store(None, 0, 1))
            .unwrap();
        assert_eq!(&table.as_bytes()[10..16], b"FIXED ");
        assert_eq!(byte_sum(table.as_bytes()), 0);
    }
}
