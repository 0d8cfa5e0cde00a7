//! Timer, ISA string and cache-block sizes read from the cpu nodes.

use hartcap_cm::records::block_size_log2;
use hartcap_cm::{CacheBlockRecord, IsaStringRecord, PlatformRecords, TimerRecord};
use hartcap_fdt::reader::{cells, cells_to_u64};
use hartcap_fdt::{NodeId, TreeReader};
use tracing::debug;

use crate::error::Result;
use crate::props::{malformed, optional_u32};
use crate::topology::cpu_nodes;

pub const TIMER_COMPATIBLE: &str = "riscv,timer";

const CMO_PROPERTIES: [&str; 3] = [
    "riscv,cbom-block-size",
    "riscv,cbop-block-size",
    "riscv,cboz-block-size",
];

/// Collect whatever platform records the tree describes.
///
/// Every field is optional here; the table generator decides what is
/// mandatory once platform overrides have been merged in.
pub fn discover_platform_records<T>(tree: &T, cpus: NodeId) -> Result<PlatformRecords>
where
    T: TreeReader + ?Sized,
{
    let mut records = PlatformRecords {
        timer: read_timer(tree, cpus)?,
        ..PlatformRecords::default()
    };

    if let Some(&cpu) = cpu_nodes(tree, cpus).first() {
        records.isa_string = read_isa(tree, cpu)?;
        if let Some(cmo) = read_cmo(tree, cpu)? {
            records.cmo.push(cmo);
        }
    }

    debug!(
        timer = records.timer.is_some(),
        isa = records.isa_string.is_some(),
        cmo = records.cmo.len(),
        "discovered cpu capabilities"
    );
    Ok(records)
}

fn read_timer<T>(tree: &T, cpus: NodeId) -> Result<Option<TimerRecord>>
where
    T: TreeReader + ?Sized,
{
    let Some(value) = tree.property(cpus, "timebase-frequency") else {
        return Ok(None);
    };
    let timebase_frequency = cells(value)
        .filter(|c| matches!(c.len(), 1 | 2))
        .and_then(|c| cells_to_u64(&c))
        .ok_or_else(|| malformed(tree, cpus, "timebase-frequency"))?;
    let timer_cannot_wake_cpu = tree
        .find_next_node_by_compatible(None, TIMER_COMPATIBLE)
        .map(|timer| tree.property(timer, "riscv,timer-cannot-wake-cpu").is_some())
        .unwrap_or(false);
    Ok(Some(TimerRecord {
        timebase_frequency,
        timer_cannot_wake_cpu,
    }))
}

fn read_isa<T>(tree: &T, cpu: NodeId) -> Result<Option<IsaStringRecord>>
where
    T: TreeReader + ?Sized,
{
    let Some(value) = tree.property(cpu, "riscv,isa") else {
        return Ok(None);
    };
    let text = value.strip_suffix(&[0]).unwrap_or(value);
    let isa = std::str::from_utf8(text)
        .ok()
        .filter(|s| !s.is_empty() && !s.contains('\0'))
        .ok_or_else(|| malformed(tree, cpu, "riscv,isa"))?;
    Ok(Some(IsaStringRecord { isa: isa.into() }))
}

fn read_cmo<T>(tree: &T, cpu: NodeId) -> Result<Option<CacheBlockRecord>>
where
    T: TreeReader + ?Sized,
{
    let mut sizes = [0u8; 3];
    let mut present = false;
    for (size, property) in sizes.iter_mut().zip(CMO_PROPERTIES) {
        if let Some(bytes) = optional_u32(tree, cpu, property)? {
            *size = block_size_log2(u64::from(bytes)).ok_or_else(|| malformed(tree, cpu, property))?;
            present = true;
        }
    }
    if !present {
        return Ok(None);
    }
    let [cbom_block_size, cbop_block_size, cboz_block_size] = sizes;
    Ok(Some(CacheBlockRecord {
        cbom_block_size,
        cbop_block_size,
        cboz_block_size,
    }))
}
