//! S-level IMSIC (incoming message-signaled interrupt controller) discovery.
//!
//! An IMSIC node describes one interrupt file per hart, laid out as
//! consecutive 4 KiB pages across one or more `reg` regions. The
//! `interrupts-extended` list names the per-hart controllers in the same
//! order as the pages.

use hartcap_cm::{MsgReceiverRecord, RECORD_VERSION};
use hartcap_fdt::{NodeId, TreeReader};
use tracing::{debug, info};

use crate::error::Result;
use crate::hart_table::ImsicView;
use crate::props::{interrupt_pairs, malformed, missing, optional_u32};
use crate::topology::hart_id_of_controller;
use crate::IRQ_S_EXT;

pub const IMSIC_COMPATIBLE: &str = "riscv,imsics";
pub const IMSIC_MMIO_PAGE_SHIFT: u32 = 12;
pub const IMSIC_MMIO_PAGE_SZ: u64 = 1 << IMSIC_MMIO_PAGE_SHIFT;

/// The resolved S-level receiver and the node it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgReceiver {
    pub node: NodeId,
    pub record: MsgReceiverRecord,
}

/// Find the S-level IMSIC and assign every hart its interrupt-file page.
///
/// M-level instances are skipped. Returns `Ok(None)` when no S-level IMSIC
/// exists; once one is found, any problem with it is an error.
pub fn resolve_msg_receiver<T>(tree: &T, harts: &mut ImsicView<'_>) -> Result<Option<MsgReceiver>>
where
    T: TreeReader + ?Sized,
{
    let mut cursor = None;
    while let Some(node) = tree.find_next_node_by_compatible(cursor, IMSIC_COMPATIBLE) {
        cursor = Some(node);

        let pairs = interrupt_pairs(tree, node)?
            .filter(|pairs| !pairs.is_empty())
            .ok_or_else(|| malformed(tree, node, "interrupts-extended"))?;
        if pairs[0].level != IRQ_S_EXT {
            debug!(node = %tree.path(node), "skipping M-level IMSIC");
            continue;
        }

        let record = read_sizing(tree, node, pairs.len())?;
        let regions = tree
            .reg_regions(node)
            .ok_or_else(|| malformed(tree, node, "reg"))?;

        let mut handles = pairs.iter();
        'regions: for region in &regions {
            let pages = region.size / IMSIC_MMIO_PAGE_SZ;
            for page in 0..pages {
                let Some(pair) = handles.next() else {
                    break 'regions;
                };
                let hart_id = hart_id_of_controller(tree, node, pair.phandle)?;
                let base = region.address + page * IMSIC_MMIO_PAGE_SZ;
                harts.set_interrupt_file(hart_id, base, IMSIC_MMIO_PAGE_SZ as u32)?;
            }
        }

        info!(
            node = %tree.path(node),
            num_ids = record.num_ids,
            hart_index_bits = record.hart_index_bits,
            "resolved S-level IMSIC"
        );
        return Ok(Some(MsgReceiver { node, record }));
    }
    Ok(None)
}

fn read_sizing<T>(tree: &T, node: NodeId, handle_count: usize) -> Result<MsgReceiverRecord>
where
    T: TreeReader + ?Sized,
{
    let num_ids = optional_u32(tree, node, "riscv,num-ids")?
        .ok_or_else(|| missing(tree, node, "riscv,num-ids"))?;
    let hart_index_bits = match optional_u32(tree, node, "riscv,hart-index-bits")? {
        Some(bits) if bits != 0 => bits,
        _ => hart_index_bits_for(handle_count),
    };
    Ok(MsgReceiverRecord {
        version: RECORD_VERSION,
        flags: 0,
        num_ids,
        num_guest_ids: optional_u32(tree, node, "riscv,num-guest-ids")?.unwrap_or(num_ids),
        guest_index_bits: optional_u32(tree, node, "riscv,guest-index-bits")?.unwrap_or(0),
        hart_index_bits,
        group_index_bits: optional_u32(tree, node, "riscv,group-index-bits")?.unwrap_or(0),
        group_index_shift: optional_u32(tree, node, "riscv,group-index-shift")?
            .unwrap_or(2 * IMSIC_MMIO_PAGE_SHIFT),
    })
}

/// Smallest bit width that can index `count` harts: `ceil(log2(count))`.
pub fn hart_index_bits_for(count: usize) -> u32 {
    match count {
        0 | 1 => 0,
        n => usize::BITS - (n - 1).leading_zeros(),
    }
}
