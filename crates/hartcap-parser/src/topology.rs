//! Hart discovery from the `/cpus` node.

use hartcap_cm::HartRecord;
use hartcap_fdt::reader::{cells, cells_to_u64};
use hartcap_fdt::{NodeId, TreeReader};
use tracing::{debug, info, warn};

use crate::error::{ParseError, Result};
use crate::hart_table::HartTable;

pub const CPU_NODE_NAME: &str = "cpu";
pub const CPU_COMPATIBLE: &str = "riscv";
pub const CPU_INTC_COMPATIBLE: &str = "riscv,cpu-intc";

/// Direct children of `cpus` whose unit name is `cpu`, in tree order.
pub fn cpu_nodes<T>(tree: &T, cpus: NodeId) -> Vec<NodeId>
where
    T: TreeReader + ?Sized,
{
    tree.children(cpus)
        .iter()
        .copied()
        .filter(|&child| {
            tree.node_name(child)
                .map(|name| name.split('@').next() == Some(CPU_NODE_NAME))
                .unwrap_or(false)
        })
        .collect()
}

/// Build one hart record per cpu node under `cpus`.
///
/// Processor UIDs are assigned in discovery order starting at 0. Every record
/// starts enabled with no controller wiring.
pub fn resolve_harts<T>(tree: &T, cpus: NodeId) -> Result<HartTable>
where
    T: TreeReader + ?Sized,
{
    let cpu_list = cpu_nodes(tree, cpus);
    if cpu_list.is_empty() {
        return Err(ParseError::NoCpus {
            cpus: tree.path(cpus),
        });
    }

    let mut table = HartTable::with_capacity(cpu_list.len())?;
    for (uid, &cpu) in cpu_list.iter().enumerate() {
        if !tree.is_compatible(cpu, CPU_COMPATIBLE) {
            return Err(ParseError::UnsupportedCpu {
                node: tree.path(cpu),
            });
        }
        let hart_id = read_hart_id(tree, cpu)?;
        if !has_interrupt_controller(tree, cpu) {
            warn!(cpu = %tree.path(cpu), "cpu node has no interrupt-controller child");
        }
        let uid = u32::try_from(uid).map_err(|_| ParseError::OutOfResources {
            what: "processor uids",
            count: cpu_list.len(),
        })?;
        table.push(HartRecord::new(hart_id, uid))?;
        debug!(hart_id, uid, "discovered hart");
    }

    info!(harts = table.len(), "resolved cpu topology");
    Ok(table)
}

/// Hart id from a cpu node's `reg`, sized by its parent's `#address-cells`.
pub fn read_hart_id<T>(tree: &T, cpu: NodeId) -> Result<u64>
where
    T: TreeReader + ?Sized,
{
    let cpus = tree.parent(cpu).ok_or_else(|| ParseError::OrphanController {
        node: tree.path(cpu),
    })?;
    let address_cells = tree.address_cells(cpus);
    if !(1..=2).contains(&address_cells) {
        return Err(ParseError::BadAddressCells {
            node: tree.path(cpus),
            cells: address_cells,
        });
    }

    let reg = tree
        .property(cpu, "reg")
        .and_then(cells)
        .filter(|reg| reg.len() >= address_cells as usize)
        .ok_or_else(|| ParseError::BadHartReg {
            node: tree.path(cpu),
            cells: address_cells,
        })?;
    cells_to_u64(&reg[..address_cells as usize]).ok_or_else(|| ParseError::BadHartReg {
        node: tree.path(cpu),
        cells: address_cells,
    })
}

/// Hart id behind a per-hart interrupt controller phandle: the controller
/// node's parent is the cpu.
pub fn hart_id_of_controller<T>(tree: &T, referrer: NodeId, phandle: u32) -> Result<u64>
where
    T: TreeReader + ?Sized,
{
    let intc = tree
        .resolve_phandle(phandle)
        .ok_or_else(|| ParseError::DanglingPhandle {
            node: tree.path(referrer),
            phandle,
        })?;
    let cpu = tree
        .parent(intc)
        .filter(|&cpu| cpu != tree.root())
        .ok_or_else(|| ParseError::OrphanController {
            node: tree.path(intc),
        })?;
    read_hart_id(tree, cpu)
}

fn has_interrupt_controller<T>(tree: &T, cpu: NodeId) -> bool
where
    T: TreeReader + ?Sized,
{
    tree.children(cpu).iter().any(|&child| {
        tree.property(child, "interrupt-controller").is_some()
            || tree.is_compatible(child, CPU_INTC_COMPATIBLE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hartcap_cm::ErrorKind;
    use hartcap_fdt::DeviceTree;

    fn cpus_with(address_cells: u32, hart_ids: &[u64]) -> (DeviceTree, NodeId) {
        let mut tree = DeviceTree::new();
        let cpus = tree.add_node(NodeId::ROOT, "cpus").unwrap();
        tree.set_u32(cpus, "#address-cells", address_cells).unwrap();
        tree.set_u32(cpus, "#size-cells", 0).unwrap();
        for &id in hart_ids {
            let cpu = tree.add_node(cpus, format!("cpu@{id:x}")).unwrap();
            tree.set_string(cpu, "compatible", "riscv").unwrap();
            if address_cells == 2 {
                tree.set_u64(cpu, "reg", id).unwrap();
            } else {
                tree.set_u32(cpu, "reg", id as u32).unwrap();
            }
            let intc = tree.add_node(cpu, "interrupt-controller").unwrap();
            tree.set_string(intc, "compatible", "riscv,cpu-intc").unwrap();
            tree.set_empty(intc, "interrupt-controller").unwrap();
        }
        (tree, cpus)
    }

    #[test]
    fn one_record_per_cpu_in_order() {
        let (tree, cpus) = cpus_with(1, &[0, 3, 1]);
        let table = resolve_harts(&tree, cpus).unwrap();
        let ids: Vec<(u64, u32)> = table
            .records()
            .iter()
            .map(|h| (h.hart_id, h.acpi_processor_uid))
            .collect();
        assert_eq!(ids, vec![(0, 0), (3, 1), (1, 2)]);
        assert!(table.records().iter().all(|h| h.is_enabled() && h.ext_intc_id == 0));
    }

    #[test]
    fn two_cell_hart_ids() {
        let (tree, cpus) = cpus_with(2, &[0x1_0000_0002]);
        let table = resolve_harts(&tree, cpus).unwrap();
        assert_eq!(table.records()[0].hart_id, 0x1_0000_0002);
    }

    #[test]
    fn non_cpu_children_are_ignored() {
        let (mut tree, cpus) = cpus_with(1, &[0]);
        tree.add_node(cpus, "cpu-map").unwrap();
        let table = resolve_harts(&tree, cpus).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn zero_cpus_is_not_found() {
        let (tree, cpus) = cpus_with(1, &[]);
        let err = resolve_harts(&tree, cpus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn non_riscv_cpu_is_unsupported() {
        let (mut tree, cpus) = cpus_with(1, &[0]);
        let cpu = tree.find_node("/cpus/cpu@0").unwrap();
        tree.set_string(cpu, "compatible", "arm,cortex-a53").unwrap();
        let err = resolve_harts(&tree, cpus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn bad_address_cells_abort() {
        let (tree, cpus) = cpus_with(3, &[0]);
        let err = resolve_harts(&tree, cpus).unwrap_err();
        assert!(matches!(err, ParseError::BadAddressCells { cells: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Aborted);
    }

    #[test]
    fn short_reg_aborts() {
        let (mut tree, cpus) = cpus_with(2, &[0]);
        let cpu = tree.find_node("/cpus/cpu@0").unwrap();
        tree.set_u32(cpu, "reg", 0).unwrap();
        let err = resolve_harts(&tree, cpus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aborted);
    }

    #[test]
    fn duplicate_hart_id_is_invalid() {
        let (mut tree, cpus) = cpus_with(1, &[0, 1]);
        let cpu = tree.find_node("/cpus/cpu@1").unwrap();
        tree.set_u32(cpu, "reg", 0).unwrap();
        let err = resolve_harts(&tree, cpus).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateHart { hart_id: 0 }));
    }

    #[test]
    fn missing_interrupt_controller_is_tolerated() {
        let mut tree = DeviceTree::new();
        let cpus = tree.add_node(NodeId::ROOT, "cpus").unwrap();
        tree.set_u32(cpus, "#address-cells", 1).unwrap();
        let cpu = tree.add_node(cpus, "cpu@0").unwrap();
        tree.set_string(cpu, "compatible", "riscv").unwrap();
        tree.set_u32(cpu, "reg", 0).unwrap();
        assert_eq!(resolve_harts(&tree, cpus).unwrap().len(), 1);
    }

    #[test]
    fn controller_phandle_leads_to_hart() {
        let (mut tree, _) = cpus_with(1, &[4]);
        let intc = tree.find_node("/cpus/cpu@4/interrupt-controller").unwrap();
        tree.set_phandle(intc, 7).unwrap();
        assert_eq!(hart_id_of_controller(&tree, NodeId::ROOT, 7).unwrap(), 4);
        let err = hart_id_of_controller(&tree, NodeId::ROOT, 8).unwrap_err();
        assert!(matches!(err, ParseError::DanglingPhandle { phandle: 8, .. }));
    }
}
