//! PLIC and APLIC bank discovery.
//!
//! Banks are numbered in pre-order discovery order. Each bank's id is the top
//! byte of the external interrupt controller ids it hands out, and its GSI
//! range follows the ranges of every bank found before it.

use hartcap_cm::{BankFamily, ControllerBankRecord};
use hartcap_fdt::{NodeId, TreeReader};
use tracing::{debug, info};

use crate::error::{ParseError, Result};
use crate::gsi::GsiRegistry;
use crate::hart_table::ExtIntcView;
use crate::props::{first_irq_level, interrupt_pairs, malformed, missing, optional_u32};
use crate::topology::hart_id_of_controller;
use crate::IRQ_S_EXT;

pub const PLIC_COMPATIBLE: &str = "riscv,plic0";
pub const APLIC_COMPATIBLE: &str = "riscv,aplic";

/// Banks found in the tree together with their GSI assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankResolution {
    pub banks: Vec<ControllerBankRecord>,
    pub gsi: GsiRegistry,
}

const MAX_BANK_ID: u32 = 0xff;
const MAX_CONTEXT: u32 = 0x00ff_ffff;

/// External interrupt controller id: bank id in the top byte, context below.
///
/// Fails rather than truncating when either part exceeds its field.
pub fn ext_intc_id(bank_id: u32, context: u32) -> Result<u32> {
    if bank_id > MAX_BANK_ID || context > MAX_CONTEXT {
        return Err(ParseError::ExtIntcIdOverflow { bank_id, context });
    }
    Ok((bank_id << 24) | context)
}

/// Classify a node as a bank of either family.
///
/// APLICs only count when they deliver to S-level, either directly through
/// their own `interrupts-extended` or as MSIs to an S-level IMSIC.
pub fn bank_family<T>(tree: &T, node: NodeId) -> Option<BankFamily>
where
    T: TreeReader + ?Sized,
{
    if tree.is_compatible(node, PLIC_COMPATIBLE) {
        return Some(BankFamily::Plic);
    }
    if !tree.is_compatible(node, APLIC_COMPATIBLE) {
        return None;
    }
    if first_irq_level(tree, node) == Some(IRQ_S_EXT) {
        return Some(BankFamily::Aplic);
    }
    let imsic = tree
        .property(node, "msi-parent")
        .and_then(|v| hartcap_fdt::reader::read_cell(v, 0))
        .and_then(|phandle| tree.resolve_phandle(phandle))?;
    (first_irq_level(tree, imsic) == Some(IRQ_S_EXT)).then_some(BankFamily::Aplic)
}

/// Walk the tree for PLIC/APLIC banks and wire every hart they serve.
///
/// No banks is not an error: the result is simply empty.
pub fn resolve_controller_banks<T>(tree: &T, harts: &mut ExtIntcView<'_>) -> Result<BankResolution>
where
    T: TreeReader + ?Sized,
{
    let mut resolution = BankResolution::default();
    let mut next_gsi: u32 = 0;

    for node in tree.nodes() {
        let Some(family) = bank_family(tree, node) else {
            continue;
        };
        let id = u32::try_from(resolution.banks.len()).map_err(|_| ParseError::OutOfResources {
            what: "controller banks",
            count: resolution.banks.len(),
        })?;

        let mut bank = ControllerBankRecord::new(family, id);
        bank.num_sources = match optional_u32(tree, node, "riscv,num-sources")? {
            Some(n) => n,
            None => optional_u32(tree, node, "riscv,ndev")?
                .ok_or_else(|| missing(tree, node, "riscv,num-sources"))?,
        };
        let region = tree
            .reg_regions(node)
            .and_then(|regions| regions.first().copied())
            .ok_or_else(|| malformed(tree, node, "reg"))?;
        bank.base_address = region.address;
        bank.size = u32::try_from(region.size).map_err(|_| malformed(tree, node, "reg"))?;

        bank.gsi_base = next_gsi;
        next_gsi = next_gsi
            .checked_add(bank.num_sources)
            .ok_or_else(|| malformed(tree, node, "riscv,num-sources"))?;
        resolution.gsi.register(node, bank.gsi_base)?;

        match family {
            BankFamily::Plic => wire_plic(tree, node, id, harts)?,
            BankFamily::Aplic => bank.num_idcs = wire_aplic(tree, node, id, harts)?,
        }

        debug!(
            node = %tree.path(node),
            %family,
            id,
            gsi_base = bank.gsi_base,
            num_sources = bank.num_sources,
            "resolved controller bank"
        );
        resolution
            .banks
            .try_reserve(1)
            .map_err(|_| ParseError::OutOfResources {
                what: "controller banks",
                count: resolution.banks.len() + 1,
            })?;
        resolution.banks.push(bank);
    }

    info!(
        banks = resolution.banks.len(),
        total_gsis = next_gsi,
        "resolved interrupt controller banks"
    );
    Ok(resolution)
}

/// PLIC contexts come in (M, S) pairs per hart; only S entries are wired.
fn wire_plic<T>(tree: &T, node: NodeId, id: u32, harts: &mut ExtIntcView<'_>) -> Result<()>
where
    T: TreeReader + ?Sized,
{
    let pairs = interrupt_pairs(tree, node)?
        .ok_or_else(|| missing(tree, node, "interrupts-extended"))?;
    if pairs.is_empty() {
        return Err(malformed(tree, node, "interrupts-extended"));
    }
    for (position, pair) in pairs.iter().enumerate() {
        if pair.level != IRQ_S_EXT {
            continue;
        }
        let local_hart = (position / 2) as u32;
        let hart_id = hart_id_of_controller(tree, node, pair.phandle)?;
        harts.set_ext_intc_id(hart_id, BankFamily::Plic, ext_intc_id(id, 2 * local_hart + 1)?)?;
    }
    Ok(())
}

/// Every APLIC entry is one IDC; returns the IDC count.
fn wire_aplic<T>(tree: &T, node: NodeId, id: u32, harts: &mut ExtIntcView<'_>) -> Result<u32>
where
    T: TreeReader + ?Sized,
{
    let Some(pairs) = interrupt_pairs(tree, node)? else {
        return Ok(0);
    };
    for (idc, pair) in pairs.iter().enumerate() {
        let hart_id = hart_id_of_controller(tree, node, pair.phandle)?;
        harts.set_ext_intc_id(hart_id, BankFamily::Aplic, ext_intc_id(id, idc as u32)?)?;
    }
    u32::try_from(pairs.len()).map_err(|_| malformed(tree, node, "interrupts-extended"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart_table::HartTable;
    use crate::topology::resolve_harts;
    use hartcap_cm::ErrorKind;
    use hartcap_fdt::DeviceTree;

    const IRQ_M_EXT: u32 = 11;

    /// Harts 0..n; hart `i`'s intc has phandle `i + 1`. `/soc` uses 2/2 cells.
    fn base_tree(n: u32) -> DeviceTree {
        let mut tree = DeviceTree::new();
        let cpus = tree.add_node(NodeId::ROOT, "cpus").unwrap();
        tree.set_u32(cpus, "#address-cells", 1).unwrap();
        tree.set_u32(cpus, "#size-cells", 0).unwrap();
        for id in 0..n {
            let cpu = tree.add_node(cpus, format!("cpu@{id}")).unwrap();
            tree.set_string(cpu, "compatible", "riscv").unwrap();
            tree.set_u32(cpu, "reg", id).unwrap();
            let intc = tree.add_node(cpu, "interrupt-controller").unwrap();
            tree.set_empty(intc, "interrupt-controller").unwrap();
            tree.set_phandle(intc, id + 1).unwrap();
        }
        let soc = tree.add_node(NodeId::ROOT, "soc").unwrap();
        tree.set_u32(soc, "#address-cells", 2).unwrap();
        tree.set_u32(soc, "#size-cells", 2).unwrap();
        tree
    }

    fn add_controller(
        tree: &mut DeviceTree,
        name: &str,
        compatible: &str,
        num_sources: u32,
        irqs: &[u32],
    ) -> NodeId {
        let soc = tree.find_node("/soc").unwrap();
        let node = tree.add_node(soc, name).unwrap();
        tree.set_string(node, "compatible", compatible).unwrap();
        tree.set_u32(node, "riscv,num-sources", num_sources).unwrap();
        tree.set_cells(node, "reg", &[0, 0x0c00_0000, 0, 0x0400_0000]).unwrap();
        if !irqs.is_empty() {
            tree.set_cells(node, "interrupts-extended", irqs).unwrap();
        }
        node
    }

    fn resolve(tree: &DeviceTree) -> Result<(HartTable, BankResolution)> {
        let mut table = resolve_harts(tree, tree.find_node("/cpus").unwrap())?;
        let banks = resolve_controller_banks(tree, &mut table.ext_intc_view())?;
        Ok((table, banks))
    }

    #[test]
    fn single_plic_single_hart() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "plic@c000000", "riscv,plic0", 8, &[1, IRQ_S_EXT]);
        let (table, res) = resolve(&tree).unwrap();
        assert_eq!(table.records()[0].ext_intc_id, 1);
        assert_eq!(res.banks.len(), 1);
        let bank = &res.banks[0];
        assert_eq!(bank.gsi_base, 0);
        assert_eq!(bank.num_sources, 8);
        assert_eq!(bank.family, BankFamily::Plic);
        assert_eq!(&bank.hw_id, b"RSCV0001");
        assert_eq!(bank.base_address, 0x0c00_0000);
        assert_eq!(bank.size, 0x0400_0000);
        assert_eq!(bank.num_idcs, 0);
    }

    #[test]
    fn plic_with_m_and_s_contexts() {
        let mut tree = base_tree(2);
        add_controller(
            &mut tree,
            "plic@c000000",
            "riscv,plic0",
            96,
            &[1, IRQ_M_EXT, 1, IRQ_S_EXT, 2, IRQ_M_EXT, 2, IRQ_S_EXT],
        );
        let (table, _) = resolve(&tree).unwrap();
        let ids: Vec<u32> = table.records().iter().map(|h| h.ext_intc_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn plic_without_interrupts_is_invalid() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "plic@c000000", "riscv,plic0", 8, &[]);
        let err = resolve(&tree).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn gsi_ranges_partition_in_discovery_order() {
        let mut tree = base_tree(2);
        let a = add_controller(&mut tree, "plic@c000000", "riscv,plic0", 32, &[1, IRQ_S_EXT]);
        let b = add_controller(&mut tree, "plic@d000000", "riscv,plic0", 64, &[2, IRQ_S_EXT]);
        let (table, res) = resolve(&tree).unwrap();

        let bases: Vec<(u32, u32)> = res.banks.iter().map(|b| (b.id, b.gsi_base)).collect();
        assert_eq!(bases, vec![(0, 0), (1, 32)]);
        assert_eq!(res.gsi.translate(a, 5), 5);
        assert_eq!(res.gsi.translate(b, 5), 37);
        assert_eq!(table.records()[1].ext_intc_id >> 24, 1);
    }

    #[test]
    fn ndev_is_accepted_for_source_count() {
        let mut tree = base_tree(1);
        let plic = add_controller(&mut tree, "plic@c000000", "riscv,plic0", 0, &[1, IRQ_S_EXT]);
        tree.set_property(plic, "riscv,num-sources", Vec::new()).unwrap();
        // An unreadable num-sources is malformed, not a fallback.
        assert_eq!(resolve(&tree).unwrap_err().kind(), ErrorKind::InvalidParameter);

        let mut tree = base_tree(1);
        let soc = tree.find_node("/soc").unwrap();
        let plic = tree.add_node(soc, "plic@c000000").unwrap();
        tree.set_string(plic, "compatible", "riscv,plic0").unwrap();
        tree.set_u32(plic, "riscv,ndev", 53).unwrap();
        tree.set_cells(plic, "reg", &[0, 0x0c00_0000, 0, 0x0400_0000]).unwrap();
        tree.set_cells(plic, "interrupts-extended", &[1, IRQ_S_EXT]).unwrap();
        let (_, res) = resolve(&tree).unwrap();
        assert_eq!(res.banks[0].num_sources, 53);
    }

    #[test]
    fn missing_source_count_is_invalid() {
        let mut tree = base_tree(1);
        let soc = tree.find_node("/soc").unwrap();
        let plic = tree.add_node(soc, "plic@c000000").unwrap();
        tree.set_string(plic, "compatible", "riscv,plic0").unwrap();
        tree.set_cells(plic, "reg", &[0, 0x0c00_0000, 0, 0x0400_0000]).unwrap();
        tree.set_cells(plic, "interrupts-extended", &[1, IRQ_S_EXT]).unwrap();
        let err = resolve(&tree).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingProperty {
                property: "riscv,num-sources",
                ..
            }
        ));
    }

    #[test]
    fn aplic_idcs_follow_list_order() {
        let mut tree = base_tree(2);
        add_controller(&mut tree, "aplic@d000000", "riscv,aplic", 96, &[2, IRQ_S_EXT, 1, IRQ_S_EXT]);
        let (table, res) = resolve(&tree).unwrap();
        assert_eq!(res.banks[0].num_idcs, 2);
        assert_eq!(&res.banks[0].hw_id, b"RSCV0002");
        assert_eq!(table.get(1).unwrap().ext_intc_id, 0);
        assert_eq!(table.get(0).unwrap().ext_intc_id, 1);
    }

    #[test]
    fn m_level_aplic_is_skipped() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "aplic@c000000", "riscv,aplic", 96, &[1, IRQ_M_EXT]);
        add_controller(&mut tree, "aplic@d000000", "riscv,aplic", 96, &[1, IRQ_S_EXT]);
        let (table, res) = resolve(&tree).unwrap();
        assert_eq!(res.banks.len(), 1);
        assert_eq!(res.banks[0].id, 0);
        assert_eq!(res.banks[0].gsi_base, 0);
        assert_eq!(table.records()[0].ext_intc_id, 0);
    }

    #[test]
    fn msi_aplic_is_found_through_its_imsic() {
        let mut tree = base_tree(1);
        let soc = tree.find_node("/soc").unwrap();
        let imsic = tree.add_node(soc, "imsics@28000000").unwrap();
        tree.set_string(imsic, "compatible", "riscv,imsics").unwrap();
        tree.set_cells(imsic, "interrupts-extended", &[1, IRQ_S_EXT]).unwrap();
        tree.set_phandle(imsic, 0x10).unwrap();
        let aplic = add_controller(&mut tree, "aplic@d000000", "riscv,aplic", 96, &[]);
        tree.set_u32(aplic, "msi-parent", 0x10).unwrap();

        assert_eq!(bank_family(&tree, aplic), Some(BankFamily::Aplic));
        let (table, res) = resolve(&tree).unwrap();
        assert_eq!(res.banks.len(), 1);
        assert_eq!(res.banks[0].num_idcs, 0);
        assert_eq!(table.records()[0].ext_intc_id, 0);
    }

    #[test]
    fn odd_aplic_list_is_invalid() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "aplic@d000000", "riscv,aplic", 96, &[1, IRQ_S_EXT, 1]);
        assert_eq!(resolve(&tree).unwrap_err().kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn families_cannot_share_a_hart() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "plic@c000000", "riscv,plic0", 32, &[1, IRQ_S_EXT]);
        add_controller(&mut tree, "aplic@d000000", "riscv,aplic", 32, &[1, IRQ_S_EXT]);
        assert_eq!(resolve(&tree).unwrap_err().kind(), ErrorKind::Aborted);
    }

    #[test]
    fn unresolvable_context_is_not_found() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "plic@c000000", "riscv,plic0", 32, &[9, IRQ_S_EXT]);
        assert_eq!(resolve(&tree).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn no_banks_is_empty() {
        let tree = base_tree(2);
        let (table, res) = resolve(&tree).unwrap();
        assert!(res.banks.is_empty());
        assert!(res.gsi.is_empty());
        assert!(table.records().iter().all(|h| h.ext_intc_id == 0));
    }

    #[test]
    fn ext_intc_id_layout() {
        assert_eq!(ext_intc_id(0, 1).unwrap(), 1);
        assert_eq!(ext_intc_id(2, 3).unwrap(), 0x0200_0003);
        assert_eq!(ext_intc_id(0xff, 0x00ff_ffff).unwrap(), u32::MAX);
        assert!(matches!(
            ext_intc_id(0x100, 1),
            Err(ParseError::ExtIntcIdOverflow { bank_id: 0x100, context: 1 })
        ));
        let err = ext_intc_id(0, 0x0100_0000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn bank_past_the_id_byte_is_rejected() {
        let mut tree = base_tree(1);
        for bank in 0..=256u32 {
            add_controller(
                &mut tree,
                &format!("plic@{:x}", 0x0c00_0000 + bank * 0x1000),
                "riscv,plic0",
                1,
                &[1, IRQ_M_EXT, 1, IRQ_S_EXT],
            );
        }
        let err = resolve(&tree).unwrap_err();
        assert!(matches!(
            err,
            ParseError::ExtIntcIdOverflow { bank_id: 256, context: 1 }
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn last_representable_bank_still_wires() {
        let mut tree = base_tree(1);
        for bank in 0..=255u32 {
            add_controller(
                &mut tree,
                &format!("plic@{:x}", 0x0c00_0000 + bank * 0x1000),
                "riscv,plic0",
                1,
                &[1, IRQ_M_EXT, 1, IRQ_S_EXT],
            );
        }
        let (table, res) = resolve(&tree).unwrap();
        assert_eq!(res.banks.len(), 256);
        assert_eq!(table.records()[0].ext_intc_id, 0xff00_0001);
    }

    #[test]
    fn reg_not_matching_parent_cells_is_invalid() {
        let mut tree = base_tree(1);
        let plic = add_controller(&mut tree, "plic@c000000", "riscv,plic0", 8, &[1, IRQ_S_EXT]);
        // `/soc` declares 2 address and 2 size cells; three cells is a partial entry.
        tree.set_cells(plic, "reg", &[0, 0x0c00_0000, 0x0400_0000]).unwrap();
        let err = resolve(&tree).unwrap_err();
        assert!(matches!(err, ParseError::MalformedProperty { property: "reg", .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn bank_size_beyond_u32_is_invalid() {
        let mut tree = base_tree(1);
        let plic = add_controller(&mut tree, "plic@c000000", "riscv,plic0", 8, &[1, IRQ_S_EXT]);
        tree.set_cells(plic, "reg", &[0, 0x0c00_0000, 1, 0]).unwrap();
        let err = resolve(&tree).unwrap_err();
        assert!(matches!(err, ParseError::MalformedProperty { property: "reg", .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn cumulative_gsi_overflow_is_invalid() {
        let mut tree = base_tree(1);
        add_controller(&mut tree, "plic@c000000", "riscv,plic0", u32::MAX, &[1, IRQ_S_EXT]);
        add_controller(&mut tree, "plic@d000000", "riscv,plic0", 1, &[1, IRQ_S_EXT]);
        let err = resolve(&tree).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedProperty {
                property: "riscv,num-sources",
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
