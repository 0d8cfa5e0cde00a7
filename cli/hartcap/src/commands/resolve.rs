//! `hartcap resolve`: show what the parsers derive from a device tree.

use std::path::Path;

use anyhow::{Context, Result};
use hartcap_cm::ConfigRepository;
use hartcap_fdt::TreeReader;
use hartcap_parser::{parse_riscv_intc, IntcResolution};

use super::load_tree;

pub fn run(dtb: &Path, json: bool) -> Result<()> {
    let tree = load_tree(dtb)?;
    let mut store = ConfigRepository::new();
    let resolution =
        parse_riscv_intc(&tree, &mut store).context("resolving interrupt topology")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print!("{}", render(&tree, &resolution));
    }
    Ok(())
}

/// Human-readable summary of a resolution.
fn render(tree: &impl TreeReader, resolution: &IntcResolution) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Harts ({}) ===\n", resolution.harts.len()));
    for hart in &resolution.harts {
        out.push_str(&format!(
            "  uid {:<4} hart {:<#6x} ext-intc {:#010x}",
            hart.acpi_processor_uid, hart.hart_id, hart.ext_intc_id
        ));
        if hart.imsic_size != 0 {
            out.push_str(&format!(
                "  imsic {:#x}+{:#x}",
                hart.imsic_base_address, hart.imsic_size
            ));
        }
        out.push('\n');
    }

    if let Some(imsic) = &resolution.imsic {
        out.push_str("\n=== IMSIC ===\n");
        out.push_str(&format!(
            "  ids {} guest-ids {} hart-index-bits {} group-index-bits {} group-index-shift {}\n",
            imsic.num_ids,
            imsic.num_guest_ids,
            imsic.hart_index_bits,
            imsic.group_index_bits,
            imsic.group_index_shift
        ));
    }

    if !resolution.banks.is_empty() {
        out.push_str(&format!(
            "\n=== Interrupt controller banks ({}) ===\n",
            resolution.banks.len()
        ));
        for bank in &resolution.banks {
            out.push_str(&format!(
                "  {} id {} {} sources {} gsi {}..{} at {:#x}+{:#x}\n",
                bank.family,
                bank.id,
                bank.hw_id_str(),
                bank.num_sources,
                bank.gsi_base,
                bank.gsi_base.saturating_add(bank.num_sources),
                bank.base_address,
                bank.size
            ));
        }
    }

    if !resolution.gsi.is_empty() {
        out.push_str("\n=== GSI bases ===\n");
        for (node, base) in resolution.gsi.iter() {
            out.push_str(&format!("  {:<32} {}\n", tree.path(node), base));
        }
    }
    out
}
