//! `hartcap inspect`: decode an RHCT and print it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use hartcap_rhct::{NodeBody, RhctView};

pub fn run(table: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(table).with_context(|| format!("reading {}", table.display()))?;
    let view = RhctView::parse(&bytes).with_context(|| format!("decoding {}", table.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render(&view));
    }
    Ok(())
}

fn render(view: &RhctView) -> String {
    let h = &view.header;
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} (revision {}, {} bytes) ===\n",
        h.signature, h.revision, h.length
    ));
    out.push_str(&format!(
        "  OEM:      '{}' '{}' rev {}\n",
        h.oem_id, h.oem_table_id, h.oem_revision
    ));
    out.push_str(&format!(
        "  Creator:  '{}' rev {}\n",
        h.creator_id, h.creator_revision
    ));
    out.push_str(&format!("  Timebase: {} Hz\n", view.timebase_frequency));
    out.push_str(&format!(
        "  Flags:    {:#x}{}\n",
        view.flags,
        if view.timer_cannot_wake_cpu() {
            " (timer cannot wake cpu)"
        } else {
            ""
        }
    ));
    out.push_str(&format!("\n--- Nodes ({}) ---\n", view.nodes.len()));

    for node in &view.nodes {
        let line = match &node.body {
            NodeBody::IsaString { isa } => format!("ISA string  \"{isa}\""),
            NodeBody::Cmo {
                cbom_block_size,
                cbop_block_size,
                cboz_block_size,
            } => format!(
                "CMO         cbom 2^{cbom_block_size} cbop 2^{cbop_block_size} cboz 2^{cboz_block_size}"
            ),
            NodeBody::HartInfo {
                acpi_processor_uid,
                offsets,
            } => {
                let refs: Vec<String> = offsets.iter().map(|o| format!("{o:#x}")).collect();
                format!("Hart info   uid {acpi_processor_uid} -> [{}]", refs.join(", "))
            }
            NodeBody::Unknown { node_type, length } => {
                format!("type {node_type:#06x}  {length} bytes")
            }
        };
        out.push_str(&format!(
            "  {:#06x} r{} {}\n",
            node.offset, node.revision, line
        ));
    }
    out
}
