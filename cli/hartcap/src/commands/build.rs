//! `hartcap build`: resolve the tree, merge platform overrides, emit the RHCT.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hartcap_cm::platform::{load_platform_toml, validate_platform};
use hartcap_cm::{ConfigRepository, PlatformConfig};
use hartcap_fdt::{DeviceTree, TreeReader};
use hartcap_parser::cpu_info::discover_platform_records;
use hartcap_parser::dispatch::CPUS_PATH;
use hartcap_parser::parse_riscv_intc;
use hartcap_rhct::{AcpiTableInfo, RhctGenerator, RhctTable};
use tracing::info;

use super::load_tree;

pub fn run(dtb: &Path, platform: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let tree = load_tree(dtb)?;
    let platform = match platform {
        Some(path) => load_platform(path)?,
        None => PlatformConfig::named("default"),
    };

    let table = build_table(&tree, &platform)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(dtb));
    fs::write(&output, table.as_bytes())
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Wrote {} ({} bytes, platform '{}')",
        output.display(),
        table.len(),
        platform.name
    );
    Ok(())
}

/// Load a platform file and refuse it if validation reports errors.
pub fn load_platform(path: &Path) -> Result<PlatformConfig> {
    let platform =
        load_platform_toml(path).with_context(|| format!("loading {}", path.display()))?;
    if let Err(issues) = validate_platform(&platform) {
        for issue in &issues {
            eprintln!("{}: {}", issue.severity, issue.message);
        }
        bail!("{} is not a valid platform file", path.display());
    }
    Ok(platform)
}

/// Run the whole pipeline against an in-memory tree.
pub fn build_table(tree: &DeviceTree, platform: &PlatformConfig) -> Result<RhctTable> {
    let mut store = ConfigRepository::new();
    let resolution =
        parse_riscv_intc(tree, &mut store).context("resolving interrupt topology")?;

    let cpus = tree
        .find_node(CPUS_PATH)
        .with_context(|| format!("no {CPUS_PATH} node"))?;
    let discovered = discover_platform_records(tree, cpus).context("reading cpu capabilities")?;
    platform
        .records()?
        .merge_over(discovered)
        .publish(&mut store)?;

    let info = AcpiTableInfo::from(&platform.table);
    let table = RhctGenerator::new()
        .build_table(&info, &store)
        .context("generating RHCT")?;

    info!(
        harts = resolution.harts.len(),
        banks = resolution.banks.len(),
        size = table.len(),
        "table ready"
    );
    Ok(table)
}

fn default_output(dtb: &Path) -> PathBuf {
    dtb.with_extension("rhct")
}
