//! CLI command implementations.

pub mod build;
pub mod inspect;
pub mod platform;
pub mod resolve;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use hartcap_fdt::DeviceTree;

/// Read and decode a device tree blob.
pub fn load_tree(path: &Path) -> Result<DeviceTree> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    DeviceTree::from_blob(&bytes).with_context(|| format!("decoding {}", path.display()))
}
