//! Global system interrupt numbering.
//!
//! Each controller bank owns a contiguous GSI range starting at its
//! `gsi_base`. Bases are assigned in discovery order as the running sum of
//! source counts, so the ranges partition `0..total` without gaps.

use hartcap_fdt::NodeId;
use serde::Serialize;

use crate::error::{ParseError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GsiRegistry {
    /// `(bank node, gsi_base)` in discovery order.
    entries: Vec<(NodeId, u32)>,
}

impl GsiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the GSI base of a bank. Re-registering a node replaces its base.
    pub fn register(&mut self, node: NodeId, gsi_base: u32) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == node) {
            entry.1 = gsi_base;
            return Ok(());
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| ParseError::OutOfResources {
                what: "GSI registry entries",
                count: self.entries.len() + 1,
            })?;
        self.entries.push((node, gsi_base));
        Ok(())
    }

    pub fn gsi_base(&self, node: NodeId) -> Option<u32> {
        self.entries
            .iter()
            .find(|(n, _)| *n == node)
            .map(|&(_, base)| base)
    }

    /// Global number of `local_irq` on the controller at `node`.
    ///
    /// Interrupts of unregistered controllers are returned unchanged.
    pub fn translate(&self, node: NodeId, local_irq: u32) -> u32 {
        match self.gsi_base(node) {
            Some(base) => base.saturating_add(local_irq),
            None => local_irq,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.entries.iter().copied()
    }

    /// Forget every bank.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
