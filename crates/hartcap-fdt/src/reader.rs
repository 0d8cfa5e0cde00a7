//! Read-only tree access used by the hardware-information parsers.
//!
//! [`TreeReader`] is the narrow lookup surface the parsers depend on. The
//! required methods are the raw primitives; compatibility matching, path
//! lookup and cell decoding are provided on top of them.

use serde::{Deserialize, Serialize};

use crate::tree::{DeviceTree, NodeId};

/// `#address-cells` assumed when a node does not declare it.
pub const DEFAULT_ADDRESS_CELLS: u32 = 2;

/// `#size-cells` assumed when a node does not declare it.
pub const DEFAULT_SIZE_CELLS: u32 = 1;

/// One `(address, size)` entry of a `reg` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegRegion {
    pub address: u64,
    pub size: u64,
}

/// Read-only access to a hardware description tree.
pub trait TreeReader {
    fn root(&self) -> NodeId;

    /// Raw value of a property, or `None` if the node or property is absent.
    fn property(&self, node: NodeId, name: &str) -> Option<&[u8]>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> &[NodeId];

    fn node_name(&self, node: NodeId) -> Option<&str>;

    /// Node carrying the given phandle.
    fn resolve_phandle(&self, phandle: u32) -> Option<NodeId>;

    /// Pre-order successor of `prev`; `None` starts at the root.
    fn next_node(&self, prev: Option<NodeId>) -> Option<NodeId>;

    /// `#address-cells` declared by `node` for its children.
    fn address_cells(&self, node: NodeId) -> u32 {
        self.property(node, "#address-cells")
            .and_then(|v| read_cell(v, 0))
            .unwrap_or(DEFAULT_ADDRESS_CELLS)
    }

    /// `#size-cells` declared by `node` for its children.
    fn size_cells(&self, node: NodeId) -> u32 {
        self.property(node, "#size-cells")
            .and_then(|v| read_cell(v, 0))
            .unwrap_or(DEFAULT_SIZE_CELLS)
    }

    /// True if any entry of the node's `compatible` list equals `compat`.
    fn is_compatible(&self, node: NodeId, compat: &str) -> bool {
        self.property(node, "compatible")
            .map(|v| string_list(v).any(|s| s == compat))
            .unwrap_or(false)
    }

    /// First direct child of `parent` compatible with `compat`.
    fn find_child_by_compatible(&self, parent: NodeId, compat: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.is_compatible(child, compat))
    }

    /// Next node after `prev` (pre-order) compatible with `compat`.
    fn find_next_node_by_compatible(&self, prev: Option<NodeId>, compat: &str) -> Option<NodeId> {
        let mut cursor = self.next_node(prev);
        while let Some(node) = cursor {
            if self.is_compatible(node, compat) {
                return Some(node);
            }
            cursor = self.next_node(Some(node));
        }
        None
    }

    /// Look up a node by absolute path (`/cpus`). Components must match the
    /// full node name.
    fn find_node(&self, path: &str) -> Option<NodeId> {
        let mut node = self.root();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            node = self
                .children(node)
                .iter()
                .copied()
                .find(|&child| self.node_name(child) == Some(component))?;
        }
        Some(node)
    }

    /// Every node in pre-order.
    fn nodes(&self) -> Vec<NodeId> {
        std::iter::successors(self.next_node(None), |&n| self.next_node(Some(n))).collect()
    }

    /// Absolute path of `node`, for diagnostics.
    fn path(&self, node: NodeId) -> String {
        let mut components = Vec::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let parent = self.parent(current);
            if parent.is_some() {
                components.push(self.node_name(current).unwrap_or("?"));
            }
            cursor = parent;
        }
        if components.is_empty() {
            return "/".into();
        }
        components.reverse();
        components.iter().map(|c| format!("/{c}")).collect()
    }

    /// Decode the node's `reg` using its parent's cell sizes.
    ///
    /// Returns `None` if the property is absent, empty, not a whole number of
    /// entries, or uses cells wider than 64 bits.
    fn reg_regions(&self, node: NodeId) -> Option<Vec<RegRegion>> {
        let parent = self.parent(node)?;
        let value = self.property(node, "reg")?;
        decode_reg(value, self.address_cells(parent), self.size_cells(parent))
    }
}

impl TreeReader for DeviceTree {
    fn root(&self) -> NodeId {
        DeviceTree::root(self)
    }

    fn property(&self, node: NodeId, name: &str) -> Option<&[u8]> {
        self.node(node)?.property(name)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent()
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node).map(|n| n.children()).unwrap_or(&[])
    }

    fn node_name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|n| n.name())
    }

    fn resolve_phandle(&self, phandle: u32) -> Option<NodeId> {
        self.phandle_target(phandle)
    }

    fn next_node(&self, prev: Option<NodeId>) -> Option<NodeId> {
        let Some(prev) = prev else {
            return Some(self.root());
        };
        if let Some(&first) = self.children(prev).first() {
            return Some(first);
        }
        // Climb until an ancestor has a following sibling.
        let mut current = prev;
        while let Some(parent) = TreeReader::parent(self, current) {
            let siblings = self.children(parent);
            if let Some(pos) = siblings.iter().position(|&s| s == current) {
                if let Some(&next) = siblings.get(pos + 1) {
                    return Some(next);
                }
            }
            current = parent;
        }
        None
    }
}

/// Big-endian 32-bit cell at `index`.
pub fn read_cell(value: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(4)?;
    let bytes = value.get(start..start + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Split a property into cells; `None` if the length is not a multiple of 4.
pub fn cells(value: &[u8]) -> Option<Vec<u32>> {
    if value.len() % 4 != 0 {
        return None;
    }
    Some(
        value
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Combine up to two cells into one number (most significant first).
pub fn cells_to_u64(cells: &[u32]) -> Option<u64> {
    match cells {
        [] => Some(0),
        [lo] => Some(u64::from(*lo)),
        [hi, lo] => Some((u64::from(*hi) << 32) | u64::from(*lo)),
        _ => None,
    }
}

/// Iterate the entries of a NUL-separated string list.
pub fn string_list(value: &[u8]) -> impl Iterator<Item = &str> {
    value
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .filter_map(|s| std::str::from_utf8(s).ok())
}

/// Decode a `reg` value into regions.
pub fn decode_reg(value: &[u8], address_cells: u32, size_cells: u32) -> Option<Vec<RegRegion>> {
    let ac = address_cells as usize;
    let sc = size_cells as usize;
    let stride = ac + sc;
    if ac > 2 || sc > 2 || stride == 0 {
        return None;
    }
    let all = cells(value)?;
    if all.is_empty() || all.len() % stride != 0 {
        return None;
    }
    all.chunks_exact(stride)
        .map(|entry| {
            Some(RegRegion {
                address: cells_to_u64(&entry[..ac])?,
                size: cells_to_u64(&entry[ac..])?,
            })
        })
        .collect()
}
