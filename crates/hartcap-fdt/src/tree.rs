//! In-memory device tree model and construction API.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Children and
//! properties keep their insertion order, which is also the order the blob
//! codec emits them in, so traversal order is stable across a decode/encode
//! cycle.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FdtError, Result};

/// Property names that carry a node's phandle.
const PHANDLE_PROPERTIES: [&str; 2] = ["phandle", "linux,phandle"];

/// Arena index of a node inside a [`DeviceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A named property with a raw big-endian value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: Vec<u8>,
}

/// A single node: name, links and properties.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    properties: Vec<Property>,
}

impl Node {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Full node name, including any unit address (`cpu@0`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node name without the unit address (`cpu@0` -> `cpu`).
    pub fn unit_name(&self) -> &str {
        self.name.split('@').next().unwrap_or(&self.name)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Raw value of the named property.
    pub fn property(&self, name: &str) -> Option<&[u8]> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_slice())
    }
}

/// A device tree held entirely in memory.
#[derive(Debug, Clone)]
pub struct DeviceTree {
    nodes: Vec<Node>,
    phandles: BTreeMap<u32, NodeId>,
    boot_cpuid_phys: u32,
}

impl DeviceTree {
    /// Create a tree containing only an empty root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), None)],
            phandles: BTreeMap::new(),
            boot_cpuid_phys: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Physical id of the boot CPU as recorded in the blob header.
    pub fn boot_cpuid_phys(&self) -> u32 {
        self.boot_cpuid_phys
    }

    pub fn set_boot_cpuid_phys(&mut self, cpuid: u32) {
        self.boot_cpuid_phys = cpuid;
    }

    /// Append a child node under `parent` and return its id.
    pub fn add_node(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(FdtError::InvalidNodeName(name));
        }
        let parent_node = self
            .nodes
            .get(parent.index())
            .ok_or(FdtError::UnknownNode(parent))?;
        if parent_node
            .children
            .iter()
            .any(|c| self.nodes[c.index()].name == name)
        {
            return Err(FdtError::InvalidNodeName(name));
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(name, Some(parent)));
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Set (or replace) a property value.
    ///
    /// Setting `phandle`/`linux,phandle` also updates the phandle index.
    pub fn set_property(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: Vec<u8>,
    ) -> Result<()> {
        let name = name.into();
        if self.nodes.get(node.index()).is_none() {
            return Err(FdtError::UnknownNode(node));
        }

        if PHANDLE_PROPERTIES.contains(&name.as_str()) {
            self.index_phandle(node, &value)?;
        }

        let properties = &mut self.nodes[node.index()].properties;
        match properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => properties.push(Property { name, value }),
        }
        Ok(())
    }

    fn index_phandle(&mut self, node: NodeId, value: &[u8]) -> Result<()> {
        let phandle = match <[u8; 4]>::try_from(value) {
            Ok(bytes) => u32::from_be_bytes(bytes),
            Err(_) => return Err(FdtError::InvalidPhandle { node }),
        };
        if phandle == 0 || phandle == u32::MAX {
            return Err(FdtError::InvalidPhandle { node });
        }
        match self.phandles.get(&phandle) {
            Some(&first) if first != node => {
                return Err(FdtError::DuplicatePhandle {
                    phandle,
                    first,
                    second: node,
                })
            }
            _ => {}
        }
        // Drop a previous phandle of this node before re-indexing.
        self.phandles.retain(|_, owner| *owner != node);
        self.phandles.insert(phandle, node);
        Ok(())
    }

    pub fn set_u32(&mut self, node: NodeId, name: &str, value: u32) -> Result<()> {
        self.set_property(node, name, value.to_be_bytes().to_vec())
    }

    pub fn set_u64(&mut self, node: NodeId, name: &str, value: u64) -> Result<()> {
        self.set_property(node, name, value.to_be_bytes().to_vec())
    }

    /// Set a property to a list of 32-bit cells.
    pub fn set_cells(&mut self, node: NodeId, name: &str, cells: &[u32]) -> Result<()> {
        let value = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.set_property(node, name, value)
    }

    pub fn set_string(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.set_strings(node, name, &[value])
    }

    /// Set a NUL-separated string list (e.g. `compatible`).
    pub fn set_strings(&mut self, node: NodeId, name: &str, values: &[&str]) -> Result<()> {
        let mut value = Vec::new();
        for s in values {
            value.extend_from_slice(s.as_bytes());
            value.push(0);
        }
        self.set_property(node, name, value)
    }

    /// Set a boolean (empty) property.
    pub fn set_empty(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.set_property(node, name, Vec::new())
    }

    pub fn set_phandle(&mut self, node: NodeId, phandle: u32) -> Result<()> {
        self.set_u32(node, "phandle", phandle)
    }

    /// Node owning `phandle`, if any.
    pub fn phandle_target(&self, phandle: u32) -> Option<NodeId> {
        self.phandles.get(&phandle).copied()
    }

    /// Iterate all nodes in depth-first pre-order, starting at the root.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![NodeId::ROOT],
        }
    }

    /// Absolute path of a node (`/cpus/cpu@0`).
    pub fn path_of(&self, node: NodeId) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = self.node(node)?;
        while let Some(parent) = current.parent {
            parts.push(current.name.as_str());
            current = self.node(parent)?;
        }
        parts.reverse();
        Some(format!("/{}", parts.join("/")))
    }
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first pre-order walk over a [`DeviceTree`].
pub struct Preorder<'a> {
    tree: &'a DeviceTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        if let Some(node) = self.tree.node(id) {
            self.stack.extend(node.children.iter().rev());
        }
        Some(id)
    }
}
