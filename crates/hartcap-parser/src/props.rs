//! Property decoding shared by the resolvers.

use hartcap_fdt::reader::{cells, read_cell};
use hartcap_fdt::{NodeId, TreeReader};

use crate::error::{ParseError, Result};

/// One `interrupts-extended` entry: the target controller's phandle and the
/// interrupt level on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IrqPair {
    pub phandle: u32,
    pub level: u32,
}

/// Decode `interrupts-extended` as `(phandle, level)` pairs.
///
/// `Ok(None)` when the property is absent; an odd cell count is malformed.
pub(crate) fn interrupt_pairs<T>(tree: &T, node: NodeId) -> Result<Option<Vec<IrqPair>>>
where
    T: TreeReader + ?Sized,
{
    let Some(value) = tree.property(node, "interrupts-extended") else {
        return Ok(None);
    };
    let all = cells(value)
        .filter(|c| c.len() % 2 == 0)
        .ok_or_else(|| malformed(tree, node, "interrupts-extended"))?;
    Ok(Some(
        all.chunks_exact(2)
            .map(|p| IrqPair {
                phandle: p[0],
                level: p[1],
            })
            .collect(),
    ))
}

/// Level of the first `interrupts-extended` entry, if readable.
pub(crate) fn first_irq_level<T>(tree: &T, node: NodeId) -> Option<u32>
where
    T: TreeReader + ?Sized,
{
    tree.property(node, "interrupts-extended")
        .and_then(|v| read_cell(v, 1))
}

/// Optional single-cell property.
pub(crate) fn optional_u32<T>(tree: &T, node: NodeId, property: &'static str) -> Result<Option<u32>>
where
    T: TreeReader + ?Sized,
{
    match tree.property(node, property) {
        None => Ok(None),
        Some(value) => read_cell(value, 0)
            .map(Some)
            .ok_or_else(|| malformed(tree, node, property)),
    }
}

pub(crate) fn malformed<T>(tree: &T, node: NodeId, property: &'static str) -> ParseError
where
    T: TreeReader + ?Sized,
{
    ParseError::MalformedProperty {
        node: tree.path(node),
        property,
    }
}

pub(crate) fn missing<T>(tree: &T, node: NodeId, property: &'static str) -> ParseError
where
    T: TreeReader + ?Sized,
{
    ParseError::MissingProperty {
        node: tree.path(node),
        property,
    }
}
