//! Wire codec and reduction operator for merging per-worker trees.
//!
//! Each worker builds a tree of identical size over its partition-local
//! subgraph; a collective transport then folds [`reduce`] over the
//! serialised tables pairwise. Only the node array travels: `end` followed
//! by `(parent, post_weight, pre_weight)` little-endian triples, the same
//! record layout as the tree file without its capacity padding. Child,
//! post-neighbour and junction tables are rebuilt at the leader once the
//! reduction completes.
//!
//! The operator is associative and commutative: post-weights add, and
//! parent pointers are re-derived through the union-find, which depends
//! only on the merged edge sets and never on merge order.

use crate::{
    error::{CoreError, Result},
    ids::jnids,
    nodes::{JNodeTable, NODE_BYTES},
};

/// Serialises the live nodes of `table`.
#[must_use]
pub fn encode(table: &JNodeTable) -> Vec<u8> {
    let mut wire = Vec::with_capacity(4 + table.len() * NODE_BYTES);
    wire.extend_from_slice(&(table.len() as u32).to_le_bytes());
    for id in table.ids() {
        let node = table.node(id);
        wire.extend_from_slice(&node.parent.0.to_le_bytes());
        wire.extend_from_slice(&node.post_weight.to_le_bytes());
        wire.extend_from_slice(&node.pre_weight.to_le_bytes());
    }
    wire
}

/// Deserialises a node buffer into an owned table with its child table
/// rebuilt, ready to act as a merge operand.
///
/// # Errors
/// [`CoreError::Invariant`] when the buffer length disagrees with its
/// header.
pub fn decode(wire: &[u8]) -> Result<JNodeTable> {
    let malformed = || CoreError::Invariant {
        detail: "malformed tree buffer".to_owned(),
    };
    if wire.len() < 4 {
        return Err(malformed());
    }
    let end = u32::from_le_bytes(wire[0..4].try_into().expect("4-byte field")) as usize;
    if wire.len() != 4 + end * NODE_BYTES {
        return Err(malformed());
    }

    let mut table = JNodeTable::new(end, false, 0);
    for (id, record) in jnids(end).zip(wire[4..].chunks_exact(NODE_BYTES)) {
        let field = |at: usize| {
            u32::from_le_bytes(record[at..at + 4].try_into().expect("4-byte field"))
        };
        let created = table.new_node()?;
        debug_assert_eq!(created, id);
        table.set_parent(id, crate::ids::Jnid(field(0)));
        table.add_post_weight(id, field(4));
        table.set_pre_weight(id, field(8));
    }
    table.make_kids()?;
    Ok(table)
}

/// The pairwise reduction step: merges the table serialised in `lhs` into
/// the one serialised in `inout`, leaving the merged serialisation in
/// `inout`. Both buffers must describe tables of the same size.
///
/// # Errors
/// [`CoreError::Invariant`] for malformed or differently sized buffers.
pub fn reduce(lhs: &[u8], inout: &mut [u8]) -> Result<()> {
    let left = decode(lhs)?;
    let right = decode(inout)?;

    let mut merged = JNodeTable::new(left.len(), false, 0);
    merged.merge(&left, &right, false)?;

    let wire = encode(&merged);
    if wire.len() != inout.len() {
        return Err(CoreError::Invariant {
            detail: format!(
                "reduction changed the buffer length from {} to {}",
                inout.len(),
                wire.len()
            ),
        });
    }
    inout.copy_from_slice(&wire);
    Ok(())
}
