//! Balanced k-way partitioning of a junction tree and the partition I/O
//! surface.
//!
//! The tree partitioners assign a part to every tree node and then rewrite
//! the assignment into vertex space through the elimination ordering. The
//! streaming partitioners assign vertices (or file edges) directly. All of
//! them respect a hard per-part weight cap derived from the balance
//! factor.

mod fennel;
mod output;
mod tree;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{
    error::{CoreError, Result},
    ids::{PartId, Vid},
    nodes::JNodeTable,
};

/// Which per-node weights contribute to a tree node's cost.
#[derive(Clone, Copy, Debug)]
pub struct PartitionWeights {
    /// Count each vertex as one unit.
    pub vtx: bool,
    /// Count post-order edges.
    pub pst: bool,
    /// Count pre-order edges of the node's children.
    pub pre: bool,
}

impl Default for PartitionWeights {
    fn default() -> Self {
        Self {
            vtx: false,
            pst: true,
            pre: false,
        }
    }
}

impl PartitionWeights {
    fn of(&self, jnodes: &JNodeTable, id: crate::ids::Jnid) -> usize {
        let mut weight = 0;
        if self.vtx {
            weight += 1;
        }
        if self.pst {
            weight += jnodes.post_weight(id) as usize;
        }
        if self.pre {
            for &kid in jnodes.kids(id) {
                weight += jnodes.pre_weight(kid) as usize;
            }
        }
        weight
    }
}

/// Tree partitioning strategies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PartitionMethod {
    /// Ascending first-fit-decreasing bin packing over subtree weights.
    #[default]
    Forward,
    /// Greedy packing along the critical path of the heaviest root.
    Backward,
    /// Stream nodes in descending depth order.
    Depth,
    /// Stream nodes in ascending height order.
    Height,
    /// Stream nodes in native id order.
    Naive,
    /// Uniform random assignment.
    Random,
}

/// A k-way assignment of elements to parts. After [`Partition::from_tree`]
/// the assignment is vertex-indexed; [`Partition::fennel_stream`] produces
/// an edge-indexed one.
#[derive(Clone, Debug)]
pub struct Partition {
    num_parts: i16,
    parts: Vec<PartId>,
}

impl Partition {
    /// Partitions a built tree into `num_parts` parts and rewrites the
    /// node assignment into vertex space through `seq`.
    ///
    /// # Errors
    /// [`CoreError::Invariant`] for a non-positive part count.
    pub fn from_tree(
        seq: &[Vid],
        jnodes: &mut JNodeTable,
        num_parts: i16,
        balance_factor: f64,
        weights: PartitionWeights,
        method: PartitionMethod,
    ) -> Result<Self> {
        if num_parts <= 0 {
            return Err(CoreError::Invariant {
                detail: format!("cannot partition into {num_parts} parts"),
            });
        }

        let total_weight: usize = jnodes.ids().map(|id| weights.of(jnodes, id)).sum();
        let max_component = component_cap(total_weight, num_parts, balance_factor);

        let mut node_parts = vec![PartId::NONE; jnodes.len()];
        match method {
            PartitionMethod::Forward => {
                tree::forward(jnodes, max_component, weights, &mut node_parts);
            }
            PartitionMethod::Backward => {
                tree::backward(jnodes, max_component, weights, &mut node_parts);
            }
            PartitionMethod::Depth => {
                tree::depth(jnodes, max_component, weights, &mut node_parts);
            }
            PartitionMethod::Height => {
                tree::height(jnodes, max_component, weights, &mut node_parts);
            }
            PartitionMethod::Naive => {
                tree::naive(jnodes, max_component, weights, &mut node_parts);
            }
            PartitionMethod::Random => tree::random(num_parts, &mut node_parts),
        }

        Ok(Self {
            num_parts,
            parts: node_parts,
        }
        .into_vid_indexed(seq))
    }

    /// Reads a one-part-per-line text assignment.
    ///
    /// # Errors
    /// [`CoreError::Io`] on read failure or malformed input.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CoreError::io(path, source))?;
        let mut parts = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| CoreError::io(path, source))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let part: i16 = trimmed.parse().map_err(|_| {
                CoreError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("malformed part line `{line}`"),
                    ),
                )
            })?;
            parts.push(PartId(part));
        }
        let num_parts = parts.iter().map(|part| part.0 + 1).max().unwrap_or(0);
        Ok(Self { num_parts, parts })
    }

    /// Rewrites a node-indexed assignment into vertex space: position `i`
    /// of `seq` carries its part to vertex `seq[i]`. Ordering positions
    /// beyond the assignment's length stay unassigned.
    #[must_use]
    pub fn into_vid_indexed(self, seq: &[Vid]) -> Self {
        let len = seq.iter().map(|vid| vid.index() + 1).max().unwrap_or(0);
        let mut parts = vec![PartId::NONE; len];
        for (position, &vid) in seq.iter().enumerate().take(self.parts.len()) {
            parts[vid.index()] = self.parts[position];
        }
        Self {
            num_parts: self.num_parts,
            parts,
        }
    }

    /// Configured part count.
    #[must_use]
    pub fn num_parts(&self) -> i16 {
        self.num_parts
    }

    /// The raw assignment.
    #[must_use]
    pub fn parts(&self) -> &[PartId] {
        &self.parts
    }

    #[must_use]
    pub fn part(&self, vid: Vid) -> PartId {
        self.parts.get(vid.index()).copied().unwrap_or(PartId::NONE)
    }

    /// Part count actually used plus the sizes of the first two parts.
    #[must_use]
    pub fn summary(&self) -> PartitionSummary {
        let created = self
            .parts
            .iter()
            .filter(|part| part.is_some())
            .map(|part| part.0 + 1)
            .max()
            .unwrap_or(0);
        let count_of = |which: i16| {
            self.parts
                .iter()
                .filter(|part| part.0 == which)
                .count()
        };
        PartitionSummary {
            created,
            first_size: count_of(0),
            second_size: count_of(1),
        }
    }

    /// Serialises the assignment for the leader broadcast: part count,
    /// element count, then the raw parts, all little-endian.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(12 + 2 * self.parts.len());
        wire.extend_from_slice(&(self.num_parts as u32).to_le_bytes());
        wire.extend_from_slice(&(self.parts.len() as u64).to_le_bytes());
        for part in &self.parts {
            wire.extend_from_slice(&part.0.to_le_bytes());
        }
        wire
    }

    /// Reverses [`Self::encode`].
    ///
    /// # Errors
    /// [`CoreError::Invariant`] when the buffer length disagrees with its
    /// header.
    pub fn decode(wire: &[u8]) -> Result<Self> {
        let malformed = || CoreError::Invariant {
            detail: "malformed part-map buffer".to_owned(),
        };
        if wire.len() < 12 {
            return Err(malformed());
        }
        let num_parts = u32::from_le_bytes(wire[0..4].try_into().expect("4-byte field")) as i16;
        let len = u64::from_le_bytes(wire[4..12].try_into().expect("8-byte field")) as usize;
        if wire.len() != 12 + 2 * len {
            return Err(malformed());
        }
        let parts = wire[12..]
            .chunks_exact(2)
            .map(|pair| PartId(i16::from_le_bytes(pair.try_into().expect("2-byte field"))))
            .collect();
        Ok(Self { num_parts, parts })
    }
}

/// Hard per-part weight cap.
fn component_cap(total_weight: usize, num_parts: i16, balance_factor: f64) -> usize {
    ((total_weight as f64 / f64::from(num_parts)) * balance_factor).ceil() as usize
}

/// Human-readable outcome of a partitioning run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartitionSummary {
    pub created: i16,
    pub first_size: usize,
    pub second_size: usize,
}

impl std::fmt::Display for PartitionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Actually created {} partitions.", self.created)?;
        write!(
            f,
            "First two partition sizes: {} and {}",
            self.first_size, self.second_size
        )
    }
}
