//! Bramble core library.
//!
//! Builds, stores and partitions junction trees (chordal elimination
//! trees) over large sparse graphs in bounded memory. The pipeline runs
//! graph + elimination ordering through [`JTree::build`], which folds
//! each vertex into a [`JNodeTable`]; the resulting tree feeds the
//! [`Partition`] algorithms, whose vertex assignment finally drives the
//! partitioned edge writers.
//!
//! The storage layer underneath is deliberately narrow: a packed
//! variable-length arena for the per-node sets, a union-find that keeps
//! neighbour-to-node redirection cheap while the tree grows, and a node
//! array that can live on the heap or in a mapped file. A pairwise
//! reduction operator over the serialised node array supports distributed
//! builds; the transport is the caller's concern.

pub mod edgeio;
pub mod error;
pub mod graph;
pub mod ids;
pub mod merge;
pub mod nodes;
pub mod packed;
pub mod partition;
pub mod reduce;
pub mod sequence;
pub mod tree;
pub mod union_find;

pub use crate::{
    edgeio::EdgeFormat,
    error::{CoreError, CoreErrorCode, Result},
    graph::{AdjGraph, Graph},
    ids::{Jnid, PartId, Vid},
    nodes::{Facts, JNodeTable},
    partition::{Partition, PartitionMethod, PartitionSummary, PartitionWeights},
    sequence::SequenceFormat,
    tree::{JTree, TreeOptions},
};
