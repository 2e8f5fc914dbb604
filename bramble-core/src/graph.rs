//! Graph access seam and the in-memory adjacency implementation.
//!
//! Tree construction and partitioning only need four capabilities from a
//! graph: node iteration, per-node neighbour iteration, degrees, and node
//! membership. The [`Graph`] trait captures exactly those so that an
//! out-of-core adjacency store can replace [`AdjGraph`] without touching
//! the algorithms.

use crate::{
    edgeio::EdgeReader,
    error::Result,
    ids::Vid,
};

/// Capabilities the elimination and the partitioners require.
pub trait Graph {
    /// Number of vertices with at least one incident edge.
    fn node_count(&self) -> usize;

    /// Number of undirected edges.
    fn edge_count(&self) -> usize;

    /// Largest vertex id present.
    fn max_vid(&self) -> Vid;

    /// Whether `vid` is a vertex with incident edges.
    fn is_node(&self, vid: Vid) -> bool;

    /// Incident edge count of `vid` (zero for absent vertices).
    fn degree(&self, vid: Vid) -> usize;

    /// Neighbours of `vid`, duplicates and self-loops included when the
    /// source carried them.
    fn neighbours(&self, vid: Vid) -> &[Vid];

    /// Iterates present vertices in ascending id order.
    fn vids(&self) -> Box<dyn Iterator<Item = Vid> + '_>;
}

/// Adjacency-list graph loaded eagerly into memory.
#[derive(Clone, Debug, Default)]
pub struct AdjGraph {
    adjacency: Vec<Vec<Vid>>,
    node_count: usize,
    edge_count: usize,
}

impl AdjGraph {
    /// Drains `reader` into an undirected adjacency structure. With
    /// `dedup` the neighbour lists are sorted and duplicate edges
    /// collapsed after the load; without it duplicates survive and are
    /// only collapsed later by post-neighbour cleaning.
    ///
    /// # Errors
    /// Propagates reader failures.
    pub fn from_reader(reader: &mut dyn EdgeReader, dedup: bool) -> Result<Self> {
        let mut graph = Self::default();
        while let Some((tail, head)) = reader.read_edge()? {
            graph.add_edge(tail, head);
        }
        graph.finish(dedup);
        Ok(graph)
    }

    /// Builds a graph from explicit edges; used pervasively in tests.
    #[must_use]
    pub fn from_edges(edges: &[(u32, u32)]) -> Self {
        let mut graph = Self::default();
        for &(tail, head) in edges {
            graph.add_edge(Vid(tail), Vid(head));
        }
        graph.finish(true);
        graph
    }

    fn add_edge(&mut self, tail: Vid, head: Vid) {
        let needed = tail.index().max(head.index()) + 1;
        if self.adjacency.len() < needed {
            self.adjacency.resize(needed, Vec::new());
        }
        self.adjacency[tail.index()].push(head);
        if tail != head {
            self.adjacency[head.index()].push(tail);
        }
        self.edge_count += 1;
    }

    fn finish(&mut self, dedup: bool) {
        if dedup {
            let mut removed = 0usize;
            for list in &mut self.adjacency {
                let before = list.len();
                list.sort_unstable();
                list.dedup();
                removed += before - list.len();
            }
            // Every duplicate undirected edge was stored twice.
            self.edge_count -= removed / 2;
        }
        self.node_count = self
            .adjacency
            .iter()
            .filter(|list| !list.is_empty())
            .count();
    }
}

impl Graph for AdjGraph {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn max_vid(&self) -> Vid {
        if self.adjacency.is_empty() {
            Vid(0)
        } else {
            Vid((self.adjacency.len() - 1) as u32)
        }
    }

    fn is_node(&self, vid: Vid) -> bool {
        self.adjacency
            .get(vid.index())
            .is_some_and(|list| !list.is_empty())
    }

    fn degree(&self, vid: Vid) -> usize {
        self.adjacency.get(vid.index()).map_or(0, Vec::len)
    }

    fn neighbours(&self, vid: Vid) -> &[Vid] {
        self.adjacency.get(vid.index()).map_or(&[], Vec::as_slice)
    }

    fn vids(&self) -> Box<dyn Iterator<Item = Vid> + '_> {
        Box::new(
            (0..self.adjacency.len() as u32)
                .map(Vid)
                .filter(|&vid| self.is_node(vid)),
        )
    }
}
