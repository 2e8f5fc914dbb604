//! Edge-stream output of a partitioned graph.

use std::path::{Path, PathBuf};

use rayon::slice::ParallelSliceMut;

use crate::{
    edgeio::{create_edge_writer, EdgeFormat},
    error::{CoreError, Result},
    graph::Graph,
    ids::{Jnid, Vid},
};

use super::Partition;

impl Partition {
    /// Writes one edge stream relabelled so that part ordering implies id
    /// ordering: vertices are stably re-sorted by part (ordering position
    /// breaks ties), and each edge is emitted once with its smaller new
    /// id first.
    ///
    /// # Errors
    /// [`CoreError::Io`] on write failure.
    pub fn write_isomorphic<G: Graph>(
        &self,
        graph: &G,
        seq: &[Vid],
        path: &Path,
        format: EdgeFormat,
    ) -> Result<()> {
        let mut order = seq.to_vec();
        // Stable: within a part, elimination order is preserved.
        order.par_sort_by(|&lhs, &rhs| self.part(lhs).cmp(&self.part(rhs)));

        let positions = positions_of(&order);
        let mut writer = create_edge_writer(path, format)?;
        for (at, &x) in order.iter().enumerate() {
            for &y in graph.neighbours(x) {
                let peer = positions[y.index()];
                debug_assert!(peer.is_some());
                if at < peer.index() {
                    writer.write_edge(Vid(at as u32), Vid(peer.0))?;
                }
            }
        }
        Ok(())
    }

    /// Writes one edge file per part, named `{prefix}{part:04}`. Every
    /// edge goes to the part of whichever endpoint is eliminated earlier.
    /// Returns the created paths in part order.
    ///
    /// # Errors
    /// [`CoreError::Io`] on write failure; [`CoreError::Invariant`] when
    /// any endpoint is unassigned or the part count does not fit the
    /// 4-digit suffix.
    pub fn write_parts<G: Graph>(
        &self,
        graph: &G,
        seq: &[Vid],
        prefix: &Path,
        format: EdgeFormat,
    ) -> Result<Vec<PathBuf>> {
        let max_part = self
            .parts()
            .iter()
            .map(|part| part.0)
            .max()
            .unwrap_or(-1);
        if max_part < 0 {
            return Ok(Vec::new());
        }
        if max_part >= 10_000 {
            return Err(CoreError::Invariant {
                detail: format!("part {max_part} does not fit the 4-digit file suffix"),
            });
        }

        let paths: Vec<PathBuf> = (0..=max_part)
            .map(|part| PathBuf::from(format!("{}{part:04}", prefix.display())))
            .collect();
        let mut writers = paths
            .iter()
            .map(|path| create_edge_writer(path, format))
            .collect::<Result<Vec<_>>>()?;

        let positions = positions_of(seq);
        let unassigned = |vid: Vid| CoreError::Invariant {
            detail: format!("vertex {vid} has no part"),
        };

        for x in graph.vids() {
            let x_part = self.part(x);
            if x_part.is_none() {
                return Err(unassigned(x));
            }
            for &y in graph.neighbours(x) {
                if x >= y {
                    continue;
                }
                let y_part = self.part(y);
                if y_part.is_none() {
                    return Err(unassigned(y));
                }

                let edge_part = if positions[x.index()] < positions[y.index()] {
                    x_part
                } else {
                    y_part
                };
                writers[edge_part.index()].write_edge(x, y)?;
            }
        }
        Ok(paths)
    }
}

/// Position of each vertex within `order`, none for absent vertices.
fn positions_of(order: &[Vid]) -> Vec<Jnid> {
    let len = order.iter().map(|vid| vid.index() + 1).max().unwrap_or(0);
    let mut positions = vec![Jnid::NONE; len];
    for (at, &vid) in order.iter().enumerate() {
        positions[vid.index()] = Jnid::from_index(at);
    }
    positions
}
