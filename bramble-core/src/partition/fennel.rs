//! Streaming one-pass partitioners in the Fennel family.
//!
//! Each element (vertex, or edge in the file-scan variant) is placed where
//! the neighbour affinity minus a convex size penalty is highest, subject
//! to a hard balance cap. The penalty exponent is fixed at 1.5; the
//! multiplier depends on whether balance is counted in vertices or edges.

use std::path::Path;

use tracing::debug;

use crate::{
    edgeio::{BinaryEdgeReader, EdgeReader},
    error::{CoreError, Result},
    graph::Graph,
    ids::PartId,
};

use super::{component_cap, Partition};

const GAMMA: f64 = 1.5;

impl Partition {
    /// One pass over the graph's vertices in graph order, greedily
    /// assigning each to the highest-value part.
    ///
    /// # Errors
    /// [`CoreError::Invariant`] for a non-positive part count.
    pub fn fennel<G: Graph>(
        graph: &G,
        num_parts: i16,
        balance_factor: f64,
        edge_balanced: bool,
    ) -> Result<Self> {
        if num_parts <= 0 {
            return Err(CoreError::Invariant {
                detail: format!("cannot partition into {num_parts} parts"),
            });
        }

        let n = graph.node_count() as f64;
        // Directed edge count; the graph reports undirected edges.
        let m = (2 * graph.edge_count()) as f64;
        let k = f64::from(num_parts);
        let alpha = if edge_balanced {
            n * (k / m).powf(GAMMA)
        } else {
            m * (k.powf(GAMMA - 1.0) / n.powf(GAMMA))
        };
        let total_weight = if edge_balanced {
            2 * graph.edge_count()
        } else {
            graph.node_count()
        };
        let max_component = component_cap(total_weight, num_parts, balance_factor) as f64;

        let slots = num_parts as usize;
        let mut parts = vec![PartId::NONE; graph.max_vid().index() + 1];
        let mut part_value = vec![0f64; slots];
        let mut part_size = vec![0f64; slots];

        for x in graph.vids() {
            let x_weight = if edge_balanced {
                graph.degree(x) as f64
            } else {
                1.0
            };

            part_value.fill(0.0);
            for &y in graph.neighbours(x) {
                let assigned = parts[y.index()];
                if assigned.is_some() {
                    part_value[assigned.index()] += 1.0;
                }
            }

            let chosen = choose_part(&part_value, &part_size, x_weight, alpha, max_component);
            parts[x.index()] = PartId(chosen);
            part_size[chosen as usize] += x_weight;
        }

        Ok(Self { num_parts, parts })
    }

    /// Edge-balanced streaming partition of a binary edge file. The file
    /// is scanned once to discover the vertex and edge counts, then again
    /// to assign each edge record a part; the result is edge-indexed in
    /// record order.
    ///
    /// # Errors
    /// [`CoreError::Io`] on read failure; [`CoreError::Invariant`] for a
    /// non-positive part count.
    pub fn fennel_stream(path: &Path, num_parts: i16, balance_factor: f64) -> Result<Self> {
        if num_parts <= 0 {
            return Err(CoreError::Invariant {
                detail: format!("cannot partition into {num_parts} parts"),
            });
        }

        // Discovery pass.
        let mut degree: Vec<u32> = Vec::new();
        let mut edge_count = 0usize;
        let mut reader = BinaryEdgeReader::open(path)?;
        while let Some((tail, head)) = reader.read_edge()? {
            let needed = tail.index().max(head.index()) + 1;
            if degree.len() < needed {
                degree.resize(needed, 0);
            }
            degree[tail.index()] += 1;
            degree[head.index()] += 1;
            edge_count += 1;
        }
        let vertex_count = degree.iter().filter(|&&count| count != 0).count();
        debug!(vertex_count, edge_count, "discovered stream dimensions");

        let n = vertex_count as f64;
        let m = (2 * edge_count) as f64;
        let k = f64::from(num_parts);
        let alpha = m * (k.powf(GAMMA - 1.0) / n.powf(GAMMA));
        let max_component = component_cap(edge_count, num_parts, balance_factor) as f64;

        let slots = num_parts as usize;
        let mut parts = Vec::with_capacity(edge_count);
        let mut part_value = vec![0f64; slots];
        let mut part_size = vec![0f64; slots];
        let mut touches = vec![false; slots * degree.len()];

        // Assignment pass.
        let mut reader = BinaryEdgeReader::open(path)?;
        while let Some((tail, head)) = reader.read_edge()? {
            part_value.fill(0.0);
            for p in 0..slots {
                if touches[tail.index() * slots + p] {
                    part_value[p] += 1.0;
                }
                if touches[head.index() * slots + p] {
                    part_value[p] += 1.0;
                }
            }

            let chosen = choose_part(&part_value, &part_size, 1.0, alpha, max_component);
            parts.push(PartId(chosen));
            part_size[chosen as usize] += 1.0;
            touches[tail.index() * slots + chosen as usize] = true;
            touches[head.index() * slots + chosen as usize] = true;
        }

        Ok(Self { num_parts, parts })
    }
}

/// Highest `affinity − α·((size + w)^γ − size^γ)` among parts with room,
/// lowest part id on ties. Once an empty part is seen the scan stops:
/// every later part is also empty and scores identically.
fn choose_part(
    part_value: &[f64],
    part_size: &[f64],
    weight: f64,
    alpha: f64,
    max_component: f64,
) -> i16 {
    let mut max_part = 0i16;
    let mut max_value = f64::MIN;
    for (p, (&value, &size)) in part_value.iter().zip(part_size).enumerate() {
        if size + weight > max_component {
            continue; // Hard balance limit.
        }

        let cost = alpha * (size + weight).powf(GAMMA) - alpha * size.powf(GAMMA);
        let score = value - cost;
        if score > max_value {
            max_part = p as i16;
            max_value = score;
        }

        if size == 0.0 {
            break;
        }
    }
    max_part
}
