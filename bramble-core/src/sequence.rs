//! Elimination-order construction and sequence files.
//!
//! The orderings this system is built around are degree orderings:
//! vertices sorted by ascending degree with the vertex id as tie-break.
//! They can be derived from a loaded graph or from one scan of an edge
//! file, and persisted in either a binary format (`u64` length followed
//! by that many `u32` vids) or a one-vid-per-line text format.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

use rayon::slice::ParallelSliceMut;

use crate::{
    edgeio::{open_edge_reader, EdgeFormat},
    error::{CoreError, Result},
    graph::Graph,
    ids::Vid,
};

/// On-disk sequence encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceFormat {
    /// `u64` length then `u32` vids, little-endian.
    Binary,
    /// One vid per line.
    Text,
}

/// Every present vertex in ascending id order.
#[must_use]
pub fn default_sequence<G: Graph>(graph: &G) -> Vec<Vid> {
    graph.vids().collect()
}

/// Ascending-degree ordering with vid tie-break.
#[must_use]
pub fn degree_sequence<G: Graph + Sync>(graph: &G) -> Vec<Vid> {
    let mut seq = default_sequence(graph);
    seq.par_sort_unstable_by(|&lhs, &rhs| {
        graph
            .degree(lhs)
            .cmp(&graph.degree(rhs))
            .then_with(|| lhs.cmp(&rhs))
    });
    seq
}

/// Ascending-degree ordering derived from one scan of an edge file,
/// without materialising the graph.
///
/// # Errors
/// [`CoreError::Io`] on read failure or malformed input.
pub fn file_sequence(path: &Path, format: EdgeFormat) -> Result<Vec<Vid>> {
    let mut degree: Vec<u32> = Vec::new();
    let mut reader = open_edge_reader(path, format)?;
    while let Some((tail, head)) = reader.read_edge()? {
        let needed = tail.index().max(head.index()) + 1;
        if degree.len() < needed {
            degree.resize(needed, 0);
        }
        degree[tail.index()] += 1;
        degree[head.index()] += 1;
    }

    let mut seq: Vec<Vid> = (0..degree.len() as u32)
        .map(Vid)
        .filter(|vid| degree[vid.index()] != 0)
        .collect();
    seq.par_sort_unstable_by(|&lhs, &rhs| {
        degree[lhs.index()]
            .cmp(&degree[rhs.index()])
            .then_with(|| lhs.cmp(&rhs))
    });
    Ok(seq)
}

/// Writes `seq` to `path` in the requested format.
///
/// # Errors
/// [`CoreError::Io`] on write failure.
pub fn write_sequence(seq: &[Vid], path: &Path, format: SequenceFormat) -> Result<()> {
    let file = File::create(path).map_err(|source| CoreError::io(path, source))?;
    let mut writer = BufWriter::new(file);
    let io = |source| CoreError::io(path, source);

    match format {
        SequenceFormat::Binary => {
            writer
                .write_all(&(seq.len() as u64).to_le_bytes())
                .map_err(io)?;
            for vid in seq {
                writer.write_all(&vid.0.to_le_bytes()).map_err(io)?;
            }
        }
        SequenceFormat::Text => {
            for vid in seq {
                writeln!(writer, "{}", vid.0).map_err(io)?;
            }
        }
    }
    writer.flush().map_err(io)
}

/// Reads a sequence from `path` in the requested format.
///
/// # Errors
/// [`CoreError::Io`] on read failure or malformed input.
pub fn read_sequence(path: &Path, format: SequenceFormat) -> Result<Vec<Vid>> {
    let file = File::open(path).map_err(|source| CoreError::io(path, source))?;
    let mut reader = BufReader::new(file);
    let io = |source| CoreError::io(path, source);

    match format {
        SequenceFormat::Binary => {
            let mut header = [0u8; 8];
            reader.read_exact(&mut header).map_err(io)?;
            let len = u64::from_le_bytes(header) as usize;
            let mut seq = Vec::with_capacity(len);
            let mut field = [0u8; 4];
            for _ in 0..len {
                reader.read_exact(&mut field).map_err(io)?;
                seq.push(Vid(u32::from_le_bytes(field)));
            }
            Ok(seq)
        }
        SequenceFormat::Text => {
            let mut seq = Vec::new();
            for line in reader.lines() {
                let line = line.map_err(io)?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let vid: u32 = trimmed.parse().map_err(|_| {
                    CoreError::io(
                        path,
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("malformed sequence line `{line}`"),
                        ),
                    )
                })?;
                seq.push(Vid(vid));
            }
            Ok(seq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjGraph;
    use rstest::rstest;

    #[test]
    fn degree_sequence_breaks_ties_by_vid() {
        // Path 0-1-2-3: endpoints first, middle vertices by id.
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2), (2, 3)]);
        let seq = degree_sequence(&graph);
        assert_eq!(seq, [Vid(0), Vid(3), Vid(1), Vid(2)]);
    }

    #[test]
    fn file_sequence_matches_graph_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("edges.net");
        std::fs::write(&path, "0 1\n1 2\n2 3\n").expect("write fixture");

        let from_file = file_sequence(&path, EdgeFormat::Text).expect("scan");
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2), (2, 3)]);
        assert_eq!(from_file, degree_sequence(&graph));
    }

    #[rstest]
    #[case::binary(SequenceFormat::Binary)]
    #[case::text(SequenceFormat::Text)]
    fn sequences_round_trip(#[case] format: SequenceFormat) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("order.seq");
        let seq = vec![Vid(4), Vid(0), Vid(9), Vid(2)];

        write_sequence(&seq, &path, format).expect("write");
        let back = read_sequence(&path, format).expect("read");
        assert_eq!(back, seq);
    }
}
