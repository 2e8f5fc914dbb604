//! Tree-driven partitioning algorithms.
//!
//! Forward first-fit-decreasing packing is the production method; the
//! rest are comparison baselines kept behind the same interface.

use rand::Rng;
use rayon::slice::ParallelSliceMut;

use crate::{
    ids::{Jnid, PartId},
    nodes::JNodeTable,
};

use super::PartitionWeights;

/// Ascending FFD pass: accumulate the uncut component below each node
/// and, whenever it outgrows the cap, pack whole child subtrees into
/// first-fitting bins until the node fits again. A final descending pass
/// propagates parts downward and packs floating roots.
pub(super) fn forward(
    jnodes: &mut JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
) {
    let mut part_size: Vec<usize> = Vec::new();
    let mut component_below = vec![0usize; jnodes.len()];

    for id in jnodes.ids() {
        component_below[id.index()] += weights.of(jnodes, id);
        if component_below[id.index()] > max_component {
            // Heaviest subtrees first; classic FFD.
            {
                let order = &component_below;
                jnodes
                    .kids_mut(id)
                    .sort_by(|&lhs, &rhs| order[rhs.index()].cmp(&order[lhs.index()]));
            }

            loop {
                for &kid in jnodes.kids(id) {
                    if component_below[id.index()] <= max_component {
                        break;
                    }
                    debug_assert!(component_below[kid.index()] <= max_component);
                    if parts[kid.index()].is_some() {
                        continue;
                    }

                    for bin in 0..part_size.len() {
                        if part_size[bin] + component_below[kid.index()] <= max_component {
                            component_below[id.index()] -= component_below[kid.index()];
                            part_size[bin] += component_below[kid.index()];
                            parts[kid.index()] = PartId::from_index(bin);
                            break;
                        }
                    }
                }
                // No bin fit any remaining kid; open a fresh one.
                if component_below[id.index()] > max_component {
                    part_size.push(0);
                } else {
                    break;
                }
            }
        }
        debug_assert!(component_below[id.index()] <= max_component);
        let parent = jnodes.parent(id);
        if parent.is_some() {
            component_below[parent.index()] += component_below[id.index()];
        }
    }

    for id in jnodes.ids().rev() {
        let parent = jnodes.parent(id);
        if parts[id.index()].is_none() && parent.is_some() {
            parts[id.index()] = parts[parent.index()];
        }

        // Pack floating components.
        while parts[id.index()].is_none() {
            for bin in (0..part_size.len()).rev() {
                if part_size[bin] + component_below[id.index()] <= max_component {
                    part_size[bin] += component_below[id.index()];
                    parts[id.index()] = PartId::from_index(bin);
                    break;
                }
            }
            if parts[id.index()].is_none() {
                part_size.push(0);
            }
        }
    }
}

/// Greedy packing along the critical path descending from the globally
/// heaviest root; off-path nodes inherit their parent's part.
pub(super) fn backward(
    jnodes: &JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
) {
    let mut component_below = vec![0usize; jnodes.len()];
    for id in jnodes.ids() {
        component_below[id.index()] += weights.of(jnodes, id);
        let parent = jnodes.parent(id);
        if parent.is_some() {
            component_below[parent.index()] += component_below[id.index()];
        }
    }

    if jnodes.is_empty() {
        return;
    }
    // Descend into the heaviest child, peeling its weight off the parent.
    let mut critical = Jnid::from_index(
        (0..jnodes.len())
            .max_by_key(|&index| component_below[index])
            .unwrap_or(0),
    );
    while !jnodes.kids(critical).is_empty() {
        critical = jnodes
            .kids(critical)
            .iter()
            .copied()
            .max_by_key(|kid| component_below[kid.index()])
            .expect("non-empty child row");
        let parent = jnodes.parent(critical);
        component_below[parent.index()] -= component_below[critical.index()];
    }

    let mut cur_part = 0i16;
    let mut part_size = 0usize;
    let mut walker = critical;
    while walker.is_some() {
        if part_size + component_below[walker.index()] < max_component {
            parts[walker.index()] = PartId(cur_part);
            part_size += component_below[walker.index()];
        } else {
            cur_part += 1;
            parts[walker.index()] = PartId(cur_part);
            part_size = component_below[walker.index()];
        }
        walker = jnodes.parent(walker);
    }

    for id in jnodes.ids().rev() {
        if parts[id.index()].is_none() {
            let parent = jnodes.parent(id);
            parts[id.index()] = if parent.is_some() {
                parts[parent.index()]
            } else {
                PartId(cur_part)
            };
        }
    }
}

/// Streams nodes in descending depth order into a running bin.
pub(super) fn depth(
    jnodes: &JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
) {
    let mut depth = vec![0usize; jnodes.len()];
    for id in jnodes.ids().rev() {
        let parent = jnodes.parent(id);
        if parent.is_some() {
            depth[id.index()] = depth[parent.index()] + 1;
        }
    }
    stream_pack(jnodes, max_component, weights, parts, |jnids| {
        jnids.par_sort_by(|lhs, rhs| depth[rhs.index()].cmp(&depth[lhs.index()]));
    });
}

/// Streams nodes in ascending height order into a running bin.
pub(super) fn height(
    jnodes: &JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
) {
    let mut height = vec![0usize; jnodes.len()];
    for id in jnodes.ids() {
        let parent = jnodes.parent(id);
        if parent.is_some() {
            height[parent.index()] = height[parent.index()].max(height[id.index()] + 1);
        }
    }
    stream_pack(jnodes, max_component, weights, parts, |jnids| {
        jnids.par_sort_by(|lhs, rhs| height[lhs.index()].cmp(&height[rhs.index()]));
    });
}

/// Streams nodes in native id order into a running bin.
pub(super) fn naive(
    jnodes: &JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
) {
    stream_pack(jnodes, max_component, weights, parts, |_| {});
}

fn stream_pack(
    jnodes: &JNodeTable,
    max_component: usize,
    weights: PartitionWeights,
    parts: &mut [PartId],
    order: impl FnOnce(&mut [Jnid]),
) {
    let mut jnids: Vec<Jnid> = jnodes.ids().collect();
    order(&mut jnids);

    let mut cur_part = 0i16;
    let mut cur_size = 0usize;
    for id in jnids {
        parts[id.index()] = PartId(cur_part);
        cur_size += weights.of(jnodes, id);
        if cur_size >= max_component {
            cur_part += 1;
            cur_size = 0;
        }
    }
}

/// Uniform random assignment; no balance guarantee beyond expectation.
pub(super) fn random(num_parts: i16, parts: &mut [PartId]) {
    let mut rng = rand::thread_rng();
    for slot in parts {
        *slot = PartId(rng.gen_range(0..num_parts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::tests::binary15;

    #[test]
    fn backward_packs_the_critical_path() {
        let jnodes = binary15();
        let mut parts = vec![PartId::NONE; jnodes.len()];
        backward(&jnodes, 6, PartitionWeights::default(), &mut parts);

        assert!(parts.iter().all(|part| part.is_some()));
        // The critical path runs leaf-to-root, so the root carries the
        // highest part id.
        let root_part = parts[14];
        assert!(parts.iter().all(|part| part.0 <= root_part.0));
    }

    #[test]
    fn height_order_starts_at_the_leaves() {
        let jnodes = binary15();
        let mut parts = vec![PartId::NONE; jnodes.len()];
        height(&jnodes, 8, PartitionWeights::default(), &mut parts);

        // All 8 leaves precede every internal node in the stream.
        let leaf_parts: Vec<i16> = (0..8).map(|leaf| parts[leaf].0).collect();
        assert!(leaf_parts.iter().all(|&part| part == 0));
    }

    #[test]
    fn random_respects_the_part_range() {
        let mut parts = vec![PartId::NONE; 64];
        random(3, &mut parts);
        assert!(parts.iter().all(|part| (0..3).contains(&part.0)));
    }

    #[test]
    fn forward_splits_a_chain_into_contiguous_segments() {
        let mut jnodes = crate::nodes::JNodeTable::new(6, false, 0);
        for _ in 0..6 {
            jnodes.new_node().expect("capacity");
        }
        for raw in 0..5u32 {
            jnodes.adopt(crate::ids::Jnid(raw), crate::ids::Jnid(raw + 1));
        }
        jnodes.make_kids().expect("child arena is self-sized");

        let unit = PartitionWeights {
            vtx: true,
            pst: false,
            pre: false,
        };
        let mut parts = vec![PartId::NONE; jnodes.len()];
        forward(&mut jnodes, 2, unit, &mut parts);

        // Two nodes per part, and parts change only at segment borders.
        let mut loads = std::collections::HashMap::new();
        for part in &parts {
            *loads.entry(part.0).or_insert(0usize) += 1;
        }
        assert!(loads.values().all(|&load| load <= 2), "{parts:?}");
        for raw in 0..5usize {
            let same = parts[raw] == parts[raw + 1];
            let border = raw % 2 == 1;
            assert_eq!(same, !border, "unexpected split at {raw}: {parts:?}");
        }
    }
}
