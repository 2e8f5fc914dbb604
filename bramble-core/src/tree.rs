//! Junction-tree construction from an elimination ordering.
//!
//! A [`JTree`] pairs a [`JNodeTable`] (the chordal embedding, indexed by
//! tree-node id) with the vertex index that maps graph ids onto tree-node
//! ids. Construction is a fold over the ordering: each vertex becomes a
//! fresh node, its already-eliminated neighbours link in as children
//! through the union-find, its later neighbours accumulate as
//! post-neighbours, and the junction set is the bounded union of the
//! children's junction sets with the node's own post-neighbours.
//!
//! Vertices whose insertion would exceed the width limit are deferred and
//! re-enter at the end through the trivial-coalesce phase, which stacks
//! them into a linear chain above a meta-node adopting every open root.
//! Pre-weights are not propagated through that chain; trees built with
//! deferral undercount them there.

use tracing::{debug, warn};

use crate::{
    error::{CoreError, Result},
    graph::Graph,
    ids::{jnids, Jnid, Vid},
    nodes::JNodeTable,
};

const DEFAULT_MEMORY_LIMIT: usize = 1 << 30;
/// Insertions between verbose progress events.
const PROGRESS_INTERVAL: usize = 100_000;

/// Construction switches for [`JTree::build`].
///
/// Junction sets require both the child table and the post-neighbour
/// table, and every width-driven feature requires junction sets;
/// [`TreeOptions::validate`] enforces the chain.
#[derive(Clone, Copy, Debug)]
pub struct TreeOptions {
    /// Emit progress events while building.
    pub verbose: bool,
    /// Emit tree nodes for zero-degree vertices, keeping the tree 1-to-1
    /// with the ordering.
    pub pad: bool,
    /// Populate the child table.
    pub make_kids: bool,
    /// Populate the post-neighbour table.
    pub make_pst: bool,
    /// Populate the junction table.
    pub make_jxn: bool,
    /// Combined byte budget for the post-neighbour and junction arenas.
    pub memory_limit: usize,
    /// Defer vertices whose insertion would exceed this width.
    pub width_limit: Option<usize>,
    /// Stop as soon as no later vertex can raise the maximum width.
    pub find_max_width: bool,
    /// Coalesce the remaining suffix into a chain once one node's width
    /// equals the remaining vertex count.
    pub do_rooting: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            pad: true,
            make_kids: false,
            make_pst: false,
            make_jxn: false,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            width_limit: None,
            find_max_width: false,
            do_rooting: false,
        }
    }
}

impl TreeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_pad(mut self, pad: bool) -> Self {
        self.pad = pad;
        self
    }

    #[must_use]
    pub fn with_kids(mut self, make_kids: bool) -> Self {
        self.make_kids = make_kids;
        self
    }

    #[must_use]
    pub fn with_pst(mut self, make_pst: bool) -> Self {
        self.make_pst = make_pst;
        self
    }

    /// Requests junction sets, which imply the child and post-neighbour
    /// tables.
    #[must_use]
    pub fn with_jxn(mut self, make_jxn: bool) -> Self {
        self.make_jxn = make_jxn;
        if make_jxn {
            self.make_kids = true;
            self.make_pst = true;
        }
        self
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_width_limit(mut self, limit: Option<usize>) -> Self {
        self.width_limit = limit;
        self
    }

    #[must_use]
    pub fn with_find_max_width(mut self, find: bool) -> Self {
        self.find_max_width = find;
        self
    }

    #[must_use]
    pub fn with_rooting(mut self, root: bool) -> Self {
        self.do_rooting = root;
        self
    }

    /// Checks the implication chain between switches.
    ///
    /// # Errors
    /// [`CoreError::Invariant`] naming the first violated implication.
    pub fn validate(&self) -> Result<()> {
        let violated = if self.make_jxn && !(self.make_kids && self.make_pst) {
            Some("junction sets require the child and post-neighbour tables")
        } else if self.width_limit.is_some() && !self.make_jxn {
            Some("a width limit requires junction sets")
        } else if self.find_max_width && !self.make_jxn {
            Some("width search requires junction sets")
        } else if self.do_rooting && !self.make_jxn {
            Some("rooting requires junction sets")
        } else {
            None
        };
        match violated {
            Some(detail) => Err(CoreError::Invariant {
                detail: detail.to_owned(),
            }),
            None => Ok(()),
        }
    }

    fn is_default(&self) -> bool {
        !self.verbose
            && self.pad
            && !self.make_kids
            && !self.make_pst
            && !self.make_jxn
            && self.memory_limit == DEFAULT_MEMORY_LIMIT
            && self.width_limit.is_none()
            && !self.find_max_width
            && !self.do_rooting
    }

    fn effective_width_limit(&self) -> usize {
        self.width_limit.unwrap_or(usize::MAX)
    }
}

/// The isomorphism between a graph and its chordal embedding.
#[derive(Debug)]
pub struct JTree {
    index: Vec<Jnid>,
    pub jnodes: JNodeTable,
}

impl JTree {
    /// Builds a tree by eliminating `seq` over `graph` into an owned node
    /// table.
    ///
    /// # Errors
    /// [`CoreError::Invariant`] for inconsistent options;
    /// [`CoreError::Capacity`] / [`CoreError::OutOfMemory`] when the
    /// configured bounds cannot hold the tree.
    pub fn build<G: Graph>(graph: &G, seq: &[Vid], opts: TreeOptions) -> Result<Self> {
        opts.validate()?;
        let jnodes = JNodeTable::new(
            Self::max_nodes(graph, seq, opts),
            opts.make_kids,
            if opts.make_pst || opts.make_jxn {
                opts.memory_limit
            } else {
                0
            },
        );
        let mut tree = Self {
            index: vec![Jnid::NONE; Self::index_len(seq)],
            jnodes,
        };
        tree.insert_sequence(graph, seq, opts)?;
        Ok(tree)
    }

    /// As [`Self::build`], but the node array is written through a file
    /// mapping at `path` as it grows.
    ///
    /// # Errors
    /// As [`Self::build`], plus [`CoreError::Io`] for mapping failures.
    pub fn build_mapped<G: Graph>(
        graph: &G,
        seq: &[Vid],
        path: &std::path::Path,
        opts: TreeOptions,
    ) -> Result<Self> {
        opts.validate()?;
        let jnodes = JNodeTable::create_mapped(
            path,
            Self::max_nodes(graph, seq, opts),
            opts.make_kids,
            if opts.make_pst || opts.make_jxn {
                opts.memory_limit
            } else {
                0
            },
        )?;
        let mut tree = Self {
            index: vec![Jnid::NONE; Self::index_len(seq)],
            jnodes,
        };
        tree.insert_sequence(graph, seq, opts)?;
        Ok(tree)
    }

    /// Reopens a saved tree file; positions in `seq` become the index.
    ///
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be mapped.
    pub fn open(seq: &[Vid], path: &std::path::Path) -> Result<Self> {
        let jnodes = JNodeTable::load(path)?;
        let mut index = vec![Jnid::NONE; Self::index_len(seq)];
        for (position, &vid) in seq.iter().enumerate() {
            index[vid.index()] = Jnid::from_index(position);
        }
        Ok(Self { index, jnodes })
    }

    /// A view of `other` as it was after its first `partial_end`
    /// insertions.
    #[must_use]
    pub fn partial(other: &Self, partial_end: usize) -> Self {
        let mut index = other.index.clone();
        for slot in &mut index {
            if slot.is_some() && slot.index() >= partial_end {
                *slot = Jnid::NONE;
            }
        }
        Self {
            index,
            jnodes: JNodeTable::partial(&other.jnodes, partial_end),
        }
    }

    fn max_nodes<G: Graph>(graph: &G, seq: &[Vid], opts: TreeOptions) -> usize {
        if opts.pad {
            seq.len()
        } else {
            graph.node_count()
        }
    }

    fn index_len(seq: &[Vid]) -> usize {
        seq.iter().map(|vid| vid.index() + 1).max().unwrap_or(0)
    }

    /// Number of tree nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jnodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jnodes.is_empty()
    }

    /// Tree-node id of `vid`, or none if the vertex was never inserted.
    #[must_use]
    pub fn vid2jnid(&self, vid: Vid) -> Jnid {
        self.index
            .get(vid.index())
            .copied()
            .unwrap_or(Jnid::NONE)
    }

    /// Recovers the ordering actually inserted: position `id` holds the
    /// vertex eliminated at tree node `id`.
    #[must_use]
    pub fn get_sequence(&self) -> Vec<Vid> {
        let mut seq = vec![Vid::NONE; self.len()];
        for (vid, &id) in self.index.iter().enumerate() {
            if id.is_some() {
                seq[id.index()] = Vid(vid as u32);
            }
        }
        seq
    }

    fn set_index(&mut self, vid: Vid, id: Jnid) {
        debug_assert!(self.index[vid.index()].is_none());
        self.index[vid.index()] = id;
    }

    /* insertion */

    fn insert_sequence<G: Graph>(
        &mut self,
        graph: &G,
        seq: &[Vid],
        opts: TreeOptions,
    ) -> Result<()> {
        if opts.is_default() {
            for &x in seq {
                self.insert_plain(graph, x)?;
            }
        } else {
            self.insert_sequence_with(graph, seq, opts)?;
        }

        if opts.verbose {
            if self.len() < graph.node_count() {
                warn!("ordering is not a total order on the graph's vertices");
            } else if self.len() > graph.node_count() {
                warn!("ordering adds zero-degree vertices absent from the graph");
            }
        }
        Ok(())
    }

    /// Unparameterised insertion: parent links and post-weights only.
    fn insert_plain<G: Graph>(&mut self, graph: &G, x: Vid) -> Result<Jnid> {
        let current = self.jnodes.new_node()?;

        if graph.is_node(x) {
            for &nbr in graph.neighbours(x) {
                let nbr_id = self.vid2jnid(nbr);
                if nbr_id.is_some() {
                    self.jnodes.adopt(nbr_id, current);
                } else if nbr != x {
                    self.jnodes.add_post_weight(current, 1);
                }
            }
        }

        self.set_index(x, current);
        Ok(current)
    }

    /// Parameterised insertion. Returns `None` when the vertex blows the
    /// width limit and has been deferred; the node is deleted and no
    /// union-find state survives.
    fn insert_with<G: Graph>(
        &mut self,
        graph: &G,
        x: Vid,
        opts: TreeOptions,
    ) -> Result<Option<Jnid>> {
        let current = self.jnodes.new_node()?;
        let degree = if graph.is_node(x) { graph.degree(x) } else { 0 };
        if opts.make_kids {
            self.jnodes.new_kids(current, degree)?;
        }
        if opts.make_pst {
            self.jnodes.new_pst(current, degree)?;
        }

        let width_limit = opts.effective_width_limit();
        let mut aborted = false;

        if graph.is_node(x) {
            for &nbr in graph.neighbours(x) {
                let nbr_id = self.vid2jnid(nbr);

                if nbr_id.is_some() {
                    // Preorder edge.
                    if opts.make_kids {
                        self.jnodes.meet_kid(nbr_id, current, 1);
                    } else {
                        self.jnodes.adopt(nbr_id, current);
                    }
                } else if nbr != x {
                    // Postorder edge.
                    self.jnodes.add_post_weight(current, 1);
                    if self.jnodes.post_weight(current) as usize > width_limit {
                        aborted = true;
                        break;
                    }
                    if opts.make_pst {
                        self.jnodes.pst_push(current, nbr);
                    }
                }
            }
        }

        if !aborted && opts.make_pst {
            self.jnodes.clean_pst(current);
        }
        if !aborted && opts.make_jxn {
            match self.jnodes.new_union(current, x, width_limit) {
                Ok(()) => {}
                Err(CoreError::BudgetExceeded { .. }) => aborted = true,
                Err(fatal) => return Err(fatal),
            }
        }

        if aborted {
            self.jnodes.delete_last(current);
            return Ok(None);
        }

        // Irrevocable from here on; deferral is no longer possible.
        if opts.make_kids {
            self.jnodes.adopt_kids(current);
        }
        self.set_index(x, current);
        Ok(Some(current))
    }

    fn insert_sequence_with<G: Graph>(
        &mut self,
        graph: &G,
        seq: &[Vid],
        opts: TreeOptions,
    ) -> Result<()> {
        let mut wide_seq: Vec<Vid> = Vec::new();
        let mut current_width = 0usize;
        let mut position = 0usize;

        while position < seq.len() {
            let x = seq[position];
            if !opts.pad && !graph.is_node(x) {
                position += 1;
                continue;
            }
            if opts.verbose && self.len() % PROGRESS_INTERVAL == 0 {
                debug!(inserted = self.len(), deferred = wide_seq.len(), "building tree");
            }

            let current = self.insert_with(graph, x, opts)?;

            if opts.find_max_width {
                if let Some(id) = current {
                    current_width = current_width.max(self.jnodes.width(id));
                }
                // No later vertex can raise the width: each is either
                // deferred (hence at least this wide) or inside a clique
                // already observed.
                if current_width >= wide_seq.len() + (seq.len() - position) {
                    return Ok(());
                }
            }

            match current {
                None => wide_seq.push(x),
                Some(id)
                    if opts.do_rooting
                        && self.jnodes.width(id) == wide_seq.len() + (seq.len() - position) =>
                {
                    position += 1;
                    break;
                }
                Some(_) => {}
            }
            position += 1;
        }

        if !wide_seq.is_empty() || position < seq.len() {
            self.coalesce(graph, seq, position, &wide_seq, opts)?;
        }
        Ok(())
    }

    /// Trivial-coalesce phase: the first remaining vertex becomes a
    /// meta-node adopting every open root, and each further vertex stacks
    /// as a chain node above it with a junction set copied from below.
    fn coalesce<G: Graph>(
        &mut self,
        graph: &G,
        seq: &[Vid],
        mut position: usize,
        wide_seq: &[Vid],
        opts: TreeOptions,
    ) -> Result<()> {
        let mut wide_position = 0usize;
        let mut remaining = wide_seq.len() + (seq.len() - position) - 1;
        debug!(
            deferred = wide_seq.len(),
            remaining, "coalescing the residual suffix"
        );

        let x = if wide_position < wide_seq.len() {
            wide_position += 1;
            wide_seq[wide_position - 1]
        } else {
            position += 1;
            seq[position - 1]
        };
        let mut current = self.jnodes.new_node()?;

        self.jnodes.new_kids(current, self.jnodes.len())?;
        for kid in jnids(self.jnodes.len()) {
            if kid != current && self.jnodes.parent(kid).is_none() {
                self.jnodes.set_parent(kid, current);
                self.jnodes.kids_push(current, kid);
            }
        }
        self.jnodes.adopt_kids(current);

        self.push_unresolved_neighbours(graph, x, current)?;

        // The union is trivial: every vertex still standing belongs to it.
        let mut clique: Vec<Vid> = wide_seq[wide_position..]
            .iter()
            .chain(seq[position..].iter())
            .copied()
            .collect();
        clique.sort_unstable();
        self.jnodes.set_jxn(current, &clique)?;

        self.set_index(x, current);
        if opts.find_max_width {
            return Ok(());
        }

        while wide_position < wide_seq.len() || position < seq.len() {
            remaining -= 1;

            let x = if wide_position < wide_seq.len() {
                wide_position += 1;
                wide_seq[wide_position - 1]
            } else {
                position += 1;
                seq[position - 1]
            };
            let previous = current;
            current = self.jnodes.new_node()?;

            self.jnodes.new_kids(current, 1)?;
            self.jnodes.set_parent(previous, current);
            self.jnodes.kids_push(current, previous);
            self.jnodes.adopt_kids(current);

            self.push_unresolved_neighbours(graph, x, current)?;

            let clique: Vec<Vid> = self
                .jnodes
                .jxn(previous)
                .iter()
                .copied()
                .filter(|&vid| vid != x)
                .collect();
            self.jnodes.set_jxn(current, &clique)?;

            self.set_index(x, current);
        }

        debug_assert_eq!(remaining, 0);
        Ok(())
    }

    /// Fills `current`'s post-neighbour row with `x`'s not-yet-eliminated
    /// neighbours, counting post-weight as it goes.
    fn push_unresolved_neighbours<G: Graph>(
        &mut self,
        graph: &G,
        x: Vid,
        current: Jnid,
    ) -> Result<()> {
        let degree = if graph.is_node(x) { graph.degree(x) } else { 0 };
        self.jnodes.new_pst(current, degree)?;
        for &nbr in graph.neighbours(x) {
            if self.vid2jnid(nbr).is_none() && nbr != x {
                self.jnodes.add_post_weight(current, 1);
                self.jnodes.pst_push(current, nbr);
            }
        }
        self.jnodes.clean_pst(current);
        Ok(())
    }

    /* inspection */

    /// Checks the correctness properties of a finished build, most
    /// importantly that every graph edge's later endpoint appears in the
    /// junction set of every node on the tree path between the two
    /// endpoints.
    #[must_use]
    pub fn is_valid<G: Graph>(&self, graph: &G, seq: &[Vid], opts: TreeOptions) -> bool {
        let faq = self.jnodes.facts();

        let valid_indices = self.index.iter().filter(|id| id.is_some()).count();
        if valid_indices != faq.vert_cnt {
            return false;
        }

        for &x in seq {
            if !opts.pad && !graph.is_node(x) {
                continue;
            }

            let current = self.vid2jnid(x);
            if current.is_none() || current.index() >= self.len() {
                return false;
            }

            if opts.make_pst && self.jnodes.pst(current).binary_search(&x).is_ok() {
                return false;
            }
            if opts.make_jxn && self.jnodes.jxn(current).binary_search(&x).is_ok() {
                return false;
            }
            if opts.make_kids {
                for &kid in self.jnodes.kids(current) {
                    if self.jnodes.parent(kid) != current {
                        return false;
                    }
                }
            }

            if graph.is_node(x) {
                for &nbr in graph.neighbours(x) {
                    let mut nbr_id = self.vid2jnid(nbr);
                    if nbr_id.is_some() && nbr_id < current {
                        // Walk the tree upward; x must sit in every
                        // junction set along the way.
                        let mut step = 0u64;
                        while nbr_id != current {
                            if step > faq.vert_height
                                || nbr_id.is_none()
                                || nbr_id.index() >= self.len()
                            {
                                return false;
                            }
                            if opts.make_jxn
                                && self.jnodes.jxn(nbr_id).binary_search(&x).is_err()
                            {
                                return false;
                            }
                            nbr_id = self.jnodes.parent(nbr_id);
                            step += 1;
                        }
                    } else if nbr != x {
                        if opts.make_pst && self.jnodes.pst(current).binary_search(&nbr).is_err() {
                            return false;
                        }
                        if opts.make_jxn && self.jnodes.jxn(current).binary_search(&nbr).is_err() {
                            return false;
                        }
                    }
                }
            }

            let mut walker = current;
            let mut step = 0u64;
            while self.jnodes.parent(walker).is_some() {
                if step > faq.vert_height {
                    return false;
                }
                walker = self.jnodes.parent(walker);
                step += 1;
            }
        }
        true
    }

    /// Writes the graph relabelled through the isomorphism as `tail head`
    /// text lines, one per directed edge.
    ///
    /// # Errors
    /// [`CoreError::Io`] on write failure.
    pub fn write_isomorphism<G: Graph>(
        &self,
        graph: &G,
        path: &std::path::Path,
    ) -> Result<()> {
        use std::io::Write;

        let file = std::fs::File::create(path).map_err(|source| CoreError::io(path, source))?;
        let mut writer = std::io::BufWriter::new(file);
        let seq = self.get_sequence();
        for id in self.jnodes.ids() {
            for &nbr in graph.neighbours(seq[id.index()]) {
                let nbr_id = self.vid2jnid(nbr);
                debug_assert!(nbr_id.is_some());
                writeln!(writer, "{id} {nbr_id}").map_err(|source| CoreError::io(path, source))?;
            }
        }
        Ok(())
    }

    /// Dumps one line per node for debugging small trees.
    ///
    /// # Errors
    /// Propagates writer failures.
    pub fn dump(&self, mut writer: impl std::io::Write) -> std::io::Result<()> {
        let seq = self.get_sequence();
        for id in self.jnodes.ids() {
            writeln!(
                writer,
                "{:4}:{:<8} {:6}:w{:6}:pre{:6}:pst        ->[{}]",
                id.0,
                seq[id.index()].0,
                self.jnodes.width(id),
                self.jnodes.pre_weight(id),
                self.jnodes.post_weight(id),
                self.jnodes.parent(id),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjGraph;
    use rstest::rstest;

    fn vids(raw: &[u32]) -> Vec<Vid> {
        raw.iter().copied().map(Vid).collect()
    }

    fn full_opts() -> TreeOptions {
        TreeOptions::new().with_jxn(true)
    }

    #[test]
    fn option_implications_are_enforced() {
        let bare_jxn = TreeOptions {
            make_jxn: true,
            ..TreeOptions::default()
        };
        bare_jxn.validate().expect_err("jxn needs kids and pst");

        let bare_limit = TreeOptions::new().with_width_limit(Some(4));
        bare_limit.validate().expect_err("width limit needs jxn");

        full_opts()
            .with_width_limit(Some(4))
            .validate()
            .expect("builder enables the implied tables");
    }

    #[test]
    fn triangle_builds_the_expected_chain() {
        let graph = AdjGraph::from_edges(&[(0, 1), (0, 2), (1, 2)]);
        let seq = vids(&[0, 1, 2]);
        let tree = JTree::build(&graph, &seq, TreeOptions::default()).expect("build");

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.jnodes.parent(Jnid(0)), Jnid(1));
        assert_eq!(tree.jnodes.parent(Jnid(1)), Jnid(2));
        assert!(tree.jnodes.parent(Jnid(2)).is_none());
        assert_eq!(
            [0, 1, 2].map(|raw| tree.jnodes.post_weight(Jnid(raw))),
            [2, 1, 0]
        );
        assert_eq!([0, 1, 2].map(|raw| tree.jnodes.width(Jnid(raw))), [3, 2, 1]);
        assert_eq!(tree.jnodes.facts().fill, 0);
    }

    #[rstest]
    #[case::plain(TreeOptions::default())]
    #[case::tables(full_opts())]
    fn path_of_four_eliminates_endpoints_first(#[case] opts: TreeOptions) {
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2), (2, 3)]);
        let seq = vids(&[0, 3, 1, 2]);
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.vid2jnid(Vid(0)), Jnid(0));
        let facts = tree.jnodes.facts();
        assert_eq!(facts.edge_cnt, 3);
        assert_eq!(facts.width, 2);
        assert_eq!(facts.fill, 0);
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn four_clique_fills_nothing_and_has_one_root() {
        let graph = AdjGraph::from_edges(&[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        let seq = vids(&[0, 1, 2, 3]);
        let opts = full_opts();
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(
            [0, 1, 2, 3].map(|raw| tree.jnodes.post_weight(Jnid(raw))),
            [3, 2, 1, 0]
        );
        assert_eq!(
            [0, 1, 2, 3].map(|raw| tree.jnodes.width(Jnid(raw))),
            [4, 3, 2, 1]
        );
        let facts = tree.jnodes.facts();
        assert_eq!(facts.fill, 0);
        assert_eq!(facts.root_cnt, 1);
        assert_eq!(facts.halo_id, Jnid(0));
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn disconnected_pair_keeps_two_roots() {
        let graph = AdjGraph::from_edges(&[(0, 1), (2, 3)]);
        let seq = vids(&[0, 2, 1, 3]);
        let opts = full_opts();
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        let facts = tree.jnodes.facts();
        assert_eq!(facts.root_cnt, 2);
        assert_eq!(facts.width, 2);
        assert!(tree.jnodes.parent(Jnid(2)).is_none());
        assert!(tree.jnodes.parent(Jnid(3)).is_none());
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn path_fill_in_appears_for_a_bad_ordering() {
        // Eliminating the middle of a path first creates one fill edge.
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2)]);
        let seq = vids(&[1, 0, 2]);
        let opts = full_opts();
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.jnodes.jxn(Jnid(0)), vids(&[0, 2]).as_slice());
        assert_eq!(tree.jnodes.facts().fill, 1);
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn zero_degree_vertices_pad_only_when_asked() {
        let graph = AdjGraph::from_edges(&[(0, 1)]);
        let seq = vids(&[2, 0, 1]);

        let padded =
            JTree::build(&graph, &seq, full_opts()).expect("build");
        assert_eq!(padded.len(), 3);
        assert!(padded.vid2jnid(Vid(2)).is_some());

        let skipped = JTree::build(&graph, &seq, full_opts().with_pad(false)).expect("build");
        assert_eq!(skipped.len(), 2);
        assert!(skipped.vid2jnid(Vid(2)).is_none());
    }

    #[test]
    fn wide_vertex_is_deferred_and_coalesced() {
        // Star with centre 4; eliminating the centre first exceeds the
        // width limit, so it defers and returns as the top of the tree.
        let graph = AdjGraph::from_edges(&[(4, 0), (4, 1), (4, 2), (4, 3)]);
        let seq = vids(&[4, 0, 1, 2, 3]);
        let opts = full_opts().with_width_limit(Some(3));
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.len(), 5);
        // The deferred centre is eliminated after the leaves.
        let centre = tree.vid2jnid(Vid(4));
        assert_eq!(centre, Jnid(4));
        assert!(tree.jnodes.parent(centre).is_none());
        assert_eq!(tree.jnodes.kids(centre).len(), 4);
        assert_eq!(tree.jnodes.facts().root_cnt, 1);
        assert!(tree.is_valid(&graph, &tree.get_sequence(), opts));
    }

    #[test]
    fn width_limit_zero_defers_every_vertex() {
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2), (2, 3)]);
        let seq = vids(&[0, 3, 1, 2]);
        let opts = full_opts().with_width_limit(Some(0));
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        // Everything goes through the coalesce chain, in deferral order.
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.get_sequence(), vids(&[0, 3, 1, 2]));
        for position in 0..3u32 {
            assert_eq!(tree.jnodes.parent(Jnid(position)), Jnid(position + 1));
        }
        assert!(tree.is_valid(&graph, &tree.get_sequence(), opts));
    }

    #[test]
    fn rooting_coalesces_once_a_node_covers_the_remainder() {
        // 0-1 hangs off the 2-3-4-5 clique; after eliminating 0 and 1 the
        // next node's width equals the remaining vertex count.
        let graph = AdjGraph::from_edges(&[
            (0, 1),
            (1, 2),
            (2, 3),
            (2, 4),
            (2, 5),
            (3, 4),
            (3, 5),
            (4, 5),
        ]);
        let seq = vids(&[0, 1, 2, 3, 4, 5]);
        let opts = full_opts().with_rooting(true);
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.len(), 6);
        assert!(tree.is_valid(&graph, &seq, opts));
        // The suffix is a pure chain.
        for raw in 2..5u32 {
            assert_eq!(tree.jnodes.parent(Jnid(raw)), Jnid(raw + 1));
        }
    }

    #[test]
    fn find_max_width_stops_early_on_a_clique() {
        let graph = AdjGraph::from_edges(&[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        let seq = vids(&[0, 1, 2, 3]);
        let opts = full_opts().with_find_max_width(true);
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        // Node 0 observes width 4 == remaining, so the build stops there.
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.jnodes.width(Jnid(0)), 4);
    }

    #[test]
    fn self_edges_are_dropped() {
        let graph = AdjGraph::from_edges(&[(0, 0), (0, 1)]);
        let seq = vids(&[0, 1]);
        let opts = full_opts();
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.jnodes.post_weight(Jnid(0)), 1);
        assert_eq!(tree.jnodes.pst(Jnid(0)), vids(&[1]).as_slice());
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn duplicate_edges_collapse_in_the_post_neighbour_row() {
        // An un-deduplicated load keeps the parallel edge; cleaning the
        // post-neighbour row collapses it while the post-weight still
        // counts both copies.
        let mut reader =
            crate::edgeio::TextEdgeReader::from_reader(std::io::Cursor::new("0 1\n0 1\n"));
        let graph = AdjGraph::from_reader(&mut reader, false).expect("load");
        let seq = vids(&[0, 1]);
        let opts = full_opts();
        let tree = JTree::build(&graph, &seq, opts).expect("build");

        assert_eq!(tree.jnodes.post_weight(Jnid(0)), 2);
        assert_eq!(tree.jnodes.pst(Jnid(0)), vids(&[1]).as_slice());
        assert_eq!(tree.jnodes.jxn(Jnid(0)), vids(&[1]).as_slice());
        assert!(tree.is_valid(&graph, &seq, opts));
    }

    #[test]
    fn get_sequence_inverts_the_index() {
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2), (2, 3)]);
        let seq = vids(&[0, 3, 1, 2]);
        let tree = JTree::build(&graph, &seq, TreeOptions::default()).expect("build");
        assert_eq!(tree.get_sequence(), seq);
    }

    #[test]
    fn isomorphism_write_relabels_both_directions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("iso.net");
        let graph = AdjGraph::from_edges(&[(0, 1), (1, 2)]);
        let seq = vids(&[0, 2, 1]);
        let tree = JTree::build(&graph, &seq, TreeOptions::default()).expect("build");

        tree.write_isomorphism(&graph, &path).expect("write");
        let body = std::fs::read_to_string(&path).expect("read");
        let mut lines: Vec<&str> = body.lines().collect();
        lines.sort_unstable();
        // Vertex 1 is relabelled to 2; each undirected edge appears twice.
        assert_eq!(lines, ["0 2", "1 2", "2 0", "2 1"]);
    }

    #[test]
    fn partial_view_rewinds_the_build() {
        let graph = AdjGraph::from_edges(&[(0, 1), (0, 2), (1, 2)]);
        let seq = vids(&[0, 1, 2]);
        let tree = JTree::build(&graph, &seq, full_opts()).expect("build");

        let cut = JTree::partial(&tree, 2);
        assert_eq!(cut.len(), 2);
        assert!(cut.vid2jnid(Vid(2)).is_none());
        assert_eq!(cut.vid2jnid(Vid(1)), Jnid(1));
        // Node 1's parent pointed past the cut and is a root again.
        assert!(cut.jnodes.parent(Jnid(1)).is_none());
        assert_eq!(cut.jnodes.parent(Jnid(0)), Jnid(1));
    }

    #[test]
    fn validation_rejects_a_corrupted_parent() {
        let graph = AdjGraph::from_edges(&[(0, 1), (0, 2), (1, 2)]);
        let seq = vids(&[0, 1, 2]);
        let opts = full_opts();
        let mut tree = JTree::build(&graph, &seq, opts).expect("build");
        assert!(tree.is_valid(&graph, &seq, opts));

        // Reparenting 0 under the root skips node 1's junction set.
        tree.jnodes.set_parent(Jnid(0), Jnid(2));
        assert!(!tree.is_valid(&graph, &seq, opts));
    }
}
