//! The tree-node table backing a chordal embedding.
//!
//! A [`JNodeTable`] owns the per-node parent pointers and edge weights,
//! three packed companion tables (children, post-neighbour sets, junction
//! sets) and the union-find that keeps neighbour-to-node redirection cheap
//! while the tree grows upward. Nodes live either in an owned heap arena
//! or in a memory-mapped file whose leading word records how many nodes
//! are live; dropping a mapped table writes that word back.
//!
//! The construction primitives mirror the elimination fold driven by
//! [`crate::JTree`]: nodes are appended strictly in order, only the last
//! node may be shrunk or deleted, and once a node has been unified into
//! the disjoint-set forest it can never be deleted (the fast union-find
//! does not support revocation).

use std::{
    fmt,
    fs::OpenOptions,
    path::Path,
};

use memmap2::MmapMut;
use tracing::debug;

use crate::{
    error::{CoreError, Result},
    ids::{jnids, Jnid, Vid},
    merge::{merge_runs, SortedRun},
    packed::{ArenaBudget, PackedTable},
    union_find::UnionFind,
};

/// One tree node: parent link plus post- and pre-order edge weights.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JNode {
    pub parent: Jnid,
    pub post_weight: u32,
    pub pre_weight: u32,
}

impl Default for JNode {
    fn default() -> Self {
        Self {
            parent: Jnid::NONE,
            post_weight: 0,
            pre_weight: 0,
        }
    }
}

/// On-disk size of one node: three little-endian `u32`s.
pub const NODE_BYTES: usize = 12;
/// On-disk size of the `end` header preceding the node array.
const HEADER_BYTES: usize = 4;

enum NodeStore {
    Owned(Vec<JNode>),
    Mapped(MmapMut),
}

impl NodeStore {
    fn get(&self, index: usize) -> JNode {
        match self {
            Self::Owned(nodes) => nodes[index],
            Self::Mapped(map) => {
                let at = HEADER_BYTES + index * NODE_BYTES;
                JNode {
                    parent: Jnid(read_u32(map, at)),
                    post_weight: read_u32(map, at + 4),
                    pre_weight: read_u32(map, at + 8),
                }
            }
        }
    }

    fn set(&mut self, index: usize, node: JNode) {
        match self {
            Self::Owned(nodes) => {
                if index == nodes.len() {
                    nodes.push(node);
                } else {
                    nodes[index] = node;
                }
            }
            Self::Mapped(map) => {
                let at = HEADER_BYTES + index * NODE_BYTES;
                write_u32(map, at, node.parent.0);
                write_u32(map, at + 4, node.post_weight);
                write_u32(map, at + 8, node.pre_weight);
            }
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().expect("4-byte field"))
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Array of tree nodes with packed child/post-neighbour/junction tables.
pub struct JNodeTable {
    store: NodeStore,
    end: usize,
    max: usize,
    kids: PackedTable<Jnid>,
    pst: PackedTable<Vid>,
    jxn: PackedTable<Vid>,
    roots: UnionFind,
    union_scratch: Vec<Vid>,
}

impl JNodeTable {
    /// An owned table with room for `max_nodes` nodes. `memory_limit`
    /// bounds the *combined* post-neighbour and junction arena bytes; pass
    /// zero when neither table will be populated.
    #[must_use]
    pub fn new(max_nodes: usize, init_kids: bool, memory_limit: usize) -> Self {
        let budget = ArenaBudget::new(memory_limit);
        Self {
            store: NodeStore::Owned(Vec::with_capacity(max_nodes)),
            end: 0,
            max: max_nodes,
            kids: if init_kids {
                PackedTable::with_rows("kids", max_nodes)
            } else {
                PackedTable::disabled("kids")
            },
            pst: PackedTable::with_budget("pst", max_nodes, budget.clone()),
            jxn: PackedTable::with_budget("jxn", max_nodes, budget),
            roots: UnionFind::new(max_nodes),
            union_scratch: Vec::new(),
        }
    }

    /// A table persisted to `path` as it is built: the file holds a `u32`
    /// node count followed by `max_nodes` node records and is written
    /// through a shared mapping. Workers must use distinct paths.
    ///
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be created, sized or mapped.
    pub fn create_mapped(
        path: &Path,
        max_nodes: usize,
        init_kids: bool,
        memory_limit: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| CoreError::io(path, source))?;
        file.set_len((HEADER_BYTES + max_nodes * NODE_BYTES) as u64)
            .map_err(|source| CoreError::io(path, source))?;
        // SAFETY: the mapping is private to this table for its lifetime;
        // concurrent external mutation of the backing file is excluded by
        // the one-path-per-worker policy.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| CoreError::io(path, source))?;

        let budget = ArenaBudget::new(memory_limit);
        Ok(Self {
            store: NodeStore::Mapped(map),
            end: 0,
            max: max_nodes,
            kids: if init_kids {
                PackedTable::with_rows("kids", max_nodes)
            } else {
                PackedTable::disabled("kids")
            },
            pst: PackedTable::with_budget("pst", max_nodes, budget.clone()),
            jxn: PackedTable::with_budget("jxn", max_nodes, budget),
            roots: UnionFind::new(max_nodes),
            union_scratch: Vec::new(),
        })
    }

    /// Opens a previously saved tree file and lazily rebuilds the child
    /// table from the parent pointers.
    ///
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be opened or mapped.
    pub fn load(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CoreError::io(path, source))?;
        let bytes = file
            .metadata()
            .map_err(|source| CoreError::io(path, source))?
            .len() as usize;
        let max = bytes.saturating_sub(HEADER_BYTES) / NODE_BYTES;
        // SAFETY: as in `create_mapped`; the mapping is exclusive.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| CoreError::io(path, source))?;
        let end = read_u32(&map, 0) as usize;

        let mut table = Self {
            store: NodeStore::Mapped(map),
            end,
            max,
            kids: PackedTable::disabled("kids"),
            pst: PackedTable::disabled("pst"),
            jxn: PackedTable::disabled("jxn"),
            roots: UnionFind::new(0),
            union_scratch: Vec::new(),
        };
        table.make_kids()?;
        debug!(nodes = table.end, capacity = table.max, "opened tree file");
        Ok(table)
    }

    /// Rebuilds `other`'s state as it was after the first `partial_end`
    /// insertions: later nodes are dropped, parent pointers into the
    /// dropped suffix are cleared, and the disjoint sets are re-derived.
    #[must_use]
    pub fn partial(other: &Self, partial_end: usize) -> Self {
        let end = partial_end.min(other.end);
        let mut nodes = Vec::with_capacity(other.max);
        for index in 0..end {
            nodes.push(other.store.get(index));
        }
        let mut table = Self {
            store: NodeStore::Owned(nodes),
            end,
            max: other.max,
            kids: PackedTable::partial(&other.kids, end),
            pst: PackedTable::partial(&other.pst, end),
            jxn: PackedTable::partial(&other.jxn, end),
            roots: UnionFind::new(other.max),
            union_scratch: Vec::new(),
        };
        for id in jnids(end) {
            let parent = table.parent(id);
            if parent.is_some() && parent.index() < end {
                table.roots.unify(id, parent);
            } else if parent.is_some() {
                table.set_parent(id, Jnid::NONE);
            }
        }
        table
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Configured node capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Iterates live node ids in ascending order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = Jnid> {
        jnids(self.end)
    }

    /// Appends a fresh parentless node.
    ///
    /// # Errors
    /// [`CoreError::Capacity`] once the configured capacity is reached.
    pub fn new_node(&mut self) -> Result<Jnid> {
        if self.end == self.max {
            return Err(CoreError::Capacity { cap: self.max });
        }
        self.store.set(self.end, JNode::default());
        self.end += 1;
        Ok(Jnid::from_index(self.end - 1))
    }

    /// Removes the most recent node together with its companion rows and
    /// unlinks its children. Must not be called once the node has been
    /// unified into the disjoint-set forest.
    pub fn delete_last(&mut self, id: Jnid) {
        debug_assert_eq!(id.index() + 1, self.end);

        if self.kids.len() == self.end {
            for index in 0..self.kids.row(id.index()).len() {
                let kid = self.kids.row(id.index())[index];
                self.set_parent(kid, Jnid::NONE);
                self.set_pre_weight(kid, 0);
            }
            self.kids.delete_last();
        }
        if self.pst.len() == self.end {
            self.pst.delete_last();
        }
        if self.jxn.len() == self.end {
            self.jxn.delete_last();
        }
        self.end -= 1;
    }

    /* node field access */

    #[must_use]
    pub fn parent(&self, id: Jnid) -> Jnid {
        self.store.get(id.index()).parent
    }

    pub fn set_parent(&mut self, id: Jnid, parent: Jnid) {
        let mut node = self.store.get(id.index());
        node.parent = parent;
        self.store.set(id.index(), node);
    }

    #[must_use]
    pub fn post_weight(&self, id: Jnid) -> u32 {
        self.store.get(id.index()).post_weight
    }

    pub fn add_post_weight(&mut self, id: Jnid, weight: u32) {
        let mut node = self.store.get(id.index());
        node.post_weight += weight;
        self.store.set(id.index(), node);
    }

    #[must_use]
    pub fn pre_weight(&self, id: Jnid) -> u32 {
        self.store.get(id.index()).pre_weight
    }

    pub fn set_pre_weight(&mut self, id: Jnid, weight: u32) {
        let mut node = self.store.get(id.index());
        node.pre_weight = weight;
        self.store.set(id.index(), node);
    }

    pub fn add_pre_weight(&mut self, id: Jnid, weight: u32) {
        let mut node = self.store.get(id.index());
        node.pre_weight += weight;
        self.store.set(id.index(), node);
    }

    #[must_use]
    pub fn node(&self, id: Jnid) -> JNode {
        self.store.get(id.index())
    }

    /* tree construction */

    /// Merges `kid`'s set into `id`'s and, unless the two were already
    /// merged, points the lesser set's old top at `id`. Idempotent; a
    /// node adopted this way can no longer be deleted.
    pub fn adopt(&mut self, kid: Jnid, id: Jnid) {
        let kid = self.roots.unify(kid, id);
        if kid != id {
            self.set_parent(kid, id);
        }
    }

    /// Reserves the child row of `id`. Children never outnumber nodes, so
    /// the reservation is best-effort against the self-sized child arena.
    ///
    /// # Errors
    /// [`CoreError::OutOfMemory`] when even a header does not fit.
    pub fn new_kids(&mut self, id: Jnid, max_size: usize) -> Result<()> {
        let row = self.kids.push_row(max_size, false)?;
        debug_assert_eq!(row, id.index());
        Ok(())
    }

    #[must_use]
    pub fn kids(&self, id: Jnid) -> &[Jnid] {
        self.kids.row(id.index())
    }

    /// Mutable child row, for partitioners that reorder children in
    /// place.
    #[must_use]
    pub fn kids_mut(&mut self, id: Jnid) -> &mut [Jnid] {
        self.kids.row_mut(id.index())
    }

    /// Appends directly to `id`'s child row. The caller links the parent
    /// pointer itself; normal construction goes through
    /// [`Self::meet_kid`].
    pub fn kids_push(&mut self, id: Jnid, kid: Jnid) {
        self.kids.push(id.index(), kid);
    }

    /// Accumulates a preorder edge: finds the current top of `kid`'s set,
    /// adds `weight` to its pre-weight, and links it under `id` the first
    /// time the set is met.
    pub fn meet_kid(&mut self, kid: Jnid, id: Jnid, weight: u32) {
        let kid = self.roots.find(kid);
        self.add_pre_weight(kid, weight);

        if self.parent(kid) != id {
            self.set_parent(kid, id);
            self.kids.push(id.index(), kid);
        }
    }

    /// Freezes `id`'s child set: releases the unused reservation and
    /// unifies every child into `id`'s set. After this the node is
    /// irrevocable.
    pub fn adopt_kids(&mut self, id: Jnid) {
        self.kids.shrink_last();
        let row = id.index();
        for index in 0..self.kids.row(row).len() {
            let kid = self.kids.row(row)[index];
            self.roots.unify(kid, id);
        }
    }

    /// (Re)builds the child table from the parent pointers in two passes:
    /// size every row, then fill them. Any existing child table is
    /// discarded first.
    ///
    /// # Errors
    /// [`CoreError::OutOfMemory`] when the child arena cannot hold the
    /// rows, which indicates a corrupt parent array.
    pub fn make_kids(&mut self) -> Result<()> {
        self.kids = PackedTable::with_rows("kids", self.max);
        let mut kids_size = vec![0usize; self.end];
        // Children precede their parents, so by the time a row is created
        // every child of that node has been counted.
        for id in self.ids() {
            self.new_kids(id, kids_size[id.index()])?;
            let parent = self.parent(id);
            if parent.is_some() {
                kids_size[parent.index()] += 1;
            }
        }
        for id in self.ids() {
            let parent = self.parent(id);
            if parent.is_some() {
                self.kids.push(parent.index(), id);
            }
        }
        Ok(())
    }

    /* post-neighbour rows */

    /// Reserves the post-neighbour row of `id`.
    ///
    /// # Errors
    /// [`CoreError::OutOfMemory`] when the shared set arena is exhausted.
    pub fn new_pst(&mut self, id: Jnid, max_size: usize) -> Result<()> {
        let row = self.pst.push_row(max_size, true)?;
        debug_assert_eq!(row, id.index());
        Ok(())
    }

    #[must_use]
    pub fn pst(&self, id: Jnid) -> &[Vid] {
        self.pst.row(id.index())
    }

    pub fn pst_push(&mut self, id: Jnid, neighbour: Vid) {
        self.pst.push(id.index(), neighbour);
    }

    /// Sorts and deduplicates `id`'s post-neighbour row, then releases the
    /// unused reservation.
    pub fn clean_pst(&mut self, id: Jnid) {
        let row = self.pst.row_mut(id.index());
        row.sort_unstable();
        let unique = dedup_len(row);
        self.pst.truncate_last(unique);
        self.pst.shrink_last();
    }

    /* junction rows */

    #[must_use]
    pub fn jxn(&self, id: Jnid) -> &[Vid] {
        self.jxn.row(id.index())
    }

    /// Whether `id` has a junction row (tables built without junction sets
    /// never do).
    #[must_use]
    pub fn has_jxn(&self, id: Jnid) -> bool {
        id.index() < self.jxn.len()
    }

    /// Stores a pre-computed junction row for `id`. Used by the trivial
    /// coalesce phase, where the union is known without merging.
    ///
    /// # Errors
    /// [`CoreError::OutOfMemory`] when the shared set arena is exhausted.
    pub fn set_jxn(&mut self, id: Jnid, values: &[Vid]) -> Result<()> {
        let row = self.jxn.push_row_from_slice(values)?;
        debug_assert_eq!(row, id.index());
        Ok(())
    }

    /// Builds `id`'s junction set as the bounded union of every child's
    /// junction row and `id`'s own post-neighbour row, excluding the
    /// eliminated vertex itself. On failure no junction row remains and
    /// the caller may delete the node.
    ///
    /// # Errors
    /// [`CoreError::BudgetExceeded`] when the union would exceed
    /// `max_len`; [`CoreError::OutOfMemory`] when the set arena cannot
    /// hold the result.
    pub fn new_union(&mut self, id: Jnid, exclude: Vid, max_len: usize) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.union_scratch);
        scratch.clear();

        let mut runs = Vec::with_capacity(self.kids(id).len() + 1);
        for &kid in self.kids.row(id.index()) {
            let row = self.jxn.row(kid.index());
            if !row.is_empty() {
                runs.push(SortedRun::new(row));
            }
        }
        let own = self.pst.row(id.index());
        if !own.is_empty() {
            runs.push(SortedRun::new(own));
        }

        let merged = merge_runs(runs, exclude, max_len, &mut scratch);
        let result = match merged {
            Ok(()) => self.set_jxn(id, &scratch),
            Err(err) => Err(err),
        };
        self.union_scratch = scratch;
        result
    }

    /// Clique size of the vertex eliminated at `id`: one more than the
    /// junction set when present, else one more than the post-weight.
    #[must_use]
    pub fn width(&self, id: Jnid) -> usize {
        1 + if self.has_jxn(id) {
            self.jxn(id).len()
        } else {
            self.post_weight(id) as usize
        }
    }

    /* merge and persistence */

    /// Pairwise merge of two equally sized tables into `self`, summing
    /// post-weights and re-deriving parent pointers through the
    /// disjoint-set forest. With `make_kids` the child table and
    /// pre-weights are carried as well.
    ///
    /// # Errors
    /// [`CoreError::Capacity`] or [`CoreError::OutOfMemory`] when `self`
    /// was sized smaller than the inputs; [`CoreError::Invariant`] when
    /// the inputs disagree on size.
    pub fn merge(&mut self, lhs: &JNodeTable, rhs: &JNodeTable, make_kids: bool) -> Result<()> {
        if lhs.len() != rhs.len() {
            return Err(CoreError::Invariant {
                detail: format!("merging trees of unequal size {} and {}", lhs.len(), rhs.len()),
            });
        }

        for index in 0..lhs.len() {
            let current = self.new_node()?;
            debug_assert_eq!(current.index(), index);

            if make_kids {
                self.new_kids(
                    current,
                    lhs.kids(current).len() + rhs.kids(current).len(),
                )?;
            }

            for src in [lhs, rhs] {
                for position in 0..src.kids(current).len() {
                    let kid = src.kids(current)[position];
                    if make_kids {
                        self.meet_kid(kid, current, src.pre_weight(kid));
                    } else {
                        self.adopt(kid, current);
                    }
                }
                self.add_post_weight(current, src.post_weight(current));
            }

            if make_kids {
                self.adopt_kids(current);
            }
        }
        Ok(())
    }

    /// Writes the table as a tree file: the live node count followed by
    /// `capacity` node records.
    ///
    /// # Errors
    /// [`CoreError::Io`] on any write failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        use std::io::Write;

        let file = std::fs::File::create(path).map_err(|source| CoreError::io(path, source))?;
        let mut writer = std::io::BufWriter::new(file);
        let io = |source| CoreError::io(path, source);

        writer.write_all(&(self.end as u32).to_le_bytes()).map_err(io)?;
        for index in 0..self.max {
            let node = if index < self.end {
                self.store.get(index)
            } else {
                JNode::default()
            };
            writer.write_all(&node.parent.0.to_le_bytes()).map_err(io)?;
            writer.write_all(&node.post_weight.to_le_bytes()).map_err(io)?;
            writer.write_all(&node.pre_weight.to_le_bytes()).map_err(io)?;
        }
        writer.flush().map_err(io)
    }

    /// Summarises the tree in one ascending sweep.
    #[must_use]
    pub fn facts(&self) -> Facts {
        Facts::new(self)
    }
}

impl Drop for JNodeTable {
    fn drop(&mut self) {
        if let NodeStore::Mapped(map) = &mut self.store {
            write_u32(map, 0, self.end as u32);
        }
    }
}

impl fmt::Debug for JNodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JNodeTable")
            .field("end", &self.end)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// Copies the unique elements of a sorted slice to its front and returns
/// their count.
fn dedup_len<T: Copy + PartialEq>(sorted: &mut [T]) -> usize {
    let mut unique = 0;
    for index in 0..sorted.len() {
        if unique == 0 || sorted[index] != sorted[unique - 1] {
            sorted[unique] = sorted[index];
            unique += 1;
        }
    }
    unique
}

/// Aggregate figures computed by a single ascending sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Facts {
    pub vert_cnt: usize,
    pub edge_cnt: usize,
    pub width: usize,
    pub fill: u64,
    pub vert_height: u64,
    pub edge_height: u64,
    pub root_cnt: usize,
    /// First node whose width exceeds 3.
    pub halo_id: Jnid,
    /// First node reaching the maximum width.
    pub core_id: Jnid,
}

impl Facts {
    fn new(jnodes: &JNodeTable) -> Self {
        let mut facts = Self {
            vert_cnt: 0,
            edge_cnt: 0,
            width: 0,
            fill: 0,
            vert_height: 0,
            edge_height: 0,
            root_cnt: 0,
            halo_id: Jnid::NONE,
            core_id: Jnid::NONE,
        };

        let mut vheight = vec![0u64; jnodes.len()];
        let mut eheight = vec![0u64; jnodes.len()];

        // Ascending pass; heights flow towards the roots.
        for id in jnodes.ids() {
            let parent = jnodes.parent(id);
            let width = jnodes.width(id);
            let post = jnodes.post_weight(id) as usize;

            facts.vert_cnt += 1;
            facts.edge_cnt += post;
            facts.width = facts.width.max(width);
            facts.fill += width.saturating_sub(post + 1) as u64;

            vheight[id.index()] += 1;
            eheight[id.index()] += post as u64;
            if parent.is_some() {
                vheight[parent.index()] = vheight[parent.index()].max(vheight[id.index()]);
                eheight[parent.index()] = eheight[parent.index()].max(eheight[id.index()]);
            } else {
                facts.vert_height = facts.vert_height.max(vheight[id.index()]);
                facts.edge_height = facts.edge_height.max(eheight[id.index()]);
                facts.root_cnt += 1;
            }

            if facts.halo_id.is_none() && width > 3 {
                facts.halo_id = id;
            }
            if facts.core_id.is_none() && width >= facts.width {
                facts.core_id = id;
            }
        }
        facts
    }
}

impl fmt::Display for Facts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TREEFAQS: width:{}\troots:{}", self.width, self.root_cnt)?;
        writeln!(
            f,
            "\tvheight:{}\teheight:{}",
            self.vert_height, self.edge_height
        )?;
        writeln!(f, "\tverts:{}\tedges:{}", self.vert_cnt, self.edge_cnt)?;
        writeln!(f, "\thalo:{}\tcore:{}", self.halo_id, self.core_id)?;
        write!(f, "\tfill:{}", self.fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Three-node chain 0 -> 1 -> 2 with post-weights [2, 1, 0], the shape
    /// a triangle eliminates into.
    fn chain3() -> JNodeTable {
        let mut jnodes = JNodeTable::new(3, false, 0);
        for expected in 0..3u32 {
            let id = jnodes.new_node().expect("capacity");
            assert_eq!(id, Jnid(expected));
        }
        jnodes.adopt(Jnid(0), Jnid(1));
        jnodes.adopt(Jnid(1), Jnid(2));
        jnodes.add_post_weight(Jnid(0), 2);
        jnodes.add_post_weight(Jnid(1), 1);
        jnodes
    }

    #[test]
    fn new_node_respects_capacity() {
        let mut jnodes = JNodeTable::new(1, false, 0);
        jnodes.new_node().expect("first node fits");
        let err = jnodes.new_node().expect_err("capacity is fixed");
        assert_eq!(err.code(), crate::error::CoreErrorCode::Capacity);
    }

    #[test]
    fn adopt_points_the_old_set_top_at_the_parent() {
        let jnodes = chain3();
        assert_eq!(jnodes.parent(Jnid(0)), Jnid(1));
        assert_eq!(jnodes.parent(Jnid(1)), Jnid(2));
        assert!(jnodes.parent(Jnid(2)).is_none());
    }

    #[test]
    fn adopt_through_a_merged_set_links_its_top_exactly_once() {
        let mut jnodes = JNodeTable::new(4, false, 0);
        for _ in 0..4 {
            jnodes.new_node().expect("capacity");
        }
        // 0 and 1 merge under 2; a later edge from 0 must redirect to the
        // set top, not re-link 0.
        jnodes.adopt(Jnid(0), Jnid(2));
        jnodes.adopt(Jnid(1), Jnid(2));
        jnodes.adopt(Jnid(0), Jnid(3));
        assert_eq!(jnodes.parent(Jnid(0)), Jnid(2));
        assert_eq!(jnodes.parent(Jnid(2)), Jnid(3));
    }

    #[test]
    fn make_kids_inverts_the_parent_relation() {
        let mut jnodes = chain3();
        jnodes.make_kids().expect("child arena is self-sized");
        assert!(jnodes.kids(Jnid(0)).is_empty());
        assert_eq!(jnodes.kids(Jnid(1)), &[Jnid(0)]);
        assert_eq!(jnodes.kids(Jnid(2)), &[Jnid(1)]);
    }

    #[test]
    fn facts_summarise_the_triangle_chain() {
        let jnodes = chain3();
        let facts = jnodes.facts();
        assert_eq!(facts.vert_cnt, 3);
        assert_eq!(facts.edge_cnt, 3);
        assert_eq!(facts.width, 3);
        assert_eq!(facts.fill, 0);
        assert_eq!(facts.root_cnt, 1);
        assert_eq!(facts.vert_height, 3);
        assert_eq!(facts.edge_height, 3);
        assert!(facts.halo_id.is_none());
        assert_eq!(facts.core_id, Jnid(0));
    }

    #[test]
    fn facts_count_each_root_once() {
        let mut jnodes = JNodeTable::new(4, false, 0);
        for _ in 0..4 {
            jnodes.new_node().expect("capacity");
        }
        jnodes.adopt(Jnid(0), Jnid(2));
        jnodes.adopt(Jnid(1), Jnid(3));
        jnodes.add_post_weight(Jnid(0), 1);
        jnodes.add_post_weight(Jnid(1), 1);
        let facts = jnodes.facts();
        assert_eq!(facts.root_cnt, 2);
        assert_eq!(facts.width, 2);
        assert_eq!(facts.vert_height, 2);
    }

    #[test]
    fn delete_last_unlinks_children_and_rows() {
        let mut jnodes = JNodeTable::new(3, true, 1024);
        let a = jnodes.new_node().expect("capacity");
        jnodes.new_kids(a, 0).expect("kids row");
        jnodes.new_pst(a, 0).expect("pst row");
        let b = jnodes.new_node().expect("capacity");
        jnodes.new_kids(b, 1).expect("kids row");
        jnodes.new_pst(b, 0).expect("pst row");
        jnodes.meet_kid(a, b, 1);

        assert_eq!(jnodes.parent(a), b);
        assert_eq!(jnodes.pre_weight(a), 1);
        jnodes.delete_last(b);
        assert_eq!(jnodes.len(), 1);
        assert!(jnodes.parent(a).is_none());
        assert_eq!(jnodes.pre_weight(a), 0);
    }

    #[test]
    fn new_union_merges_child_cliques_with_own_neighbours() {
        let mut jnodes = JNodeTable::new(2, true, 4096);
        let a = jnodes.new_node().expect("capacity");
        jnodes.new_kids(a, 0).expect("kids row");
        jnodes.new_pst(a, 2).expect("pst row");
        jnodes.pst_push(a, Vid(1));
        jnodes.pst_push(a, Vid(2));
        jnodes.clean_pst(a);
        jnodes.new_union(a, Vid(0), usize::MAX).expect("fits");
        assert_eq!(jnodes.jxn(a), &[Vid(1), Vid(2)]);

        let b = jnodes.new_node().expect("capacity");
        jnodes.new_kids(b, 1).expect("kids row");
        jnodes.new_pst(b, 1).expect("pst row");
        jnodes.pst_push(b, Vid(2));
        jnodes.clean_pst(b);
        jnodes.meet_kid(a, b, 1);
        jnodes.adopt_kids(b);
        // Child clique {1, 2} union own {2}, minus vertex 1 itself.
        jnodes.new_union(b, Vid(1), usize::MAX).expect("fits");
        assert_eq!(jnodes.jxn(b), &[Vid(2)]);
        assert_eq!(jnodes.width(b), 2);
    }

    #[rstest]
    #[case::tight(1)]
    #[case::roomy(8)]
    fn new_union_budget_failure_leaves_no_row(#[case] max_len: usize) {
        let mut jnodes = JNodeTable::new(1, true, 4096);
        let a = jnodes.new_node().expect("capacity");
        jnodes.new_kids(a, 0).expect("kids row");
        jnodes.new_pst(a, 3).expect("pst row");
        for raw in [3u32, 5, 9] {
            jnodes.pst_push(a, Vid(raw));
        }
        jnodes.clean_pst(a);
        let result = jnodes.new_union(a, Vid(0), max_len);
        if max_len < 3 {
            result.expect_err("three survivors cannot fit");
            assert!(!jnodes.has_jxn(a));
        } else {
            result.expect("fits");
            assert_eq!(jnodes.jxn(a).len(), 3);
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chain.tree");
        let jnodes = chain3();
        jnodes.save(&path).expect("save");

        let loaded = JNodeTable::load(&path).expect("load");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.capacity(), 3);
        for id in jnodes.ids() {
            assert_eq!(loaded.node(id), jnodes.node(id));
        }
        // The child table is rebuilt lazily on open.
        assert_eq!(loaded.kids(Jnid(2)), &[Jnid(1)]);
    }

    #[test]
    fn mapped_tables_persist_end_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("build.tree");
        {
            let mut jnodes =
                JNodeTable::create_mapped(&path, 4, false, 0).expect("create mapped");
            jnodes.new_node().expect("capacity");
            jnodes.new_node().expect("capacity");
            jnodes.add_post_weight(Jnid(0), 7);
        }
        let loaded = JNodeTable::load(&path).expect("reopen");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.capacity(), 4);
        assert_eq!(loaded.post_weight(Jnid(0)), 7);
    }

    #[test]
    fn merge_with_an_empty_peer_preserves_weights() {
        let mut lhs = chain3();
        lhs.make_kids().expect("child arena is self-sized");
        let mut rhs = JNodeTable::new(3, false, 0);
        for _ in 0..3 {
            rhs.new_node().expect("capacity");
        }
        rhs.make_kids().expect("child arena is self-sized");

        let mut merged = JNodeTable::new(3, false, 0);
        merged.merge(&lhs, &rhs, false).expect("sizes match");
        for id in lhs.ids() {
            assert_eq!(merged.post_weight(id), lhs.post_weight(id));
            assert_eq!(merged.parent(id), lhs.parent(id));
        }
    }

    #[test]
    fn merge_rejects_unequal_sizes() {
        let lhs = chain3();
        let mut rhs = JNodeTable::new(2, false, 0);
        rhs.new_node().expect("capacity");
        let mut merged = JNodeTable::new(3, false, 0);
        let err = merged.merge(&lhs, &rhs, false).expect_err("sizes differ");
        assert_eq!(err.code(), crate::error::CoreErrorCode::Invariant);
    }
}
