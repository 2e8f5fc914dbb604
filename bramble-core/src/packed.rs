//! Packed variable-length row storage.
//!
//! Every live row of a [`PackedTable`] occupies one contiguous slice of a
//! single growing arena, stored as an inline length prefix followed by the
//! row's elements. Row `i` starts at `offsets[i]`; a sentinel empty record
//! sits at offset 0 so that zero-length rows cost one `usize` each and any
//! number of them can alias the same record.
//!
//! Only the most recently appended row may change capacity (shrink or
//! delete); earlier rows are frozen in place but may still be pushed into
//! up to the capacity they reserved when appended. Because rows are
//! addressed by index rather than pointer, the arena is free to reallocate
//! as it grows; the byte budget is enforced logically at every
//! reservation.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    error::{CoreError, Result},
    ids::{Jnid, Vid},
};

/// Element of a packed row. The arena stores each row's length inline as
/// one element, so the type must round-trip a length.
pub trait PackedItem: Copy {
    fn encode_len(len: usize) -> Self;
    fn decode_len(self) -> usize;
}

impl PackedItem for Vid {
    fn encode_len(len: usize) -> Self {
        Vid(len as u32)
    }
    fn decode_len(self) -> usize {
        self.0 as usize
    }
}

impl PackedItem for Jnid {
    fn encode_len(len: usize) -> Self {
        Jnid(len as u32)
    }
    fn decode_len(self) -> usize {
        self.0 as usize
    }
}

/// Byte budget shared between arenas.
///
/// The post-neighbour and junction arenas of one node table draw from the
/// same allowance, so exhausting one starves the other; that is the
/// intended bound on combined set storage.
#[derive(Clone, Debug)]
pub struct ArenaBudget {
    remaining: Arc<AtomicUsize>,
    total: usize,
}

impl ArenaBudget {
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(bytes)),
            total: bytes,
        }
    }

    /// Total allowance the budget was created with.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Relaxed)
    }

    fn try_charge(&self, bytes: usize) -> bool {
        // Mutation is serial within one build; the atomic only provides
        // Sync for read-side parallelism.
        let left = self.remaining.load(Ordering::Relaxed);
        if bytes > left {
            return false;
        }
        self.remaining.store(left - bytes, Ordering::Relaxed);
        true
    }

    fn refund(&self, bytes: usize) {
        self.remaining.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Arena-allocated sequence of variable-length rows of `T`.
#[derive(Debug)]
pub struct PackedTable<T> {
    name: &'static str,
    arena: Vec<T>,
    offsets: Vec<usize>,
    budget: ArenaBudget,
    /// Reserved capacity per row, kept only to back debug assertions; the
    /// release layout carries no per-row capacity.
    #[cfg(debug_assertions)]
    caps: Vec<usize>,
}

impl<T: PackedItem> PackedTable<T> {
    /// A table that stores nothing. Reservations of zero-length rows
    /// succeed (they alias nothing); everything else reports
    /// `OutOfMemory`.
    #[must_use]
    pub fn disabled(name: &'static str) -> Self {
        Self {
            name,
            arena: Vec::new(),
            offsets: Vec::new(),
            budget: ArenaBudget::new(0),
            #[cfg(debug_assertions)]
            caps: Vec::new(),
        }
    }

    /// Self-sizing construction: one length prefix and one element per
    /// expected row. Sufficient for a child table, where every node is the
    /// child of at most one parent.
    #[must_use]
    pub fn with_rows(name: &'static str, max_rows: usize) -> Self {
        let bytes = (1 + 2 * max_rows) * std::mem::size_of::<T>();
        Self::with_budget(name, max_rows, ArenaBudget::new(bytes))
    }

    /// Construction against an explicit (possibly shared) byte budget.
    #[must_use]
    pub fn with_budget(name: &'static str, max_rows: usize, budget: ArenaBudget) -> Self {
        let mut table = Self {
            name,
            arena: Vec::new(),
            offsets: Vec::with_capacity(max_rows),
            budget,
            #[cfg(debug_assertions)]
            caps: Vec::with_capacity(max_rows),
        };
        if table.charge(1) {
            table.arena.push(T::encode_len(0));
        }
        table
    }

    /// Copies the first `rows` rows of `other` and the arena prefix they
    /// occupy; the remainder of the budget is untouched.
    #[must_use]
    pub fn partial(other: &Self, rows: usize) -> Self {
        let rows = rows.min(other.offsets.len());
        // The cut row may alias the sentinel, in which case the arena end
        // is carried by the next materialised row.
        let end = other.offsets[rows..]
            .iter()
            .copied()
            .find(|&offset| offset != 0)
            .unwrap_or(other.arena.len());
        let budget = ArenaBudget::new(other.budget.total());
        let charged = budget.try_charge(end * std::mem::size_of::<T>());
        debug_assert!(charged);
        Self {
            name: other.name,
            arena: other.arena[..end].to_vec(),
            offsets: other.offsets[..rows].to_vec(),
            budget,
            #[cfg(debug_assertions)]
            caps: other.caps[..rows].to_vec(),
        }
    }

    /// Number of rows, including sentinel-aliased empty ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Elements currently materialised in the arena.
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    fn charge(&mut self, elements: usize) -> bool {
        self.budget.try_charge(elements * std::mem::size_of::<T>())
    }

    fn refund(&mut self, elements: usize) {
        self.budget.refund(elements * std::mem::size_of::<T>());
    }

    /// Appends a row with capacity for up to `max_len` elements.
    ///
    /// With `require_max` the full reservation must fit the budget;
    /// without it, whatever fits is reserved and later pushes past the
    /// reduced capacity are the caller's bug to avoid (observed through
    /// [`Self::push`] debug assertions).
    ///
    /// # Errors
    /// Returns [`CoreError::OutOfMemory`] when the reservation cannot be
    /// satisfied. Nothing is silently truncated: a zero-length reservation
    /// always succeeds by aliasing the sentinel record.
    pub fn push_row(&mut self, max_len: usize, require_max: bool) -> Result<usize> {
        if max_len == 0 {
            self.offsets.push(0);
            #[cfg(debug_assertions)]
            self.caps.push(0);
            return Ok(self.offsets.len() - 1);
        }

        let remaining = self.budget.remaining() / std::mem::size_of::<T>();
        if remaining < 1 {
            return Err(self.out_of_memory());
        }
        let mut cap = max_len;
        if cap > remaining - 1 {
            if require_max {
                return Err(self.out_of_memory());
            }
            cap = remaining - 1;
        }
        let charged = self.charge(1 + cap);
        debug_assert!(charged);

        self.offsets.push(self.arena.len());
        self.arena.push(T::encode_len(0));
        self.arena
            .extend(std::iter::repeat(T::encode_len(0)).take(cap));
        #[cfg(debug_assertions)]
        self.caps.push(cap);
        Ok(self.offsets.len() - 1)
    }

    /// Appends a row holding exactly `values`.
    ///
    /// # Errors
    /// Returns [`CoreError::OutOfMemory`] when the row does not fit.
    pub fn push_row_from_slice(&mut self, values: &[T]) -> Result<usize> {
        let row = self.push_row(values.len(), true)?;
        if !values.is_empty() {
            let offset = self.offsets[row];
            self.arena[offset] = T::encode_len(values.len());
            self.arena[offset + 1..offset + 1 + values.len()].copy_from_slice(values);
        }
        Ok(row)
    }

    /// Pushes one element onto `row`, which must still have reserved
    /// capacity left.
    pub fn push(&mut self, row: usize, value: T) {
        let offset = self.offsets[row];
        let len = self.arena[offset].decode_len();
        #[cfg(debug_assertions)]
        debug_assert!(
            len < self.caps[row],
            "push past reserved capacity of {} row {row}",
            self.name
        );
        self.arena[offset] = T::encode_len(len + 1);
        self.arena[offset + 1 + len] = value;
    }

    /// The elements of `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> &[T] {
        let offset = self.offsets[row];
        let len = self.arena[offset].decode_len();
        &self.arena[offset + 1..offset + 1 + len]
    }

    /// Mutable view of `row`'s elements, for in-place sorting.
    #[must_use]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let offset = self.offsets[row];
        let len = self.arena[offset].decode_len();
        &mut self.arena[offset + 1..offset + 1 + len]
    }

    /// Drops elements of the last row beyond `len`. Reserved capacity is
    /// unchanged; pair with [`Self::shrink_last`] to reclaim it.
    pub fn truncate_last(&mut self, len: usize) {
        let row = self.offsets.len() - 1;
        let offset = self.offsets[row];
        if offset == 0 {
            debug_assert_eq!(len, 0);
            return;
        }
        debug_assert!(len <= self.arena[offset].decode_len());
        self.arena[offset] = T::encode_len(len);
    }

    /// Releases the last row's reserved-but-unused tail. A row shrunk to
    /// zero length is reclassified as the shared empty record.
    pub fn shrink_last(&mut self) {
        let row = self.offsets.len() - 1;
        let offset = self.offsets[row];
        if offset == 0 {
            return;
        }
        let len = self.arena[offset].decode_len();
        let reclaimed = if len != 0 {
            let end = offset + 1 + len;
            let unused = self.arena.len() - end;
            self.arena.truncate(end);
            #[cfg(debug_assertions)]
            {
                self.caps[row] = len;
            }
            unused
        } else {
            let unused = self.arena.len() - offset;
            self.arena.truncate(offset);
            self.offsets[row] = 0;
            #[cfg(debug_assertions)]
            {
                self.caps[row] = 0;
            }
            unused
        };
        self.refund(reclaimed);
    }

    /// Frees the most recently appended row entirely.
    pub fn delete_last(&mut self) {
        let offset = self.offsets.pop().expect("delete on empty table");
        if offset != 0 {
            self.refund(self.arena.len() - offset);
            self.arena.truncate(offset);
        }
        #[cfg(debug_assertions)]
        self.caps.pop();
    }

    fn out_of_memory(&self) -> CoreError {
        CoreError::OutOfMemory {
            table: self.name,
            budget: self.budget.total(),
        }
    }
}
