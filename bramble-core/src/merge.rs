//! Bounded, deduplicating k-way merges of sorted vertex runs.
//!
//! All three variants produce the same output: the ascending union of the
//! input runs with one excluded element removed, failing with
//! [`CoreError::BudgetExceeded`] as soon as the output would grow past
//! `max_len`. The choice between them is purely a constant-factor matter:
//! balance-line wins for small run counts, the heap outscales it once the
//! run count grows, and the asymmetric splice exploits a pair of runs with
//! a large size imbalance.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

use crate::{
    error::{CoreError, Result},
    ids::Vid,
};

/// Run count at which the heap variant takes over from balance-line.
const HEAP_CUTOFF: usize = 32;
/// Size ratio at which a pair of runs is merged by binary-search splice.
const ASYMMETRY_CUTOFF: usize = 8;

/// A strictly ascending, partially consumed slice of vertex ids.
#[derive(Clone, Copy, Debug)]
pub struct SortedRun<'a> {
    data: &'a [Vid],
}

impl<'a> SortedRun<'a> {
    #[must_use]
    pub fn new(data: &'a [Vid]) -> Self {
        Self { data }
    }

    #[inline]
    fn head(&self) -> Option<Vid> {
        self.data.first().copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.data = &self.data[1..];
    }

    #[inline]
    fn is_exhausted(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for SortedRun<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.head() == other.head()
    }
}

impl Eq for SortedRun<'_> {}

impl PartialOrd for SortedRun<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortedRun<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.head().cmp(&other.head())
    }
}

/// Merges `runs`, dispatching on their count.
///
/// # Errors
/// [`CoreError::BudgetExceeded`] when the union (minus `exclude`) holds
/// more than `max_len` values; `out` is left partially filled and should
/// be discarded.
pub fn merge_runs(
    mut runs: Vec<SortedRun<'_>>,
    exclude: Vid,
    max_len: usize,
    out: &mut Vec<Vid>,
) -> Result<()> {
    if runs.len() == 2 {
        asymmetric_merge(&mut runs, exclude, max_len, out)
    } else if runs.len() < HEAP_CUTOFF {
        balance_line_merge(&mut runs, exclude, max_len, out)
    } else {
        heap_merge(runs, exclude, max_len, out)
    }
}

fn emit(out: &mut Vec<Vid>, value: Vid, max_len: usize) -> Result<()> {
    if out.len() + 1 > max_len {
        return Err(CoreError::BudgetExceeded { max_len });
    }
    out.push(value);
    Ok(())
}

/// Sliding-partition merge: scan the active runs for the minimum head,
/// emit it once, advance every run tied at it and swap exhausted runs past
/// the active boundary.
pub fn balance_line_merge(
    runs: &mut [SortedRun<'_>],
    exclude: Vid,
    max_len: usize,
    out: &mut Vec<Vid>,
) -> Result<()> {
    debug_assert!(runs.iter().all(|run| !run.is_empty()));
    let mut end = runs.len();

    while end > 0 {
        let mut min = Vid(u32::MAX);
        let mut first = 0;
        let mut last = 0;
        for (at, run) in runs[..end].iter().enumerate() {
            let head = run.head().expect("active runs are never exhausted");
            if head < min {
                min = head;
                first = at;
                last = at;
            } else if head == min {
                last = at;
            }
        }

        // Always need to exclude one elimination element.
        if min != exclude {
            emit(out, min, max_len)?;
        }

        let mut at = first;
        while at <= last && at < end {
            if runs[at].head() == Some(min) {
                runs[at].advance();
                if runs[at].is_exhausted() {
                    end -= 1;
                    runs.swap(at, end);
                    // Re-examine whichever run was swapped into `at`.
                    continue;
                }
            }
            at += 1;
        }
    }
    Ok(())
}

/// Priority-queue merge keyed by current head; each emit pops once and
/// re-pushes the run while it has elements left.
pub fn heap_merge(
    runs: Vec<SortedRun<'_>>,
    exclude: Vid,
    max_len: usize,
    out: &mut Vec<Vid>,
) -> Result<()> {
    let mut queue: BinaryHeap<Reverse<SortedRun<'_>>> =
        runs.into_iter().map(Reverse).collect();
    let mut prev = Vid::NONE;

    while let Some(Reverse(mut run)) = queue.pop() {
        let min = run.head().expect("exhausted runs are not re-pushed");
        run.advance();

        if min != exclude && min != prev {
            emit(out, min, max_len)?;
            prev = min;
        }

        if !run.is_exhausted() {
            queue.push(Reverse(run));
        }
    }
    Ok(())
}

/// Two-run merge that binary-searches the larger run by each element of
/// the smaller and splices the pieces. Falls back to balance-line below an
/// 8x size imbalance.
pub fn asymmetric_merge(
    runs: &mut [SortedRun<'_>],
    exclude: Vid,
    max_len: usize,
    out: &mut Vec<Vid>,
) -> Result<()> {
    assert_eq!(runs.len(), 2);
    let (mut big, mut small) = (runs[0], runs[1]);
    if big.len() < small.len() {
        std::mem::swap(&mut big, &mut small);
    }
    if big.len() < small.len() * ASYMMETRY_CUTOFF {
        return balance_line_merge(runs, exclude, max_len, out);
    }

    while let Some(value) = small.head() {
        small.advance();
        let splice = big.data.partition_point(|&v| v < value);
        for &v in &big.data[..splice] {
            if v != exclude {
                emit(out, v, max_len)?;
            }
        }
        big.data = &big.data[splice..];

        if value != exclude && big.head() != Some(value) {
            emit(out, value, max_len)?;
        }
    }

    for &v in big.data {
        if v != exclude {
            emit(out, v, max_len)?;
        }
    }
    Ok(())
}
