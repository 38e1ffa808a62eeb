#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::hash::Hasher;

use hashbrown::hash_table::{Entry, HashTable};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use rf_frame::{ColSelector, FrameError, RowRef, Table};
use rf_types::{Value, render_row, row_hash};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("an index requires at least one column")]
    EmptySelector,
    #[error("index column {col} is out of range ({cols} columns)")]
    ColOutOfRange { col: usize, cols: usize },
    #[error("duplicate key {key} at row {row} while building a unique hash index on [{columns}]")]
    DuplicateKey {
        key: String,
        columns: String,
        row: usize,
    },
    #[error("search window [{pos}, {end}) exceeds index length {len}")]
    WindowOutOfRange { pos: usize, end: usize, len: usize },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// The four concrete index shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Hash,
    HashMulti,
    Ordered,
    ReverseOrdered,
}

/// The equivalence class a catalogue looks an index up by: the two hash
/// shapes collapse into one slot per column set, as do the two orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexCategory {
    Hash,
    Ordered,
}

impl IndexKind {
    #[must_use]
    pub fn category(self) -> IndexCategory {
        match self {
            Self::Hash | Self::HashMulti => IndexCategory::Hash,
            Self::Ordered | Self::ReverseOrdered => IndexCategory::Ordered,
        }
    }
}

fn check_selector(table: &dyn Table, cols: &[usize]) -> Result<(), IndexError> {
    if cols.is_empty() {
        return Err(IndexError::EmptySelector);
    }
    for &col in cols {
        if col >= table.cols() {
            return Err(IndexError::ColOutOfRange {
                col,
                cols: table.cols(),
            });
        }
    }
    Ok(())
}

fn hash_row_key(table: &dyn Table, row: usize, cols: &[usize]) -> u64 {
    let mut hasher = FxHasher::default();
    RowRef::with_cols(table, row, ColSelector::Many(cols)).hash_values(&mut hasher);
    hasher.finish()
}

fn hash_probe(key: &[Value]) -> u64 {
    let mut hasher = FxHasher::default();
    row_hash(key, &mut hasher);
    hasher.finish()
}

fn rows_key_eq(table: &dyn Table, a: usize, b: usize, cols: &[usize]) -> bool {
    RowRef::with_cols(table, a, ColSelector::Many(cols))
        == RowRef::with_cols(table, b, ColSelector::Many(cols))
}

fn row_matches_probe(table: &dyn Table, row: usize, cols: &[usize], key: &[Value]) -> bool {
    RowRef::with_cols(table, row, ColSelector::Many(cols)).eq_values(key)
}

fn selected_key_text(table: &dyn Table, row: usize, cols: &[usize]) -> String {
    let values = RowRef::with_cols(table, row, ColSelector::Many(cols)).to_row();
    format!("({})", render_row(&values, table.options(), ", "))
}

fn selector_text(table: &dyn Table, cols: &[usize]) -> String {
    table
        .col_names_at(cols)
        .map(|names| names.join(", "))
        .unwrap_or_default()
}

// ── Hash indices ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Bucket {
    hash: u64,
    /// Row indices in ascending source order.
    rows: Vec<usize>,
}

/// key → rows, duplicates allowed, insertion order preserved.
///
/// The index owns its column selector and a bucket table of row positions;
/// keys are never materialized. Hashing and equality dereference through
/// `(table, row, selector)` at call time, so the table must be passed to
/// every lookup and must not gain rows between build and probe.
#[derive(Debug, Clone)]
pub struct HashMultiIndex {
    cols: Vec<usize>,
    buckets: HashTable<Bucket>,
    multi_value: bool,
    rows_at_build: usize,
}

impl HashMultiIndex {
    pub fn build(table: &dyn Table, cols: Vec<usize>) -> Result<Self, IndexError> {
        check_selector(table, &cols)?;
        let mut buckets: HashTable<Bucket> = HashTable::with_capacity(table.rows());
        let mut multi_value = false;
        for row in 0..table.rows() {
            let hash = hash_row_key(table, row, &cols);
            let entry = buckets.entry(
                hash,
                |bucket| bucket.hash == hash && rows_key_eq(table, bucket.rows[0], row, &cols),
                |bucket| bucket.hash,
            );
            match entry {
                Entry::Occupied(mut slot) => {
                    slot.get_mut().rows.push(row);
                    multi_value = true;
                }
                Entry::Vacant(slot) => {
                    slot.insert(Bucket {
                        hash,
                        rows: vec![row],
                    });
                }
            }
        }
        debug!(
            columns = %selector_text(table, &cols),
            rows = table.rows(),
            keys = buckets.len(),
            multi_value,
            "built hash-multi index"
        );
        Ok(Self {
            cols,
            buckets,
            multi_value,
            rows_at_build: table.rows(),
        })
    }

    pub fn by_names(table: &dyn Table, names: &[&str]) -> Result<Self, IndexError> {
        let cols = table.col_indices(names)?;
        Self::build(table, cols)
    }

    /// All rows under `key`, in ascending source order.
    #[must_use]
    pub fn get<'s>(&'s self, table: &dyn Table, key: &[Value]) -> Option<&'s [usize]> {
        if key.len() != self.cols.len() {
            return None;
        }
        let hash = hash_probe(key);
        self.buckets
            .find(hash, |bucket| {
                bucket.hash == hash && row_matches_probe(table, bucket.rows[0], &self.cols, key)
            })
            .map(|bucket| bucket.rows.as_slice())
    }

    /// Single-column convenience probe.
    #[must_use]
    pub fn get1<'s>(&'s self, table: &dyn Table, key: &Value) -> Option<&'s [usize]> {
        self.get(table, std::slice::from_ref(key))
    }

    #[must_use]
    pub fn contains(&self, table: &dyn Table, key: &[Value]) -> bool {
        self.get(table, key).is_some()
    }

    /// Whether any key maps to more than one row; fixed at build time.
    #[must_use]
    pub fn is_multi_value(&self) -> bool {
        self.multi_value
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[must_use]
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    #[must_use]
    pub fn rows_at_build(&self) -> usize {
        self.rows_at_build
    }

    fn first_duplicate(&self) -> Option<(usize, usize)> {
        // The earliest row that collided with an earlier one.
        self.buckets
            .iter()
            .filter(|bucket| bucket.rows.len() > 1)
            .map(|bucket| (bucket.rows[0], bucket.rows[1]))
            .min_by_key(|&(_, second)| second)
    }
}

/// key → row, uniqueness observed at build time.
///
/// Structurally a [`HashMultiIndex`] whose build rejects the first bucket
/// that grows past one row.
#[derive(Debug, Clone)]
pub struct HashIndex {
    inner: HashMultiIndex,
}

impl HashIndex {
    pub fn build(table: &dyn Table, cols: Vec<usize>) -> Result<Self, IndexError> {
        let inner = HashMultiIndex::build(table, cols)?;
        if inner.is_multi_value() {
            let (first, row) = inner.first_duplicate().unwrap_or((0, 0));
            let err = IndexError::DuplicateKey {
                key: selected_key_text(table, first, &inner.cols),
                columns: selector_text(table, &inner.cols),
                row,
            };
            debug!(%err, "unique hash index rejected");
            return Err(err);
        }
        Ok(Self { inner })
    }

    pub fn by_names(table: &dyn Table, names: &[&str]) -> Result<Self, IndexError> {
        let cols = table.col_indices(names)?;
        Self::build(table, cols)
    }

    /// The unique row under `key`.
    #[must_use]
    pub fn at(&self, table: &dyn Table, key: &[Value]) -> Option<usize> {
        self.inner.get(table, key).map(|rows| rows[0])
    }

    /// Single-column convenience probe.
    #[must_use]
    pub fn at1(&self, table: &dyn Table, key: &Value) -> Option<usize> {
        self.at(table, std::slice::from_ref(key))
    }

    #[must_use]
    pub fn contains(&self, table: &dyn Table, key: &[Value]) -> bool {
        self.at(table, key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn cols(&self) -> &[usize] {
        self.inner.cols()
    }

    #[must_use]
    pub fn rows_at_build(&self) -> usize {
        self.inner.rows_at_build()
    }
}

// ── Ordered indices ────────────────────────────────────────────────────

/// Row indices sorted by the selected columns; ascending, or descending
/// when built with `reverse`.
///
/// All searches run in comparator space: on a reverse index "greater"
/// means earlier in value order. Callers translating value-order requests
/// (the planner's prefix/suffix dispatch) flip accordingly.
#[derive(Debug, Clone)]
pub struct OrderedIndex {
    cols: Vec<usize>,
    order: Vec<usize>,
    reverse: bool,
    rows_at_build: usize,
}

impl OrderedIndex {
    pub fn build(table: &dyn Table, cols: Vec<usize>, reverse: bool) -> Result<Self, IndexError> {
        check_selector(table, &cols)?;
        let mut order: Vec<usize> = (0..table.rows()).collect();
        order.sort_unstable_by(|&a, &b| {
            let left = RowRef::with_cols(table, a, ColSelector::Many(&cols));
            let right = RowRef::with_cols(table, b, ColSelector::Many(&cols));
            let ord = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
            if reverse { ord.reverse() } else { ord }
        });
        debug!(
            columns = %selector_text(table, &cols),
            rows = table.rows(),
            reverse,
            "built ordered index"
        );
        Ok(Self {
            cols,
            order,
            reverse,
            rows_at_build: table.rows(),
        })
    }

    pub fn by_names(table: &dyn Table, names: &[&str], reverse: bool) -> Result<Self, IndexError> {
        let cols = table.col_indices(names)?;
        Self::build(table, cols, reverse)
    }

    /// The underlying row at the nth sorted position.
    #[must_use]
    pub fn at(&self, nth: usize) -> Option<usize> {
        self.order.get(nth).copied()
    }

    /// The full sorted row-index vector.
    #[must_use]
    pub fn row_order(&self) -> &[usize] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    #[must_use]
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    #[must_use]
    pub fn rows_at_build(&self) -> usize {
        self.rows_at_build
    }

    fn cmp_at(&self, table: &dyn Table, row: usize, key: &[Value]) -> Ordering {
        let ord =
            RowRef::with_cols(table, row, ColSelector::Many(&self.cols)).cmp_values(key);
        if self.reverse { ord.reverse() } else { ord }
    }

    fn eq_at(&self, table: &dyn Table, row: usize, key: &[Value]) -> bool {
        RowRef::with_cols(table, row, ColSelector::Many(&self.cols)).eq_values(key)
    }

    fn window(&self, pos: usize, end: Option<usize>) -> Result<(usize, usize), IndexError> {
        let end = end.unwrap_or(self.order.len());
        if end > self.order.len() || pos > end {
            return Err(IndexError::WindowOutOfRange {
                pos,
                end,
                len: self.order.len(),
            });
        }
        Ok((pos, end))
    }

    /// First sorted position whose key is `>= key`, searched in
    /// `[pos, end)`; `None` when every element is strictly less.
    pub fn find_first_ge_in(
        &self,
        table: &dyn Table,
        key: &[Value],
        pos: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>, IndexError> {
        let (pos, end) = self.window(pos, end)?;
        let slice = &self.order[pos..end];
        let bound =
            slice.partition_point(|&row| self.cmp_at(table, row, key) == Ordering::Less);
        Ok((bound < slice.len()).then_some(pos + bound))
    }

    /// First sorted position whose key is `> key`; `None` when every
    /// element is less-or-equal.
    pub fn find_first_gt_in(
        &self,
        table: &dyn Table,
        key: &[Value],
        pos: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>, IndexError> {
        let (pos, end) = self.window(pos, end)?;
        let slice = &self.order[pos..end];
        let bound =
            slice.partition_point(|&row| self.cmp_at(table, row, key) != Ordering::Greater);
        Ok((bound < slice.len()).then_some(pos + bound))
    }

    /// First sorted position equal to `key`.
    pub fn find_first_in(
        &self,
        table: &dyn Table,
        key: &[Value],
        pos: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>, IndexError> {
        let found = self.find_first_ge_in(table, key, pos, end)?;
        Ok(found.filter(|&at| self.eq_at(table, self.order[at], key)))
    }

    /// Last sorted position equal to `key`.
    pub fn find_last_in(
        &self,
        table: &dyn Table,
        key: &[Value],
        pos: usize,
        end: Option<usize>,
    ) -> Result<Option<usize>, IndexError> {
        let (pos, end) = self.window(pos, end)?;
        let slice = &self.order[pos..end];
        let bound =
            slice.partition_point(|&row| self.cmp_at(table, row, key) != Ordering::Greater);
        if bound == 0 {
            return Ok(None);
        }
        let at = pos + bound - 1;
        Ok(self.eq_at(table, self.order[at], key).then_some(at))
    }

    #[must_use]
    pub fn find_first_ge(&self, table: &dyn Table, key: &[Value]) -> Option<usize> {
        self.find_first_ge_in(table, key, 0, None).unwrap_or(None)
    }

    #[must_use]
    pub fn find_first_gt(&self, table: &dyn Table, key: &[Value]) -> Option<usize> {
        self.find_first_gt_in(table, key, 0, None).unwrap_or(None)
    }

    #[must_use]
    pub fn find_first(&self, table: &dyn Table, key: &[Value]) -> Option<usize> {
        self.find_first_in(table, key, 0, None).unwrap_or(None)
    }

    #[must_use]
    pub fn find_last(&self, table: &dyn Table, key: &[Value]) -> Option<usize> {
        self.find_last_in(table, key, 0, None).unwrap_or(None)
    }

    /// The `[first, last + 1)` span of sorted positions equal to `key`;
    /// `(0, 0)` when absent. Two bounded searches, so the same definition
    /// serves the reverse-ordered shape.
    #[must_use]
    pub fn equal_range(&self, table: &dyn Table, key: &[Value]) -> (usize, usize) {
        let Some(first) = self.find_first(table, key) else {
            return (0, 0);
        };
        let next = first + 1;
        if next < self.len() && self.eq_at(table, self.order[next], key) {
            let last = self
                .find_last_in(table, key, next, None)
                .unwrap_or(None)
                .unwrap_or(first);
            (first, last + 1)
        } else {
            (first, next)
        }
    }
}
