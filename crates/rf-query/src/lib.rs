#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use rf_expr::{CmpOp, Condition, ExprError, Predicate};
use rf_frame::{Frame, FrameError, Table, View};
use rf_index::{
    HashIndex, HashMultiIndex, IndexCategory, IndexError, IndexKind, OrderedIndex,
};
use rf_types::{IntoRow, Row, Value};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("an index of category {category:?} on [{columns}] already exists")]
    DuplicateIndex {
        category: IndexCategory,
        columns: String,
    },
    #[error("an index named {0:?} already exists")]
    DuplicateName(String),
    #[error("no index named {0:?}")]
    UnknownIndex(String),
    #[error("frame is shared by live views; drop them before appending")]
    FrameShared,
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Catalogue key: the category collapses the unique/multi hash shapes (and
/// the two orderings) into one slot per column selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub category: IndexCategory,
    pub cols: Vec<usize>,
}

/// A concrete index held by the catalogue.
#[derive(Debug, Clone)]
pub enum AnyIndex {
    Hash(HashIndex),
    HashMulti(HashMultiIndex),
    Ordered(OrderedIndex),
}

#[derive(Debug, Clone)]
struct CatalogueEntry {
    name: Option<String>,
    index: AnyIndex,
    /// Frame epoch at build time; a mismatch means the index is stale.
    epoch: u64,
}

/// A frame plus a catalogue of secondary indices over it.
///
/// `select` lowers an expression against the frame, consults the catalogue
/// for fast paths, and returns a row view. Any append through the facade
/// invalidates the whole catalogue; indices are rebuilt, never extended.
pub struct IndexedFrame {
    frame: Rc<Frame>,
    catalogue: FxHashMap<IndexKey, CatalogueEntry>,
    by_name: HashMap<String, IndexKey>,
}

impl IndexedFrame {
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Rc::new(frame),
            catalogue: FxHashMap::default(),
            by_name: HashMap::new(),
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Share the underlying frame (for views and handles).
    #[must_use]
    pub fn share(&self) -> Rc<Frame> {
        Rc::clone(&self.frame)
    }

    #[must_use]
    pub fn index_count(&self) -> usize {
        self.catalogue.len()
    }

    /// Build and register an index over the named columns.
    pub fn add_index(
        &mut self,
        kind: IndexKind,
        columns: &[&str],
        name: Option<&str>,
    ) -> Result<(), QueryError> {
        let cols = self.frame.col_indices(columns)?;
        self.add_index_at(kind, cols, name)
    }

    /// Build and register an index over column positions.
    ///
    /// Fails on a duplicate `(category, columns)` key, a duplicate name,
    /// or a unique hash build that observed duplicates; nothing is
    /// published on failure.
    pub fn add_index_at(
        &mut self,
        kind: IndexKind,
        cols: Vec<usize>,
        name: Option<&str>,
    ) -> Result<(), QueryError> {
        let key = IndexKey {
            category: kind.category(),
            cols: cols.clone(),
        };
        if self.catalogue.contains_key(&key) {
            return Err(QueryError::DuplicateIndex {
                category: key.category,
                columns: self
                    .frame
                    .col_names_at(&key.cols)
                    .map(|names| names.join(", "))
                    .unwrap_or_default(),
            });
        }
        if let Some(name) = name {
            if self.by_name.contains_key(name) {
                return Err(QueryError::DuplicateName(name.to_owned()));
            }
        }

        let table: &Frame = &self.frame;
        let index = match kind {
            IndexKind::Hash => AnyIndex::Hash(HashIndex::build(table, cols)?),
            IndexKind::HashMulti => AnyIndex::HashMulti(HashMultiIndex::build(table, cols)?),
            IndexKind::Ordered => AnyIndex::Ordered(OrderedIndex::build(table, cols, false)?),
            IndexKind::ReverseOrdered => {
                AnyIndex::Ordered(OrderedIndex::build(table, cols, true)?)
            }
        };

        self.catalogue.insert(
            key.clone(),
            CatalogueEntry {
                name: name.map(str::to_owned),
                index,
                epoch: self.frame.epoch(),
            },
        );
        if let Some(name) = name {
            self.by_name.insert(name.to_owned(), key);
        }
        Ok(())
    }

    /// Remove a named index from the catalogue and the name map.
    pub fn remove_index(&mut self, name: &str) -> Result<(), QueryError> {
        let key = self
            .by_name
            .remove(name)
            .ok_or_else(|| QueryError::UnknownIndex(name.to_owned()))?;
        self.catalogue.remove(&key);
        Ok(())
    }

    pub fn clear_indices(&mut self) {
        self.catalogue.clear();
        self.by_name.clear();
    }

    /// Look an index up by its catalogue key; stale entries (built before
    /// the last append) are treated as absent.
    #[must_use]
    pub fn find_index(&self, category: IndexCategory, cols: &[usize]) -> Option<&AnyIndex> {
        let key = IndexKey {
            category,
            cols: cols.to_vec(),
        };
        let entry = self.catalogue.get(&key)?;
        if entry.epoch != self.frame.epoch() {
            debug_assert!(false, "stale index survived an append");
            return None;
        }
        Some(&entry.index)
    }

    #[must_use]
    pub fn find_index_named(&self, name: &str) -> Option<&AnyIndex> {
        let key = self.by_name.get(name)?;
        self.find_index(key.category, &key.cols)
    }

    /// Plan and run a selection, returning a view over all columns.
    pub fn select(&self, predicate: impl Into<Predicate>) -> Result<View, QueryError> {
        let predicate = predicate.into();
        let rows = self.plan(&predicate)?;
        View::of_rows(Rc::clone(&self.frame), rows).map_err(QueryError::from)
    }

    /// Plan and run a selection, projecting the named columns.
    pub fn select_cols(
        &self,
        predicate: impl Into<Predicate>,
        columns: &[&str],
    ) -> Result<View, QueryError> {
        let predicate = predicate.into();
        let rows = self.plan(&predicate)?;
        View::of_named(Rc::clone(&self.frame), rows, columns).map_err(QueryError::from)
    }

    pub fn append_row_str<S: AsRef<str>>(&mut self, row: &[S]) -> Result<(), QueryError> {
        let frame = Rc::get_mut(&mut self.frame).ok_or(QueryError::FrameShared)?;
        frame.append_row_str(row)?;
        self.clear_indices();
        Ok(())
    }

    pub fn append_tuple<T: IntoRow>(&mut self, tuple: T) -> Result<(), QueryError> {
        let frame = Rc::get_mut(&mut self.frame).ok_or(QueryError::FrameShared)?;
        frame.append_tuple(tuple)?;
        self.clear_indices();
        Ok(())
    }

    pub fn append(&mut self, other: &dyn Table) -> Result<(), QueryError> {
        let frame = Rc::get_mut(&mut self.frame).ok_or(QueryError::FrameShared)?;
        frame.append(other)?;
        self.clear_indices();
        Ok(())
    }

    // ── Planner ────────────────────────────────────────────────────────

    /// Lower a predicate and compute the matching rows, ascending.
    pub fn plan(&self, predicate: &Predicate) -> Result<Vec<usize>, QueryError> {
        let table: &Frame = &self.frame;
        let rows = match predicate {
            Predicate::Leaf(expr) => {
                let cond = expr.to_condition(table)?;
                self.plan_leaf(&cond)
            }
            Predicate::All(and) => {
                let conds = and.to_conditions(table)?;
                self.plan_and(&conds)
            }
            Predicate::Any(or) => {
                let groups = or.to_condition_groups(table)?;
                plan_or_scan(table, &groups)
            }
        };
        debug!(rows = rows.len(), "selection planned");
        Ok(rows)
    }

    fn plan_leaf(&self, cond: &Condition) -> Vec<usize> {
        match self.plan_leaf_indexed(cond) {
            Some(rows) => rows,
            None => {
                debug!(op = ?cond.op(), "leaf falls back to a scan");
                scan_leaf(&*self.frame, cond)
            }
        }
    }

    /// Serve a leaf from the catalogue; `None` when no index applies.
    fn plan_leaf_indexed(&self, cond: &Condition) -> Option<Vec<usize>> {
        let table: &Frame = &self.frame;
        let cols = cond.col_indices();
        match cond.op() {
            CmpOp::Eq => {
                let key = cond.operand()?;
                self.equal_rows(table, cols, key)
            }
            CmpOp::Ne => {
                let key = cond.operand()?;
                let equal = self.equal_rows(table, cols, key)?;
                Some(complement(&equal, table.rows()))
            }
            CmpOp::IsIn => {
                let probes = cond.probes()?;
                self.membership_rows(table, cols, probes)
            }
            CmpOp::NotIn => {
                let probes = cond.probes()?;
                let matched = self.membership_rows(table, cols, probes)?;
                Some(complement(&matched, table.rows()))
            }
            op @ (CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge) => {
                let key = cond.operand()?;
                let ordered = self.ordered_index(cols)?;
                Some(range_rows(ordered, table, op, key))
            }
        }
    }

    /// Rows equal to `key`, via the hash index first, else the ordered
    /// index; `None` without either.
    fn equal_rows(&self, table: &Frame, cols: &[usize], key: &[Value]) -> Option<Vec<usize>> {
        match self.find_index(IndexCategory::Hash, cols) {
            Some(AnyIndex::Hash(index)) => {
                debug!("EQ served by unique hash index");
                Some(index.at(table, key).into_iter().collect())
            }
            Some(AnyIndex::HashMulti(index)) => {
                debug!("EQ served by hash-multi index");
                Some(index.get(table, key).map_or_else(Vec::new, <[usize]>::to_vec))
            }
            _ => {
                let ordered = self.ordered_index(cols)?;
                debug!("EQ served by ordered index");
                let (first, last) = ordered.equal_range(table, key);
                let mut rows = ordered.row_order()[first..last].to_vec();
                rows.sort_unstable();
                Some(rows)
            }
        }
    }

    /// Union of per-probe equal sets; `None` without an applicable index.
    fn membership_rows(
        &self,
        table: &Frame,
        cols: &[usize],
        probes: &[Row],
    ) -> Option<Vec<usize>> {
        let mut rows = Vec::new();
        for probe in probes {
            rows.extend(self.equal_rows(table, cols, probe)?);
        }
        rows.sort_unstable();
        rows.dedup();
        Some(rows)
    }

    fn ordered_index(&self, cols: &[usize]) -> Option<&OrderedIndex> {
        match self.find_index(IndexCategory::Ordered, cols) {
            Some(AnyIndex::Ordered(index)) => Some(index),
            _ => None,
        }
    }

    /// Two-phase conjunction: index-served leaves narrow a candidate set
    /// (equality leaves first, then range leaves), then the remaining
    /// leaves refine row-by-row. With no index-served leaf at all the
    /// refine phase is a full scan over every leaf.
    fn plan_and(&self, conds: &[Condition]) -> Vec<usize> {
        let table: &Frame = &self.frame;
        let n = table.rows();
        let threshold = n / 8;
        let mut candidates: Option<Vec<usize>> = None;
        let mut applied = vec![false; conds.len()];

        'fast: for pass in 0..2 {
            for (i, cond) in conds.iter().enumerate() {
                if applied[i] {
                    continue;
                }
                let eligible = match pass {
                    0 => matches!(cond.op(), CmpOp::Eq | CmpOp::IsIn),
                    _ => matches!(cond.op(), CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge),
                };
                if !eligible {
                    continue;
                }
                let Some(rows) = self.plan_leaf_indexed(cond) else {
                    continue;
                };
                debug!(leaf = i, candidates = rows.len(), "AND fast-path leaf");
                applied[i] = true;
                let merged = match candidates.take() {
                    None => rows,
                    Some(current) => intersect_sorted(&current, &rows),
                };
                if merged.is_empty() {
                    return Vec::new();
                }
                let narrow_enough = merged.len() < threshold;
                candidates = Some(merged);
                if narrow_enough {
                    break 'fast;
                }
            }
        }

        match candidates {
            Some(mut rows) => {
                rows.retain(|&row| {
                    conds
                        .iter()
                        .zip(&applied)
                        .filter(|(_, done)| !**done)
                        .all(|(cond, _)| cond.eval_at_row(table, row))
                });
                rows
            }
            None => (0..n)
                .filter(|&row| conds.iter().all(|cond| cond.eval_at_row(table, row)))
                .collect(),
        }
    }
}

/// Scan fallback for a single leaf.
fn scan_leaf(table: &dyn Table, cond: &Condition) -> Vec<usize> {
    (0..table.rows())
        .filter(|&row| cond.eval_at_row(table, row))
        .collect()
}

/// Per-row evaluation of a disjunction of conjunctions. Rows come out in
/// source order, deduplicated by construction.
fn plan_or_scan(table: &dyn Table, groups: &[Vec<Condition>]) -> Vec<usize> {
    (0..table.rows())
        .filter(|&row| {
            groups
                .iter()
                .any(|group| group.iter().all(|cond| cond.eval_at_row(table, row)))
        })
        .collect()
}

/// The sorted-position window of an ordered index matching a value-order
/// range operator; descending indices flip the prefix/suffix mapping.
fn range_rows(index: &OrderedIndex, table: &dyn Table, op: CmpOp, key: &[Value]) -> Vec<usize> {
    let len = index.len();
    let (lo, hi) = if index.is_reverse() {
        match op {
            CmpOp::Lt => (index.find_first_gt(table, key).unwrap_or(len), len),
            CmpOp::Le => (index.find_first_ge(table, key).unwrap_or(len), len),
            CmpOp::Gt => (0, index.find_first_ge(table, key).unwrap_or(len)),
            CmpOp::Ge => (0, index.find_first_gt(table, key).unwrap_or(len)),
            _ => (0, 0),
        }
    } else {
        match op {
            CmpOp::Lt => (0, index.find_first_ge(table, key).unwrap_or(len)),
            CmpOp::Le => (0, index.find_first_gt(table, key).unwrap_or(len)),
            CmpOp::Gt => (index.find_first_gt(table, key).unwrap_or(len), len),
            CmpOp::Ge => (index.find_first_ge(table, key).unwrap_or(len), len),
            _ => (0, 0),
        }
    };
    let mut rows = index.row_order()[lo..hi].to_vec();
    rows.sort_unstable();
    rows
}

/// Intersection of two ascending row-index vectors.
fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// `0..n` minus an ascending exclusion vector, in one gap-filling pass.
fn complement(excluded: &[usize], n: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(n.saturating_sub(excluded.len()));
    let mut gaps = excluded.iter().copied().peekable();
    for row in 0..n {
        match gaps.peek() {
            Some(&hole) if hole == row => {
                gaps.next();
            }
            _ => out.push(row),
        }
    }
    out
}
