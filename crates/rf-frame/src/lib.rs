#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::rc::Rc;

use thiserror::Error;

use rf_types::{
    ColumnDef, FieldScalar, FieldType, IntoRow, NullPolicy, Row, Schema, TypeError, Value,
    ValueOptions, check_row_compatible, parse_value, render_value, value_cmp, value_eq,
    value_hash,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("row {row} is out of range ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("column {col} is out of range ({cols} columns)")]
    ColOutOfRange { col: usize, cols: usize },
    #[error("unknown column name {0:?}")]
    UnknownColumn(String),
    #[error("cell {text:?} failed to parse for column {column:?}: {source}")]
    CellParse {
        text: String,
        column: String,
        source: TypeError,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("frame has no schema; build it before appending rows")]
    EmptySchema,
    #[error("expected {expected} column names, got {got}")]
    NameArity { got: usize, expected: usize },
    #[error("cannot append: column {column:?} of type {expected:?} {problem} in the source frame")]
    AppendMismatch {
        column: String,
        expected: FieldType,
        problem: String,
    },
    #[error("typed access to column {column:?}: column is {actual:?}, requested {requested:?}")]
    TypedColumnMismatch {
        column: String,
        actual: FieldType,
        requested: FieldType,
    },
    #[error("duplicate column {0:?} in view projection")]
    DuplicateViewColumn(String),
}

/// Layout knobs for [`Table::write_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub header: bool,
    pub field_sep: char,
    pub row_sep: char,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            header: true,
            field_sep: '|',
            row_sep: '\n',
        }
    }
}

/// The frame contract shared by [`Frame`] and [`View`]; everything the
/// index family, the planner, and the printer consume goes through it.
pub trait Table {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    /// Unchecked cell access; panics when out of range. Checked callers go
    /// through [`Table::cell`]; handles are constructed pre-validated.
    fn value_at(&self, row: usize, col: usize) -> &Value;
    fn col_index(&self, name: &str) -> Result<usize, FrameError>;
    fn col_def(&self, col: usize) -> Result<&ColumnDef, FrameError>;
    fn is_view(&self) -> bool;
    fn options(&self) -> &ValueOptions;
    fn deep_copy(&self) -> Frame;

    fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    fn cell(&self, row: usize, col: usize) -> Result<&Value, FrameError> {
        if row >= self.rows() {
            return Err(FrameError::RowOutOfRange {
                row,
                rows: self.rows(),
            });
        }
        if col >= self.cols() {
            return Err(FrameError::ColOutOfRange {
                col,
                cols: self.cols(),
            });
        }
        Ok(self.value_at(row, col))
    }

    fn cell_by_name(&self, row: usize, name: &str) -> Result<&Value, FrameError> {
        let col = self.col_index(name)?;
        self.cell(row, col)
    }

    fn col_name(&self, col: usize) -> Result<&str, FrameError> {
        self.col_def(col).map(|def| def.name.as_str())
    }

    fn col_def_by_name(&self, name: &str) -> Result<&ColumnDef, FrameError> {
        let col = self.col_index(name)?;
        self.col_def(col)
    }

    fn col_indices(&self, names: &[&str]) -> Result<Vec<usize>, FrameError> {
        names.iter().map(|name| self.col_index(name)).collect()
    }

    fn col_names_at(&self, cols: &[usize]) -> Result<Vec<String>, FrameError> {
        cols.iter()
            .map(|&col| self.col_name(col).map(str::to_owned))
            .collect()
    }

    fn write_table(&self, out: &mut dyn fmt::Write, opts: &PrintOptions) -> fmt::Result {
        if opts.header {
            for col in 0..self.cols() {
                if col != 0 {
                    out.write_char(opts.field_sep)?;
                }
                out.write_str(self.col_name(col).unwrap_or(""))?;
            }
            out.write_char(opts.row_sep)?;
        }
        for row in 0..self.rows() {
            for col in 0..self.cols() {
                if col != 0 {
                    out.write_char(opts.field_sep)?;
                }
                out.write_str(&render_value(self.value_at(row, col), self.options()))?;
            }
            out.write_char(opts.row_sep)?;
        }
        Ok(())
    }

    fn to_table_string(&self, opts: &PrintOptions) -> String {
        let mut out = String::new();
        let _ = self.write_table(&mut out, opts);
        out
    }
}

// ── Frame ──────────────────────────────────────────────────────────────

/// The owning row store: a schema plus an ordered sequence of rows.
///
/// Rows are only ever appended; each append bumps the frame's epoch so
/// structures built over earlier row sets can detect staleness.
#[derive(Debug, Clone)]
pub struct Frame {
    schema: Schema,
    records: Vec<Row>,
    options: ValueOptions,
    null_policy: NullPolicy,
    epoch: u64,
}

impl Frame {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Vec::new(),
            options: ValueOptions::default(),
            null_policy: NullPolicy::default(),
            epoch: 0,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ValueOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    /// Build a frame by parsing string cells under the schema's tags.
    ///
    /// Any failing cell aborts the whole construction; nothing partial is
    /// published.
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>], schema: Schema) -> Result<Self, FrameError> {
        let mut frame = Self::new(schema);
        for row in rows {
            frame.push_row_str(row)?;
        }
        Ok(frame)
    }

    /// Build a frame from statically-typed tuples; the schema tags come
    /// from the tuple element types. Empty `names` generates `Col0..`.
    pub fn from_tuples<T: IntoRow>(tuples: Vec<T>, names: &[&str]) -> Result<Self, FrameError> {
        let tags = T::field_types();
        let columns = if names.is_empty() {
            tags.iter()
                .enumerate()
                .map(|(i, &tag)| ColumnDef::new(tag, format!("Col{i}")))
                .collect()
        } else {
            if names.len() != tags.len() {
                return Err(FrameError::NameArity {
                    got: names.len(),
                    expected: tags.len(),
                });
            }
            tags.iter()
                .zip(names)
                .map(|(&tag, &name)| ColumnDef::new(tag, name))
                .collect()
        };
        let mut frame = Self::new(Schema::new(columns)?);
        for tuple in tuples {
            frame.push_tuple(tuple)?;
        }
        Ok(frame)
    }

    pub(crate) fn from_parts(
        schema: Schema,
        records: Vec<Row>,
        options: ValueOptions,
        null_policy: NullPolicy,
    ) -> Self {
        Self {
            schema,
            records,
            options,
            null_policy,
            epoch: 0,
        }
    }

    /// Parse and append one row of cell strings; the frame is unchanged on
    /// failure.
    pub fn append_row_str<S: AsRef<str>>(&mut self, row: &[S]) -> Result<(), FrameError> {
        self.push_row_str(row)?;
        self.epoch += 1;
        Ok(())
    }

    /// Append one typed tuple; the frame is unchanged on failure.
    pub fn append_tuple<T: IntoRow>(&mut self, tuple: T) -> Result<(), FrameError> {
        self.push_tuple(tuple)?;
        self.epoch += 1;
        Ok(())
    }

    /// Whether every column of `self` has a same-named, type-compatible
    /// column in `other`. The precondition of [`Frame::append`].
    pub fn can_append(&self, other: &dyn Table) -> Result<(), FrameError> {
        for def in self.schema.columns() {
            let col = other.col_index(&def.name).map_err(|_| {
                FrameError::AppendMismatch {
                    column: def.name.clone(),
                    expected: def.field_type,
                    problem: "is missing".to_owned(),
                }
            })?;
            let other_def = other.col_def(col)?;
            let compatible = other_def.field_type == def.field_type
                || (other_def.field_type.is_numeric() && def.field_type.is_numeric());
            if !compatible {
                return Err(FrameError::AppendMismatch {
                    column: def.name.clone(),
                    expected: def.field_type,
                    problem: format!("is {:?}", other_def.field_type),
                });
            }
        }
        Ok(())
    }

    /// Append every row of `other`, matching columns by name. An empty
    /// frame first clones `other`'s schema.
    pub fn append(&mut self, other: &dyn Table) -> Result<(), FrameError> {
        self.can_append(other)?;
        if self.schema.is_empty() {
            let columns = (0..other.cols())
                .map(|col| other.col_def(col).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            self.schema = Schema::new(columns)?;
        }
        let source_cols = self
            .schema
            .columns()
            .iter()
            .map(|def| other.col_index(&def.name))
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..other.rows() {
            let record: Row = source_cols
                .iter()
                .map(|&col| other.value_at(row, col).clone())
                .collect();
            self.records.push(record);
        }
        self.epoch += 1;
        Ok(())
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn null_policy(&self) -> NullPolicy {
        self.null_policy
    }

    /// Bumped on every append; index staleness checks compare against it.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn row_values(&self, row: usize) -> Result<&[Value], FrameError> {
        self.records
            .get(row)
            .map(Vec::as_slice)
            .ok_or(FrameError::RowOutOfRange {
                row,
                rows: self.records.len(),
            })
    }

    fn push_row_str<S: AsRef<str>>(&mut self, row: &[S]) -> Result<(), FrameError> {
        if self.schema.is_empty() {
            return Err(FrameError::EmptySchema);
        }
        if row.len() != self.schema.len() {
            return Err(TypeError::RowArity {
                got: row.len(),
                expected: self.schema.len(),
            }
            .into());
        }
        let mut record = Row::with_capacity(row.len());
        for (cell, def) in row.iter().zip(self.schema.columns()) {
            let text = cell.as_ref();
            let value = parse_value(text, def.field_type, &self.options).map_err(|source| {
                FrameError::CellParse {
                    text: text.to_owned(),
                    column: def.name.clone(),
                    source,
                }
            })?;
            record.push(value);
        }
        check_row_compatible(&record, &self.schema, self.null_policy, &self.options)?;
        self.records.push(record);
        Ok(())
    }

    fn push_tuple<T: IntoRow>(&mut self, tuple: T) -> Result<(), FrameError> {
        if self.schema.is_empty() {
            return Err(FrameError::EmptySchema);
        }
        let record = tuple.into_row();
        check_row_compatible(&record, &self.schema, self.null_policy, &self.options)?;
        self.records.push(record);
        Ok(())
    }
}

impl Table for Frame {
    fn rows(&self) -> usize {
        self.records.len()
    }

    fn cols(&self) -> usize {
        self.schema.len()
    }

    fn value_at(&self, row: usize, col: usize) -> &Value {
        &self.records[row][col]
    }

    fn col_index(&self, name: &str) -> Result<usize, FrameError> {
        self.schema
            .col_index(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_owned()))
    }

    fn col_def(&self, col: usize) -> Result<&ColumnDef, FrameError> {
        self.schema.get(col).ok_or(FrameError::ColOutOfRange {
            col,
            cols: self.schema.len(),
        })
    }

    fn is_view(&self) -> bool {
        false
    }

    fn options(&self) -> &ValueOptions {
        &self.options
    }

    fn deep_copy(&self) -> Frame {
        let mut copy = self.clone();
        copy.epoch = 0;
        copy
    }
}

// ── Reference handles ──────────────────────────────────────────────────

/// The column set a handle or index is keyed on: one column or a borrowed
/// list of columns.
#[derive(Debug, Clone, Copy)]
pub enum ColSelector<'t> {
    One(usize),
    Many(&'t [usize]),
}

impl ColSelector<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(cols) => cols.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The i-th selected column; panics out of range like slice indexing.
    #[must_use]
    pub fn at(&self, i: usize) -> usize {
        match self {
            Self::One(col) => {
                assert!(i == 0, "selector index {i} out of range for a single column");
                *col
            }
            Self::Many(cols) => cols[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |i| self.at(i))
    }
}

impl<'t> From<&'t [usize]> for ColSelector<'t> {
    fn from(cols: &'t [usize]) -> Self {
        Self::Many(cols)
    }
}

impl From<usize> for ColSelector<'_> {
    fn from(col: usize) -> Self {
        Self::One(col)
    }
}

/// A borrowed single cell.
#[derive(Clone, Copy)]
pub struct CellRef<'t> {
    table: &'t dyn Table,
    row: usize,
    col: usize,
}

impl<'t> CellRef<'t> {
    pub fn new(table: &'t dyn Table, row: usize, col: usize) -> Result<Self, FrameError> {
        table.cell(row, col)?;
        Ok(Self { table, row, col })
    }

    #[must_use]
    pub fn value(&self) -> &'t Value {
        self.table.value_at(self.row, self.col)
    }

    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }
}

impl PartialEq for CellRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self.value(), other.value())
    }
}

impl PartialOrd for CellRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(value_cmp(self.value(), other.value()))
    }
}

impl fmt::Debug for CellRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellRef")
            .field("row", &self.row)
            .field("col", &self.col)
            .field("value", self.value())
            .finish()
    }
}

/// A borrowed row restricted to a column selector (all columns when the
/// selector is absent). Comparisons are lexicographic across the selected
/// columns under the null and numeric-coercion rules.
#[derive(Clone, Copy)]
pub struct RowRef<'t> {
    table: &'t dyn Table,
    row: usize,
    cols: Option<ColSelector<'t>>,
}

impl<'t> RowRef<'t> {
    #[must_use]
    pub fn all(table: &'t dyn Table, row: usize) -> Self {
        Self {
            table,
            row,
            cols: None,
        }
    }

    #[must_use]
    pub fn with_cols(table: &'t dyn Table, row: usize, cols: ColSelector<'t>) -> Self {
        Self {
            table,
            row,
            cols: Some(cols),
        }
    }

    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// The handle's arity: selector length, or the full column count.
    #[must_use]
    pub fn width(&self) -> usize {
        match &self.cols {
            None => self.table.cols(),
            Some(sel) => sel.len(),
        }
    }

    fn col_at(&self, i: usize) -> usize {
        match &self.cols {
            None => i,
            Some(sel) => sel.at(i),
        }
    }

    /// The i-th selected field; panics out of range like slice indexing.
    #[must_use]
    pub fn field(&self, i: usize) -> &'t Value {
        self.table.value_at(self.row, self.col_at(i))
    }

    pub fn values(&self) -> impl Iterator<Item = &'t Value> + '_ {
        (0..self.width()).map(move |i| self.field(i))
    }

    #[must_use]
    pub fn to_row(&self) -> Row {
        self.values().cloned().collect()
    }

    #[must_use]
    pub fn eq_values(&self, probe: &[Value]) -> bool {
        self.width() == probe.len()
            && self.values().zip(probe).all(|(a, b)| value_eq(a, b))
    }

    #[must_use]
    pub fn cmp_values(&self, probe: &[Value]) -> Ordering {
        for (i, b) in probe.iter().enumerate() {
            if i >= self.width() {
                return Ordering::Less;
            }
            match value_cmp(self.field(i), b) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        self.width().cmp(&probe.len())
    }

    pub fn hash_values<H: Hasher>(&self, state: &mut H) {
        for value in self.values() {
            value_hash(value, state);
        }
    }
}

impl PartialEq for RowRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.values().zip(other.values()).all(|(a, b)| value_eq(a, b))
    }
}

impl PartialOrd for RowRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut rhs = other.values();
        for a in self.values() {
            match rhs.next() {
                None => return Some(Ordering::Greater),
                Some(b) => match value_cmp(a, b) {
                    Ordering::Equal => {}
                    found => return Some(found),
                },
            }
        }
        Some(self.width().cmp(&other.width()))
    }
}

impl fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("row", &self.row)
            .field("values", &self.to_row())
            .finish()
    }
}

/// A borrowed column, optionally restricted to a row list.
#[derive(Clone, Copy)]
pub struct ColRef<'t> {
    table: &'t dyn Table,
    col: usize,
    rows: Option<&'t [usize]>,
}

impl<'t> std::fmt::Debug for ColRef<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColRef")
            .field("col", &self.col)
            .field("rows", &self.rows)
            .finish()
    }
}

impl<'t> ColRef<'t> {
    pub fn new(table: &'t dyn Table, col: usize) -> Result<Self, FrameError> {
        table.col_def(col)?;
        Ok(Self {
            table,
            col,
            rows: None,
        })
    }

    pub fn with_rows(
        table: &'t dyn Table,
        col: usize,
        rows: &'t [usize],
    ) -> Result<Self, FrameError> {
        table.col_def(col)?;
        for &row in rows {
            if row >= table.rows() {
                return Err(FrameError::RowOutOfRange {
                    row,
                    rows: table.rows(),
                });
            }
        }
        Ok(Self {
            table,
            col,
            rows: Some(rows),
        })
    }

    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.map_or_else(|| self.table.rows(), <[usize]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The i-th value; panics out of range like slice indexing.
    #[must_use]
    pub fn value(&self, i: usize) -> &'t Value {
        let row = self.rows.map_or(i, |rows| rows[i]);
        self.table.value_at(row, self.col)
    }

    pub fn values(&self) -> impl Iterator<Item = &'t Value> + '_ {
        (0..self.len()).map(move |i| self.value(i))
    }
}

/// A typed column handle: the column's tag is checked against `T` at
/// construction, after which cells read as the underlying primitive.
#[derive(Clone, Copy)]
pub struct VectorRef<'t, T: FieldScalar> {
    inner: ColRef<'t>,
    _marker: PhantomData<fn() -> T>,
}

impl<'t, T: FieldScalar> std::fmt::Debug for VectorRef<'t, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorRef").field("inner", &self.inner).finish()
    }
}

impl<'t, T: FieldScalar + 't> VectorRef<'t, T> {
    pub fn new(table: &'t dyn Table, col: usize) -> Result<Self, FrameError> {
        let def = table.col_def(col)?;
        if def.field_type != T::FIELD_TYPE {
            return Err(FrameError::TypedColumnMismatch {
                column: def.name.clone(),
                actual: def.field_type,
                requested: T::FIELD_TYPE,
            });
        }
        Ok(Self {
            inner: ColRef::new(table, col)?,
            _marker: PhantomData,
        })
    }

    pub fn by_name(table: &'t dyn Table, name: &str) -> Result<Self, FrameError> {
        Self::new(table, table.col_index(name)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The i-th cell as the primitive; `None` when the cell is Null.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&'t T> {
        T::extract(self.inner.value(i))
    }

    #[must_use]
    pub fn value(&self, i: usize) -> &'t Value {
        self.inner.value(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'t T>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Convenience handle constructors for concrete tables.
pub trait TableExt: Table + Sized {
    fn row_ref(&self, row: usize) -> RowRef<'_> {
        RowRef::all(self, row)
    }

    fn row_ref_cols<'t>(&'t self, row: usize, cols: &'t [usize]) -> RowRef<'t> {
        RowRef::with_cols(self, row, ColSelector::Many(cols))
    }

    fn cell_ref(&self, row: usize, col: usize) -> Result<CellRef<'_>, FrameError> {
        CellRef::new(self, row, col)
    }

    fn col_ref(&self, col: usize) -> Result<ColRef<'_>, FrameError> {
        ColRef::new(self, col)
    }

    fn col_ref_typed<'a, T: FieldScalar + 'a>(&'a self, name: &str) -> Result<VectorRef<'a, T>, FrameError> {
        VectorRef::by_name(self, name)
    }
}

impl<T: Table + Sized> TableExt for T {}

// ── View ───────────────────────────────────────────────────────────────

/// A non-owning projection of a frame by a row-index vector and a
/// column-index vector.
///
/// A view built over another view collapses to the ultimate base frame
/// with composed index vectors, so [`View::underlying`] is never itself a
/// view.
#[derive(Debug, Clone)]
pub struct View {
    base: Rc<Frame>,
    row_map: Vec<usize>,
    col_map: Vec<usize>,
    names: HashMap<String, usize>,
}

impl View {
    pub fn of(base: Rc<Frame>, rows: Vec<usize>, cols: Vec<usize>) -> Result<Self, FrameError> {
        check_rows(&base, &rows)?;
        check_cols(&base, &cols)?;
        let names = visible_names(&base, &cols)?;
        Ok(Self {
            base,
            row_map: rows,
            col_map: cols,
            names,
        })
    }

    pub fn of_rows(base: Rc<Frame>, rows: Vec<usize>) -> Result<Self, FrameError> {
        let cols = (0..base.cols()).collect();
        Self::of(base, rows, cols)
    }

    pub fn of_cols(base: Rc<Frame>, cols: Vec<usize>) -> Result<Self, FrameError> {
        let rows = (0..base.rows()).collect();
        Self::of(base, rows, cols)
    }

    pub fn of_cols_named(base: Rc<Frame>, names: &[&str]) -> Result<Self, FrameError> {
        let cols = base.col_indices(names)?;
        Self::of_cols(base, cols)
    }

    pub fn of_named(
        base: Rc<Frame>,
        rows: Vec<usize>,
        names: &[&str],
    ) -> Result<Self, FrameError> {
        let cols = base.col_indices(names)?;
        Self::of(base, rows, cols)
    }

    /// Re-view: indices are relative to this view and compose down to the
    /// base.
    pub fn subview(&self, rows: Vec<usize>, cols: Vec<usize>) -> Result<Self, FrameError> {
        let rows = self.translate_rows(rows)?;
        let cols = self.translate_cols(cols)?;
        Self::of(Rc::clone(&self.base), rows, cols)
    }

    pub fn subview_rows(&self, rows: Vec<usize>) -> Result<Self, FrameError> {
        let cols = (0..self.col_map.len()).collect();
        self.subview(rows, cols)
    }

    pub fn subview_cols(&self, cols: Vec<usize>) -> Result<Self, FrameError> {
        let rows = (0..self.row_map.len()).collect();
        self.subview(rows, cols)
    }

    pub fn subview_cols_named(&self, names: &[&str]) -> Result<Self, FrameError> {
        let cols = names
            .iter()
            .map(|name| self.col_index(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = (0..self.row_map.len()).collect();
        self.subview(rows, cols)
    }

    #[must_use]
    pub fn underlying(&self) -> &Rc<Frame> {
        &self.base
    }

    pub fn underlying_row(&self, row: usize) -> Result<usize, FrameError> {
        self.row_map.get(row).copied().ok_or(FrameError::RowOutOfRange {
            row,
            rows: self.row_map.len(),
        })
    }

    pub fn underlying_col(&self, col: usize) -> Result<usize, FrameError> {
        self.col_map.get(col).copied().ok_or(FrameError::ColOutOfRange {
            col,
            cols: self.col_map.len(),
        })
    }

    #[must_use]
    pub fn row_map(&self) -> &[usize] {
        &self.row_map
    }

    #[must_use]
    pub fn col_map(&self) -> &[usize] {
        &self.col_map
    }

    /// Reorder the view's rows by the named columns, ascending or
    /// descending. Sorting builds the same row ordering a multi-column
    /// ordered index over this view would, then composes it with the
    /// current row mapping; the column projection is untouched.
    pub fn sort_by(&mut self, names: &[&str], reverse: bool) -> Result<(), FrameError> {
        let base_cols: Vec<usize> = names
            .iter()
            .map(|name| self.col_index(name).map(|col| self.col_map[col]))
            .collect::<Result<Vec<_>, _>>()?;
        let base: &Frame = &self.base;
        let mut order: Vec<usize> = (0..self.row_map.len()).collect();
        order.sort_unstable_by(|&a, &b| {
            let left = RowRef::with_cols(base, self.row_map[a], ColSelector::Many(&base_cols));
            let right = RowRef::with_cols(base, self.row_map[b], ColSelector::Many(&base_cols));
            let ord = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
            if reverse { ord.reverse() } else { ord }
        });
        self.row_map = order.into_iter().map(|pos| self.row_map[pos]).collect();
        Ok(())
    }

    fn translate_rows(&self, rows: Vec<usize>) -> Result<Vec<usize>, FrameError> {
        rows.into_iter().map(|row| self.underlying_row(row)).collect()
    }

    fn translate_cols(&self, cols: Vec<usize>) -> Result<Vec<usize>, FrameError> {
        cols.into_iter().map(|col| self.underlying_col(col)).collect()
    }
}

fn check_rows(base: &Frame, rows: &[usize]) -> Result<(), FrameError> {
    let limit = base.rows();
    for &row in rows {
        if row >= limit {
            return Err(FrameError::RowOutOfRange { row, rows: limit });
        }
    }
    Ok(())
}

fn check_cols(base: &Frame, cols: &[usize]) -> Result<(), FrameError> {
    let limit = base.cols();
    for &col in cols {
        if col >= limit {
            return Err(FrameError::ColOutOfRange { col, cols: limit });
        }
    }
    Ok(())
}

fn visible_names(base: &Frame, cols: &[usize]) -> Result<HashMap<String, usize>, FrameError> {
    let mut names = HashMap::with_capacity(cols.len());
    for (visible, &col) in cols.iter().enumerate() {
        let name = base.col_name(col)?.to_owned();
        if names.insert(name.clone(), visible).is_some() {
            return Err(FrameError::DuplicateViewColumn(name));
        }
    }
    Ok(names)
}

impl Table for View {
    fn rows(&self) -> usize {
        self.row_map.len()
    }

    fn cols(&self) -> usize {
        self.col_map.len()
    }

    fn value_at(&self, row: usize, col: usize) -> &Value {
        self.base.value_at(self.row_map[row], self.col_map[col])
    }

    fn col_index(&self, name: &str) -> Result<usize, FrameError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownColumn(name.to_owned()))
    }

    fn col_def(&self, col: usize) -> Result<&ColumnDef, FrameError> {
        let base_col = self.underlying_col(col)?;
        self.base.col_def(base_col)
    }

    fn is_view(&self) -> bool {
        true
    }

    fn options(&self) -> &ValueOptions {
        self.base.options()
    }

    fn deep_copy(&self) -> Frame {
        let columns: Vec<ColumnDef> = self
            .col_map
            .iter()
            .filter_map(|&col| self.base.schema().get(col).cloned())
            .collect();
        let schema = Schema::new(columns).unwrap_or_else(|_| Schema::empty());
        let records: Vec<Row> = self
            .row_map
            .iter()
            .map(|&row| {
                self.col_map
                    .iter()
                    .map(|&col| self.base.value_at(row, col).clone())
                    .collect()
            })
            .collect();
        Frame::from_parts(
            schema,
            records,
            self.base.options().clone(),
            self.base.null_policy(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use rf_types::{
        FieldType, NullPolicy, Schema, Timestamp, Value, char_col, float32_col, int32_col,
        str_col, timestamp_col,
    };

    use super::{
        ColSelector, Frame, FrameError, PrintOptions, RowRef, Table, TableExt, View,
    };

    fn seed_schema() -> Schema {
        Schema::new(vec![
            str_col("Name"),
            int32_col("Age"),
            char_col("Level"),
            float32_col("Score"),
            timestamp_col("BirthDate"),
        ])
        .expect("schema")
    }

    fn seed_frame() -> Frame {
        let rows = vec![
            vec!["John", "23", "A", "29.3", "2000/10/22"],
            vec!["Tom", "18", "B", "45.2", "N/A"],
        ];
        let mut frame = Frame::from_rows(&rows, seed_schema()).expect("frame");
        let extra = Frame::from_tuples(
            vec![
                ("Jonathon", 24, 23.3_f32, b'A', Some(Timestamp::date(2010, 10, 22))),
                ("Jeff", 12, 43.5_f32, b'C', Some(Timestamp::date(2008, 10, 22))),
            ],
            &["Name", "Age", "Score", "Level", "BirthDate"],
        )
        .expect("tuple frame");
        frame.append(&extra).expect("append");
        frame
    }

    #[test]
    fn from_rows_parses_cells_by_column_tag() {
        let frame = seed_frame();
        assert_eq!(frame.shape(), (4, 5));
        assert_eq!(frame.cell(0, 1).expect("cell"), &Value::Int32(23));
        assert_eq!(frame.cell(1, 4).expect("cell"), &Value::Null);
        assert_eq!(
            frame.cell_by_name(2, "Level").expect("cell"),
            &Value::Char(b'A')
        );
    }

    #[test]
    fn from_rows_rejects_bad_cells_atomically() {
        let rows = vec![
            vec!["John", "23", "A", "29.3", "2000/10/22"],
            vec!["Tom", "not-a-number", "B", "45.2", "N/A"],
        ];
        let err = Frame::from_rows(&rows, seed_schema()).expect_err("must fail");
        assert!(matches!(err, FrameError::CellParse { ref column, .. } if column == "Age"));
    }

    #[test]
    fn from_rows_rejects_arity_mismatch() {
        let rows = vec![vec!["John", "23"]];
        assert!(Frame::from_rows(&rows, seed_schema()).is_err());
    }

    #[test]
    fn from_tuples_generates_names_when_omitted() {
        let frame =
            Frame::from_tuples(vec![(1_i32, "one"), (2_i32, "two")], &[]).expect("frame");
        assert_eq!(frame.col_name(0).expect("name"), "Col0");
        assert_eq!(frame.col_name(1).expect("name"), "Col1");
        assert_eq!(
            frame.col_def(1).expect("def").field_type,
            FieldType::Str
        );
    }

    #[test]
    fn from_tuples_checks_name_arity() {
        let err = Frame::from_tuples(vec![(1_i32, "one")], &["only"]).expect_err("must fail");
        assert_eq!(err, FrameError::NameArity { got: 1, expected: 2 });
    }

    #[test]
    fn append_row_str_leaves_frame_unchanged_on_failure() {
        let mut frame = seed_frame();
        let before = frame.rows();
        let err = frame
            .append_row_str(&["Ann", "x", "B", "1.0", "N/A"])
            .expect_err("must fail");
        assert!(matches!(err, FrameError::CellParse { .. }));
        assert_eq!(frame.rows(), before);
    }

    #[test]
    fn append_tuple_extends_and_bumps_epoch() {
        let mut frame = seed_frame();
        let epoch = frame.epoch();
        frame
            .append_tuple((
                "Ann",
                30,
                b'B',
                10.0_f32,
                Some(Timestamp::date(1990, 1, 1)),
            ))
            .expect("append");
        assert_eq!(frame.rows(), 5);
        assert!(frame.epoch() > epoch);
    }

    #[test]
    fn append_matches_columns_by_name() {
        // The tuple frame in seed_frame carries Score and Level swapped
        // relative to the target schema; append projects by name.
        let frame = seed_frame();
        assert_eq!(
            frame.cell_by_name(2, "Score").expect("cell"),
            &Value::Float32(23.3)
        );
        assert_eq!(
            frame.cell_by_name(3, "Level").expect("cell"),
            &Value::Char(b'C')
        );
    }

    #[test]
    fn can_append_names_the_offending_column() {
        let frame = seed_frame();
        let other = Frame::from_tuples(vec![(1_i32,)], &["Name"]).expect("frame");
        let err = frame.can_append(&other).expect_err("must fail");
        assert!(matches!(
            err,
            FrameError::AppendMismatch { ref column, .. } if column == "Name"
        ));
    }

    #[test]
    fn null_policy_reject_refuses_null_cells() {
        let schema = Schema::new(vec![str_col("Name"), timestamp_col("BirthDate")]).expect("s");
        let mut frame = Frame::new(schema).with_null_policy(NullPolicy::Reject);
        let err = frame
            .append_row_str(&["Tom", "N/A"])
            .expect_err("must fail");
        assert!(matches!(
            err,
            FrameError::Type(rf_types::TypeError::NullRejected { .. })
        ));
    }

    #[test]
    fn cell_access_is_range_checked() {
        let frame = seed_frame();
        assert!(matches!(
            frame.cell(99, 0),
            Err(FrameError::RowOutOfRange { row: 99, rows: 4 })
        ));
        assert!(matches!(
            frame.cell(0, 99),
            Err(FrameError::ColOutOfRange { col: 99, cols: 5 })
        ));
        assert!(matches!(
            frame.cell_by_name(0, "Weight"),
            Err(FrameError::UnknownColumn(_))
        ));
    }

    #[test]
    fn deep_copy_is_independent() {
        let frame = seed_frame();
        let mut copy = frame.deep_copy();
        copy.append_tuple((
            "Ann",
            30,
            b'B',
            10.0_f32,
            None::<Timestamp>,
        ))
        .expect("append");
        assert_eq!(frame.rows(), 4);
        assert_eq!(copy.rows(), 5);
        assert_eq!(frame.cell(0, 0).expect("cell"), copy.cell(0, 0).expect("cell"));
    }

    #[test]
    fn row_ref_compares_selected_columns_lexicographically() {
        let frame = seed_frame();
        let cols = [2_usize, 3];
        let jonathon = frame.row_ref_cols(2, &cols);
        let john = frame.row_ref_cols(0, &cols);
        // ('A', 23.3) < ('A', 29.3)
        assert!(jonathon < john);
        assert!(jonathon.eq_values(&[Value::Char(b'A'), Value::Float64(23.3_f32 as f64)]));
    }

    #[test]
    fn row_ref_null_sorts_first() {
        let frame = seed_frame();
        let cols = [4_usize];
        let tom = frame.row_ref_cols(1, &cols); // Null birth date
        let john = frame.row_ref_cols(0, &cols);
        assert!(tom < john);
    }

    #[test]
    fn typed_column_handle_checks_the_tag() {
        let frame = seed_frame();
        let ages = frame.col_ref_typed::<i32>("Age").expect("typed");
        assert_eq!(ages.get(0), Some(&23));
        let err = frame.col_ref_typed::<f32>("Age").expect_err("must fail");
        assert!(matches!(err, FrameError::TypedColumnMismatch { .. }));
    }

    #[test]
    fn typed_column_handle_yields_none_for_null() {
        let frame = seed_frame();
        let births = frame
            .col_ref_typed::<Timestamp>("BirthDate")
            .expect("typed");
        assert!(births.get(1).is_none());
        assert_eq!(births.get(0), Some(&Timestamp::date(2000, 10, 22)));
    }

    #[test]
    fn view_projects_rows_and_columns() {
        let base = Rc::new(seed_frame());
        let view = View::of_named(Rc::clone(&base), vec![1, 2, 3], &["Name", "Level"])
            .expect("view");
        assert_eq!(view.shape(), (3, 2));
        assert!(view.is_view());
        assert_eq!(view.cell(0, 0).expect("cell"), &Value::Str("Tom".into()));
        assert_eq!(view.cell_by_name(1, "Level").expect("cell"), &Value::Char(b'A'));
    }

    #[test]
    fn view_of_view_collapses_to_the_base() {
        let base = Rc::new(seed_frame());
        let cols = View::of_cols_named(Rc::clone(&base), &["Name", "Level"]).expect("view");
        let rows = cols.subview_rows(vec![1, 2, 3]).expect("subview");
        assert_eq!(rows.shape(), (3, 2));
        assert!(Rc::ptr_eq(rows.underlying(), &base));
        assert_eq!(rows.underlying_row(0).expect("row"), 1);
        assert_eq!(rows.underlying_col(1).expect("col"), 2);
        // v.cell(i, j) == base.cell(v.row(i), v.col(j))
        for i in 0..rows.rows() {
            for j in 0..rows.cols() {
                let (bi, bj) = (
                    rows.underlying_row(i).expect("row"),
                    rows.underlying_col(j).expect("col"),
                );
                assert_eq!(rows.cell(i, j).expect("c"), base.cell(bi, bj).expect("c"));
            }
        }
    }

    #[test]
    fn view_checks_index_ranges() {
        let base = Rc::new(seed_frame());
        assert!(matches!(
            View::of_rows(Rc::clone(&base), vec![0, 9]),
            Err(FrameError::RowOutOfRange { row: 9, .. })
        ));
        assert!(matches!(
            View::of_cols(base, vec![7]),
            Err(FrameError::ColOutOfRange { col: 7, .. })
        ));
    }

    #[test]
    fn view_rejects_duplicate_projected_columns() {
        let base = Rc::new(seed_frame());
        assert!(matches!(
            View::of_cols(base, vec![0, 0]),
            Err(FrameError::DuplicateViewColumn(_))
        ));
    }

    #[test]
    fn sort_by_reorders_rows_only() {
        let base = Rc::new(seed_frame());
        let mut view = View::of_rows(Rc::clone(&base), vec![0, 2, 3]).expect("view");
        view.sort_by(&["Age"], false).expect("sort");
        assert_eq!(view.row_map(), &[3, 0, 2]); // ages 12, 23, 24
        view.sort_by(&["Age"], true).expect("sort");
        assert_eq!(view.row_map(), &[2, 0, 3]);
        assert_eq!(view.cols(), 5);
    }

    #[test]
    fn view_deep_copy_materializes_the_projection() {
        let base = Rc::new(seed_frame());
        let view = View::of_named(Rc::clone(&base), vec![3, 0], &["Name", "Age"])
            .expect("view");
        let copy = view.deep_copy();
        assert!(!copy.is_view());
        assert_eq!(copy.shape(), (2, 2));
        assert_eq!(copy.cell(0, 0).expect("cell"), &Value::Str("Jeff".into()));
        assert_eq!(copy.cell(1, 1).expect("cell"), &Value::Int32(23));
    }

    #[test]
    fn printing_joins_fields_and_rows() {
        let frame = Frame::from_tuples(
            vec![("John", 23_i32), ("Tom", 18_i32)],
            &["Name", "Age"],
        )
        .expect("frame");
        let text = frame.to_table_string(&PrintOptions::default());
        assert_eq!(text, "Name|Age\n\"John\"|23\n\"Tom\"|18\n");
        let bare = frame.to_table_string(&PrintOptions {
            header: false,
            field_sep: ',',
            row_sep: ';',
        });
        assert_eq!(bare, "\"John\",23;\"Tom\",18;");
    }

    #[test]
    fn selector_iterates_in_order() {
        let cols = [4_usize, 1];
        let many = ColSelector::Many(&cols);
        assert_eq!(many.iter().collect::<Vec<_>>(), vec![4, 1]);
        assert_eq!(ColSelector::One(3).iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn row_ref_all_spans_the_schema() {
        let frame = seed_frame();
        let row: RowRef<'_> = frame.row_ref(0);
        assert_eq!(row.width(), 5);
        assert_eq!(row.to_row()[0], Value::Str("John".into()));
    }

    #[test]
    fn cell_refs_compare_through_their_tables() {
        let frame = seed_frame();
        let john_age = frame.cell_ref(0, 1).expect("cell");
        let jonathon_age = frame.cell_ref(2, 1).expect("cell");
        assert!(john_age < jonathon_age); // 23 < 24
        assert_eq!(john_age.value(), &Value::Int32(23));
        assert!(frame.cell_ref(9, 0).is_err());
    }
}
