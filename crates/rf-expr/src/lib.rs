#![forbid(unsafe_code)]

use std::fmt;
use std::hash::Hasher;
use std::ops::{BitAnd, BitOr, Not};

use hashbrown::HashTable;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rf_frame::{ColSelector, FrameError, RowRef, Table};
use rf_types::{
    FieldType, IntoRow, NullPolicy, Row, Value, ValueOptions, is_field_compatible, render_value,
    row_eq, row_hash,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unknown column {0:?} in expression")]
    UnknownColumn(String),
    #[error("expression arity mismatch: {cols} columns against {values} literal fields")]
    Arity { cols: usize, values: usize },
    #[error("literal {value} is not compatible with column {column:?} of type {expected:?}")]
    Incompatible {
        value: String,
        column: String,
        expected: FieldType,
    },
    #[error("a membership expression requires at least one probe row")]
    EmptyMembership,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Comparison and membership operators carried by expression leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsIn,
    NotIn,
}

impl CmpOp {
    /// The logical opposite; `!leaf` routes through this table.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            Self::IsIn => Self::NotIn,
            Self::NotIn => Self::IsIn,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsIn => "isin",
            Self::NotIn => "notin",
        }
    }

    #[must_use]
    pub fn is_membership(self) -> bool {
        matches!(self, Self::IsIn | Self::NotIn)
    }
}

/// Start a single-column leaf: `col("Age").gt(12)`.
pub fn col(name: impl Into<String>) -> ColName {
    ColName { name: name.into() }
}

/// Start a multi-column leaf: `cols(["Level", "Age"]).eq((b'A', 24))`.
pub fn cols<I, S>(names: I) -> ColNames
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ColNames {
        names: names.into_iter().map(Into::into).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct ColName {
    name: String,
}

#[derive(Debug, Clone)]
pub struct ColNames {
    names: Vec<String>,
}

impl ColName {
    fn compare(self, op: CmpOp, value: impl Into<Value>) -> Expr {
        Expr {
            cols: vec![self.name],
            op,
            operand: Operand::Row(vec![value.into()]),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Ne, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Lt, value)
    }

    #[must_use]
    pub fn le(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Le, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Gt, value)
    }

    #[must_use]
    pub fn ge(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Ge, value)
    }

    #[must_use]
    pub fn isin<V: Into<Value>>(self, values: Vec<V>) -> Expr {
        Expr {
            cols: vec![self.name],
            op: CmpOp::IsIn,
            operand: Operand::Rows(values.into_iter().map(|v| vec![v.into()]).collect()),
        }
    }

    #[must_use]
    pub fn notin<V: Into<Value>>(self, values: Vec<V>) -> Expr {
        let mut expr = self.isin(values);
        expr.op = CmpOp::NotIn;
        expr
    }
}

impl ColNames {
    fn compare<T: IntoRow>(self, op: CmpOp, tuple: T) -> Expr {
        Expr {
            cols: self.names,
            op,
            operand: Operand::Row(tuple.into_row()),
        }
    }

    #[must_use]
    pub fn eq<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Eq, tuple)
    }

    #[must_use]
    pub fn ne<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Ne, tuple)
    }

    #[must_use]
    pub fn lt<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Lt, tuple)
    }

    #[must_use]
    pub fn le<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Le, tuple)
    }

    #[must_use]
    pub fn gt<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Gt, tuple)
    }

    #[must_use]
    pub fn ge<T: IntoRow>(self, tuple: T) -> Expr {
        self.compare(CmpOp::Ge, tuple)
    }

    #[must_use]
    pub fn isin<T: IntoRow>(self, rows: Vec<T>) -> Expr {
        Expr {
            cols: self.names,
            op: CmpOp::IsIn,
            operand: Operand::Rows(rows.into_iter().map(IntoRow::into_row).collect()),
        }
    }

    #[must_use]
    pub fn notin<T: IntoRow>(self, rows: Vec<T>) -> Expr {
        let mut expr = self.isin(rows);
        expr.op = CmpOp::NotIn;
        expr
    }
}

/// The literal an expression leaf carries: one row for comparisons, a row
/// set for membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Row(Row),
    Rows(Vec<Row>),
}

/// An expression leaf: column names, an operator, and the literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    cols: Vec<String>,
    op: CmpOp,
    operand: Operand,
}

/// A flat conjunction of leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndExpr {
    terms: Vec<Expr>,
}

/// A disjunction of conjunctions, the canonical predicate form.
///
/// `!OrExpr` is intentionally not implemented; normalize negations before
/// building a disjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrExpr {
    any: Vec<AndExpr>,
}

impl Expr {
    #[must_use]
    pub fn col_names(&self) -> &[String] {
        &self.cols
    }

    #[must_use]
    pub fn op(&self) -> CmpOp {
        self.op
    }

    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

impl AndExpr {
    #[must_use]
    pub fn terms(&self) -> &[Expr] {
        &self.terms
    }
}

impl OrExpr {
    #[must_use]
    pub fn groups(&self) -> &[AndExpr] {
        &self.any
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(mut self) -> Expr {
        self.op = self.op.negated();
        self
    }
}

impl Not for AndExpr {
    type Output = OrExpr;

    /// De Morgan: `!(a && b)` becomes `!a || !b`.
    fn not(self) -> OrExpr {
        OrExpr {
            any: self
                .terms
                .into_iter()
                .map(|term| AndExpr { terms: vec![!term] })
                .collect(),
        }
    }
}

impl BitAnd for Expr {
    type Output = AndExpr;

    fn bitand(self, rhs: Expr) -> AndExpr {
        AndExpr {
            terms: vec![self, rhs],
        }
    }
}

impl BitAnd<Expr> for AndExpr {
    type Output = AndExpr;

    fn bitand(mut self, rhs: Expr) -> AndExpr {
        self.terms.push(rhs);
        self
    }
}

impl BitOr for Expr {
    type Output = OrExpr;

    fn bitor(self, rhs: Expr) -> OrExpr {
        OrExpr {
            any: vec![AndExpr { terms: vec![self] }, AndExpr { terms: vec![rhs] }],
        }
    }
}

impl BitOr<Expr> for AndExpr {
    type Output = OrExpr;

    fn bitor(self, rhs: Expr) -> OrExpr {
        OrExpr {
            any: vec![self, AndExpr { terms: vec![rhs] }],
        }
    }
}

impl BitOr<AndExpr> for Expr {
    type Output = OrExpr;

    fn bitor(self, rhs: AndExpr) -> OrExpr {
        OrExpr {
            any: vec![AndExpr { terms: vec![self] }, rhs],
        }
    }
}

impl BitOr for AndExpr {
    type Output = OrExpr;

    fn bitor(self, rhs: AndExpr) -> OrExpr {
        OrExpr {
            any: vec![self, rhs],
        }
    }
}

impl BitOr for OrExpr {
    type Output = OrExpr;

    fn bitor(mut self, rhs: OrExpr) -> OrExpr {
        self.any.extend(rhs.any);
        self
    }
}

impl BitOr<AndExpr> for OrExpr {
    type Output = OrExpr;

    fn bitor(mut self, rhs: AndExpr) -> OrExpr {
        self.any.push(rhs);
        self
    }
}

impl BitOr<OrExpr> for AndExpr {
    type Output = OrExpr;

    fn bitor(self, mut rhs: OrExpr) -> OrExpr {
        rhs.any.insert(0, self);
        rhs
    }
}

impl BitOr<Expr> for OrExpr {
    type Output = OrExpr;

    fn bitor(mut self, rhs: Expr) -> OrExpr {
        self.any.push(AndExpr { terms: vec![rhs] });
        self
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opts = ValueOptions::default();
        write!(f, "[{}] {} ", self.cols.join(", "), self.op.symbol())?;
        match &self.operand {
            Operand::Row(row) => write!(f, "({})", render_fields(row, &opts)),
            Operand::Rows(rows) => {
                f.write_str("{")?;
                for (i, row) in rows.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "({})", render_fields(row, &opts))?;
                }
                f.write_str("}")
            }
        }
    }
}

fn render_fields(row: &[Value], opts: &ValueOptions) -> String {
    row.iter()
        .map(|v| render_value(v, opts))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for AndExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, term) in self.terms.iter().enumerate() {
            if i != 0 {
                f.write_str(" && ")?;
            }
            write!(f, "{term}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for OrExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, group) in self.any.iter().enumerate() {
            if i != 0 {
                f.write_str(" || ")?;
            }
            write!(f, "{group}")?;
        }
        f.write_str(")")
    }
}

/// Any predicate shape `select` accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Leaf(Expr),
    All(AndExpr),
    Any(OrExpr),
}

impl From<Expr> for Predicate {
    fn from(expr: Expr) -> Self {
        Self::Leaf(expr)
    }
}

impl From<AndExpr> for Predicate {
    fn from(expr: AndExpr) -> Self {
        Self::All(expr)
    }
}

impl From<OrExpr> for Predicate {
    fn from(expr: OrExpr) -> Self {
        Self::Any(expr)
    }
}

// ── Lowered conditions ─────────────────────────────────────────────────

/// A leaf validated against a concrete table: columns resolved to indices
/// and literal tags checked against the schema.
#[derive(Debug, Clone)]
pub struct Condition {
    cols: Vec<usize>,
    kind: ConditionKind,
}

#[derive(Debug, Clone)]
enum ConditionKind {
    Compare {
        op: CmpOp,
        operand: Row,
    },
    Membership {
        negated: bool,
        rows: Vec<Row>,
        /// Probe set over `rows` (indices), hashed with the canonical
        /// value hash.
        set: HashTable<usize>,
    },
}

impl Condition {
    #[must_use]
    pub fn op(&self) -> CmpOp {
        match &self.kind {
            ConditionKind::Compare { op, .. } => *op,
            ConditionKind::Membership { negated: false, .. } => CmpOp::IsIn,
            ConditionKind::Membership { negated: true, .. } => CmpOp::NotIn,
        }
    }

    #[must_use]
    pub fn col_indices(&self) -> &[usize] {
        &self.cols
    }

    /// The comparison literal, when this is a compare leaf.
    #[must_use]
    pub fn operand(&self) -> Option<&[Value]> {
        match &self.kind {
            ConditionKind::Compare { operand, .. } => Some(operand),
            ConditionKind::Membership { .. } => None,
        }
    }

    /// The membership probe rows, when this is an isin/notin leaf.
    #[must_use]
    pub fn probes(&self) -> Option<&[Row]> {
        match &self.kind {
            ConditionKind::Compare { .. } => None,
            ConditionKind::Membership { rows, .. } => Some(rows),
        }
    }

    /// Evaluate this leaf against one row of the table it was lowered for.
    #[must_use]
    pub fn eval_at_row(&self, table: &dyn Table, row: usize) -> bool {
        let row_ref = RowRef::with_cols(table, row, ColSelector::Many(&self.cols));
        match &self.kind {
            ConditionKind::Compare { op, operand } => match op {
                CmpOp::Eq => row_ref.eq_values(operand),
                CmpOp::Ne => !row_ref.eq_values(operand),
                CmpOp::Lt => row_ref.cmp_values(operand) == std::cmp::Ordering::Less,
                CmpOp::Le => row_ref.cmp_values(operand) != std::cmp::Ordering::Greater,
                CmpOp::Gt => row_ref.cmp_values(operand) == std::cmp::Ordering::Greater,
                CmpOp::Ge => row_ref.cmp_values(operand) != std::cmp::Ordering::Less,
                CmpOp::IsIn | CmpOp::NotIn => {
                    debug_assert!(false, "membership carried by a compare condition");
                    false
                }
            },
            ConditionKind::Membership { negated, rows, set } => {
                let mut hasher = FxHasher::default();
                row_ref.hash_values(&mut hasher);
                let hash = hasher.finish();
                let hit = set
                    .find(hash, |&probe| row_ref.eq_values(&rows[probe]))
                    .is_some();
                hit != *negated
            }
        }
    }
}

impl Expr {
    /// Resolve column names and validate the literal against the table's
    /// schema, producing an evaluable condition.
    pub fn to_condition(&self, table: &dyn Table) -> Result<Condition, ExprError> {
        let cols = self
            .cols
            .iter()
            .map(|name| {
                table
                    .col_index(name)
                    .map_err(|_| ExprError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match &self.operand {
            Operand::Row(row) => {
                check_literal(table, &cols, row)?;
                Ok(Condition {
                    cols,
                    kind: ConditionKind::Compare {
                        op: self.op,
                        operand: row.clone(),
                    },
                })
            }
            Operand::Rows(rows) => {
                if rows.is_empty() {
                    return Err(ExprError::EmptyMembership);
                }
                for row in rows {
                    check_literal(table, &cols, row)?;
                }
                let set = build_probe_set(rows);
                Ok(Condition {
                    cols,
                    kind: ConditionKind::Membership {
                        negated: self.op == CmpOp::NotIn,
                        rows: rows.clone(),
                        set,
                    },
                })
            }
        }
    }
}

impl AndExpr {
    /// Lower every leaf; fails atomically on the first invalid one.
    pub fn to_conditions(&self, table: &dyn Table) -> Result<Vec<Condition>, ExprError> {
        self.terms.iter().map(|term| term.to_condition(table)).collect()
    }
}

impl OrExpr {
    /// Lower every conjunction; fails atomically on the first invalid leaf.
    pub fn to_condition_groups(
        &self,
        table: &dyn Table,
    ) -> Result<Vec<Vec<Condition>>, ExprError> {
        self.any.iter().map(|group| group.to_conditions(table)).collect()
    }
}

fn check_literal(table: &dyn Table, cols: &[usize], row: &[Value]) -> Result<(), ExprError> {
    if row.len() != cols.len() {
        return Err(ExprError::Arity {
            cols: cols.len(),
            values: row.len(),
        });
    }
    for (&col, value) in cols.iter().zip(row) {
        let def = table.col_def(col)?;
        if !is_field_compatible(value, def, NullPolicy::Allow) {
            return Err(ExprError::Incompatible {
                value: render_value(value, table.options()),
                column: def.name.clone(),
                expected: def.field_type,
            });
        }
    }
    Ok(())
}

fn hash_probe_row(row: &[Value]) -> u64 {
    let mut hasher = FxHasher::default();
    row_hash(row, &mut hasher);
    hasher.finish()
}

fn build_probe_set(rows: &[Row]) -> HashTable<usize> {
    let mut set: HashTable<usize> = HashTable::with_capacity(rows.len());
    for (index, probe) in rows.iter().enumerate() {
        let hash = hash_probe_row(probe);
        let found = set
            .find(hash, |&existing| row_eq(&rows[existing], probe))
            .is_some();
        if !found {
            set.insert_unique(hash, index, |&existing| hash_probe_row(&rows[existing]));
        }
    }
    set
}
