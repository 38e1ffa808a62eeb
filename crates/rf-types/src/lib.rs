#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rf_time::{Timestamp, TimeError, parse_timestamp};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("cannot parse {text:?} as {expected:?}")]
    Parse { text: String, expected: FieldType },
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),
    #[error("row has {got} fields but the schema has {expected} columns")]
    RowArity { got: usize, expected: usize },
    #[error("field {value} is not compatible with column {column:?} of type {expected:?}")]
    IncompatibleField {
        value: String,
        column: String,
        expected: FieldType,
    },
    #[error("null field rejected for column {column:?}")]
    NullRejected { column: String },
}

/// The closed discriminator set of [`Value`].
///
/// Vector tags sit contiguously after the scalar tags, so vec-ness and the
/// element tag are discriminant arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FieldType {
    Null = 0,
    Str,
    Bool,
    Char,
    Int32,
    Int64,
    Float32,
    Float64,
    Timestamp,
    StrVec,
    BoolVec,
    CharVec,
    Int32Vec,
    Int64Vec,
    Float32Vec,
    Float64Vec,
    TimestampVec,
}

const VECTOR_FLAG: u8 = FieldType::StrVec as u8;
const SCALAR_SPAN: u8 = VECTOR_FLAG - FieldType::Str as u8;

impl FieldType {
    #[must_use]
    pub fn is_vec(self) -> bool {
        self as u8 >= VECTOR_FLAG
    }

    /// The element tag of a vector tag; scalar tags return themselves.
    #[must_use]
    pub fn element(self) -> FieldType {
        if self.is_vec() {
            FieldType::from_u8(self as u8 - SCALAR_SPAN).unwrap_or(self)
        } else {
            self
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Float32 | Self::Float64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        let found = match tag {
            0 => Self::Null,
            1 => Self::Str,
            2 => Self::Bool,
            3 => Self::Char,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::Float32,
            7 => Self::Float64,
            8 => Self::Timestamp,
            9 => Self::StrVec,
            10 => Self::BoolVec,
            11 => Self::CharVec,
            12 => Self::Int32Vec,
            13 => Self::Int64Vec,
            14 => Self::Float32Vec,
            15 => Self::Float64Vec,
            16 => Self::TimestampVec,
            _ => return None,
        };
        Some(found)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Str => "Str",
            Self::Bool => "Bool",
            Self::Char => "Char",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Timestamp => "Timestamp",
            Self::StrVec => "StrVec",
            Self::BoolVec => "BoolVec",
            Self::CharVec => "CharVec",
            Self::Int32Vec => "Int32Vec",
            Self::Int64Vec => "Int64Vec",
            Self::Float32Vec => "Float32Vec",
            Self::Float64Vec => "Float64Vec",
            Self::TimestampVec => "TimestampVec",
        }
    }
}

/// A single cell value: a tagged sum over the closed tag set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Str(String),
    Bool(bool),
    Char(u8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Timestamp(Timestamp),
    StrVec(Vec<String>),
    BoolVec(Vec<bool>),
    CharVec(Vec<u8>),
    Int32Vec(Vec<i32>),
    Int64Vec(Vec<i64>),
    Float32Vec(Vec<f32>),
    Float64Vec(Vec<f64>),
    TimestampVec(Vec<Timestamp>),
}

pub type Row = Vec<Value>;

impl Value {
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Null => FieldType::Null,
            Self::Str(_) => FieldType::Str,
            Self::Bool(_) => FieldType::Bool,
            Self::Char(_) => FieldType::Char,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float32(_) => FieldType::Float32,
            Self::Float64(_) => FieldType::Float64,
            Self::Timestamp(_) => FieldType::Timestamp,
            Self::StrVec(_) => FieldType::StrVec,
            Self::BoolVec(_) => FieldType::BoolVec,
            Self::CharVec(_) => FieldType::CharVec,
            Self::Int32Vec(_) => FieldType::Int32Vec,
            Self::Int64Vec(_) => FieldType::Int64Vec,
            Self::Float32Vec(_) => FieldType::Float32Vec,
            Self::Float64Vec(_) => FieldType::Float64Vec,
            Self::TimestampVec(_) => FieldType::TimestampVec,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.field_type().is_numeric()
    }

    /// The integral reading of an integer variant.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// The widened reading of any numeric variant.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float32(v) => Some(f64::from(*v)),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(value_cmp(self, other))
    }
}

/// Equality with the null and numeric-coercion rules.
///
/// Null equals only Null; integer pairs compare as `i64`; any float
/// involvement compares as `f64`. Other cross-tag pairs are unequal.
#[must_use]
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if a.is_numeric() && b.is_numeric() {
        return a.as_f64() == b.as_f64();
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Timestamp(x), Value::Timestamp(y)) => x == y,
        (Value::StrVec(x), Value::StrVec(y)) => x == y,
        (Value::BoolVec(x), Value::BoolVec(y)) => x == y,
        (Value::CharVec(x), Value::CharVec(y)) => x == y,
        (Value::Int32Vec(x), Value::Int32Vec(y)) => x == y,
        (Value::Int64Vec(x), Value::Int64Vec(y)) => x == y,
        (Value::Float32Vec(x), Value::Float32Vec(y)) => x == y,
        (Value::Float64Vec(x), Value::Float64Vec(y)) => x == y,
        (Value::TimestampVec(x), Value::TimestampVec(y)) => x == y,
        _ => false,
    }
}

/// Total ordering with the null and numeric-coercion rules.
///
/// Null sorts before every non-Null. Cross-tag non-numeric pairs cannot
/// occur through schema-validated paths; the fallback keeps the comparator
/// total by ordering on the tag discriminant.
#[must_use]
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if a.is_numeric() && b.is_numeric() {
        let (x, y) = (a.as_f64(), b.as_f64());
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp_instant(y),
        (Value::StrVec(x), Value::StrVec(y)) => x.cmp(y),
        (Value::BoolVec(x), Value::BoolVec(y)) => x.cmp(y),
        (Value::CharVec(x), Value::CharVec(y)) => x.cmp(y),
        (Value::Int32Vec(x), Value::Int32Vec(y)) => x.cmp(y),
        (Value::Int64Vec(x), Value::Int64Vec(y)) => x.cmp(y),
        (Value::Float32Vec(x), Value::Float32Vec(y)) => {
            cmp_slices_by(x, y, |l, r| l.partial_cmp(r).unwrap_or(Ordering::Equal))
        }
        (Value::Float64Vec(x), Value::Float64Vec(y)) => {
            cmp_slices_by(x, y, |l, r| l.partial_cmp(r).unwrap_or(Ordering::Equal))
        }
        (Value::TimestampVec(x), Value::TimestampVec(y)) => {
            cmp_slices_by(x, y, Timestamp::cmp_instant)
        }
        _ => {
            debug_assert!(
                false,
                "ordering {} against {} is a schema violation",
                a.field_type().name(),
                b.field_type().name()
            );
            (a.field_type() as u8).cmp(&(b.field_type() as u8))
        }
    }
}

fn cmp_slices_by<T>(a: &[T], b: &[T], mut cmp: impl FnMut(&T, &T) -> Ordering) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match cmp(x, y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Hash a value consistently with [`value_eq`].
///
/// Numerics are canonicalized first (integers as `i64`; floats with an
/// integral value as that integer, otherwise as their bit pattern) so that
/// coercion-equal values land in the same bucket.
pub fn value_hash<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => state.write_u8(0),
        Value::Str(s) => {
            state.write_u8(1);
            s.hash(state);
        }
        Value::Bool(v) => {
            state.write_u8(2);
            v.hash(state);
        }
        Value::Char(v) => {
            state.write_u8(3);
            v.hash(state);
        }
        Value::Int32(v) => hash_numeric_i64(i64::from(*v), state),
        Value::Int64(v) => hash_numeric_i64(*v, state),
        Value::Float32(v) => hash_numeric_f64(f64::from(*v), state),
        Value::Float64(v) => hash_numeric_f64(*v, state),
        Value::Timestamp(ts) => {
            state.write_u8(5);
            state.write_i64(ts.epoch_nanos(false));
        }
        Value::StrVec(v) => hash_vec(6, v, state, |e, s| e.hash(s)),
        Value::BoolVec(v) => hash_vec(7, v, state, |e, s| e.hash(s)),
        Value::CharVec(v) => hash_vec(8, v, state, |e, s| e.hash(s)),
        Value::Int32Vec(v) => hash_vec(9, v, state, |e, s| e.hash(s)),
        Value::Int64Vec(v) => hash_vec(10, v, state, |e, s| e.hash(s)),
        Value::Float32Vec(v) => hash_vec(11, v, state, |e, s| s.write_u32(e.to_bits())),
        Value::Float64Vec(v) => hash_vec(12, v, state, |e, s| s.write_u64(e.to_bits())),
        Value::TimestampVec(v) => {
            hash_vec(13, v, state, |e, s| s.write_i64(e.epoch_nanos(false)));
        }
    }
}

fn hash_numeric_i64<H: Hasher>(v: i64, state: &mut H) {
    state.write_u8(4);
    state.write_i64(v);
}

fn hash_numeric_f64<H: Hasher>(v: f64, state: &mut H) {
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        hash_numeric_i64(v as i64, state);
    } else {
        state.write_u8(4);
        state.write_u64(v.to_bits());
    }
}

fn hash_vec<T, H: Hasher>(tag: u8, items: &[T], state: &mut H, mut each: impl FnMut(&T, &mut H)) {
    state.write_u8(tag);
    state.write_usize(items.len());
    for item in items {
        each(item, state);
    }
}

/// Field-wise lifting of [`value_eq`].
#[must_use]
pub fn row_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| value_eq(x, y))
}

/// Lexicographic lifting of [`value_cmp`].
#[must_use]
pub fn row_cmp(a: &[Value], b: &[Value]) -> Ordering {
    cmp_slices_by(a, b, value_cmp)
}

pub fn row_hash<H: Hasher>(row: &[Value], state: &mut H) {
    for value in row {
        value_hash(value, state);
    }
}

// ── Conversions ────────────────────────────────────────────────────────

macro_rules! impl_value_from {
    ($($variant:ident: $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_value_from!(
    Str: String,
    Bool: bool,
    Char: u8,
    Int32: i32,
    Int64: i64,
    Float32: f32,
    Float64: f64,
    Timestamp: Timestamp,
    StrVec: Vec<String>,
    BoolVec: Vec<bool>,
    CharVec: Vec<u8>,
    Int32Vec: Vec<i32>,
    Int64Vec: Vec<i64>,
    Float32Vec: Vec<f32>,
    Float64Vec: Vec<f64>,
    TimestampVec: Vec<Timestamp>,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A typed element of a tuple row: knows its tag statically.
pub trait IntoField {
    fn field_type() -> FieldType;
    fn into_value(self) -> Value;
}

macro_rules! impl_into_field {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl IntoField for $ty {
                fn field_type() -> FieldType {
                    FieldType::$tag
                }
                fn into_value(self) -> Value {
                    self.into()
                }
            }
        )*
    };
}

impl_into_field!(
    String => Str,
    &str => Str,
    bool => Bool,
    u8 => Char,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Timestamp => Timestamp,
    Vec<String> => StrVec,
    Vec<bool> => BoolVec,
    Vec<u8> => CharVec,
    Vec<i32> => Int32Vec,
    Vec<i64> => Int64Vec,
    Vec<f32> => Float32Vec,
    Vec<f64> => Float64Vec,
    Vec<Timestamp> => TimestampVec,
);

impl<T: IntoField> IntoField for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoField::into_value)
    }
}

/// A scalar type that a typed column handle can extract.
pub trait FieldScalar {
    const FIELD_TYPE: FieldType;
    fn extract(value: &Value) -> Option<&Self>;
}

macro_rules! impl_field_scalar {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl FieldScalar for $ty {
                const FIELD_TYPE: FieldType = FieldType::$tag;
                fn extract(value: &Value) -> Option<&Self> {
                    match value {
                        Value::$tag(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_field_scalar!(
    String => Str,
    bool => Bool,
    u8 => Char,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Timestamp => Timestamp,
);

/// A statically-typed tuple convertible to a [`Row`] plus its column tags.
pub trait IntoRow {
    fn field_types() -> Vec<FieldType>;
    fn into_row(self) -> Row;
}

macro_rules! impl_into_row {
    ($($name:ident),+) => {
        impl<$($name: IntoField),+> IntoRow for ($($name,)+) {
            fn field_types() -> Vec<FieldType> {
                vec![$($name::field_type()),+]
            }
            #[allow(non_snake_case)]
            fn into_row(self) -> Row {
                let ($($name,)+) = self;
                vec![$($name.into_value()),+]
            }
        }
    };
}

impl_into_row!(A);
impl_into_row!(A, B);
impl_into_row!(A, B, C);
impl_into_row!(A, B, C, D);
impl_into_row!(A, B, C, D, E);
impl_into_row!(A, B, C, D, E, F);
impl_into_row!(A, B, C, D, E, F, G);
impl_into_row!(A, B, C, D, E, F, G, H);

// ── Null policy and render/parse options ───────────────────────────────

/// Whether Null fields are admitted when rows are constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    #[default]
    Allow,
    Reject,
}

/// Parse and render configuration threaded through a frame.
///
/// The null sentinel is matched case-insensitively on parse and emitted
/// verbatim on render. Never process-global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueOptions {
    pub null_text: String,
    pub parse_null: bool,
}

impl Default for ValueOptions {
    fn default() -> Self {
        Self {
            null_text: "N/A".to_owned(),
            parse_null: true,
        }
    }
}

impl ValueOptions {
    #[must_use]
    pub fn is_null_text(&self, text: &str) -> bool {
        text.eq_ignore_ascii_case(&self.null_text)
    }
}

// ── Parsing ────────────────────────────────────────────────────────────

/// Parse a cell string under a column tag.
///
/// The null sentinel wins (when enabled) before any tag dispatch. Bool
/// reads the first byte only; Char takes the first byte; numerics must
/// consume the whole string. Vector tags never parse from cell text.
pub fn parse_value(text: &str, tag: FieldType, opts: &ValueOptions) -> Result<Value, TypeError> {
    if opts.parse_null && opts.is_null_text(text) {
        return Ok(Value::Null);
    }
    let parse_err = || TypeError::Parse {
        text: text.to_owned(),
        expected: tag,
    };
    match tag {
        FieldType::Null => Err(parse_err()),
        FieldType::Str => Ok(Value::Str(text.to_owned())),
        FieldType::Bool => match text.as_bytes().first() {
            Some(b'0' | b'f' | b'F' | b'N' | b'n') => Ok(Value::Bool(false)),
            Some(b'1' | b't' | b'T' | b'Y' | b'y') => Ok(Value::Bool(true)),
            _ => Err(parse_err()),
        },
        FieldType::Char => text
            .as_bytes()
            .first()
            .map(|b| Value::Char(*b))
            .ok_or_else(parse_err),
        FieldType::Int32 => text.parse().map(Value::Int32).map_err(|_| parse_err()),
        FieldType::Int64 => text.parse().map(Value::Int64).map_err(|_| parse_err()),
        FieldType::Float32 => text.parse().map(Value::Float32).map_err(|_| parse_err()),
        FieldType::Float64 => text.parse().map(Value::Float64).map_err(|_| parse_err()),
        FieldType::Timestamp => Ok(Value::Timestamp(parse_timestamp(text)?)),
        _ => Err(parse_err()),
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render a value for table output: Null as the configured sentinel,
/// strings double-quoted, chars single-quoted, vectors bracketed.
#[must_use]
pub fn render_value(value: &Value, opts: &ValueOptions) -> String {
    match value {
        Value::Null => opts.null_text.clone(),
        Value::Str(s) => format!("\"{s}\""),
        Value::Bool(v) => v.to_string(),
        Value::Char(c) => format!("'{}'", *c as char),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Timestamp(ts) => ts.to_string(),
        Value::StrVec(v) => render_slice(v, |e| format!("\"{e}\"")),
        Value::BoolVec(v) => render_slice(v, ToString::to_string),
        Value::CharVec(v) => render_slice(v, |c| format!("'{}'", *c as char)),
        Value::Int32Vec(v) => render_slice(v, ToString::to_string),
        Value::Int64Vec(v) => render_slice(v, ToString::to_string),
        Value::Float32Vec(v) => render_slice(v, ToString::to_string),
        Value::Float64Vec(v) => render_slice(v, ToString::to_string),
        Value::TimestampVec(v) => render_slice(v, ToString::to_string),
    }
}

fn render_slice<T>(items: &[T], mut each: impl FnMut(&T) -> String) -> String {
    let mut out = String::from("[");
    for (i, item) in items.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(&each(item));
    }
    out.push(']');
    out
}

/// Render a row joined by `sep`.
#[must_use]
pub fn render_row(row: &[Value], opts: &ValueOptions, sep: &str) -> String {
    let fields: Vec<String> = row.iter().map(|v| render_value(v, opts)).collect();
    fields.join(sep)
}

// ── Schema ─────────────────────────────────────────────────────────────

/// A column's tag and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub field_type: FieldType,
    pub name: String,
}

impl ColumnDef {
    pub fn new(field_type: FieldType, name: impl Into<String>) -> Self {
        Self {
            field_type,
            name: name.into(),
        }
    }
}

macro_rules! col_constructors {
    ($($fn_name:ident => $tag:ident),* $(,)?) => {
        $(
            pub fn $fn_name(name: impl Into<String>) -> ColumnDef {
                ColumnDef::new(FieldType::$tag, name)
            }
        )*
    };
}

col_constructors!(
    str_col => Str,
    bool_col => Bool,
    char_col => Char,
    int32_col => Int32,
    int64_col => Int64,
    float32_col => Float32,
    float64_col => Float64,
    timestamp_col => Timestamp,
);

/// Ordered column descriptors plus the name lookup the frame keeps in sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnDef>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, TypeError> {
        let mut by_name = HashMap::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            if by_name.insert(col.name.clone(), idx).is_some() {
                return Err(TypeError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns, by_name })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    #[must_use]
    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }
}

// ── Compatibility checks ───────────────────────────────────────────────

/// A field fits a column when it is Null (and the policy allows), shares
/// the column's tag, or both sides are numeric.
#[must_use]
pub fn is_field_compatible(value: &Value, def: &ColumnDef, policy: NullPolicy) -> bool {
    if value.is_null() {
        return policy == NullPolicy::Allow;
    }
    let tag = value.field_type();
    tag == def.field_type || (tag.is_numeric() && def.field_type.is_numeric())
}

/// Check a whole row against a schema, reporting the first offender.
pub fn check_row_compatible(
    row: &[Value],
    schema: &Schema,
    policy: NullPolicy,
    opts: &ValueOptions,
) -> Result<(), TypeError> {
    if row.len() != schema.len() {
        return Err(TypeError::RowArity {
            got: row.len(),
            expected: schema.len(),
        });
    }
    for (value, def) in row.iter().zip(schema.columns()) {
        if value.is_null() && policy == NullPolicy::Reject {
            return Err(TypeError::NullRejected {
                column: def.name.clone(),
            });
        }
        if !is_field_compatible(value, def, policy) {
            return Err(TypeError::IncompatibleField {
                value: render_value(value, opts),
                column: def.name.clone(),
                expected: def.field_type,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::hash::Hasher;

    use super::{
        ColumnDef, FieldType, IntoRow, NullPolicy, Schema, Timestamp, TypeError, Value,
        ValueOptions, char_col, check_row_compatible, float32_col, int32_col, is_field_compatible,
        parse_value, render_value, str_col, timestamp_col, value_cmp, value_eq, value_hash,
    };

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        value_hash(value, &mut hasher);
        hasher.finish()
    }

    #[test]
    fn vector_tags_follow_their_scalars() {
        assert!(!FieldType::Timestamp.is_vec());
        assert!(FieldType::TimestampVec.is_vec());
        assert_eq!(FieldType::StrVec.element(), FieldType::Str);
        assert_eq!(FieldType::Float64Vec.element(), FieldType::Float64);
        assert_eq!(FieldType::Int32.element(), FieldType::Int32);
    }

    #[test]
    fn null_equals_only_null() {
        assert!(value_eq(&Value::Null, &Value::Null));
        assert!(!value_eq(&Value::Null, &Value::Int32(0)));
        assert!(!value_eq(&Value::Str(String::new()), &Value::Null));
    }

    #[test]
    fn null_sorts_before_everything() {
        assert_eq!(value_cmp(&Value::Null, &Value::Null), Ordering::Equal);
        assert_eq!(
            value_cmp(&Value::Null, &Value::Int32(i32::MIN)),
            Ordering::Less
        );
        assert_eq!(
            value_cmp(&Value::Str("".into()), &Value::Null),
            Ordering::Greater
        );
    }

    #[test]
    fn integers_compare_across_widths() {
        assert!(value_eq(&Value::Int32(5), &Value::Int64(5)));
        assert_eq!(
            value_cmp(&Value::Int64(4), &Value::Int32(5)),
            Ordering::Less
        );
    }

    #[test]
    fn float_involvement_widens_to_double() {
        assert!(value_eq(&Value::Int32(5), &Value::Float64(5.0)));
        assert!(value_eq(&Value::Float32(2.5), &Value::Float64(2.5)));
        assert_eq!(
            value_cmp(&Value::Int32(5), &Value::Float32(5.5)),
            Ordering::Less
        );
        assert_eq!(
            value_cmp(&Value::Float64(6.0), &Value::Int64(5)),
            Ordering::Greater
        );
    }

    #[test]
    fn coercion_equal_values_hash_equal() {
        assert_eq!(hash_of(&Value::Int32(7)), hash_of(&Value::Int64(7)));
        assert_eq!(hash_of(&Value::Int64(7)), hash_of(&Value::Float64(7.0)));
        assert_eq!(hash_of(&Value::Float32(7.0)), hash_of(&Value::Int32(7)));
        assert_ne!(hash_of(&Value::Int32(7)), hash_of(&Value::Int32(8)));
    }

    #[test]
    fn cross_tag_non_numeric_is_unequal() {
        assert!(!value_eq(&Value::Str("1".into()), &Value::Int32(1)));
        assert!(!value_eq(&Value::Bool(true), &Value::Int32(1)));
        assert!(!value_eq(&Value::Char(b'5'), &Value::Int32(5)));
    }

    #[test]
    fn parse_null_sentinel_is_case_insensitive() {
        let opts = ValueOptions::default();
        assert_eq!(
            parse_value("N/A", FieldType::Int32, &opts).expect("null"),
            Value::Null
        );
        assert_eq!(
            parse_value("n/a", FieldType::Str, &opts).expect("null"),
            Value::Null
        );
        let strict = ValueOptions {
            parse_null: false,
            ..ValueOptions::default()
        };
        assert!(parse_value("N/A", FieldType::Int32, &strict).is_err());
    }

    #[test]
    fn parse_bool_reads_first_byte() {
        let opts = ValueOptions::default();
        for text in ["0", "false", "F", "No", "n"] {
            assert_eq!(
                parse_value(text, FieldType::Bool, &opts).expect("bool"),
                Value::Bool(false),
                "{text}"
            );
        }
        for text in ["1", "true", "T", "Yes", "y"] {
            assert_eq!(
                parse_value(text, FieldType::Bool, &opts).expect("bool"),
                Value::Bool(true),
                "{text}"
            );
        }
        assert!(parse_value("maybe", FieldType::Bool, &opts).is_err());
    }

    #[test]
    fn parse_numeric_requires_whole_string() {
        let opts = ValueOptions::default();
        assert_eq!(
            parse_value("23", FieldType::Int32, &opts).expect("int"),
            Value::Int32(23)
        );
        assert!(parse_value("23x", FieldType::Int32, &opts).is_err());
        assert_eq!(
            parse_value("29.3", FieldType::Float32, &opts).expect("float"),
            Value::Float32(29.3)
        );
    }

    #[test]
    fn parse_timestamp_cell() {
        let opts = ValueOptions::default();
        let parsed = parse_value("2000/10/22", FieldType::Timestamp, &opts).expect("timestamp");
        assert_eq!(parsed, Value::Timestamp(Timestamp::date(2000, 10, 22)));
    }

    #[test]
    fn vector_cells_do_not_parse() {
        let opts = ValueOptions::default();
        assert!(matches!(
            parse_value("[1, 2]", FieldType::Int32Vec, &opts),
            Err(TypeError::Parse { .. })
        ));
    }

    #[test]
    fn rendering_quotes_text_and_chars() {
        let opts = ValueOptions::default();
        assert_eq!(render_value(&Value::Str("Tom".into()), &opts), "\"Tom\"");
        assert_eq!(render_value(&Value::Char(b'A'), &opts), "'A'");
        assert_eq!(render_value(&Value::Null, &opts), "N/A");
        assert_eq!(
            render_value(&Value::Int32Vec(vec![1, 2]), &opts),
            "[1, 2]"
        );
    }

    #[test]
    fn schema_rejects_duplicate_names() {
        let err = Schema::new(vec![int32_col("a"), str_col("a")]).expect_err("must fail");
        assert_eq!(err, TypeError::DuplicateColumn("a".to_owned()));
    }

    #[test]
    fn schema_name_lookup_follows_order() {
        let schema = Schema::new(vec![str_col("Name"), int32_col("Age")]).expect("schema");
        assert_eq!(schema.col_index("Age"), Some(1));
        assert_eq!(schema.col_index("Level"), None);
    }

    #[test]
    fn tuple_rows_carry_static_tags() {
        type Seed = (String, i32, u8, f32, Option<Timestamp>);
        assert_eq!(
            <Seed as IntoRow>::field_types(),
            vec![
                FieldType::Str,
                FieldType::Int32,
                FieldType::Char,
                FieldType::Float32,
                FieldType::Timestamp,
            ]
        );
        let row = ("Tom".to_owned(), 18, b'B', 45.2_f32, None::<Timestamp>).into_row();
        assert_eq!(row[4], Value::Null);
    }

    #[test]
    fn numeric_fields_are_column_compatible() {
        let col = float32_col("Score");
        assert!(is_field_compatible(&Value::Int32(1), &col, NullPolicy::Allow));
        assert!(is_field_compatible(&Value::Float64(1.0), &col, NullPolicy::Allow));
        assert!(!is_field_compatible(&Value::Str("x".into()), &col, NullPolicy::Allow));
    }

    #[test]
    fn null_policy_gates_null_fields() {
        let col = timestamp_col("BirthDate");
        assert!(is_field_compatible(&Value::Null, &col, NullPolicy::Allow));
        assert!(!is_field_compatible(&Value::Null, &col, NullPolicy::Reject));
    }

    #[test]
    fn row_check_reports_first_offender() {
        let schema = Schema::new(vec![str_col("Name"), char_col("Level")]).expect("schema");
        let opts = ValueOptions::default();
        let err = check_row_compatible(
            &[Value::Str("John".into()), Value::Int32(3)],
            &schema,
            NullPolicy::Allow,
            &opts,
        )
        .expect_err("must fail");
        assert!(matches!(
            err,
            TypeError::IncompatibleField { ref column, .. } if column == "Level"
        ));

        let err = check_row_compatible(
            &[Value::Str("John".into())],
            &schema,
            NullPolicy::Allow,
            &opts,
        )
        .expect_err("must fail");
        assert_eq!(err, TypeError::RowArity { got: 1, expected: 2 });
    }

    #[test]
    fn column_constructors_name_their_tags() {
        let col = ColumnDef::new(FieldType::Int64, "id");
        assert_eq!(col.field_type.name(), "Int64");
        assert_eq!(str_col("Name").field_type, FieldType::Str);
    }
}
