//! Runtime values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::ty::{RecordType, Type};

/// A runtime value.
///
/// Equality and hashing are structural: two records are equal when their
/// layouts and field values are equal, floats compare by value with `NaN`
/// equal to itself. This is the equality used for grouping, distinct and
/// join keys. Values of different variants are never equal; numeric
/// promotion only happens in expression operators.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Record value.
    Record(Record),
    /// Group produced by a grouping operator.
    Group(Arc<Grouping>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as record reference.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as group reference.
    pub fn as_group(&self) -> Option<&Grouping> {
        match self {
            Value::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Get the items of an iterable value (array or group).
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            Value::Group(g) => Some(&g.items),
            _ => None,
        }
    }

    /// Consume an iterable value into its items.
    pub fn into_items(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            Value::Group(g) => Some(Arc::try_unwrap(g).map_or_else(|g| g.items.clone(), |g| g.items)),
            _ => None,
        }
    }

    /// Get a record field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(name))
    }

    /// Get the most specific runtime type of this value.
    ///
    /// Arrays report their common element type, or `any` when the elements
    /// disagree or the array is empty.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::String(_) => Type::String,
            Value::Array(items) => Type::array(common_type(items.iter())),
            Value::Record(r) => Type::Record(r.ty.clone()),
            Value::Group(g) => Type::grouping(g.key.type_of(), common_type(g.items.iter())),
        }
    }

    /// Total ordering used by sorting operators.
    ///
    /// Nulls sort first, integers and floats compare numerically, arrays
    /// and records compare element-wise. Values of unrelated kinds order by
    /// kind so that the result is always a total order.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => cmp_slices(a, b),
            (Value::Record(a), Value::Record(b)) => cmp_slices(&a.values, &b.values),
            (Value::Group(a), Value::Group(b)) => a.key.total_cmp(&b.key),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    /// The value in the form used to hash grouping, distinct and join keys.
    ///
    /// Floats with an integral value in `i64` range become `Int`, so keys
    /// match exactly when the expression `==` says they are equal. Arrays
    /// and records are canonicalized element-wise.
    pub fn canonical_key(&self) -> Value {
        match self {
            Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Value::Int(*f as i64)
            }
            Value::Array(items) => Value::Array(items.iter().map(Value::canonical_key).collect()),
            Value::Record(record) => Value::Record(Record::new(
                record.ty.clone(),
                record.values.iter().map(Value::canonical_key).collect(),
            )),
            other => other.clone(),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Record(_) => 5,
            Value::Group(_) => 6,
        }
    }

    /// Convert a JSON document into a value.
    ///
    /// Objects become anonymous records whose fields keep the map's key order,
    /// integral numbers become `Int` and all other numbers `Float`.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let fields: Vec<(String, Value)> = map
                    .into_iter()
                    .map(|(name, v)| (name, Value::from_json(v)))
                    .collect();
                Value::Record(Record::from_fields(None, fields))
            }
        }
    }
}

fn common_type<'a>(mut values: impl Iterator<Item = &'a Value>) -> Type {
    let Some(first) = values.next() else {
        return Type::Any;
    };
    let first = first.type_of();
    if values.all(|v| v.type_of() == first) {
        first
    } else {
        Type::Any
    }
}

fn cmp_slices(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => float_bits(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Record(r) => r.hash(state),
            Value::Group(g) => g.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Record(r) => write!(f, "{}", r),
            Value::Group(g) => write!(f, "Group({}, {} items)", g.key, g.items.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(r) => {
                let mut map = serializer.serialize_map(Some(r.values.len()))?;
                for (field, value) in r.ty.fields.iter().zip(&r.values) {
                    map.serialize_entry(&field.name, value)?;
                }
                map.end()
            }
            Value::Group(g) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("key", &g.key)?;
                map.serialize_entry("items", &g.items)?;
                map.end()
            }
        }
    }
}

/// A record value: a layout plus one value per field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    ty: Arc<RecordType>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record from a layout and field values in layout order.
    ///
    /// Missing trailing values are filled with `Null`, extra values are dropped.
    pub fn new(ty: Arc<RecordType>, mut values: Vec<Value>) -> Self {
        values.resize(ty.fields.len(), Value::Null);
        Self { ty, values }
    }

    /// Create a record from named values, deriving the layout from the values.
    pub fn from_fields<N: Into<String>>(
        name: Option<&str>,
        fields: impl IntoIterator<Item = (N, Value)>,
    ) -> Self {
        let mut ty = RecordType {
            name: name.map(str::to_string),
            fields: Vec::new(),
        };
        let mut values = Vec::new();
        for (field, value) in fields {
            ty = ty.with_field(field, value.type_of());
            values.push(value);
        }
        Self {
            ty: Arc::new(ty),
            values,
        }
    }

    /// Get the record layout.
    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    /// Get the field values in layout order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ty.field(name).map(|(i, _)| &self.values[i])
    }

    /// Get a field value by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.ty.name {
            write!(f, "{} ", name)?;
        }
        f.write_str("{ ")?;
        for (i, (field, value)) in self.ty.fields.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, value)?;
        }
        f.write_str(" }")
    }
}

/// Elements sharing a grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grouping {
    /// The shared key.
    pub key: Value,
    /// Elements in source order.
    pub items: Vec<Value>,
}

impl Grouping {
    /// Create a group.
    pub fn new(key: Value, items: Vec<Value>) -> Self {
        Self { key, items }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}
