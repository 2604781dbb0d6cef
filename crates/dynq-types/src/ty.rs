//! Runtime type descriptors.
//!
//! Every value flowing through a dynamic query has a [`Type`] known at
//! composition time. Types are plain data: they can be compared, hashed and
//! cloned freely, and record layouts are shared behind an `Arc`.

use std::fmt;
use std::sync::Arc;

/// Name of the lazily evaluated sequence container.
pub const SEQUENCE: &str = "Sequence";
/// Name of the sequence produced by ordering operators.
pub const ORDERED_SEQUENCE: &str = "OrderedSequence";
/// Name of the list container.
pub const LIST: &str = "List";
/// Name of the group container produced by grouping operators.
pub const GROUPING: &str = "Grouping";
/// Name of the key/value map container.
pub const MAP: &str = "Map";

/// A runtime type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Dynamically typed value; compatible with everything.
    Any,
    /// The type of the `null` literal.
    Null,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Array of elements.
    Array(Box<Type>),
    /// Generic container such as `List<T>` or `Grouping<K, T>`.
    Generic { name: String, args: Vec<Type> },
    /// Record with an ordered list of named fields.
    Record(Arc<RecordType>),
}

impl Type {
    /// Array of `element`.
    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// Generic container type.
    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Generic {
            name: name.into(),
            args,
        }
    }

    /// Lazily evaluated sequence of `element`.
    pub fn sequence(element: Type) -> Self {
        Self::generic(SEQUENCE, vec![element])
    }

    /// Sequence of `element` that carries an ordering.
    pub fn ordered_sequence(element: Type) -> Self {
        Self::generic(ORDERED_SEQUENCE, vec![element])
    }

    /// List of `element`.
    pub fn list(element: Type) -> Self {
        Self::generic(LIST, vec![element])
    }

    /// Group of `element`s sharing a `key`.
    pub fn grouping(key: Type, element: Type) -> Self {
        Self::generic(GROUPING, vec![key, element])
    }

    /// Map from `key` to `value`.
    pub fn map(key: Type, value: Type) -> Self {
        Self::generic(MAP, vec![key, value])
    }

    /// Record type.
    pub fn record(record: RecordType) -> Self {
        Type::Record(Arc::new(record))
    }

    /// Check if this is `Int` or `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Check if values of this type can be ordered.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Type::Any | Type::Null | Type::Bool | Type::Int | Type::Float | Type::String
        )
    }

    /// Get the element type when this type can be iterated.
    ///
    /// Arrays, sequences, lists and groupings are iterable; a grouping
    /// iterates its elements, not its key.
    pub fn sequence_element(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            Type::Generic { name, args } => match (name.as_str(), args.as_slice()) {
                (SEQUENCE | ORDERED_SEQUENCE | LIST, [element]) => Some(element),
                (GROUPING, [_, element]) => Some(element),
                _ => None,
            },
            _ => None,
        }
    }

    /// Check if this type can be iterated.
    pub fn is_sequence(&self) -> bool {
        self.sequence_element().is_some()
    }

    /// Check if this is an ordered sequence.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Type::Generic { name, .. } if name == ORDERED_SEQUENCE)
    }

    /// Get the record layout for record types.
    pub fn as_record(&self) -> Option<&Arc<RecordType>> {
        match self {
            Type::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Check if a value of type `other` can be used where `self` is expected
    /// without conversion.
    ///
    /// `null` is assignable to every type and `any` is compatible in both
    /// directions. A `Sequence<T>` accepts any iterable of `T`.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other || matches!(self, Type::Any) || matches!(other, Type::Any | Type::Null) {
            return true;
        }
        match self {
            Type::Generic { name, args } if name == SEQUENCE && args.len() == 1 => other
                .sequence_element()
                .is_some_and(|element| args[0].is_assignable_from(element)),
            _ => false,
        }
    }

    /// Check if `other` widens to `self` through a numeric conversion.
    pub fn is_widening_from(&self, other: &Type) -> bool {
        matches!((self, other), (Type::Float, Type::Int))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Null => f.write_str("null"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::String => f.write_str("string"),
            Type::Array(element) => write!(f, "{}[]", element),
            Type::Generic { name, args } => {
                write!(f, "{}<", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")
            }
            Type::Record(record) => write!(f, "{}", record),
        }
    }
}

/// A named field of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: Type,
}

/// Layout of a record: an optional name and ordered fields.
///
/// Anonymous records are produced by `new(...)` projections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RecordType {
    /// Record name, `None` for anonymous records.
    pub name: Option<String>,
    /// Ordered fields.
    pub fields: Vec<Field>,
}

impl RecordType {
    /// Create an empty named record type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            fields: Vec::new(),
        }
    }

    /// Create an empty anonymous record type.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
        });
        self
    }

    /// Find a field by exact name.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Find a field by exact name, falling back to an ASCII case-insensitive match.
    pub fn field_ignore_case(&self, name: &str) -> Option<(usize, &Field)> {
        self.field(name).or_else(|| {
            self.fields
                .iter()
                .enumerate()
                .find(|(_, f)| f.name.eq_ignore_ascii_case(name))
        })
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        f.write_str("{ ")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_element() {
        assert_eq!(Type::array(Type::Int).sequence_element(), Some(&Type::Int));
        assert_eq!(Type::list(Type::String).sequence_element(), Some(&Type::String));
        assert_eq!(
            Type::grouping(Type::String, Type::Int).sequence_element(),
            Some(&Type::Int)
        );
        assert_eq!(Type::map(Type::String, Type::Int).sequence_element(), None);
        assert_eq!(Type::String.sequence_element(), None);
    }

    #[test]
    fn test_assignability() {
        assert!(Type::Int.is_assignable_from(&Type::Int));
        assert!(Type::Int.is_assignable_from(&Type::Null));
        assert!(Type::Any.is_assignable_from(&Type::String));
        assert!(!Type::Int.is_assignable_from(&Type::Float));
        assert!(Type::Float.is_widening_from(&Type::Int));

        // Sequences accept any iterable of a compatible element
        let seq = Type::sequence(Type::String);
        assert!(seq.is_assignable_from(&Type::array(Type::String)));
        assert!(seq.is_assignable_from(&Type::list(Type::String)));
        assert!(!seq.is_assignable_from(&Type::array(Type::Int)));
    }

    #[test]
    fn test_record_field_lookup() {
        let product = RecordType::new("Product")
            .with_field("Name", Type::String)
            .with_field("Price", Type::Float);

        assert_eq!(product.field("Price").map(|(i, _)| i), Some(1));
        assert!(product.field("price").is_none());
        assert_eq!(product.field_ignore_case("price").map(|(i, _)| i), Some(1));
    }

    #[test]
    fn test_display() {
        let anon = RecordType::anonymous()
            .with_field("a", Type::Int)
            .with_field("b", Type::array(Type::String));
        assert_eq!(Type::record(anon).to_string(), "{ a: int, b: string[] }");
        assert_eq!(
            Type::grouping(Type::Int, Type::record(RecordType::new("Order"))).to_string(),
            "Grouping<int, Order>"
        );
    }
}
