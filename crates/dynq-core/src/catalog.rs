//! Operator catalog and generic-arity dispatch.
//!
//! The catalog enumerates every query operator overload the composer can
//! emit, keyed by operator and value arity. It is built once per process
//! and only read afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

use thiserror::Error;
use tracing::trace;

use dynq_types::{BoundOperator, QueryOp, Type};

/// Static result shape of an overload, used to tell overloads apart when
/// operator name, arity and type-argument count are not enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// A new sequence whose element type comes from the type arguments.
    Sequence,
    /// A sequence of the source element type.
    SameAsElement,
    /// An ordered sequence of the source element type.
    Ordered,
    /// A single source element.
    Element,
    /// A boolean.
    Boolean,
    /// An integer.
    Integer,
    /// A floating point number.
    Number,
    /// A value of the selector's result type.
    Selector,
}

/// One overload of a query operator.
#[derive(Debug, Clone)]
pub struct OperatorDescriptor {
    /// The operator.
    pub op: QueryOp,
    /// Number of value arguments, including the source.
    pub arity: usize,
    /// Number of free type parameters.
    pub type_params: usize,
    /// Result shape.
    pub returns: ReturnShape,
    result: fn(&[Type]) -> Type,
}

impl OperatorDescriptor {
    /// Create a descriptor; `result` computes the result type from the
    /// type arguments.
    pub fn new(
        op: QueryOp,
        arity: usize,
        type_params: usize,
        returns: ReturnShape,
        result: fn(&[Type]) -> Type,
    ) -> Self {
        Self {
            op,
            arity,
            type_params,
            returns,
            result,
        }
    }

    /// Operator name.
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    /// Static result type for the given type arguments.
    pub fn result_type(&self, type_args: &[Type]) -> Type {
        (self.result)(type_args)
    }
}

/// Errors raised when no overload fits a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// No operator has this name.
    #[error("unknown query operator '{0}'")]
    UnknownOperator(String),

    /// The operator has no overload taking this many arguments.
    #[error("no overload of '{name}' takes {arity} argument(s)")]
    NoOverload { name: String, arity: usize },

    /// The overload declares a different number of type parameters.
    #[error("'{name}' with {arity} argument(s) expects {expected} type argument(s), found {found}")]
    TypeArgumentCount {
        name: String,
        arity: usize,
        expected: usize,
        found: usize,
    },

    /// More than one overload matches.
    #[error("call to '{name}' with {arity} argument(s) is ambiguous")]
    Ambiguous { name: String, arity: usize },
}

/// An operator overload with concrete type arguments.
#[derive(Debug, Clone)]
pub struct Binding<'a> {
    /// The bound operator, as stored in expression trees.
    pub operator: BoundOperator,
    /// The matched overload.
    pub descriptor: &'a OperatorDescriptor,
}

impl Binding<'_> {
    /// Static type of the operator's result.
    pub fn result_type(&self) -> Type {
        self.descriptor.result_type(&self.operator.type_args)
    }
}

/// Fixed table of operator overloads.
#[derive(Debug)]
pub struct OperatorCatalog {
    descriptors: Vec<OperatorDescriptor>,
    index: HashMap<(QueryOp, usize), Vec<usize>>,
}

static GLOBAL: LazyLock<OperatorCatalog> = LazyLock::new(OperatorCatalog::standard);

fn arg(type_args: &[Type], index: usize) -> Type {
    type_args.get(index).cloned().unwrap_or(Type::Any)
}

impl OperatorCatalog {
    /// The process-wide catalog of standard operators.
    pub fn global() -> &'static OperatorCatalog {
        &GLOBAL
    }

    /// Build a catalog from descriptors.
    pub fn new(descriptors: Vec<OperatorDescriptor>) -> Self {
        let mut index: HashMap<(QueryOp, usize), Vec<usize>> = HashMap::new();
        for (i, d) in descriptors.iter().enumerate() {
            index.entry((d.op, d.arity)).or_default().push(i);
        }
        Self { descriptors, index }
    }

    /// Build the standard operator table.
    pub fn standard() -> Self {
        use QueryOp::*;
        use ReturnShape as R;
        type D = OperatorDescriptor;

        let same: fn(&[Type]) -> Type = |t| Type::sequence(arg(t, 0));
        let ordered: fn(&[Type]) -> Type = |t| Type::ordered_sequence(arg(t, 0));
        let element: fn(&[Type]) -> Type = |t| arg(t, 0);
        let boolean: fn(&[Type]) -> Type = |_| Type::Bool;
        let integer: fn(&[Type]) -> Type = |_| Type::Int;
        let number: fn(&[Type]) -> Type = |_| Type::Float;
        let selector: fn(&[Type]) -> Type = |t| arg(t, 1);

        let mut descriptors = vec![
            D::new(Where, 2, 1, R::SameAsElement, same),
            D::new(Select, 2, 2, R::Sequence, |t| Type::sequence(arg(t, 1))),
            D::new(SelectMany, 2, 2, R::Sequence, |t| Type::sequence(arg(t, 1))),
            D::new(SelectMany, 3, 3, R::Sequence, |t| Type::sequence(arg(t, 2))),
            D::new(GroupBy, 2, 2, R::Sequence, |t| {
                Type::sequence(Type::grouping(arg(t, 1), arg(t, 0)))
            }),
            D::new(GroupBy, 3, 3, R::Sequence, |t| {
                Type::sequence(Type::grouping(arg(t, 1), arg(t, 2)))
            }),
            D::new(OrderBy, 2, 2, R::Ordered, ordered),
            D::new(OrderByDescending, 2, 2, R::Ordered, ordered),
            D::new(ThenBy, 2, 2, R::Ordered, ordered),
            D::new(ThenByDescending, 2, 2, R::Ordered, ordered),
            D::new(Join, 5, 4, R::Sequence, |t| Type::sequence(arg(t, 3))),
            D::new(Skip, 2, 1, R::SameAsElement, same),
            D::new(Take, 2, 1, R::SameAsElement, same),
            D::new(Distinct, 1, 1, R::SameAsElement, same),
            D::new(Reverse, 1, 1, R::SameAsElement, same),
            D::new(All, 2, 1, R::Boolean, boolean),
            D::new(Contains, 2, 1, R::Boolean, boolean),
            // Element sums need no type argument; the overload is picked by result
            D::new(Sum, 1, 0, R::Integer, integer),
            D::new(Sum, 1, 0, R::Number, number),
            D::new(Sum, 2, 2, R::Selector, selector),
            D::new(Min, 1, 1, R::Element, element),
            D::new(Max, 1, 1, R::Element, element),
            D::new(Min, 2, 2, R::Selector, selector),
            D::new(Max, 2, 2, R::Selector, selector),
            D::new(Average, 1, 1, R::Number, number),
            D::new(Average, 2, 2, R::Number, number),
        ];

        // Operators with an optional predicate
        for arity in [1, 2] {
            descriptors.push(D::new(Any, arity, 1, R::Boolean, boolean));
            descriptors.push(D::new(Count, arity, 1, R::Integer, integer));
            for op in [
                First,
                FirstOrDefault,
                Last,
                LastOrDefault,
                Single,
                SingleOrDefault,
            ] {
                descriptors.push(D::new(op, arity, 1, R::Element, element));
            }
        }

        Self::new(descriptors)
    }

    /// All overloads of `op` taking `arity` arguments.
    pub fn overloads(&self, op: QueryOp, arity: usize) -> impl Iterator<Item = &OperatorDescriptor> {
        self.index
            .get(&(op, arity))
            .into_iter()
            .flatten()
            .map(move |&i| &self.descriptors[i])
    }

    /// Number of overloads in the catalog.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Bind `name` with `arity` value arguments to the given type arguments.
    pub fn bind(
        &self,
        name: &str,
        arity: usize,
        type_args: Vec<Type>,
    ) -> Result<Binding<'_>, BindError> {
        self.bind_matching(name, arity, type_args, None)
    }

    /// Bind like [`OperatorCatalog::bind`], choosing among overloads by
    /// result shape.
    pub fn bind_returning(
        &self,
        name: &str,
        arity: usize,
        type_args: Vec<Type>,
        returns: ReturnShape,
    ) -> Result<Binding<'_>, BindError> {
        self.bind_matching(name, arity, type_args, Some(returns))
    }

    fn bind_matching(
        &self,
        name: &str,
        arity: usize,
        type_args: Vec<Type>,
        returns: Option<ReturnShape>,
    ) -> Result<Binding<'_>, BindError> {
        let op = QueryOp::from_name(name)
            .filter(|op| op.name() == name)
            .ok_or_else(|| BindError::UnknownOperator(name.to_string()))?;

        let overloads: Vec<&OperatorDescriptor> = self.overloads(op, arity).collect();
        let first = overloads.first().ok_or_else(|| BindError::NoOverload {
            name: name.to_string(),
            arity,
        })?;

        let mut matching = overloads
            .iter()
            .copied()
            .filter(|d| d.type_params == type_args.len())
            .filter(|d| returns.map_or(true, |shape| d.returns == shape));

        let Some(descriptor) = matching.next() else {
            return Err(BindError::TypeArgumentCount {
                name: name.to_string(),
                arity,
                expected: first.type_params,
                found: type_args.len(),
            });
        };
        if matching.next().is_some() {
            return Err(BindError::Ambiguous {
                name: name.to_string(),
                arity,
            });
        }

        trace!(operator = name, arity, returns = ?descriptor.returns, "bound operator");
        Ok(Binding {
            operator: BoundOperator {
                op,
                arity,
                type_args,
            },
            descriptor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operator_has_an_overload() {
        let catalog = OperatorCatalog::global();
        for op in QueryOp::ALL {
            let found = (1..=5).any(|arity| catalog.overloads(op, arity).next().is_some());
            assert!(found, "no overload for {}", op);
        }
    }

    #[test]
    fn test_bind_select() {
        let binding = OperatorCatalog::global()
            .bind("Select", 2, vec![Type::Int, Type::String])
            .unwrap();
        assert_eq!(binding.operator.to_string(), "Select<int, string>");
        assert_eq!(binding.result_type(), Type::sequence(Type::String));
    }

    #[test]
    fn test_bind_group_by() {
        let binding = OperatorCatalog::global()
            .bind("GroupBy", 2, vec![Type::String, Type::Int])
            .unwrap();
        assert_eq!(
            binding.result_type(),
            Type::sequence(Type::grouping(Type::Int, Type::String))
        );
    }

    #[test]
    fn test_bind_errors() {
        let catalog = OperatorCatalog::global();

        assert_eq!(
            catalog.bind("Frobnicate", 1, vec![]).unwrap_err(),
            BindError::UnknownOperator("Frobnicate".into())
        );
        assert_eq!(
            catalog.bind("Where", 3, vec![Type::Int]).unwrap_err(),
            BindError::NoOverload {
                name: "Where".into(),
                arity: 3
            }
        );
        assert!(matches!(
            catalog.bind("Where", 2, vec![]).unwrap_err(),
            BindError::TypeArgumentCount {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_sum_needs_return_shape() {
        let catalog = OperatorCatalog::global();

        assert!(matches!(
            catalog.bind("Sum", 1, vec![]).unwrap_err(),
            BindError::Ambiguous { .. }
        ));

        let ints = catalog
            .bind_returning("Sum", 1, vec![], ReturnShape::Integer)
            .unwrap();
        assert_eq!(ints.result_type(), Type::Int);

        let floats = catalog
            .bind_returning("Sum", 1, vec![], ReturnShape::Number)
            .unwrap();
        assert_eq!(floats.result_type(), Type::Float);
    }

    #[test]
    fn test_join_binds_four_type_arguments() {
        let binding = OperatorCatalog::global()
            .bind(
                "Join",
                5,
                vec![Type::Int, Type::String, Type::Int, Type::Bool],
            )
            .unwrap();
        assert_eq!(binding.descriptor.type_params, 4);
        assert_eq!(binding.result_type(), Type::sequence(Type::Bool));
    }
}
