//! Immutable expression trees.
//!
//! An [`Expr`] describes a computation without performing it. Children are
//! shared behind `Arc`, so composing a new query on top of an existing one
//! only allocates the new root; the existing tree is never modified.

use std::fmt;
use std::sync::Arc;

use crate::op::{BinaryOp, BoundOperator, QueryOp, UnaryOp};
use crate::ty::{RecordType, Type};
use crate::value::Value;

/// Shared reference to an expression node.
pub type ExprRef = Arc<Expr>;

/// A named, typed lambda parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
}

impl Param {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A typed expression fragment: parameters, body and static result type.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Ordered parameters.
    pub params: Vec<Param>,
    /// Lambda body.
    pub body: ExprRef,
    /// Static result type.
    pub return_type: Type,
}

impl Lambda {
    /// Create a lambda whose result type is the body's static type.
    pub fn new(params: Vec<Param>, body: Expr) -> Self {
        let return_type = body.ty();
        Self {
            params,
            body: Arc::new(body),
            return_type,
        }
    }

    /// Re-declare the result type without changing the body.
    ///
    /// The declared type must accept the body's type; callers use this to
    /// widen a concrete collection result to a `Sequence<T>` signature.
    pub fn with_return_type(mut self, return_type: Type) -> Self {
        self.return_type = return_type;
        self
    }

    /// Get the lambda's own type, e.g. `Func<Product, bool>`.
    pub fn ty(&self) -> Type {
        let mut args: Vec<Type> = self.params.iter().map(|p| p.ty.clone()).collect();
        args.push(self.return_type.clone());
        Type::generic("Func", args)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{}", single.name)?,
            params => {
                f.write_str("(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&p.name)?;
                }
                f.write_str(")")?;
            }
        }
        write!(f, " => {}", self.body)
    }
}

/// A member accessed on a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    /// Record field, resolved to its position in the layout.
    Field { name: String, index: usize },
    /// Key of a group.
    Key,
    /// Number of items in a collection.
    Count,
    /// Length of a string or array.
    Length,
    /// Member looked up by name at run time, on `any`-typed values.
    Dynamic(String),
}

impl Member {
    /// Member name as written.
    pub fn name(&self) -> &str {
        match self {
            Member::Field { name, .. } | Member::Dynamic(name) => name,
            Member::Key => "Key",
            Member::Count => "Count",
            Member::Length => "Length",
        }
    }
}

/// A method called on a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `string.StartsWith(string)`
    StartsWith,
    /// `string.EndsWith(string)`
    EndsWith,
    /// `string.Contains(string)`
    StringContains,
    /// `string.ToUpper()`
    ToUpper,
    /// `string.ToLower()`
    ToLower,
    /// `string.Trim()`
    Trim,
    /// A query operator applied to a nested collection, e.g. `Items.Any(Qty > 1)`.
    Sequence(QueryOp),
}

impl Method {
    /// Method name as written.
    pub fn name(&self) -> &'static str {
        match self {
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::StringContains => "Contains",
            Method::ToUpper => "ToUpper",
            Method::ToLower => "ToLower",
            Method::Trim => "Trim",
            Method::Sequence(op) => op.name(),
        }
    }
}

/// A bound query operator applied to its arguments.
///
/// The first argument is always the source sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    /// The bound operator.
    pub operator: BoundOperator,
    /// Arguments; lambdas appear as [`Expr::Lambda`].
    pub args: Vec<ExprRef>,
    /// Static result type.
    pub ty: Type,
}

impl QueryCall {
    /// The source sequence argument.
    pub fn source(&self) -> Option<&ExprRef> {
        self.args.first()
    }

    /// The lambda argument at `index`, if that argument is a lambda.
    pub fn lambda(&self, index: usize) -> Option<&Arc<Lambda>> {
        match self.args.get(index).map(|a| a.as_ref()) {
            Some(Expr::Lambda(lambda)) => Some(lambda),
            _ => None,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value with its static type.
    Constant { value: Value, ty: Type },
    /// Reference to a lambda parameter.
    Parameter(Param),
    /// Member access.
    Member {
        target: ExprRef,
        member: Member,
        ty: Type,
    },
    /// Element access by position.
    Index {
        target: ExprRef,
        index: ExprRef,
        ty: Type,
    },
    /// Unary operation.
    Unary {
        op: UnaryOp,
        operand: ExprRef,
        ty: Type,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
        ty: Type,
    },
    /// `test ? if_true : if_false`
    Conditional {
        test: ExprRef,
        if_true: ExprRef,
        if_false: ExprRef,
        ty: Type,
    },
    /// Method call on a value.
    Call {
        target: ExprRef,
        method: Method,
        args: Vec<ExprRef>,
        ty: Type,
    },
    /// Record construction, one expression per field.
    New {
        record: Arc<RecordType>,
        fields: Vec<ExprRef>,
    },
    /// Conversion to another type.
    Convert { operand: ExprRef, ty: Type },
    /// Nested lambda, used as an operator argument.
    Lambda(Arc<Lambda>),
    /// Named data set owned by a query provider.
    Source { name: String, element_type: Type },
    /// Query operator application.
    Query(QueryCall),
}

impl Expr {
    /// Constant expression typed by its value.
    pub fn constant(value: Value) -> Self {
        let ty = value.type_of();
        Expr::Constant { value, ty }
    }

    /// Constant expression with an explicit static type.
    pub fn typed_constant(value: Value, ty: Type) -> Self {
        Expr::Constant { value, ty }
    }

    /// Parameter reference.
    pub fn parameter(param: &Param) -> Self {
        Expr::Parameter(param.clone())
    }

    /// Provider-owned data set of `element_type` rows.
    pub fn source(name: impl Into<String>, element_type: Type) -> Self {
        Expr::Source {
            name: name.into(),
            element_type,
        }
    }

    /// Get the static type of this expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Index { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Conditional { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Convert { ty, .. } => ty.clone(),
            Expr::Parameter(p) => p.ty.clone(),
            Expr::New { record, .. } => Type::Record(record.clone()),
            Expr::Lambda(lambda) => lambda.ty(),
            Expr::Source { element_type, .. } => Type::sequence(element_type.clone()),
            Expr::Query(call) => call.ty.clone(),
        }
    }

    /// Get the query call if this node applies a query operator.
    pub fn as_query(&self) -> Option<&QueryCall> {
        match self {
            Expr::Query(call) => Some(call),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, .. } => write!(f, "{}", value),
            Expr::Parameter(p) => f.write_str(&p.name),
            Expr::Member { target, member, .. } => write!(f, "{}.{}", target, member.name()),
            Expr::Index { target, index, .. } => write!(f, "{}[{}]", target, index),
            Expr::Unary { op, operand, .. } => write!(f, "{}{}", op.symbol(), operand),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => write!(f, "iif({}, {}, {})", test, if_true, if_false),
            Expr::Call {
                target,
                method,
                args,
                ..
            } => {
                write!(f, "{}.{}(", target, method.name())?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::New { record, fields } => {
                f.write_str("new(")?;
                for (i, (field, value)) in record.fields.iter().zip(fields).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} as {}", value, field.name)?;
                }
                f.write_str(")")
            }
            Expr::Convert { operand, ty } => write!(f, "Convert({}, {})", operand, ty),
            Expr::Lambda(lambda) => write!(f, "{}", lambda),
            Expr::Source { name, .. } => write!(f, "Source({})", name),
            Expr::Query(call) => {
                write!(f, "{}(", call.operator.op)?;
                write_list(f, &call.args)?;
                f.write_str(")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[ExprRef]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_type() -> Type {
        Type::record(
            RecordType::new("Product")
                .with_field("Name", Type::String)
                .with_field("Price", Type::Float),
        )
    }

    #[test]
    fn test_lambda_type_and_display() {
        let x = Param::new("x", product_type());
        let body = Expr::Binary {
            op: BinaryOp::Greater,
            left: Arc::new(Expr::Member {
                target: Arc::new(Expr::parameter(&x)),
                member: Member::Field {
                    name: "Price".into(),
                    index: 1,
                },
                ty: Type::Float,
            }),
            right: Arc::new(Expr::constant(Value::Float(10.0))),
            ty: Type::Bool,
        };
        let lambda = Lambda::new(vec![x], body);

        assert_eq!(lambda.return_type, Type::Bool);
        assert_eq!(lambda.ty().to_string(), "Func<Product, bool>");
        assert_eq!(lambda.to_string(), "x => (x.Price > 10.0)");
    }

    #[test]
    fn test_source_type() {
        let source = Expr::source("products", product_type());
        assert_eq!(source.ty(), Type::sequence(product_type()));
        assert_eq!(source.to_string(), "Source(products)");
    }
}
