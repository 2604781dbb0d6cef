//! Abstract Syntax Tree types for the expression language.

use crate::span::{Span, Spanned};
use dynq_types::{BinaryOp, UnaryOp};

/// A literal value as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// An untyped expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Spanned<Literal>),
    /// Positional argument placeholder (`@N`).
    Placeholder(Spanned<usize>),
    /// Bare identifier: a parameter, `it`, or a member of the implicit scope.
    Ident(Spanned<String>),
    /// Member access: `target.name`.
    Member {
        target: Box<Expr>,
        name: Spanned<String>,
    },
    /// Method call; a bare call (`Count()`) has no target.
    Call {
        target: Option<Box<Expr>>,
        name: Spanned<String>,
        args: Vec<Expr>,
        span: Span,
    },
    /// Element access: `target[index]`.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// Unary operation.
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `iif(test, a, b)` or `test ? a : b`.
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        span: Span,
    },
    /// Record construction: `new(a, b as B)`.
    New { fields: Vec<NewField>, span: Span },
}

impl Expr {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(l) => l.span,
            Expr::Placeholder(p) => p.span,
            Expr::Ident(i) => i.span,
            Expr::Member { target, name } => target.span().to(name.span),
            Expr::Binary { left, right, .. } => left.span().to(right.span()),
            Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::New { span, .. } => *span,
        }
    }

    /// The name a projected field takes when no alias is given.
    ///
    /// `Name` and `x.Customer.Name` both project as `Name`.
    pub fn implicit_name(&self) -> Option<&str> {
        match self {
            Expr::Ident(ident) => Some(&ident.value),
            Expr::Member { name, .. } => Some(&name.value),
            _ => None,
        }
    }
}

/// A field of a `new(...)` projection.
#[derive(Debug, Clone, PartialEq)]
pub struct NewField {
    /// Field value.
    pub value: Expr,
    /// Explicit name given with `as`.
    pub alias: Option<Spanned<String>>,
}

/// Sort direction of an ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One term of an ordering list such as `"Category, Price desc"`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    /// Key expression.
    pub expr: Expr,
    /// Sort direction, ascending unless a direction keyword follows.
    pub direction: SortDirection,
    /// Span of the whole term.
    pub span: Span,
}
