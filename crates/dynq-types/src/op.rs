//! Query operators and expression operators.

use std::fmt;

use crate::ty::Type;

/// A standard query operator.
///
/// This is the fixed set of operations a query expression can apply to a
/// sequence. The operator tag together with an argument count identifies an
/// overload; the catalog in `dynq-core` describes each overload's generic
/// arity and return shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOp {
    Where,
    Select,
    SelectMany,
    GroupBy,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Join,
    Skip,
    Take,
    Distinct,
    Reverse,
    Any,
    All,
    Count,
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
    Sum,
    Min,
    Max,
    Average,
    Contains,
}

impl QueryOp {
    /// All operators, in catalog order.
    pub const ALL: [QueryOp; 27] = [
        QueryOp::Where,
        QueryOp::Select,
        QueryOp::SelectMany,
        QueryOp::GroupBy,
        QueryOp::OrderBy,
        QueryOp::OrderByDescending,
        QueryOp::ThenBy,
        QueryOp::ThenByDescending,
        QueryOp::Join,
        QueryOp::Skip,
        QueryOp::Take,
        QueryOp::Distinct,
        QueryOp::Reverse,
        QueryOp::Any,
        QueryOp::All,
        QueryOp::Count,
        QueryOp::First,
        QueryOp::FirstOrDefault,
        QueryOp::Last,
        QueryOp::LastOrDefault,
        QueryOp::Single,
        QueryOp::SingleOrDefault,
        QueryOp::Sum,
        QueryOp::Min,
        QueryOp::Max,
        QueryOp::Average,
        QueryOp::Contains,
    ];

    /// Canonical operator name.
    pub fn name(self) -> &'static str {
        match self {
            QueryOp::Where => "Where",
            QueryOp::Select => "Select",
            QueryOp::SelectMany => "SelectMany",
            QueryOp::GroupBy => "GroupBy",
            QueryOp::OrderBy => "OrderBy",
            QueryOp::OrderByDescending => "OrderByDescending",
            QueryOp::ThenBy => "ThenBy",
            QueryOp::ThenByDescending => "ThenByDescending",
            QueryOp::Join => "Join",
            QueryOp::Skip => "Skip",
            QueryOp::Take => "Take",
            QueryOp::Distinct => "Distinct",
            QueryOp::Reverse => "Reverse",
            QueryOp::Any => "Any",
            QueryOp::All => "All",
            QueryOp::Count => "Count",
            QueryOp::First => "First",
            QueryOp::FirstOrDefault => "FirstOrDefault",
            QueryOp::Last => "Last",
            QueryOp::LastOrDefault => "LastOrDefault",
            QueryOp::Single => "Single",
            QueryOp::SingleOrDefault => "SingleOrDefault",
            QueryOp::Sum => "Sum",
            QueryOp::Min => "Min",
            QueryOp::Max => "Max",
            QueryOp::Average => "Average",
            QueryOp::Contains => "Contains",
        }
    }

    /// Look up an operator by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<QueryOp> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// Check if this operator returns a value instead of a sequence.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryOp::Any
                | QueryOp::All
                | QueryOp::Count
                | QueryOp::First
                | QueryOp::FirstOrDefault
                | QueryOp::Last
                | QueryOp::LastOrDefault
                | QueryOp::Single
                | QueryOp::SingleOrDefault
                | QueryOp::Sum
                | QueryOp::Min
                | QueryOp::Max
                | QueryOp::Average
                | QueryOp::Contains
        )
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A query operator overload with its generic type arguments bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundOperator {
    /// The operator.
    pub op: QueryOp,
    /// Number of value arguments, including the source sequence.
    pub arity: usize,
    /// Concrete type arguments, in declaration order.
    pub type_args: Vec<Type>,
}

impl fmt::Display for BoundOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())?;
        if !self.type_args.is_empty() {
            f.write_str("<")?;
            for (i, ty) in self.type_args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", ty)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// Binary expression operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition or string concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Multiplication (`*`)
    Multiply,
    /// Division (`/`)
    Divide,
    /// Remainder (`%`)
    Modulo,

    // Comparison
    /// Equal (`==`, `=`)
    Equal,
    /// Not equal (`!=`, `<>`)
    NotEqual,
    /// Less than (`<`)
    Less,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than (`>`)
    Greater,
    /// Greater than or equal (`>=`)
    GreaterEqual,

    // Logical
    /// Logical AND (`&&`, `and`)
    And,
    /// Logical OR (`||`, `or`)
    Or,
}

impl BinaryOp {
    /// Check if this is an arithmetic operator.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    /// Check if this is an equality operator.
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Equal | BinaryOp::NotEqual)
    }

    /// Check if this is an ordering comparison.
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual
        )
    }

    /// Check if this is a logical operator.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Unary expression operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation (`!`, `not`)
    Not,
    /// Arithmetic negation (`-`)
    Negate,
}

impl UnaryOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
        }
    }
}
