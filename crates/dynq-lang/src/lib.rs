//! dynq expression language
//!
//! This crate turns expression text into typed lambdas over caller-declared
//! parameters. It is the parser collaborator of the dynq query composer.
//!
//! # Expression Syntax
//!
//! ```text
//! Price > @0 && Name.StartsWith("A")
//! new(Category, Price * Qty as Total)
//! iif(Stock > 0, "in stock", "sold out")
//! Orders.Any(Qty > 1)
//! it.Customer.Name
//! ```
//!
//! Bare identifiers resolve to lambda parameters first, then to members of
//! the implicit scope (the first parameter, also reachable as `it`).
//!
//! # Ordering Syntax
//!
//! ```text
//! Category, Price desc, Name ascending
//! ```
//!
//! # Usage
//!
//! ```rust
//! use dynq_lang::{parse_lambda, CompileOptions};
//! use dynq_types::{Param, RecordType, Type, Value};
//!
//! let product = Type::record(RecordType::new("Product").with_field("Price", Type::Float));
//! let lambda = parse_lambda(
//!     &[Param::new("x", product)],
//!     Some(&Type::Bool),
//!     "Price > @0",
//!     &[Value::Float(10.0)],
//!     &CompileOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(lambda.return_type, Type::Bool);
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

// Re-export main types
pub use ast::{Literal, NewField, OrderingTerm, SortDirection};
pub use compiler::{CompileOptions, Compiler, DEFAULT_IMPLICIT_KEYWORD};
pub use error::{CompileError, CompileErrorKind, LangError, ParseError};
pub use lexer::{SpannedToken, Token};
pub use span::{Span, Spanned};

use dynq_types::{Lambda, Param, Type, Value};

/// Parse expression text into an untyped AST.
pub fn parse(source: &str) -> Result<ast::Expr, ParseError> {
    parser::parse(source)
}

/// Parse and bind expression text as a lambda over `params`.
///
/// Placeholders `@N` are replaced by `args[N]`. When `result_type` is given
/// the expression must produce a value assignable to it.
pub fn parse_lambda(
    params: &[Param],
    result_type: Option<&Type>,
    source: &str,
    args: &[Value],
    options: &CompileOptions,
) -> Result<Lambda, LangError> {
    let ast = parser::parse(source)?;
    let lambda = Compiler::new(options, args).compile_lambda(params, result_type, &ast)?;
    Ok(lambda)
}

/// Parse and bind an ordering list such as `"Category, Price desc"`.
///
/// Returns one key selector per term, in the order written.
pub fn parse_ordering(
    params: &[Param],
    source: &str,
    args: &[Value],
    options: &CompileOptions,
) -> Result<Vec<(Lambda, SortDirection)>, LangError> {
    let terms = parser::parse_ordering(source)?;
    let keys = Compiler::new(options, args).compile_ordering(params, &terms)?;
    Ok(keys)
}

/// Tokenize expression text, for diagnostics.
pub fn tokenize(source: &str) -> Vec<SpannedToken> {
    lexer::tokenize(source)
}
