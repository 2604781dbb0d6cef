//! dynq shared model.
//!
//! This crate defines the data the other dynq crates exchange: runtime type
//! descriptors, values, and the immutable expression trees that describe
//! dynamically composed queries.
//!
//! # Modules
//!
//! - [`ty`] - Runtime type descriptors and record layouts
//! - [`value`] - Runtime values with structural equality
//! - [`expr`] - Expression trees, lambdas and query operator applications
//! - [`op`] - Query operator tags and expression operators

pub mod expr;
pub mod op;
pub mod ty;
pub mod value;

// Re-export commonly used types at crate root
pub use expr::{Expr, ExprRef, Lambda, Member, Method, Param, QueryCall};
pub use op::{BinaryOp, BoundOperator, QueryOp, UnaryOp};
pub use ty::{Field, RecordType, Type};
pub use value::{Grouping, Record, Value};
