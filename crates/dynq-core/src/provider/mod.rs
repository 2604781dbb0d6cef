//! Query providers and the sequence handle.
//!
//! A [`Query`] is a deferred sequence: an element type, the expression tree
//! that derives it, and the provider that can run that tree. Composing a
//! query never touches the provider; only [`Query::execute`] does.

mod enumerable;
pub mod evaluator;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use dynq_types::{Expr, ExprRef, Type, Value};

use crate::error::{Error, Result};

pub use evaluator::{CompiledLambda, EvalError};
pub use memory::MemoryProvider;

/// Opaque failure from a query provider.
///
/// Wraps the provider's own error so that it passes through the composer
/// unchanged; use [`ProviderError::downcast_ref`] to inspect it.
#[derive(Debug)]
pub struct ProviderError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl ProviderError {
    /// Wrap a provider error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// Create an error from a message.
    pub fn message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self(message.into())
    }

    /// Get the wrapped error if it has type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Unwrap the boxed error.
    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self.0
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<EvalError> for ProviderError {
    fn from(error: EvalError) -> Self {
        Self::new(error)
    }
}

/// Executes composed expression trees.
pub trait QueryProvider: Send + Sync + fmt::Debug {
    /// Run `expression` and return its value.
    ///
    /// Sequence expressions produce a [`Value::Array`]; terminal operators
    /// produce a scalar or an element.
    fn execute(&self, expression: &Expr) -> std::result::Result<Value, ProviderError>;
}

/// Handle to a deferred sequence owned by a provider.
///
/// Cloning a handle is cheap and yields the same handle.
#[derive(Clone)]
pub struct Query {
    element_type: Type,
    expression: ExprRef,
    provider: Arc<dyn QueryProvider>,
}

impl Query {
    /// Create a handle over `expression`, which must have a sequence type.
    pub fn new(provider: Arc<dyn QueryProvider>, expression: ExprRef) -> Result<Self> {
        let ty = expression.ty();
        let element_type = ty.sequence_element().cloned().ok_or_else(|| {
            Error::validation(format!(
                "expression of type '{}' is not a sequence",
                ty
            ))
        })?;
        Ok(Self {
            element_type,
            expression,
            provider,
        })
    }

    /// Handle over a named data set. Sources are always sequences.
    pub(crate) fn source(
        provider: Arc<dyn QueryProvider>,
        name: impl Into<String>,
        element_type: Type,
    ) -> Self {
        Self {
            expression: Arc::new(Expr::source(name, element_type.clone())),
            element_type,
            provider,
        }
    }

    /// Element type of the sequence.
    pub fn element_type(&self) -> &Type {
        &self.element_type
    }

    /// Static type of the whole sequence, e.g. `OrderedSequence<Product>`.
    pub fn sequence_type(&self) -> Type {
        self.expression.ty()
    }

    /// Expression tree describing how the sequence is derived.
    pub fn expression(&self) -> &ExprRef {
        &self.expression
    }

    /// The provider that owns the sequence.
    pub fn provider(&self) -> &Arc<dyn QueryProvider> {
        &self.provider
    }

    /// Build a new handle from `expression` over the same provider.
    pub fn create_query(&self, expression: Expr) -> Result<Query> {
        Query::new(self.provider.clone(), Arc::new(expression))
    }

    /// Run `expression` through this handle's provider.
    pub fn execute(&self, expression: &Expr) -> std::result::Result<Value, ProviderError> {
        self.provider.execute(expression)
    }

    /// Run `expression` and convert the result.
    pub fn execute_as<T: FromValue>(&self, expression: &Expr) -> std::result::Result<T, ProviderError> {
        let value = self.execute(expression)?;
        T::from_value(value)
    }

    /// Enumerate the sequence.
    pub fn to_vec(&self) -> std::result::Result<Vec<Value>, ProviderError> {
        self.execute_as(&self.expression)
    }

    /// Check if both handles are the same handle: same expression node on
    /// the same provider.
    pub fn same_handle(&self, other: &Query) -> bool {
        Arc::ptr_eq(&self.expression, &other.expression) && self.same_provider(other)
    }

    /// Check if both handles belong to the same provider instance.
    pub fn same_provider(&self, other: &Query) -> bool {
        Arc::as_ptr(&self.provider) as *const () == Arc::as_ptr(&other.provider) as *const ()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("element_type", &format_args!("{}", self.element_type))
            .field("expression", &format_args!("{}", self.expression))
            .finish()
    }
}

/// Conversion from an executed value.
pub trait FromValue: Sized {
    /// Convert `value`, failing when it has the wrong shape.
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError>;
}

fn conversion_error(value: &Value, target: &str) -> ProviderError {
    ProviderError::message(format!(
        "cannot convert value of type '{}' to {}",
        value.type_of(),
        target
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        value.as_bool().ok_or_else(|| conversion_error(&value, "bool"))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        value.as_i64().ok_or_else(|| conversion_error(&value, "i64"))
    }
}

impl FromValue for usize {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        value
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| conversion_error(&value, "usize"))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        value.as_f64().ok_or_else(|| conversion_error(&value, "f64"))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(conversion_error(&other, "string")),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(conversion_error(&other, "a sequence")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> std::result::Result<Self, ProviderError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        assert_eq!(bool::from_value(Value::Bool(true)).unwrap(), true);
        assert_eq!(usize::from_value(Value::Int(3)).unwrap(), 3);
        assert!(usize::from_value(Value::Int(-1)).is_err());
        assert_eq!(f64::from_value(Value::Int(2)).unwrap(), 2.0);
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);

        let err = String::from_value(Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert value of type 'int' to string");
    }

    #[test]
    fn test_provider_error_downcast() {
        let err = ProviderError::from(EvalError::DivisionByZero);
        assert!(matches!(err.downcast_ref::<EvalError>(), Some(EvalError::DivisionByZero)));
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_handle_identity() {
        let provider = MemoryProvider::new();
        let products = provider.register("products", Type::Int, vec![Value::Int(1)]);

        let clone = products.clone();
        assert!(products.same_handle(&clone));

        let again = products
            .create_query(Expr::source("products", Type::Int))
            .unwrap();
        assert!(!products.same_handle(&again));
        assert!(products.same_provider(&again));
    }

    #[test]
    fn test_non_sequence_expression_is_rejected() {
        let provider = MemoryProvider::new();
        let products = provider.register("products", Type::Int, vec![]);
        let err = products
            .create_query(Expr::constant(Value::Int(1)))
            .unwrap_err();
        assert!(err.is_validation());
    }
}
