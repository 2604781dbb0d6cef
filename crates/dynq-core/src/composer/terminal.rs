//! Terminal operators: run the composed query and return a value.

use tracing::debug;

use dynq_types::{Expr, QueryOp, Type, Value};

use super::{lambda_expr, Composer};
use crate::catalog::{Binding, ReturnShape};
use crate::error::{Error, Result};
use crate::provider::{FromValue, Query};

impl Composer {
    /// Check if the sequence has any element.
    pub fn any(&self, source: &Query) -> Result<bool> {
        self.quantifier(source, QueryOp::Any, None)
    }

    /// Check if any element matches `predicate`.
    pub fn any_where(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<bool> {
        self.quantifier(source, QueryOp::Any, Some((predicate, args)))
    }

    /// Check if every element matches `predicate`.
    pub fn all(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<bool> {
        self.quantifier(source, QueryOp::All, Some((predicate, args)))
    }

    /// Number of elements.
    pub fn count(&self, source: &Query) -> Result<usize> {
        self.quantifier(source, QueryOp::Count, None)
    }

    /// Number of elements matching `predicate`.
    pub fn count_where(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<usize> {
        self.quantifier(source, QueryOp::Count, Some((predicate, args)))
    }

    /// First element; fails on an empty sequence.
    pub fn first(&self, source: &Query) -> Result<Value> {
        self.quantifier(source, QueryOp::First, None)
    }

    /// First element matching `predicate`.
    pub fn first_where(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<Value> {
        self.quantifier(source, QueryOp::First, Some((predicate, args)))
    }

    /// First element, or `None` for an empty sequence.
    pub fn first_or_default(&self, source: &Query) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::FirstOrDefault, None)
    }

    /// First element matching `predicate`, if any.
    pub fn first_or_default_where(
        &self,
        source: &Query,
        predicate: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::FirstOrDefault, Some((predicate, args)))
    }

    /// Last element; fails on an empty sequence.
    pub fn last(&self, source: &Query) -> Result<Value> {
        self.quantifier(source, QueryOp::Last, None)
    }

    /// Last element matching `predicate`.
    pub fn last_where(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<Value> {
        self.quantifier(source, QueryOp::Last, Some((predicate, args)))
    }

    /// Last element, or `None` for an empty sequence.
    pub fn last_or_default(&self, source: &Query) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::LastOrDefault, None)
    }

    /// Last element matching `predicate`, if any.
    pub fn last_or_default_where(
        &self,
        source: &Query,
        predicate: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::LastOrDefault, Some((predicate, args)))
    }

    /// The only element; fails unless there is exactly one.
    pub fn single(&self, source: &Query) -> Result<Value> {
        self.quantifier(source, QueryOp::Single, None)
    }

    /// The only element matching `predicate`.
    pub fn single_where(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<Value> {
        self.quantifier(source, QueryOp::Single, Some((predicate, args)))
    }

    /// The only element, or `None` for an empty sequence. Fails on more
    /// than one element.
    pub fn single_or_default(&self, source: &Query) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::SingleOrDefault, None)
    }

    /// The only element matching `predicate`, if any.
    pub fn single_or_default_where(
        &self,
        source: &Query,
        predicate: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        self.quantifier(source, QueryOp::SingleOrDefault, Some((predicate, args)))
    }

    /// Check if the sequence contains `value`.
    pub fn contains(&self, source: &Query, value: Value) -> Result<bool> {
        let binding = self.bind(QueryOp::Contains, 2, vec![source.element_type().clone()])?;
        self.execute(source, binding, vec![Expr::constant(value)])
    }

    /// Sum of numeric elements; zero for an empty sequence.
    pub fn sum(&self, source: &Query) -> Result<Value> {
        let shape = match source.element_type() {
            Type::Int => ReturnShape::Integer,
            // Dynamic elements keep their own kind: integers sum to Int
            Type::Any => {
                let identity = self.config.outer_parameter.clone();
                return self.aggregate_by(source, QueryOp::Sum, &identity, &[]);
            }
            ty if ty.is_numeric() => ReturnShape::Number,
            ty => {
                return Err(Error::validation(format!(
                    "Sum requires numeric elements, found '{}'",
                    ty
                )))
            }
        };
        let binding = self
            .catalog
            .bind_returning(QueryOp::Sum.name(), 1, vec![], shape)?;
        self.execute(source, binding, vec![])
    }

    /// Sum of `selector` over the elements.
    pub fn sum_by(&self, source: &Query, selector: &str, args: &[Value]) -> Result<Value> {
        self.aggregate_by(source, QueryOp::Sum, selector, args)
    }

    /// Smallest element; fails on an empty sequence.
    pub fn min(&self, source: &Query) -> Result<Value> {
        self.extreme(source, QueryOp::Min)
    }

    /// Smallest value of `selector`.
    pub fn min_by(&self, source: &Query, selector: &str, args: &[Value]) -> Result<Value> {
        self.aggregate_by(source, QueryOp::Min, selector, args)
    }

    /// Largest element; fails on an empty sequence.
    pub fn max(&self, source: &Query) -> Result<Value> {
        self.extreme(source, QueryOp::Max)
    }

    /// Largest value of `selector`.
    pub fn max_by(&self, source: &Query, selector: &str, args: &[Value]) -> Result<Value> {
        self.aggregate_by(source, QueryOp::Max, selector, args)
    }

    /// Mean of numeric elements; fails on an empty sequence.
    pub fn average(&self, source: &Query) -> Result<f64> {
        let element = source.element_type().clone();
        require_numeric(QueryOp::Average, &element)?;
        let binding = self.bind(QueryOp::Average, 1, vec![element])?;
        self.execute(source, binding, vec![])
    }

    /// Mean of `selector` over the elements.
    pub fn average_by(&self, source: &Query, selector: &str, args: &[Value]) -> Result<f64> {
        let selector = self.unary(source, None, "selector", selector, args)?;
        require_numeric(QueryOp::Average, &selector.return_type)?;
        let type_args = vec![source.element_type().clone(), selector.return_type.clone()];
        let binding = self.bind(QueryOp::Average, 2, type_args)?;
        self.execute(source, binding, vec![lambda_expr(selector)])
    }

    fn extreme(&self, source: &Query, op: QueryOp) -> Result<Value> {
        let element = source.element_type().clone();
        require_comparable(op, &element)?;
        let binding = self.bind(op, 1, vec![element])?;
        self.execute(source, binding, vec![])
    }

    /// Sum, Min or Max over a selector.
    fn aggregate_by(
        &self,
        source: &Query,
        op: QueryOp,
        selector: &str,
        args: &[Value],
    ) -> Result<Value> {
        let selector = self.unary(source, None, "selector", selector, args)?;
        match op {
            QueryOp::Sum => require_numeric(op, &selector.return_type)?,
            _ => require_comparable(op, &selector.return_type)?,
        }
        let type_args = vec![source.element_type().clone(), selector.return_type.clone()];
        let binding = self.bind(op, 2, type_args)?;
        self.execute(source, binding, vec![lambda_expr(selector)])
    }

    /// Operators taking an optional predicate.
    fn quantifier<T: FromValue>(
        &self,
        source: &Query,
        op: QueryOp,
        predicate: Option<(&str, &[Value])>,
    ) -> Result<T> {
        let element = source.element_type().clone();
        match predicate {
            Some((text, args)) => {
                let predicate = self.predicate(source, text, args)?;
                let binding = self.bind(op, 2, vec![element])?;
                self.execute(source, binding, vec![lambda_expr(predicate)])
            }
            None => {
                let binding = self.bind(op, 1, vec![element])?;
                self.execute(source, binding, vec![])
            }
        }
    }

    fn execute<T: FromValue>(
        &self,
        source: &Query,
        binding: Binding<'_>,
        args: Vec<Expr>,
    ) -> Result<T> {
        let op = binding.operator.op;
        let expr = self.call(source, binding, args.into_iter().map(Into::into).collect());
        debug!(operator = %op, "executing terminal operator");
        Ok(source.execute_as(&expr)?)
    }
}

fn require_numeric(op: QueryOp, ty: &Type) -> Result<()> {
    if ty.is_numeric() || matches!(ty, Type::Any) {
        return Ok(());
    }
    Err(Error::validation(format!(
        "{} requires numeric values, found '{}'",
        op, ty
    )))
}

fn require_comparable(op: QueryOp, ty: &Type) -> Result<()> {
    if ty.is_comparable() {
        return Ok(());
    }
    Err(Error::validation(format!(
        "{} requires comparable values, found '{}'",
        op, ty
    )))
}
