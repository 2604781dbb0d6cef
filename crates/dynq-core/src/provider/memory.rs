//! In-memory query provider.
//!
//! Holds named data sets as vectors of values and runs composed expression
//! trees over them with the standard sequence operators.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use dynq_types::{Expr, Lambda, QueryCall, QueryOp, Type, Value};

use super::enumerable::{self, Position};
use super::evaluator::{eval, invoke, truthy, values_equal, EvalError, Scope};
use super::{ProviderError, Query, QueryProvider};

type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug)]
struct DataSet {
    element_type: Type,
    rows: Arc<Vec<Value>>,
}

/// Query provider over in-memory data sets.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    data: RwLock<HashMap<String, DataSet>>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `rows` under `name` and return a handle over them.
    ///
    /// Registering an existing name replaces its data set.
    pub fn register(
        self: &Arc<Self>,
        name: impl Into<String>,
        element_type: Type,
        rows: Vec<Value>,
    ) -> Query {
        let name = name.into();
        debug!(
            data_set = %name,
            element_type = %element_type,
            rows = rows.len(),
            "data set registered"
        );
        self.data.write().insert(
            name.clone(),
            DataSet {
                element_type: element_type.clone(),
                rows: Arc::new(rows),
            },
        );
        Query::source(self.clone(), name, element_type)
    }

    /// Register the elements of a JSON array under `name`.
    pub fn register_json(
        self: &Arc<Self>,
        name: impl Into<String>,
        element_type: Type,
        json: serde_json::Value,
    ) -> Result<Query, ProviderError> {
        match Value::from_json(json) {
            Value::Array(rows) => Ok(self.register(name, element_type, rows)),
            other => Err(ProviderError::message(format!(
                "expected a JSON array, found '{}'",
                other.type_of()
            ))),
        }
    }

    /// Handle over a registered data set.
    pub fn query(self: &Arc<Self>, name: &str) -> Option<Query> {
        let element_type = self.data.read().get(name)?.element_type.clone();
        Some(Query::source(self.clone(), name, element_type))
    }

    /// Replace the rows of a registered data set.
    ///
    /// Existing handles see the new rows the next time they execute.
    pub fn replace(&self, name: &str, rows: Vec<Value>) -> Result<(), ProviderError> {
        let mut data = self.data.write();
        let set = data
            .get_mut(name)
            .ok_or_else(|| EvalError::UnknownSource(name.to_string()))?;
        debug!(data_set = %name, rows = rows.len(), "data set replaced");
        set.rows = Arc::new(rows);
        Ok(())
    }

    /// Names of registered data sets, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn rows(&self, name: &str) -> EvalResult<Arc<Vec<Value>>> {
        self.data
            .read()
            .get(name)
            .map(|set| set.rows.clone())
            .ok_or_else(|| EvalError::UnknownSource(name.to_string()))
    }

    fn run(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Source { name, .. } => Ok(Value::Array(self.rows(name)?.as_ref().clone())),
            Expr::Query(call) => self.run_query(call),
            other => eval(other, &Scope::empty()),
        }
    }

    fn run_sequence(&self, expr: &Expr) -> EvalResult<Vec<Value>> {
        match self.run(expr)? {
            Value::Array(items) => Ok(items),
            Value::Group(group) => Ok(group.items.clone()),
            Value::Null => Ok(Vec::new()),
            other => Err(EvalError::type_error(format!(
                "'{}' is not a sequence",
                other.type_of()
            ))),
        }
    }

    fn run_query(&self, call: &QueryCall) -> EvalResult<Value> {
        let op = call.operator.op;
        trace!(operator = %call.operator, "running operator");

        if matches!(
            op,
            QueryOp::OrderBy | QueryOp::OrderByDescending | QueryOp::ThenBy | QueryOp::ThenByDescending
        ) {
            return self.run_ordering(call).map(Value::Array);
        }

        let source = call
            .source()
            .ok_or_else(|| EvalError::Unsupported(format!("'{}' without a source", op)))?;
        let items = self.run_sequence(source)?;
        let lambda = |index: usize| lambda_arg(call, index);
        let predicate = call.lambda(1).map(|l| &**l);

        let value = match op {
            QueryOp::Where => {
                let test = lambda(1)?;
                Value::Array(enumerable::filter(items, |item| apply_test(test, item))?)
            }
            QueryOp::Select => {
                let selector = lambda(1)?;
                Value::Array(enumerable::project(&items, |item| apply(selector, item))?)
            }
            QueryOp::SelectMany => {
                let collection = lambda(1)?;
                let flattened = match call.lambda(2) {
                    Some(result) => enumerable::flatten(
                        &items,
                        |item| apply(collection, item),
                        |outer, inner| invoke(result, &[outer.clone(), inner.clone()], None),
                    )?,
                    None => enumerable::flatten(
                        &items,
                        |item| apply(collection, item),
                        |_, inner| Ok(inner.clone()),
                    )?,
                };
                Value::Array(flattened)
            }
            QueryOp::GroupBy => {
                let key = lambda(1)?;
                let groups = match call.lambda(2) {
                    Some(element) => enumerable::group_by(
                        items,
                        |item| apply(key, item),
                        |item| apply(element, &item),
                    )?,
                    None => enumerable::group_by(items, |item| apply(key, item), Ok)?,
                };
                Value::Array(groups)
            }
            QueryOp::Join => {
                let inner = call
                    .args
                    .get(1)
                    .ok_or_else(|| EvalError::Unsupported("Join without an inner sequence".into()))?;
                let inner = self.run_sequence(inner)?;
                let (outer_key, inner_key, result) = (lambda(2)?, lambda(3)?, lambda(4)?);
                Value::Array(enumerable::hash_join(
                    &items,
                    &inner,
                    |item| apply(outer_key, item),
                    |item| apply(inner_key, item),
                    |o, i| invoke(result, &[o.clone(), i.clone()], None),
                )?)
            }
            QueryOp::Skip => Value::Array(enumerable::skip(items, count_arg(call)?)),
            QueryOp::Take => Value::Array(enumerable::take(items, count_arg(call)?)),
            QueryOp::Distinct => Value::Array(enumerable::distinct(items)),
            QueryOp::Reverse => Value::Array(enumerable::reverse(items)),

            QueryOp::Any => match predicate {
                Some(test) => {
                    let mut found = false;
                    for item in &items {
                        if apply_test(test, item)? {
                            found = true;
                            break;
                        }
                    }
                    Value::Bool(found)
                }
                None => Value::Bool(!items.is_empty()),
            },
            QueryOp::All => {
                let test = lambda(1)?;
                let mut all = true;
                for item in &items {
                    if !apply_test(test, item)? {
                        all = false;
                        break;
                    }
                }
                Value::Bool(all)
            }
            QueryOp::Count => match predicate {
                Some(test) => {
                    Value::from(enumerable::filter(items, |item| apply_test(test, item))?.len())
                }
                None => Value::from(items.len()),
            },
            QueryOp::First
            | QueryOp::FirstOrDefault
            | QueryOp::Last
            | QueryOp::LastOrDefault
            | QueryOp::Single
            | QueryOp::SingleOrDefault => {
                let (position, or_default) = match op {
                    QueryOp::First => (Position::First, false),
                    QueryOp::FirstOrDefault => (Position::First, true),
                    QueryOp::Last => (Position::Last, false),
                    QueryOp::LastOrDefault => (Position::Last, true),
                    QueryOp::Single => (Position::Single, false),
                    _ => (Position::Single, true),
                };
                let candidates = match predicate {
                    Some(test) => enumerable::filter(items, |item| apply_test(test, item))?,
                    None => items,
                };
                enumerable::element_at(candidates, position, or_default)?
            }
            QueryOp::Sum | QueryOp::Min | QueryOp::Max | QueryOp::Average => {
                let values = match predicate {
                    Some(selector) => enumerable::project(&items, |item| apply(selector, item))?,
                    None => items,
                };
                match op {
                    QueryOp::Sum => enumerable::sum(&values, &call.ty)?,
                    QueryOp::Min => enumerable::extreme(values, Ordering::Less)?,
                    QueryOp::Max => enumerable::extreme(values, Ordering::Greater)?,
                    _ => enumerable::average(&values)?,
                }
            }
            QueryOp::Contains => {
                let needle = match call.args.get(1) {
                    Some(arg) => eval(arg, &Scope::empty())?,
                    None => Value::Null,
                };
                Value::Bool(items.iter().any(|item| values_equal(item, &needle)))
            }
            QueryOp::OrderBy
            | QueryOp::OrderByDescending
            | QueryOp::ThenBy
            | QueryOp::ThenByDescending => Value::Array(self.run_ordering(call)?),
        };
        Ok(value)
    }

    /// Sort by a whole `OrderBy(...).ThenBy(...)` chain in one pass.
    fn run_ordering(&self, call: &QueryCall) -> EvalResult<Vec<Value>> {
        let mut keys: Vec<(&Lambda, bool)> = Vec::new();
        let mut current = call;
        let base = loop {
            let op = current.operator.op;
            let descending = matches!(op, QueryOp::OrderByDescending | QueryOp::ThenByDescending);
            keys.push((lambda_arg(current, 1)?, descending));

            let source = current
                .source()
                .ok_or_else(|| EvalError::Unsupported(format!("'{}' without a source", op)))?;
            match op {
                QueryOp::ThenBy | QueryOp::ThenByDescending => {
                    current = source.as_query().ok_or_else(|| {
                        EvalError::Unsupported(format!("'{}' over an unordered sequence", op))
                    })?;
                }
                _ => break source,
            }
        };
        keys.reverse();

        let items = self.run_sequence(base)?;
        let descending: Vec<bool> = keys.iter().map(|(_, d)| *d).collect();
        enumerable::sort_by_keys(
            items,
            |item| keys.iter().map(|(key, _)| apply(key, item)).collect(),
            &descending,
        )
    }
}

impl QueryProvider for MemoryProvider {
    fn execute(&self, expression: &Expr) -> Result<Value, ProviderError> {
        debug!(expression = %expression, "executing query");
        Ok(self.run(expression)?)
    }
}

fn lambda_arg(call: &QueryCall, index: usize) -> EvalResult<&Lambda> {
    call.lambda(index).map(|l| &**l).ok_or_else(|| {
        EvalError::Unsupported(format!(
            "'{}' expects a lambda at argument {}",
            call.operator, index
        ))
    })
}

fn count_arg(call: &QueryCall) -> EvalResult<usize> {
    let value = match call.args.get(1) {
        Some(arg) => eval(arg, &Scope::empty())?,
        None => Value::Null,
    };
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' expects a non-negative count, found '{}'",
                call.operator, value
            ))
        })
}

fn apply(lambda: &Lambda, item: &Value) -> EvalResult<Value> {
    invoke(lambda, std::slice::from_ref(item), None)
}

fn apply_test(lambda: &Lambda, item: &Value) -> EvalResult<bool> {
    truthy(&apply(lambda, item)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynq_lang::{parse_lambda, CompileOptions};
    use dynq_types::{BoundOperator, Param};
    use pretty_assertions::assert_eq;

    fn where_call(source: &Query, text: &str) -> Expr {
        let lambda = parse_lambda(
            &[Param::new("x", Type::Int)],
            Some(&Type::Bool),
            text,
            &[],
            &CompileOptions::default(),
        )
        .unwrap();
        Expr::Query(QueryCall {
            operator: BoundOperator {
                op: QueryOp::Where,
                arity: 2,
                type_args: vec![Type::Int],
            },
            args: vec![
                source.expression().clone(),
                Arc::new(Expr::Lambda(Arc::new(lambda))),
            ],
            ty: Type::sequence(Type::Int),
        })
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Int(i)).collect()
    }

    #[test]
    fn test_enumerate_source() {
        let provider = MemoryProvider::new();
        let numbers = provider.register("numbers", Type::Int, ints(&[3, 1, 2]));
        assert_eq!(numbers.to_vec().unwrap(), ints(&[3, 1, 2]));
        assert_eq!(provider.names(), vec!["numbers".to_string()]);
    }

    #[test]
    fn test_where_runs_lambda() {
        let provider = MemoryProvider::new();
        let numbers = provider.register("numbers", Type::Int, ints(&[1, 5, 2, 8]));
        let expr = where_call(&numbers, "x > 2");
        let query = numbers.create_query(expr).unwrap();
        assert_eq!(query.to_vec().unwrap(), ints(&[5, 8]));
    }

    #[test]
    fn test_replace_is_seen_by_existing_handles() {
        let provider = MemoryProvider::new();
        let numbers = provider.register("numbers", Type::Int, ints(&[1]));
        provider.replace("numbers", ints(&[4, 5])).unwrap();
        assert_eq!(numbers.to_vec().unwrap(), ints(&[4, 5]));

        let err = provider.replace("missing", vec![]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EvalError>(),
            Some(&EvalError::UnknownSource("missing".into()))
        );
    }

    #[test]
    fn test_register_json() {
        let provider = MemoryProvider::new();
        let people = provider
            .register_json(
                "people",
                Type::Any,
                serde_json::json!([{"name": "Ada", "age": 36}, {"name": "Alan", "age": 41}]),
            )
            .unwrap();
        let rows = people.to_vec().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].field("age"), Some(&Value::Int(41)));

        assert!(provider
            .register_json("bad", Type::Any, serde_json::json!({"not": "an array"}))
            .is_err());
    }

    #[test]
    fn test_query_by_name() {
        let provider = MemoryProvider::new();
        provider.register("numbers", Type::Int, ints(&[7]));
        let handle = provider.query("numbers").unwrap();
        assert_eq!(handle.element_type(), &Type::Int);
        assert_eq!(handle.to_vec().unwrap(), ints(&[7]));
        assert!(provider.query("other").is_none());
    }
}
