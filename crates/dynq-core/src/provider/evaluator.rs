//! Scalar expression interpreter.
//!
//! Evaluates lambda bodies against bound parameter values. Query nodes are
//! not handled here; providers run those and call back into the evaluator
//! for each lambda argument.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use dynq_types::{
    BinaryOp, Expr, Lambda, Member, Method, Param, QueryOp, Record, Type, UnaryOp, Value,
};

use super::enumerable::{self, Position};

/// Errors raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The named data set is not registered.
    #[error("unknown data set '{0}'")]
    UnknownSource(String),

    /// An element operator found no elements.
    #[error("sequence contains no elements")]
    NoElements,

    /// `Single` found more than one element.
    #[error("sequence contains more than one element")]
    MoreThanOneElement,

    /// Integer arithmetic overflowed.
    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Index outside the collection.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// A value had the wrong shape for the operation.
    #[error("type error: {0}")]
    Type(String),

    /// The expression cannot be evaluated here.
    #[error("unsupported expression: {0}")]
    Unsupported(String),
}

impl EvalError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type(message.into())
    }
}

type EvalResult<T> = Result<T, EvalError>;

/// Parameter values visible to an expression.
///
/// Scopes chain to their parent so nested lambdas can read outer
/// parameters; lookup goes innermost first.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    params: &'a [Param],
    values: &'a [Value],
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Scope with no bindings.
    pub fn empty() -> Self {
        Self {
            params: &[],
            values: &[],
            parent: None,
        }
    }

    /// Bind `values` to `params` inside `parent`.
    pub fn new(params: &'a [Param], values: &'a [Value], parent: Option<&'a Scope<'a>>) -> Self {
        Self {
            params,
            values,
            parent,
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        let found = self
            .params
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.values.get(i));
        found.or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }
}

/// Invoke `lambda` with `args` bound to its parameters.
pub fn invoke(lambda: &Lambda, args: &[Value], parent: Option<&Scope<'_>>) -> EvalResult<Value> {
    if args.len() != lambda.params.len() {
        return Err(EvalError::type_error(format!(
            "lambda takes {} argument(s), found {}",
            lambda.params.len(),
            args.len()
        )));
    }
    let scope = Scope::new(&lambda.params, args, parent);
    eval(&lambda.body, &scope)
}

/// Evaluate `expr` within `scope`.
pub fn eval(expr: &Expr, scope: &Scope<'_>) -> EvalResult<Value> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Parameter(param) => scope
            .lookup(&param.name)
            .cloned()
            .ok_or_else(|| EvalError::Unsupported(format!("unbound parameter '{}'", param.name))),
        Expr::Member { target, member, .. } => {
            let target = eval(target, scope)?;
            member_of(&target, member)
        }
        Expr::Index { target, index, .. } => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            index_of(&target, &index)
        }
        Expr::Unary { op, operand, .. } => {
            let operand = eval(operand, scope)?;
            unary(*op, operand)
        }
        Expr::Binary {
            op, left, right, ..
        } => binary(*op, left, right, scope),
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } => {
            if truthy(&eval(test, scope)?)? {
                eval(if_true, scope)
            } else {
                eval(if_false, scope)
            }
        }
        Expr::Call {
            target,
            method,
            args,
            ty,
        } => {
            let target = eval(target, scope)?;
            call(&target, *method, args, ty, scope)
        }
        Expr::New { record, fields } => {
            let values = fields
                .iter()
                .map(|f| eval(f, scope))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Record(Record::new(record.clone(), values)))
        }
        Expr::Convert { operand, ty } => {
            let value = eval(operand, scope)?;
            Ok(convert(value, ty))
        }
        Expr::Lambda(lambda) => Err(EvalError::Unsupported(format!(
            "lambda '{}' used as a value",
            lambda
        ))),
        Expr::Source { name, .. } => Err(EvalError::Unsupported(format!(
            "data set '{}' referenced inside a lambda",
            name
        ))),
        Expr::Query(call) => Err(EvalError::Unsupported(format!(
            "query operator '{}' inside a lambda",
            call.operator
        ))),
    }
}

fn member_of(target: &Value, member: &Member) -> EvalResult<Value> {
    if target.is_null() {
        return Ok(Value::Null);
    }
    let missing = || {
        EvalError::type_error(format!(
            "no member '{}' on value of type '{}'",
            member.name(),
            target.type_of()
        ))
    };

    match (member, target) {
        (Member::Field { name, index }, Value::Record(record)) => {
            // Rows may carry their own layout; fall back to lookup by name
            let by_index = record
                .record_type()
                .fields
                .get(*index)
                .filter(|f| &f.name == name)
                .and_then(|_| record.get_index(*index));
            by_index
                .or_else(|| record.get(name))
                .cloned()
                .ok_or_else(missing)
        }
        (Member::Key, Value::Group(group)) => Ok(group.key.clone()),
        (Member::Count | Member::Length, Value::Group(group)) => Ok(Value::from(group.items.len())),
        (Member::Count | Member::Length, Value::Array(items)) => Ok(Value::from(items.len())),
        (Member::Length, Value::String(s)) => Ok(Value::from(s.chars().count())),
        (Member::Dynamic(name), value) => dynamic_member(value, name).ok_or_else(missing),
        _ => Err(missing()),
    }
}

fn dynamic_member(target: &Value, name: &str) -> Option<Value> {
    match target {
        Value::Record(record) => record
            .record_type()
            .field_ignore_case(name)
            .and_then(|(i, _)| record.get_index(i))
            .cloned(),
        Value::Group(group) if name.eq_ignore_ascii_case("Key") => Some(group.key.clone()),
        Value::Group(group) if name.eq_ignore_ascii_case("Count") => {
            Some(Value::from(group.items.len()))
        }
        Value::Array(items)
            if name.eq_ignore_ascii_case("Count") || name.eq_ignore_ascii_case("Length") =>
        {
            Some(Value::from(items.len()))
        }
        Value::String(s) if name.eq_ignore_ascii_case("Length") => {
            Some(Value::from(s.chars().count()))
        }
        _ => None,
    }
}

fn index_of(target: &Value, index: &Value) -> EvalResult<Value> {
    if target.is_null() || index.is_null() {
        return Ok(Value::Null);
    }
    let items = target
        .as_items()
        .ok_or_else(|| EvalError::type_error(format!("'{}' cannot be indexed", target)))?;
    let i = index
        .as_i64()
        .ok_or_else(|| EvalError::type_error(format!("index '{}' is not an integer", index)))?;
    usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(EvalError::IndexOutOfRange {
            index: i,
            len: items.len(),
        })
}

fn unary(op: UnaryOp, operand: Value) -> EvalResult<Value> {
    match (op, operand) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Overflow("negation")),
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, other) => Err(EvalError::type_error(format!(
            "operator '{}' cannot be applied to '{}'",
            op.symbol(),
            other
        ))),
    }
}

/// Condition value; `null` counts as false.
pub(crate) fn truthy(value: &Value) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::type_error(format!(
            "condition '{}' is not a boolean",
            other
        ))),
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope<'_>) -> EvalResult<Value> {
    // Short-circuit logical operators
    match op {
        BinaryOp::And => {
            let result = truthy(&eval(left, scope)?)? && truthy(&eval(right, scope)?)?;
            return Ok(Value::Bool(result));
        }
        BinaryOp::Or => {
            let result = truthy(&eval(left, scope)?)? || truthy(&eval(right, scope)?)?;
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    let l = eval(left, scope)?;
    let r = eval(right, scope)?;

    if op.is_equality() {
        let equal = values_equal(&l, &r);
        return Ok(Value::Bool(if op == BinaryOp::Equal { equal } else { !equal }));
    }

    if op.is_relational() {
        // Comparisons involving null are false
        if l.is_null() || r.is_null() {
            return Ok(Value::Bool(false));
        }
        let ord = l.total_cmp(&r);
        let result = match op {
            BinaryOp::Less => ord == Ordering::Less,
            BinaryOp::LessEqual => ord != Ordering::Greater,
            BinaryOp::Greater => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        };
        return Ok(Value::Bool(result));
    }

    arithmetic(op, l, r)
}

/// Equality with integer/float cross-comparison.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            a.total_cmp(b) == Ordering::Equal
        }
        _ => a == b,
    }
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> EvalResult<Value> {
    match (l, r) {
        (Value::String(a), b) if op == BinaryOp::Add => Ok(Value::String(a + &text(&b))),
        (a, Value::String(b)) if op == BinaryOp::Add => Ok(Value::String(text(&a) + &b)),
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => integer_arithmetic(op, a, b),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Subtract => x - y,
                BinaryOp::Multiply => x * y,
                BinaryOp::Divide => x / y,
                _ => x % y,
            })),
            _ => Err(EvalError::type_error(format!(
                "operator '{}' cannot be applied to '{}' and '{}'",
                op.symbol(),
                a,
                b
            ))),
        },
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result
        .map(Value::Int)
        .ok_or(EvalError::Overflow(op.symbol()))
}

/// Text form used for string concatenation.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn convert(value: Value, ty: &Type) -> Value {
    match (ty, value) {
        (Type::Float, Value::Int(i)) => Value::Float(i as f64),
        (_, value) => value,
    }
}

fn call(
    target: &Value,
    method: Method,
    args: &[Arc<Expr>],
    ty: &Type,
    scope: &Scope<'_>,
) -> EvalResult<Value> {
    if target.is_null() {
        return Ok(Value::Null);
    }

    if let Method::Sequence(op) = method {
        let items = target.as_items().ok_or_else(|| {
            EvalError::type_error(format!("'{}' is not a collection", target))
        })?;
        return sequence_method(items, op, args, ty, scope);
    }

    let s = target
        .as_str()
        .ok_or_else(|| EvalError::type_error(format!("'{}' is not a string", target)))?;
    let arg = match args.first() {
        Some(arg) => Some(eval(arg, scope)?),
        None => None,
    };
    let arg_str = || {
        arg.as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::type_error(format!("{} expects a string", method.name())))
    };

    Ok(match method {
        Method::StartsWith => Value::Bool(s.starts_with(arg_str()?)),
        Method::EndsWith => Value::Bool(s.ends_with(arg_str()?)),
        Method::StringContains => Value::Bool(s.contains(arg_str()?)),
        Method::ToUpper => Value::String(s.to_uppercase()),
        Method::ToLower => Value::String(s.to_lowercase()),
        Method::Trim => Value::String(s.trim().to_string()),
        Method::Sequence(op) => {
            return Err(EvalError::Unsupported(format!("'{}' on a string", op)));
        }
    })
}

/// Run a query operator over a nested collection.
fn sequence_method(
    items: &[Value],
    op: QueryOp,
    args: &[Arc<Expr>],
    ty: &Type,
    scope: &Scope<'_>,
) -> EvalResult<Value> {
    let lambda = match args.first().map(|a| &**a) {
        Some(Expr::Lambda(lambda)) => Some(lambda.as_ref()),
        _ => None,
    };
    let apply = |item: &Value| -> EvalResult<Value> {
        match lambda {
            Some(lambda) => invoke(lambda, std::slice::from_ref(item), Some(scope)),
            None => Ok(item.clone()),
        }
    };
    let test = |item: &Value| -> EvalResult<bool> { truthy(&apply(item)?) };

    match op {
        QueryOp::Any => {
            for item in items {
                if lambda.is_none() || test(item)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        QueryOp::All => {
            for item in items {
                if !test(item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        QueryOp::Count => match lambda {
            Some(_) => Ok(Value::from(enumerable::filter(items.to_vec(), &test)?.len())),
            None => Ok(Value::from(items.len())),
        },
        QueryOp::Where => Ok(Value::Array(enumerable::filter(items.to_vec(), &test)?)),
        QueryOp::Select => Ok(Value::Array(enumerable::project(items, &apply)?)),
        QueryOp::First => {
            let candidates = match lambda {
                Some(_) => enumerable::filter(items.to_vec(), &test)?,
                None => items.to_vec(),
            };
            enumerable::element_at(candidates, Position::First, false)
        }
        QueryOp::Sum => enumerable::sum(&enumerable::project(items, &apply)?, ty),
        QueryOp::Average => enumerable::average(&enumerable::project(items, &apply)?),
        QueryOp::Min => enumerable::extreme(enumerable::project(items, &apply)?, Ordering::Less),
        QueryOp::Max => {
            enumerable::extreme(enumerable::project(items, &apply)?, Ordering::Greater)
        }
        QueryOp::Contains => {
            let needle = match args.first() {
                Some(arg) => eval(arg, scope)?,
                None => Value::Null,
            };
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, &needle))))
        }
        other => Err(EvalError::Unsupported(format!(
            "'{}' on a nested collection",
            other
        ))),
    }
}

/// A bound lambda callable as a function over values.
#[derive(Clone)]
pub struct CompiledLambda {
    lambda: Arc<Lambda>,
}

impl CompiledLambda {
    /// Wrap a lambda.
    pub fn new(lambda: Lambda) -> Self {
        Self {
            lambda: Arc::new(lambda),
        }
    }

    /// The wrapped lambda.
    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    /// Static result type.
    pub fn return_type(&self) -> &Type {
        &self.lambda.return_type
    }

    /// Invoke with one argument per parameter.
    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        invoke(&self.lambda, args, None)
    }

    /// Invoke a single-parameter lambda.
    pub fn call1(&self, arg: &Value) -> EvalResult<Value> {
        self.call(std::slice::from_ref(arg))
    }
}

impl fmt::Debug for CompiledLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledLambda({})", self.lambda)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynq_lang::{parse_lambda, CompileOptions};
    use dynq_types::RecordType;

    fn order_type() -> Type {
        Type::record(RecordType::new("Order").with_field("Qty", Type::Int))
    }

    fn product_type() -> Type {
        Type::record(
            RecordType::new("Product")
                .with_field("Name", Type::String)
                .with_field("Price", Type::Float)
                .with_field("Stock", Type::Int)
                .with_field("Orders", Type::array(order_type())),
        )
    }

    fn product(name: &str, price: f64, stock: i64, orders: &[i64]) -> Value {
        let orders: Vec<Value> = orders
            .iter()
            .map(|&q| Value::Record(Record::from_fields(Some("Order"), [("Qty", Value::Int(q))])))
            .collect();
        Value::Record(Record::from_fields(
            Some("Product"),
            [
                ("Name", Value::from(name)),
                ("Price", Value::Float(price)),
                ("Stock", Value::Int(stock)),
                ("Orders", Value::Array(orders)),
            ],
        ))
    }

    fn compile(text: &str) -> CompiledLambda {
        let lambda = parse_lambda(
            &[Param::new("x", product_type())],
            None,
            text,
            &[],
            &CompileOptions::default(),
        )
        .unwrap();
        CompiledLambda::new(lambda)
    }

    #[test]
    fn test_predicates() {
        let row = product("Apple", 12.5, 3, &[1, 4]);
        assert_eq!(compile("Price > 10 && Name.StartsWith(\"A\")").call1(&row).unwrap(), Value::Bool(true));
        assert_eq!(compile("Stock == 3.0").call1(&row).unwrap(), Value::Bool(true));
        assert_eq!(compile("Orders.Any(Qty > 3)").call1(&row).unwrap(), Value::Bool(true));
        assert_eq!(compile("Orders.All(Qty > 3)").call1(&row).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_projection_and_aggregates() {
        let row = product("Pear", 2.0, 5, &[2, 3]);
        let value = compile("new(Name.ToUpper() as Upper, Orders.Sum(Qty) as Total, Stock * Price as Worth)")
            .call1(&row)
            .unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("Upper"), Some(&Value::from("PEAR")));
        assert_eq!(record.get("Total"), Some(&Value::Int(5)));
        assert_eq!(record.get("Worth"), Some(&Value::Float(10.0)));
    }

    #[test]
    fn test_nested_lambda_reads_outer_parameter() {
        let row = product("Fig", 1.0, 2, &[1, 2, 3]);
        assert_eq!(compile("Orders.Count(Qty >= x.Stock)").call1(&row).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_checked_integer_arithmetic() {
        let row = product("Kiwi", 1.0, 0, &[]);
        assert_eq!(compile("10 / Stock").call1(&row).unwrap_err(), EvalError::DivisionByZero);

        let row = product("Kiwi", 1.0, i64::MAX, &[]);
        assert!(matches!(compile("Stock + 1").call1(&row), Err(EvalError::Overflow(_))));
    }

    #[test]
    fn test_null_propagation() {
        let scope_params = [Param::new("x", Type::Any)];
        let lambda = parse_lambda(&scope_params, None, "a.b", &[], &CompileOptions::default()).unwrap();
        let row = Value::Record(Record::from_fields(None, [("a", Value::Null)]));
        assert_eq!(invoke(&lambda, &[row], None).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_concatenation_and_conditional() {
        let row = product("Plum", 3.0, 0, &[]);
        assert_eq!(
            compile("Name + \": \" + iif(Stock > 0, \"in stock\", \"sold out\")").call1(&row).unwrap(),
            Value::from("Plum: sold out")
        );
    }

    #[test]
    fn test_wrong_argument_count() {
        assert!(matches!(compile("Stock").call(&[]), Err(EvalError::Type(_))));
    }
}
