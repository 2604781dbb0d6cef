//! Binder from untyped AST to typed expression trees.
//!
//! The binder resolves identifiers against lambda parameters and the
//! implicit scope, looks up members and methods on the static types, and
//! checks operand types. Placeholders are replaced by constants taken from
//! the positional argument list.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{self, Literal, OrderingTerm, SortDirection};
use crate::error::{CompileError, CompileErrorKind};
use crate::span::Span;
use dynq_types::{
    BinaryOp, Expr, Lambda, Member, Method, Param, QueryOp, RecordType, Type, UnaryOp, Value,
};

/// Default keyword naming the implicit scope.
pub const DEFAULT_IMPLICIT_KEYWORD: &str = "it";

/// Options controlling name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Keyword that refers to the current implicit scope.
    pub implicit_keyword: String,
    /// Fall back to ASCII case-insensitive member lookup.
    pub case_insensitive_members: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            implicit_keyword: DEFAULT_IMPLICIT_KEYWORD.to_string(),
            case_insensitive_members: true,
        }
    }
}

impl CompileOptions {
    /// Set the implicit scope keyword.
    pub fn with_implicit_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.implicit_keyword = keyword.into();
        self
    }

    /// Enable or disable case-insensitive member lookup.
    pub fn with_case_insensitive_members(mut self, enabled: bool) -> Self {
        self.case_insensitive_members = enabled;
        self
    }
}

/// Binds parsed expressions to typed lambdas.
pub struct Compiler<'a> {
    options: &'a CompileOptions,
    args: &'a [Value],
    scopes: Vec<Vec<Param>>,
}

impl<'a> Compiler<'a> {
    /// Create a binder over the given positional arguments.
    pub fn new(options: &'a CompileOptions, args: &'a [Value]) -> Self {
        Self {
            options,
            args,
            scopes: Vec::new(),
        }
    }

    /// Bind `expr` as the body of a lambda over `params`.
    ///
    /// With a declared `result_type` the body must be assignable to it; an
    /// integer body widens to `float` through an inserted conversion.
    pub fn compile_lambda(
        &mut self,
        params: &[Param],
        result_type: Option<&Type>,
        expr: &ast::Expr,
    ) -> Result<Lambda, CompileError> {
        let body = self.bind_in_scope(params.to_vec(), expr)?;

        let Some(declared) = result_type else {
            return Ok(Lambda::new(params.to_vec(), body));
        };

        let actual = body.ty();
        if declared.is_assignable_from(&actual) {
            Ok(Lambda::new(params.to_vec(), body).with_return_type(declared.clone()))
        } else if declared.is_widening_from(&actual) {
            let converted = Expr::Convert {
                operand: Arc::new(body),
                ty: declared.clone(),
            };
            Ok(Lambda::new(params.to_vec(), converted))
        } else {
            Err(CompileError::type_mismatch(
                format!(
                    "expression of type '{}' cannot be used as '{}'",
                    actual, declared
                ),
                expr.span(),
            ))
        }
    }

    /// Bind each ordering term as a key selector over `params`.
    pub fn compile_ordering(
        &mut self,
        params: &[Param],
        terms: &[OrderingTerm],
    ) -> Result<Vec<(Lambda, SortDirection)>, CompileError> {
        terms
            .iter()
            .map(|term| {
                let key = self.compile_lambda(params, None, &term.expr)?;
                if !key.return_type.is_comparable() {
                    return Err(CompileError::type_mismatch(
                        format!("ordering key of type '{}' is not comparable", key.return_type),
                        term.expr.span(),
                    ));
                }
                Ok((key, term.direction))
            })
            .collect()
    }

    fn bind_in_scope(&mut self, params: Vec<Param>, expr: &ast::Expr) -> Result<Expr, CompileError> {
        self.scopes.push(params);
        let result = self.bind(expr);
        self.scopes.pop();
        result
    }

    fn bind(&mut self, expr: &ast::Expr) -> Result<Expr, CompileError> {
        match expr {
            ast::Expr::Literal(literal) => Ok(Self::bind_literal(&literal.value)),
            ast::Expr::Placeholder(index) => match self.args.get(index.value) {
                Some(value) => Ok(Expr::constant(value.clone())),
                None => Err(CompileError::missing_argument(
                    index.value,
                    self.args.len(),
                    index.span,
                )),
            },
            ast::Expr::Ident(name) => self.bind_ident(&name.value, name.span),
            ast::Expr::Member { target, name } => {
                let target = self.bind(target)?;
                self.bind_member(target, &name.value, name.span)
            }
            ast::Expr::Call {
                target,
                name,
                args,
                span,
            } => {
                let target = match target {
                    Some(target) => self.bind(target)?,
                    None => self.implicit_target(&name.value, name.span)?,
                };
                self.bind_method(target, &name.value, args, *span)
            }
            ast::Expr::Index {
                target,
                index,
                span,
            } => self.bind_index(target, index, *span),
            ast::Expr::Unary { op, operand, span } => self.bind_unary(*op, operand, *span),
            ast::Expr::Binary { op, left, right } => self.bind_binary(*op, left, right),
            ast::Expr::Conditional {
                test,
                if_true,
                if_false,
                span,
            } => self.bind_conditional(test, if_true, if_false, *span),
            ast::Expr::New { fields, span } => self.bind_new(fields, *span),
        }
    }

    fn bind_literal(literal: &Literal) -> Expr {
        match literal {
            Literal::Null => Expr::typed_constant(Value::Null, Type::Null),
            Literal::Bool(b) => Expr::constant(Value::Bool(*b)),
            Literal::Int(i) => Expr::constant(Value::Int(*i)),
            Literal::Float(f) => Expr::constant(Value::Float(*f)),
            Literal::String(s) => Expr::constant(Value::String(s.clone())),
        }
    }

    /// Resolve a bare identifier: parameter, implicit keyword, or member
    /// of the implicit scope.
    fn bind_ident(&mut self, name: &str, span: Span) -> Result<Expr, CompileError> {
        for scope in self.scopes.iter().rev() {
            if let Some(param) = scope.iter().find(|p| p.name == name) {
                return Ok(Expr::parameter(param));
            }
        }

        if name.eq_ignore_ascii_case(&self.options.implicit_keyword) {
            return self.implicit_target(name, span);
        }

        let target = self.implicit_target(name, span)?;
        self.bind_member(target, name, span).map_err(|err| {
            if err.kind == CompileErrorKind::UnknownMember {
                CompileError::new(
                    format!("unknown identifier '{}': {}", name, err.message),
                    span,
                    CompileErrorKind::UnknownIdentifier,
                )
            } else {
                err
            }
        })
    }

    /// The first parameter of the innermost scope.
    fn implicit_target(&self, name: &str, span: Span) -> Result<Expr, CompileError> {
        self.scopes
            .last()
            .and_then(|scope| scope.first())
            .map(Expr::parameter)
            .ok_or_else(|| CompileError::unknown_identifier(name, span))
    }

    fn name_matches(&self, candidate: &str, name: &str) -> bool {
        candidate == name
            || (self.options.case_insensitive_members && candidate.eq_ignore_ascii_case(name))
    }

    fn bind_member(&self, target: Expr, name: &str, span: Span) -> Result<Expr, CompileError> {
        let target_ty = target.ty();

        let resolved = match &target_ty {
            Type::Any => Some((Member::Dynamic(name.to_string()), Type::Any)),
            Type::Record(record) => {
                let field = if self.options.case_insensitive_members {
                    record.field_ignore_case(name)
                } else {
                    record.field(name)
                };
                field.map(|(index, field)| {
                    (
                        Member::Field {
                            name: field.name.clone(),
                            index,
                        },
                        field.ty.clone(),
                    )
                })
            }
            Type::Generic { name: container, args }
                if container == dynq_types::ty::GROUPING && args.len() == 2 =>
            {
                if self.name_matches("Key", name) {
                    Some((Member::Key, args[0].clone()))
                } else if self.name_matches("Count", name) {
                    Some((Member::Count, Type::Int))
                } else {
                    None
                }
            }
            Type::String if self.name_matches("Length", name) => Some((Member::Length, Type::Int)),
            ty if ty.is_sequence() => {
                if self.name_matches("Length", name) {
                    Some((Member::Length, Type::Int))
                } else if self.name_matches("Count", name) {
                    Some((Member::Count, Type::Int))
                } else {
                    None
                }
            }
            _ => None,
        };

        let (member, ty) =
            resolved.ok_or_else(|| CompileError::unknown_member(name, &target_ty, span))?;
        Ok(Expr::Member {
            target: Arc::new(target),
            member,
            ty,
        })
    }

    fn bind_index(
        &mut self,
        target: &ast::Expr,
        index: &ast::Expr,
        span: Span,
    ) -> Result<Expr, CompileError> {
        let target = self.bind(target)?;
        let index_expr = self.bind(index)?;

        let index_ty = index_expr.ty();
        if !matches!(index_ty, Type::Int | Type::Any) {
            return Err(CompileError::type_mismatch(
                format!("index must be of type 'int', found '{}'", index_ty),
                index.span(),
            ));
        }

        let target_ty = target.ty();
        let ty = match &target_ty {
            Type::Any => Type::Any,
            ty => ty.sequence_element().cloned().ok_or_else(|| {
                CompileError::type_mismatch(
                    format!("type '{}' cannot be indexed", target_ty),
                    span,
                )
            })?,
        };

        Ok(Expr::Index {
            target: Arc::new(target),
            index: Arc::new(index_expr),
            ty,
        })
    }

    fn bind_unary(
        &mut self,
        op: UnaryOp,
        operand: &ast::Expr,
        span: Span,
    ) -> Result<Expr, CompileError> {
        let operand = self.bind(operand)?;
        let operand_ty = operand.ty();

        let ty = match (op, &operand_ty) {
            (_, Type::Any) => Type::Any,
            (UnaryOp::Not, Type::Bool) => Type::Bool,
            (UnaryOp::Negate, ty) if ty.is_numeric() => ty.clone(),
            _ => {
                return Err(CompileError::type_mismatch(
                    format!(
                        "operator '{}' cannot be applied to '{}'",
                        op.symbol(),
                        operand_ty
                    ),
                    span,
                ))
            }
        };

        Ok(Expr::Unary {
            op,
            operand: Arc::new(operand),
            ty,
        })
    }

    fn bind_binary(
        &mut self,
        op: BinaryOp,
        left_ast: &ast::Expr,
        right_ast: &ast::Expr,
    ) -> Result<Expr, CompileError> {
        let left = self.bind(left_ast)?;
        let right = self.bind(right_ast)?;
        let (lt, rt) = (left.ty(), right.ty());
        let span = left_ast.span().to(right_ast.span());

        let mismatch = || {
            CompileError::type_mismatch(
                format!(
                    "operator '{}' cannot be applied to '{}' and '{}'",
                    op.symbol(),
                    lt,
                    rt
                ),
                span,
            )
        };

        let ty = if op.is_logical() {
            let boolish = |t: &Type| matches!(t, Type::Bool | Type::Any);
            if !boolish(&lt) || !boolish(&rt) {
                return Err(mismatch());
            }
            Type::Bool
        } else if op.is_equality() {
            if !compatible(&lt, &rt) {
                return Err(mismatch());
            }
            Type::Bool
        } else if op.is_relational() {
            if !compatible(&lt, &rt) || !lt.is_comparable() || !rt.is_comparable() {
                return Err(mismatch());
            }
            Type::Bool
        } else {
            arithmetic_type(op, &lt, &rt).ok_or_else(mismatch)?
        };

        Ok(Expr::Binary {
            op,
            left: Arc::new(left),
            right: Arc::new(right),
            ty,
        })
    }

    fn bind_conditional(
        &mut self,
        test: &ast::Expr,
        if_true: &ast::Expr,
        if_false: &ast::Expr,
        span: Span,
    ) -> Result<Expr, CompileError> {
        let test_expr = self.bind(test)?;
        let test_ty = test_expr.ty();
        if !matches!(test_ty, Type::Bool | Type::Any) {
            return Err(CompileError::type_mismatch(
                format!("condition must be of type 'bool', found '{}'", test_ty),
                test.span(),
            ));
        }

        let a = self.bind(if_true)?;
        let b = self.bind(if_false)?;
        let (at, bt) = (a.ty(), b.ty());
        let ty = unify(&at, &bt).ok_or_else(|| {
            CompileError::type_mismatch(
                format!("conditional branches have types '{}' and '{}'", at, bt),
                span,
            )
        })?;

        Ok(Expr::Conditional {
            test: Arc::new(test_expr),
            if_true: Arc::new(widen(a, &ty)),
            if_false: Arc::new(widen(b, &ty)),
            ty,
        })
    }

    fn bind_new(&mut self, fields: &[ast::NewField], span: Span) -> Result<Expr, CompileError> {
        let mut record = RecordType::anonymous();
        let mut values = Vec::with_capacity(fields.len());
        let mut seen = HashSet::new();

        for field in fields {
            let (name, name_span) = match &field.alias {
                Some(alias) => (alias.value.as_str(), alias.span),
                None => match field.value.implicit_name() {
                    Some(name) => (name, field.value.span()),
                    None => {
                        return Err(CompileError::new(
                            "projected expression needs a name; add 'as <Name>'",
                            field.value.span(),
                            CompileErrorKind::MissingFieldName,
                        ))
                    }
                },
            };
            if !seen.insert(name.to_string()) {
                return Err(CompileError::new(
                    format!("field '{}' is projected more than once", name),
                    name_span,
                    CompileErrorKind::DuplicateField,
                ));
            }

            let value = self.bind(&field.value)?;
            record = record.with_field(name, value.ty());
            values.push(Arc::new(value));
        }

        if values.is_empty() {
            return Err(CompileError::new(
                "new(...) needs at least one field",
                span,
                CompileErrorKind::MissingFieldName,
            ));
        }

        Ok(Expr::New {
            record: Arc::new(record),
            fields: values,
        })
    }

    fn bind_method(
        &mut self,
        target: Expr,
        name: &str,
        args: &[ast::Expr],
        span: Span,
    ) -> Result<Expr, CompileError> {
        let target_ty = target.ty();

        match &target_ty {
            Type::String => {
                let method = self
                    .string_method(name)
                    .ok_or_else(|| CompileError::unknown_method(name, &target_ty, span))?;
                self.bind_string_method(target, method, args, span)
            }
            Type::Any => {
                // Resolve by name; string methods win over sequence methods
                match self.string_method(name) {
                    Some(method) => self.bind_string_method(target, method, args, span),
                    None => self.bind_sequence_method(target, Type::Any, name, args, span),
                }
            }
            ty => match ty.sequence_element() {
                Some(element) => {
                    let element = element.clone();
                    self.bind_sequence_method(target, element, name, args, span)
                }
                None => Err(CompileError::unknown_method(name, &target_ty, span)),
            },
        }
    }

    fn string_method(&self, name: &str) -> Option<Method> {
        [
            Method::StartsWith,
            Method::EndsWith,
            Method::StringContains,
            Method::ToUpper,
            Method::ToLower,
            Method::Trim,
        ]
        .into_iter()
        .find(|m| self.name_matches(m.name(), name))
    }

    fn bind_string_method(
        &mut self,
        target: Expr,
        method: Method,
        args: &[ast::Expr],
        span: Span,
    ) -> Result<Expr, CompileError> {
        let (expected, ty) = match method {
            Method::StartsWith | Method::EndsWith | Method::StringContains => (1, Type::Bool),
            _ => (0, Type::String),
        };
        check_arity(method.name(), args.len(), expected..=expected, span)?;

        let mut bound = Vec::with_capacity(args.len());
        for arg in args {
            let arg_expr = self.bind(arg)?;
            let arg_ty = arg_expr.ty();
            if !Type::String.is_assignable_from(&arg_ty) {
                return Err(CompileError::type_mismatch(
                    format!("{} expects a 'string' argument, found '{}'", method.name(), arg_ty),
                    arg.span(),
                ));
            }
            bound.push(Arc::new(arg_expr));
        }

        Ok(Expr::Call {
            target: Arc::new(target),
            method,
            args: bound,
            ty,
        })
    }

    /// Bind a query operator applied to a nested collection.
    fn bind_sequence_method(
        &mut self,
        target: Expr,
        element: Type,
        name: &str,
        args: &[ast::Expr],
        span: Span,
    ) -> Result<Expr, CompileError> {
        let target_ty = target.ty();
        let op = QueryOp::from_name(name)
            .filter(|op| self.name_matches(op.name(), name))
            .filter(|op| NESTED_OPERATORS.contains(op))
            .ok_or_else(|| CompileError::unknown_method(name, &target_ty, span))?;

        let arity = match op {
            QueryOp::All | QueryOp::Where | QueryOp::Select | QueryOp::Contains => 1..=1,
            _ => 0..=1,
        };
        check_arity(op.name(), args.len(), arity, span)?;

        let mut bound = Vec::with_capacity(args.len());
        let mut projected = element.clone();

        if let Some(arg) = args.first() {
            if op == QueryOp::Contains {
                let value = self.bind(arg)?;
                if !compatible(&element, &value.ty()) {
                    return Err(CompileError::type_mismatch(
                        format!(
                            "Contains expects a value of type '{}', found '{}'",
                            element,
                            value.ty()
                        ),
                        arg.span(),
                    ));
                }
                bound.push(Arc::new(value));
            } else {
                let param = Param::new(self.options.implicit_keyword.clone(), element.clone());
                let body = self.bind_in_scope(vec![param.clone()], arg)?;
                let body_ty = body.ty();

                if is_predicate(op) && !matches!(body_ty, Type::Bool | Type::Any) {
                    return Err(CompileError::type_mismatch(
                        format!("{} expects a predicate, found '{}'", op.name(), body_ty),
                        arg.span(),
                    ));
                }
                projected = body_ty;
                bound.push(Arc::new(Expr::Lambda(Arc::new(Lambda::new(vec![param], body)))));
            }
        }

        let ty = match op {
            QueryOp::Any | QueryOp::All | QueryOp::Contains => Type::Bool,
            QueryOp::Count => Type::Int,
            QueryOp::First => element.clone(),
            QueryOp::Where => Type::sequence(element.clone()),
            QueryOp::Select => Type::sequence(projected),
            QueryOp::Min | QueryOp::Max => projected,
            QueryOp::Sum | QueryOp::Average => {
                if !matches!(projected, Type::Int | Type::Float | Type::Any) {
                    return Err(CompileError::type_mismatch(
                        format!("{} needs numeric values, found '{}'", op.name(), projected),
                        span,
                    ));
                }
                if op == QueryOp::Average {
                    Type::Float
                } else {
                    projected
                }
            }
            _ => return Err(CompileError::unknown_method(name, &target_ty, span)),
        };

        Ok(Expr::Call {
            target: Arc::new(target),
            method: Method::Sequence(op),
            args: bound,
            ty,
        })
    }
}

/// Query operators callable on nested collections inside an expression.
const NESTED_OPERATORS: [QueryOp; 11] = [
    QueryOp::Any,
    QueryOp::All,
    QueryOp::Count,
    QueryOp::Sum,
    QueryOp::Min,
    QueryOp::Max,
    QueryOp::Average,
    QueryOp::Where,
    QueryOp::Select,
    QueryOp::Contains,
    QueryOp::First,
];

fn is_predicate(op: QueryOp) -> bool {
    matches!(
        op,
        QueryOp::Any | QueryOp::All | QueryOp::Count | QueryOp::Where | QueryOp::First
    )
}

fn check_arity(
    name: &str,
    found: usize,
    expected: std::ops::RangeInclusive<usize>,
    span: Span,
) -> Result<(), CompileError> {
    if expected.contains(&found) {
        return Ok(());
    }
    let expected = if expected.start() == expected.end() {
        expected.start().to_string()
    } else {
        format!("{} or {}", expected.start(), expected.end())
    };
    Err(CompileError::new(
        format!("{} takes {} argument(s), found {}", name, expected, found),
        span,
        CompileErrorKind::InvalidArity,
    ))
}

/// Check if values of the two types can be compared with each other.
fn compatible(a: &Type, b: &Type) -> bool {
    a.is_assignable_from(b) || b.is_assignable_from(a) || (a.is_numeric() && b.is_numeric())
}

/// Result type of an arithmetic operator.
fn arithmetic_type(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    match (left, right) {
        (Type::String, _) | (_, Type::String) if op == BinaryOp::Add => {
            Some(Type::String)
        }
        (Type::Any, _) | (_, Type::Any) => Some(Type::Any),
        (Type::Int, Type::Int) => Some(Type::Int),
        (l, r) if l.is_numeric() && r.is_numeric() => Some(Type::Float),
        _ => None,
    }
}

/// Wrap an integer expression in a conversion when `ty` is `float`.
fn widen(expr: Expr, ty: &Type) -> Expr {
    if ty.is_widening_from(&expr.ty()) {
        Expr::Convert {
            operand: Arc::new(expr),
            ty: ty.clone(),
        }
    } else {
        expr
    }
}

/// Common type of two conditional branches.
fn unify(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        _ if a == b => Some(a.clone()),
        (Type::Null, other) | (other, Type::Null) => Some(other.clone()),
        (Type::Any, _) | (_, Type::Any) => Some(Type::Any),
        _ if a.is_numeric() && b.is_numeric() => Some(Type::Float),
        _ if a.is_assignable_from(b) => Some(a.clone()),
        _ if b.is_assignable_from(a) => Some(b.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use pretty_assertions::assert_eq;

    fn order_type() -> Type {
        Type::record(
            RecordType::new("Order")
                .with_field("Qty", Type::Int)
                .with_field("Sku", Type::String),
        )
    }

    fn product_type() -> Type {
        Type::record(
            RecordType::new("Product")
                .with_field("Name", Type::String)
                .with_field("Price", Type::Float)
                .with_field("Stock", Type::Int)
                .with_field("Tags", Type::array(Type::String))
                .with_field("Orders", Type::list(order_type())),
        )
    }

    fn compile(source: &str, result: Option<&Type>, args: &[Value]) -> Result<Lambda, CompileError> {
        let options = CompileOptions::default();
        let ast = parser::parse(source).expect("parse");
        let params = [Param::new("x", product_type())];
        Compiler::new(&options, args).compile_lambda(&params, result, &ast)
    }

    #[test]
    fn test_predicate_with_placeholder() {
        let lambda = compile("Price > @0 && Name.StartsWith(\"A\")", Some(&Type::Bool), &[Value::Float(10.0)])
            .unwrap();
        assert_eq!(lambda.return_type, Type::Bool);
        assert_eq!(
            lambda.to_string(),
            "x => ((x.Price > 10.0) && x.Name.StartsWith(\"A\"))"
        );
    }

    #[test]
    fn test_parameter_and_implicit_keyword() {
        let by_name = compile("x.Stock", None, &[]).unwrap();
        let by_it = compile("it.Stock", None, &[]).unwrap();
        let bare = compile("Stock", None, &[]).unwrap();
        assert_eq!(by_name.body, by_it.body);
        assert_eq!(by_name.body, bare.body);
        assert_eq!(bare.return_type, Type::Int);
    }

    #[test]
    fn test_case_insensitive_members() {
        assert_eq!(compile("price", None, &[]).unwrap().return_type, Type::Float);

        let options = CompileOptions::default().with_case_insensitive_members(false);
        let ast = parser::parse("price").unwrap();
        let params = [Param::new("x", product_type())];
        let err = Compiler::new(&options, &[])
            .compile_lambda(&params, None, &ast)
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownIdentifier);
    }

    #[test]
    fn test_unknown_member() {
        let err = compile("x.Prize", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownMember);
        assert_eq!(err.span, Span::new(2, 7));
    }

    #[test]
    fn test_missing_argument() {
        let err = compile("Price > @1", None, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MissingArgument);
        assert!(err.message.contains("@1"));
    }

    #[test]
    fn test_arithmetic_typing() {
        assert_eq!(compile("Stock * 2", None, &[]).unwrap().return_type, Type::Int);
        assert_eq!(compile("Stock * Price", None, &[]).unwrap().return_type, Type::Float);
        assert_eq!(compile("Name + Stock", None, &[]).unwrap().return_type, Type::String);

        let err = compile("Name * 2", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
    }

    #[test]
    fn test_declared_result_type() {
        // int widens to float through a conversion
        let lambda = compile("Stock", Some(&Type::Float), &[]).unwrap();
        assert_eq!(lambda.return_type, Type::Float);
        assert!(matches!(*lambda.body, Expr::Convert { .. }));

        let err = compile("Name", Some(&Type::Bool), &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
    }

    #[test]
    fn test_projection() {
        let lambda = compile("new(Name, Price * 2 as Double)", None, &[]).unwrap();
        let record = lambda.return_type.as_record().expect("record").clone();
        assert_eq!(record.name, None);
        assert_eq!(record.fields[0].name, "Name");
        assert_eq!(record.fields[1].name, "Double");
        assert_eq!(record.fields[1].ty, Type::Float);

        let err = compile("new(Price * 2)", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MissingFieldName);

        let err = compile("new(Name, Stock as Name)", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::DuplicateField);
    }

    #[test]
    fn test_nested_sequence_methods() {
        let lambda = compile("Orders.Any(Qty > 1 && x.Stock > 0)", None, &[]).unwrap();
        assert_eq!(lambda.return_type, Type::Bool);

        let lambda = compile("Orders.Sum(Qty)", None, &[]).unwrap();
        assert_eq!(lambda.return_type, Type::Int);

        let lambda = compile("Orders.Select(Sku)", None, &[]).unwrap();
        assert_eq!(lambda.return_type, Type::sequence(Type::String));

        let lambda = compile("Tags.Contains(\"new\") || Tags.Count() > 2", None, &[]).unwrap();
        assert_eq!(lambda.return_type, Type::Bool);

        let err = compile("Orders.Where(Qty)", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);

        let err = compile("Orders.All()", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::InvalidArity);
    }

    #[test]
    fn test_grouping_members() {
        let options = CompileOptions::default();
        let params = [Param::new("g", Type::grouping(Type::String, product_type()))];
        let ast = parser::parse("new(Key, Count() as Total, Sum(Price) as Revenue)").unwrap();
        let lambda = Compiler::new(&options, &[])
            .compile_lambda(&params, None, &ast)
            .unwrap();
        let record = lambda.return_type.as_record().expect("record").clone();
        assert_eq!(record.fields[0].ty, Type::String);
        assert_eq!(record.fields[1].ty, Type::Int);
        assert_eq!(record.fields[2].ty, Type::Float);
    }

    #[test]
    fn test_dynamic_members() {
        let options = CompileOptions::default();
        let params = [Param::new("x", Type::Any)];
        let ast = parser::parse("a.b == 1").unwrap();
        let lambda = Compiler::new(&options, &[])
            .compile_lambda(&params, Some(&Type::Bool), &ast)
            .unwrap();
        assert_eq!(lambda.return_type, Type::Bool);
    }

    #[test]
    fn test_conditional_unification() {
        assert_eq!(compile("iif(Stock > 0, Price, 0)", None, &[]).unwrap().return_type, Type::Float);
        assert_eq!(compile("Stock > 0 ? Name : null", None, &[]).unwrap().return_type, Type::String);
        let err = compile("iif(Stock, 1, 2)", None, &[]).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
    }

    #[test]
    fn test_ordering() {
        let options = CompileOptions::default();
        let params = [Param::new("x", product_type())];
        let terms = parser::parse_ordering("Name, Price desc").unwrap();
        let keys = Compiler::new(&options, &[])
            .compile_ordering(&params, &terms)
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].0.return_type, Type::Float);
        assert_eq!(keys[1].1, SortDirection::Descending);

        let terms = parser::parse_ordering("Orders").unwrap();
        let err = Compiler::new(&options, &[])
            .compile_ordering(&params, &terms)
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::TypeMismatch);
    }
}
