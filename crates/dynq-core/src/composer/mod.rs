//! Dynamic query composition.
//!
//! A [`Composer`] turns expression text into query operators applied to a
//! [`Query`] handle. Sequence operators return a new handle and leave the
//! source untouched; terminal operators (see `terminal.rs`) execute through
//! the handle's provider.

mod terminal;

use std::sync::Arc;

use tracing::debug;

use dynq_lang::SortDirection;
use dynq_types::{Expr, ExprRef, Lambda, Param, QueryCall, QueryOp, Type, Value};

use crate::catalog::{Binding, OperatorCatalog};
use crate::config::ComposerConfig;
use crate::error::{Error, Result};
use crate::group::{try_group_by_many, GroupByMany, KeyFn};
use crate::inference::flatten_element_type;
use crate::paging::{page_count, PageWindow, PagedResult};
use crate::provider::{CompiledLambda, EvalError, Query};
use crate::resolver::Resolver;

/// Builds query operators from expression text.
#[derive(Debug, Clone)]
pub struct Composer {
    config: ComposerConfig,
    resolver: Resolver,
    catalog: &'static OperatorCatalog,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}

impl Composer {
    /// Create a composer over the standard operator catalog.
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            resolver: Resolver::new(config.compile_options()),
            catalog: OperatorCatalog::global(),
            config,
        }
    }

    /// Use a different operator catalog.
    pub fn with_catalog(mut self, catalog: &'static OperatorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Get the fragment resolver.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    // Filtering and projection

    /// Keep elements matching a boolean predicate.
    pub fn filter(&self, source: &Query, predicate: &str, args: &[Value]) -> Result<Query> {
        let predicate = self.predicate(source, predicate, args)?;
        let binding = self.bind(QueryOp::Where, 2, vec![source.element_type().clone()])?;
        self.compose(source, binding, vec![lambda_expr(predicate)])
    }

    /// Project each element; the new element type is the selector's type.
    pub fn select(&self, source: &Query, selector: &str, args: &[Value]) -> Result<Query> {
        let selector = self.unary(source, None, "selector", selector, args)?;
        self.compose_select(source, selector)
    }

    /// Project each element to a declared result type.
    pub fn select_as(
        &self,
        source: &Query,
        selector: &str,
        result_type: &Type,
        args: &[Value],
    ) -> Result<Query> {
        let selector = self.unary(source, Some(result_type), "selector", selector, args)?;
        self.compose_select(source, selector)
    }

    fn compose_select(&self, source: &Query, selector: Lambda) -> Result<Query> {
        let type_args = vec![source.element_type().clone(), selector.return_type.clone()];
        let binding = self.bind(QueryOp::Select, 2, type_args)?;
        self.compose(source, binding, vec![lambda_expr(selector)])
    }

    /// Project each element to a collection and flatten the collections.
    ///
    /// The new element type is inferred from the selector's result type.
    pub fn select_many(&self, source: &Query, selector: &str, args: &[Value]) -> Result<Query> {
        let selector = self.unary(source, None, "selector", selector, args)?;
        let (selector, element) = as_flattening(selector)?;
        self.compose_select_many(source, selector, element)
    }

    /// Flatten with a declared element type.
    pub fn select_many_as(
        &self,
        source: &Query,
        selector: &str,
        element_type: &Type,
        args: &[Value],
    ) -> Result<Query> {
        let declared = Type::sequence(element_type.clone());
        let selector = self.unary(source, Some(&declared), "selector", selector, args)?;
        self.compose_select_many(source, selector, element_type.clone())
    }

    fn compose_select_many(&self, source: &Query, selector: Lambda, element: Type) -> Result<Query> {
        let binding = self.bind(
            QueryOp::SelectMany,
            2,
            vec![source.element_type().clone(), element],
        )?;
        self.compose(source, binding, vec![lambda_expr(selector)])
    }

    /// Flatten, then combine each outer element with each inner element.
    ///
    /// The result selector sees the outer element as `x` and the inner
    /// element as `y`, or the names set in the configuration.
    pub fn select_many_with_result(
        &self,
        source: &Query,
        collection: &str,
        result: &str,
        collection_args: &[Value],
        result_args: &[Value],
    ) -> Result<Query> {
        let names = (
            self.config.outer_parameter.as_str(),
            self.config.inner_parameter.as_str(),
        );
        self.select_many_with_result_named(source, collection, result, names, collection_args, result_args)
    }

    /// Like [`Composer::select_many_with_result`] with explicit parameter
    /// names `(outer, inner)`.
    pub fn select_many_with_result_named(
        &self,
        source: &Query,
        collection: &str,
        result: &str,
        (outer, inner): (&str, &str),
        collection_args: &[Value],
        result_args: &[Value],
    ) -> Result<Query> {
        require_text("collection selector", collection)?;
        require_text("result selector", result)?;
        if outer.trim().is_empty() || inner.trim().is_empty() {
            return Err(Error::validation("parameter names must not be empty"));
        }
        if outer == inner {
            return Err(Error::validation(format!(
                "outer and inner parameters are both named '{}'",
                outer
            )));
        }

        let element = source.element_type().clone();
        let collection = self.resolver.resolve(
            &[Param::new(outer, element.clone())],
            None,
            collection,
            collection_args,
        )?;
        let (collection, inner_type) = as_flattening(collection)?;

        let result = self.resolver.resolve(
            &[Param::new(outer, element.clone()), Param::new(inner, inner_type.clone())],
            None,
            result,
            result_args,
        )?;

        let type_args = vec![element, inner_type, result.return_type.clone()];
        let binding = self.bind(QueryOp::SelectMany, 3, type_args)?;
        self.compose(source, binding, vec![lambda_expr(collection), lambda_expr(result)])
    }

    // Grouping

    /// Group elements by key.
    pub fn group_by(&self, source: &Query, key: &str, args: &[Value]) -> Result<Query> {
        let key = self.unary(source, None, "key selector", key, args)?;
        let type_args = vec![source.element_type().clone(), key.return_type.clone()];
        let binding = self.bind(QueryOp::GroupBy, 2, type_args)?;
        self.compose(source, binding, vec![lambda_expr(key)])
    }

    /// Group elements by key, projecting each element into the group.
    pub fn group_by_with_result(
        &self,
        source: &Query,
        key: &str,
        element: &str,
        args: &[Value],
    ) -> Result<Query> {
        let key = self.unary(source, None, "key selector", key, args)?;
        let element = self.unary(source, None, "element selector", element, args)?;
        let type_args = vec![
            source.element_type().clone(),
            key.return_type.clone(),
            element.return_type.clone(),
        ];
        let binding = self.bind(QueryOp::GroupBy, 3, type_args)?;
        self.compose(source, binding, vec![lambda_expr(key), lambda_expr(element)])
    }

    /// Group the rows of `source` into a tree, one level per key text.
    ///
    /// Enumerates the source once. Groups are built lazily while iterating;
    /// a key that fails to evaluate is yielded as an `Err` item. Keys are
    /// yielded in canonical form, so `1` and `1.0` share the group keyed `1`.
    pub fn group_by_many(
        &self,
        source: &Query,
        keys: &[&str],
        args: &[Value],
    ) -> Result<GroupByMany<Value, Value, EvalError>> {
        let selectors = keys
            .iter()
            .map(|text| -> Result<KeyFn<Value, Value, EvalError>> {
                let key = CompiledLambda::new(self.unary(source, None, "key selector", text, args)?);
                Ok(Arc::new(move |row: &Value| key.call1(row).map(|k| k.canonical_key())))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = source.to_vec()?;
        debug!(
            levels = selectors.len(),
            rows = rows.len(),
            element_type = %source.element_type(),
            "grouping by many keys"
        );
        Ok(try_group_by_many(rows, selectors))
    }

    // Ordering

    /// Sort by a comma-separated ordering list such as `"Category, Price desc"`.
    ///
    /// The first term is the primary key; later terms break ties in order.
    pub fn order_by(&self, source: &Query, ordering: &str, args: &[Value]) -> Result<Query> {
        self.compose_ordering(source, ordering, args, false)
    }

    /// Add tie-breaking keys to an ordered sequence.
    pub fn then_by(&self, ordered: &Query, ordering: &str, args: &[Value]) -> Result<Query> {
        if !ordered.sequence_type().is_ordered() {
            return Err(Error::validation(format!(
                "then_by requires an ordered sequence, found '{}'",
                ordered.sequence_type()
            )));
        }
        self.compose_ordering(ordered, ordering, args, true)
    }

    fn compose_ordering(
        &self,
        source: &Query,
        ordering: &str,
        args: &[Value],
        chained: bool,
    ) -> Result<Query> {
        require_text("ordering", ordering)?;
        let element = source.element_type().clone();
        let keys = self
            .resolver
            .resolve_ordering(&[self.outer(&element)], ordering, args)?;

        let mut current = source.clone();
        for (i, (key, direction)) in keys.into_iter().enumerate() {
            let op = match (chained || i > 0, direction) {
                (false, SortDirection::Ascending) => QueryOp::OrderBy,
                (false, SortDirection::Descending) => QueryOp::OrderByDescending,
                (true, SortDirection::Ascending) => QueryOp::ThenBy,
                (true, SortDirection::Descending) => QueryOp::ThenByDescending,
            };
            let binding = self.bind(op, 2, vec![element.clone(), key.return_type.clone()])?;
            current = self.compose(&current, binding, vec![lambda_expr(key)])?;
        }
        Ok(current)
    }

    // Joining

    /// Inner equality join of `outer` with `inner`.
    ///
    /// The outer key sees `x`, the inner key sees `y`, and the result
    /// selector sees both. Integer and float keys are compared as floats.
    pub fn join(
        &self,
        outer: &Query,
        inner: &Query,
        outer_key: &str,
        inner_key: &str,
        result: &str,
        args: &[Value],
    ) -> Result<Query> {
        require_text("outer key selector", outer_key)?;
        require_text("inner key selector", inner_key)?;
        require_text("result selector", result)?;
        if !outer.same_provider(inner) {
            return Err(Error::validation(
                "join sequences must belong to the same provider",
            ));
        }

        let outer_type = outer.element_type().clone();
        let inner_type = inner.element_type().clone();
        let outer_param = self.outer(&outer_type);
        let inner_param = Param::new(&self.config.inner_parameter, inner_type.clone());

        let outer_key = self
            .resolver
            .resolve(std::slice::from_ref(&outer_param), None, outer_key, args)?;
        let inner_key = self
            .resolver
            .resolve(std::slice::from_ref(&inner_param), None, inner_key, args)?;
        let (outer_key, inner_key, key_type) = unify_keys(outer_key, inner_key)?;

        let result = self
            .resolver
            .resolve(&[outer_param, inner_param], None, result, args)?;

        let type_args = vec![outer_type, inner_type, key_type, result.return_type.clone()];
        let binding = self.bind(QueryOp::Join, 5, type_args)?;
        self.compose_with(
            outer,
            binding,
            vec![
                inner.expression().clone(),
                Arc::new(lambda_expr(outer_key)),
                Arc::new(lambda_expr(inner_key)),
                Arc::new(lambda_expr(result)),
            ],
        )
    }

    // Partitioning

    /// Skip `count` elements. Skipping zero returns `source` itself.
    pub fn skip(&self, source: &Query, count: i64) -> Result<Query> {
        if count < 0 {
            return Err(Error::validation(format!(
                "skip count must not be negative, got {}",
                count
            )));
        }
        if count == 0 {
            return Ok(source.clone());
        }
        let binding = self.bind(QueryOp::Skip, 2, vec![source.element_type().clone()])?;
        self.compose(source, binding, vec![count_expr(count)])
    }

    /// Keep the first `count` elements.
    pub fn take(&self, source: &Query, count: i64) -> Result<Query> {
        if count <= 0 {
            return Err(Error::validation(format!(
                "take count must be at least 1, got {}",
                count
            )));
        }
        let binding = self.bind(QueryOp::Take, 2, vec![source.element_type().clone()])?;
        self.compose(source, binding, vec![count_expr(count)])
    }

    /// Elements of 1-based `page` with `page_size` elements per page.
    pub fn page(&self, source: &Query, page: i64, page_size: i64) -> Result<Query> {
        let window = PageWindow::new(page, page_size, self.config.max_page_size)?;
        self.compose_window(source, window)
    }

    /// A page plus the row and page counts of the whole source.
    ///
    /// Counts the source before composing the page.
    pub fn page_result(&self, source: &Query, page: i64, page_size: i64) -> Result<PagedResult> {
        let window = PageWindow::new(page, page_size, self.config.max_page_size)?;
        let row_count = self.count(source)?;
        let query = self.compose_window(source, window)?;
        Ok(PagedResult {
            current_page: window.skip / window.take + 1,
            page_size: window.take,
            page_count: page_count(row_count, window.take),
            row_count,
            query,
        })
    }

    fn compose_window(&self, source: &Query, window: PageWindow) -> Result<Query> {
        let too_large = || Error::validation("page window is too large");
        let skip = i64::try_from(window.skip).map_err(|_| too_large())?;
        let take = i64::try_from(window.take).map_err(|_| too_large())?;
        let skipped = self.skip(source, skip)?;
        self.take(&skipped, take)
    }

    // Set operators

    /// Remove duplicate elements, keeping first occurrences.
    pub fn distinct(&self, source: &Query) -> Result<Query> {
        let binding = self.bind(QueryOp::Distinct, 1, vec![source.element_type().clone()])?;
        self.compose(source, binding, vec![])
    }

    /// Reverse the element order.
    pub fn reverse(&self, source: &Query) -> Result<Query> {
        let binding = self.bind(QueryOp::Reverse, 1, vec![source.element_type().clone()])?;
        self.compose(source, binding, vec![])
    }

    // Shared plumbing

    fn outer(&self, element: &Type) -> Param {
        Param::new(&self.config.outer_parameter, element.clone())
    }

    /// Resolve a single-parameter lambda over the source element.
    fn unary(
        &self,
        source: &Query,
        result_type: Option<&Type>,
        what: &str,
        text: &str,
        args: &[Value],
    ) -> Result<Lambda> {
        require_text(what, text)?;
        self.resolver.resolve_unary(
            &self.config.outer_parameter,
            source.element_type(),
            result_type,
            text,
            args,
        )
    }

    fn predicate(&self, source: &Query, text: &str, args: &[Value]) -> Result<Lambda> {
        self.unary(source, Some(&Type::Bool), "predicate", text, args)
    }

    fn bind(&self, op: QueryOp, arity: usize, type_args: Vec<Type>) -> Result<Binding<'static>> {
        Ok(self.catalog.bind(op.name(), arity, type_args)?)
    }

    /// Apply a bound operator to `source` and `args`.
    fn call(&self, source: &Query, binding: Binding<'_>, args: Vec<ExprRef>) -> Expr {
        let ty = binding.result_type();
        debug!(
            operator = %binding.operator,
            element_type = %source.element_type(),
            result_type = %ty,
            "composed operator"
        );
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(source.expression().clone());
        all.extend(args);
        Expr::Query(QueryCall {
            operator: binding.operator,
            args: all,
            ty,
        })
    }

    fn compose(&self, source: &Query, binding: Binding<'_>, lambdas: Vec<Expr>) -> Result<Query> {
        self.compose_with(source, binding, lambdas.into_iter().map(Arc::new).collect())
    }

    fn compose_with(&self, source: &Query, binding: Binding<'_>, args: Vec<ExprRef>) -> Result<Query> {
        let expr = self.call(source, binding, args);
        source.create_query(expr)
    }
}

/// Reject empty or whitespace-only expression text.
fn require_text<'t>(what: &str, text: &'t str) -> Result<&'t str> {
    if text.trim().is_empty() {
        return Err(Error::validation(format!("{} expression is empty", what)));
    }
    Ok(text)
}

fn lambda_expr(lambda: Lambda) -> Expr {
    Expr::Lambda(Arc::new(lambda))
}

fn count_expr(count: i64) -> Expr {
    Expr::constant(Value::Int(count))
}

/// Re-declare a collection selector as returning `Sequence<E>` and return `E`.
fn as_flattening(selector: Lambda) -> Result<(Lambda, Type)> {
    let element = flatten_element_type(&selector.return_type)?;
    let selector = selector.with_return_type(Type::sequence(element.clone()));
    Ok((selector, element))
}

/// Bring join keys to a common type.
fn unify_keys(outer: Lambda, inner: Lambda) -> Result<(Lambda, Lambda, Type)> {
    let (o, i) = (outer.return_type.clone(), inner.return_type.clone());
    if o == i {
        return Ok((outer, inner, o));
    }
    if o.is_numeric() && i.is_numeric() {
        return Ok((to_float(outer), to_float(inner), Type::Float));
    }
    if matches!(o, Type::Any) || matches!(i, Type::Any) {
        return Ok((outer, inner, Type::Any));
    }
    Err(Error::validation(format!(
        "join keys have incompatible types '{}' and '{}'",
        o, i
    )))
}

fn to_float(key: Lambda) -> Lambda {
    if key.return_type == Type::Float {
        return key;
    }
    let body = Expr::Convert {
        operand: key.body.clone(),
        ty: Type::Float,
    };
    Lambda::new(key.params, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use dynq_types::{Record, RecordType};
    use pretty_assertions::assert_eq;

    fn item_type() -> Type {
        Type::record(
            RecordType::new("Item")
                .with_field("Id", Type::Int)
                .with_field("Name", Type::String)
                .with_field("Tags", Type::array(Type::String)),
        )
    }

    fn item(id: i64, name: &str, tags: &[&str]) -> Value {
        Value::Record(Record::from_fields(
            Some("Item"),
            [
                ("Id", Value::Int(id)),
                ("Name", Value::from(name)),
                ("Tags", Value::from(tags.to_vec())),
            ],
        ))
    }

    fn items() -> Query {
        MemoryProvider::new().register(
            "items",
            item_type(),
            vec![item(1, "b", &["red"]), item(2, "a", &["red", "blue"]), item(3, "c", &[])],
        )
    }

    #[test]
    fn test_filter_shape() {
        let composer = Composer::default();
        let source = items();
        let filtered = composer.filter(&source, "Id > 1", &[]).unwrap();

        let call = filtered.expression().as_query().unwrap();
        assert_eq!(call.operator.op, QueryOp::Where);
        assert_eq!(call.operator.type_args, vec![item_type()]);
        assert!(Arc::ptr_eq(&call.args[0], source.expression()));
        assert_eq!(filtered.element_type(), &item_type());
    }

    #[test]
    fn test_filter_requires_boolean() {
        let composer = Composer::default();
        assert!(matches!(
            composer.filter(&items(), "Name", &[]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_select_types() {
        let composer = Composer::default();
        let names = composer.select(&items(), "Name", &[]).unwrap();
        assert_eq!(names.element_type(), &Type::String);

        let ids = composer.select_as(&items(), "Id", &Type::Float, &[]).unwrap();
        assert_eq!(ids.element_type(), &Type::Float);
        assert_eq!(ids.to_vec().unwrap()[0], Value::Float(1.0));
    }

    #[test]
    fn test_select_many_coerces_selector_to_sequence() {
        let composer = Composer::default();
        let tags = composer.select_many(&items(), "Tags", &[]).unwrap();
        assert_eq!(tags.element_type(), &Type::String);

        let call = tags.expression().as_query().unwrap();
        assert_eq!(
            call.lambda(1).unwrap().return_type,
            Type::sequence(Type::String)
        );
        assert_eq!(tags.to_vec().unwrap().len(), 3);
    }

    #[test]
    fn test_select_many_with_result_parameter_names() {
        let composer = Composer::default();
        let err = composer
            .select_many_with_result_named(&items(), "Tags", "x", ("a", "a"), &[], &[])
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_then_by_requires_ordering() {
        let composer = Composer::default();
        let err = composer.then_by(&items(), "Name", &[]).unwrap_err();
        assert!(err.is_validation());

        let ordered = composer.order_by(&items(), "Name", &[]).unwrap();
        let chained = composer.then_by(&ordered, "Id desc", &[]).unwrap();
        let call = chained.expression().as_query().unwrap();
        assert_eq!(call.operator.op, QueryOp::ThenByDescending);
    }

    #[test]
    fn test_ordering_chain_shape() {
        let composer = Composer::default();
        let ordered = composer.order_by(&items(), "Name desc, Id", &[]).unwrap();
        assert!(ordered.sequence_type().is_ordered());

        let outer = ordered.expression().as_query().unwrap();
        assert_eq!(outer.operator.op, QueryOp::ThenBy);
        let inner = outer.args[0].as_query().unwrap();
        assert_eq!(inner.operator.op, QueryOp::OrderByDescending);
    }

    #[test]
    fn test_skip_and_take_validation() {
        let composer = Composer::default();
        let source = items();
        assert!(composer.skip(&source, -1).unwrap_err().is_validation());
        assert!(composer.take(&source, 0).unwrap_err().is_validation());
        assert!(composer.skip(&source, 0).unwrap().same_handle(&source));
    }

    #[test]
    fn test_page_respects_max_page_size() {
        let composer = Composer::new(ComposerConfig::new().with_max_page_size(2));
        assert!(composer.page(&items(), 1, 3).unwrap_err().is_validation());
        assert!(composer.page(&items(), 1, 2).is_ok());

        let closed = Composer::new(ComposerConfig::new().with_max_page_size(0));
        let err = closed.page(&items(), 1, 1).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "page size 1 exceeds the maximum of 0");
    }

    #[test]
    fn test_join_key_unification() {
        let composer = Composer::default();
        let provider = MemoryProvider::new();
        let left = provider.register("left", Type::Int, vec![Value::Int(1), Value::Int(2)]);
        let right = provider.register("right", Type::Float, vec![Value::Float(2.0)]);

        let joined = composer
            .join(&left, &right, "x", "y", "new(x as L, y as R)", &[])
            .unwrap();
        let call = joined.expression().as_query().unwrap();
        assert_eq!(call.operator.type_args[2], Type::Float);
        assert_eq!(joined.to_vec().unwrap().len(), 1);

        let names = provider.register("names", Type::String, vec![]);
        let err = composer.join(&left, &names, "x", "y", "x", &[]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_join_requires_same_provider() {
        let composer = Composer::default();
        let other = MemoryProvider::new().register("items", item_type(), vec![]);
        let err = composer
            .join(&items(), &other, "Id", "Id", "x", &[])
            .unwrap_err();
        assert!(err.is_validation());
    }
}
