//! dynq - Compose queries from text expressions at run time.
//!
//! dynq builds filter, projection, grouping, ordering, join and paging
//! operators from strings such as `"Price > @0 && Stock > 0"` and applies
//! them to deferred sequence handles. Handles belong to a query provider;
//! [`MemoryProvider`] runs queries over in-memory rows.
//!
//! The [`QueryExt`] trait exposes the common operators as methods on a
//! [`Query`] using the default [`Composer`].
//!
//! ```ignore
//! use dynq::prelude::*;
//!
//! let provider = MemoryProvider::new();
//! let people = provider.register_json("people", Type::Any, json)?;
//!
//! let adults = people.filter("age >= @0", &[18.into()])?.order_by("name", &[])?;
//! for row in adults.to_vec()? {
//!     println!("{row}");
//! }
//! ```

use std::sync::LazyLock;

pub use dynq_core::{
    group_by_many, try_group_by_many, BindError, Binding, CompiledLambda, Composer,
    ComposerConfig, Error, EvalError, FromValue, GroupByMany, GroupResult, KeyFn,
    MemoryProvider, OperatorCatalog, OperatorDescriptor, PageWindow, PagedResult,
    ProviderError, Query, QueryProvider, Resolver, Result, ReturnShape,
};
pub use dynq_lang::{CompileOptions, LangError, SortDirection};
pub use dynq_types::{Expr, Grouping, Lambda, Param, QueryOp, Record, RecordType, Type, Value};

/// Re-export the core crate.
pub use dynq_core as core;

/// Re-export the expression language.
pub use dynq_lang as lang;

/// Re-export the shared model.
pub use dynq_types as types;

static DEFAULT_COMPOSER: LazyLock<Composer> = LazyLock::new(Composer::default);

/// Common operators as methods on a [`Query`], using the default composer.
pub trait QueryExt {
    /// See [`Composer::filter`].
    fn filter(&self, predicate: &str, args: &[Value]) -> Result<Query>;
    /// See [`Composer::select`].
    fn select(&self, selector: &str, args: &[Value]) -> Result<Query>;
    /// See [`Composer::order_by`].
    fn order_by(&self, ordering: &str, args: &[Value]) -> Result<Query>;
    /// See [`Composer::group_by`].
    fn group_by(&self, key: &str, args: &[Value]) -> Result<Query>;
    /// See [`Composer::page`].
    fn page(&self, page: i64, page_size: i64) -> Result<Query>;
    /// See [`Composer::count`].
    fn count(&self) -> Result<usize>;
}

impl QueryExt for Query {
    fn filter(&self, predicate: &str, args: &[Value]) -> Result<Query> {
        DEFAULT_COMPOSER.filter(self, predicate, args)
    }

    fn select(&self, selector: &str, args: &[Value]) -> Result<Query> {
        DEFAULT_COMPOSER.select(self, selector, args)
    }

    fn order_by(&self, ordering: &str, args: &[Value]) -> Result<Query> {
        DEFAULT_COMPOSER.order_by(self, ordering, args)
    }

    fn group_by(&self, key: &str, args: &[Value]) -> Result<Query> {
        DEFAULT_COMPOSER.group_by(self, key, args)
    }

    fn page(&self, page: i64, page_size: i64) -> Result<Query> {
        DEFAULT_COMPOSER.page(self, page, page_size)
    }

    fn count(&self) -> Result<usize> {
        DEFAULT_COMPOSER.count(self)
    }
}

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        Composer, ComposerConfig, Error, MemoryProvider, Query, QueryExt, RecordType, Result,
        Type, Value,
    };
}
