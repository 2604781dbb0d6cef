//! dynq Core - Dynamic query composition.
//!
//! This crate composes query operators from text expressions over deferred
//! sequence handles:
//!
//! - [`composer`] builds filter, projection, grouping, ordering, join,
//!   paging and terminal operators from expression text
//! - [`catalog`] is the process-wide operator table used to bind each
//!   operator to its type arguments
//! - [`resolver`] turns text into typed lambdas through `dynq-lang`
//! - [`group`] partitions a sequence into a tree of groups by several keys
//! - [`provider`] defines the sequence handle and an in-memory provider
//!
//! ```ignore
//! use dynq_core::{Composer, MemoryProvider};
//!
//! let provider = MemoryProvider::new();
//! let products = provider.register("products", product_type, rows);
//!
//! let composer = Composer::default();
//! let cheap = composer.filter(&products, "Price < @0", &[10.into()])?;
//! let sorted = composer.order_by(&cheap, "Category, Price desc", &[])?;
//! let page = composer.page_result(&sorted, 1, 20)?;
//! ```

pub mod catalog;
pub mod composer;
pub mod config;
pub mod error;
pub mod group;
pub mod inference;
pub mod paging;
pub mod provider;
pub mod resolver;

pub use catalog::{BindError, Binding, OperatorCatalog, OperatorDescriptor, ReturnShape};
pub use composer::Composer;
pub use config::ComposerConfig;
pub use error::{Error, Result};
pub use group::{group_by_many, try_group_by_many, GroupByMany, GroupResult, KeyFn};
pub use paging::{PageWindow, PagedResult};
pub use provider::{
    CompiledLambda, EvalError, FromValue, MemoryProvider, ProviderError, Query, QueryProvider,
};
pub use resolver::Resolver;

/// Re-export the shared model.
pub use dynq_types as types;

/// Re-export the expression language.
pub use dynq_lang as lang;
