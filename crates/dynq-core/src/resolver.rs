//! Typed fragment resolution.
//!
//! Turns expression text into lambdas over caller-declared parameters using
//! the dynq-lang parser.

use tracing::trace;

use dynq_lang::{CompileOptions, SortDirection};
use dynq_types::{Lambda, Param, Type, Value};

use crate::error::Result;

/// Resolves expression text into typed lambdas.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    options: CompileOptions,
}

impl Resolver {
    /// Create a resolver with the given parser options.
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Parser options in use.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Resolve `text` as a lambda over `params`.
    ///
    /// With a declared result type the body must be assignable to it, and
    /// the lambda reports that type.
    pub fn resolve(
        &self,
        params: &[Param],
        result_type: Option<&Type>,
        text: &str,
        args: &[Value],
    ) -> Result<Lambda> {
        let lambda = dynq_lang::parse_lambda(params, result_type, text, args, &self.options)?;
        trace!(
            text,
            params = params.len(),
            result_type = %lambda.return_type,
            "resolved fragment"
        );
        Ok(lambda)
    }

    /// Resolve a single-parameter lambda named `name` over `element`.
    pub fn resolve_unary(
        &self,
        name: &str,
        element: &Type,
        result_type: Option<&Type>,
        text: &str,
        args: &[Value],
    ) -> Result<Lambda> {
        self.resolve(&[Param::new(name, element.clone())], result_type, text, args)
    }

    /// Resolve a comma-separated ordering list into one key selector per term.
    pub fn resolve_ordering(
        &self,
        params: &[Param],
        text: &str,
        args: &[Value],
    ) -> Result<Vec<(Lambda, SortDirection)>> {
        let keys = dynq_lang::parse_ordering(params, text, args, &self.options)?;
        trace!(text, terms = keys.len(), "resolved ordering");
        Ok(keys)
    }
}
