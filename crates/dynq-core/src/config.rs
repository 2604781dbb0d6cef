//! Composer configuration.

use dynq_lang::CompileOptions;

/// Default name of the parameter bound to the source element.
pub const DEFAULT_OUTER_PARAMETER: &str = "x";

/// Default name of the second parameter in two-parameter selectors.
pub const DEFAULT_INNER_PARAMETER: &str = "y";

/// Default keyword for the implicit scope.
pub const DEFAULT_IMPLICIT_KEYWORD: &str = dynq_lang::DEFAULT_IMPLICIT_KEYWORD;

/// Dynamic query composer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Parameter name for the source element (`x`).
    pub outer_parameter: String,

    /// Parameter name for the inner element of joins and flatten result
    /// selectors (`y`).
    pub inner_parameter: String,

    /// Keyword referring to the implicit scope inside expressions.
    pub implicit_keyword: String,

    /// Allow member names to match ignoring ASCII case.
    pub case_insensitive_members: bool,

    /// Largest page size accepted by paging operations. None means no limit.
    pub max_page_size: Option<usize>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            outer_parameter: DEFAULT_OUTER_PARAMETER.to_string(),
            inner_parameter: DEFAULT_INNER_PARAMETER.to_string(),
            implicit_keyword: DEFAULT_IMPLICIT_KEYWORD.to_string(),
            case_insensitive_members: true,
            max_page_size: None,
        }
    }

    /// Set the source element parameter name.
    pub fn with_outer_parameter(mut self, name: impl Into<String>) -> Self {
        self.outer_parameter = name.into();
        self
    }

    /// Set the inner element parameter name.
    pub fn with_inner_parameter(mut self, name: impl Into<String>) -> Self {
        self.inner_parameter = name.into();
        self
    }

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

    /// Limit the page size accepted by paging operations.
    ///
    /// A limit of 0 rejects every page.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Remove the page size limit.
    pub fn without_max_page_size(mut self) -> Self {
        self.max_page_size = None;
        self
    }

    /// Parser options derived from this configuration.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
            .with_implicit_keyword(self.implicit_keyword.clone())
            .with_case_insensitive_members(self.case_insensitive_members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ComposerConfig::default();
        assert_eq!(config.outer_parameter, "x");
        assert_eq!(config.inner_parameter, "y");
        assert_eq!(config.implicit_keyword, "it");
        assert!(config.case_insensitive_members);
        assert_eq!(config.max_page_size, None);
    }

    #[test]
    fn test_builder() {
        let config = ComposerConfig::new()
            .with_outer_parameter("o")
            .with_inner_parameter("i")
            .with_implicit_keyword("self")
            .with_case_insensitive_members(false)
            .with_max_page_size(0);

        assert_eq!(config.outer_parameter, "o");
        assert_eq!(config.max_page_size, Some(0));

        let options = config.compile_options();
        assert_eq!(options.implicit_keyword, "self");
        assert!(!options.case_insensitive_members);

        assert_eq!(config.without_max_page_size().max_page_size, None);
    }
}
