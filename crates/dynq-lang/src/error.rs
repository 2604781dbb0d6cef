//! Parse and bind errors.
//!
//! Both kinds carry the [`Span`] of the offending text so callers can report
//! a byte offset or render the expression with a marker under the problem.

use std::fmt::Display;

use crate::span::Span;
use thiserror::Error;

/// Syntax error in an expression.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    /// Suggested fix, shown under the marker.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render against the expression text it came from.
    pub fn format_with_source(&self, text: &str) -> String {
        render("syntax error", &self.message, text, self.span, self.hint.as_deref())
    }
}

/// What went wrong while binding names and types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// Not a parameter and not a member of the implicit scope.
    UnknownIdentifier,
    UnknownMember,
    UnknownMethod,
    TypeMismatch,
    /// `@N` with fewer than `N + 1` arguments.
    MissingArgument,
    InvalidArity,
    /// A `new(...)` field that is not a member access and has no `as` name.
    MissingFieldName,
    DuplicateField,
}

/// Error while binding a parsed expression to parameter types.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span, kind: CompileErrorKind) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }

    pub fn unknown_identifier(name: &str, span: Span) -> Self {
        Self::new(
            format!("unknown identifier '{}'", name),
            span,
            CompileErrorKind::UnknownIdentifier,
        )
    }

    pub fn unknown_member(member: &str, ty: impl Display, span: Span) -> Self {
        Self::new(
            format!("no member '{}' on type '{}'", member, ty),
            span,
            CompileErrorKind::UnknownMember,
        )
    }

    pub fn unknown_method(method: &str, ty: impl Display, span: Span) -> Self {
        Self::new(
            format!("no method '{}' on type '{}'", method, ty),
            span,
            CompileErrorKind::UnknownMethod,
        )
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(message, span, CompileErrorKind::TypeMismatch)
    }

    pub fn missing_argument(index: usize, supplied: usize, span: Span) -> Self {
        Self::new(
            format!(
                "no value for placeholder @{} ({} argument(s) supplied)",
                index, supplied
            ),
            span,
            CompileErrorKind::MissingArgument,
        )
    }

    /// Render against the expression text it came from.
    pub fn format_with_source(&self, text: &str) -> String {
        let heading = format!("{:?}", self.kind);
        render(&heading, &self.message, text, self.span, None)
    }
}

/// Either error, as returned by the entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LangError {
    #[error("parse error at offset {offset}: {0}", offset = .0.span.start)]
    Parse(#[from] ParseError),
    #[error("compile error at offset {offset}: {0}", offset = .0.span.start)]
    Compile(#[from] CompileError),
}

impl LangError {
    pub fn format_with_source(&self, text: &str) -> String {
        match self {
            LangError::Parse(e) => e.format_with_source(text),
            LangError::Compile(e) => e.format_with_source(text),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            LangError::Parse(e) => e.span,
            LangError::Compile(e) => e.span,
        }
    }

    /// Byte offset of the offending token.
    pub fn offset(&self) -> usize {
        self.span().start
    }

    /// The message without the offset prefix.
    pub fn message(&self) -> &str {
        match self {
            LangError::Parse(e) => &e.message,
            LangError::Compile(e) => &e.message,
        }
    }
}

/// ```text
/// syntax error at offset 7: unexpected Gt
///   | Price >> 10
///   |        ^
///   = hint: use a single '>'
/// ```
fn render(heading: &str, message: &str, text: &str, span: Span, hint: Option<&str>) -> String {
    let mut out = format!("{} at offset {}: {}\n", heading, span.start, message);

    let line_start = text.get(..span.start).and_then(|t| t.rfind('\n')).map_or(0, |i| i + 1);
    let line = text[line_start..].lines().next().unwrap_or("");
    let column = span.column(text);
    // Underline only the part of the span on this line
    let width = span
        .slice(text)
        .lines()
        .next()
        .map_or(1, |s| s.chars().count().max(1));

    out.push_str(&format!("  | {}\n", line));
    out.push_str(&format!("  | {}^{}\n", " ".repeat(column), "~".repeat(width - 1)));
    if let Some(hint) = hint {
        out.push_str(&format!("  = hint: {}\n", hint));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_with_hint() {
        let err = ParseError::new("unexpected Gt", Span::new(7, 8)).with_hint("use a single '>'");
        assert_eq!(
            err.format_with_source("Price >> 10"),
            "syntax error at offset 7: unexpected Gt\n  | Price >> 10\n  |        ^\n  = hint: use a single '>'\n"
        );
    }

    #[test]
    fn test_render_underlines_span() {
        let err = CompileError::unknown_identifier("Cost", Span::new(8, 12));
        let rendered = err.format_with_source("Price > Cost");
        assert!(rendered.starts_with("UnknownIdentifier at offset 8"));
        assert!(rendered.contains("  |         ^~~~\n"));
    }

    #[test]
    fn test_render_at_end_of_input() {
        let err = ParseError::new("unexpected end of expression", Span::at(7));
        assert!(err.format_with_source("Price >").contains("  |        ^\n"));
    }

    #[test]
    fn test_parse_error_display_has_offset() {
        let err: LangError = ParseError::new("unexpected Gt", Span::new(7, 8)).into();
        assert_eq!(err.to_string(), "parse error at offset 7: unexpected Gt");
    }

    #[test]
    fn test_lang_error_offset() {
        let err: LangError = CompileError::unknown_member("Prize", "Product", Span::new(0, 5)).into();
        assert_eq!(err.offset(), 0);
        assert_eq!(err.message(), "no member 'Prize' on type 'Product'");
        assert_eq!(
            err.to_string(),
            "compile error at offset 0: no member 'Prize' on type 'Product'"
        );
    }
}
