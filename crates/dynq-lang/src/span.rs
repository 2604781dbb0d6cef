//! Byte ranges into expression text.

use std::ops::Range;

/// Half-open byte range `start..end` in the expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `offset`, used for errors at end of input.
    pub fn at(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    /// Smallest span containing both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The covered text, or `""` when the span does not fall on char
    /// boundaries of `text`.
    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.start..self.end).unwrap_or("")
    }

    /// Zero-based character column of `start` within its line of `text`.
    pub fn column(&self, text: &str) -> usize {
        let upto = text.get(..self.start).unwrap_or(text);
        let line_start = upto.rfind('\n').map_or(0, |i| i + 1);
        upto[line_start..].chars().count()
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A syntax node or token paired with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_to() {
        let joined = Span::new(5, 10).to(Span::new(8, 15));
        assert_eq!(joined, Span::new(5, 15));
        assert_eq!(joined.len(), 10);
        assert!(Span::at(3).is_empty());
    }

    #[test]
    fn test_slice_and_column() {
        let text = "Name == \"Zoë\" && Price > 10";
        let price = Span::new(18, 23);
        assert_eq!(price.slice(text), "Price");
        // 'ë' is two bytes
        assert_eq!(price.column(text), 17);
        assert_eq!(Span::new(100, 101).slice(text), "");
    }

    #[test]
    fn test_column_on_second_line() {
        let text = "Price > 10\n&& Name";
        assert_eq!(Span::at(14).column(text), 3);
    }
}
