//! Recursive descent parser for the expression language.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{SpannedToken, Token, TokenStream};
use crate::span::{Span, Spanned};
use dynq_types::{BinaryOp, UnaryOp};

/// Parser for dynq expressions.
pub struct Parser<'source> {
    tokens: TokenStream,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            tokens: TokenStream::new(source),
            source,
        }
    }

    /// Parse a complete expression.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.ensure_not_empty()?;
        let expr = self.parse_expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse a comma-separated ordering list such as `"A, B desc"`.
    pub fn parse_ordering(&mut self) -> Result<Vec<OrderingTerm>, ParseError> {
        self.ensure_not_empty()?;
        let mut terms = Vec::new();

        loop {
            let expr = self.parse_expr()?;
            let mut span = expr.span();
            let direction = match self.tokens.peek().map(|t| &t.token) {
                Some(Token::Asc) => {
                    span = span.to(self.next_token()?.span);
                    SortDirection::Ascending
                }
                Some(Token::Desc) => {
                    span = span.to(self.next_token()?.span);
                    SortDirection::Descending
                }
                _ => SortDirection::default(),
            };
            terms.push(OrderingTerm {
                expr,
                direction,
                span,
            });

            if !self.tokens.peek_is(&Token::Comma) {
                break;
            }
            self.next_token()?; // consume comma
        }

        self.expect_end()?;
        Ok(terms)
    }

    fn ensure_not_empty(&self) -> Result<(), ParseError> {
        if let (None, Some(span)) = (self.tokens.peek(), self.tokens.invalid()) {
            return Err(self.invalid_input(span));
        }
        if self.tokens.is_empty() {
            return Err(ParseError::new("expression is empty", Span::at(0)));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_conditional()
    }

    /// Parse `test ? a : b`.
    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_or()?;
        if !self.tokens.peek_is(&Token::Question) {
            return Ok(test);
        }
        self.next_token()?; // consume ?

        let if_true = self.parse_expr()?;
        self.expect_token(Token::Colon)?;
        let if_false = self.parse_expr()?;
        let span = test.span().to(if_false.span());

        Ok(Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            span,
        })
    }

    /// Parse OR chains.
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;

        while self.tokens.peek_is(&Token::Or) {
            self.next_token()?;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    /// Parse AND chains.
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;

        while self.tokens.peek_is(&Token::And) {
            self.next_token()?;
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    /// Parse a single, non-associative comparison.
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match self.tokens.peek().map(|t| &t.token) {
            Some(Token::Eq) => BinaryOp::Equal,
            Some(Token::Ne) => BinaryOp::NotEqual,
            Some(Token::Lt) => BinaryOp::Less,
            Some(Token::Le) => BinaryOp::LessEqual,
            Some(Token::Gt) => BinaryOp::Greater,
            Some(Token::Ge) => BinaryOp::GreaterEqual,
            _ => return Ok(left),
        };
        self.next_token()?;

        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.tokens.peek().map(|t| &t.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.next_token()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.tokens.peek().map(|t| &t.token) {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Modulo,
                _ => break,
            };
            self.next_token()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.tokens.peek().map(|t| &t.token) {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        let op_span = self.next_token()?.span;
        let operand = self.parse_unary()?;

        // Fold negative numeric literals
        if op == UnaryOp::Negate {
            if let Expr::Literal(Spanned { value, span }) = &operand {
                let negated = match value {
                    Literal::Int(i) => Some(Literal::Int(i.wrapping_neg())),
                    Literal::Float(f) => Some(Literal::Float(-f)),
                    _ => None,
                };
                if let Some(literal) = negated {
                    return Ok(Expr::Literal(Spanned::new(literal, op_span.to(*span))));
                }
            }
        }

        let span = op_span.to(operand.span());
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    /// Parse member access, method calls and indexing.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.tokens.peek().map(|t| &t.token) {
                Some(Token::Dot) => {
                    self.next_token()?; // consume dot
                    let name = self.expect_ident()?;
                    if self.tokens.peek_is(&Token::LParen) {
                        let (args, close) = self.parse_args()?;
                        let span = expr.span().to(close);
                        expr = Expr::Call {
                            target: Some(Box::new(expr)),
                            name,
                            args,
                            span,
                        };
                    } else {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            name,
                        };
                    }
                }
                Some(Token::LBracket) => {
                    self.next_token()?; // consume [
                    let index = self.parse_expr()?;
                    let close = self.expect_token(Token::RBracket)?;
                    let span = expr.span().to(close.span);
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.next_token()?;
        let span = tok.span;

        let literal =
            |value: Literal| -> Result<Expr, ParseError> { Ok(Expr::Literal(Spanned::new(value, span))) };
        match tok.token {
            Token::Null => literal(Literal::Null),
            Token::True => literal(Literal::Bool(true)),
            Token::False => literal(Literal::Bool(false)),
            Token::Int(i) => literal(Literal::Int(i)),
            Token::Float(f) => literal(Literal::Float(f)),
            Token::Str(s) => literal(Literal::String(s)),
            Token::Placeholder(n) => Ok(Expr::Placeholder(Spanned::new(n, span))),
            Token::Ident(name) => {
                let name = Spanned::new(name, span);
                if self.tokens.peek_is(&Token::LParen) {
                    let (args, close) = self.parse_args()?;
                    Ok(Expr::Call {
                        target: None,
                        name,
                        args,
                        span: span.to(close),
                    })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::New => self.parse_new(span),
            Token::Iif => self.parse_iif(span),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ParseError::new(
                format!("expected expression, found {}", other.describe()),
                span,
            )),
        }
    }

    /// Parse `(arg, ...)`, returning the arguments and the closing span.
    fn parse_args(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        self.expect_token(Token::LParen)?;
        let mut args = Vec::new();

        if self.tokens.peek_is(&Token::RParen) {
            let close = self.next_token()?;
            return Ok((args, close.span));
        }

        args.push(self.parse_expr()?);
        while self.tokens.peek_is(&Token::Comma) {
            self.next_token()?;
            args.push(self.parse_expr()?);
        }

        let close = self.expect_token(Token::RParen)?;
        Ok((args, close.span))
    }

    /// Parse `new(field [as Name], ...)`.
    fn parse_new(&mut self, start: Span) -> Result<Expr, ParseError> {
        self.expect_token(Token::LParen)?;
        let mut fields = Vec::new();

        loop {
            let value = self.parse_expr()?;
            let alias = if self.tokens.peek_is(&Token::As) {
                self.next_token()?;
                Some(self.expect_ident()?)
            } else {
                None
            };
            fields.push(NewField { value, alias });

            if !self.tokens.peek_is(&Token::Comma) {
                break;
            }
            self.next_token()?;
        }

        let close = self.expect_token(Token::RParen)?;
        Ok(Expr::New {
            fields,
            span: start.to(close.span),
        })
    }

    /// Parse `iif(test, a, b)`.
    fn parse_iif(&mut self, start: Span) -> Result<Expr, ParseError> {
        let (args, close) = self.parse_args()?;
        let span = start.to(close);
        let [test, if_true, if_false]: [Expr; 3] = args.try_into().map_err(|args: Vec<Expr>| {
            ParseError::new(
                format!("iif takes 3 arguments, found {}", args.len()),
                span,
            )
        })?;

        Ok(Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            span,
        })
    }

    /// Expect and consume an identifier.
    fn expect_ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(Spanned::new(name, tok.span)),
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {:?}, found {}", expected, tok.token.describe()),
                tok.span,
            ))
        }
    }

    /// Check that all input has been consumed.
    fn expect_end(&mut self) -> Result<(), ParseError> {
        if let Some(tok) = self.tokens.peek() {
            return Err(ParseError::new(
                format!("unexpected {} after end of expression", tok.token.describe()),
                tok.span,
            ));
        }
        match self.tokens.invalid() {
            Some(span) => Err(self.invalid_input(span)),
            None => Ok(()),
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        match self.tokens.next_token() {
            Some(tok) => Ok(tok),
            None => match self.tokens.invalid() {
                Some(span) => Err(self.invalid_input(span)),
                None => Err(ParseError::new(
                    "unexpected end of input",
                    Span::at(self.source.len()),
                )),
            },
        }
    }

    fn invalid_input(&self, span: Span) -> ParseError {
        let text = self.source.get(span.start..span.end).unwrap_or_default();
        ParseError::new(format!("unrecognized input '{}'", text), span)
            .with_hint("string literals must be quoted; placeholders are written @0, @1, ...")
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a source string into an expression.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    Parser::new(source).parse_expression()
}

/// Parse a source string into ordering terms.
pub fn parse_ordering(source: &str) -> Result<Vec<OrderingTerm>, ParseError> {
    Parser::new(source).parse_ordering()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(expr: &Expr) -> &str {
        match expr {
            Expr::Ident(i) => &i.value,
            other => panic!("expected identifier, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comparison() {
        let expr = parse("Price > @0").unwrap();
        if let Expr::Binary { op, left, right } = expr {
            assert_eq!(op, BinaryOp::Greater);
            assert_eq!(ident(&left), "Price");
            assert!(matches!(*right, Expr::Placeholder(Spanned { value: 0, .. })));
        } else {
            panic!("expected Binary");
        }
    }

    #[test]
    fn test_precedence() {
        // a || b && c parses as a || (b && c)
        let expr = parse("a || b && c").unwrap();
        if let Expr::Binary { op, right, .. } = expr {
            assert_eq!(op, BinaryOp::Or);
            assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
        } else {
            panic!("expected Binary");
        }

        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        if let Expr::Binary { op, right, .. } = expr {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(*right, Expr::Binary { op: BinaryOp::Multiply, .. }));
        } else {
            panic!("expected Binary");
        }
    }

    #[test]
    fn test_member_and_method_chain() {
        let expr = parse("x.Customer.Name.StartsWith(\"A\")").unwrap();
        if let Expr::Call { target, name, args, .. } = expr {
            assert_eq!(name.value, "StartsWith");
            assert_eq!(args.len(), 1);
            let target = target.expect("call target");
            assert_eq!(target.implicit_name(), Some("Name"));
        } else {
            panic!("expected Call");
        }
    }

    #[test]
    fn test_bare_call() {
        let expr = parse("Count()").unwrap();
        assert!(matches!(expr, Expr::Call { target: None, ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_negative_literal_folding() {
        assert_eq!(
            parse("-5").unwrap(),
            Expr::Literal(Spanned::new(Literal::Int(-5), Span::new(0, 2)))
        );
        assert!(matches!(
            parse("-Price").unwrap(),
            Expr::Unary { op: UnaryOp::Negate, .. }
        ));
    }

    #[test]
    fn test_parse_new() {
        let expr = parse("new(Name, Price * 2 as Double)").unwrap();
        if let Expr::New { fields, .. } = expr {
            assert_eq!(fields.len(), 2);
            assert!(fields[0].alias.is_none());
            assert_eq!(fields[1].alias.as_ref().map(|a| a.value.as_str()), Some("Double"));
        } else {
            panic!("expected New");
        }
    }

    #[test]
    fn test_parse_conditionals() {
        assert!(matches!(parse("iif(a, 1, 2)").unwrap(), Expr::Conditional { .. }));
        assert!(matches!(parse("a ? 1 : 2").unwrap(), Expr::Conditional { .. }));
        assert!(parse("iif(a, 1)").is_err());
    }

    #[test]
    fn test_parse_index() {
        assert!(matches!(parse("Tags[0]").unwrap(), Expr::Index { .. }));
    }

    #[test]
    fn test_parse_ordering() {
        let terms = parse_ordering("Category, Price desc, Name ascending").unwrap();
        assert_eq!(terms.len(), 3);
        assert_eq!(ident(&terms[0].expr), "Category");
        assert_eq!(terms[0].direction, SortDirection::Ascending);
        assert_eq!(terms[1].direction, SortDirection::Descending);
        assert_eq!(terms[2].direction, SortDirection::Ascending);
        assert_eq!(terms[1].span, Span::new(10, 20));
    }

    #[test]
    fn test_ordering_with_call_arguments() {
        // Commas inside calls do not split terms
        let terms = parse_ordering("iif(Flag, A, B) desc, C").unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].direction, SortDirection::Descending);
    }

    #[test]
    fn test_empty_expression() {
        let err = parse("   ").unwrap_err();
        assert_eq!(err.message, "expression is empty");
        assert!(parse_ordering("").is_err());
    }

    #[test]
    fn test_only_unrecognized_input() {
        let err = parse("#").unwrap_err();
        assert_eq!(err.message, "unrecognized input '#'");
        assert_eq!(err.span, Span::new(0, 1));

        let err = parse_ordering("  $").unwrap_err();
        assert_eq!(err.message, "unrecognized input '$'");
        assert_eq!(err.span.start, 2);
    }

    #[test]
    fn test_error_offsets() {
        let err = parse("Price > ").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
        assert_eq!(err.span.start, 8);

        let err = parse("Price > 10 10").unwrap_err();
        assert_eq!(err.span.start, 11);

        let err = parse("Price # 10").unwrap_err();
        assert_eq!(err.span, Span::new(6, 7));
        assert!(err.hint.is_some());
    }
}
