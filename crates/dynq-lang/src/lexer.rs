//! Tokens of the expression language.
//!
//! Keywords are case-sensitive and lower-case; `and`, `or` and `not` are
//! spelled-out aliases for `&&`, `||` and `!`.

use logos::Logos;

use crate::span::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"\s+")]
pub enum Token {
    #[token("new")]
    New,
    #[token("as")]
    As,
    #[token("iif")]
    Iif,
    #[token("asc")]
    #[token("ascending")]
    Asc,
    #[token("desc")]
    #[token("descending")]
    Desc,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[token("=")]
    #[token("==")]
    Eq,
    #[token("<>")]
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("and")]
    #[token("&&")]
    And,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("not")]
    #[token("!")]
    Not,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    /// `@N`, the N-th positional argument.
    #[regex(r"@[0-9]+", |lex| lex.slice()[1..].parse::<usize>().ok())]
    Placeholder(usize),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    /// Double- or single-quoted, escapes resolved.
    #[regex(r#""(?:[^"\\]|\\.)*""#, quoted)]
    #[regex(r#"'(?:[^'\\]|\\.)*'"#, quoted)]
    Str(String),

    /// Unsigned; `-1` lexes as `Minus`, `Int(1)`.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+(?:[eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

impl Token {
    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Str(s) => format!("string {:?}", s),
            Token::Int(i) => format!("integer {}", i),
            Token::Float(f) => format!("number {}", f),
            Token::Placeholder(n) => format!("placeholder @{}", n),
            other => format!("{:?}", other),
        }
    }
}

fn quoted(lex: &mut logos::Lexer<Token>) -> String {
    let raw = lex.slice();
    let body = &raw[1..raw.len() - 1];
    if !body.contains('\\') {
        return body.to_owned();
    }

    let mut out = String::with_capacity(body.len());
    let mut escaped = false;
    for c in body.chars() {
        if !escaped {
            if c == '\\' {
                escaped = true;
            } else {
                out.push(c);
            }
            continue;
        }
        escaped = false;
        let ch = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' | '"' | '\'' => c,
            // Unknown escapes are kept as written
            other => {
                out.push('\\');
                other
            }
        };
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// The tokens of one expression, read ahead of parsing.
///
/// Tokenizing stops at the first input that is not a token; its span is
/// available from [`TokenStream::invalid`].
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<SpannedToken>,
    pos: usize,
    invalid: Option<Span>,
}

impl TokenStream {
    pub fn new(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut invalid = None;
        let mut lex = Token::lexer(text);
        while let Some(next) = lex.next() {
            let span = Span::from(lex.span());
            match next {
                Ok(token) => tokens.push(SpannedToken { token, span }),
                Err(()) => {
                    invalid = Some(span);
                    break;
                }
            }
        }
        Self {
            tokens,
            pos: 0,
            invalid,
        }
    }

    pub fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    pub fn peek_is(&self, token: &Token) -> bool {
        self.peek().is_some_and(|t| &t.token == token)
    }

    pub fn next_token(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    /// Span of the input that stopped tokenizing, if any.
    pub fn invalid(&self) -> Option<Span> {
        self.invalid
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.invalid.is_none()
    }

    fn into_tokens(self) -> Vec<SpannedToken> {
        self.tokens
    }
}

/// Every token of `text` up to the first unrecognized input.
pub fn tokenize(text: &str) -> Vec<SpannedToken> {
    TokenStream::new(text).into_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<Token> {
        tokenize(text).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_predicate() {
        assert_eq!(
            kinds("Price > @0 && Name != \"x\""),
            vec![
                Token::Ident("Price".into()),
                Token::Gt,
                Token::Placeholder(0),
                Token::And,
                Token::Ident("Name".into()),
                Token::Ne,
                Token::Str("x".into()),
            ]
        );
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(kinds("a = b"), kinds("a == b"));
        assert_eq!(kinds("a <> b"), kinds("a != b"));
        assert_eq!(kinds("a and b or not c"), kinds("a && b || ! c"));
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert_eq!(
            kinds("newest android"),
            vec![Token::Ident("newest".into()), Token::Ident("android".into())]
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(
            kinds("123 3.14 1.5e3 a-1"),
            vec![
                Token::Int(123),
                Token::Float(3.14),
                Token::Float(1500.0),
                Token::Ident("a".into()),
                Token::Minus,
                Token::Int(1),
            ]
        );
    }

    #[test]
    fn test_ordering_keywords() {
        assert_eq!(
            kinds("A, B desc, C ascending"),
            vec![
                Token::Ident("A".into()),
                Token::Comma,
                Token::Ident("B".into()),
                Token::Desc,
                Token::Comma,
                Token::Ident("C".into()),
                Token::Asc,
            ]
        );
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(
            kinds(r#""a\"b" 'it\'s' "tab\tx" "\q""#),
            vec![
                Token::Str("a\"b".into()),
                Token::Str("it's".into()),
                Token::Str("tab\tx".into()),
                Token::Str("\\q".into()),
            ]
        );
    }

    #[test]
    fn test_stops_at_unrecognized_input() {
        let mut stream = TokenStream::new("a # b");
        assert_eq!(stream.next_token().map(|t| t.token), Some(Token::Ident("a".into())));
        assert_eq!(stream.next_token(), None);
        assert_eq!(stream.invalid(), Some(Span::new(2, 3)));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut stream = TokenStream::new("it.Name");
        assert!(stream.peek_is(&Token::Ident("it".into())));
        assert!(stream.peek_is(&Token::Ident("it".into())));
        assert_eq!(stream.next_token().map(|t| t.span), Some(Span::new(0, 2)));
        assert!(stream.peek_is(&Token::Dot));
    }
}
