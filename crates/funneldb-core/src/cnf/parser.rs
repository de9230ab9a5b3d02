//! Formula parser
//!
//! Recursive descent over the tokens produced by [`Lexer`].
//!
//! # Grammar
//!
//! ```text
//! expr    ::= conj ("|" conj)*
//! conj    ::= unary (("&" | "~") unary)*
//! unary   ::= "~" unary | primary
//! primary ::= TERM | "(" expr ")"
//! ```
//!
//! `~` binds tightest, then `&`, then `|`, so `a | b & c` reads as
//! `a | (b & c)`. Both binary levels associate left to right. An infix `~`
//! reads as "and not" at the `&` level: `a ~ b` is `a & ~b`. Empty input is
//! the empty formula.
//!
//! The extended syntax first rewrites `!` to `~`, `,` to `&` and `+` to `|`,
//! which keeps mask expressions inside query strings free of the outer
//! operators.

use super::lexer::Lexer;
use super::token::{Token, TokenKind};
use super::Formula;

use thiserror::Error;

/// Parser errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected} at position {position}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("missing operand after {operator} at position {position}")]
    MissingOperand { operator: String, position: usize },

    #[error("unclosed '(' at position {position}")]
    UnclosedParen { position: usize },
}

/// Input dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    /// `&`, `|`, `~`
    #[default]
    Standard,
    /// `,`, `+`, `!` on top of the standard operators
    Extended,
}

impl Syntax {
    fn rewrite(self, input: &str) -> String {
        match self {
            Syntax::Standard => input.to_string(),
            Syntax::Extended => input
                .chars()
                .map(|c| match c {
                    '!' => '~',
                    ',' => '&',
                    '+' => '|',
                    c => c,
                })
                .collect(),
        }
    }
}

/// Parse a formula string into CNF
pub fn parse(input: &str, syntax: Syntax) -> Result<Formula<String>, ParseError> {
    let source = syntax.rewrite(input);
    Parser::new(&source).run()
}

struct Parser<'a> {
    lexer: std::iter::Peekable<Lexer<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input).peekable(),
        }
    }

    fn run(mut self) -> Result<Formula<String>, ParseError> {
        if self.peek_kind() == TokenKind::Eof {
            return Ok(Formula::empty());
        }

        let formula = self.parse_expr()?;

        let token = self.next_token();
        if token.kind != TokenKind::Eof {
            return Err(unexpected("operator or end of input", &token));
        }
        Ok(formula)
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.lexer.peek().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn next_token(&mut self) -> Token<'a> {
        // The lexer always ends on Eof; past that, keep answering Eof.
        self.lexer.next().unwrap_or(Token::eof(0))
    }

    fn parse_expr(&mut self) -> Result<Formula<String>, ParseError> {
        let mut acc = self.parse_conj()?;
        while self.peek_kind() == TokenKind::Or {
            self.expect_operand()?;
            acc = acc.or(&self.parse_conj()?);
        }
        Ok(acc)
    }

    fn parse_conj(&mut self) -> Result<Formula<String>, ParseError> {
        let mut acc = self.parse_unary()?;
        loop {
            let kind = self.peek_kind();
            if kind != TokenKind::And && kind != TokenKind::Not {
                return Ok(acc);
            }
            self.expect_operand()?;
            let rhs = self.parse_unary()?;
            acc = match kind {
                TokenKind::And => acc.and(&rhs),
                _ => acc.and(&rhs.negate()),
            };
        }
    }

    /// Consume a binary operator and check an operand follows it
    fn expect_operand(&mut self) -> Result<(), ParseError> {
        let op = self.next_token();
        if self.peek_kind().starts_operand() {
            Ok(())
        } else {
            Err(ParseError::MissingOperand {
                operator: op.kind.to_string(),
                position: op.offset,
            })
        }
    }

    fn parse_unary(&mut self) -> Result<Formula<String>, ParseError> {
        if self.peek_kind() == TokenKind::Not {
            let op = self.next_token();
            if !self.peek_kind().starts_operand() {
                return Err(ParseError::MissingOperand {
                    operator: op.kind.to_string(),
                    position: op.offset,
                });
            }
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Formula<String>, ParseError> {
        let token = self.next_token();
        match token.kind {
            TokenKind::Term => Ok(Formula::literal(token.text.to_string())),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let close = self.next_token();
                match close.kind {
                    TokenKind::RParen => Ok(inner),
                    TokenKind::Eof => Err(ParseError::UnclosedParen {
                        position: token.offset,
                    }),
                    _ => Err(unexpected("')'", &close)),
                }
            }
            _ => Err(unexpected("term or '('", &token)),
        }
    }
}

fn unexpected(expected: &str, token: &Token<'_>) -> ParseError {
    let found = match token.kind {
        TokenKind::Term => format!("'{}'", token.text),
        kind => kind.to_string(),
    };
    ParseError::UnexpectedToken {
        expected: expected.to_string(),
        found,
        position: token.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnf::{none_of, one_of, where_all};
    use pretty_assertions::assert_eq;

    fn f(input: &str) -> Formula<String> {
        parse(input, Syntax::Standard).unwrap()
    }

    fn owned(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(f(""), Formula::empty());
        assert_eq!(f("   "), Formula::empty());
    }

    #[test]
    fn test_single_term() {
        assert_eq!(f(" signup "), Formula::literal("signup".to_string()));
    }

    #[test]
    fn test_and_or() {
        assert_eq!(f("a & b"), where_all(owned(&["a", "b"])));
        assert_eq!(f("a | b"), one_of(owned(&["a", "b"])));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // a | (b & c)
        let expected = one_of(owned(&["a", "b"])) & one_of(owned(&["a", "c"]));
        assert_eq!(f("a | b & c"), expected);
        assert_eq!(f("a | (b & c)"), expected);
        assert_eq!(f("b & c | a"), expected);
        // explicit grouping still wins
        assert_eq!(
            f("(a | b) & c"),
            one_of(owned(&["a", "b"])) & where_all(owned(&["c"]))
        );

        let holds = f("a | b & c").evaluate(|t| t == "a");
        assert!(holds);
    }

    #[test]
    fn test_infix_not_binds_like_and() {
        // a | (b & ~c)
        assert_eq!(f("a | b ~ c"), f("a | (b & ~c)"));
        // (a & ~b) | c
        assert_eq!(f("a ~ b | c"), f("(a & ~b) | c"));
    }

    #[test]
    fn test_negation() {
        assert_eq!(f("~a"), none_of(owned(&["a"])));
        assert_eq!(f("~~a"), f("a"));
        assert_eq!(f("~(a & b)"), none_of(owned(&["a", "b"])));
    }

    #[test]
    fn test_infix_not_is_and_not() {
        assert_eq!(f("a ~ b"), f("a & ~b"));
    }

    #[test]
    fn test_extended_syntax() {
        let ext = parse("a,b+!c", Syntax::Extended).unwrap();
        assert_eq!(ext, f("(a & b) | ~c"));
        // "x+y,z" keeps the & over | grouping
        assert_eq!(
            parse("x+y,z", Syntax::Extended).unwrap(),
            f("x | (y & z)")
        );
        assert_eq!(Formula::parse_extended("").unwrap(), Formula::empty());
    }

    #[test]
    fn test_missing_operand() {
        let err = parse("a &", Syntax::Standard).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingOperand {
                operator: "'&'".to_string(),
                position: 2,
            }
        );
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse("(a | b", Syntax::Standard).unwrap_err();
        assert_eq!(err, ParseError::UnclosedParen { position: 0 });
    }

    #[test]
    fn test_trailing_paren() {
        let err = parse("a)", Syntax::Standard).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 1, .. }));
    }

    #[test]
    fn test_empty_parens() {
        let err = parse("()", Syntax::Standard).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_display_round_trip() {
        let formula = f("(a | b) & c & (d | e | a)");
        assert_eq!(f(&formula.to_string()), formula);
    }
}
