//! Zero-copy lexer for formula strings

use std::iter::Peekable;
use std::str::CharIndices;

use super::token::{Token, TokenKind};

/// Operator characters; everything else belongs to a term
fn operator_kind(c: char) -> Option<TokenKind> {
    match c {
        '&' => Some(TokenKind::And),
        '|' => Some(TokenKind::Or),
        '~' => Some(TokenKind::Not),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        _ => None,
    }
}

/// Zero-copy lexer for formula strings.
///
/// Terms are maximal runs of non-operator characters. Leading whitespace is
/// skipped and trailing whitespace trimmed, so `a b & c` lexes as the terms
/// `a b` and `c`. The stream always ends with one `Eof` token.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            finished: false,
        }
    }

    /// Byte offset of the next unread character
    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn lex_term(&mut self, start: usize) -> Token<'a> {
        while self
            .chars
            .next_if(|&(_, c)| operator_kind(c).is_none())
            .is_some()
        {}
        let end = self.offset();
        Token::new(TokenKind::Term, self.input[start..end].trim_end(), start)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}

        let Some(&(start, c)) = self.chars.peek() else {
            self.finished = true;
            return Some(Token::eof(self.input.len()));
        };
        Some(match operator_kind(c) {
            Some(kind) => {
                self.chars.next();
                Token::new(kind, &self.input[start..start + c.len_utf8()], start)
            }
            None => self.lex_term(start),
        })
    }
}
