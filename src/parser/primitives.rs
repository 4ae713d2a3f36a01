//! Primitive parsers: identifiers, numbers, string literals, escapes.
//!
//! Each primitive either returns the parsed value with an advanced cursor or
//! returns `None` after recording a typed [`ParseErrorKind`] on the parser.
//! Failure is always recoverable; the entry rules turn it into junk.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::{Parsed, Parser};
use crate::ast::{Identifier, NumberLiteral, NumberValue};
use crate::cursor::Cursor;
use crate::error::ParseErrorKind;
use crate::{MAX_IDENTIFIER_LENGTH, MAX_NUMBER_LENGTH, MAX_STRING_LITERAL_LENGTH};

/// First character of an identifier: ASCII letter only. Unicode letters are
/// rejected for cross-implementation interop.
pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// Continuation character: ASCII alphanumeric, `-`, or `_`.
pub fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Complete-string validation: `[a-zA-Z][a-zA-Z0-9_-]*`, at most
/// [`MAX_IDENTIFIER_LENGTH`] characters. Shared by parser and serializer so
/// the two can never disagree on the grammar.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => {}
        _ => return false,
    }
    chars.all(is_identifier_char)
}

impl<'s> Parser<'s> {
    pub(super) fn parse_identifier(&mut self, cursor: Cursor<'s>) -> Parsed<'s, Identifier> {
        let start = cursor.pos();
        match cursor.current() {
            Some(c) if is_identifier_start(c) => {}
            _ => {
                self.report(ParseErrorKind::ExpectedIdentifier, start, start);
                return None;
            }
        }

        let mut cur = cursor.advance();
        while matches!(cur.current(), Some(c) if is_identifier_char(c)) {
            cur = cur.advance();
        }

        let name = cursor.slice(start, cur.pos());
        if name.len() > MAX_IDENTIFIER_LENGTH {
            self.report(
                ParseErrorKind::IdentifierTooLong {
                    limit: MAX_IDENTIFIER_LENGTH,
                },
                start,
                cur.pos(),
            );
            return None;
        }

        Some((Identifier::new(name), cur))
    }

    /// `NumberLiteral ::= "-"? digits ("." digits)?`
    ///
    /// Integral lexemes parse to `i64`; anything fractional (or too wide for
    /// `i64`) becomes a [`Decimal`]. The raw lexeme is kept verbatim.
    pub(super) fn parse_number(&mut self, cursor: Cursor<'s>) -> Parsed<'s, NumberLiteral> {
        let start = cursor.pos();
        let mut cur = cursor;
        if cur.current() == Some('-') {
            cur = cur.advance();
        }

        let digits_start = cur.pos();
        while matches!(cur.current(), Some(c) if c.is_ascii_digit()) {
            cur = cur.advance();
        }
        if cur.pos() == digits_start {
            self.report(ParseErrorKind::InvalidNumber, start, cur.pos());
            return None;
        }

        let mut fractional = false;
        if cur.current() == Some('.') && matches!(cur.peek(1), Some(c) if c.is_ascii_digit()) {
            fractional = true;
            cur = cur.advance();
            while matches!(cur.current(), Some(c) if c.is_ascii_digit()) {
                cur = cur.advance();
            }
        }

        let raw = cursor.slice(start, cur.pos());
        if raw.len() > MAX_NUMBER_LENGTH {
            self.report(
                ParseErrorKind::NumberTooLong {
                    limit: MAX_NUMBER_LENGTH,
                },
                start,
                cur.pos(),
            );
            return None;
        }

        let value = if fractional {
            match Decimal::from_str(raw) {
                Ok(d) => NumberValue::Decimal(d),
                Err(_) => {
                    self.report(ParseErrorKind::InvalidNumber, start, cur.pos());
                    return None;
                }
            }
        } else {
            match i64::from_str(raw) {
                Ok(i) => NumberValue::Integer(i),
                // Wider than i64: keep it lossless as a decimal.
                Err(_) => match Decimal::from_str(raw) {
                    Ok(d) => NumberValue::Decimal(d),
                    Err(_) => {
                        self.report(ParseErrorKind::InvalidNumber, start, cur.pos());
                        return None;
                    }
                },
            }
        };

        Some((
            NumberLiteral {
                value,
                raw: raw.to_string(),
            },
            cur,
        ))
    }

    /// `"..."` with `\"`, `\\`, `\uXXXX` (4 hex), `\UXXXXXX` (6 hex).
    ///
    /// Returns `(unescaped value, raw lexeme between the quotes)`.
    pub(super) fn parse_string_literal(
        &mut self,
        cursor: Cursor<'s>,
    ) -> Parsed<'s, (String, String)> {
        let start = cursor.pos();
        if cursor.current() != Some('"') {
            self.report(ParseErrorKind::ExpectedChar { expected: '"' }, start, start);
            return None;
        }

        let mut cur = cursor.advance();
        let raw_start = cur.pos();
        let mut value = String::new();

        loop {
            match cur.current() {
                None | Some('\n') => {
                    self.report(ParseErrorKind::UnterminatedString, start, cur.pos());
                    return None;
                }
                Some('"') => break,
                Some('\\') => {
                    let (c, next) = self.parse_escape(cur)?;
                    value.push(c);
                    cur = next;
                }
                Some(c) => {
                    value.push(c);
                    cur = cur.advance();
                }
            }
            if value.len() > MAX_STRING_LITERAL_LENGTH {
                self.report(
                    ParseErrorKind::StringTooLong {
                        limit: MAX_STRING_LITERAL_LENGTH,
                    },
                    start,
                    cur.pos(),
                );
                return None;
            }
        }

        let raw = cursor.slice(raw_start, cur.pos()).to_string();
        Some(((value, raw), cur.advance()))
    }

    /// One escape sequence, cursor at the backslash. The escape tables live
    /// here; unknown escapes fail with the offending character.
    fn parse_escape(&mut self, cursor: Cursor<'s>) -> Parsed<'s, char> {
        let start = cursor.pos();
        let cur = cursor.advance();
        match cur.current() {
            Some('"') => Some(('"', cur.advance())),
            Some('\\') => Some(('\\', cur.advance())),
            Some('u') => self.parse_unicode_escape(cur.advance(), 4, start),
            Some('U') => self.parse_unicode_escape(cur.advance(), 6, start),
            Some(other) => {
                self.report(
                    ParseErrorKind::UnknownEscape { found: other },
                    start,
                    cur.advance().pos(),
                );
                None
            }
            None => {
                self.report(ParseErrorKind::UnterminatedString, start, cur.pos());
                None
            }
        }
    }

    /// Exactly `digits` hex digits; the value must be a Unicode scalar.
    /// Surrogates (U+D800..U+DFFF) and values past U+10FFFF are rejected.
    fn parse_unicode_escape(
        &mut self,
        cursor: Cursor<'s>,
        digits: usize,
        escape_start: usize,
    ) -> Parsed<'s, char> {
        let mut cur = cursor;
        let mut value: u32 = 0;
        for _ in 0..digits {
            match cur.current().and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    value = value * 16 + d;
                    cur = cur.advance();
                }
                None => {
                    self.report(
                        ParseErrorKind::InvalidUnicodeEscape { value },
                        escape_start,
                        cur.pos(),
                    );
                    return None;
                }
            }
        }
        match char::from_u32(value) {
            Some(c) => Some((c, cur)),
            None => {
                self.report(
                    ParseErrorKind::InvalidUnicodeEscape { value },
                    escape_start,
                    cur.pos(),
                );
                None
            }
        }
    }
}
