//! Whitespace handling per the Fluent EBNF.
//!
//! `blank_inline` is U+0020 only; `blank` adds line feeds. Tabs are never
//! blank. All skippers return cursors at or after their input position.

use crate::cursor::Cursor;

/// Skip `blank_inline ::= "\u{20}"+`.
///
/// Used between tokens on the same line (`identifier = value`, around `:`,
/// inside variant key brackets).
pub(super) fn skip_blank_inline<'s>(cursor: Cursor<'s>) -> Cursor<'s> {
    cursor.skip_spaces()
}

/// Skip `blank ::= (blank_inline | line_end)+`.
///
/// Used between entries, inside variant lists, and inside call arguments
/// (which is what permits multiline argument formatting).
pub(super) fn skip_blank<'s>(cursor: Cursor<'s>) -> Cursor<'s> {
    cursor.skip_whitespace()
}

/// Check whether the line after this newline is an indented pattern
/// continuation.
///
/// Continuation lines start with at least one space; lines whose first
/// non-space character is `[`, `*`, `.`, or `}` are variant markers,
/// attributes, or closing braces, never continuations. Blank lines between
/// the newline and the continuation are allowed:
///
/// ```text
/// msg =
///
///     value
/// ```
pub(super) fn is_indented_continuation(cursor: Cursor<'_>) -> bool {
    if cursor.current() != Some('\n') {
        return false;
    }

    let mut next = cursor.advance();
    while next.current() == Some('\n') {
        next = next.advance();
    }

    if next.current() != Some(' ') {
        return false;
    }

    while next.current() == Some(' ') {
        next = next.advance();
    }

    !matches!(next.current(), Some('[') | Some('*') | Some('.') | Some('}'))
}

/// Position a cursor at the start of a pattern after `=`.
///
/// Handles both inline starts (`key = value`) and multiline starts
/// (`key =\n    value`). Returns the cursor at content and, for multiline
/// starts, the count of leading spaces that becomes the pattern's common
/// indent. Inline starts report an indent of 0.
pub(super) fn skip_multiline_pattern_start<'s>(cursor: Cursor<'s>) -> (Cursor<'s>, usize) {
    let mut cursor = skip_blank_inline(cursor);

    if cursor.current() == Some('\n') && is_indented_continuation(cursor) {
        cursor = cursor.advance();
        while cursor.current() == Some('\n') {
            cursor = cursor.advance();
        }
        let mut indent = 0;
        while cursor.current() == Some(' ') {
            indent += 1;
            cursor = cursor.advance();
        }
        return (cursor, indent);
    }

    (cursor, 0)
}
