//! Streaming, error-recovering parser for FTL source.
//!
//! The parser never fails. Fragments it cannot parse become
//! [`Junk`] entries carrying the typed errors that stopped them, and
//! parsing resumes at the next line that could start an entry. Parse errors
//! are accumulated on the parser itself (cleared per entry), so concurrent
//! parses cannot cross-contaminate diagnostics.
//!
//! The grammar is LL(k) with small lookahead; every rule takes and returns
//! immutable [`Cursor`]s, so backtracking is a matter of dropping a cursor.

mod pattern;
pub mod primitives;
mod whitespace;

#[cfg(test)]
mod tests;

use crate::ast::{Attribute, Comment, CommentKind, Entry, Junk, Message, Resource, Term};
use crate::cursor::{normalize_line_endings, Cursor};
use crate::error::{Annotation, ParseError, ParseErrorKind};
use crate::position::Span;
use crate::{MAX_DEPTH, MAX_SOURCE_SIZE};

use primitives::is_identifier_start;
use whitespace::{skip_blank, skip_blank_inline, skip_multiline_pattern_start};

/// Result convention for grammar rules: the parsed value plus the cursor
/// after it, or `None` with the failure recorded on the parser.
pub(crate) type Parsed<'s, T> = Option<(T, Cursor<'s>)>;

/// Parser DoS limits.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Placeable nesting beyond this becomes junk instead of recursion.
    pub max_nesting_depth: usize,
    /// Sources larger than this parse to a single annotated junk entry.
    pub max_source_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: MAX_DEPTH,
            max_source_size: MAX_SOURCE_SIZE,
        }
    }
}

/// Explicit, by-value parse state. Copies on entry into a placeable, which
/// keeps the depth accounting correct across backtracking without any
/// shared mutation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseContext {
    max_nesting_depth: usize,
    current_depth: usize,
}

impl ParseContext {
    fn new(max_nesting_depth: usize) -> Self {
        Self {
            max_nesting_depth,
            current_depth: 0,
        }
    }

    pub(crate) fn is_depth_exceeded(&self) -> bool {
        self.current_depth >= self.max_nesting_depth
    }

    pub(crate) fn enter_placeable(&self) -> Self {
        Self {
            max_nesting_depth: self.max_nesting_depth,
            current_depth: self.current_depth + 1,
        }
    }

    pub(crate) fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }
}

/// Parse FTL source into a [`Resource`] with default limits.
///
/// Line endings are normalized (CR, CRLF -> LF) before parsing; all spans
/// refer to the normalized text.
pub fn parse(source: &str) -> Resource {
    parse_with_options(source, &ParseOptions::default())
}

pub fn parse_with_options(source: &str, options: &ParseOptions) -> Resource {
    if source.len() > options.max_source_size {
        let error = ParseError::new(
            ParseErrorKind::SourceTooLarge {
                limit: options.max_source_size,
            },
            Span::new(0, 0),
        );
        return Resource {
            entries: vec![Entry::Junk(Junk {
                content: String::new(),
                annotations: vec![Annotation::from_parse_error(&error)],
                span: Some(Span::new(0, source.len())),
            })],
        };
    }

    let normalized = normalize_line_endings(source);
    let mut parser = Parser::new(&normalized);
    parser.parse_resource(ParseContext::new(options.max_nesting_depth))
}

pub(crate) struct Parser<'s> {
    source: &'s str,
    /// Typed errors for the entry currently being parsed. Cleared at each
    /// entry start; drained into junk annotations on failure.
    pub(crate) errors: Vec<ParseError>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            errors: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests() -> Parser<'static> {
        Parser {
            source: "",
            errors: Vec::new(),
        }
    }

    pub(crate) fn report(&mut self, kind: ParseErrorKind, start: usize, end: usize) {
        self.errors.push(ParseError::new(kind, Span::new(start, end)));
    }

    // ------------------------------------------------------------------
    // Resource
    // ------------------------------------------------------------------

    fn parse_resource(&mut self, ctx: ParseContext) -> Resource {
        let mut entries: Vec<Entry> = Vec::new();
        let mut cursor = Cursor::new(self.source);

        loop {
            cursor = skip_blank_block(cursor);
            if cursor.is_eof() {
                break;
            }

            let entry_start = cursor.pos();
            self.errors.clear();

            match cursor.current() {
                Some('#') => match self.parse_comment(cursor) {
                    Some((comment, next)) => {
                        self.push_comment(&mut entries, comment);
                        cursor = next;
                    }
                    None => cursor = self.push_junk(&mut entries, entry_start, cursor),
                },
                Some('-') if matches!(cursor.peek(1), Some(c) if is_identifier_start(c)) => {
                    match self.parse_term(cursor, ctx) {
                        Some((mut term, next)) => {
                            term.comment = self.take_attached_comment(&mut entries, entry_start);
                            entries.push(Entry::Term(term));
                            cursor = next;
                        }
                        None => cursor = self.push_junk(&mut entries, entry_start, cursor),
                    }
                }
                Some(c) if is_identifier_start(c) => match self.parse_message(cursor, ctx) {
                    Some((mut message, next)) => {
                        message.comment = self.take_attached_comment(&mut entries, entry_start);
                        entries.push(Entry::Message(message));
                        cursor = next;
                    }
                    None => cursor = self.push_junk(&mut entries, entry_start, cursor),
                },
                _ => {
                    self.report(ParseErrorKind::ExpectedEntry, entry_start, entry_start);
                    cursor = self.push_junk(&mut entries, entry_start, cursor);
                }
            }
        }

        Resource { entries }
    }

    /// Push a comment, merging it into the previous entry when that entry
    /// is a comment of the same kind with no blank line in between.
    fn push_comment(&mut self, entries: &mut Vec<Entry>, comment: Comment) {
        if let Some(Entry::Comment(prev)) = entries.last_mut() {
            let adjacent = match (prev.span, comment.span) {
                (Some(a), Some(b)) => !self.has_blank_line_between(a.end, b.start),
                _ => false,
            };
            if prev.kind == comment.kind && adjacent {
                prev.content.push('\n');
                prev.content.push_str(&comment.content);
                prev.span = match (prev.span, comment.span) {
                    (Some(a), Some(b)) => Some(Span::new(a.start, b.end)),
                    _ => None,
                };
                return;
            }
        }
        entries.push(Entry::Comment(comment));
    }

    /// Detach a standalone comment directly above an entry (no blank line
    /// between) so it can ride along as the entry's comment.
    fn take_attached_comment(
        &mut self,
        entries: &mut Vec<Entry>,
        entry_start: usize,
    ) -> Option<Comment> {
        match entries.last() {
            Some(Entry::Comment(c)) if c.kind == CommentKind::Standalone => {
                let span = c.span?;
                if self.has_blank_line_between(span.end, entry_start) {
                    return None;
                }
            }
            _ => return None,
        }
        match entries.pop() {
            Some(Entry::Comment(c)) => Some(c),
            _ => None,
        }
    }

    /// A blank line is one containing only whitespace: the gap must hold a
    /// newline followed, after optional spaces, by another newline.
    fn has_blank_line_between(&self, from: usize, to: usize) -> bool {
        let gap = &self.source[from.min(to)..to.max(from)];
        let mut after_newline = false;
        for c in gap.chars() {
            match c {
                '\n' if after_newline => return true,
                '\n' => after_newline = true,
                ' ' => {}
                _ => after_newline = false,
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    /// `#`, `##`, or `###` up to the end of the line. A fourth `#`, or
    /// content without a separating space, fails the rule.
    fn parse_comment(&mut self, cursor: Cursor<'s>) -> Parsed<'s, Comment> {
        let start = cursor.pos();
        let mut level = 0usize;
        let mut cur = cursor;
        while cur.current() == Some('#') && level < 3 {
            level += 1;
            cur = cur.advance();
        }
        match cur.current() {
            Some('#') => {
                self.report(ParseErrorKind::ExpectedEntry, start, cur.pos());
                return None;
            }
            Some(' ') => cur = cur.advance(),
            None | Some('\n') => {}
            Some(_) => {
                self.report(ParseErrorKind::ExpectedChar { expected: ' ' }, cur.pos(), cur.pos());
                return None;
            }
        }

        let line_end = cur.line_end();
        let content = cur.slice(cur.pos(), line_end).to_string();
        let kind = match level {
            1 => CommentKind::Standalone,
            2 => CommentKind::Group,
            _ => CommentKind::Resource,
        };
        Some((
            Comment {
                content,
                kind,
                span: Some(Span::new(start, line_end)),
            },
            cur.advance_to(line_end),
        ))
    }

    fn parse_message(&mut self, cursor: Cursor<'s>, ctx: ParseContext) -> Parsed<'s, Message> {
        let start = cursor.pos();
        let (id, cur) = self.parse_identifier(cursor)?;
        let cur = skip_blank_inline(cur);
        if cur.current() != Some('=') {
            self.report(ParseErrorKind::ExpectedChar { expected: '=' }, cur.pos(), cur.pos());
            return None;
        }

        let (content, indent) = skip_multiline_pattern_start(cur.advance());
        let (value, cur) = self.parse_pattern(content, ctx, (indent > 0).then_some(indent))?;
        let (attributes, cur) = self.parse_attributes(cur, ctx)?;

        if value.is_none() && attributes.is_empty() {
            self.report(
                ParseErrorKind::ExpectedMessageField {
                    id: id.name.clone(),
                },
                start,
                cur.pos(),
            );
            return None;
        }

        let ((), cur) = self.expect_line_end(cur)?;
        Some((
            Message {
                id,
                value,
                attributes,
                comment: None,
                span: Some(Span::new(start, cur.pos())),
            },
            cur,
        ))
    }

    fn parse_term(&mut self, cursor: Cursor<'s>, ctx: ParseContext) -> Parsed<'s, Term> {
        let start = cursor.pos();
        let cur = cursor.advance(); // '-'
        let (id, cur) = self.parse_identifier(cur)?;
        let cur = skip_blank_inline(cur);
        if cur.current() != Some('=') {
            self.report(ParseErrorKind::ExpectedChar { expected: '=' }, cur.pos(), cur.pos());
            return None;
        }

        let (content, indent) = skip_multiline_pattern_start(cur.advance());
        let (value, cur) = self.parse_pattern(content, ctx, (indent > 0).then_some(indent))?;
        let Some(value) = value else {
            self.report(
                ParseErrorKind::ExpectedTermValue {
                    id: id.name.clone(),
                },
                start,
                cur.pos(),
            );
            return None;
        };

        let (attributes, cur) = self.parse_attributes(cur, ctx)?;
        let ((), cur) = self.expect_line_end(cur)?;
        Some((
            Term {
                id,
                value,
                attributes,
                comment: None,
                span: Some(Span::new(start, cur.pos())),
            },
            cur,
        ))
    }

    /// Zero or more `.attr = pattern` lines following an entry value.
    fn parse_attributes(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, Vec<Attribute>> {
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut cur = cursor;

        loop {
            if cur.current() != Some('\n') {
                break;
            }
            let probe = skip_blank(cur);
            if probe.current() != Some('.') {
                break;
            }

            let c = probe.advance();
            let (id, c) = self.parse_identifier(c)?;
            let c = skip_blank_inline(c);
            if c.current() != Some('=') {
                self.report(ParseErrorKind::ExpectedChar { expected: '=' }, c.pos(), c.pos());
                return None;
            }
            let (content, indent) = skip_multiline_pattern_start(c.advance());
            let (value, c) = self.parse_pattern(content, ctx, (indent > 0).then_some(indent))?;
            let Some(value) = value else {
                self.report(ParseErrorKind::ExpectedValue, probe.pos(), c.pos());
                return None;
            };
            attributes.push(Attribute { id, value });
            cur = c;
        }

        Some((attributes, cur))
    }

    /// After an entry, only trailing spaces may precede the newline or EOF.
    fn expect_line_end(&mut self, cursor: Cursor<'s>) -> Parsed<'s, ()> {
        let cur = skip_blank_inline(cursor);
        match cur.current() {
            None | Some('\n') => Some(((), cur)),
            _ => {
                self.report(
                    ParseErrorKind::ExpectedToken {
                        expected: "line end",
                    },
                    cur.pos(),
                    cur.pos(),
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Junk recovery
    // ------------------------------------------------------------------

    /// Consume the invalid fragment and append a junk entry for it.
    ///
    /// Per the Fluent grammar, junk eats the first invalid line and then
    /// whole lines until one starts (at column zero) with `#`, `-`, or an
    /// ASCII letter. That keeps multi-line errors together without losing
    /// the entries after them.
    fn push_junk(
        &mut self,
        entries: &mut Vec<Entry>,
        entry_start: usize,
        cursor: Cursor<'s>,
    ) -> Cursor<'s> {
        let mut cur = cursor.advance_to(cursor.line_end());
        if cur.current() == Some('\n') {
            cur = cur.advance();
        }
        loop {
            match cur.current() {
                None => break,
                Some(c) if c == '#' || c == '-' || c.is_ascii_alphabetic() => break,
                _ => {
                    cur = cur.advance_to(cur.line_end());
                    if cur.current() == Some('\n') {
                        cur = cur.advance();
                    }
                }
            }
        }

        let annotations = if self.errors.is_empty() {
            let error = ParseError::new(
                ParseErrorKind::ExpectedEntry,
                Span::new(entry_start, entry_start),
            );
            vec![Annotation::from_parse_error(&error)]
        } else {
            self.errors.iter().map(Annotation::from_parse_error).collect()
        };

        entries.push(Entry::Junk(Junk {
            content: cursor.slice(entry_start, cur.pos()).to_string(),
            annotations,
            span: Some(Span::new(entry_start, cur.pos())),
        }));
        cur
    }
}

/// Skip blank lines between entries without consuming the indentation of a
/// content line: the cursor lands at the start of the next line that has
/// content. An indented content line is left intact (leading spaces and
/// all) so the junk rule can preserve it verbatim.
fn skip_blank_block(cursor: Cursor<'_>) -> Cursor<'_> {
    let mut line_start = cursor;
    loop {
        let probe = line_start.skip_spaces();
        match probe.current() {
            Some('\n') => line_start = probe.advance(),
            None => return probe,
            Some(_) => return line_start,
        }
    }
}
