//! Pattern and expression rules: text runs, placeables, inline expressions,
//! select expressions, and call arguments.

use super::whitespace::{
    is_indented_continuation, skip_blank, skip_blank_inline, skip_multiline_pattern_start,
};
use super::{ParseContext, Parsed, Parser};
use crate::ast::{
    CallArguments, Expression, Identifier, InlineExpression, NamedArgument, Pattern,
    PatternElement, Placeable, SelectExpression, TextElement, Variant, VariantKey,
};
use crate::cursor::Cursor;
use crate::error::ParseErrorKind;

use super::primitives::is_identifier_start;

impl<'s> Parser<'s> {
    /// Parse a pattern starting at `cursor`.
    ///
    /// `initial_indent` is the common indent established when the pattern
    /// value started on its own line (`key =\n    value`); patterns that
    /// start inline establish it from their first continuation line. Every
    /// continuation strips exactly the common indent; deeper indentation is
    /// preserved as text.
    ///
    /// Returns `Some((None, _))` for an empty pattern. Returns `None` only
    /// when an inner placeable fails, which junks the whole entry.
    pub(super) fn parse_pattern(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
        initial_indent: Option<usize>,
    ) -> Parsed<'s, Option<Pattern>> {
        let mut elements: Vec<PatternElement> = Vec::new();
        let mut text = String::new();
        let mut common_indent = initial_indent;
        let mut cur = cursor;

        loop {
            match cur.current() {
                None => break,
                Some('\n') => {
                    if !is_indented_continuation(cur) {
                        break;
                    }
                    // Interior blank lines are part of the pattern.
                    let mut probe = cur;
                    let mut newlines = 0usize;
                    while probe.current() == Some('\n') {
                        newlines += 1;
                        probe = probe.advance();
                    }
                    let mut spaces = 0usize;
                    while probe.current() == Some(' ') {
                        spaces += 1;
                        probe = probe.advance();
                    }
                    let indent = *common_indent.get_or_insert(spaces);
                    text.extend(std::iter::repeat('\n').take(newlines));
                    if spaces > indent {
                        text.extend(std::iter::repeat(' ').take(spaces - indent));
                    }
                    cur = probe;
                }
                Some('{') => {
                    if !text.is_empty() {
                        elements.push(PatternElement::Text(TextElement::new(std::mem::take(
                            &mut text,
                        ))));
                    }
                    let (placeable, next) = self.parse_placeable(cur, ctx)?;
                    elements.push(PatternElement::Placeable(placeable));
                    cur = next;
                }
                Some('}') => break,
                Some(_) => {
                    let run_start = cur.pos();
                    while !matches!(cur.current(), None | Some('\n') | Some('{') | Some('}')) {
                        cur = cur.advance();
                    }
                    text.push_str(cur.slice(run_start, cur.pos()));
                }
            }
        }

        // Trailing spaces and newlines on the final text fragment belong to
        // the entry separator, not the value.
        let trimmed_len = text.trim_end_matches([' ', '\n']).len();
        text.truncate(trimmed_len);
        if !text.is_empty() {
            elements.push(PatternElement::Text(TextElement::new(text)));
        }

        if elements.is_empty() {
            return Some((None, cur));
        }
        let pattern = Pattern::new(elements);
        Some((if pattern.is_empty() { None } else { Some(pattern) }, cur))
    }

    /// `{ blank? Expression blank? }` with depth accounting.
    pub(super) fn parse_placeable(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, Placeable> {
        let ctx = ctx.enter_placeable();
        if ctx.is_depth_exceeded() {
            self.report(
                ParseErrorKind::NestingTooDeep {
                    limit: ctx.max_nesting_depth(),
                },
                cursor.pos(),
                cursor.pos(),
            );
            return None;
        }

        let cur = skip_blank(cursor.advance());
        let (expression, cur) = self.parse_expression(cur, ctx)?;
        let cur = skip_blank(cur);
        if cur.current() != Some('}') {
            self.report(
                ParseErrorKind::ExpectedChar { expected: '}' },
                cur.pos(),
                cur.pos(),
            );
            return None;
        }
        Some((Placeable { expression }, cur.advance()))
    }

    /// An inline expression, optionally continued by `->` into a select.
    fn parse_expression(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, Expression> {
        let (inline, cur) = self.parse_inline_expression(cursor, ctx)?;
        let after = skip_blank_inline(cur);
        if !after.starts_with("->") {
            return Some((Expression::Inline(inline), cur));
        }

        // Selector restrictions: message references (their values are
        // patterns, not keys) and bare term references are not selectable;
        // term attributes are.
        match &inline {
            InlineExpression::MessageReference { .. }
            | InlineExpression::TermReference {
                attribute: None, ..
            }
            | InlineExpression::Placeable(_) => {
                self.report(ParseErrorKind::InvalidSelector, cursor.pos(), after.pos());
                return None;
            }
            _ => {}
        }

        let cur = skip_blank_inline(after.advance_n(2));
        if cur.current() != Some('\n') {
            self.report(
                ParseErrorKind::ExpectedToken {
                    expected: "line end",
                },
                cur.pos(),
                cur.pos(),
            );
            return None;
        }

        let (variants, cur) = self.parse_variant_list(cur, ctx)?;
        Some((
            Expression::Select(SelectExpression {
                selector: Box::new(inline),
                variants,
            }),
            cur,
        ))
    }

    /// Variants, one per line, until the closing brace of the select.
    fn parse_variant_list(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, Vec<Variant>> {
        let mut variants: Vec<Variant> = Vec::new();
        let mut cur = cursor;

        loop {
            let probe = skip_blank(cur);
            match probe.current() {
                Some('*') | Some('[') => {
                    let default = probe.current() == Some('*');
                    let mut c = probe;
                    if default {
                        c = c.advance();
                        if c.current() != Some('[') {
                            self.report(
                                ParseErrorKind::ExpectedChar { expected: '[' },
                                c.pos(),
                                c.pos(),
                            );
                            return None;
                        }
                    }
                    c = skip_blank_inline(c.advance());
                    let (key, c) = self.parse_variant_key(c)?;
                    let c = skip_blank_inline(c);
                    if c.current() != Some(']') {
                        self.report(
                            ParseErrorKind::ExpectedChar { expected: ']' },
                            c.pos(),
                            c.pos(),
                        );
                        return None;
                    }

                    let c = skip_blank_inline(c.advance());
                    let (content, indent) = skip_multiline_pattern_start(c);
                    let (value, c) =
                        self.parse_pattern(content, ctx, (indent > 0).then_some(indent))?;
                    let Some(value) = value else {
                        self.report(ParseErrorKind::ExpectedValue, probe.pos(), c.pos());
                        return None;
                    };

                    variants.push(Variant {
                        key,
                        value,
                        default,
                    });
                    cur = c;
                }
                Some('}') => {
                    cur = probe;
                    break;
                }
                _ => {
                    self.report(ParseErrorKind::ExpectedVariantKey, probe.pos(), probe.pos());
                    return None;
                }
            }
        }

        if variants.is_empty() {
            self.report(ParseErrorKind::MissingVariants, cursor.pos(), cur.pos());
            return None;
        }
        Some((variants, cur))
    }

    fn parse_variant_key(&mut self, cursor: Cursor<'s>) -> Parsed<'s, VariantKey> {
        match cursor.current() {
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let (number, cur) = self.parse_number(cursor)?;
                Some((VariantKey::Number(number), cur))
            }
            Some(c) if is_identifier_start(c) => {
                let (id, cur) = self.parse_identifier(cursor)?;
                Some((VariantKey::Identifier(id), cur))
            }
            _ => {
                self.report(ParseErrorKind::ExpectedVariantKey, cursor.pos(), cursor.pos());
                None
            }
        }
    }

    pub(super) fn parse_inline_expression(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, InlineExpression> {
        match cursor.current() {
            Some('"') => {
                let ((value, raw), cur) = self.parse_string_literal(cursor)?;
                Some((InlineExpression::StringLiteral { value, raw }, cur))
            }
            Some(c) if c.is_ascii_digit() => {
                let (number, cur) = self.parse_number(cursor)?;
                Some((InlineExpression::NumberLiteral(number), cur))
            }
            Some('-') if matches!(cursor.peek(1), Some(c) if c.is_ascii_digit()) => {
                let (number, cur) = self.parse_number(cursor)?;
                Some((InlineExpression::NumberLiteral(number), cur))
            }
            Some('$') => {
                let (id, cur) = self.parse_identifier(cursor.advance())?;
                Some((InlineExpression::VariableReference { id }, cur))
            }
            Some('-') if matches!(cursor.peek(1), Some(c) if is_identifier_start(c)) => {
                self.parse_term_reference(cursor, ctx)
            }
            Some('{') => {
                let (placeable, cur) = self.parse_placeable(cursor, ctx)?;
                Some((InlineExpression::Placeable(Box::new(placeable)), cur))
            }
            Some(c) if is_identifier_start(c) => {
                let (id, cur) = self.parse_identifier(cursor)?;
                if cur.current() == Some('(') {
                    return self.parse_function_reference(id, cursor.pos(), cur, ctx);
                }
                let (attribute, cur) = self.parse_attribute_accessor(cur)?;
                Some((InlineExpression::MessageReference { id, attribute }, cur))
            }
            _ => {
                self.report(
                    ParseErrorKind::ExpectedExpression,
                    cursor.pos(),
                    cursor.pos(),
                );
                None
            }
        }
    }

    /// `-id`, optionally `.attr`, optionally `(args)`.
    fn parse_term_reference(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, InlineExpression> {
        let (id, cur) = self.parse_identifier(cursor.advance())?;
        let (attribute, cur) = self.parse_attribute_accessor(cur)?;
        let (arguments, cur) = if cur.current() == Some('(') {
            let (args, cur) = self.parse_call_arguments(cur, ctx)?;
            (Some(args), cur)
        } else {
            (None, cur)
        };
        Some((
            InlineExpression::TermReference {
                id,
                attribute,
                arguments,
            },
            cur,
        ))
    }

    /// `.attr` after a message or term reference.
    fn parse_attribute_accessor(&mut self, cursor: Cursor<'s>) -> Parsed<'s, Option<Identifier>> {
        if cursor.current() == Some('.') {
            let (id, cur) = self.parse_identifier(cursor.advance())?;
            Some((Some(id), cur))
        } else {
            Some((None, cursor))
        }
    }

    /// Function names are uppercase by convention and by grammar:
    /// `[A-Z][A-Z0-9_-]*`.
    fn parse_function_reference(
        &mut self,
        id: Identifier,
        start: usize,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, InlineExpression> {
        let valid = id.name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && id
                .name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            self.report(
                ParseErrorKind::InvalidFunctionName {
                    name: id.name.clone(),
                },
                start,
                cursor.pos(),
            );
            return None;
        }
        let (arguments, cur) = self.parse_call_arguments(cursor, ctx)?;
        Some((InlineExpression::FunctionReference { id, arguments }, cur))
    }

    /// `( blank? arguments blank? )` — `blank`, not `blank_inline`, so call
    /// arguments may be formatted across lines.
    fn parse_call_arguments(
        &mut self,
        cursor: Cursor<'s>,
        ctx: ParseContext,
    ) -> Parsed<'s, CallArguments> {
        let mut cur = skip_blank(cursor.advance()); // '('
        let mut positional: Vec<InlineExpression> = Vec::new();
        let mut named: Vec<NamedArgument> = Vec::new();

        loop {
            if cur.current() == Some(')') {
                cur = cur.advance();
                break;
            }
            if cur.is_eof() {
                self.report(
                    ParseErrorKind::ExpectedChar { expected: ')' },
                    cur.pos(),
                    cur.pos(),
                );
                return None;
            }

            let (expr, next) = self.parse_inline_expression(cur, ctx)?;
            let after = skip_blank(next);

            if after.current() == Some(':') {
                // Named argument: the "expression" must have been a bare
                // identifier, and the value must be a literal.
                let name = match expr {
                    InlineExpression::MessageReference {
                        id,
                        attribute: None,
                    } => id,
                    _ => {
                        self.report(
                            ParseErrorKind::ExpectedToken {
                                expected: "argument name",
                            },
                            cur.pos(),
                            after.pos(),
                        );
                        return None;
                    }
                };
                let value_cursor = skip_blank(after.advance());
                let (value, next) = self.parse_inline_expression(value_cursor, ctx)?;
                if !matches!(
                    value,
                    InlineExpression::StringLiteral { .. } | InlineExpression::NumberLiteral(_)
                ) {
                    self.report(
                        ParseErrorKind::ExpectedLiteralArgument,
                        value_cursor.pos(),
                        next.pos(),
                    );
                    return None;
                }
                named.push(NamedArgument { name, value });
                cur = skip_blank(next);
            } else {
                positional.push(expr);
                cur = after;
            }

            match cur.current() {
                Some(',') => cur = skip_blank(cur.advance()),
                Some(')') => {}
                _ => {
                    self.report(
                        ParseErrorKind::ExpectedToken {
                            expected: "',' or ')'",
                        },
                        cur.pos(),
                        cur.pos(),
                    );
                    return None;
                }
            }
        }

        Some((CallArguments { positional, named }, cur))
    }
}
