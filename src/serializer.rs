//! AST -> FTL source.
//!
//! The serializer guarantees, for any junk-free resource `r` produced by
//! the parser:
//!
//! - `parse(serialize(r))` equals `r` in content (spans aside), and
//! - serializing that reparse is byte-identical (stability).
//!
//! Pattern values always start inline after `=`; continuation lines are
//! emitted at a fixed indent, which reparses to the same dedented content
//! because the parser takes its common indent from the first continuation
//! line. Text that the parser could never have produced — braces, control
//! characters, leading whitespace, `[`/`*`/`.` at line starts — can only
//! appear in programmatically built trees; it is emitted as string-literal
//! placeables so the *formatted* output survives a reparse, at the cost of
//! that text element splitting into literal placeables.
//!
//! Identifiers are re-validated before emission and a depth guard mirrors
//! the parser's, sized for programmatically built trees.

use thiserror::Error;

use crate::ast::{
    Attribute, CallArguments, Comment, CommentKind, Entry, Expression, InlineExpression, Message,
    Pattern, PatternElement, Placeable, Resource, SelectExpression, Term, TextElement, VariantKey,
};
use crate::error::ValidationReport;
use crate::parser::primitives::is_valid_identifier;
use crate::validator::validate;
use crate::visitor::{DepthLimitError, VisitDepth};
use crate::SERIALIZER_MAX_DEPTH;

#[derive(Debug, Clone, Error)]
pub enum SerializeError {
    #[error("serialization depth exceeded: {0}")]
    Depth(#[from] DepthLimitError),
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier { name: String },
    #[error("resource failed validation with {} error(s)", report.errors.len())]
    Validation { report: ValidationReport },
}

/// Serialize a resource with default settings.
pub fn serialize(resource: &Resource) -> Result<String, SerializeError> {
    Serializer::new().serialize(resource)
}

/// Validate, then serialize. Validation errors abort before any output.
pub fn serialize_validated(resource: &Resource) -> Result<String, SerializeError> {
    let report = validate(resource);
    if !report.is_valid() {
        return Err(SerializeError::Validation { report });
    }
    serialize(resource)
}

pub struct Serializer {
    depth: VisitDepth,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            depth: VisitDepth::with_limit(SERIALIZER_MAX_DEPTH),
        }
    }

    pub fn serialize(&mut self, resource: &Resource) -> Result<String, SerializeError> {
        let mut parts: Vec<String> = Vec::with_capacity(resource.entries.len());
        for entry in &resource.entries {
            parts.push(self.serialize_entry(entry)?);
        }
        // One blank line between entries keeps standalone comments from
        // merging with or attaching to their neighbors on reparse.
        Ok(parts.join("\n"))
    }

    pub fn serialize_entry(&mut self, entry: &Entry) -> Result<String, SerializeError> {
        let mut out = String::new();
        match entry {
            Entry::Message(m) => self.write_message(m, &mut out)?,
            Entry::Term(t) => self.write_term(t, &mut out)?,
            Entry::Comment(c) => write_comment(c, &mut out),
            Entry::Junk(j) => {
                out.push_str(&j.content);
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }

    fn write_message(&mut self, message: &Message, out: &mut String) -> Result<(), SerializeError> {
        if let Some(comment) = &message.comment {
            write_comment(comment, out);
        }
        check_identifier(&message.id.name)?;
        out.push_str(&message.id.name);
        out.push_str(" =");
        if let Some(value) = &message.value {
            self.write_pattern_value(value, 4, out)?;
        }
        for attr in &message.attributes {
            self.write_attribute(attr, out)?;
        }
        out.push('\n');
        Ok(())
    }

    fn write_term(&mut self, term: &Term, out: &mut String) -> Result<(), SerializeError> {
        if let Some(comment) = &term.comment {
            write_comment(comment, out);
        }
        check_identifier(&term.id.name)?;
        out.push('-');
        out.push_str(&term.id.name);
        out.push_str(" =");
        self.write_pattern_value(&term.value, 4, out)?;
        for attr in &term.attributes {
            self.write_attribute(attr, out)?;
        }
        out.push('\n');
        Ok(())
    }

    fn write_attribute(&mut self, attr: &Attribute, out: &mut String) -> Result<(), SerializeError> {
        check_identifier(&attr.id.name)?;
        out.push_str("\n    .");
        out.push_str(&attr.id.name);
        out.push_str(" =");
        self.write_pattern_value(&attr.value, 8, out)?;
        Ok(())
    }

    /// Write the separator and the pattern.
    ///
    /// Layout is chosen from content: when the first continuation line of
    /// the value carries leading spaces (possible only for values parsed
    /// from a `key =\n    value` layout), the value must go back on its own
    /// line — the parser takes the common indent from the first
    /// continuation of an inline-started pattern, which would swallow those
    /// spaces. Everything else starts inline after the `=`.
    fn write_pattern_value(
        &mut self,
        pattern: &Pattern,
        indent: usize,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        self.depth.enter()?;
        let multiline_start = needs_multiline_start(pattern);
        if multiline_start {
            out.push('\n');
            push_spaces(out, indent);
        } else {
            out.push(' ');
        }
        let result = self.write_pattern_inner(pattern, indent, multiline_start, out);
        self.depth.exit();
        result
    }

    fn write_pattern_inner(
        &mut self,
        pattern: &Pattern,
        indent: usize,
        multiline_start: bool,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        let mut state = TextState::at_pattern_start(multiline_start);
        let last = pattern.elements.len().saturating_sub(1);
        for (i, el) in pattern.elements.iter().enumerate() {
            match el {
                PatternElement::Text(t) => {
                    write_text(t, indent, i == last, &mut state, out);
                }
                PatternElement::Placeable(p) => {
                    self.write_placeable(p, indent, out)?;
                    state.leave_line_start();
                }
            }
        }
        Ok(())
    }

    fn write_placeable(
        &mut self,
        placeable: &Placeable,
        indent: usize,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        self.depth.enter()?;
        let result = match &placeable.expression {
            Expression::Inline(expr) => {
                out.push_str("{ ");
                self.write_inline(expr, indent, out)
                    .map(|()| out.push_str(" }"))
            }
            Expression::Select(select) => self.write_select(select, indent, out),
        };
        self.depth.exit();
        result
    }

    fn write_select(
        &mut self,
        select: &SelectExpression,
        indent: usize,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        out.push_str("{ ");
        self.write_inline(&select.selector, indent, out)?;
        out.push_str(" ->\n");
        for variant in &select.variants {
            if variant.default {
                push_spaces(out, (indent + 4).saturating_sub(1));
                out.push('*');
            } else {
                push_spaces(out, indent + 4);
            }
            out.push('[');
            match &variant.key {
                VariantKey::Identifier(id) => {
                    check_identifier(&id.name)?;
                    out.push_str(&id.name);
                }
                VariantKey::Number(n) => out.push_str(&n.raw),
            }
            out.push(']');
            self.write_pattern_value(&variant.value, indent + 8, out)?;
            out.push('\n');
        }
        push_spaces(out, indent);
        out.push('}');
        Ok(())
    }

    fn write_inline(
        &mut self,
        expr: &InlineExpression,
        indent: usize,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        match expr {
            InlineExpression::StringLiteral { raw, .. } => {
                out.push('"');
                out.push_str(raw);
                out.push('"');
            }
            InlineExpression::NumberLiteral(n) => out.push_str(&n.raw),
            InlineExpression::MessageReference { id, attribute } => {
                check_identifier(&id.name)?;
                out.push_str(&id.name);
                if let Some(attr) = attribute {
                    check_identifier(&attr.name)?;
                    out.push('.');
                    out.push_str(&attr.name);
                }
            }
            InlineExpression::TermReference {
                id,
                attribute,
                arguments,
            } => {
                check_identifier(&id.name)?;
                out.push('-');
                out.push_str(&id.name);
                if let Some(attr) = attribute {
                    check_identifier(&attr.name)?;
                    out.push('.');
                    out.push_str(&attr.name);
                }
                if let Some(args) = arguments {
                    self.write_call_arguments(args, indent, out)?;
                }
            }
            InlineExpression::VariableReference { id } => {
                check_identifier(&id.name)?;
                out.push('$');
                out.push_str(&id.name);
            }
            InlineExpression::FunctionReference { id, arguments } => {
                check_function_name(&id.name)?;
                out.push_str(&id.name);
                self.write_call_arguments(arguments, indent, out)?;
            }
            InlineExpression::Placeable(p) => self.write_placeable(p, indent, out)?,
        }
        Ok(())
    }

    fn write_call_arguments(
        &mut self,
        args: &CallArguments,
        indent: usize,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        out.push('(');
        let mut first = true;
        for pos in &args.positional {
            if !first {
                out.push_str(", ");
            }
            first = false;
            self.write_inline(pos, indent, out)?;
        }
        for named in &args.named {
            if !first {
                out.push_str(", ");
            }
            first = false;
            check_identifier(&named.name.name)?;
            out.push_str(&named.name.name);
            out.push_str(": ");
            self.write_inline(&named.value, indent, out)?;
        }
        out.push(')');
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), SerializeError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(SerializeError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

fn check_function_name(name: &str) -> Result<(), SerializeError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SerializeError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

fn push_spaces(out: &mut String, n: usize) {
    out.extend(std::iter::repeat(' ').take(n));
}

/// Emit one string-literal placeable holding `content` (already escaped for
/// a string literal body).
fn push_literal(out: &mut String, content: &str) {
    out.push_str("{ \"");
    out.push_str(content);
    out.push_str("\" }");
}

/// Decide pattern layout: does the content after the pattern's first
/// newline begin with a space? Only values parsed from `key =\n    value`
/// layouts can look like that, and only the value-on-next-line layout
/// reparses them losslessly.
fn needs_multiline_start(pattern: &Pattern) -> bool {
    for el in &pattern.elements {
        if let PatternElement::Text(t) = el {
            if let Some(idx) = t.value.find('\n') {
                return t.value[idx + 1..].starts_with(' ');
            }
        }
    }
    false
}

/// Escape state threaded through a pattern's text elements.
struct TextState {
    /// Nothing emitted for this pattern yet. Leading spaces and newlines
    /// here would be swallowed by the parser.
    pattern_start: bool,
    /// Only whitespace emitted since the last newline. `[`, `*`, `.` here
    /// would read as variant/attribute markers.
    line_start: bool,
    /// In inline layout the common indent comes from the first continuation
    /// line, so that line's leading spaces (programmatic trees only) need
    /// escaping. Irrelevant in multiline layout, where the indent is fixed
    /// by the first value line.
    first_continuation_pending: bool,
}

impl TextState {
    fn at_pattern_start(multiline_start: bool) -> Self {
        Self {
            pattern_start: true,
            line_start: multiline_start,
            first_continuation_pending: !multiline_start,
        }
    }

    fn leave_line_start(&mut self) {
        self.pattern_start = false;
        self.line_start = false;
    }
}

/// Write a text element.
///
/// For text that came out of the parser, every branch below except the
/// plain-character one is unreachable — which is exactly why serializing a
/// parsed tree reparses to an equal tree. The escape branches preserve the
/// formatted output of programmatically built trees.
fn write_text(
    text: &TextElement,
    indent: usize,
    is_last: bool,
    state: &mut TextState,
    out: &mut String,
) {
    let value = text.value.as_str();

    // The parser trims trailing spaces and newlines from a pattern; any
    // such run on the final element must be emitted as literals.
    let (body, trailing) = if is_last {
        let kept = value.trim_end_matches([' ', '\n']);
        (kept, &value[kept.len()..])
    } else {
        (value, "")
    };

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\n' if state.pattern_start => {
                match c {
                    ' ' => {
                        let mut run = String::from(' ');
                        while chars.peek() == Some(&' ') {
                            run.push(' ');
                            chars.next();
                        }
                        push_literal(out, &run);
                    }
                    _ => push_literal(out, "\\u000A"),
                }
                // Still at pattern start: further leading whitespace also
                // needs escaping.
            }
            '\n' => {
                out.push('\n');
                push_spaces(out, indent);
                state.line_start = true;
                if state.first_continuation_pending {
                    state.first_continuation_pending = false;
                    // Leading spaces on this first continuation line would
                    // inflate the common indent.
                    if chars.peek() == Some(&' ') {
                        let mut run = String::new();
                        while chars.peek() == Some(&' ') {
                            run.push(' ');
                            chars.next();
                        }
                        push_literal(out, &run);
                        state.line_start = false;
                    }
                }
            }
            '[' | '*' | '.' if state.line_start => {
                push_literal(out, &c.to_string());
                state.leave_line_start();
            }
            '{' => {
                push_literal(out, "{");
                state.leave_line_start();
            }
            '}' => {
                push_literal(out, "}");
                state.leave_line_start();
            }
            c if (c as u32) < 0x20 && c != '\t' => {
                push_literal(out, &format!("\\u{:04X}", c as u32));
                state.leave_line_start();
            }
            ' ' => {
                out.push(' ');
                state.pattern_start = false;
            }
            c => {
                out.push(c);
                state.leave_line_start();
            }
        }
    }

    for c in trailing.chars() {
        match c {
            ' ' => push_literal(out, " "),
            _ => push_literal(out, "\\u000A"),
        }
    }
    if !trailing.is_empty() {
        state.leave_line_start();
    }
}

fn write_comment(comment: &Comment, out: &mut String) {
    let marker = match comment.kind {
        CommentKind::Standalone => "#",
        CommentKind::Group => "##",
        CommentKind::Resource => "###",
    };
    for line in comment.content.split('\n') {
        out.push_str(marker);
        if !line.is_empty() {
            out.push(' ');
            out.push_str(line);
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ContentHash;
    use crate::parser::parse;

    fn roundtrip(src: &str) {
        let first = parse(src);
        let serialized = serialize(&first).expect("serialize");
        let second = parse(&serialized);
        assert_eq!(
            first.content_hash(),
            second.content_hash(),
            "roundtrip changed content:\n--- source ---\n{src}\n--- serialized ---\n{serialized}\n--- first ---\n{first:#?}\n--- second ---\n{second:#?}"
        );
        // Stability: a second roundtrip is byte-identical.
        let reserialized = serialize(&second).expect("serialize twice");
        assert_eq!(serialized, reserialized);
    }

    #[test]
    fn roundtrips_simple_messages() {
        roundtrip("hello = Hello, world!\n");
        roundtrip("a = one\nb = two\nc = three\n");
    }

    #[test]
    fn roundtrips_placeables() {
        roundtrip("greeting = Hello, { $name }!\n");
        roundtrip("m = { \"literal\" } and { 3.14 } and { msg.attr }\n");
        roundtrip("m = { -brand(case: \"genitive\", n: 4) }\n");
    }

    #[test]
    fn roundtrips_multiline_patterns() {
        roundtrip("key =\n    first\n    second\n");
        roundtrip("key = inline\n    continued\n");
        roundtrip("key =\n    first\n        deeper\n");
        roundtrip("key =\n    first\n\n    after-blank\n");
    }

    #[test]
    fn roundtrips_text_starting_with_bracket() {
        roundtrip("key = [not a variant]\n");
        roundtrip("key = *bold*\n");
    }

    #[test]
    fn roundtrips_attributes() {
        roundtrip("login = Log in\n    .title = Sign in\n    .aria = Authenticate\n");
        roundtrip("only-attrs =\n    .a = one\n    .b = two\n");
    }

    #[test]
    fn roundtrips_terms() {
        roundtrip("-brand = Firefox\nabout = About { -brand }\n");
    }

    #[test]
    fn roundtrips_selects() {
        roundtrip(
            "emails = You have { $count ->\n    [one] one email\n   *[other] { $count } emails\n }.\n",
        );
        roundtrip("m = { $n ->\n    [0] zero\n    [1] one\n   *[other] more\n }\n");
    }

    #[test]
    fn roundtrips_nested_select_in_variant() {
        roundtrip("m = { $a ->\n   *[x] { $b ->\n       *[y] inner\n    }\n }\n");
    }

    #[test]
    fn roundtrips_comments() {
        roundtrip("# standalone\n\nmsg = value\n");
        roundtrip("# attached\nmsg = value\n");
        roundtrip("## group\n\n### resource\n");
        roundtrip("# line one\n# line two\n");
    }

    #[test]
    fn roundtrips_functions() {
        roundtrip("m = { NUMBER($ratio, minimumFractionDigits: 2) }\n");
        roundtrip("m = { DATETIME($when, dateStyle: \"short\") }\n");
    }

    #[test]
    fn roundtrips_string_literal_escapes() {
        roundtrip(r#"m = { "say \"hi\" \\ é \U01F602" }"#);
    }

    #[test]
    fn braces_in_text_are_escaped() {
        let resource = parse("m = literal {\"{\"} and {\"}\"} braces\n");
        let serialized = serialize(&resource).unwrap();
        let second = parse(&serialized);
        assert_eq!(resource.content_hash(), second.content_hash());
    }

    #[test]
    fn programmatic_text_with_braces_survives_formatting() {
        use crate::ast::{Identifier, Message, Pattern, PatternElement, TextElement};
        let resource = Resource {
            entries: vec![Entry::Message(Message {
                id: Identifier::new("m"),
                value: Some(Pattern::new(vec![PatternElement::Text(TextElement::new(
                    "a { b } c",
                ))])),
                attributes: vec![],
                comment: None,
                span: None,
            })],
        };
        let serialized = serialize(&resource).unwrap();
        let reparsed = parse(&serialized);
        // The braces split into literal placeables, but the formatted
        // output is preserved.
        match &reparsed.entries[0] {
            Entry::Message(m) => {
                let text: String = m
                    .value
                    .as_ref()
                    .unwrap()
                    .elements
                    .iter()
                    .map(|el| match el {
                        PatternElement::Text(t) => t.value.clone(),
                        PatternElement::Placeable(p) => match &p.expression {
                            Expression::Inline(InlineExpression::StringLiteral {
                                value, ..
                            }) => value.clone(),
                            other => panic!("unexpected {other:?}"),
                        },
                    })
                    .collect();
                assert_eq!(text, "a { b } c");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn junk_serializes_verbatim() {
        let resource = parse("!! not ftl !!\nok = yes\n");
        let serialized = serialize(&resource).unwrap();
        assert!(serialized.contains("!! not ftl !!"));
        assert!(serialized.contains("ok = yes"));
    }

    #[test]
    fn invalid_identifier_is_an_error() {
        use crate::ast::{Identifier, Message, Pattern};
        let resource = Resource {
            entries: vec![Entry::Message(Message {
                id: Identifier::new("not valid!"),
                value: Some(Pattern::default()),
                attributes: vec![],
                comment: None,
                span: None,
            })],
        };
        assert!(matches!(
            serialize(&resource),
            Err(SerializeError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn serialize_validated_rejects_bad_selects() {
        let resource = parse("m = { $n ->\n    [one] one\n    [two] two\n }\n");
        assert!(matches!(
            serialize_validated(&resource),
            Err(SerializeError::Validation { .. })
        ));
        assert!(serialize(&resource).is_ok());
    }

    #[test]
    fn depth_guard_stops_pathological_trees() {
        use crate::ast::{Expression, Identifier, InlineExpression, Message, Placeable};
        let mut expr = InlineExpression::VariableReference {
            id: Identifier::new("x"),
        };
        for _ in 0..(SERIALIZER_MAX_DEPTH + 10) {
            expr = InlineExpression::Placeable(Box::new(Placeable {
                expression: Expression::Inline(expr),
            }));
        }
        let resource = Resource {
            entries: vec![Entry::Message(Message {
                id: Identifier::new("m"),
                value: Some(Pattern::new(vec![PatternElement::Placeable(Placeable {
                    expression: Expression::Inline(expr),
                })])),
                attributes: vec![],
                comment: None,
                span: None,
            })],
        };
        assert!(matches!(
            serialize(&resource),
            Err(SerializeError::Depth(_))
        ));
    }
}
