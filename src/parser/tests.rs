use crate::ast::{
    CommentKind, Entry, Expression, InlineExpression, NumberValue, PatternElement, VariantKey,
};
use crate::error::DiagnosticCode;
use crate::parser::{parse, parse_with_options, ParseOptions};

fn only_message(source: &str) -> crate::ast::Message {
    let resource = parse(source);
    assert_eq!(resource.entries.len(), 1, "entries: {:?}", resource.entries);
    match resource.entries.into_iter().next().unwrap() {
        Entry::Message(m) => m,
        other => panic!("expected message, got {other:?}"),
    }
}

fn pattern_text(pattern: &crate::ast::Pattern) -> String {
    pattern
        .elements
        .iter()
        .map(|el| match el {
            PatternElement::Text(t) => t.value.clone(),
            PatternElement::Placeable(_) => "{…}".to_string(),
        })
        .collect()
}

#[test]
fn simple_message() {
    let m = only_message("hello = Hello, world!");
    assert_eq!(m.id.name, "hello");
    assert_eq!(pattern_text(m.value.as_ref().unwrap()), "Hello, world!");
}

#[test]
fn trailing_spaces_are_trimmed() {
    let m = only_message("hello = Hello   ");
    assert_eq!(pattern_text(m.value.as_ref().unwrap()), "Hello");
}

#[test]
fn message_with_placeable_variable() {
    let m = only_message("greeting = Hello, { $name }!");
    let pattern = m.value.unwrap();
    assert_eq!(pattern.elements.len(), 3);
    match &pattern.elements[1] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::VariableReference { id }) => {
                assert_eq!(id.name, "name")
            }
            other => panic!("expected variable, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn multiline_pattern_value_on_next_line() {
    let m = only_message("key =\n    first line\n    second line");
    assert_eq!(
        pattern_text(m.value.as_ref().unwrap()),
        "first line\nsecond line"
    );
}

#[test]
fn multiline_pattern_preserves_deeper_indent() {
    let m = only_message("key =\n    first\n        deep");
    assert_eq!(pattern_text(m.value.as_ref().unwrap()), "first\n    deep");
}

#[test]
fn multiline_pattern_keeps_interior_blank_lines() {
    let m = only_message("key =\n    first\n\n    second");
    assert_eq!(pattern_text(m.value.as_ref().unwrap()), "first\n\nsecond");
}

#[test]
fn inline_start_with_continuation() {
    let m = only_message("key = first\n    second");
    assert_eq!(pattern_text(m.value.as_ref().unwrap()), "first\nsecond");
}

#[test]
fn message_attributes() {
    let m = only_message("login = Log in\n    .title = Sign in to your account\n    .aria = Login");
    assert_eq!(m.attributes.len(), 2);
    assert_eq!(m.attributes[0].id.name, "title");
    assert_eq!(
        pattern_text(&m.attributes[0].value),
        "Sign in to your account"
    );
    assert_eq!(m.attributes[1].id.name, "aria");
}

#[test]
fn message_with_only_attributes() {
    let m = only_message("login =\n    .title = Sign in");
    assert!(m.value.is_none());
    assert_eq!(m.attributes.len(), 1);
}

#[test]
fn term_requires_value() {
    let resource = parse("-brand =\n");
    assert!(matches!(resource.entries[0], Entry::Junk(_)));

    let resource = parse("-brand = Firefox");
    match &resource.entries[0] {
        Entry::Term(t) => {
            assert_eq!(t.id.name, "brand");
            assert_eq!(pattern_text(&t.value), "Firefox");
        }
        other => panic!("expected term, got {other:?}"),
    }
}

#[test]
fn select_expression_with_plural_variants() {
    let src = "emails = You have { $count ->\n    [one] one email\n   *[other] { $count } emails\n }.";
    let m = only_message(src);
    let pattern = m.value.unwrap();
    let select = pattern
        .elements
        .iter()
        .find_map(|el| match el {
            PatternElement::Placeable(p) => match &p.expression {
                Expression::Select(s) => Some(s),
                _ => None,
            },
            _ => None,
        })
        .expect("select expression");
    assert_eq!(select.variants.len(), 2);
    assert!(!select.variants[0].default);
    assert!(select.variants[1].default);
    match &select.variants[0].key {
        VariantKey::Identifier(id) => assert_eq!(id.name, "one"),
        other => panic!("expected identifier key, got {other:?}"),
    }
}

#[test]
fn select_with_numeric_keys() {
    let src = "m = { $n ->\n    [0] none\n    [1] one\n   *[other] many\n }";
    let m = only_message(src);
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Select(s) => match &s.variants[0].key {
                VariantKey::Number(n) => assert_eq!(n.value, NumberValue::Integer(0)),
                other => panic!("expected number key, got {other:?}"),
            },
            other => panic!("expected select, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn message_reference_as_selector_is_junk() {
    let resource = parse("m = { other ->\n   *[a] x\n }");
    assert!(matches!(resource.entries[0], Entry::Junk(_)));
}

#[test]
fn term_attribute_as_selector_is_allowed() {
    let src = "m = { -brand.gender ->\n   *[neuter] it\n }";
    let m = only_message(src);
    assert!(m.value.is_some());
}

#[test]
fn function_reference_with_named_arguments() {
    let m = only_message(r#"m = { NUMBER($ratio, minimumFractionDigits: 2) }"#);
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::FunctionReference { id, arguments }) => {
                assert_eq!(id.name, "NUMBER");
                assert_eq!(arguments.positional.len(), 1);
                assert_eq!(arguments.named.len(), 1);
                assert_eq!(arguments.named[0].name.name, "minimumFractionDigits");
            }
            other => panic!("expected function, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn multiline_call_arguments() {
    let m = only_message("m = { NUMBER(\n        $n,\n        useGrouping: 0\n    ) }");
    assert!(m.value.is_some());
}

#[test]
fn lowercase_function_name_is_junk() {
    let resource = parse("m = { number($n) }");
    assert!(matches!(resource.entries[0], Entry::Junk(_)));
}

#[test]
fn term_reference_with_arguments() {
    let m = only_message(r#"m = { -brand(case: "genitive") }"#);
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::TermReference { id, arguments, .. }) => {
                assert_eq!(id.name, "brand");
                assert_eq!(arguments.as_ref().unwrap().named.len(), 1);
            }
            other => panic!("expected term reference, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn nested_placeable() {
    let m = only_message("m = { { $inner } }");
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::Placeable(_)) => {}
            other => panic!("expected nested placeable, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn placeable_nesting_depth_becomes_junk() {
    let depth = 40;
    let mut src = String::from("m = ");
    src.push_str(&"{ ".repeat(depth));
    src.push_str("$x");
    src.push_str(&" }".repeat(depth));
    let resource = parse_with_options(
        &src,
        &ParseOptions {
            max_nesting_depth: 10,
            ..ParseOptions::default()
        },
    );
    assert!(matches!(resource.entries[0], Entry::Junk(_)));
}

#[test]
fn string_literal_in_placeable() {
    let m = only_message(r#"m = { "literal text" }"#);
    assert!(m.value.is_some());
}

#[test]
fn comments_by_level() {
    let resource = parse("# standalone\n\n## group\n\n### resource\n");
    let kinds: Vec<CommentKind> = resource
        .entries
        .iter()
        .map(|e| match e {
            Entry::Comment(c) => c.kind,
            other => panic!("expected comment, got {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            CommentKind::Standalone,
            CommentKind::Group,
            CommentKind::Resource
        ]
    );
}

#[test]
fn adjacent_comments_merge() {
    let resource = parse("# first\n# second\n");
    assert_eq!(resource.entries.len(), 1);
    match &resource.entries[0] {
        Entry::Comment(c) => assert_eq!(c.content, "first\nsecond"),
        other => panic!("expected comment, got {other:?}"),
    }
}

#[test]
fn blank_line_prevents_comment_merge() {
    let resource = parse("# first\n\n# second\n");
    assert_eq!(resource.entries.len(), 2);
}

#[test]
fn different_kinds_do_not_merge() {
    let resource = parse("# first\n## second\n");
    assert_eq!(resource.entries.len(), 2);
}

#[test]
fn comment_attaches_to_following_message() {
    let resource = parse("# About the welcome message.\nwelcome = Hi\n");
    assert_eq!(resource.entries.len(), 1);
    match &resource.entries[0] {
        Entry::Message(m) => {
            let comment = m.comment.as_ref().expect("attached comment");
            assert_eq!(comment.content, "About the welcome message.");
        }
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn blank_line_prevents_comment_attachment() {
    let resource = parse("# standalone\n\nwelcome = Hi\n");
    assert_eq!(resource.entries.len(), 2);
    assert!(matches!(resource.entries[0], Entry::Comment(_)));
}

#[test]
fn group_comment_does_not_attach() {
    let resource = parse("## Section\nwelcome = Hi\n");
    assert_eq!(resource.entries.len(), 2);
}

#[test]
fn junk_recovers_at_next_entry() {
    // Junk consumes line-by-line until a line starts with `#`, `-`, or an
    // ASCII letter, so the `!!` line folds into the same junk entry.
    let resource = parse("== garbage ==\n!! more garbage !!\nvalid = Yes\n");
    assert_eq!(resource.entries.len(), 2);
    match &resource.entries[0] {
        Entry::Junk(j) => {
            assert!(j.content.contains("== garbage =="));
            assert!(j.content.contains("!! more garbage !!"));
            assert!(!j.annotations.is_empty());
        }
        other => panic!("expected junk, got {other:?}"),
    }
    assert!(matches!(resource.entries[1], Entry::Message(_)));
}

#[test]
fn junk_annotations_carry_parse_error_code() {
    let resource = parse("m = { $ }\n");
    match &resource.entries[0] {
        Entry::Junk(j) => {
            assert_eq!(j.annotations[0].code, DiagnosticCode::ParseError);
        }
        other => panic!("expected junk, got {other:?}"),
    }
}

#[test]
fn junk_from_broken_message_keeps_following_entries() {
    let resource = parse("broken = { $x\nnext = ok\n");
    assert_eq!(resource.entries.len(), 2);
    assert!(matches!(resource.entries[0], Entry::Junk(_)));
    match &resource.entries[1] {
        Entry::Message(m) => assert_eq!(m.id.name, "next"),
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn parser_never_panics_on_fuzzish_inputs() {
    for src in [
        "",
        "\n\n\n",
        "=",
        "{",
        "}",
        "a",
        "a =",
        "a = {",
        "a = }",
        "-",
        "--",
        "-a",
        "# ",
        "####",
        "\u{0}\u{1}\u{2}",
        "a = { $ }",
        "a = { -> }",
        "a = { $x ->\n}",
        "a = { $x ->\n *[a]\n}",
        "key = \"",
        "key = { \"unterminated }",
        "x = { NUMBER( }",
    ] {
        let _ = parse(src);
    }
}

#[test]
fn crlf_is_normalized() {
    let resource = parse("a = one\r\nb = two\r\n");
    assert_eq!(resource.entries.len(), 2);
    match &resource.entries[0] {
        Entry::Message(m) => assert_eq!(pattern_text(m.value.as_ref().unwrap()), "one"),
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn oversized_source_is_one_junk() {
    let resource = parse_with_options(
        "a = b",
        &ParseOptions {
            max_source_size: 3,
            ..ParseOptions::default()
        },
    );
    assert_eq!(resource.entries.len(), 1);
    match &resource.entries[0] {
        Entry::Junk(j) => assert!(j.annotations[0].message.contains("maximum size")),
        other => panic!("expected junk, got {other:?}"),
    }
}

#[test]
fn number_literals_in_placeables() {
    let m = only_message("pi = { 3.14 }");
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::NumberLiteral(n)) => {
                assert_eq!(n.raw, "3.14");
                assert!(matches!(n.value, NumberValue::Decimal(_)));
            }
            other => panic!("expected number, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn message_reference_with_attribute() {
    let m = only_message("m = { login.title }");
    let pattern = m.value.unwrap();
    match &pattern.elements[0] {
        PatternElement::Placeable(p) => match &p.expression {
            Expression::Inline(InlineExpression::MessageReference { id, attribute }) => {
                assert_eq!(id.name, "login");
                assert_eq!(attribute.as_ref().unwrap().name, "title");
            }
            other => panic!("expected message reference, got {other:?}"),
        },
        other => panic!("expected placeable, got {other:?}"),
    }
}

#[test]
fn spans_cover_entries() {
    let src = "first = one\nsecond = two\n";
    let resource = parse(src);
    match (&resource.entries[0], &resource.entries[1]) {
        (Entry::Message(a), Entry::Message(b)) => {
            let sa = a.span.unwrap();
            let sb = b.span.unwrap();
            assert_eq!(&src[sa.start..sa.end], "first = one");
            assert_eq!(&src[sb.start..sb.end], "second = two");
        }
        other => panic!("expected two messages, got {other:?}"),
    }
}

#[test]
fn duplicate_ids_both_parse() {
    // Registration policy (first-writer-wins) is the bundle's concern; the
    // parser reports what the source says.
    let resource = parse("a = one\na = two\n");
    assert_eq!(resource.entries.len(), 2);
}

#[test]
fn indented_line_at_top_level_is_junk() {
    let resource = parse("  stray = indented\nok = fine\n");
    assert_eq!(resource.entries.len(), 2);
    assert!(matches!(resource.entries[0], Entry::Junk(_)));
    assert!(matches!(resource.entries[1], Entry::Message(_)));
}
