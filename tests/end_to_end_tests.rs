//! End-to-end behavior of the full engine: parse, register, resolve,
//! negotiate locales.

use ftlex::bundle::{BundleConfig, FluentBundle};
use ftlex::error::DiagnosticCode;
use ftlex::localization::{Localization, StaticResourceLoader};
use ftlex::value::{args, ArgValue, FluentArgs};

fn bundle_for(locale: &str, source: &str) -> FluentBundle {
    let bundle = FluentBundle::new(BundleConfig {
        locale: locale.to_string(),
        use_isolating: false,
        ..BundleConfig::default()
    })
    .expect("bundle");
    bundle.add_resource(source).expect("resource");
    bundle
}

fn format(bundle: &FluentBundle, id: &str, args: Option<&FluentArgs>) -> (String, Vec<ftlex::FluentError>) {
    bundle.format_pattern(id, args, None).expect("non-strict format")
}

#[test]
fn basic_variable() {
    let bundle = bundle_for("en", "greeting = Hello, { $name }!\n");
    let (text, errors) = format(&bundle, "greeting", Some(&args([("name", "Alice".into())])));
    assert_eq!(text, "Hello, Alice!");
    assert!(errors.is_empty());
}

#[test]
fn english_cldr_plural() {
    let source =
        "emails = You have { $count ->\n    [one] one email\n   *[other] { $count } emails\n }.\n";
    let bundle = bundle_for("en", source);
    let (text, errors) = format(&bundle, "emails", Some(&args([("count", 5i64.into())])));
    assert_eq!(text, "You have 5 emails.");
    assert!(errors.is_empty());
}

#[test]
fn latvian_cldr_plural_three_categories() {
    let source = "items = { $count ->\n    [zero] { $count } vienību\n    [one] viena vienība\n   *[other] { $count } vienības\n }\n";
    let bundle = bundle_for("lv", source);

    // 21 selects `one` under Latvian rules.
    let (text, errors) = format(&bundle, "items", Some(&args([("count", 21i64.into())])));
    assert_eq!(text, "viena vienība");
    assert!(errors.is_empty());

    let (text, _) = format(&bundle, "items", Some(&args([("count", 10i64.into())])));
    assert_eq!(text, "10 vienību");

    let (text, _) = format(&bundle, "items", Some(&args([("count", 2i64.into())])));
    assert_eq!(text, "2 vienības");
}

#[test]
fn cycle_detection_yields_fallback_and_diagnostic() {
    let bundle = bundle_for("en", "a = { b }\nb = { a }\n");
    let (text, errors) = format(&bundle, "a", None);
    assert!(text.contains("{a}"), "got: {text}");
    assert!(errors
        .iter()
        .any(|e| e.code == DiagnosticCode::CyclicReference));
}

#[test]
fn billion_laughs_terminates_within_budget() {
    let mut source = String::new();
    for i in 0..24 {
        source.push_str(&format!("m{i} = {{ m{} }}{{ m{} }}\n", i + 1, i + 1));
    }
    source.push_str("m24 = X\n");

    let bundle = FluentBundle::new(BundleConfig {
        locale: "en".into(),
        use_isolating: false,
        max_expansion_size: 100_000,
        ..BundleConfig::default()
    })
    .expect("bundle");
    bundle.add_resource(&source).expect("resource");

    let (_, errors) = bundle.format_pattern("m0", None, None).expect("non-strict");
    assert!(errors
        .iter()
        .any(|e| e.code == DiagnosticCode::ExpansionBudgetExceeded));
}

#[test]
fn fallback_across_locales() {
    let loader = StaticResourceLoader::new()
        .add("en", "main.ftl", "about = About\n")
        .add("lv", "main.ftl", "other = Cits\n");
    let l10n = Localization::with_config(
        vec!["lv".into(), "en".into()],
        vec!["main.ftl".into()],
        Box::new(loader),
        BundleConfig {
            use_isolating: false,
            ..BundleConfig::default()
        },
    );
    let (text, errors) = l10n.format_value("about", None);
    assert_eq!(text, "About");
    assert!(errors.is_empty());
}

#[test]
fn currency_and_datetime_functions_end_to_end() {
    let source = "price = Total: { CURRENCY($amount, currency: \"USD\") }\nwhen = On { DATETIME($date, dateStyle: \"short\") }\n";
    let bundle = bundle_for("en", source);

    let (text, errors) = format(
        &bundle,
        "price",
        Some(&args([(
            "amount",
            ArgValue::Decimal("1234.5".parse().expect("decimal")),
        )])),
    );
    assert_eq!(text, "Total: $1,234.50");
    assert!(errors.is_empty());

    let date = chrono::DateTime::parse_from_rfc3339("2026-08-01T10:00:00+00:00").expect("date");
    let (text, errors) = format(&bundle, "when", Some(&args([("date", date.into())])));
    assert_eq!(text, "On 2026-08-01");
    assert!(errors.is_empty());
}

#[test]
fn term_references_with_arguments_end_to_end() {
    let source = "-brand = { $case ->\n   *[nominative] Firefox\n    [locative] Firefoxā\n }\nin-brand = Strādā { -brand(case: \"locative\") }\n";
    let bundle = bundle_for("lv", source);
    let (text, errors) = format(&bundle, "in-brand", None);
    assert_eq!(text, "Strādā Firefoxā");
    assert!(errors.is_empty());
}

#[test]
fn junk_does_not_block_later_entries() {
    let bundle = FluentBundle::new(BundleConfig {
        locale: "en".into(),
        use_isolating: false,
        ..BundleConfig::default()
    })
    .expect("bundle");
    let result = bundle
        .add_resource("%%% broken %%%\nok = It works\n")
        .expect("resource");
    assert_eq!(result.junk.len(), 1);
    let (text, errors) = format(&bundle, "ok", None);
    assert_eq!(text, "It works");
    assert!(errors.is_empty());
}

#[test]
fn strict_and_nonstrict_agree_on_cache_contents() {
    for strict in [false, true] {
        let bundle = FluentBundle::new(BundleConfig {
            locale: "en".into(),
            use_isolating: false,
            strict,
            ..BundleConfig::default()
        })
        .expect("bundle");
        bundle.add_resource("m = Hi { $who }!\n").expect("resource");
        let _ = bundle.format_pattern("m", None, None);
        assert_eq!(
            bundle.cache_stats().expect("cache").size,
            1,
            "strict={strict}"
        );
    }
}

#[test]
fn deep_reference_chain_is_depth_limited() {
    let mut source = String::new();
    for i in 0..150 {
        source.push_str(&format!("c{i} = {{ c{} }}\n", i + 1));
    }
    source.push_str("c150 = done\n");
    let bundle = bundle_for("en", &source);
    let (_, errors) = format(&bundle, "c0", None);
    assert!(errors
        .iter()
        .any(|e| e.code == DiagnosticCode::DepthLimitExceeded));
}

#[test]
fn nested_selects_resolve() {
    let source = "m = { $a ->\n   *[yes] { $b ->\n        [one] A1\n       *[other] Amany\n    }\n    [no] nothing\n }\n";
    let bundle = bundle_for("en", source);
    let (text, errors) = format(
        &bundle,
        "m",
        Some(&args([("a", "yes".into()), ("b", 1i64.into())])),
    );
    assert_eq!(text, "A1");
    assert!(errors.is_empty());
}
