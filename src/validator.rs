//! Post-parse semantic validation.
//!
//! The grammar guarantees well-formedness; this pass checks the rules the
//! grammar cannot express: default-variant counts, named-argument
//! uniqueness, attribute uniqueness, and values required on terms. Some
//! classically invalid shapes (message attribute references carrying
//! arguments) are unrepresentable in this AST and need no check.
//!
//! The validator never mutates and never panics; findings land in a
//! [`ValidationReport`]. Junk entries are skipped: their errors were
//! already reported by the parser as annotations.

use std::collections::HashSet;

use crate::ast::{CallArguments, Entry, Resource, SelectExpression, Term};
use crate::error::{DiagnosticCode, Severity, ValidationIssue, ValidationReport};
use crate::parser::primitives::is_valid_identifier;
use crate::visitor::{
    walk_call_arguments, walk_select_expression, VisitDepth, VisitResult, Visitor,
};

/// Validate every entry of a resource.
pub fn validate(resource: &Resource) -> ValidationReport {
    let mut report = ValidationReport::default();
    for entry in &resource.entries {
        report.merge(validate_entry(entry));
    }
    report
}

/// Validate one entry. The bundle calls this before registration so that a
/// semantically broken entry blocks itself, not the whole resource.
pub fn validate_entry(entry: &Entry) -> ValidationReport {
    let mut report = ValidationReport::default();
    let entry_id = match entry {
        Entry::Message(m) => m.id.name.clone(),
        Entry::Term(t) => format!("-{}", t.id.name),
        Entry::Comment(_) | Entry::Junk(_) => return report,
    };

    if let Some(id) = entry.id() {
        if !is_valid_identifier(id) {
            report.push(issue(
                Severity::Error,
                DiagnosticCode::PatternInvalid,
                format!("invalid identifier: {id:?}"),
                &entry_id,
            ));
        }
    }

    match entry {
        Entry::Message(m) => check_duplicate_attributes(
            m.attributes.iter().map(|a| a.id.name.as_str()),
            &entry_id,
            &mut report,
        ),
        Entry::Term(t) => {
            check_term_value(t, &entry_id, &mut report);
            check_duplicate_attributes(
                t.attributes.iter().map(|a| a.id.name.as_str()),
                &entry_id,
                &mut report,
            );
        }
        _ => {}
    }

    let mut walker = EntryWalker {
        depth: VisitDepth::default(),
        entry_id: entry_id.clone(),
        report: &mut report,
    };
    if walker.visit_entry(entry).is_err() {
        report.push(issue(
            Severity::Error,
            DiagnosticCode::PatternInvalid,
            "entry nests too deeply to validate".to_string(),
            &entry_id,
        ));
    }
    report
}

fn issue(
    severity: Severity,
    code: DiagnosticCode,
    message: String,
    entry_id: &str,
) -> ValidationIssue {
    ValidationIssue {
        severity,
        code,
        message,
        entry_id: entry_id.to_string(),
        span: None,
    }
}

fn check_term_value(term: &Term, entry_id: &str, report: &mut ValidationReport) {
    if term.value.is_empty() {
        report.push(issue(
            Severity::Error,
            DiagnosticCode::TermWithoutValue,
            format!("term -{} has no value", term.id.name),
            entry_id,
        ));
    }
}

fn check_duplicate_attributes<'a>(
    names: impl Iterator<Item = &'a str>,
    entry_id: &str,
    report: &mut ValidationReport,
) {
    let mut seen: HashSet<&str> = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            report.push(issue(
                Severity::Error,
                DiagnosticCode::DuplicateAttribute,
                format!("duplicate attribute: .{name}"),
                entry_id,
            ));
        }
    }
}

struct EntryWalker<'r> {
    depth: VisitDepth,
    entry_id: String,
    report: &'r mut ValidationReport,
}

impl Visitor for EntryWalker<'_> {
    fn depth(&mut self) -> &mut VisitDepth {
        &mut self.depth
    }

    fn visit_select_expression(&mut self, select: &SelectExpression) -> VisitResult {
        let defaults = select.variants.iter().filter(|v| v.default).count();
        if defaults == 0 {
            self.report.push(issue(
                Severity::Error,
                DiagnosticCode::MissingDefaultVariant,
                "select expression has no default variant".to_string(),
                &self.entry_id,
            ));
        } else if defaults > 1 {
            self.report.push(issue(
                Severity::Error,
                DiagnosticCode::MultipleDefaultVariants,
                format!("select expression has {defaults} default variants"),
                &self.entry_id,
            ));
        }
        walk_select_expression(self, select)
    }

    fn visit_call_arguments(&mut self, args: &CallArguments) -> VisitResult {
        let mut seen: HashSet<&str> = HashSet::new();
        for named in &args.named {
            if !seen.insert(named.name.name.as_str()) {
                self.report.push(issue(
                    Severity::Error,
                    DiagnosticCode::DuplicateNamedArgument,
                    format!("duplicate named argument: {}", named.name.name),
                    &self.entry_id,
                ));
            }
        }
        walk_call_arguments(self, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Identifier, Pattern};
    use crate::parser::parse;

    fn validate_src(src: &str) -> ValidationReport {
        validate(&parse(src))
    }

    #[test]
    fn valid_resource_passes() {
        let report = validate_src(
            "hello = Hello\nemails = { $n ->\n    [one] one\n   *[other] many\n }\n",
        );
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_default_variant_is_error() {
        // The grammar accepts a variant list without '*'; validation rejects.
        let report = validate_src("m = { $n ->\n    [one] one\n    [two] two\n }\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, DiagnosticCode::MissingDefaultVariant);
    }

    #[test]
    fn multiple_default_variants_is_error() {
        let report = validate_src("m = { $n ->\n   *[one] one\n   *[other] many\n }\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].code,
            DiagnosticCode::MultipleDefaultVariants
        );
    }

    #[test]
    fn duplicate_named_arguments_is_error() {
        let report = validate_src("m = { NUMBER($n, useGrouping: 0, useGrouping: 1) }\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, DiagnosticCode::DuplicateNamedArgument);
        assert_eq!(report.errors[0].entry_id, "m");
    }

    #[test]
    fn duplicate_attributes_is_error() {
        let report = validate_src("m = v\n    .a = one\n    .a = two\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, DiagnosticCode::DuplicateAttribute);
    }

    #[test]
    fn programmatic_term_without_value_is_error() {
        let term = Term {
            id: Identifier::new("brand"),
            value: Pattern::default(),
            attributes: vec![],
            comment: None,
            span: None,
        };
        let report = validate_entry(&Entry::Term(term));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, DiagnosticCode::TermWithoutValue);
        assert_eq!(report.errors[0].entry_id, "-brand");
    }

    #[test]
    fn programmatic_invalid_identifier_is_error() {
        let message = crate::ast::Message {
            id: Identifier::new("9bad"),
            value: Some(Pattern::default()),
            attributes: vec![],
            comment: None,
            span: None,
        };
        let report = validate_entry(&Entry::Message(message));
        assert!(report
            .errors
            .iter()
            .any(|e| e.code == DiagnosticCode::PatternInvalid));
    }

    #[test]
    fn junk_is_not_revalidated() {
        let report = validate_src("!!! junk !!!\n");
        assert!(report.is_valid());
    }

    #[test]
    fn nested_selects_are_all_checked() {
        let src = "m = { $a ->\n   *[x] { $b ->\n       [y] inner\n    }\n }\n";
        let report = validate_src(src);
        // Outer select has a default; inner one does not.
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, DiagnosticCode::MissingDefaultVariant);
    }
}
