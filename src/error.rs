//! Diagnostics for parsing, validation, resolution, and integrity checks.
//!
//! Errors here are data, not control flow. The parser records
//! [`ParseError`]s and recovers into junk entries; the resolver accumulates
//! [`FluentError`]s next to a fallback string. Only integrity violations
//! (strict-mode formatting, cache corruption) surface as `Err` values.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use serde::Serialize;
use thiserror::Error;

use crate::position::Span;

/// Stable integer diagnostic codes, kept for log-based alerting.
///
/// The numeric values are part of the public contract: 1xx are syntax and
/// validation codes, 2xx are resolution codes. Serialization emits the
/// integer, not the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiagnosticCode {
    ParseError = 100,
    TermWithoutValue = 101,
    MultipleDefaultVariants = 102,
    MissingDefaultVariant = 103,
    DuplicateNamedArgument = 104,
    DuplicateAttribute = 105,
    CircularReference = 106,
    LongReferenceChain = 107,

    MessageNotFound = 200,
    TermNotFound = 201,
    VariableNotProvided = 202,
    FunctionNotFound = 203,
    CyclicReference = 204,
    DepthLimitExceeded = 205,
    ExpansionBudgetExceeded = 206,
    TypeMismatch = 207,
    InvalidArgument = 208,
    ArgumentRequired = 209,
    PatternInvalid = 210,
    UnknownExpression = 211,
}

impl DiagnosticCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Serialize for DiagnosticCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

/// A resolution-time diagnostic: something went wrong while formatting, and
/// a fallback was substituted. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("[{}] {message}", code.as_u16())]
pub struct FluentError {
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Option<Span>,
}

impl FluentError {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span: Some(span),
        }
    }

    /// BLAKE2b-128 over the code and message. Feeds cache checksums, so the
    /// encoding must stay stable.
    pub fn content_hash(&self) -> [u8; 16] {
        let mut hasher = Blake2b::<U16>::new();
        hasher.update(self.code.as_u16().to_le_bytes());
        hasher.update((self.message.len() as u64).to_le_bytes());
        hasher.update(self.message.as_bytes());
        hasher.finalize().into()
    }
}

/// A syntax error recorded during parsing. Never escapes the parser as a
/// failure: it becomes an [`Annotation`] on a junk entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected an identifier")]
    ExpectedIdentifier,
    #[error("identifier exceeds {limit} characters")]
    IdentifierTooLong { limit: usize },
    #[error("expected character {expected:?}")]
    ExpectedChar { expected: char },
    #[error("expected token {expected:?}")]
    ExpectedToken { expected: &'static str },
    #[error("number literal exceeds {limit} characters")]
    NumberTooLong { limit: usize },
    #[error("malformed number literal")]
    InvalidNumber,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("string literal exceeds {limit} characters")]
    StringTooLong { limit: usize },
    #[error("unknown escape sequence '\\{found}'")]
    UnknownEscape { found: char },
    #[error("escape sequence does not encode a Unicode scalar value: {value:#x}")]
    InvalidUnicodeEscape { value: u32 },
    #[error("expected a message field: value or attributes")]
    ExpectedMessageField { id: String },
    #[error("expected a value for term -{id}")]
    ExpectedTermValue { id: String },
    #[error("placeable nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },
    #[error("expected a variant key")]
    ExpectedVariantKey,
    #[error("expected a value")]
    ExpectedValue,
    #[error("expression cannot be used as a selector")]
    InvalidSelector,
    #[error("select expression must contain at least one variant")]
    MissingVariants,
    #[error("function names must be uppercase: {name}")]
    InvalidFunctionName { name: String },
    #[error("expected an inline expression")]
    ExpectedExpression,
    #[error("named argument values must be string or number literals")]
    ExpectedLiteralArgument,
    #[error("expected an entry: message, term, or comment")]
    ExpectedEntry,
    #[error("source exceeds maximum size of {limit} bytes")]
    SourceTooLarge { limit: usize },
}

/// Annotation attached to a [`crate::ast::Junk`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
}

impl Annotation {
    pub fn from_parse_error(err: &ParseError) -> Self {
        Self {
            code: DiagnosticCode::ParseError,
            message: err.kind.to_string(),
            span: err.span,
        }
    }
}

/// Severity of a semantic validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Blocks registration of the offending entry.
    Error,
    /// Advisory only.
    Warning,
}

/// One semantic validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{entry_id}: [{}] {message}", code.as_u16())]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub entry_id: String,
    pub span: Option<Span>,
}

/// Outcome of validating a resource: fatal errors and advisory warnings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Raised by strict-mode formatting: carries everything the non-strict path
/// would have returned, so callers can still recover the fallback.
#[derive(Debug, Clone, Error)]
#[error("formatting '{message_id}' produced {} error(s); fallback: {fallback:?}", errors.len())]
pub struct FormattingIntegrityError {
    pub message_id: String,
    pub errors: Vec<FluentError>,
    pub fallback: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_codes_are_stable() {
        assert_eq!(DiagnosticCode::ParseError.as_u16(), 100);
        assert_eq!(DiagnosticCode::MessageNotFound.as_u16(), 200);
        assert_eq!(DiagnosticCode::CyclicReference.as_u16(), 204);
        assert_eq!(DiagnosticCode::ExpansionBudgetExceeded.as_u16(), 206);
        assert_eq!(DiagnosticCode::UnknownExpression.as_u16(), 211);
    }

    #[test]
    fn fluent_error_hash_depends_on_content() {
        let a = FluentError::new(DiagnosticCode::MessageNotFound, "unknown message: x");
        let b = FluentError::new(DiagnosticCode::MessageNotFound, "unknown message: y");
        let c = FluentError::new(DiagnosticCode::TermNotFound, "unknown message: x");
        assert_ne!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash(), a.clone().content_hash());
    }

    #[test]
    fn annotation_carries_parse_error_message() {
        let err = ParseError::new(
            ParseErrorKind::UnknownEscape { found: 'q' },
            Span::new(3, 5),
        );
        let ann = Annotation::from_parse_error(&err);
        assert_eq!(ann.code, DiagnosticCode::ParseError);
        assert!(ann.message.contains("\\q"));
        assert_eq!(ann.span, Span::new(3, 5));
    }

    #[test]
    fn report_routes_by_severity() {
        let mut report = ValidationReport::default();
        report.push(ValidationIssue {
            severity: Severity::Error,
            code: DiagnosticCode::MissingDefaultVariant,
            message: "no default".into(),
            entry_id: "m".into(),
            span: None,
        });
        report.push(ValidationIssue {
            severity: Severity::Warning,
            code: DiagnosticCode::LongReferenceChain,
            message: "deep".into(),
            entry_id: "m".into(),
            span: None,
        });
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.is_valid());
    }
}
