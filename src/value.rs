//! Runtime values at the resolver boundary.
//!
//! Callers hand the engine [`ArgValue`]s — an open, recursive shape that
//! models whatever an application might throw at a formatting call (the
//! cache hashes these, lists and maps included). The resolver itself works
//! on the closed [`FluentValue`] sum type; conversion happens once at
//! ingest, and anything unconvertible becomes a `TYPE_MISMATCH` diagnostic
//! plus a placeholder, never a crash.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ast::{NumberLiteral, NumberValue};

/// Arguments for one formatting call, keyed by variable name.
pub type FluentArgs = BTreeMap<String, ArgValue>;

/// A caller-supplied argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArgValue {
    Str(String),
    Integer(i64),
    Decimal(Decimal),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<FixedOffset>),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
    Null,
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Integer(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Integer(v as i64)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<Decimal> for ArgValue {
    fn from(v: Decimal) -> Self {
        ArgValue::Decimal(v)
    }
}

impl From<DateTime<FixedOffset>> for ArgValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        ArgValue::DateTime(v)
    }
}

/// Convenience for building a [`FluentArgs`] map.
///
/// ```
/// use ftlex::value::args;
/// let a = args([("name", "Alice".into()), ("count", 5i64.into())]);
/// assert_eq!(a.len(), 2);
/// ```
pub fn args<const N: usize>(pairs: [(&str, ArgValue); N]) -> FluentArgs {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// The closed value type the resolver evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum FluentValue {
    String(String),
    Number(FluentNumber),
    DateTime(DateTime<FixedOffset>),
}

/// Numeric payload. Integer and decimal stay exact; floats exist only
/// because callers pass them (number literals in FTL never produce one).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberKind {
    Integer(i64),
    Decimal(Decimal),
    Float(f64),
}

/// A number plus its formatting residue.
///
/// `precision` is the count of visible fraction digits after formatting;
/// plural selection keys on it (`1` is `one` in English where `1.0` is
/// `other`). `formatted` carries the output of an explicit `NUMBER()` call
/// so the rendered text matches what the formatter produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FluentNumber {
    pub value: NumberKind,
    pub precision: Option<u32>,
    pub formatted: Option<String>,
}

impl FluentNumber {
    pub fn integer(v: i64) -> Self {
        Self {
            value: NumberKind::Integer(v),
            precision: None,
            formatted: None,
        }
    }

    pub fn decimal(v: Decimal) -> Self {
        Self {
            value: NumberKind::Decimal(v),
            precision: None,
            formatted: None,
        }
    }

    pub fn float(v: f64) -> Self {
        Self {
            value: NumberKind::Float(v),
            precision: None,
            formatted: None,
        }
    }

    pub fn from_literal(literal: &NumberLiteral) -> Self {
        match literal.value {
            NumberValue::Integer(i) => Self::integer(i),
            NumberValue::Decimal(d) => Self::decimal(d),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self.value {
            NumberKind::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Exact decimal view where one exists. Non-finite floats have none.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.value {
            NumberKind::Integer(i) => Some(Decimal::from(i)),
            NumberKind::Decimal(d) => Some(d),
            NumberKind::Float(f) => Decimal::try_from(f).ok(),
        }
    }

    /// Plain representation for plural-operand construction: visible
    /// fraction digits are materialized ("1.0", not "1") so the CLDR
    /// fractional operands come out right.
    pub fn plural_repr(&self) -> String {
        let precision = self.precision.unwrap_or(match self.value {
            NumberKind::Decimal(d) => d.scale(),
            _ => 0,
        });
        match self.as_decimal() {
            Some(d) => format_decimal_plain(d.round_dp(precision), precision),
            // Only non-finite floats lack a decimal view.
            None => match self.value {
                NumberKind::Float(f) => f.to_string(),
                NumberKind::Integer(i) => i.to_string(),
                NumberKind::Decimal(d) => d.to_string(),
            },
        }
    }
}

/// Fixed-point rendition with exactly `fraction_digits` digits after the
/// point, no grouping, ASCII separators.
pub(crate) fn format_decimal_plain(value: Decimal, fraction_digits: u32) -> String {
    let mut s = value.abs().to_string();
    let point = s.find('.');
    let current = point.map(|p| s.len() - p - 1).unwrap_or(0) as u32;
    if current < fraction_digits {
        if point.is_none() {
            s.push('.');
        }
        s.extend(std::iter::repeat('0').take((fraction_digits - current) as usize));
    } else if current > fraction_digits {
        let p = s.find('.').unwrap_or(s.len());
        let keep = if fraction_digits == 0 {
            p
        } else {
            p + 1 + fraction_digits as usize
        };
        s.truncate(keep);
    }
    if value.is_sign_negative() && !value.is_zero() {
        s.insert(0, '-');
    }
    s
}

/// Kinds that cannot cross the resolver boundary, reported inside
/// `TYPE_MISMATCH` diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    List,
    Map,
    Null,
}

impl IngestError {
    pub fn type_name(self) -> &'static str {
        match self {
            IngestError::List => "list",
            IngestError::Map => "map",
            IngestError::Null => "null",
        }
    }
}

/// Convert a caller value into a resolver value.
///
/// Booleans coerce to the lowercase strings `"true"`/`"false"`. Lists,
/// maps, and nulls do not convert; the resolver reports `TYPE_MISMATCH`
/// and falls back to the variable placeholder.
pub fn ingest(value: &ArgValue) -> Result<FluentValue, IngestError> {
    match value {
        ArgValue::Str(s) => Ok(FluentValue::String(s.clone())),
        ArgValue::Integer(i) => Ok(FluentValue::Number(FluentNumber::integer(*i))),
        ArgValue::Decimal(d) => Ok(FluentValue::Number(FluentNumber::decimal(*d))),
        ArgValue::Float(f) => Ok(FluentValue::Number(FluentNumber::float(*f))),
        ArgValue::Bool(b) => Ok(FluentValue::String(
            if *b { "true" } else { "false" }.to_string(),
        )),
        ArgValue::DateTime(dt) => Ok(FluentValue::DateTime(*dt)),
        ArgValue::List(_) => Err(IngestError::List),
        ArgValue::Map(_) => Err(IngestError::Map),
        ArgValue::Null => Err(IngestError::Null),
    }
}
