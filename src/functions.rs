//! Sandboxed callable dispatch for FTL function references.
//!
//! The registry owns the mapping from FTL function names (`NUMBER`) to
//! callables, their declared arity, and whether the bundle's locale gets
//! injected at call time. The builtin metadata table is the single source
//! of truth for the three always-present functions.
//!
//! Named parameters cross the boundary in FTL camelCase
//! (`minimumFractionDigits`) and reach callables in snake_case
//! (`minimum_fraction_digits`). Registration rejects parameter sets whose
//! snake_case names collide on conversion.
//!
//! Calls run inside a harness: structured [`FunctionError`]s propagate as
//! diagnostics, while panics from user callables are caught, logged, and
//! turned into errors the resolver renders as fallback text.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use log::{error, warn};
use thiserror::Error;

use crate::locale::{
    CurrencyDisplay, CurrencyFormatOptions, DateTimeFormatOptions, LocaleContext,
    NumberFormatOptions, Style,
};
use crate::value::{FluentNumber, FluentValue};
use crate::currency;

pub type NamedArgs = BTreeMap<String, FluentValue>;
pub type FunctionResult = Result<FluentValue, FunctionError>;

/// A registered callable. Receives positional arguments, snake_case named
/// arguments, and the locale when the entry requires it.
pub type FluentFunction =
    Arc<dyn Fn(&[FluentValue], &NamedArgs, Option<&LocaleContext>) -> FunctionResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("unknown function: {name}")]
    Unknown { name: String },
    #[error("{name} requires {expected} positional argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("{name}: argument {argument} is required")]
    MissingArgument { name: String, argument: String },
    #[error("{name}: {message}")]
    InvalidArgument { name: String, message: String },
    #[error("function {name} panicked during evaluation")]
    Panicked { name: String },
    #[error("registry is frozen")]
    Frozen,
    #[error("invalid function name: {name:?}")]
    InvalidName { name: String },
    #[error("parameters {first} and {second} both convert to {external}")]
    ParameterCollision {
        first: String,
        second: String,
        external: String,
    },
}

/// Metadata for one builtin function.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMetadata {
    pub name: &'static str,
    pub requires_locale: bool,
    pub positional_arity: usize,
}

/// The builtin function table. Everything else consults this — resolver
/// locale injection included — so a builtin cannot drift out of sync with
/// its registration.
pub const BUILTIN_FUNCTIONS: &[BuiltinMetadata] = &[
    BuiltinMetadata {
        name: "NUMBER",
        requires_locale: true,
        positional_arity: 1,
    },
    BuiltinMetadata {
        name: "DATETIME",
        requires_locale: true,
        positional_arity: 1,
    },
    BuiltinMetadata {
        name: "CURRENCY",
        requires_locale: true,
        positional_arity: 1,
    },
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS.iter().any(|meta| meta.name == name)
}

/// Convert FTL camelCase to snake_case: `minimumFractionDigits` ->
/// `minimum_fraction_digits`.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert snake_case back to the FTL-visible camelCase.
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

struct FunctionEntry {
    callable: FluentFunction,
    positional_arity: usize,
    requires_locale: bool,
    named_params: Vec<String>,
}

/// Registry of callables for one bundle.
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionEntry>,
    frozen: bool,
}

impl Clone for FunctionRegistry {
    /// A copy of a frozen registry is mutable again.
    fn clone(&self) -> Self {
        Self {
            functions: self
                .functions
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        FunctionEntry {
                            callable: Arc::clone(&v.callable),
                            positional_arity: v.positional_arity,
                            requires_locale: v.requires_locale,
                            named_params: v.named_params.clone(),
                        },
                    )
                })
                .collect(),
            frozen: false,
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
            frozen: false,
        }
    }

    /// A registry with NUMBER, DATETIME, and CURRENCY pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for meta in BUILTIN_FUNCTIONS {
            let callable: FluentFunction = match meta.name {
                "NUMBER" => Arc::new(number_format),
                "DATETIME" => Arc::new(datetime_format),
                _ => Arc::new(currency_format),
            };
            let named: &[&str] = match meta.name {
                "NUMBER" => &[
                    "minimum_fraction_digits",
                    "maximum_fraction_digits",
                    "use_grouping",
                    "pattern",
                ],
                "DATETIME" => &["date_style", "time_style", "pattern"],
                _ => &["currency", "currency_display", "pattern"],
            };
            let registered = registry.register(
                meta.name,
                callable,
                meta.positional_arity,
                meta.requires_locale,
                named,
            );
            debug_assert!(registered.is_ok(), "builtin registration cannot fail");
        }
        registry
    }

    /// Register a callable under an FTL function name.
    pub fn register(
        &mut self,
        name: &str,
        callable: FluentFunction,
        positional_arity: usize,
        requires_locale: bool,
        named_params: &[&str],
    ) -> Result<(), FunctionError> {
        if self.frozen {
            return Err(FunctionError::Frozen);
        }
        if !is_valid_function_name(name) {
            return Err(FunctionError::InvalidName {
                name: name.to_string(),
            });
        }

        // Two snake_case parameters may not collide on their FTL-visible
        // camelCase form (e.g. `use_grouping` and `use__grouping`).
        let mut externals: BTreeMap<String, &str> = BTreeMap::new();
        for param in named_params {
            let external = snake_to_camel(param);
            if let Some(first) = externals.insert(external.clone(), param) {
                return Err(FunctionError::ParameterCollision {
                    first: first.to_string(),
                    second: param.to_string(),
                    external,
                });
            }
        }

        self.functions.insert(
            name.to_string(),
            FunctionEntry {
                callable,
                positional_arity,
                requires_locale,
                named_params: named_params.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Freeze the registry; further registration fails. `clone()` yields a
    /// mutable copy.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn requires_locale(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map(|entry| entry.requires_locale)
            .unwrap_or(false)
    }

    pub fn named_params(&self, name: &str) -> Option<&[String]> {
        self.functions.get(name).map(|e| e.named_params.as_slice())
    }

    /// Dispatch a call. `named` arrives with FTL camelCase keys and is
    /// converted before the callable sees it.
    pub fn call(
        &self,
        name: &str,
        positional: &[FluentValue],
        named: &NamedArgs,
        locale: &LocaleContext,
    ) -> FunctionResult {
        let entry = self
            .functions
            .get(name)
            .ok_or_else(|| FunctionError::Unknown {
                name: name.to_string(),
            })?;

        if positional.len() < entry.positional_arity {
            return Err(FunctionError::Arity {
                name: name.to_string(),
                expected: entry.positional_arity,
                got: positional.len(),
            });
        }

        let snake_named: NamedArgs = named
            .iter()
            .map(|(k, v)| (camel_to_snake(k), v.clone()))
            .collect();

        let injected = entry.requires_locale.then_some(locale);
        let result = catch_unwind(AssertUnwindSafe(|| {
            (entry.callable)(positional, &snake_named, injected)
        }));
        match result {
            Ok(value) => value,
            Err(_) => {
                error!("function {name} panicked; substituting fallback");
                Err(FunctionError::Panicked {
                    name: name.to_string(),
                })
            }
        }
    }
}

fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= crate::MAX_IDENTIFIER_LENGTH
        && name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

// ============================================================================
// Builtins
// ============================================================================

fn named_str<'a>(named: &'a NamedArgs, key: &str) -> Option<&'a str> {
    match named.get(key) {
        Some(FluentValue::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn named_u32(named: &NamedArgs, key: &str, function: &str) -> Result<Option<u32>, FunctionError> {
    use rust_decimal::prelude::ToPrimitive;
    match named.get(key) {
        None => Ok(None),
        Some(FluentValue::Number(n)) => {
            let integral = n
                .as_decimal()
                .filter(|d| !d.is_sign_negative() && d.fract().is_zero())
                .and_then(|d| d.to_u32());
            match integral {
                Some(v) => Ok(Some(v)),
                None => Err(FunctionError::InvalidArgument {
                    name: function.to_string(),
                    message: format!("{} must be a non-negative integer", snake_to_camel(key)),
                }),
            }
        }
        Some(_) => Err(FunctionError::InvalidArgument {
            name: function.to_string(),
            message: format!("{} must be a number", snake_to_camel(key)),
        }),
    }
}

fn number_argument<'v>(
    positional: &'v [FluentValue],
    function: &str,
) -> Result<&'v FluentNumber, FunctionError> {
    match positional.first() {
        Some(FluentValue::Number(n)) => Ok(n),
        _ => Err(FunctionError::InvalidArgument {
            name: function.to_string(),
            message: "value must be a number".to_string(),
        }),
    }
}

/// `NUMBER(value, minimumFractionDigits?, maximumFractionDigits?,
/// useGrouping?, pattern?)`
fn number_format(
    positional: &[FluentValue],
    named: &NamedArgs,
    locale: Option<&LocaleContext>,
) -> FunctionResult {
    let Some(locale) = locale else {
        return Err(FunctionError::InvalidArgument {
            name: "NUMBER".to_string(),
            message: "locale injection missing".to_string(),
        });
    };
    let number = number_argument(positional, "NUMBER")?;

    let use_grouping = match named.get("use_grouping") {
        None => true,
        Some(FluentValue::Number(n)) => n.as_decimal().map(|d| !d.is_zero()).unwrap_or(true),
        Some(FluentValue::String(s)) => s != "false" && s != "0",
        Some(_) => true,
    };
    let options = NumberFormatOptions {
        minimum_fraction_digits: named_u32(named, "minimum_fraction_digits", "NUMBER")?,
        maximum_fraction_digits: named_u32(named, "maximum_fraction_digits", "NUMBER")?,
        use_grouping,
        pattern: named_str(named, "pattern").map(str::to_string),
    };

    let (formatted, precision) = locale.format_number_with_precision(number, &options);
    Ok(FluentValue::Number(FluentNumber {
        value: number.value,
        precision: Some(precision),
        formatted: Some(formatted),
    }))
}

/// `DATETIME(value, dateStyle?, timeStyle?, pattern?)`
fn datetime_format(
    positional: &[FluentValue],
    named: &NamedArgs,
    locale: Option<&LocaleContext>,
) -> FunctionResult {
    let Some(locale) = locale else {
        return Err(FunctionError::InvalidArgument {
            name: "DATETIME".to_string(),
            message: "locale injection missing".to_string(),
        });
    };
    let value = match positional.first() {
        Some(FluentValue::DateTime(dt)) => *dt,
        _ => {
            return Err(FunctionError::InvalidArgument {
                name: "DATETIME".to_string(),
                message: "value must be a datetime".to_string(),
            })
        }
    };

    let parse_style = |key: &str| -> Result<Option<Style>, FunctionError> {
        match named_str(named, key) {
            None => Ok(None),
            Some(raw) => Style::from_str(raw).map(Some).map_err(|_| {
                FunctionError::InvalidArgument {
                    name: "DATETIME".to_string(),
                    message: format!(
                        "{} must be one of short, medium, long, full",
                        snake_to_camel(key)
                    ),
                }
            }),
        }
    };

    let options = DateTimeFormatOptions {
        date_style: parse_style("date_style")?,
        time_style: parse_style("time_style")?,
        pattern: named_str(named, "pattern").map(str::to_string),
    };
    Ok(FluentValue::String(locale.format_datetime(&value, &options)))
}

/// `CURRENCY(value, currency, currencyDisplay?, pattern?)`
///
/// The currency code may come second positionally or as the `currency`
/// named argument.
fn currency_format(
    positional: &[FluentValue],
    named: &NamedArgs,
    locale: Option<&LocaleContext>,
) -> FunctionResult {
    let Some(locale) = locale else {
        return Err(FunctionError::InvalidArgument {
            name: "CURRENCY".to_string(),
            message: "locale injection missing".to_string(),
        });
    };
    let amount = number_argument(positional, "CURRENCY")?;

    let code = match positional.get(1) {
        Some(FluentValue::String(s)) => Some(s.as_str()),
        _ => named_str(named, "currency"),
    };
    let Some(code) = code else {
        return Err(FunctionError::MissingArgument {
            name: "CURRENCY".to_string(),
            argument: "currency".to_string(),
        });
    };
    if !currency::is_valid_code(code) {
        return Err(FunctionError::InvalidArgument {
            name: "CURRENCY".to_string(),
            message: format!("not an ISO 4217 currency code: {code:?}"),
        });
    }

    let display = match named_str(named, "currency_display") {
        None => CurrencyDisplay::default(),
        Some(raw) => CurrencyDisplay::from_str(raw).map_err(|_| {
            FunctionError::InvalidArgument {
                name: "CURRENCY".to_string(),
                message: "currencyDisplay must be one of symbol, code, name".to_string(),
            }
        })?,
    };

    let options = CurrencyFormatOptions {
        currency_display: display,
        pattern: named_str(named, "pattern").map(str::to_string),
    };
    Ok(FluentValue::String(
        locale.format_currency(amount, code, &options),
    ))
}

/// Log-and-warn helper used by bundles when re-registering a name.
pub(crate) fn warn_duplicate_function(name: &str) {
    warn!("function {name} is already registered; keeping the original");
}
