//! Locale contexts: BCP-47 handling and cached CLDR-driven formatters.
//!
//! [`LocaleContext`] instances are obtained through [`LocaleContext::obtain`]
//! only — construction is private, and the factory consults a bounded
//! process-wide LRU so each normalized locale is built once and shared.
//! Contexts are immutable and effectively immortal (the cache holds them
//! until evicted).

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, FixedOffset};
use intl_pluralrules::{PluralRuleType, PluralRules};
use lru::LruCache;
use rust_decimal::Decimal;
use thiserror::Error;
use unic_langid::LanguageIdentifier;

use crate::currency;
use crate::value::{format_decimal_plain, FluentNumber, NumberKind};
use crate::{MAX_LOCALE_CACHE_SIZE, MAX_LOCALE_CODE_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleError {
    #[error("not a valid BCP-47 locale: {code:?}")]
    InvalidLocale { code: String },
    #[error("locale code exceeds {limit} characters")]
    CodeTooLong { limit: usize },
}

/// Immutable per-locale formatting state.
pub struct LocaleContext {
    code: String,
    langid: LanguageIdentifier,
    plural_rules: Option<PluralRules>,
    _private: (),
}

impl fmt::Debug for LocaleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocaleContext")
            .field("code", &self.code)
            .finish()
    }
}

fn context_cache() -> &'static Mutex<LruCache<String, Arc<LocaleContext>>> {
    static CONTEXTS: OnceLock<Mutex<LruCache<String, Arc<LocaleContext>>>> = OnceLock::new();
    CONTEXTS.get_or_init(|| {
        let capacity =
            NonZeroUsize::new(MAX_LOCALE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    })
}

impl LocaleContext {
    /// Normalize a BCP-47 code (underscores accepted on input, case
    /// canonicalized) and return the shared context for it.
    ///
    /// Construction under contention is double-checked: the context is
    /// built outside the lock, and a concurrent winner's instance is
    /// preferred over the fresh one on re-check.
    pub fn obtain(code: &str) -> Result<Arc<LocaleContext>, LocaleError> {
        if code.len() > MAX_LOCALE_CODE_LENGTH {
            return Err(LocaleError::CodeTooLong {
                limit: MAX_LOCALE_CODE_LENGTH,
            });
        }
        let (normalized, langid) = normalize_locale(code)?;

        if let Ok(mut cache) = context_cache().lock() {
            if let Some(ctx) = cache.get(&normalized) {
                return Ok(Arc::clone(ctx));
            }
        }

        let built = Arc::new(LocaleContext::construct(normalized.clone(), langid));

        let mut cache = match context_cache().lock() {
            Ok(cache) => cache,
            // A poisoned cache only costs sharing, not correctness.
            Err(_) => return Ok(built),
        };
        if let Some(existing) = cache.get(&normalized) {
            return Ok(Arc::clone(existing));
        }
        cache.put(normalized, Arc::clone(&built));
        Ok(built)
    }

    fn construct(code: String, langid: LanguageIdentifier) -> Self {
        let plural_rules = PluralRules::create(langid.clone(), PluralRuleType::CARDINAL).ok();
        Self {
            code,
            langid,
            plural_rules,
            _private: (),
        }
    }

    /// Canonical locale code, e.g. `en-US`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn langid(&self) -> &LanguageIdentifier {
        &self.langid
    }

    pub(crate) fn plural_rules(&self) -> Option<&PluralRules> {
        self.plural_rules.as_ref()
    }

    /// Locale decimal and group separators (CLDR-derived, root fallback).
    fn separators(&self) -> (char, char) {
        match self.langid.language.as_str() {
            "de" | "es" | "it" | "pt" | "nl" | "tr" | "id" | "da" | "ro" | "el" => (',', '.'),
            "fr" | "ru" | "lv" | "lt" | "pl" | "cs" | "sk" | "fi" | "sv" | "nb" | "nn"
            | "uk" | "et" | "hu" | "bg" => (',', '\u{a0}'),
            _ => ('.', ','),
        }
    }

    /// Format a number, returning the text and the count of visible
    /// fraction digits (the precision plural selection keys on).
    pub fn format_number_with_precision(
        &self,
        number: &FluentNumber,
        options: &NumberFormatOptions,
    ) -> (String, u32) {
        if !number.is_finite() {
            let text = match number.value {
                NumberKind::Float(f) if f.is_nan() => "NaN".to_string(),
                NumberKind::Float(f) if f > 0.0 => "∞".to_string(),
                _ => "-∞".to_string(),
            };
            return (text, 0);
        }

        let options = options.with_pattern_defaults();
        let value = number.as_decimal().unwrap_or_default();
        let natural = number.precision.unwrap_or(value.scale());
        let mut visible = natural;
        if let Some(max) = options.maximum_fraction_digits {
            visible = visible.min(max);
        }
        if let Some(min) = options.minimum_fraction_digits {
            visible = visible.max(min);
        }

        let plain = format_decimal_plain(value.round_dp(visible), visible);
        let (decimal_sep, group_sep) = self.separators();
        (
            group_digits(&plain, decimal_sep, group_sep, options.use_grouping),
            visible,
        )
    }

    pub fn format_number(&self, number: &FluentNumber, options: &NumberFormatOptions) -> String {
        self.format_number_with_precision(number, options).0
    }

    pub fn format_datetime(
        &self,
        value: &DateTime<FixedOffset>,
        options: &DateTimeFormatOptions,
    ) -> String {
        if let Some(pattern) = &options.pattern {
            return value.format(pattern).to_string();
        }
        let date = options.date_style.map(|style| match style {
            Style::Short => "%Y-%m-%d",
            Style::Medium => "%b %-d, %Y",
            Style::Long => "%B %-d, %Y",
            Style::Full => "%A, %B %-d, %Y",
        });
        let time = options.time_style.map(|style| match style {
            Style::Short => "%H:%M",
            Style::Medium => "%H:%M:%S",
            Style::Long | Style::Full => "%H:%M:%S %:z",
        });
        match (date, time) {
            (Some(d), Some(t)) => value.format(&format!("{d}, {t}")).to_string(),
            (Some(d), None) => value.format(d).to_string(),
            (None, Some(t)) => value.format(t).to_string(),
            (None, None) => value.format("%b %-d, %Y, %H:%M:%S").to_string(),
        }
    }

    /// Format an amount of `code` currency. Fraction digits come from the
    /// ISO 4217 table regardless of locale.
    pub fn format_currency(
        &self,
        amount: &FluentNumber,
        code: &str,
        options: &CurrencyFormatOptions,
    ) -> String {
        let digits = currency::decimal_digits(code);
        let number_options = NumberFormatOptions {
            minimum_fraction_digits: Some(digits),
            maximum_fraction_digits: Some(digits),
            use_grouping: true,
            pattern: options.pattern.clone(),
        };
        let (formatted, _) = self.format_number_with_precision(amount, &number_options);
        match options.currency_display {
            CurrencyDisplay::Symbol => {
                let symbol = currency::symbol(code);
                match formatted.strip_prefix('-') {
                    Some(rest) => format!("-{symbol}{rest}"),
                    None => format!("{symbol}{formatted}"),
                }
            }
            CurrencyDisplay::Code => format!("{code} {formatted}"),
            CurrencyDisplay::Name => format!("{formatted} {}", currency::display_name(code)),
        }
    }
}

/// Group integer digits in threes and swap in locale separators.
fn group_digits(plain: &str, decimal_sep: char, group_sep: char, use_grouping: bool) -> String {
    let (sign, rest) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut out = String::with_capacity(plain.len() + 4);
    out.push_str(sign);
    if use_grouping && int_part.len() > 3 {
        let first = int_part.len() % 3;
        if first > 0 {
            out.push_str(&int_part[..first]);
        }
        for (i, chunk) in int_part[first..].as_bytes().chunks(3).enumerate() {
            if first > 0 || i > 0 {
                out.push(group_sep);
            }
            out.push_str(std::str::from_utf8(chunk).unwrap_or(""));
        }
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push(decimal_sep);
        out.push_str(frac);
    }
    out
}

/// Parse and canonicalize a locale code, accepting POSIX-style
/// underscores.
fn normalize_locale(code: &str) -> Result<(String, LanguageIdentifier), LocaleError> {
    let candidate = code.trim().replace('_', "-");
    let langid = LanguageIdentifier::from_str(&candidate).map_err(|_| {
        LocaleError::InvalidLocale {
            code: code.to_string(),
        }
    })?;
    Ok((langid.to_string(), langid))
}

// ============================================================================
// Formatter configuration records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Short,
    Medium,
    Long,
    Full,
}

impl FromStr for Style {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(Style::Short),
            "medium" => Ok(Style::Medium),
            "long" => Ok(Style::Long),
            "full" => Ok(Style::Full),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrencyDisplay {
    #[default]
    Symbol,
    Code,
    Name,
}

impl FromStr for CurrencyDisplay {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(CurrencyDisplay::Symbol),
            "code" => Ok(CurrencyDisplay::Code),
            "name" => Ok(CurrencyDisplay::Name),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormatOptions {
    pub minimum_fraction_digits: Option<u32>,
    pub maximum_fraction_digits: Option<u32>,
    pub use_grouping: bool,
    /// CLDR-style pattern subset: the fraction part (`0` and `#` counts)
    /// fills unset digit options, and a `,` enables grouping.
    pub pattern: Option<String>,
}

impl Default for NumberFormatOptions {
    fn default() -> Self {
        Self {
            minimum_fraction_digits: None,
            maximum_fraction_digits: None,
            use_grouping: true,
            pattern: None,
        }
    }
}

impl NumberFormatOptions {
    fn with_pattern_defaults(&self) -> Self {
        let mut options = self.clone();
        if let Some(pattern) = &self.pattern {
            let fraction = pattern.split_once('.').map(|(_, f)| f).unwrap_or("");
            let zeros = fraction.chars().take_while(|c| *c == '0').count() as u32;
            let hashes = fraction
                .chars()
                .skip(zeros as usize)
                .take_while(|c| *c == '#')
                .count() as u32;
            if options.minimum_fraction_digits.is_none() {
                options.minimum_fraction_digits = Some(zeros);
            }
            if options.maximum_fraction_digits.is_none() {
                options.maximum_fraction_digits = Some(zeros + hashes);
            }
            if !pattern.contains(',') {
                options.use_grouping = false;
            }
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateTimeFormatOptions {
    pub date_style: Option<Style>,
    pub time_style: Option<Style>,
    /// Explicit chrono format pattern; overrides the styles.
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrencyFormatOptions {
    pub currency_display: CurrencyDisplay,
    pub pattern: Option<String>,
}
