//! Per-locale bundle: entry registry, function registry, resolver, cache.
//!
//! A bundle owns exactly one locale. Entries register first-writer-wins —
//! re-adding an id logs a warning and keeps the original. All interior
//! state sits behind one reader-writer lock: `format_pattern` and the
//! introspection calls take the read side (and run concurrently),
//! `add_resource`/`add_function` take the write side.
//!
//! Strict mode turns accumulated resolution errors into
//! [`FormattingIntegrityError`]s. The cache is written before the raise
//! ("cache-before-raise") so cache statistics stay consistent between
//! modes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::warn;
use serde::Serialize;
use thiserror::Error;

use crate::analysis;
use crate::ast::{Entry, InlineExpression, Junk, Message, Term};
use crate::cache::{CacheConfig, CacheError, CacheStats, IntegrityCache};
use crate::error::{
    DiagnosticCode, FluentError, FormattingIntegrityError, ValidationReport,
};
use crate::functions::{self, FluentFunction, FunctionError, FunctionRegistry};
use crate::locale::{LocaleContext, LocaleError};
use crate::parser::primitives::is_valid_identifier;
use crate::parser::{parse_with_options, ParseOptions};
use crate::resolver::{self, RefKey, ResolverConfig, Scope};
use crate::validator::validate_entry;
use crate::value::FluentArgs;
use crate::visitor::{walk_inline_expression, VisitDepth, VisitResult, Visitor};
use crate::{
    DEFAULT_CACHE_SIZE, DEFAULT_MAX_ENTRY_WEIGHT, DEFAULT_MAX_EXPANSION_SIZE, MAX_DEPTH,
    MAX_SOURCE_SIZE,
};

/// Sentinel returned for invalid caller input (bad message or attribute
/// identifiers). Paired with an `INVALID_ARGUMENT` diagnostic instead of a
/// panic or error, keeping the non-strict path total.
pub const INVALID_INPUT_SENTINEL: &str = "{???}";

/// Bundle construction options.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// BCP-47 locale code.
    pub locale: String,
    /// Wrap interpolated values in FSI/PDI.
    pub use_isolating: bool,
    /// Fail fast instead of falling back.
    pub strict: bool,
    pub enable_cache: bool,
    pub cache_size: usize,
    pub max_entry_weight: usize,
    pub max_expansion_size: usize,
    pub max_nesting_depth: usize,
    pub max_source_size: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            use_isolating: true,
            strict: false,
            enable_cache: true,
            cache_size: DEFAULT_CACHE_SIZE,
            max_entry_weight: DEFAULT_MAX_ENTRY_WEIGHT,
            max_expansion_size: DEFAULT_MAX_EXPANSION_SIZE,
            max_nesting_depth: MAX_DEPTH,
            max_source_size: MAX_SOURCE_SIZE,
        }
    }
}

impl BundleConfig {
    pub fn for_locale(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BundleError {
    #[error(transparent)]
    Locale(#[from] LocaleError),
    #[error("resource exceeds maximum source size of {limit} bytes")]
    SourceTooLarge { limit: usize },
}

/// Failure modes of `format_pattern`. Only strict bundles produce the
/// first variant; only strict caches produce the second.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    #[error(transparent)]
    Formatting(#[from] FormattingIntegrityError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What `add_resource` reports back: unparsed fragments and entries that
/// failed semantic validation (and were therefore not registered).
#[derive(Debug, Default)]
pub struct AddResourceResult {
    pub junk: Vec<Junk>,
    pub validation: ValidationReport,
}

/// Introspection report for one message, serializable for tooling.
#[derive(Debug, Clone, Serialize)]
pub struct MessageIntrospection {
    pub id: String,
    pub has_value: bool,
    pub attributes: Vec<String>,
    /// Variables the message consumes, sorted.
    pub variables: Vec<String>,
    /// Namespace-prefixed entry references (`msg:...`, `term:...`).
    pub references: Vec<String>,
}

struct BundleInner {
    messages: HashMap<String, Message>,
    terms: HashMap<String, Term>,
    functions: FunctionRegistry,
    cache: Option<IntegrityCache>,
}

/// A per-locale registry of messages, terms, and functions with format
/// entry points.
pub struct FluentBundle {
    locale: Arc<LocaleContext>,
    config: BundleConfig,
    resolver_config: ResolverConfig,
    inner: RwLock<BundleInner>,
}

impl FluentBundle {
    pub fn new(config: BundleConfig) -> Result<Self, BundleError> {
        let locale = LocaleContext::obtain(&config.locale)?;
        let cache = config.enable_cache.then(|| {
            IntegrityCache::new(CacheConfig {
                max_entries: config.cache_size,
                max_total_weight: config.cache_size.saturating_mul(config.max_entry_weight),
                max_entry_weight: config.max_entry_weight,
                strict: config.strict,
            })
        });
        let resolver_config = ResolverConfig {
            use_isolating: config.use_isolating,
            max_depth: MAX_DEPTH,
            max_expression_depth: MAX_DEPTH,
            max_expansion_size: config.max_expansion_size,
        };
        Ok(Self {
            locale,
            config,
            resolver_config,
            inner: RwLock::new(BundleInner {
                messages: HashMap::new(),
                terms: HashMap::new(),
                functions: FunctionRegistry::with_builtins(),
                cache,
            }),
        })
    }

    pub fn locale_code(&self) -> &str {
        self.locale.code()
    }

    fn read(&self) -> RwLockReadGuard<'_, BundleInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BundleInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Parse `source` and register its entries, first-writer-wins.
    ///
    /// Junk and semantically invalid entries are returned for inspection;
    /// neither blocks the rest of the resource. The cache is invalidated.
    pub fn add_resource(&self, source: &str) -> Result<AddResourceResult, BundleError> {
        if source.len() > self.config.max_source_size {
            return Err(BundleError::SourceTooLarge {
                limit: self.config.max_source_size,
            });
        }

        let resource = parse_with_options(
            source,
            &ParseOptions {
                max_nesting_depth: self.config.max_nesting_depth,
                max_source_size: self.config.max_source_size,
            },
        );

        let mut result = AddResourceResult::default();
        let mut inner = self.write();

        for entry in resource.entries {
            let report = validate_entry(&entry);
            if !report.is_valid() {
                result.validation.merge(report);
                continue;
            }
            result.validation.merge(report);

            match entry {
                Entry::Message(message) => {
                    let id = message.id.name.clone();
                    if inner.messages.contains_key(&id) {
                        warn!("message {id} is already registered; keeping the original");
                    } else {
                        inner.messages.insert(id, message);
                    }
                }
                Entry::Term(term) => {
                    let id = term.id.name.clone();
                    if inner.terms.contains_key(&id) {
                        warn!("term -{id} is already registered; keeping the original");
                    } else {
                        inner.terms.insert(id, term);
                    }
                }
                Entry::Comment(_) => {}
                Entry::Junk(junk) => result.junk.push(junk),
            }
        }

        if let Some(cache) = &inner.cache {
            cache.clear();
        }
        Ok(result)
    }

    /// Register a custom function. Duplicate names keep the original, like
    /// entries. Invalidates the cache.
    pub fn add_function(
        &self,
        name: &str,
        callable: FluentFunction,
        positional_arity: usize,
        requires_locale: bool,
        named_params: &[&str],
    ) -> Result<(), FunctionError> {
        let mut inner = self.write();
        if inner.functions.has_function(name) {
            functions::warn_duplicate_function(name);
            return Ok(());
        }
        inner
            .functions
            .register(name, callable, positional_arity, requires_locale, named_params)?;
        if let Some(cache) = &inner.cache {
            cache.clear();
        }
        Ok(())
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.read().messages.contains_key(id)
    }

    pub fn get_message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().messages.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.read().cache.as_ref().map(IntegrityCache::stats)
    }

    /// RAII scope: on drop, the cache is cleared but entries survive.
    pub fn scope(&self) -> BundleScope<'_> {
        BundleScope { bundle: self }
    }

    /// Format a message (or one of its attributes) with the given
    /// arguments.
    ///
    /// Non-strict bundles always return `Ok((text, errors))`; callers are
    /// expected to check the error list. Strict bundles raise on any
    /// resolution error, carrying the fallback text and the errors.
    pub fn format_pattern(
        &self,
        id: &str,
        args: Option<&FluentArgs>,
        attribute: Option<&str>,
    ) -> Result<(String, Vec<FluentError>), FormatError> {
        // Boundary validation never raises, even in strict mode.
        if !is_valid_identifier(id) {
            return Ok((
                INVALID_INPUT_SENTINEL.to_string(),
                vec![FluentError::new(
                    DiagnosticCode::InvalidArgument,
                    format!("not a valid message id: {id:?}"),
                )],
            ));
        }
        if let Some(attr) = attribute {
            if !is_valid_identifier(attr) {
                return Ok((
                    INVALID_INPUT_SENTINEL.to_string(),
                    vec![FluentError::new(
                        DiagnosticCode::InvalidArgument,
                        format!("not a valid attribute name: {attr:?}"),
                    )],
                ));
            }
        }

        let inner = self.read();

        let cache_key = inner.cache.as_ref().and_then(|cache| {
            match IntegrityCache::make_key(
                id,
                attribute,
                self.locale.code(),
                self.config.use_isolating,
                args,
            ) {
                Ok(key) => Some(key),
                Err(_) => {
                    cache.note_unhashable();
                    None
                }
            }
        });

        if let (Some(cache), Some(key)) = (inner.cache.as_ref(), cache_key) {
            if let Some((formatted, errors)) = cache.get(&key)? {
                return self.finish(id, formatted, errors);
            }
        }

        let (formatted, errors) = self.resolve(&inner, id, args, attribute);

        // Cache before any strict-mode raise, so statistics agree across
        // modes.
        if let (Some(cache), Some(key)) = (inner.cache.as_ref(), cache_key) {
            cache.put(key, &formatted, &errors)?;
        }

        self.finish(id, formatted, errors)
    }

    fn finish(
        &self,
        id: &str,
        formatted: String,
        errors: Vec<FluentError>,
    ) -> Result<(String, Vec<FluentError>), FormatError> {
        if self.config.strict && !errors.is_empty() {
            return Err(FormatError::Formatting(FormattingIntegrityError {
                message_id: id.to_string(),
                errors,
                fallback: formatted,
            }));
        }
        Ok((formatted, errors))
    }

    fn resolve(
        &self,
        inner: &BundleInner,
        id: &str,
        args: Option<&FluentArgs>,
        attribute: Option<&str>,
    ) -> (String, Vec<FluentError>) {
        let key = RefKey::message(id, attribute);

        let Some(message) = inner.messages.get(id) else {
            return (
                format!("{{{id}}}"),
                vec![FluentError::new(
                    DiagnosticCode::MessageNotFound,
                    format!("unknown message: {id}"),
                )],
            );
        };

        let pattern = match attribute {
            Some(attr) => match message.attributes.iter().find(|a| a.id.name == attr) {
                Some(a) => &a.value,
                None => {
                    return (
                        format!("{{{id}.{attr}}}"),
                        vec![FluentError::new(
                            DiagnosticCode::MessageNotFound,
                            format!("message {id} has no attribute .{attr}"),
                        )],
                    );
                }
            },
            None => match &message.value {
                Some(value) => value,
                None => {
                    return (
                        format!("{{{id}}}"),
                        vec![FluentError::new(
                            DiagnosticCode::PatternInvalid,
                            format!("message {id} has no value"),
                        )],
                    );
                }
            },
        };

        let scope = Scope {
            messages: &inner.messages,
            terms: &inner.terms,
            functions: &inner.functions,
            locale: &self.locale,
            config: &self.resolver_config,
        };
        resolver::format_pattern(&scope, key, pattern, args)
    }

    /// Structural report of one message: attributes, referenced variables,
    /// and entry references.
    pub fn introspect_message(&self, id: &str) -> Option<MessageIntrospection> {
        let inner = self.read();
        let message = inner.messages.get(id)?;

        struct VariableCollector {
            depth: VisitDepth,
            variables: Vec<String>,
        }
        impl Visitor for VariableCollector {
            fn depth(&mut self) -> &mut VisitDepth {
                &mut self.depth
            }
            fn visit_inline_expression(&mut self, expr: &InlineExpression) -> VisitResult {
                if let InlineExpression::VariableReference { id } = expr {
                    self.variables.push(id.name.clone());
                }
                walk_inline_expression(self, expr)
            }
        }

        let entry = Entry::Message(message.clone());
        let mut collector = VariableCollector {
            depth: VisitDepth::default(),
            variables: Vec::new(),
        };
        let _ = collector.visit_entry(&entry);
        collector.variables.sort();
        collector.variables.dedup();

        Some(MessageIntrospection {
            id: id.to_string(),
            has_value: message.value.is_some(),
            attributes: message.attributes.iter().map(|a| a.id.name.clone()).collect(),
            variables: collector.variables,
            references: analysis::entry_dependencies(&entry).into_iter().collect(),
        })
    }

    /// Run the cross-entry analyses (cycles, chains, shadows) over the
    /// currently registered entries.
    pub fn analyze(&self) -> Vec<crate::error::ValidationIssue> {
        let inner = self.read();
        let entries: Vec<Entry> = inner
            .messages
            .values()
            .cloned()
            .map(Entry::Message)
            .chain(inner.terms.values().cloned().map(Entry::Term))
            .collect();
        let resource = crate::ast::Resource { entries };
        analysis::analyze(&resource, analysis::DEFAULT_MAX_CHAIN_DEPTH)
    }
}

/// Scope guard from [`FluentBundle::scope`]: clears the cache on drop,
/// preserving entries.
pub struct BundleScope<'b> {
    bundle: &'b FluentBundle,
}

impl std::ops::Deref for BundleScope<'_> {
    type Target = FluentBundle;

    fn deref(&self) -> &Self::Target {
        self.bundle
    }
}

impl Drop for BundleScope<'_> {
    fn drop(&mut self) {
        let inner = self.bundle.read();
        if let Some(cache) = &inner.cache {
            cache.clear();
        }
    }
}
