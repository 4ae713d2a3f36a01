//! Pattern resolution: the tree-walking interpreter behind
//! `format_pattern`.
//!
//! Resolution never fails in the Rust sense — every miss, cycle, or type
//! problem is recorded as a [`FluentError`] and replaced by a visibly
//! braced fallback. The one hard abort is the expansion budget, which
//! bounds total output size and defeats billion-laughs inputs; it unwinds
//! through [`BudgetExceeded`] and still returns the partial output.
//!
//! Reference entry follows a fixed sequence: check the cycle stack, check
//! the depth limit, then push the reference and resolve under an RAII
//! guard that pops on every exit path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use crate::ast::{
    CallArguments, Expression, InlineExpression, Message, Pattern, PatternElement, Placeable,
    SelectExpression, Term, Variant, VariantKey,
};
use crate::error::{DiagnosticCode, FluentError};
use crate::functions::{FunctionError, FunctionRegistry, NamedArgs};
use crate::locale::{DateTimeFormatOptions, LocaleContext, NumberFormatOptions};
use crate::plural::select_plural_category;
use crate::value::{ingest, FluentArgs, FluentNumber, FluentValue};
use crate::{DEFAULT_MAX_EXPANSION_SIZE, MAX_DEPTH};

/// First Strong Isolate / Pop Directional Isolate, wrapped around
/// interpolated values for safe bidirectional rendering.
pub const FSI: char = '\u{2068}';
pub const PDI: char = '\u{2069}';

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Wrap interpolated variable values in FSI/PDI.
    pub use_isolating: bool,
    /// Total reference-chain depth.
    pub max_depth: usize,
    /// Orthogonal bound on placeable nesting within one pattern.
    pub max_expression_depth: usize,
    /// Output budget in bytes.
    pub max_expansion_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            use_isolating: true,
            max_depth: MAX_DEPTH,
            max_expression_depth: MAX_DEPTH,
            max_expansion_size: DEFAULT_MAX_EXPANSION_SIZE,
        }
    }
}

/// Everything a resolution needs from its bundle, borrowed for one call.
pub(crate) struct Scope<'b> {
    pub messages: &'b HashMap<String, Message>,
    pub terms: &'b HashMap<String, Term>,
    pub functions: &'b FunctionRegistry,
    pub locale: &'b LocaleContext,
    pub config: &'b ResolverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RefKind {
    Message,
    Term,
}

/// A reference on the cycle stack. Attribute-granular, so two attributes
/// of one message referencing each other non-cyclically do not trip the
/// detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RefKey {
    pub kind: RefKind,
    pub id: String,
    pub attribute: Option<String>,
}

impl RefKey {
    pub fn message(id: &str, attribute: Option<&str>) -> Self {
        Self {
            kind: RefKind::Message,
            id: id.to_string(),
            attribute: attribute.map(str::to_string),
        }
    }

    pub fn term(id: &str, attribute: Option<&str>) -> Self {
        Self {
            kind: RefKind::Term,
            id: id.to_string(),
            attribute: attribute.map(str::to_string),
        }
    }

    /// The visibly braced fallback for this reference.
    fn fallback(&self) -> String {
        let sigil = match self.kind {
            RefKind::Message => "",
            RefKind::Term => "-",
        };
        match &self.attribute {
            Some(attr) => format!("{{{sigil}{}.{attr}}}", self.id),
            None => format!("{{{sigil}{}}}", self.id),
        }
    }

    fn describe(&self) -> String {
        let sigil = match self.kind {
            RefKind::Message => "",
            RefKind::Term => "-",
        };
        match &self.attribute {
            Some(attr) => format!("{sigil}{}.{attr}", self.id),
            None => format!("{sigil}{}", self.id),
        }
    }
}

/// Marker for the only hard abort: the expansion budget.
#[derive(Debug)]
pub(crate) struct BudgetExceeded;

type ResolveResult = Result<(), BudgetExceeded>;

enum ValueError {
    /// Diagnostics already recorded; the caller substitutes a fallback.
    Unresolved,
    Budget(BudgetExceeded),
}

impl From<BudgetExceeded> for ValueError {
    fn from(b: BudgetExceeded) -> Self {
        ValueError::Budget(b)
    }
}

/// Per-call transient state. Constructed fresh for every top-level
/// `format_pattern`, lives on the stack, never shared.
pub(crate) struct ResolutionContext<'a> {
    args: Option<&'a FluentArgs>,
    /// Term-local arguments; they shadow `args` inside the term's body.
    local_args: Option<BTreeMap<String, FluentValue>>,
    pub errors: Vec<FluentError>,
    /// Ordered stack plus a set for O(1) membership.
    stack: Vec<RefKey>,
    seen: HashSet<RefKey>,
    depth: usize,
    expr_depth: usize,
    expanded: usize,
    max_expansion_size: usize,
    budget_blown: bool,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(args: Option<&'a FluentArgs>, config: &ResolverConfig) -> Self {
        Self {
            args,
            local_args: None,
            errors: Vec::new(),
            stack: Vec::new(),
            seen: HashSet::new(),
            depth: 0,
            expr_depth: 0,
            expanded: 0,
            max_expansion_size: config.max_expansion_size,
            budget_blown: false,
        }
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.errors.push(FluentError::new(code, message));
    }

    /// Reference admission: cycle check, then depth check.
    fn check_reference(&self, key: &RefKey, max_depth: usize) -> Result<(), FluentError> {
        if self.seen.contains(key) {
            return Err(FluentError::new(
                DiagnosticCode::CyclicReference,
                format!("cyclic reference involving {}", key.describe()),
            ));
        }
        if self.depth >= max_depth {
            return Err(FluentError::new(
                DiagnosticCode::DepthLimitExceeded,
                format!("resolution depth exceeded {max_depth} at {}", key.describe()),
            ));
        }
        Ok(())
    }

    /// Push a checked reference; the returned guard pops it on drop.
    fn push_reference<'c>(&'c mut self, key: RefKey) -> RefGuard<'c, 'a> {
        self.seen.insert(key.clone());
        self.stack.push(key);
        self.depth += 1;
        RefGuard { ctx: self }
    }

    /// Count produced output against the budget.
    fn grow(&mut self, bytes: usize) -> ResolveResult {
        if self.budget_blown {
            return Err(BudgetExceeded);
        }
        self.expanded += bytes;
        if self.expanded > self.max_expansion_size {
            self.budget_blown = true;
            self.error(
                DiagnosticCode::ExpansionBudgetExceeded,
                format!(
                    "resolved output exceeded the expansion budget of {} bytes",
                    self.max_expansion_size
                ),
            );
            return Err(BudgetExceeded);
        }
        Ok(())
    }
}

/// Pops the reference pushed by [`ResolutionContext::enter`] on every exit
/// path, including error returns.
pub(crate) struct RefGuard<'c, 'a> {
    ctx: &'c mut ResolutionContext<'a>,
}

impl<'a> Deref for RefGuard<'_, 'a> {
    type Target = ResolutionContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for RefGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for RefGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(key) = self.ctx.stack.pop() {
            self.ctx.seen.remove(&key);
        }
        self.ctx.depth = self.ctx.depth.saturating_sub(1);
    }
}

/// Top-level driver: resolve `pattern` as the body of `root`.
///
/// Returns the formatted output (partial if the budget aborted) and every
/// accumulated error.
pub(crate) fn format_pattern(
    scope: &Scope<'_>,
    root: RefKey,
    pattern: &Pattern,
    args: Option<&FluentArgs>,
) -> (String, Vec<FluentError>) {
    let mut ctx = ResolutionContext::new(args, scope.config);
    let mut out = String::new();
    {
        // A fresh context admits any first reference.
        let mut guard = ctx.push_reference(root);
        let _ = resolve_pattern(scope, pattern, &mut guard, &mut out);
    }
    (out, ctx.errors)
}

fn emit(ctx: &mut ResolutionContext<'_>, out: &mut String, text: &str) -> ResolveResult {
    ctx.grow(text.len())?;
    out.push_str(text);
    Ok(())
}

pub(crate) fn resolve_pattern(
    scope: &Scope<'_>,
    pattern: &Pattern,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    for element in &pattern.elements {
        match element {
            PatternElement::Text(t) => emit(ctx, out, &t.value)?,
            PatternElement::Placeable(p) => resolve_placeable(scope, p, ctx, out)?,
        }
    }
    Ok(())
}

fn resolve_placeable(
    scope: &Scope<'_>,
    placeable: &Placeable,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    if ctx.expr_depth >= scope.config.max_expression_depth {
        ctx.error(
            DiagnosticCode::DepthLimitExceeded,
            format!(
                "expression nesting exceeded {}",
                scope.config.max_expression_depth
            ),
        );
        return Ok(());
    }
    ctx.expr_depth += 1;

    let isolate = scope.config.use_isolating
        && matches!(
            placeable.expression,
            Expression::Inline(InlineExpression::VariableReference { .. })
        );

    let result = (|| -> ResolveResult {
        if isolate {
            emit(ctx, out, &FSI.to_string())?;
        }
        match &placeable.expression {
            Expression::Inline(expr) => resolve_inline(scope, expr, ctx, out)?,
            Expression::Select(select) => resolve_select(scope, select, ctx, out)?,
        }
        if isolate {
            emit(ctx, out, &PDI.to_string())?;
        }
        Ok(())
    })();

    ctx.expr_depth -= 1;
    result
}

fn resolve_inline(
    scope: &Scope<'_>,
    expr: &InlineExpression,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    match expr {
        InlineExpression::StringLiteral { value, .. } => emit(ctx, out, value),
        InlineExpression::NumberLiteral(literal) => {
            let number = FluentNumber::from_literal(literal);
            let text = scope
                .locale
                .format_number(&number, &NumberFormatOptions::default());
            emit(ctx, out, &text)
        }
        InlineExpression::VariableReference { id } => resolve_variable(scope, &id.name, ctx, out),
        InlineExpression::MessageReference { id, attribute } => resolve_message_reference(
            scope,
            &id.name,
            attribute.as_ref().map(|a| a.name.as_str()),
            ctx,
            out,
        ),
        InlineExpression::TermReference {
            id,
            attribute,
            arguments,
        } => resolve_term_reference(
            scope,
            &id.name,
            attribute.as_ref().map(|a| a.name.as_str()),
            arguments.as_ref(),
            ctx,
            out,
        ),
        InlineExpression::FunctionReference { id, arguments } => {
            resolve_function_reference(scope, &id.name, arguments, ctx, out)
        }
        InlineExpression::Placeable(p) => resolve_placeable(scope, p, ctx, out),
    }
}

fn write_value(
    scope: &Scope<'_>,
    value: &FluentValue,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    match value {
        FluentValue::String(s) => emit(ctx, out, s),
        FluentValue::Number(n) => {
            let text = match &n.formatted {
                Some(f) => f.clone(),
                None => scope
                    .locale
                    .format_number(n, &NumberFormatOptions::default()),
            };
            emit(ctx, out, &text)
        }
        FluentValue::DateTime(dt) => {
            let text = scope
                .locale
                .format_datetime(dt, &DateTimeFormatOptions::default());
            emit(ctx, out, &text)
        }
    }
}

/// Look a variable up without rendering it. Term-local arguments shadow the
/// caller's map.
fn lookup_variable(
    name: &str,
    ctx: &mut ResolutionContext<'_>,
) -> Result<FluentValue, ValueError> {
    if let Some(locals) = &ctx.local_args {
        if let Some(value) = locals.get(name) {
            return Ok(value.clone());
        }
    }
    match ctx.args.and_then(|args| args.get(name)) {
        Some(arg) => match ingest(arg) {
            Ok(value) => Ok(value),
            Err(kind) => {
                ctx.error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "variable ${name} has unsupported type: {}",
                        kind.type_name()
                    ),
                );
                Err(ValueError::Unresolved)
            }
        },
        None => {
            ctx.error(
                DiagnosticCode::VariableNotProvided,
                format!("variable ${name} was not provided"),
            );
            Err(ValueError::Unresolved)
        }
    }
}

fn resolve_variable(
    scope: &Scope<'_>,
    name: &str,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    match lookup_variable(name, ctx) {
        Ok(value) => write_value(scope, &value, ctx, out),
        Err(ValueError::Budget(b)) => Err(b),
        Err(ValueError::Unresolved) => emit(ctx, out, &format!("{{${name}}}")),
    }
}

fn resolve_message_reference(
    scope: &Scope<'_>,
    id: &str,
    attribute: Option<&str>,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    let key = RefKey::message(id, attribute);

    let Some(message) = scope.messages.get(id) else {
        ctx.error(
            DiagnosticCode::MessageNotFound,
            format!("unknown message: {id}"),
        );
        return emit(ctx, out, &key.fallback());
    };

    let pattern = match attribute {
        Some(attr) => match message.attributes.iter().find(|a| a.id.name == attr) {
            Some(a) => &a.value,
            None => {
                ctx.error(
                    DiagnosticCode::MessageNotFound,
                    format!("message {id} has no attribute .{attr}"),
                );
                return emit(ctx, out, &key.fallback());
            }
        },
        None => match &message.value {
            Some(value) => value,
            None => {
                ctx.error(
                    DiagnosticCode::PatternInvalid,
                    format!("message {id} has no value"),
                );
                return emit(ctx, out, &key.fallback());
            }
        },
    };

    resolve_reference_pattern(scope, key, pattern, None, ctx, out)
}

fn resolve_term_reference(
    scope: &Scope<'_>,
    id: &str,
    attribute: Option<&str>,
    arguments: Option<&CallArguments>,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    let key = RefKey::term(id, attribute);

    let Some(term) = scope.terms.get(id) else {
        ctx.error(DiagnosticCode::TermNotFound, format!("unknown term: -{id}"));
        return emit(ctx, out, &key.fallback());
    };

    let pattern = match attribute {
        Some(attr) => match term.attributes.iter().find(|a| a.id.name == attr) {
            Some(a) => &a.value,
            None => {
                ctx.error(
                    DiagnosticCode::TermNotFound,
                    format!("term -{id} has no attribute .{attr}"),
                );
                return emit(ctx, out, &key.fallback());
            }
        },
        None => &term.value,
    };

    // Evaluate the term's own arguments in the caller's scope before
    // swapping them in.
    let locals = match arguments {
        Some(args) => match evaluate_term_arguments(scope, args, ctx) {
            Ok(locals) => Some(locals),
            Err(ValueError::Budget(b)) => return Err(b),
            Err(ValueError::Unresolved) => return emit(ctx, out, &key.fallback()),
        },
        None => None,
    };

    resolve_reference_pattern(scope, key, pattern, locals, ctx, out)
}

fn evaluate_term_arguments(
    scope: &Scope<'_>,
    arguments: &CallArguments,
    ctx: &mut ResolutionContext<'_>,
) -> Result<BTreeMap<String, FluentValue>, ValueError> {
    let mut locals = BTreeMap::new();
    for named in &arguments.named {
        let value = resolve_inline_to_value(scope, &named.value, ctx)?;
        locals.insert(named.name.name.clone(), value);
    }
    // Positional term arguments have no parameter names to bind to; they
    // are accepted and ignored.
    Ok(locals)
}

/// Shared tail of message and term references: admission checks, push
/// under the RAII guard, swap any term-local arguments, resolve, restore.
fn resolve_reference_pattern(
    scope: &Scope<'_>,
    key: RefKey,
    pattern: &Pattern,
    locals: Option<BTreeMap<String, FluentValue>>,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    if let Err(err) = ctx.check_reference(&key, scope.config.max_depth) {
        let fallback = key.fallback();
        ctx.errors.push(err);
        return emit(ctx, out, &fallback);
    }

    let mut guard = ctx.push_reference(key);
    if let Some(locals) = locals {
        let saved = guard.local_args.take();
        guard.local_args = Some(locals);
        let result = resolve_pattern(scope, pattern, &mut guard, out);
        guard.local_args = saved;
        result
    } else {
        resolve_pattern(scope, pattern, &mut *guard, out)
    }
}

fn resolve_function_reference(
    scope: &Scope<'_>,
    name: &str,
    arguments: &CallArguments,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    match resolve_function_to_value(scope, name, arguments, ctx) {
        Ok(value) => write_value(scope, &value, ctx, out),
        Err(ValueError::Budget(b)) => Err(b),
        Err(ValueError::Unresolved) => emit(ctx, out, &format!("{{{name}()}}")),
    }
}

/// Evaluate an inline expression to a value (selector and argument
/// positions).
fn resolve_inline_to_value(
    scope: &Scope<'_>,
    expr: &InlineExpression,
    ctx: &mut ResolutionContext<'_>,
) -> Result<FluentValue, ValueError> {
    match expr {
        InlineExpression::StringLiteral { value, .. } => Ok(FluentValue::String(value.clone())),
        InlineExpression::NumberLiteral(literal) => {
            Ok(FluentValue::Number(FluentNumber::from_literal(literal)))
        }
        InlineExpression::VariableReference { id } => lookup_variable(&id.name, ctx),
        InlineExpression::FunctionReference { id, arguments } => {
            resolve_function_to_value(scope, &id.name, arguments, ctx)
        }
        InlineExpression::TermReference {
            id,
            attribute,
            arguments,
        } => {
            let mut buffer = String::new();
            resolve_term_reference(
                scope,
                &id.name,
                attribute.as_ref().map(|a| a.name.as_str()),
                arguments.as_ref(),
                ctx,
                &mut buffer,
            )
            .map_err(ValueError::from)?;
            Ok(FluentValue::String(buffer))
        }
        InlineExpression::MessageReference { id, .. } => {
            ctx.error(
                DiagnosticCode::UnknownExpression,
                format!("message {id} cannot be used as a value"),
            );
            Err(ValueError::Unresolved)
        }
        InlineExpression::Placeable(p) => {
            let mut buffer = String::new();
            resolve_placeable(scope, p, ctx, &mut buffer).map_err(ValueError::from)?;
            Ok(FluentValue::String(buffer))
        }
    }
}

/// Function call in value position: returns the function's value (numbers
/// keep their precision for plural selection).
fn resolve_function_to_value(
    scope: &Scope<'_>,
    name: &str,
    arguments: &CallArguments,
    ctx: &mut ResolutionContext<'_>,
) -> Result<FluentValue, ValueError> {
    let mut positional: Vec<FluentValue> = Vec::with_capacity(arguments.positional.len());
    for arg in &arguments.positional {
        positional.push(resolve_inline_to_value(scope, arg, ctx)?);
    }
    let mut named: NamedArgs = NamedArgs::new();
    for arg in &arguments.named {
        named.insert(
            arg.name.name.clone(),
            resolve_inline_to_value(scope, &arg.value, ctx)?,
        );
    }

    match scope.functions.call(name, &positional, &named, scope.locale) {
        Ok(value) => Ok(value),
        Err(FunctionError::Unknown { .. }) => {
            ctx.error(
                DiagnosticCode::FunctionNotFound,
                format!("unknown function: {name}"),
            );
            Err(ValueError::Unresolved)
        }
        Err(err @ (FunctionError::Arity { .. } | FunctionError::MissingArgument { .. })) => {
            ctx.error(DiagnosticCode::ArgumentRequired, err.to_string());
            Err(ValueError::Unresolved)
        }
        Err(err) => {
            ctx.error(DiagnosticCode::InvalidArgument, err.to_string());
            Err(ValueError::Unresolved)
        }
    }
}

fn resolve_select(
    scope: &Scope<'_>,
    select: &SelectExpression,
    ctx: &mut ResolutionContext<'_>,
    out: &mut String,
) -> ResolveResult {
    let selected = match resolve_inline_to_value(scope, &select.selector, ctx) {
        Ok(value) => match_variant(scope, select, &value),
        Err(ValueError::Budget(b)) => return Err(b),
        Err(ValueError::Unresolved) => None,
    };

    let variant = selected.or_else(|| default_variant(select));
    match variant {
        Some(variant) => resolve_pattern(scope, &variant.value, ctx, out),
        None => {
            // Validation rejects selects without a default; tolerate the
            // unvalidated case by falling back to the first variant.
            ctx.error(
                DiagnosticCode::PatternInvalid,
                "select expression has no default variant".to_string(),
            );
            match select.variants.first() {
                Some(first) => resolve_pattern(scope, &first.value, ctx, out),
                None => Ok(()),
            }
        }
    }
}

fn default_variant(select: &SelectExpression) -> Option<&Variant> {
    select.variants.iter().find(|v| v.default)
}

/// Variant matching: numeric selectors match exact number keys first, then
/// their CLDR plural category against identifier keys; string selectors
/// match identifier keys literally.
fn match_variant<'s>(
    scope: &Scope<'_>,
    select: &'s SelectExpression,
    value: &FluentValue,
) -> Option<&'s Variant> {
    match value {
        FluentValue::Number(number) => {
            if let Some(selector) = number.as_decimal() {
                for variant in &select.variants {
                    if let VariantKey::Number(key) = &variant.key {
                        let key_number = FluentNumber::from_literal(key);
                        if key_number.as_decimal() == Some(selector) {
                            return Some(variant);
                        }
                    }
                }
            }
            let category = select_plural_category(number, scope.locale);
            select.variants.iter().find(|variant| {
                matches!(&variant.key, VariantKey::Identifier(id) if id.name == category.as_str())
            })
        }
        FluentValue::String(s) => select.variants.iter().find(|variant| {
            matches!(&variant.key, VariantKey::Identifier(id) if id.name == *s)
        }),
        FluentValue::DateTime(_) => None,
    }
}
