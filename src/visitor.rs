//! AST traversal: read-only visitors and rebuilding transformers.
//!
//! `visit_*` methods default to the matching `walk_*` free function, so an
//! implementor overrides only the nodes it cares about and calls `walk_*`
//! to continue into children. Dispatch is static; monomorphization plays
//! the role a cached dispatch table would in a dynamic language.
//!
//! Traversal is depth-guarded: every nested visit goes through the
//! visitor's [`VisitDepth`], and exceeding the limit produces
//! [`DepthLimitError`] instead of a stack overflow. Parsed trees are
//! already bounded by the parser's nesting cap; the guard exists for
//! programmatically built trees.

use thiserror::Error;

use crate::ast::{
    Attribute, CallArguments, Comment, Entry, Expression, InlineExpression, Junk, Message,
    Pattern, PatternElement, Placeable, Resource, SelectExpression, Term, Variant,
};
use crate::MAX_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("traversal depth exceeded limit of {limit}")]
pub struct DepthLimitError {
    pub limit: usize,
}

pub type VisitResult = Result<(), DepthLimitError>;

/// Depth counter carried by every visitor.
#[derive(Debug, Clone)]
pub struct VisitDepth {
    current: usize,
    limit: usize,
}

impl Default for VisitDepth {
    fn default() -> Self {
        Self::with_limit(MAX_DEPTH)
    }
}

impl VisitDepth {
    pub fn with_limit(limit: usize) -> Self {
        Self { current: 0, limit }
    }

    pub fn enter(&mut self) -> VisitResult {
        if self.current >= self.limit {
            return Err(DepthLimitError { limit: self.limit });
        }
        self.current += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.current = self.current.saturating_sub(1);
    }
}

pub trait Visitor: Sized {
    /// Storage for the traversal depth guard.
    fn depth(&mut self) -> &mut VisitDepth;

    fn visit_resource(&mut self, resource: &Resource) -> VisitResult {
        walk_resource(self, resource)
    }

    fn visit_entry(&mut self, entry: &Entry) -> VisitResult {
        walk_entry(self, entry)
    }

    fn visit_message(&mut self, message: &Message) -> VisitResult {
        walk_message(self, message)
    }

    fn visit_term(&mut self, term: &Term) -> VisitResult {
        walk_term(self, term)
    }

    fn visit_comment(&mut self, _comment: &Comment) -> VisitResult {
        Ok(())
    }

    fn visit_junk(&mut self, _junk: &Junk) -> VisitResult {
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> VisitResult {
        walk_attribute(self, attribute)
    }

    fn visit_pattern(&mut self, pattern: &Pattern) -> VisitResult {
        walk_pattern(self, pattern)
    }

    fn visit_placeable(&mut self, placeable: &Placeable) -> VisitResult {
        walk_placeable(self, placeable)
    }

    fn visit_inline_expression(&mut self, expr: &InlineExpression) -> VisitResult {
        walk_inline_expression(self, expr)
    }

    fn visit_select_expression(&mut self, select: &SelectExpression) -> VisitResult {
        walk_select_expression(self, select)
    }

    fn visit_variant(&mut self, variant: &Variant) -> VisitResult {
        walk_variant(self, variant)
    }

    fn visit_call_arguments(&mut self, args: &CallArguments) -> VisitResult {
        walk_call_arguments(self, args)
    }
}

/// Run `body` one level deeper, releasing the guard on every exit path.
fn guarded<V: Visitor>(
    v: &mut V,
    body: impl FnOnce(&mut V) -> VisitResult,
) -> VisitResult {
    v.depth().enter()?;
    let result = body(v);
    v.depth().exit();
    result
}

pub fn walk_resource<V: Visitor>(v: &mut V, resource: &Resource) -> VisitResult {
    guarded(v, |v| {
        for entry in &resource.entries {
            v.visit_entry(entry)?;
        }
        Ok(())
    })
}

pub fn walk_entry<V: Visitor>(v: &mut V, entry: &Entry) -> VisitResult {
    guarded(v, |v| match entry {
        Entry::Message(m) => v.visit_message(m),
        Entry::Term(t) => v.visit_term(t),
        Entry::Comment(c) => v.visit_comment(c),
        Entry::Junk(j) => v.visit_junk(j),
    })
}

pub fn walk_message<V: Visitor>(v: &mut V, message: &Message) -> VisitResult {
    guarded(v, |v| {
        if let Some(value) = &message.value {
            v.visit_pattern(value)?;
        }
        for attr in &message.attributes {
            v.visit_attribute(attr)?;
        }
        Ok(())
    })
}

pub fn walk_term<V: Visitor>(v: &mut V, term: &Term) -> VisitResult {
    guarded(v, |v| {
        v.visit_pattern(&term.value)?;
        for attr in &term.attributes {
            v.visit_attribute(attr)?;
        }
        Ok(())
    })
}

pub fn walk_attribute<V: Visitor>(v: &mut V, attribute: &Attribute) -> VisitResult {
    guarded(v, |v| v.visit_pattern(&attribute.value))
}

pub fn walk_pattern<V: Visitor>(v: &mut V, pattern: &Pattern) -> VisitResult {
    guarded(v, |v| {
        for el in &pattern.elements {
            if let PatternElement::Placeable(p) = el {
                v.visit_placeable(p)?;
            }
        }
        Ok(())
    })
}

pub fn walk_placeable<V: Visitor>(v: &mut V, placeable: &Placeable) -> VisitResult {
    guarded(v, |v| match &placeable.expression {
        Expression::Inline(i) => v.visit_inline_expression(i),
        Expression::Select(s) => v.visit_select_expression(s),
    })
}

pub fn walk_inline_expression<V: Visitor>(v: &mut V, expr: &InlineExpression) -> VisitResult {
    guarded(v, |v| match expr {
        InlineExpression::TermReference {
            arguments: Some(args),
            ..
        } => v.visit_call_arguments(args),
        InlineExpression::FunctionReference { arguments, .. } => v.visit_call_arguments(arguments),
        InlineExpression::Placeable(p) => v.visit_placeable(p),
        _ => Ok(()),
    })
}

pub fn walk_select_expression<V: Visitor>(v: &mut V, select: &SelectExpression) -> VisitResult {
    guarded(v, |v| {
        v.visit_inline_expression(&select.selector)?;
        for variant in &select.variants {
            v.visit_variant(variant)?;
        }
        Ok(())
    })
}

pub fn walk_variant<V: Visitor>(v: &mut V, variant: &Variant) -> VisitResult {
    guarded(v, |v| v.visit_pattern(&variant.value))
}

pub fn walk_call_arguments<V: Visitor>(v: &mut V, args: &CallArguments) -> VisitResult {
    guarded(v, |v| {
        for p in &args.positional {
            v.visit_inline_expression(p)?;
        }
        for n in &args.named {
            v.visit_inline_expression(&n.value)?;
        }
        Ok(())
    })
}

// ============================================================================
// Transformer
// ============================================================================

/// Consuming, rebuilding traversal. Default methods reconstruct each node
/// from transformed children; unchanged subtrees move through untouched, so
/// an override only pays for what it changes.
pub trait Transformer: Sized {
    fn transform_resource(&mut self, resource: Resource) -> Resource {
        Resource {
            entries: resource
                .entries
                .into_iter()
                .map(|e| self.transform_entry(e))
                .collect(),
        }
    }

    fn transform_entry(&mut self, entry: Entry) -> Entry {
        match entry {
            Entry::Message(m) => Entry::Message(self.transform_message(m)),
            Entry::Term(t) => Entry::Term(self.transform_term(t)),
            Entry::Comment(c) => Entry::Comment(self.transform_comment(c)),
            Entry::Junk(j) => Entry::Junk(self.transform_junk(j)),
        }
    }

    fn transform_message(&mut self, message: Message) -> Message {
        Message {
            id: message.id,
            value: message.value.map(|p| self.transform_pattern(p)),
            attributes: message
                .attributes
                .into_iter()
                .map(|a| self.transform_attribute(a))
                .collect(),
            comment: message.comment.map(|c| self.transform_comment(c)),
            span: message.span,
        }
    }

    fn transform_term(&mut self, term: Term) -> Term {
        Term {
            id: term.id,
            value: self.transform_pattern(term.value),
            attributes: term
                .attributes
                .into_iter()
                .map(|a| self.transform_attribute(a))
                .collect(),
            comment: term.comment.map(|c| self.transform_comment(c)),
            span: term.span,
        }
    }

    fn transform_comment(&mut self, comment: Comment) -> Comment {
        comment
    }

    fn transform_junk(&mut self, junk: Junk) -> Junk {
        junk
    }

    fn transform_attribute(&mut self, attribute: Attribute) -> Attribute {
        Attribute {
            id: attribute.id,
            value: self.transform_pattern(attribute.value),
        }
    }

    fn transform_pattern(&mut self, pattern: Pattern) -> Pattern {
        Pattern::new(
            pattern
                .elements
                .into_iter()
                .map(|el| match el {
                    PatternElement::Text(t) => PatternElement::Text(t),
                    PatternElement::Placeable(p) => {
                        PatternElement::Placeable(self.transform_placeable(p))
                    }
                })
                .collect(),
        )
    }

    fn transform_placeable(&mut self, placeable: Placeable) -> Placeable {
        Placeable {
            expression: match placeable.expression {
                Expression::Inline(i) => Expression::Inline(self.transform_inline_expression(i)),
                Expression::Select(s) => Expression::Select(self.transform_select_expression(s)),
            },
        }
    }

    fn transform_inline_expression(&mut self, expr: InlineExpression) -> InlineExpression {
        match expr {
            InlineExpression::TermReference {
                id,
                attribute,
                arguments,
            } => InlineExpression::TermReference {
                id,
                attribute,
                arguments: arguments.map(|a| self.transform_call_arguments(a)),
            },
            InlineExpression::FunctionReference { id, arguments } => {
                InlineExpression::FunctionReference {
                    id,
                    arguments: self.transform_call_arguments(arguments),
                }
            }
            InlineExpression::Placeable(p) => {
                InlineExpression::Placeable(Box::new(self.transform_placeable(*p)))
            }
            other => other,
        }
    }

    fn transform_select_expression(&mut self, select: SelectExpression) -> SelectExpression {
        SelectExpression {
            selector: Box::new(self.transform_inline_expression(*select.selector)),
            variants: select
                .variants
                .into_iter()
                .map(|v| Variant {
                    key: v.key,
                    value: self.transform_pattern(v.value),
                    default: v.default,
                })
                .collect(),
        }
    }

    fn transform_call_arguments(&mut self, args: CallArguments) -> CallArguments {
        CallArguments {
            positional: args
                .positional
                .into_iter()
                .map(|p| self.transform_inline_expression(p))
                .collect(),
            named: args
                .named
                .into_iter()
                .map(|n| crate::ast::NamedArgument {
                    name: n.name,
                    value: self.transform_inline_expression(n.value),
                })
                .collect(),
        }
    }
}

/// Clears entry spans. Used to compare trees parsed from different layouts
/// of the same content.
pub struct SpanStripper;

impl Transformer for SpanStripper {
    fn transform_message(&mut self, message: Message) -> Message {
        let mut m = Message {
            span: None,
            ..message
        };
        m.value = m.value.map(|p| self.transform_pattern(p));
        m.comment = m.comment.map(|c| self.transform_comment(c));
        m
    }

    fn transform_term(&mut self, term: Term) -> Term {
        Term {
            id: term.id,
            value: self.transform_pattern(term.value),
            attributes: term.attributes,
            comment: term.comment.map(|c| self.transform_comment(c)),
            span: None,
        }
    }

    fn transform_comment(&mut self, comment: Comment) -> Comment {
        Comment {
            span: None,
            ..comment
        }
    }

    fn transform_junk(&mut self, junk: Junk) -> Junk {
        Junk { span: None, ..junk }
    }
}

/// Strip all spans from a resource.
pub fn strip_spans(resource: Resource) -> Resource {
    SpanStripper.transform_resource(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Identifier, TextElement};

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

    fn message_with_var(var: &str) -> Resource {
        Resource {
            entries: vec![Entry::Message(Message {
                id: Identifier::new("m"),
                value: Some(Pattern::new(vec![
                    PatternElement::Text(TextElement::new("Hi ")),
                    PatternElement::Placeable(Placeable {
                        expression: Expression::Inline(InlineExpression::VariableReference {
                            id: Identifier::new(var),
                        }),
                    }),
                ])),
                attributes: vec![],
                comment: None,
                span: None,
            })],
        }
    }

    #[test]
    fn variable_collector_finds_variables() {
        let resource = message_with_var("name");
        let mut collector = VariableCollector {
            depth: VisitDepth::default(),
            variables: vec![],
        };
        collector.visit_resource(&resource).unwrap();
        assert_eq!(collector.variables, vec!["name"]);
    }

    #[test]
    fn depth_guard_trips_on_deep_nesting() {
        // Build a placeable nested beyond the limit.
        let mut expr = InlineExpression::VariableReference {
            id: Identifier::new("x"),
        };
        for _ in 0..40 {
            expr = InlineExpression::Placeable(Box::new(Placeable {
                expression: Expression::Inline(expr),
            }));
        }
        let pattern = Pattern::new(vec![PatternElement::Placeable(Placeable {
            expression: Expression::Inline(expr),
        })]);

        struct Walker {
            depth: VisitDepth,
        }
        impl Visitor for Walker {
            fn depth(&mut self) -> &mut VisitDepth {
                &mut self.depth
            }
        }

        let mut tight = Walker {
            depth: VisitDepth::with_limit(10),
        };
        assert!(tight.visit_pattern(&pattern).is_err());

        let mut roomy = Walker {
            depth: VisitDepth::with_limit(200),
        };
        assert!(roomy.visit_pattern(&pattern).is_ok());
    }

    #[test]
    fn depth_guard_releases_between_siblings() {
        // Many shallow siblings must not accumulate depth.
        let entries: Vec<Entry> = (0..50)
            .map(|i| {
                Entry::Message(Message {
                    id: Identifier::new(format!("m{i}")),
                    value: Some(Pattern::new(vec![PatternElement::Text(TextElement::new(
                        "x",
                    ))])),
                    attributes: vec![],
                    comment: None,
                    span: None,
                })
            })
            .collect();
        let resource = Resource { entries };

        struct Walker {
            depth: VisitDepth,
        }
        impl Visitor for Walker {
            fn depth(&mut self) -> &mut VisitDepth {
                &mut self.depth
            }
        }
        let mut w = Walker {
            depth: VisitDepth::with_limit(10),
        };
        assert!(w.visit_resource(&resource).is_ok());
    }

    #[test]
    fn strip_spans_clears_entry_spans() {
        use crate::position::Span;
        let mut resource = message_with_var("v");
        if let Entry::Message(m) = &mut resource.entries[0] {
            m.span = Some(Span::new(0, 5));
        }
        let stripped = strip_spans(resource);
        match &stripped.entries[0] {
            Entry::Message(m) => assert_eq!(m.span, None),
            other => panic!("unexpected entry {other:?}"),
        }
    }
}
