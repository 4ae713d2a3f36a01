//! Immutable AST for FTL resources.
//!
//! Nodes are plain frozen records: the parser (and the transformer in
//! [`crate::visitor`]) construct them, nothing mutates them afterwards.
//! Equality is structural. Each node can produce a BLAKE2b-128 content hash
//! over a canonical byte encoding that ignores spans, so two parses of
//! equivalent source hash identically regardless of layout.

use std::fmt;

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Annotation;
use crate::position::Span;

// ============================================================================
// Nodes
// ============================================================================

/// A parsed FTL document: an ordered list of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Resource {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Entry {
    Message(Message),
    Term(Term),
    Comment(Comment),
    Junk(Junk),
}

impl Entry {
    /// Identifier of the entry, when it has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Entry::Message(m) => Some(&m.id.name),
            Entry::Term(t) => Some(&t.id.name),
            Entry::Comment(_) | Entry::Junk(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: Identifier,
    pub value: Option<Pattern>,
    pub attributes: Vec<Attribute>,
    pub comment: Option<Comment>,
    pub span: Option<Span>,
}

/// Terms are reusable fragments prefixed with `-`. Unlike messages their
/// value is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub id: Identifier,
    pub value: Pattern,
    pub attributes: Vec<Attribute>,
    pub comment: Option<Comment>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommentKind {
    /// `#` — attached to the following entry or free-standing.
    Standalone,
    /// `##` — section header.
    Group,
    /// `###` — file header.
    Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub content: String,
    pub kind: CommentKind,
    pub span: Option<Span>,
}

/// An unparsed fragment. The parser never fails; what it cannot parse it
/// preserves here together with the errors that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Junk {
    pub content: String,
    pub annotations: Vec<Annotation>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    pub name: String,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub id: Identifier,
    pub value: Pattern,
}

/// The value side of a message or term: text fragments and placeables.
///
/// Construct through [`Pattern::new`], which merges adjacent text elements
/// and drops empty ones, so the "no empty TextElement" invariant holds by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Pattern {
    pub elements: Vec<PatternElement>,
}

impl Pattern {
    pub fn new(elements: Vec<PatternElement>) -> Self {
        let mut merged: Vec<PatternElement> = Vec::with_capacity(elements.len());
        for el in elements {
            match el {
                PatternElement::Text(t) if t.value.is_empty() => {}
                PatternElement::Text(t) => match merged.last_mut() {
                    Some(PatternElement::Text(prev)) => prev.value.push_str(&t.value),
                    _ => merged.push(PatternElement::Text(t)),
                },
                placeable => merged.push(placeable),
            }
        }
        Self { elements: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PatternElement {
    Text(TextElement),
    Placeable(Placeable),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextElement {
    pub value: String,
}

impl TextElement {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// `{ expression }` inside a pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placeable {
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    Inline(InlineExpression),
    Select(SelectExpression),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InlineExpression {
    StringLiteral {
        /// Unescaped value.
        value: String,
        /// Exact source lexeme between the quotes, for roundtrips.
        raw: String,
    },
    NumberLiteral(NumberLiteral),
    MessageReference {
        id: Identifier,
        attribute: Option<Identifier>,
    },
    TermReference {
        id: Identifier,
        attribute: Option<Identifier>,
        arguments: Option<CallArguments>,
    },
    VariableReference {
        id: Identifier,
    },
    FunctionReference {
        id: Identifier,
        arguments: CallArguments,
    },
    Placeable(Box<Placeable>),
}

/// Integral literals stay `i64`; anything with a fraction becomes a
/// [`Decimal`]. IEEE 754 floats are forbidden here: their rounding breaks
/// the roundtrip and plural-selection contracts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NumberValue {
    Integer(i64),
    Decimal(Decimal),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberLiteral {
    pub value: NumberValue,
    /// Exact source lexeme, preserved for serialization.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectExpression {
    pub selector: Box<InlineExpression>,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub key: VariantKey,
    pub value: Pattern,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VariantKey {
    Identifier(Identifier),
    Number(NumberLiteral),
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CallArguments {
    pub positional: Vec<InlineExpression>,
    pub named: Vec<NamedArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedArgument {
    pub name: Identifier,
    pub value: InlineExpression,
}

// ============================================================================
// Canonical content hashing
// ============================================================================

/// Incremental BLAKE2b-128 writer with length-prefixed fields, so adjacent
/// strings cannot collide by concatenation.
pub struct CanonicalHasher {
    inner: Blake2b<U16>,
}

impl CanonicalHasher {
    fn new() -> Self {
        Self {
            inner: Blake2b::<U16>::new(),
        }
    }

    fn tag(&mut self, tag: u8) {
        self.inner.update([tag]);
    }

    fn str(&mut self, s: &str) {
        self.inner.update((s.len() as u64).to_le_bytes());
        self.inner.update(s.as_bytes());
    }

    fn bool(&mut self, b: bool) {
        self.inner.update([b as u8]);
    }

    fn len(&mut self, n: usize) {
        self.inner.update((n as u64).to_le_bytes());
    }

    fn finish(self) -> [u8; 16] {
        self.inner.finalize().into()
    }
}

/// Canonical hashing over node content, ignoring spans. Implemented for
/// every node type so callers can hash at any granularity.
pub trait ContentHash {
    fn write_canonical(&self, h: &mut CanonicalHasher);

    fn content_hash(&self) -> [u8; 16] {
        let mut h = CanonicalHasher::new();
        self.write_canonical(&mut h);
        h.finish()
    }
}

type Hasher = CanonicalHasher;

impl ContentHash for Resource {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x01);
        h.len(self.entries.len());
        for e in &self.entries {
            e.write_canonical(h);
        }
    }
}

impl ContentHash for Entry {
    fn write_canonical(&self, h: &mut Hasher) {
        match self {
            Entry::Message(m) => m.write_canonical(h),
            Entry::Term(t) => t.write_canonical(h),
            Entry::Comment(c) => c.write_canonical(h),
            Entry::Junk(j) => j.write_canonical(h),
        }
    }
}

impl ContentHash for Message {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x02);
        h.str(&self.id.name);
        match &self.value {
            Some(p) => {
                h.bool(true);
                p.write_canonical(h);
            }
            None => h.bool(false),
        }
        h.len(self.attributes.len());
        for a in &self.attributes {
            a.write_canonical(h);
        }
        match &self.comment {
            Some(c) => {
                h.bool(true);
                c.write_canonical(h);
            }
            None => h.bool(false),
        }
    }
}

impl ContentHash for Term {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x03);
        h.str(&self.id.name);
        self.value.write_canonical(h);
        h.len(self.attributes.len());
        for a in &self.attributes {
            a.write_canonical(h);
        }
        match &self.comment {
            Some(c) => {
                h.bool(true);
                c.write_canonical(h);
            }
            None => h.bool(false),
        }
    }
}

impl ContentHash for Comment {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x04);
        h.tag(match self.kind {
            CommentKind::Standalone => 0,
            CommentKind::Group => 1,
            CommentKind::Resource => 2,
        });
        h.str(&self.content);
    }
}

impl ContentHash for Junk {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x05);
        h.str(&self.content);
    }
}

impl ContentHash for Attribute {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x06);
        h.str(&self.id.name);
        self.value.write_canonical(h);
    }
}

impl ContentHash for Pattern {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x07);
        h.len(self.elements.len());
        for el in &self.elements {
            match el {
                PatternElement::Text(t) => {
                    h.tag(0x08);
                    h.str(&t.value);
                }
                PatternElement::Placeable(p) => p.write_canonical(h),
            }
        }
    }
}

impl ContentHash for Placeable {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x09);
        match &self.expression {
            Expression::Inline(i) => i.write_canonical(h),
            Expression::Select(s) => s.write_canonical(h),
        }
    }
}

impl ContentHash for InlineExpression {
    fn write_canonical(&self, h: &mut Hasher) {
        match self {
            InlineExpression::StringLiteral { value, .. } => {
                h.tag(0x0a);
                h.str(value);
            }
            InlineExpression::NumberLiteral(n) => n.write_canonical(h),
            InlineExpression::MessageReference { id, attribute } => {
                h.tag(0x0c);
                h.str(&id.name);
                h.str(attribute.as_ref().map(|a| a.name.as_str()).unwrap_or(""));
            }
            InlineExpression::TermReference {
                id,
                attribute,
                arguments,
            } => {
                h.tag(0x0d);
                h.str(&id.name);
                h.str(attribute.as_ref().map(|a| a.name.as_str()).unwrap_or(""));
                match arguments {
                    Some(args) => {
                        h.bool(true);
                        args.write_canonical(h);
                    }
                    None => h.bool(false),
                }
            }
            InlineExpression::VariableReference { id } => {
                h.tag(0x0e);
                h.str(&id.name);
            }
            InlineExpression::FunctionReference { id, arguments } => {
                h.tag(0x0f);
                h.str(&id.name);
                arguments.write_canonical(h);
            }
            InlineExpression::Placeable(p) => p.write_canonical(h),
        }
    }
}

impl ContentHash for NumberLiteral {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x0b);
        // Hash the numeric value, not the lexeme: "1.0" and "1.0" parsed
        // from different layouts must agree, but note "1" vs "1.0" differ
        // as values (Integer vs Decimal), which is intended.
        match self.value {
            NumberValue::Integer(i) => {
                h.tag(0);
                h.str(&i.to_string());
            }
            NumberValue::Decimal(d) => {
                h.tag(1);
                h.str(&d.normalize().to_string());
            }
        }
    }
}

impl ContentHash for SelectExpression {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x10);
        self.selector.write_canonical(h);
        h.len(self.variants.len());
        for v in &self.variants {
            h.tag(0x11);
            h.bool(v.default);
            match &v.key {
                VariantKey::Identifier(id) => {
                    h.tag(0);
                    h.str(&id.name);
                }
                VariantKey::Number(n) => {
                    h.tag(1);
                    n.write_canonical(h);
                }
            }
            v.value.write_canonical(h);
        }
    }
}

impl ContentHash for CallArguments {
    fn write_canonical(&self, h: &mut Hasher) {
        h.tag(0x12);
        h.len(self.positional.len());
        for p in &self.positional {
            p.write_canonical(h);
        }
        h.len(self.named.len());
        for n in &self.named {
            h.str(&n.name.name);
            n.value.write_canonical(h);
        }
    }
}
