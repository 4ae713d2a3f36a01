//! Runtime localization engine for the Fluent (FTL) message format.
//!
//! The crate is organized as four subsystems:
//!
//! - **Syntax**: a streaming, error-recovering parser ([`parser`]) producing
//!   an immutable AST ([`ast`]), plus a roundtrip-stable [`serializer`].
//! - **Resolution**: a tree-walking [`resolver`] that formats messages with
//!   cycle detection and bounded expansion, backed by a [`functions`]
//!   registry and CLDR-driven formatting in [`locale`].
//! - **Integrity cache**: a checksum-verified, write-once LRU ([`cache`]).
//! - **Locale negotiation**: BCP-47 fallback chains over lazily-built
//!   bundles ([`localization`]).
//!
//! Parsing never fails: invalid input becomes [`ast::Junk`] entries carrying
//! annotations. Formatting never panics in non-strict mode: errors accumulate
//! alongside a fallback string.

pub mod analysis;
pub mod ast;
pub mod bundle;
pub mod cache;
pub mod currency;
pub mod cursor;
pub mod error;
pub mod functions;
pub mod locale;
pub mod localization;
pub mod parser;
pub mod plural;
pub mod position;
pub mod resolver;
pub mod serializer;
pub mod validator;
pub mod value;
pub mod visitor;

pub use ast::Resource;
pub use bundle::{BundleConfig, FluentBundle};
pub use error::{DiagnosticCode, FluentError};
pub use localization::{FileResourceLoader, Localization, ResourceLoader};
pub use parser::parse;
pub use serializer::serialize;
pub use value::{ArgValue, FluentArgs};

/// Maximum recursion depth shared by the parser (placeable nesting), the
/// resolver (reference chains), visitor traversal, and cache key hashing.
pub const MAX_DEPTH: usize = 100;

/// The serializer walks programmatically built trees which legitimately nest
/// deeper than parsed ones; it gets a larger allowance.
pub const SERIALIZER_MAX_DEPTH: usize = 500;

/// Identifier grammar is `[a-zA-Z][a-zA-Z0-9_-]*` with this length cap.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Number literal lexeme cap. Anything longer is a parse error, which keeps
/// decimal construction bounded.
pub const MAX_NUMBER_LENGTH: usize = 128;

/// String literal content cap (characters after escape expansion).
pub const MAX_STRING_LITERAL_LENGTH: usize = 4096;

/// Parser input cap. `add_resource` rejects larger sources outright.
pub const MAX_SOURCE_SIZE: usize = 10 * 1024 * 1024;

/// Default bounds for the integrity cache.
pub const DEFAULT_CACHE_SIZE: usize = 1024;
pub const DEFAULT_MAX_ENTRY_WEIGHT: usize = 8192;

/// Default resolution expansion budget in characters. Defeats exponential
/// "billion laughs" expansion.
pub const DEFAULT_MAX_EXPANSION_SIZE: usize = 1_000_000;

/// Bound on the process-wide [`locale::LocaleContext`] cache.
pub const MAX_LOCALE_CACHE_SIZE: usize = 64;

/// Locale codes longer than this are rejected before normalization.
pub const MAX_LOCALE_CODE_LENGTH: usize = 64;

/// Node budget for canonical cache-key hashing. Bounds the work done on
/// adversarial argument shapes (wide or deeply shared trees).
pub const CACHE_HASH_NODE_BUDGET: usize = 1 << 15;
