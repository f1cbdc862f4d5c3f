//! Structural limits for paths and translation
//!
//! These constants bound the flattened attribute namespace. They exist to
//! turn runaway recursion (deeply nested registrations, adversarial rendered
//! paths, exploding query trees) into typed errors instead of unbounded
//! memory use. Enforcement happens at the edges: path parsing, schema
//! sealing, and query compilation.

/// Maximum number of segments in one attribute path (default: 32)
///
/// Embedded nesting adds one segment per level, so this also caps the
/// registered embedding depth.
pub const MAX_PATH_SEGMENTS: usize = 32;

/// Maximum rendered path length in bytes (default: 1024)
///
/// The rendered form is the dotted string used as the adapter-side
/// attribute name.
pub const MAX_PATH_STRING: usize = 1024;

/// Maximum depth of embedded-object recursion during encode (default: 16)
///
/// A self-referential registration (a type embedded under itself through a
/// collection) terminates with an error at this depth instead of
/// overflowing the stack.
pub const MAX_EMBED_DEPTH: usize = 16;

/// Maximum native queries one find invocation may compile to (default: 32)
///
/// Each OR branch multiplies the compiled query count; the product is
/// capped here.
pub const MAX_COMPILED_QUERIES: usize = 32;
