//! Value conversion between datum kinds
//!
//! Fields declare a natural storage kind; what sits in a stored record may
//! be older, wider, or simply different. This crate bridges the two:
//! - ConverterRegistry: ordered specific and general converters, resolved
//!   through a shared cache
//! - GeneralOutcome: the three-way probe result for general converters
//! - Standard pack: numeric, text, stamp, blob and reference bridges

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod registry;
pub mod standard;

// Re-export commonly used types at the crate root
pub use registry::{ConvertError, ConverterRegistry, GeneralFn, GeneralOutcome, SpecificFn};
