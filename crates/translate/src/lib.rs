//! Bidirectional translation between instances and flat attributes
//!
//! This crate turns registered objects into path-addressed property sets
//! and back:
//! - Translator: per-field variants resolved from shape and policy
//! - EncodeCx / KeySpec: one encode run's state, including key material
//!   and the pending-parent placeholder
//! - DecodeCx / ParentLoader: one decode run's state, including activation
//!   depth and the parent-loading capability
//! - encode_object / decode_object: the ordered field walk both directions
//!
//! The root entry points below wrap the walk for whole records.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod context;
pub mod error;
pub mod object;
pub mod translator;

// Re-export commonly used types at the crate root
pub use context::{DecodeCx, EncodeCx, KeySpec, ParentHold, ParentLoader};
pub use error::{DecodeError, EncodeError};
pub use object::{decode_object, encode_object};
pub use translator::{decode_value, encode_value, resolve, Translator};

use graft_core::path::Path;
use graft_core::property::{PropertySet, PropsView};
use graft_core::schema::TypeDescriptor;
use std::any::Any;

/// Flatten a whole record: the instance's fields become properties and
/// its key material lands in the context
pub fn encode_record(
    cx: &mut EncodeCx<'_>,
    instance: &dyn Any,
    descriptor: &TypeDescriptor,
) -> Result<PropertySet, EncodeError> {
    encode_object(cx, instance, descriptor, &Path::root(), 0, true)
}

/// Rebuild a whole record from its properties
///
/// A record exists, so a null marker at the root decodes as a blank
/// instance rather than an absent value. An empty property view takes the
/// normal field walk, which still fills key fields from the context.
pub fn decode_record(
    cx: &DecodeCx<'_>,
    props: PropsView<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Box<dyn Any>, DecodeError> {
    match decode_object(cx, props, descriptor, &Path::root(), 0)? {
        Some(instance) => Ok(instance),
        None => Ok(descriptor.construct()),
    }
}
