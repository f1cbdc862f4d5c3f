//! Converter registration and cached resolution
//!
//! Conversion runs in three stages:
//! 1. Identity: a datum already of the target kind passes through untouched.
//! 2. Specific converters: registered for an exact `(from, to)` kind pair;
//!    the first match in priority order wins, and the winning index (or the
//!    absence of one) is cached per pair.
//! 3. General converters: probed in priority order; each may convert, may
//!    declare the value an explicit null, or may pass.
//!
//! `prepend` outranks everything registered before it, so a caller can
//! override a standard converter for one kind pair without rebuilding the
//! whole pack. Registration invalidates the resolution cache.

use graft_core::datum::{Datum, DatumKind};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

/// Conversion failures
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No specific or general converter accepted the pair
    #[error("no conversion from {from} value {value} to {to}")]
    NoConverter {
        /// Kind of the value that arrived
        from: DatumKind,
        /// Kind the caller asked for
        to: DatumKind,
        /// Rendered source value for diagnostics
        value: String,
    },

    /// A float had no exact integer representation
    #[error("float {value} has no exact integer representation")]
    LossyFloat {
        /// The offending value
        value: f64,
    },

    /// Text failed to parse as the target kind
    #[error("text {text:?} does not parse as {to}")]
    Unparseable {
        /// Kind the caller asked for
        to: DatumKind,
        /// The text that failed to parse
        text: String,
    },

    /// A blob held no valid UTF-8
    #[error("blob is not valid UTF-8 text")]
    BadUtf8 {
        /// The underlying decoding failure
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Milliseconds outside the representable timestamp range
    #[error("millisecond value {millis} is outside the timestamp range")]
    StampRange {
        /// The offending epoch-millisecond value
        millis: i64,
    },
}

/// A converter for one exact kind pair
pub type SpecificFn = Box<dyn Fn(Datum) -> Result<Datum, ConvertError> + Send + Sync>;

/// A fallback converter probed for any unresolved pair
///
/// Receives the registry so it can recurse (e.g. unwrapping a one-element
/// list and converting what it held).
pub type GeneralFn =
    Box<dyn Fn(&ConverterRegistry, &Datum, DatumKind) -> GeneralOutcome + Send + Sync>;

/// What a general converter decided
pub enum GeneralOutcome {
    /// The probe matched and produced a value
    Converted(Datum),
    /// The probe matched a null representation; the end result is null
    Null,
    /// The probe does not apply; try the next general converter
    NoMatch,
}

struct SpecificEntry {
    from: DatumKind,
    to: DatumKind,
    convert: SpecificFn,
}

/// Ordered converters plus a per-pair resolution cache
///
/// Built once during configuration, then shared immutably. The cache
/// records both hits and misses so repeated unresolvable pairs skip the
/// scan as well.
pub struct ConverterRegistry {
    specifics: Vec<SpecificEntry>,
    generals: Vec<GeneralFn>,
    resolution: RwLock<FxHashMap<(DatumKind, DatumKind), Option<usize>>>,
}

impl ConverterRegistry {
    /// An empty registry: identity conversions only
    pub fn new() -> Self {
        ConverterRegistry {
            specifics: Vec::new(),
            generals: Vec::new(),
            resolution: RwLock::new(FxHashMap::default()),
        }
    }

    /// A registry loaded with the standard pack
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::standard::install(&mut registry);
        registry
    }

    /// Register a specific converter at lowest priority
    pub fn append_specific(
        &mut self,
        from: DatumKind,
        to: DatumKind,
        convert: impl Fn(Datum) -> Result<Datum, ConvertError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.specifics.push(SpecificEntry {
            from,
            to,
            convert: Box::new(convert),
        });
        self.invalidate();
        self
    }

    /// Register a specific converter at highest priority
    pub fn prepend_specific(
        &mut self,
        from: DatumKind,
        to: DatumKind,
        convert: impl Fn(Datum) -> Result<Datum, ConvertError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.specifics.insert(
            0,
            SpecificEntry {
                from,
                to,
                convert: Box::new(convert),
            },
        );
        self.invalidate();
        self
    }

    /// Register a general converter at lowest priority
    pub fn append_general(
        &mut self,
        probe: impl Fn(&ConverterRegistry, &Datum, DatumKind) -> GeneralOutcome
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.generals.push(Box::new(probe));
        self
    }

    /// Register a general converter at highest priority
    pub fn prepend_general(
        &mut self,
        probe: impl Fn(&ConverterRegistry, &Datum, DatumKind) -> GeneralOutcome
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.generals.insert(0, Box::new(probe));
        self
    }

    fn invalidate(&mut self) {
        self.resolution.get_mut().clear();
    }

    fn resolve_specific(&self, from: DatumKind, to: DatumKind) -> Option<usize> {
        if let Some(cached) = self.resolution.read().get(&(from, to)) {
            return *cached;
        }
        let found = self
            .specifics
            .iter()
            .position(|entry| entry.from == from && entry.to == to);
        // Racing writers compute the same answer; last write wins
        self.resolution.write().insert((from, to), found);
        found
    }

    /// Convert a datum to the target kind
    ///
    /// Nulls pass through to any target; whether a null is acceptable is
    /// the caller's policy, not a conversion question.
    pub fn convert(&self, value: Datum, target: DatumKind) -> Result<Datum, ConvertError> {
        if value.kind() == target {
            return Ok(value);
        }
        if matches!(value, Datum::Null) {
            return Ok(Datum::Null);
        }
        if let Some(index) = self.resolve_specific(value.kind(), target) {
            return (self.specifics[index].convert)(value);
        }
        for probe in &self.generals {
            match probe(self, &value, target) {
                GeneralOutcome::Converted(converted) => return Ok(converted),
                GeneralOutcome::Null => return Ok(Datum::Null),
                GeneralOutcome::NoMatch => {}
            }
        }
        Err(ConvertError::NoConverter {
            from: value.kind(),
            to: target,
            value: crate::standard::render(&value),
        })
    }

    #[cfg(test)]
    fn cached_pairs(&self) -> usize {
        self.resolution.read().len()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("specifics", &self.specifics.len())
            .field("generals", &self.generals.len())
            .finish()
    }
}
