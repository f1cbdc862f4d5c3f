//! Datastore tuning knobs

use graft_core::limits::MAX_COMPILED_QUERIES;

/// Default activation depth: materialize the whole ancestor chain
pub const DEFAULT_ACTIVATION_DEPTH: usize = usize::MAX;

/// Per-datastore policy, consumed by [`crate::DatastoreBuilder`]
///
/// ```
/// use graft_engine::Config;
///
/// let config = Config::new().activation_depth(1).store_nulls(false);
/// assert_eq!(config.activation_depth, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How many ancestor levels loads materialize as live instances
    /// before leaving key placeholders
    pub activation_depth: usize,
    /// Whether null field values become explicit null attributes
    ///
    /// Explicit nulls keep absent-but-registered fields addressable, which
    /// is what lets empty embedded map entries survive a round trip.
    pub store_nulls: bool,
    /// Cap on native queries one find invocation may compile to
    pub max_queries: usize,
}

impl Config {
    /// The default policy: full activation, nulls stored, structural cap
    pub fn new() -> Self {
        Config {
            activation_depth: DEFAULT_ACTIVATION_DEPTH,
            store_nulls: true,
            max_queries: MAX_COMPILED_QUERIES,
        }
    }

    /// Set the activation depth for loads
    pub fn activation_depth(mut self, depth: usize) -> Self {
        self.activation_depth = depth;
        self
    }

    /// Set whether nulls are stored as explicit attributes
    pub fn store_nulls(mut self, store: bool) -> Self {
        self.store_nulls = store;
        self
    }

    /// Set the compiled-query cap
    pub fn max_queries(mut self, max: usize) -> Self {
        self.max_queries = max;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
