//! Queue name to store key resolution.

use std::fmt::Debug;

/// Maps a logical queue name onto the key of the underlying list.
///
/// Resolution must be a pure function of the name.
pub trait QueueKeyResolver: Send + Sync + Debug {
    /// Resolve the list key for `queue`.
    fn resolve(&self, queue: &str) -> String;
}

/// Prefixes queue names with a fixed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixResolver {
    prefix: String,
}

impl PrefixResolver {
    /// Default namespace for queue keys.
    pub const DEFAULT_PREFIX: &'static str = "queue:";

    /// Create a resolver with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixResolver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl QueueKeyResolver for PrefixResolver {
    fn resolve(&self, queue: &str) -> String {
        format!("{}{}", self.prefix, queue)
    }
}

/// Adapter turning a closure into a resolver.
pub struct FnResolver<F>(pub F);

impl<F> Debug for FnResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FnResolver").field(&"<fn>").finish()
    }
}

impl<F> QueueKeyResolver for FnResolver<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve(&self, queue: &str) -> String {
        (self.0)(queue)
    }
}
