//! Per-operation options.

use std::time::Duration;

/// Options for a single `set` call.
///
/// `Options::default()` is what every store applies when a caller passes no
/// options, so "no options" and "zero options" behave identically.
///
/// # Examples
///
/// ```
/// use strata_cache::Options;
/// use std::time::Duration;
///
/// let options = Options::new()
///     .with_expiration(Duration::from_secs(60))
///     .with_tags(["users", "active-users"]);
///
/// assert_eq!(options.tags.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Time-to-live of the entry. `None` falls back to the store's default
    /// TTL; a zero TTL means no expiry.
    pub expiration: Option<Duration>,

    /// Tags the entry is indexed under.
    pub tags: Vec<String>,

    /// TTL of the tag index entries touched by this write. `None` or zero
    /// uses the store's administrative tag TTL.
    pub tags_ttl: Option<Duration>,

    /// Admission weight for cost-aware in-memory stores. `0` means the
    /// default weight of 1.
    pub cost: u32,

    /// Wait for the store's pending admission work before returning.
    pub synchronous: bool,

    /// Client-side cache TTL for stores that support client-side caching.
    /// Ignored by stores that don't.
    pub client_side_cache_expiration: Option<Duration>,
}

impl Options {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    #[must_use]
    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }

    /// Set the tags, replacing any set before.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tag index TTL.
    #[must_use]
    pub fn with_tags_ttl(mut self, ttl: Duration) -> Self {
        self.tags_ttl = Some(ttl);
        self
    }

    /// Set the admission cost.
    #[must_use]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Toggle synchronous writes.
    #[must_use]
    pub fn with_synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Set the client-side cache TTL.
    #[must_use]
    pub fn with_client_side_cache_expiration(mut self, ttl: Duration) -> Self {
        self.client_side_cache_expiration = Some(ttl);
        self
    }

    /// Effective admission weight.
    pub fn weight(&self) -> u32 {
        self.cost.max(1)
    }

    /// Entry TTL a store applies, given its default. Zero means no expiry.
    ///
    /// ```
    /// use strata_cache::Options;
    /// use std::time::Duration;
    ///
    /// let default = Some(Duration::from_secs(30));
    /// assert_eq!(Options::new().ttl(default), default);
    /// assert_eq!(Options::new().with_expiration(Duration::ZERO).ttl(default), None);
    /// ```
    pub fn ttl(&self, default: Option<Duration>) -> Option<Duration> {
        self.expiration.or(default).filter(|ttl| !ttl.is_zero())
    }
}

/// Options for an `invalidate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidateOptions {
    /// Tags whose members are removed.
    pub tags: Vec<String>,
}

impl InvalidateOptions {
    /// Invalidate every entry carrying any of `tags`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache::InvalidateOptions;
    ///
    /// let options = InvalidateOptions::tags(["users"]);
    /// assert_eq!(options.tags, vec!["users".to_string()]);
    /// ```
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_empty() {
        let options = Options::default();
        assert_eq!(options, Options::new());
        assert!(options.expiration.is_none());
        assert!(options.tags.is_empty());
        assert!(!options.synchronous);
        assert_eq!(options.weight(), 1);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new()
            .with_expiration(Duration::from_secs(30))
            .with_tags(vec!["a".to_string(), "b".to_string()])
            .with_tags_ttl(Duration::from_secs(3600))
            .with_cost(8)
            .with_synchronous(true)
            .with_client_side_cache_expiration(Duration::from_secs(5));

        assert_eq!(options.expiration, Some(Duration::from_secs(30)));
        assert_eq!(options.tags, vec!["a", "b"]);
        assert_eq!(options.tags_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(options.weight(), 8);
        assert!(options.synchronous);
        assert_eq!(
            options.client_side_cache_expiration,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_ttl_resolution() {
        let default = Some(Duration::from_secs(30));

        assert_eq!(Options::new().ttl(None), None);
        assert_eq!(Options::new().ttl(default), default);
        assert_eq!(
            Options::new()
                .with_expiration(Duration::from_secs(5))
                .ttl(default),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            Options::new().with_expiration(Duration::ZERO).ttl(default),
            None
        );
        assert_eq!(Options::new().ttl(Some(Duration::ZERO)), None);
    }

    #[test]
    fn test_with_tags_replaces() {
        let options = Options::new().with_tags(["a"]).with_tags(["b", "c"]);
        assert_eq!(options.tags, vec!["b", "c"]);
    }
}
