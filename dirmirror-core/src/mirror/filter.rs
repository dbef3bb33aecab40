//! Admission filtering for candidate filenames

use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};

use crate::mirror::MirrorError;

/// Decides which filenames are tracked at all.
///
/// Resolved once at construction; evaluated once per candidate filename per
/// reconciliation pass. Pattern filters keep *matching* names. Predicate
/// filters are used verbatim: the caller's closure already encodes the
/// desired keep/drop sense.
#[derive(Clone)]
pub enum NameFilter {
    /// Keep everything.
    All,
    /// Keep filenames matching the glob.
    Pattern(GlobMatcher),
    /// Keep filenames for which the caller's predicate returns true.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl NameFilter {
    pub fn all() -> Self {
        NameFilter::All
    }

    /// Build a filter from a glob pattern, e.g. `*.json`.
    pub fn pattern(pattern: &str) -> Result<Self, MirrorError> {
        Ok(NameFilter::Pattern(Glob::new(pattern)?.compile_matcher()))
    }

    pub fn predicate<F>(keep: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        NameFilter::Predicate(Arc::new(keep))
    }

    /// Whether `name` is admitted into the mirror.
    pub fn keep(&self, name: &str) -> bool {
        match self {
            NameFilter::All => true,
            NameFilter::Pattern(matcher) => matcher.is_match(name),
            NameFilter::Predicate(keep) => keep(name),
        }
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        NameFilter::All
    }
}

impl fmt::Debug for NameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameFilter::All => write!(f, "All"),
            NameFilter::Pattern(matcher) => {
                f.debug_tuple("Pattern").field(&matcher.glob().glob()).finish()
            }
            NameFilter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keeps_everything() {
        let filter = NameFilter::default();
        assert!(filter.keep("anything.txt"));
        assert!(filter.keep(".hidden"));
    }

    #[test]
    fn test_pattern_keeps_matching_names() {
        let filter = NameFilter::pattern("*.json").unwrap();
        assert!(filter.keep("config.json"));
        assert!(!filter.keep("config.toml"));
        assert!(!filter.keep("json"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(NameFilter::pattern("a[").is_err());
    }

    #[test]
    fn test_predicate_sense_is_the_callers() {
        // The predicate is not inverted or normalized: a drop-list closure
        // keeps exactly what it says.
        let filter = NameFilter::predicate(|name| !name.ends_with(".tmp"));
        assert!(filter.keep("data.json"));
        assert!(!filter.keep("scratch.tmp"));
    }
}
