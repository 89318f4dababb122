//! Fetch cache: remembers every URI prefix already handed to the fetcher.

use std::collections::HashSet;
use std::sync::Mutex;

/// Strip the rsync scheme and a trailing slash, for normalized storage.
fn normalize(uri: &str) -> &str {
    let rest = uri.strip_prefix(crate::uri::RSYNC_SCHEME).unwrap_or(uri);
    rest.strip_suffix('/').unwrap_or(rest)
}

/// A set of URI-path prefixes. Membership is a longest-prefix query: a URI
/// is "cached" if any proper prefix of it, cut at a `/` boundary, is in the
/// set.
#[derive(Debug, Default)]
pub struct FetchCache {
    prefixes: Mutex<HashSet<String>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the normalized form of `uri` exactly once.
    pub fn insert(&self, uri: &str) {
        self.prefixes
            .lock()
            .expect("fetch cache poisoned")
            .insert(normalize(uri).to_owned());
    }

    /// True if `uri` or any `/`-bounded prefix of it has been inserted.
    pub fn is_cached(&self, uri: &str) -> bool {
        let rest = normalize(uri);
        let prefixes = self.prefixes.lock().expect("fetch cache poisoned");
        if prefixes.contains(rest) {
            return true;
        }
        let mut remainder = rest;
        while let Some(idx) = remainder.rfind('/') {
            remainder = &remainder[..idx];
            if prefixes.contains(remainder) {
                return true;
            }
        }
        false
    }

    /// Every URI-path prefix recorded so far, for the pruning pass.
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes
            .lock()
            .expect("fetch cache poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_match() {
        let cache = FetchCache::new();
        cache.insert("rsync://rpki.example/repo/ca");

        assert!(cache.is_cached("rsync://rpki.example/repo/ca"));
        assert!(cache.is_cached("rsync://rpki.example/repo/ca/sub/file.cer"));
        assert!(!cache.is_cached("rsync://rpki.example/repo/other"));
        assert!(!cache.is_cached("rsync://other.example/repo/ca"));
    }

    #[test]
    fn insert_is_idempotent_and_normalizes_trailing_slash() {
        let cache = FetchCache::new();
        cache.insert("rsync://rpki.example/repo/ca/");
        cache.insert("rsync://rpki.example/repo/ca/");
        assert_eq!(cache.prefixes().len(), 1);
        assert!(cache.is_cached("rsync://rpki.example/repo/ca"));
    }
}
