//! Stale-object and "used backup" caches.
//!
//! Both are plain sets of full URI strings with idempotent insert and a
//! membership test; they exist to avoid re-warning about the same stale
//! CRL/manifest repeatedly within a run, and to remember which certificates
//! were last accepted from the backup tree so the next run knows to retry
//! the current source for them.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct UriSet {
    uris: Mutex<HashSet<String>>,
}

impl UriSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str) {
        self.uris.lock().expect("uri set poisoned").insert(uri.to_owned());
    }

    pub fn remove(&self, uri: &str) {
        self.uris.lock().expect("uri set poisoned").remove(uri);
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.uris.lock().expect("uri set poisoned").contains(uri)
    }
}

/// Caches a full run needs: URIs whose CRL/manifest was accepted despite
/// being stale, and URIs whose certificate was last accepted from the
/// backup tree (a tag toggled by [`crate::validators::cert::check_cert`]).
#[derive(Debug, Default)]
pub struct StaleCaches {
    pub stale_crl: UriSet,
    pub stale_manifest: UriSet,
    pub used_backup: UriSet,
}

impl StaleCaches {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let set = UriSet::new();
        assert!(!set.contains("rsync://a/b.crl"));
        set.insert("rsync://a/b.crl");
        assert!(set.contains("rsync://a/b.crl"));
        set.insert("rsync://a/b.crl");
        set.remove("rsync://a/b.crl");
        assert!(!set.contains("rsync://a/b.crl"));
    }
}
