//! Per-host counter registry and the validation-status log.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::Outcome;

/// One counter vector per host, indexed by [`Outcome`].
#[derive(Debug, Default, Clone)]
pub struct HostCounters {
    counts: BTreeMap<&'static str, u64>,
}

impl HostCounters {
    fn bump(&mut self, outcome: Outcome) {
        *self.counts.entry(outcome.label()).or_insert(0) += 1;
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counts.get(outcome.label()).copied().unwrap_or(0)
    }

    /// Sum of every counter except the `rsync_*` transfer counters, which
    /// count fetches rather than per-URI validations (see spec invariant 5).
    pub fn validation_event_count(&self) -> u64 {
        self.counts
            .iter()
            .filter(|(label, _)| {
                !matches!(**label, "rsync_succeeded" | "rsync_failed" | "rsync_timed_out")
            })
            .map(|(_, count)| *count)
            .sum()
    }
}

/// One append-only entry in the validation-status log.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub uri: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub outcome: Outcome,
}

/// The run-wide context value threaded through the walk: per-host counters
/// plus the append-only status log. Pass explicitly; no process-globals
/// (spec.md s9 "Deep global state").
#[derive(Debug, Default)]
pub struct CounterRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    hosts: BTreeMap<String, HostCounters>,
    status: Vec<StatusEntry>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome for one URI: increments exactly one per-host
    /// counter and appends exactly one status-log entry, atomically, so
    /// that spec invariant 5 holds by construction.
    pub fn record(&self, uri: &str, outcome: Outcome) {
        let host = crate::uri::hostname(uri).unwrap_or(uri).to_owned();
        let mut inner = self.inner.lock().expect("counter registry poisoned");
        inner.hosts.entry(host).or_default().bump(outcome);
        inner.status.push(StatusEntry {
            uri: uri.to_owned(),
            timestamp: chrono::Utc::now(),
            outcome,
        });
    }

    pub fn hosts(&self) -> BTreeMap<String, HostCounters> {
        self.inner.lock().expect("counter registry poisoned").hosts.clone()
    }

    pub fn status_log(&self) -> Vec<StatusEntry> {
        self.inner.lock().expect("counter registry poisoned").status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_counters_and_status_in_sync() {
        let reg = CounterRegistry::new();
        reg.record("rsync://a.example/x.cer", Outcome::CurrentCertAccepted);
        reg.record("rsync://a.example/x.roa", Outcome::CurrentRoaAccepted);
        reg.record("rsync://b.example/y.cer", Outcome::CurrentCertRejected);

        let hosts = reg.hosts();
        assert_eq!(hosts["a.example"].validation_event_count(), 2);
        assert_eq!(hosts["b.example"].validation_event_count(), 1);

        let total: u64 = hosts.values().map(|h| h.validation_event_count()).sum();
        assert_eq!(total, reg.status_log().len() as u64);
    }

    #[test]
    fn rsync_counters_excluded_from_validation_total() {
        let reg = CounterRegistry::new();
        reg.record("rsync://a.example/repo/", Outcome::RsyncSucceeded);
        let hosts = reg.hosts();
        assert_eq!(hosts["a.example"].validation_event_count(), 0);
        assert_eq!(hosts["a.example"].get(Outcome::RsyncSucceeded), 1);
    }
}
