//! CRL validator, per spec.md s4.7.

use std::path::Path;

use rpki::repository::cert::ResourceCert;
use rpki::repository::crl::Crl;

use crate::counters::CounterRegistry;
use crate::crypto::reader;
use crate::error::Outcome;
use crate::stage::Trees;

pub enum Source {
    Current,
    Backup,
}

/// Attempt, in order: an already-installed copy under `authenticated/`;
/// a fresh copy under `unauthenticated/`; a backup copy under
/// `old_authenticated/`. First success is installed and counted.
pub fn check_crl(
    uri: &str,
    issuer: &ResourceCert,
    expected_hash: Option<&[u8; 32]>,
    trees: &Trees,
    counters: &CounterRegistry,
) -> Option<Crl> {
    if let Ok(path) = trees.authenticated_path(uri) {
        if path.exists() {
            if let Ok((crl, _)) = reader::read_crl(&path) {
                return Some(crl);
            }
        }
    }

    if let Ok(path) = trees.unauthenticated_path(uri) {
        if let Some(crl) = try_source(uri, &path, issuer, expected_hash, Source::Current, trees, counters) {
            return Some(crl);
        }
    }

    if let Ok(path) = trees.old_authenticated_path(uri) {
        if let Some(crl) = try_source(uri, &path, issuer, expected_hash, Source::Backup, trees, counters) {
            return Some(crl);
        }
    }

    None
}

fn try_source(
    uri: &str,
    path: &Path,
    issuer: &ResourceCert,
    expected_hash: Option<&[u8; 32]>,
    source: Source,
    trees: &Trees,
    counters: &CounterRegistry,
) -> Option<Crl> {
    if !path.exists() {
        return None;
    }

    let (accepted_outcome, rejected_outcome) = match source {
        Source::Current => (Outcome::CurrentCrlAccepted, Outcome::CurrentCrlRejected),
        Source::Backup => (Outcome::BackupCrlAccepted, Outcome::BackupCrlRejected),
    };

    let (crl, digest) = match reader::read_crl(path) {
        Ok(pair) => pair,
        Err(err) => {
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, rejected_outcome);
            return None;
        }
    };

    if let Some(expected) = expected_hash {
        if &digest != expected {
            log::warn!("Rejected {uri} because crl_digest_mismatch");
            counters.record(uri, Outcome::CrlDigestMismatch);
            return None;
        }
    }

    if let Err(err) = crl.validate(issuer.cert(), true) {
        log::warn!("Rejected {uri} because signature did not verify: {err}");
        counters.record(uri, rejected_outcome);
        return None;
    }

    if trees.install(uri, path).is_err() {
        counters.record(uri, rejected_outcome);
        return None;
    }

    log::info!("Accepted {uri}");
    counters.record(uri, accepted_outcome);
    Some(crl)
}
