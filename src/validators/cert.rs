//! CA certificate validator, per spec.md s4.12.

use std::path::Path;

use rpki::repository::cert::ResourceCert;

use crate::counters::CounterRegistry;
use crate::crypto::verify::{self, CertRole, VerifyPolicy};
use crate::crypto::{certinfo, reader, CertInfo};
use crate::error::Outcome;
use crate::fetch::backup::StaleCaches;
use crate::stage::Trees;
use crate::validators::crl as crl_validator;

pub struct CertResult {
    pub resource_cert: ResourceCert,
    pub info: CertInfo,
}

enum Source {
    Current,
    Backup,
}

/// Validate the CA certificate at `uri`. A certificate already installed
/// under `authenticated/` from earlier in this same run is reused as-is,
/// *unless* it is tagged in `backup_cache.used_backup` from the previous
/// run, in which case the current source is retried so a repository that
/// has since recovered gets a chance to supersede the backup copy.
pub fn check_cert(
    uri: &str,
    expected_hash: Option<&[u8; 32]>,
    issuer_cert: &ResourceCert,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
    backup_cache: &StaleCaches,
) -> Option<CertResult> {
    let force_recheck = backup_cache.used_backup.contains(uri);

    if !force_recheck {
        if let Ok(path) = trees.authenticated_path(uri) {
            if path.exists() {
                if let Ok((cert, _)) = reader::read_cert(&path) {
                    if let Ok(info) = certinfo::parse(&cert, uri, false, |_| {}) {
                        if let Ok(resource_cert) = cert.validate_ca(issuer_cert, true) {
                            counters.record(uri, Outcome::CurrentCertRecheck);
                            return Some(CertResult { resource_cert, info });
                        }
                    }
                }
            }
        }
    }

    if let Ok(path) = trees.unauthenticated_path(uri) {
        if let Some(result) = try_source(uri, &path, expected_hash, issuer_cert, Source::Current, trees, counters, policy) {
            backup_cache.used_backup.remove(uri);
            return Some(result);
        }
    }

    if let Ok(path) = trees.old_authenticated_path(uri) {
        if let Some(result) = try_source(uri, &path, expected_hash, issuer_cert, Source::Backup, trees, counters, policy) {
            backup_cache.used_backup.insert(uri);
            return Some(result);
        }
    }

    None
}

fn try_source(
    uri: &str,
    path: &Path,
    expected_hash: Option<&[u8; 32]>,
    issuer_cert: &ResourceCert,
    source: Source,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> Option<CertResult> {
    if !path.exists() {
        return None;
    }

    let (accepted_outcome, rejected_outcome) = match source {
        Source::Current => (Outcome::CurrentCertAccepted, Outcome::CurrentCertRejected),
        Source::Backup => (Outcome::BackupCertAccepted, Outcome::BackupCertRejected),
    };

    let (cert, digest) = match reader::read_cert(path) {
        Ok(pair) => pair,
        Err(err) => {
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, rejected_outcome);
            return None;
        }
    };

    if let Some(expected) = expected_hash {
        if &digest != expected {
            counters.record(uri, Outcome::CertificateDigestMismatch);
            return None;
        }
    }

    let info = match certinfo::parse(&cert, uri, false, |outcome| counters.record(uri, outcome)) {
        Ok(info) => info,
        Err(outcome) => {
            counters.record(uri, outcome);
            return None;
        }
    };

    if let Err(outcome) = verify::profile_gate(&info, None, CertRole::Ca) {
        counters.record(uri, outcome);
        return None;
    }

    let crl = info
        .crldp
        .as_deref()
        .and_then(|crl_uri| crl_validator::check_crl(crl_uri, issuer_cert, None, trees, counters));
    if crl.is_none() {
        counters.record(uri, Outcome::CrldpMissing);
        return None;
    }

    let (resource_cert, warning) = match verify::check_x509(cert, issuer_cert, crl.as_ref(), CertRole::Ca, policy) {
        Ok(pair) => pair,
        Err(outcome) => {
            counters.record(uri, outcome);
            return None;
        }
    };

    if trees.install(uri, path).is_err() {
        counters.record(uri, rejected_outcome);
        return None;
    }

    log::info!("Accepted {uri}");
    counters.record(uri, warning.unwrap_or(accepted_outcome));
    Some(CertResult { resource_cert, info })
}
