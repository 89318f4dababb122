//! Ghostbuster record validator, per spec.md s4.10.
//!
//! Same CMS/EE/CRL shape as a ROA; the vCard payload itself is opaque to us
//! and is never inspected.

use std::path::Path;

use rpki::repository::cert::ResourceCert;
use rpki::repository::sigobj::SignedObject;

use crate::counters::CounterRegistry;
use crate::crypto::verify::{self, CertRole, VerifyPolicy};
use crate::crypto::{certinfo, reader};
use crate::error::Outcome;
use crate::stage::Trees;
use crate::validators::crl as crl_validator;

enum Source {
    Current,
    Backup,
}

pub fn check_ghostbuster(
    uri: &str,
    expected_hash: Option<&[u8; 32]>,
    ca_cert: &ResourceCert,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> bool {
    if let Ok(path) = trees.unauthenticated_path(uri) {
        if try_source(uri, &path, expected_hash, ca_cert, Source::Current, trees, counters, policy) {
            return true;
        }
    }

    if let Ok(path) = trees.old_authenticated_path(uri) {
        if try_source(uri, &path, expected_hash, ca_cert, Source::Backup, trees, counters, policy) {
            return true;
        }
    }

    false
}

fn try_source(
    uri: &str,
    path: &Path,
    expected_hash: Option<&[u8; 32]>,
    ca_cert: &ResourceCert,
    source: Source,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> bool {
    if !path.exists() {
        return false;
    }

    let (accepted_outcome, rejected_outcome) = match source {
        Source::Current => (Outcome::CurrentGhostbusterAccepted, Outcome::CurrentGhostbusterRejected),
        Source::Backup => (Outcome::BackupGhostbusterAccepted, Outcome::BackupGhostbusterRejected),
    };

    let hashed = match reader::read_with_hash(path) {
        Ok(hashed) => hashed,
        Err(err) => {
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, rejected_outcome);
            return false;
        }
    };

    if let Some(expected) = expected_hash {
        if &hashed.digest != expected {
            counters.record(uri, Outcome::GhostbusterDigestMismatch);
            return false;
        }
    }

    let object = match SignedObject::decode(hashed.bytes, true) {
        Ok(object) => object,
        Err(err) => {
            let outcome = classify_decode_error(&err.to_string());
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, outcome);
            return false;
        }
    };
    if object.content_type() != &rpki::oid::CT_GHOSTBUSTERS {
        counters.record(uri, Outcome::GhostbusterBadEcontenttype);
        return false;
    }

    let ee_cert = object.cert().clone();
    let ee_info = match certinfo::parse(&ee_cert, uri, false, |outcome| counters.record(uri, outcome)) {
        Ok(info) => info,
        Err(outcome) => {
            counters.record(uri, outcome);
            return false;
        }
    };
    let Some(crl_uri) = ee_info.crldp.as_deref() else {
        counters.record(uri, Outcome::CrldpMissing);
        return false;
    };
    let Some(crl) = crl_validator::check_crl(crl_uri, ca_cert, None, trees, counters) else {
        counters.record(uri, Outcome::GhostbusterBadCrl);
        return false;
    };

    let warning = match verify::check_x509(ee_cert, ca_cert, Some(&crl), CertRole::Ee, policy) {
        Ok((_, warning)) => warning,
        Err(outcome) => {
            counters.record(uri, outcome);
            return false;
        }
    };

    if trees.install(uri, path).is_err() {
        counters.record(uri, rejected_outcome);
        return false;
    }

    log::info!("Accepted {uri}");
    counters.record(uri, warning.unwrap_or(accepted_outcome));
    true
}

fn classify_decode_error(message: &str) -> Outcome {
    let lower = message.to_ascii_lowercase();
    if lower.contains("signer") {
        Outcome::GhostbusterMissingSigner
    } else {
        Outcome::GhostbusterInvalidCms
    }
}
