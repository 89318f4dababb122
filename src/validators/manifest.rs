//! Manifest validator, per spec.md s4.8.

use std::path::Path;

use rpki::repository::cert::ResourceCert;
use rpki::repository::crl::Crl;
use rpki::repository::manifest::{Manifest, ManifestContent};

use crate::counters::CounterRegistry;
use crate::crypto::verify::{self, CertRole, VerifyPolicy};
use crate::crypto::{certinfo, reader};
use crate::error::Outcome;
use crate::stage::Trees;
use crate::validators::crl as crl_validator;

pub struct ManifestResult {
    pub content: ManifestContent,
    pub ee: ResourceCert,
    pub crl: Crl,
}

enum Source {
    Current,
    Backup,
}

/// Fetch, decode, and fully validate the manifest published under `ca_info`'s
/// SIA, returning its content plus the validated EE certificate and CRL it
/// was checked against. If a validated manifest already exists under
/// `authenticated/` from earlier in this same run, it is decoded and
/// returned without re-verification.
pub fn check_manifest(
    ca_uri: &str,
    ca_cert: &ResourceCert,
    ca_info: &crate::crypto::CertInfo,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> Option<ManifestResult> {
    let Some(manifest_uri) = &ca_info.manifest else {
        counters.record(ca_uri, Outcome::ManifestMissing);
        return None;
    };

    if let Some(result) = try_recheck(manifest_uri, ca_cert, trees, counters, policy) {
        return Some(result);
    }

    if let Ok(path) = trees.unauthenticated_path(manifest_uri) {
        if let Some(result) = try_source(manifest_uri, &path, ca_cert, Source::Current, trees, counters, policy) {
            return Some(result);
        }
    }

    if let Ok(path) = trees.old_authenticated_path(manifest_uri) {
        if let Some(result) = try_source(manifest_uri, &path, ca_cert, Source::Backup, trees, counters, policy) {
            return Some(result);
        }
    }

    None
}

fn try_recheck(
    uri: &str,
    ca_cert: &ResourceCert,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> Option<ManifestResult> {
    let path = trees.authenticated_path(uri).ok()?;
    if !path.exists() {
        return None;
    }
    let hashed = reader::read_with_hash(&path).ok()?;
    let manifest = Manifest::decode(hashed.bytes, true).ok()?;
    let ee_cert = manifest.cert().clone();
    let ee_info = certinfo::parse(&ee_cert, uri, false, |_| {}).ok()?;
    let crl_uri = ee_info.crldp.as_deref()?;
    let crl = crl_validator::check_crl(crl_uri, ca_cert, None, trees, counters)?;
    let (ee, _) = verify::check_x509(ee_cert, ca_cert, Some(&crl), CertRole::Ee, policy).ok()?;
    let content = manifest.content().clone();
    counters.record(uri, Outcome::ManifestRecheck);
    Some(ManifestResult { content, ee, crl })
}

fn try_source(
    uri: &str,
    path: &Path,
    ca_cert: &ResourceCert,
    source: Source,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> Option<ManifestResult> {
    if !path.exists() {
        return None;
    }

    let (accepted_outcome, rejected_outcome) = match source {
        Source::Current => (Outcome::CurrentManifestAccepted, Outcome::CurrentManifestRejected),
        Source::Backup => (Outcome::BackupManifestAccepted, Outcome::BackupManifestRejected),
    };

    let hashed = match reader::read_with_hash(path) {
        Ok(hashed) => hashed,
        Err(err) => {
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, rejected_outcome);
            return None;
        }
    };

    let manifest = match Manifest::decode(hashed.bytes, true) {
        Ok(manifest) => manifest,
        Err(err) => {
            let outcome = classify_decode_error(&err.to_string());
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, outcome);
            return None;
        }
    };

    let ee_cert = manifest.cert().clone();
    let ee_info = match certinfo::parse(&ee_cert, uri, false, |outcome| counters.record(uri, outcome)) {
        Ok(info) => info,
        Err(outcome) => {
            counters.record(uri, outcome);
            return None;
        }
    };
    if ee_info.crldp.is_none() {
        counters.record(uri, Outcome::ManifestMissingCrldp);
        return None;
    }

    let content = manifest.content().clone();

    if content.version() != 0 {
        counters.record(uri, Outcome::ManifestWrongVersion);
        return None;
    }

    let now = chrono::Utc::now();
    if content.this_update().timestamp() > now.timestamp() {
        counters.record(uri, Outcome::ManifestNotYetValid);
        return None;
    }
    if content.next_update().timestamp() < now.timestamp() {
        counters.record(uri, Outcome::StaleManifest);
        if !policy.allow_stale_manifest {
            return None;
        }
    }

    if content.file_hash_alg() != &rpki::oid::SHA256 {
        counters.record(uri, Outcome::ManifestDecodeError);
        return None;
    }

    let crl_uri = match ee_info.crldp.as_deref() {
        Some(uri) => uri,
        None => {
            counters.record(uri, Outcome::ManifestMissingCrldp);
            return None;
        }
    };
    let crl_filename = crl_uri.rsplit('/').next().unwrap_or(crl_uri);
    let crl_entry = content
        .iter()
        .find(|entry| String::from_utf8_lossy(entry.file()).as_ref() == crl_filename);
    let crl_hash = match crl_entry {
        Some(entry) => {
            let mut hash = [0u8; 32];
            let source = entry.hash();
            if source.len() == hash.len() {
                hash.copy_from_slice(source);
                Some(hash)
            } else {
                None
            }
        }
        None => {
            if policy.require_crl_in_manifest {
                counters.record(uri, Outcome::CrlNotInManifest);
                return None;
            }
            counters.record(uri, Outcome::CrlNotInManifest);
            None
        }
    };

    let Some(crl) = crl_validator::check_crl(crl_uri, ca_cert, crl_hash.as_ref(), trees, counters) else {
        counters.record(uri, Outcome::ManifestBadCrl);
        return None;
    };

    let (ee_resource_cert, warning) = match verify::check_x509(ee_cert, ca_cert, Some(&crl), CertRole::Ee, policy) {
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
    Some(ManifestResult {
        content,
        ee: ee_resource_cert,
        crl,
    })
}

fn classify_decode_error(message: &str) -> Outcome {
    let lower = message.to_ascii_lowercase();
    if lower.contains("content type") || lower.contains("econtenttype") {
        Outcome::ManifestBadEcontenttype
    } else if lower.contains("signer") {
        Outcome::ManifestMissingSigner
    } else if lower.contains("cms") {
        Outcome::ManifestInvalidCms
    } else {
        Outcome::ManifestDecodeError
    }
}
