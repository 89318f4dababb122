//! The recursive validation walk, per spec.md s4.11.
//!
//! Each CA certificate is one level of recursion: fetch its publication
//! point, validate the certificate itself, validate its manifest, then
//! dispatch every object the manifest lists -- recursing into child CA
//! certificates, leaf-validating ROAs and Ghostbuster records, and noting
//! anything present on disk but absent from the manifest. The only
//! suspension point is inside the fetcher's subprocess drain loop; nothing
//! here blocks on anything else, so the walk needs no executor of its own.

use std::collections::HashSet;
use std::sync::Arc;

use rpki::repository::cert::ResourceCert;

use crate::counters::CounterRegistry;
use crate::crypto::verify::VerifyPolicy;
use crate::crypto::CertInfo;
use crate::error::Outcome;
use crate::fetch::{FetchCache, Fetcher, StaleCaches};
use crate::stage::Trees;
use crate::validators;

/// Everything shared read-only across the whole walk, bundled so a
/// recursive call site doesn't have to thread eight separate arguments.
pub struct WalkEnv {
    pub trees: Trees,
    pub fetcher: Fetcher,
    pub fetch_cache: FetchCache,
    pub counters: CounterRegistry,
    pub backup_cache: StaleCaches,
    pub policy: VerifyPolicy,
}

/// Walk the tree rooted at an already-validated trust anchor certificate.
pub fn walk_trust_anchor(env: &Arc<WalkEnv>, uri: &str, resource_cert: ResourceCert, info: CertInfo) {
    walk_ca(env, uri, resource_cert, info);
}

fn walk_ca(env: &Arc<WalkEnv>, uri: &str, resource_cert: ResourceCert, info: CertInfo) {
    let Some(sia) = &info.sia else {
        return;
    };

    env.fetcher.rsync_tree(sia, &env.fetch_cache, &env.counters);

    let Some(manifest) = validators::check_manifest(uri, &resource_cert, &info, &env.trees, &env.counters, &env.policy) else {
        return;
    };

    let listed: HashSet<String> = manifest
        .content
        .iter()
        .map(|entry| String::from_utf8_lossy(entry.file()).into_owned())
        .collect();

    note_unlisted_objects(env, sia, &listed, &resource_cert);

    for entry in manifest.content.iter() {
        let filename = String::from_utf8_lossy(entry.file()).into_owned();
        if filename.ends_with(".mft") || filename.ends_with(".mnf") || filename.ends_with(".crl") {
            continue;
        }
        let child_uri = format!("{sia}{filename}");
        let mut hash = [0u8; 32];
        let source = entry.hash();
        if source.len() != hash.len() {
            env.counters.record(&child_uri, Outcome::HashTooLong);
            continue;
        }
        hash.copy_from_slice(source);

        dispatch(env, &child_uri, &filename, Some(&hash), &resource_cert);
    }
}

fn dispatch(env: &Arc<WalkEnv>, uri: &str, filename: &str, hash: Option<&[u8; 32]>, issuer: &ResourceCert) {
    if filename.ends_with(".cer") {
        if let Some(result) = validators::check_cert(uri, hash, issuer, &env.trees, &env.counters, &env.policy, &env.backup_cache) {
            walk_ca(env, uri, result.resource_cert, result.info);
        }
    } else if filename.ends_with(".roa") {
        validators::check_roa(uri, hash, issuer, &env.trees, &env.counters, &env.policy);
    } else if filename.ends_with(".gbr") {
        validators::check_ghostbuster(uri, hash, issuer, &env.trees, &env.counters, &env.policy);
    } else {
        log::info!("ignoring manifest entry with unrecognized suffix: {filename}");
    }
}

/// Record `object_not_in_manifest` for every file physically present under
/// the publication point's unauthenticated mirror that the manifest did not
/// list, per spec.md s4.11's directory/manifest reconciliation. When the
/// allowance is enabled, the unlisted object is also dispatched -- there is
/// no manifest-supplied hash to check it against.
fn note_unlisted_objects(env: &Arc<WalkEnv>, sia: &str, listed: &HashSet<String>, issuer: &ResourceCert) {
    let Ok(dir) = env.trees.unauthenticated_path(sia) else {
        return;
    };
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name.ends_with(".mft") || name.ends_with(".mnf") {
            continue;
        }
        if !listed.contains(&name) {
            let uri = format!("{sia}{name}");
            log::warn!("Rejected {uri} because object_not_in_manifest");
            env.counters.record(&uri, Outcome::ObjectNotInManifest);
            if env.policy.allow_object_not_in_manifest {
                dispatch(env, &uri, &name, None, issuer);
            }
        }
    }
}
