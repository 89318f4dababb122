//! ROA validator, per spec.md s4.9.

use std::net::IpAddr;
use std::path::Path;

use rpki::repository::cert::ResourceCert;
use rpki::repository::roa::Roa;

use crate::counters::CounterRegistry;
use crate::crypto::verify::{self, CertRole, VerifyPolicy};
use crate::crypto::{certinfo, reader};
use crate::error::Outcome;
use crate::stage::Trees;
use crate::validators::crl as crl_validator;

#[derive(Debug, Clone, Copy)]
pub struct RoaPrefix {
    pub addr: IpAddr,
    pub prefix_len: u8,
    pub max_length: u8,
}

pub struct RoaResult {
    pub as_id: u32,
    pub prefixes: Vec<RoaPrefix>,
}

enum Source {
    Current,
    Backup,
}

pub fn check_roa(
    uri: &str,
    expected_hash: Option<&[u8; 32]>,
    ca_cert: &ResourceCert,
    trees: &Trees,
    counters: &CounterRegistry,
    policy: &VerifyPolicy,
) -> Option<RoaResult> {
    if let Ok(path) = trees.unauthenticated_path(uri) {
        if let Some(result) = try_source(uri, &path, expected_hash, ca_cert, Source::Current, trees, counters, policy) {
            return Some(result);
        }
    }

    if let Ok(path) = trees.old_authenticated_path(uri) {
        if let Some(result) = try_source(uri, &path, expected_hash, ca_cert, Source::Backup, trees, counters, policy) {
            return Some(result);
        }
    }

    None
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
) -> Option<RoaResult> {
    if !path.exists() {
        return None;
    }

    let (accepted_outcome, rejected_outcome) = match source {
        Source::Current => (Outcome::CurrentRoaAccepted, Outcome::CurrentRoaRejected),
        Source::Backup => (Outcome::BackupRoaAccepted, Outcome::BackupRoaRejected),
    };

    let hashed = match reader::read_with_hash(path) {
        Ok(hashed) => hashed,
        Err(err) => {
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, rejected_outcome);
            return None;
        }
    };

    if let Some(expected) = expected_hash {
        if &hashed.digest != expected {
            counters.record(uri, Outcome::RoaDigestMismatch);
            return None;
        }
    }

    let roa = match Roa::decode(hashed.bytes, true) {
        Ok(roa) => roa,
        Err(err) => {
            let outcome = classify_decode_error(&err.to_string());
            log::warn!("Rejected {uri} because {err}");
            counters.record(uri, outcome);
            return None;
        }
    };

    let ee_cert = roa.cert().clone();
    let ee_info = match certinfo::parse(&ee_cert, uri, false, |outcome| counters.record(uri, outcome)) {
        Ok(info) => info,
        Err(outcome) => {
            counters.record(uri, outcome);
            return None;
        }
    };
    let Some(crl_uri) = ee_info.crldp.as_deref() else {
        counters.record(uri, Outcome::CrldpMissing);
        return None;
    };
    let Some(crl) = crl_validator::check_crl(crl_uri, ca_cert, None, trees, counters) else {
        counters.record(uri, Outcome::RoaBadCrl);
        return None;
    };

    let content = roa.content();
    let as_id = content.as_id().into_u32();
    let mut prefixes = Vec::new();
    for family in [AddressFamily::V4, AddressFamily::V6] {
        let entries = match family {
            AddressFamily::V4 => content.v4_addrs().iter().map(prefix_from_v4).collect::<Vec<_>>(),
            AddressFamily::V6 => content.v6_addrs().iter().map(prefix_from_v6).collect::<Vec<_>>(),
        };
        let denested = denest(entries);
        prefixes.extend(denested);
    }

    let (ee_resource_cert, warning) = match verify::check_x509(ee_cert, ca_cert, Some(&crl), CertRole::Ee, policy) {
        Ok(pair) => pair,
        Err(outcome) => {
            counters.record(uri, outcome);
            return None;
        }
    };

    if !prefixes.iter().all(|prefix| resource_cert_contains(&ee_resource_cert, prefix)) {
        counters.record(uri, Outcome::RoaNotNested);
        return None;
    }

    if trees.install(uri, path).is_err() {
        counters.record(uri, rejected_outcome);
        return None;
    }

    log::info!("Accepted {uri}");
    counters.record(uri, warning.unwrap_or(accepted_outcome));
    Some(RoaResult { as_id, prefixes })
}

enum AddressFamily {
    V4,
    V6,
}

fn prefix_from_v4(addr: rpki::repository::roa::FriendlyRoaIpAddress) -> RoaPrefix {
    RoaPrefix {
        addr: IpAddr::V4(addr.address()),
        prefix_len: addr.address_length(),
        max_length: addr.max_length(),
    }
}

fn prefix_from_v6(addr: rpki::repository::roa::FriendlyRoaIpAddress) -> RoaPrefix {
    RoaPrefix {
        addr: IpAddr::V6(addr.address()),
        prefix_len: addr.address_length(),
        max_length: addr.max_length(),
    }
}

/// Drop any prefix wholly contained by an earlier, already-kept prefix, per
/// spec.md s4.9 step 2. Entries are sorted into canonical order (by address,
/// then length) first so containment can be checked against a single
/// running predecessor.
fn denest(mut entries: Vec<RoaPrefix>) -> Vec<RoaPrefix> {
    entries.sort_by(|a, b| a.addr.cmp(&b.addr).then(a.prefix_len.cmp(&b.prefix_len)));
    let mut kept: Vec<RoaPrefix> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !kept.iter().any(|prior| contains(prior, &entry)) {
            kept.push(entry);
        }
    }
    kept
}

fn contains(outer: &RoaPrefix, inner: &RoaPrefix) -> bool {
    if outer.prefix_len > inner.prefix_len {
        return false;
    }
    match (outer.addr, inner.addr) {
        (IpAddr::V4(a), IpAddr::V4(b)) => truncate_v4(a, outer.prefix_len) == truncate_v4(b, outer.prefix_len),
        (IpAddr::V6(a), IpAddr::V6(b)) => truncate_v6(a, outer.prefix_len) == truncate_v6(b, outer.prefix_len),
        _ => false,
    }
}

fn truncate_v4(addr: std::net::Ipv4Addr, len: u8) -> u32 {
    let bits = u32::from(addr);
    if len == 0 {
        0
    } else {
        bits & (u32::MAX << (32 - len as u32))
    }
}

fn truncate_v6(addr: std::net::Ipv6Addr, len: u8) -> u128 {
    let bits = u128::from(addr);
    if len == 0 {
        0
    } else {
        bits & (u128::MAX << (128 - len as u32))
    }
}

fn resource_cert_contains(cert: &ResourceCert, prefix: &RoaPrefix) -> bool {
    use rpki::repository::resources::Prefix;

    match prefix.addr {
        IpAddr::V4(addr) => cert.v4_resources().contains(Prefix::new(addr, prefix.prefix_len)),
        IpAddr::V6(addr) => cert.v6_resources().contains(Prefix::new_v6(addr, prefix.prefix_len)),
    }
}

fn classify_decode_error(message: &str) -> Outcome {
    let lower = message.to_ascii_lowercase();
    if lower.contains("content type") || lower.contains("econtenttype") {
        Outcome::RoaBadEcontenttype
    } else if lower.contains("signer") {
        Outcome::RoaMissingSigner
    } else if lower.contains("afi") || lower.contains("address family") {
        Outcome::MalformedRoaAddressfamily
    } else if lower.contains("cms") {
        Outcome::RoaInvalidCms
    } else {
        Outcome::RoaDecodeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(a: u8, b: u8, c: u8, d: u8, len: u8) -> RoaPrefix {
        RoaPrefix {
            addr: IpAddr::V4(std::net::Ipv4Addr::new(a, b, c, d)),
            prefix_len: len,
            max_length: len,
        }
    }

    #[test]
    fn denest_drops_prefix_contained_by_earlier_entry() {
        let entries = vec![prefix(10, 0, 0, 0, 8), prefix(10, 0, 0, 0, 16)];
        let denested = denest(entries);
        assert_eq!(denested.len(), 1);
        assert_eq!(denested[0].prefix_len, 8);
    }

    #[test]
    fn denest_keeps_disjoint_prefixes() {
        let entries = vec![prefix(10, 0, 0, 0, 8), prefix(192, 168, 0, 0, 16)];
        let denested = denest(entries);
        assert_eq!(denested.len(), 2);
    }

    #[test]
    fn truncate_masks_host_bits() {
        let addr = std::net::Ipv4Addr::new(10, 1, 2, 3);
        assert_eq!(truncate_v4(addr, 8), truncate_v4(std::net::Ipv4Addr::new(10, 9, 9, 9), 8));
    }
}
