//! Certificate parser: extract the fields the walker and profile gate need.

use rpki::repository::cert::{Cert, KeyUsage};

use crate::error::Outcome;
use crate::uri::{self, MAX_URI_LEN};

/// Everything the walker and verification engine need out of a certificate,
/// per spec.md s3.
#[derive(Debug, Clone)]
pub struct CertInfo {
    pub uri: String,
    pub is_ca: bool,
    pub is_ta: bool,
    /// SIA caRepository, when present. Always ends in `/` on a CA cert by
    /// the time it reaches here (enforced by the profile gate, not here).
    pub sia: Option<String>,
    pub manifest: Option<String>,
    pub aia: Option<String>,
    pub crldp: Option<String>,
}

/// Copy `uri` and walk the AIA, SIA, and CRLDP extensions of `cert`.
///
/// Non-rsync URIs inside these extensions are silently skipped (with a
/// verbose log note); a URI whose length would overflow [`MAX_URI_LEN`] is
/// rejected outright with `uri_too_long`; a malformed CRLDP shape yields
/// `malformed_crldp` and leaves `crldp` empty, but does not otherwise fail
/// the parse.
pub fn parse(cert: &Cert, cert_uri: &str, is_ta: bool, on_outcome: impl Fn(Outcome)) -> Result<CertInfo, Outcome> {
    let is_ca = matches!(cert.key_usage(), KeyUsage::Ca);

    let aia = first_rsync_uri(cert.ca_issuer().map(|u| u.to_string()).as_deref(), &on_outcome)?;
    let sia = first_rsync_uri(cert.ca_repository().map(|u| u.to_string()).as_deref(), &on_outcome)?;
    let manifest = first_rsync_uri(cert.rpki_manifest().map(|u| u.to_string()).as_deref(), &on_outcome)?;

    let crldp = match cert.crl_uri() {
        Some(uri) => {
            let uri = uri.to_string();
            if !uri::is_rsync(&uri) {
                on_outcome(Outcome::MalformedCrldp);
                None
            } else {
                first_rsync_uri(Some(&uri), &on_outcome)?
            }
        }
        None => None,
    };

    Ok(CertInfo {
        uri: cert_uri.to_owned(),
        is_ca,
        is_ta,
        sia,
        manifest,
        aia,
        crldp,
    })
}

fn first_rsync_uri(candidate: Option<&str>, on_outcome: &impl Fn(Outcome)) -> Result<Option<String>, Outcome> {
    let Some(candidate) = candidate else {
        return Ok(None);
    };
    if candidate.len() >= MAX_URI_LEN {
        on_outcome(Outcome::UriTooLong);
        return Err(Outcome::UriTooLong);
    }
    if !uri::is_rsync(candidate) {
        log::debug!("skipping non-rsync uri {candidate}");
        return Ok(None);
    }
    Ok(Some(candidate.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlong_uri_is_rejected() {
        let long = format!("rsync://{}", "a".repeat(MAX_URI_LEN));
        let result = first_rsync_uri(Some(&long), &|_| {});
        assert!(matches!(result, Err(Outcome::UriTooLong)));
    }

    #[test]
    fn non_rsync_uri_is_skipped_not_failed() {
        let result = first_rsync_uri(Some("https://example.com/ca.cer"), &|_| {});
        assert_eq!(result.unwrap(), None);
    }
}
