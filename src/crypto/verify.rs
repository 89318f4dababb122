//! Verification engine: profile gate plus cryptographic path validation.
//!
//! The cryptographic/ASN.1 heavy lifting (signatures, RFC 3779 resource
//! algebra, CMS) is delegated to the `rpki` crate -- the external library
//! collaborator named in spec.md s1. This module owns the RPKI-profile
//! decisions layered on top of it: which extensions are mandatory, which
//! extensions are forbidden, and how a low-level verify outcome maps onto
//! our counter set.

use rpki::repository::cert::{Cert, ResourceCert};
use rpki::repository::crl::Crl;

use crate::crypto::certinfo::CertInfo;
use crate::error::Outcome;

/// The policy toggles from `--allow-*` config options that the engine
/// consults while interpreting an otherwise-fatal low-level outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyPolicy {
    pub allow_stale_crl: bool,
    pub allow_stale_manifest: bool,
    pub allow_non_self_signed_ta: bool,
    pub allow_object_not_in_manifest: bool,
    pub require_crl_in_manifest: bool,
}

/// Whether the certificate under test is an EE (leaf, non-CA) certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertRole {
    Ta,
    Ca,
    Ee,
}

/// Profile gate applied before cryptographic verification, per spec.md s4.6.
pub fn profile_gate(subject: &CertInfo, issuer: Option<&CertInfo>, role: CertRole) -> Result<(), Outcome> {
    if role != CertRole::Ta {
        let Some(issuer) = issuer else {
            return Err(Outcome::AiaMissing);
        };
        let Some(aia) = &subject.aia else {
            return Err(Outcome::AiaMissing);
        };
        if aia != &issuer.uri {
            return Err(Outcome::AiaMismatch);
        }
    }

    if role == CertRole::Ca {
        let Some(sia) = &subject.sia else {
            return Err(Outcome::SiaMissing);
        };
        let Some(manifest) = &subject.manifest else {
            return Err(Outcome::SiaMissing);
        };
        if !sia.ends_with('/') {
            return Err(Outcome::MalformedSia);
        }
        if !manifest.starts_with(sia.as_str()) {
            return Err(Outcome::ManifestMismatch);
        }
    }

    match role {
        CertRole::Ta => {
            if subject.crldp.is_some() {
                return Err(Outcome::TrustAnchorWithCrldp);
            }
        }
        CertRole::Ca => {
            if subject.crldp.is_none() {
                return Err(Outcome::CrldpMissing);
            }
        }
        CertRole::Ee => {
            let Some(crldp) = &subject.crldp else {
                return Err(Outcome::CrldpMissing);
            };
            if let Some(issuer) = issuer {
                if let Some(issuer_sia) = &issuer.sia {
                    if !crldp.starts_with(issuer_sia.as_str()) {
                        return Err(Outcome::CrldpMismatch);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Outcome of the cryptographic half of the engine: a validated resource
/// certificate -- plus, when the only thing wrong with it was a stale CRL
/// the policy allows, the warning to record for it -- or the mapped
/// rejection reason.
pub fn check_x509(
    cert: Cert,
    issuer: &ResourceCert,
    crl: Option<&Crl>,
    role: CertRole,
    policy: &VerifyPolicy,
) -> Result<(ResourceCert, Option<Outcome>), Outcome> {
    let validate = |cert: &Cert, strict: bool| match role {
        CertRole::Ca => cert.clone().validate_ca(issuer, strict),
        CertRole::Ee => cert.clone().validate_ee(issuer, strict),
        CertRole::Ta => unreachable!("trust anchors are validated via validate_trust_anchor"),
    };

    let (resource_cert, warning) = match validate(&cert, true) {
        Ok(resource_cert) => (resource_cert, None),
        Err(err) => match map_verify_error(&err.to_string(), policy) {
            StaleCrlVerdict::Allowed => {
                let resource_cert = validate(&cert, false).map_err(|_| Outcome::StaleCrl)?;
                (resource_cert, Some(Outcome::StaleCrl))
            }
            StaleCrlVerdict::Disallowed => return Err(Outcome::StaleCrl),
            StaleCrlVerdict::Other(outcome) => return Err(outcome),
        },
    };

    if let Some(crl) = crl {
        if crl.contains(resource_cert.cert().serial_number()) {
            return Err(Outcome::CertificateBadCrl);
        }
    }

    Ok((resource_cert, warning))
}

enum StaleCrlVerdict {
    Allowed,
    Disallowed,
    Other(Outcome),
}

/// Validate a trust anchor certificate against its own embedded key
/// (self-signed) or, when the allowance is enabled, accept a non-self-signed
/// anchor whose issuer cannot be located locally.
pub fn validate_trust_anchor(cert: Cert, policy: &VerifyPolicy) -> Result<ResourceCert, Outcome> {
    match cert.clone().validate_ta(cert.issuer().clone(), true) {
        Ok(resource_cert) => Ok(resource_cert),
        Err(err) => {
            if policy.allow_non_self_signed_ta && is_missing_issuer(&err.to_string()) {
                log::warn!("accepting non-self-signed trust anchor ({})", cert.subject());
                cert.validate_ta(cert.issuer().clone(), false)
                    .map_err(|_| Outcome::TrustAnchorNotSelfSigned)
            } else {
                Err(match map_verify_error(&err.to_string(), policy) {
                    StaleCrlVerdict::Allowed => Outcome::StaleCrl,
                    StaleCrlVerdict::Disallowed => Outcome::StaleCrl,
                    StaleCrlVerdict::Other(outcome) => outcome,
                })
            }
        }
    }
}

fn is_missing_issuer(message: &str) -> bool {
    message.to_ascii_lowercase().contains("issuer")
}

/// Classify a low-level verifier failure. A "stale CRL" message is split on
/// the policy: `Allowed` tells the caller to retry non-strict and accept
/// with a warning, `Disallowed` is a plain rejection under the same label.
/// Anything else maps to a dedicated counter when recognised, or
/// `VerifyError` otherwise.
fn map_verify_error(message: &str, policy: &VerifyPolicy) -> StaleCrlVerdict {
    let lower = message.to_ascii_lowercase();
    if lower.contains("stale") || lower.contains("next update") {
        if policy.allow_stale_crl {
            return StaleCrlVerdict::Allowed;
        }
        return StaleCrlVerdict::Disallowed;
    }
    if lower.contains("signature") {
        return StaleCrlVerdict::Other(Outcome::CertificateBadSignature);
    }
    if lower.contains("resource") || lower.contains("nest") {
        return StaleCrlVerdict::Other(Outcome::DisallowedExtension);
    }
    StaleCrlVerdict::Other(Outcome::VerifyError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::certinfo::CertInfo;

    fn info(uri: &str, sia: Option<&str>, manifest: Option<&str>, aia: Option<&str>, crldp: Option<&str>) -> CertInfo {
        CertInfo {
            uri: uri.to_owned(),
            is_ca: sia.is_some(),
            is_ta: false,
            sia: sia.map(str::to_owned),
            manifest: manifest.map(str::to_owned),
            aia: aia.map(str::to_owned),
            crldp: crldp.map(str::to_owned),
        }
    }

    #[test]
    fn ca_requires_manifest_under_sia() {
        let issuer = info("rsync://a/parent.cer", Some("rsync://a/parent/"), None, None, None);
        let subject = info(
            "rsync://a/child.cer",
            Some("rsync://a/parent/child/"),
            Some("rsync://a/parent/child/child.mft"),
            Some("rsync://a/parent.cer"),
            Some("rsync://a/parent/child.crl"),
        );
        assert!(profile_gate(&subject, Some(&issuer), CertRole::Ca).is_ok());
    }

    #[test]
    fn ca_manifest_outside_sia_is_rejected() {
        let issuer = info("rsync://a/parent.cer", Some("rsync://a/parent/"), None, None, None);
        let subject = info(
            "rsync://a/child.cer",
            Some("rsync://a/parent/child/"),
            Some("rsync://a/elsewhere/child.mft"),
            Some("rsync://a/parent.cer"),
            Some("rsync://a/parent/child.crl"),
        );
        assert_eq!(
            profile_gate(&subject, Some(&issuer), CertRole::Ca),
            Err(Outcome::ManifestMismatch)
        );
    }

    #[test]
    fn ta_with_crldp_is_rejected() {
        let subject = info("rsync://a/ta.cer", None, None, None, Some("rsync://a/ta.crl"));
        assert_eq!(
            profile_gate(&subject, None, CertRole::Ta),
            Err(Outcome::TrustAnchorWithCrldp)
        );
    }

    #[test]
    fn aia_must_match_issuer_uri() {
        let issuer = info("rsync://a/parent.cer", Some("rsync://a/parent/"), None, None, None);
        let subject = info(
            "rsync://a/child.cer",
            Some("rsync://a/parent/child/"),
            Some("rsync://a/parent/child/child.mft"),
            Some("rsync://a/wrong.cer"),
            Some("rsync://a/parent/child.crl"),
        );
        assert_eq!(
            profile_gate(&subject, Some(&issuer), CertRole::Ca),
            Err(Outcome::AiaMismatch)
        );
    }
}
