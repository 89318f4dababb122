//! The per-object outcome sum type.
//!
//! Rewritten per the source's own REDESIGN note: the C implementation
//! returns 0/1 plus an out-param mutation; here every per-object validator
//! returns a `Result<(), Outcome>` (or wraps a success value), and the
//! walker always continues regardless of which variant it gets back.

use std::fmt;

use thiserror::Error;

/// A classification for an `Outcome`, mirroring rcynic's `good`/`warn`/`bad`
/// MIB counter kinds. Drives both the XML `kind` attribute and whether the
/// outcome is fatal to the object under validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Good,
    Warn,
    Bad,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Good => "good",
            Kind::Warn => "warn",
            Kind::Bad => "bad",
        })
    }
}

macro_rules! outcomes {
    ($( $variant:ident => ($kind:ident, $label:literal, $desc:literal) ),* $(,)?) => {
        /// The complete MIB counter / validation-status enumeration,
        /// recovered from rcynic.c's `MIB_COUNTERS` macro.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
        pub enum Outcome {
            $(
                #[error($desc)]
                $variant,
            )*
        }

        impl Outcome {
            pub const ALL: &'static [Outcome] = &[ $( Outcome::$variant ),* ];

            pub fn kind(self) -> Kind {
                match self {
                    $( Outcome::$variant => Kind::$kind, )*
                }
            }

            /// The machine-readable label used in the XML summary and log lines.
            pub fn label(self) -> &'static str {
                match self {
                    $( Outcome::$variant => $label, )*
                }
            }
        }
    };
}

outcomes! {
    ValidationOk => (Good, "validation_ok", "OK"),
    BackupCertAccepted => (Good, "backup_cert_accepted", "Backup certificates accepted"),
    BackupCertRejected => (Bad, "backup_cert_rejected", "Backup certificates rejected"),
    BackupCrlAccepted => (Good, "backup_crl_accepted", "Backup CRLs accepted"),
    BackupCrlRejected => (Bad, "backup_crl_rejected", "Backup CRLs rejected"),
    CurrentCertAccepted => (Good, "current_cert_accepted", "Current certificates accepted"),
    CurrentCertRejected => (Bad, "current_cert_rejected", "Current certificates rejected"),
    CurrentCrlAccepted => (Good, "current_crl_accepted", "Current CRLs accepted"),
    CurrentCrlRejected => (Bad, "current_crl_rejected", "Current CRLs rejected"),
    CurrentManifestAccepted => (Good, "current_manifest_accepted", "Current Manifests accepted"),
    CurrentManifestRejected => (Bad, "current_manifest_rejected", "Current Manifests rejected"),
    BackupManifestAccepted => (Good, "backup_manifest_accepted", "Backup Manifests accepted"),
    BackupManifestRejected => (Bad, "backup_manifest_rejected", "Backup Manifests rejected"),
    RsyncFailed => (Bad, "rsync_failed", "rsync transfers failed"),
    RsyncSucceeded => (Good, "rsync_succeeded", "rsync transfers succeeded"),
    RsyncTimedOut => (Bad, "rsync_timed_out", "rsync transfers timed out"),
    StaleCrl => (Warn, "stale_crl", "Stale CRLs"),
    MalformedSia => (Bad, "malformed_sia", "Malformed SIA extensions"),
    SiaMissing => (Bad, "sia_missing", "SIA extensions missing"),
    AiaMissing => (Bad, "aia_missing", "AIA extensions missing"),
    CrldpMissing => (Bad, "crldp_missing", "CRLDP extensions missing"),
    AiaMismatch => (Bad, "aia_mismatch", "Mismatched AIA extensions"),
    UnknownVerifyError => (Bad, "unknown_verify_error", "Unknown verify error"),
    CurrentCertRecheck => (Good, "current_cert_recheck", "Certificates rechecked"),
    ManifestRecheck => (Good, "manifest_recheck", "Manifests rechecked"),
    ManifestInvalidEe => (Bad, "manifest_invalid_ee", "Invalid manifest certificates"),
    ManifestInvalidCms => (Bad, "manifest_invalid_cms", "Manifest validation failures"),
    ManifestDecodeError => (Bad, "manifest_decode_error", "Manifest decode errors"),
    StaleManifest => (Warn, "stale_manifest", "Stale manifests"),
    ManifestNotYetValid => (Bad, "manifest_not_yet_valid", "Manifests not yet valid"),
    ManifestBadEcontenttype => (Bad, "manifest_bad_econtenttype", "Bad manifest eContentType"),
    ManifestMissingSigner => (Bad, "manifest_missing_signer", "Missing manifest signers"),
    ManifestMissingCrldp => (Bad, "manifest_missing_crldp", "Missing manifest CRLDP"),
    ManifestMalformedCrldp => (Bad, "manifest_malformed_crldp", "Malformed manifest CRLDP"),
    CertificateDigestMismatch => (Bad, "certificate_digest_mismatch", "Certificate digest mismatches"),
    CrlDigestMismatch => (Bad, "crl_digest_mismatch", "CRL digest mismatches"),
    CrlNotInManifest => (Bad, "crl_not_in_manifest", "CRL not listed in manifest"),
    RoaInvalidEe => (Bad, "roa_invalid_ee", "Invalid ROA certificates"),
    RoaInvalidCms => (Bad, "roa_invalid_cms", "ROA validation failures"),
    RoaDecodeError => (Bad, "roa_decode_error", "ROA decode errors"),
    RoaBadEcontenttype => (Bad, "roa_bad_econtenttype", "Bad ROA eContentType"),
    RoaMissingSigner => (Bad, "roa_missing_signer", "Missing ROA signers"),
    RoaDigestMismatch => (Bad, "roa_digest_mismatch", "ROA digest mismatches"),
    CurrentRoaAccepted => (Good, "current_roa_accepted", "Current ROAs accepted"),
    CurrentRoaRejected => (Bad, "current_roa_rejected", "Current ROAs rejected"),
    BackupRoaAccepted => (Good, "backup_roa_accepted", "Backup ROAs accepted"),
    BackupRoaRejected => (Bad, "backup_roa_rejected", "Backup ROAs rejected"),
    MalformedRoaAddressfamily => (Bad, "malformed_roa_addressfamily", "Malformed ROA addressFamilys"),
    ManifestWrongVersion => (Bad, "manifest_wrong_version", "Wrong manifest versions"),
    RoaWrongVersion => (Bad, "roa_wrong_version", "Wrong ROA versions"),
    TrustAnchorNotSelfSigned => (Warn, "trust_anchor_not_self_signed", "Trust anchor not self-signed"),
    UriTooLong => (Bad, "uri_too_long", "URI too long"),
    MalformedCrldp => (Bad, "malformed_crldp", "Malformed CRLDP extension"),
    CertificateBadSignature => (Bad, "certificate_bad_signature", "Bad certificate signature"),
    CertificateBadCrl => (Bad, "certificate_bad_crl", "Bad certificate CRL"),
    ManifestBadCrl => (Bad, "manifest_bad_crl", "Manifest has bad CRL"),
    RoaResourcesMalformed => (Bad, "roa_resources_malformed", "ROA resources malformed"),
    RoaBadAfi => (Bad, "roa_bad_afi", "ROA contains bad AFI value"),
    RoaNotNested => (Bad, "roa_not_nested", "ROA resources not in EE"),
    RoaBadCrl => (Bad, "roa_bad_crl", "ROA EE has bad CRL"),
    GhostbusterDigestMismatch => (Bad, "ghostbuster_digest_mismatch", "Ghostbuster digest mismatches"),
    GhostbusterBadEcontenttype => (Bad, "ghostbuster_bad_econtenttype", "Bad Ghostbuster eContentType"),
    GhostbusterInvalidCms => (Bad, "ghostbuster_invalid_cms", "Ghostbuster validation failures"),
    GhostbusterMissingSigner => (Bad, "ghostbuster_missing_signer", "Missing Ghostbuster signers"),
    GhostbusterBadCrl => (Bad, "ghostbuster_bad_crl", "Ghostbuster EE has bad CRL"),
    GhostbusterInvalidEe => (Bad, "ghostbuster_invalid_ee", "Invalid Ghostbuster certificates"),
    CurrentGhostbusterAccepted => (Good, "current_ghostbuster_accepted", "Current Ghostbusters accepted"),
    CurrentGhostbusterRejected => (Bad, "current_ghostbuster_rejected", "Current Ghostbusters rejected"),
    BackupGhostbusterAccepted => (Good, "backup_ghostbuster_accepted", "Backup Ghostbusters accepted"),
    BackupGhostbusterRejected => (Bad, "backup_ghostbuster_rejected", "Backup Ghostbusters rejected"),
    DisallowedExtension => (Bad, "disallowed_extension", "Disallowed X.509v3 extension"),
    CrldpMismatch => (Bad, "crldp_mismatch", "CRLDP doesn't match issuer's SIA"),
    ManifestMissing => (Bad, "manifest_missing", "Manifest pointer missing"),
    ManifestMismatch => (Bad, "manifest_mismatch", "Manifest doesn't match SIA"),
    TrustAnchorWithCrldp => (Bad, "trust_anchor_with_crldp", "Trust anchor can't have CRLDP"),
    ObjectNotInManifest => (Warn, "object_not_in_manifest", "Object not in manifest"),
    HashTooLong => (Bad, "hash_too_long", "Hash value is too long"),
    DecodeError => (Bad, "decode_error", "Object decode error"),
    VerifyError => (Bad, "verify_error", "Chain validation error"),
}

impl Outcome {
    /// True if this outcome, on its own, means the object must not be
    /// installed into `authenticated/`.
    pub fn is_fatal(self) -> bool {
        self.kind() == Kind::Bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = Outcome::ALL.iter().map(|o| o.label()).collect();
        labels.sort_unstable();
        let before = labels.len();
        labels.dedup();
        assert_eq!(before, labels.len(), "duplicate outcome labels");
    }

    #[test]
    fn validation_ok_is_good() {
        assert_eq!(Outcome::ValidationOk.kind(), Kind::Good);
        assert!(!Outcome::ValidationOk.is_fatal());
    }

    #[test]
    fn warn_is_not_fatal() {
        assert!(!Outcome::StaleCrl.is_fatal());
        assert!(!Outcome::ObjectNotInManifest.is_fatal());
    }
}
