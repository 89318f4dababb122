//! Trust anchor loading, per spec.md s6.
//!
//! Two on-disk shapes are supported: a locally trusted DER certificate
//! (`--trust-anchor`), and a trust anchor locator -- a text file whose first
//! line is the rsync URI of the anchor certificate and whose second line is
//! the base64-encoded SubjectPublicKeyInfo the fetched certificate's key
//! must match (`--trust-anchor-locator`).

use std::path::Path;

use base64::Engine;
use thiserror::Error;

use crate::crypto::reader;

#[derive(Debug, Error)]
pub enum TrustAnchorError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("trust anchor locator {path} is malformed: {reason}")]
    Malformed { path: String, reason: &'static str },
    #[error("decode error: {0}")]
    Decode(String),
}

/// A trust anchor ready to be fetched and validated: the rsync URI to pull
/// the current anchor certificate from, plus -- for locators -- the public
/// key the fetched certificate must carry.
pub struct TrustAnchor {
    pub uri: String,
    pub expected_key: Option<Vec<u8>>,
}

/// Load a locally trusted anchor certificate directly; its own embedded URI
/// (its AIA, when present, or its subject) stands in for an rsync fetch
/// target of `local://`, never actually fetched.
pub fn load_local_cert(path: &Path) -> Result<rpki::repository::cert::Cert, TrustAnchorError> {
    let hashed = reader::read_with_hash(path).map_err(|err| TrustAnchorError::Io {
        path: path.display().to_string(),
        source: std::io::Error::other(err.to_string()),
    })?;
    rpki::repository::cert::Cert::decode(hashed.bytes).map_err(|err| TrustAnchorError::Decode(err.to_string()))
}

/// Parse a trust anchor locator file: first non-empty line the rsync URI,
/// remaining non-empty lines the base64-encoded SubjectPublicKeyInfo,
/// concatenated.
pub fn load_locator(path: &Path) -> Result<TrustAnchor, TrustAnchorError> {
    let text = std::fs::read_to_string(path).map_err(|source| TrustAnchorError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    let uri = lines.next().ok_or(TrustAnchorError::Malformed {
        path: path.display().to_string(),
        reason: "empty file",
    })?;
    if !crate::uri::is_rsync(uri) {
        return Err(TrustAnchorError::Malformed {
            path: path.display().to_string(),
            reason: "first line is not an rsync uri",
        });
    }

    let key_b64: String = lines.collect();
    if key_b64.is_empty() {
        return Err(TrustAnchorError::Malformed {
            path: path.display().to_string(),
            reason: "missing subject public key info",
        });
    }
    let expected_key = base64::engine::general_purpose::STANDARD
        .decode(key_b64)
        .map_err(|_| TrustAnchorError::Malformed {
            path: path.display().to_string(),
            reason: "subject public key info is not valid base64",
        })?;

    Ok(TrustAnchor {
        uri: uri.to_owned(),
        expected_key: Some(expected_key),
    })
}

/// True if the fetched anchor certificate's SubjectPublicKeyInfo matches the
/// key recorded in the locator, per spec.md s6's "indirect trust anchor"
/// acceptance rule.
pub fn key_matches(cert: &rpki::repository::cert::Cert, expected: &[u8]) -> bool {
    cert.subject_public_key_info().to_info_bytes().as_ref() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_requires_rsync_uri_on_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tal");
        std::fs::write(&path, "https://example.com/ta.cer\nQUJD").unwrap();
        assert!(matches!(load_locator(&path), Err(TrustAnchorError::Malformed { .. })));
    }

    #[test]
    fn locator_parses_uri_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.tal");
        std::fs::write(&path, "rsync://rpki.example/ta/ta.cer\n\nQUJD\n").unwrap();
        let anchor = load_locator(&path).unwrap();
        assert_eq!(anchor.uri, "rsync://rpki.example/ta/ta.cer");
        assert_eq!(anchor.expected_key.unwrap(), b"ABC");
    }
}
