//! Object reader: stream a file through a SHA-256 filter and decode it.

use std::path::Path;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decode error: {0}")]
    Decode(String),
}

/// The bytes of a file plus the SHA-256 digest computed while reading it.
pub struct HashedFile {
    pub bytes: Bytes,
    pub digest: [u8; 32],
}

/// Read `path` fully, computing its SHA-256 digest as it goes.
pub fn read_with_hash(path: &Path) -> Result<HashedFile, ReadError> {
    let data = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let digest: [u8; 32] = Sha256::digest(&data).into();
    Ok(HashedFile {
        bytes: Bytes::from(data),
        digest,
    })
}

/// Decode `bytes` as a DER-encoded certificate.
pub fn decode_cert(bytes: Bytes) -> Result<rpki::repository::cert::Cert, ReadError> {
    rpki::repository::cert::Cert::decode(bytes).map_err(|err| ReadError::Decode(err.to_string()))
}

/// Decode `bytes` as a DER-encoded CRL.
pub fn decode_crl(bytes: Bytes) -> Result<rpki::repository::crl::Crl, ReadError> {
    rpki::repository::crl::Crl::decode(bytes).map_err(|err| ReadError::Decode(err.to_string()))
}

/// Read a file through the hash filter and decode it as a certificate,
/// returning both the object and the digest, per spec.md s4.2.
pub fn read_cert(path: &Path) -> Result<(rpki::repository::cert::Cert, [u8; 32]), ReadError> {
    let hashed = read_with_hash(path)?;
    let cert = decode_cert(hashed.bytes)?;
    Ok((cert, hashed.digest))
}

/// Read a file through the hash filter and decode it as a CRL.
pub fn read_crl(path: &Path) -> Result<(rpki::repository::crl::Crl, [u8; 32]), ReadError> {
    let hashed = read_with_hash(path)?;
    let crl = decode_crl(hashed.bytes)?;
    Ok((crl, hashed.digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        let result = read_with_hash(Path::new("/nonexistent/does-not-exist.cer"));
        assert!(matches!(result, Err(ReadError::Io { .. })));
    }
}
