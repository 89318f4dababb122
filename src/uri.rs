//! URI/path mapper: translate `rsync://` URIs to sanitized filesystem paths.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Implementation-defined maximum URI length, on the order of 1 KiB.
pub const MAX_URI_LEN: usize = 1024;

pub const RSYNC_SCHEME: &str = "rsync://";

#[derive(Debug, Error)]
pub enum UriError {
    #[error("uri too long: {0} bytes")]
    TooLong(usize),
    #[error("uri is not an rsync uri")]
    NotRsync,
    #[error("uri contains a path traversal segment")]
    Traversal,
}

/// True iff `uri` begins with the rsync scheme prefix.
pub fn is_rsync(uri: &str) -> bool {
    uri.starts_with(RSYNC_SCHEME)
}

/// Strip the `rsync://` prefix and reject any path-traversal shape.
///
/// Fails if the remainder starts with `/` or `.`, contains a `/../`
/// segment, or ends in `/..`.
fn stripped(uri: &str) -> Result<&str, UriError> {
    if uri.len() >= MAX_URI_LEN {
        return Err(UriError::TooLong(uri.len()));
    }
    let rest = uri.strip_prefix(RSYNC_SCHEME).ok_or(UriError::NotRsync)?;
    if rest.starts_with('/') || rest.starts_with('.') {
        return Err(UriError::Traversal);
    }
    if rest.contains("/../") || rest.ends_with("/..") || rest == ".." {
        return Err(UriError::Traversal);
    }
    Ok(rest)
}

/// Translate an rsync URI to a filesystem path, optionally rooted at `prefix`.
pub fn uri_to_path(uri: &str, prefix: Option<&Path>) -> Result<PathBuf, UriError> {
    let rest = stripped(uri)?;
    let mut path = prefix.map(Path::to_path_buf).unwrap_or_default();
    path.push(rest);
    Ok(path)
}

/// The hostname portion of an rsync URI: everything up to the first `/`
/// after the scheme. Used as the key for per-host counters.
pub fn hostname(uri: &str) -> Result<&str, UriError> {
    let rest = stripped(uri)?;
    Ok(rest.split('/').next().unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_uri() {
        assert!(is_rsync("rsync://rpki.example/repo/ca.cer"));
        assert!(!is_rsync("https://rpki.example/repo/ca.cer"));
    }

    #[test]
    fn rejects_traversal() {
        assert!(matches!(
            uri_to_path("rsync://rpki.example/../etc/passwd", None),
            Err(UriError::Traversal)
        ));
        assert!(matches!(
            uri_to_path("rsync://rpki.example/a/../b", None),
            Err(UriError::Traversal)
        ));
        assert!(matches!(
            uri_to_path("rsync://rpki.example/a/..", None),
            Err(UriError::Traversal)
        ));
    }

    #[test]
    fn rejects_absolute_remainder() {
        assert!(matches!(
            uri_to_path("rsync:///etc/passwd", None),
            Err(UriError::Traversal)
        ));
    }

    #[test]
    fn maps_with_prefix() {
        let path = uri_to_path(
            "rsync://rpki.example/repo/ca.cer",
            Some(Path::new("/data/unauthenticated")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/data/unauthenticated/rpki.example/repo/ca.cer"));
    }

    #[test]
    fn hostname_is_first_segment() {
        assert_eq!(hostname("rsync://rpki.example/repo/ca.cer").unwrap(), "rpki.example");
    }

    #[test]
    fn rejects_overlong_uri() {
        let long = format!("rsync://{}", "a".repeat(MAX_URI_LEN));
        assert!(matches!(uri_to_path(&long, None), Err(UriError::TooLong(_))));
    }
}
