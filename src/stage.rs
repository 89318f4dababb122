//! Staging orchestrator: manages the three on-disk trees.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::fetch::FetchCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Hard link for space; the fetcher must not mutate files in place.
    Link,
    /// Copy, to defend against the fetcher mutating files underneath us.
    Copy,
}

#[derive(Debug, Clone)]
pub struct Trees {
    pub authenticated: PathBuf,
    pub old_authenticated: PathBuf,
    pub unauthenticated: PathBuf,
    pub install_mode: InstallMode,
}

impl Trees {
    /// Rotate the trees before a run starts: delete the previous
    /// `old_authenticated/`, rename `authenticated/` to `old_authenticated/`,
    /// then create a fresh, empty `authenticated/`.
    pub fn rotate(&self) -> Result<()> {
        if self.old_authenticated.exists() {
            std::fs::remove_dir_all(&self.old_authenticated)
                .with_context(|| format!("could not remove {}", self.old_authenticated.display()))?;
        }
        if self.authenticated.exists() {
            std::fs::rename(&self.authenticated, &self.old_authenticated).with_context(|| {
                format!(
                    "could not rename {} to {}",
                    self.authenticated.display(),
                    self.old_authenticated.display()
                )
            })?;
        }
        std::fs::create_dir_all(&self.authenticated)
            .with_context(|| format!("could not create {}", self.authenticated.display()))?;
        std::fs::create_dir_all(&self.unauthenticated)
            .with_context(|| format!("could not create {}", self.unauthenticated.display()))?;
        Ok(())
    }

    /// Install `source` (a file already known-good under `unauthenticated/`
    /// or `old_authenticated/`) at the path for `uri` under `authenticated/`.
    pub fn install(&self, uri: &str, source: &Path) -> Result<()> {
        let dest = crate::uri::uri_to_path(uri, Some(&self.authenticated))
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
        // Remove a stale target first: a hard link cannot silently overwrite
        // a pre-existing destination.
        let _ = std::fs::remove_file(&dest);
        match self.install_mode {
            InstallMode::Link => std::fs::hard_link(source, &dest)
                .or_else(|_| std::fs::copy(source, &dest).map(|_| ()))
                .with_context(|| format!("could not install {} at {}", source.display(), dest.display())),
            InstallMode::Copy => std::fs::copy(source, &dest)
                .map(|_| ())
                .with_context(|| format!("could not install {} at {}", source.display(), dest.display())),
        }
    }

    pub fn authenticated_path(&self, uri: &str) -> Result<PathBuf> {
        crate::uri::uri_to_path(uri, Some(&self.authenticated)).map_err(|err| anyhow::anyhow!("{err}"))
    }

    pub fn unauthenticated_path(&self, uri: &str) -> Result<PathBuf> {
        crate::uri::uri_to_path(uri, Some(&self.unauthenticated)).map_err(|err| anyhow::anyhow!("{err}"))
    }

    pub fn old_authenticated_path(&self, uri: &str) -> Result<PathBuf> {
        crate::uri::uri_to_path(uri, Some(&self.old_authenticated)).map_err(|err| anyhow::anyhow!("{err}"))
    }

    /// Remove any file or directory under `unauthenticated/` whose relative
    /// path is not prefix-covered by the fetch cache -- remnants of URIs no
    /// longer reachable anywhere in the hierarchy. Uses the buffer's actual
    /// size as the bound, not a fixed-size comparison (see spec.md s9's note
    /// on the original's off-by-type bound).
    pub fn prune_unauthenticated(&self, cache: &FetchCache) -> Result<()> {
        let prefixes = cache.prefixes();
        prune_dir(&self.unauthenticated, &self.unauthenticated, &prefixes)
    }
}

fn prune_dir(root: &Path, dir: &Path, prefixes: &[String]) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        let covered = prefixes
            .iter()
            .any(|prefix| relative_str == *prefix || relative_str.starts_with(&format!("{prefix}/")) || prefix.starts_with(&format!("{relative_str}/")));

        if !covered {
            log::debug!("pruning unreferenced {}", path.display());
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
            continue;
        }

        if path.is_dir() {
            prune_dir(root, &path, prefixes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trees(root: &Path) -> Trees {
        Trees {
            authenticated: root.join("authenticated"),
            old_authenticated: root.join("old_authenticated"),
            unauthenticated: root.join("unauthenticated"),
            install_mode: InstallMode::Copy,
        }
    }

    #[test]
    fn rotate_preserves_previous_authenticated_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let trees = trees(dir.path());
        std::fs::create_dir_all(&trees.authenticated).unwrap();
        std::fs::write(trees.authenticated.join("marker"), b"old").unwrap();

        trees.rotate().unwrap();

        assert!(trees.old_authenticated.join("marker").exists());
        assert!(trees.authenticated.read_dir().unwrap().next().is_none());
    }

    #[test]
    fn install_copies_into_authenticated_tree() {
        let dir = tempfile::tempdir().unwrap();
        let trees = trees(dir.path());
        std::fs::create_dir_all(&trees.unauthenticated).unwrap();
        let src = trees.unauthenticated.join("ca.cer");
        std::fs::write(&src, b"hello").unwrap();

        trees.install("rsync://rpki.example/repo/ca.cer", &src).unwrap();

        let installed = trees.authenticated_path("rsync://rpki.example/repo/ca.cer").unwrap();
        assert_eq!(std::fs::read(installed).unwrap(), b"hello");
    }

    #[test]
    fn prune_removes_files_not_covered_by_cache() {
        let dir = tempfile::tempdir().unwrap();
        let trees = trees(dir.path());
        std::fs::create_dir_all(trees.unauthenticated.join("rpki.example/repo")).unwrap();
        std::fs::write(trees.unauthenticated.join("rpki.example/repo/live.cer"), b"x").unwrap();
        std::fs::write(trees.unauthenticated.join("rpki.example/repo/stale.cer"), b"x").unwrap();

        let cache = FetchCache::new();
        cache.insert("rsync://rpki.example/repo/live.cer");

        trees.prune_unauthenticated(&cache).unwrap();

        assert!(trees.unauthenticated.join("rpki.example/repo/live.cer").exists());
        assert!(!trees.unauthenticated.join("rpki.example/repo/stale.cer").exists());
    }
}
