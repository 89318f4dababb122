//! External file-synchronization transport: invokes `rsync` as a subprocess.
//!
//! Grounded in the teacher's subprocess-invocation idiom (`Command` with
//! piped stdout, `.with_context(...)` on spawn failure) but extended with a
//! wall-clock timeout, since the validator must not hang forever on a dead
//! mirror.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context;

use crate::counters::CounterRegistry;
use crate::error::Outcome;
use crate::fetch::cache::FetchCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

pub struct Fetcher {
    pub rsync_program: std::path::PathBuf,
    pub timeout: Option<Duration>,
    pub unauthenticated_root: std::path::PathBuf,
}

impl Fetcher {
    /// Recursive tree sync of `uri` into `unauthenticated_root`, mirroring
    /// semantics (deletes local files absent from the remote).
    pub fn rsync_tree(&self, uri: &str, cache: &FetchCache, counters: &CounterRegistry) -> FetchOutcome {
        self.run(uri, cache, true, counters)
    }

    /// Single-file sync of `uri`.
    pub fn rsync_file(&self, uri: &str, cache: &FetchCache, counters: &CounterRegistry) -> FetchOutcome {
        self.run(uri, cache, false, counters)
    }

    fn run(&self, uri: &str, cache: &FetchCache, recursive: bool, counters: &CounterRegistry) -> FetchOutcome {
        // Prefix deduplication: a previously-fetched prefix makes this a no-op success.
        if cache.is_cached(uri) {
            log::debug!("rsync: {uri} already covered by a prior fetch, skipping");
            counters.record(uri, Outcome::RsyncSucceeded);
            return FetchOutcome::Succeeded;
        }

        let dest = match crate::uri::uri_to_path(uri, Some(&self.unauthenticated_root)) {
            Ok(path) => path,
            Err(err) => {
                log::warn!("Rejected {uri} because {err}");
                cache.insert(uri);
                counters.record(uri, Outcome::RsyncFailed);
                return FetchOutcome::Failed;
            }
        };

        if let Some(parent) = dest.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                log::warn!("Rejected {uri} because could not create {}: {err}", parent.display());
                cache.insert(uri);
                counters.record(uri, Outcome::RsyncFailed);
                return FetchOutcome::Failed;
            }
        }

        let outcome = self.spawn_and_wait(uri, &dest, recursive);
        cache.insert(uri);
        let record_outcome = match outcome {
            FetchOutcome::Succeeded => Outcome::RsyncSucceeded,
            FetchOutcome::Failed => Outcome::RsyncFailed,
            FetchOutcome::TimedOut => Outcome::RsyncTimedOut,
        };
        counters.record(uri, record_outcome);
        outcome
    }

    fn spawn_and_wait(&self, uri: &str, dest: &Path, recursive: bool) -> FetchOutcome {
        let mut command = Command::new(&self.rsync_program);
        command.args(["--update", "--times", "--copy-links", "--itemize-changes"]);
        if recursive {
            command.args(["--recursive", "--delete"]);
        }
        command.arg(uri).arg(dest);

        log::debug!("Running {command:?}");

        let mut child = match command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("could not execute `{}`, is it installed?", self.rsync_program.display()))
        {
            Ok(child) => child,
            Err(err) => {
                log::warn!("Rejected {uri} because {err:#}");
                return FetchOutcome::Failed;
            }
        };

        let wait_result = match self.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout),
            None => child.wait().map(Some),
        };

        relay_output(uri, &mut child);

        match wait_result {
            Ok(Some(status)) if status.success() => {
                log::info!("Accepted {uri}");
                FetchOutcome::Succeeded
            }
            Ok(Some(status)) => {
                log::warn!("Rejected {uri} because rsync exited with {status}");
                FetchOutcome::Failed
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("Rejected {uri} because rsync timed out");
                FetchOutcome::TimedOut
            }
            Err(err) => {
                log::warn!("Rejected {uri} because {err}");
                FetchOutcome::Failed
            }
        }
    }
}

/// Drain the child's merged stdout/stderr line-by-line to the logger. The
/// draining loop is the only suspension point in the core: it must not run
/// any validation logic while waiting, per the concurrency model.
fn relay_output(uri: &str, child: &mut std::process::Child) {
    use std::io::Read;

    let mut buf = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let _ = stdout.read_to_string(&mut buf);
    }
    if let Some(mut stderr) = child.stderr.take() {
        let mut err_buf = String::new();
        let _ = stderr.read_to_string(&mut err_buf);
        buf.push_str(&err_buf);
    }
    for line in buf.lines() {
        log::debug!("rsync[{uri}]: {line}");
    }
}

/// Poll the child at short intervals up to `timeout`, without running any
/// other work on this thread while waiting.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_prefix_is_a_no_op_success() {
        let cache = FetchCache::new();
        cache.insert("rsync://rpki.example/repo");

        let fetcher = Fetcher {
            rsync_program: "/bin/true".into(),
            timeout: Some(Duration::from_secs(1)),
            unauthenticated_root: std::env::temp_dir(),
        };

        let counters = CounterRegistry::new();
        assert_eq!(
            fetcher.rsync_tree("rsync://rpki.example/repo/ca", &cache, &counters),
            FetchOutcome::Succeeded
        );
    }
}
