//! Configuration file reader, per spec.md s6.
//!
//! Not TOML: one `key value` pair per non-blank, non-`#` line, the same
//! shape rcynic's own config loop reads. Repeatable keys accumulate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub authenticated: PathBuf,
    pub old_authenticated: PathBuf,
    pub unauthenticated: PathBuf,
    pub rsync_program: PathBuf,
    pub rsync_timeout: Option<Duration>,
    pub lockfile: Option<PathBuf>,
    pub jitter: Duration,
    pub log_level: LogLevel,
    pub use_syslog: bool,
    pub use_stderr: bool,
    pub syslog_facility: String,
    pub xml_summary: Option<PathBuf>,
    pub allow_stale_crl: bool,
    pub allow_stale_manifest: bool,
    pub allow_non_self_signed_trust_anchor: bool,
    pub allow_object_not_in_manifest: bool,
    pub require_crl_in_manifest: bool,
    pub use_links: bool,
    pub prune: bool,
    pub trust_anchors: Vec<PathBuf>,
    pub trust_anchor_locators: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    LogSysErr,
    LogUsageErr,
    LogDataErr,
    LogTelemetry,
    LogVerbose,
    LogDebug,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            authenticated: PathBuf::from("rpki-data/authenticated"),
            old_authenticated: PathBuf::from("rpki-data/old_authenticated"),
            unauthenticated: PathBuf::from("rpki-data/unauthenticated"),
            rsync_program: PathBuf::from("rsync"),
            rsync_timeout: Some(Duration::from_secs(300)),
            lockfile: None,
            jitter: Duration::from_secs(0),
            log_level: LogLevel::LogTelemetry,
            use_syslog: false,
            use_stderr: true,
            syslog_facility: "LOG_LOCAL0".to_owned(),
            xml_summary: None,
            allow_stale_crl: false,
            allow_stale_manifest: false,
            allow_non_self_signed_trust_anchor: false,
            allow_object_not_in_manifest: false,
            require_crl_in_manifest: false,
            use_links: true,
            prune: true,
            trust_anchors: Vec::new(),
            trust_anchor_locators: Vec::new(),
        }
    }
}

impl Config {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
        let mut config = Config::default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default().trim();
            config
                .apply(key, value)
                .with_context(|| format!("{}:{}: invalid option", path.display(), lineno + 1))?;
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "authenticated" => self.authenticated = PathBuf::from(value),
            "old-authenticated" => self.old_authenticated = PathBuf::from(value),
            "unauthenticated" => self.unauthenticated = PathBuf::from(value),
            "rsync-program" => self.rsync_program = PathBuf::from(value),
            "rsync-timeout" => self.rsync_timeout = parse_timeout(value)?,
            "lockfile" => self.lockfile = Some(PathBuf::from(value)),
            "jitter" => self.jitter = Duration::from_secs(parse_u64(value)?),
            "log-level" => self.log_level = parse_log_level(value)?,
            "use-syslog" => self.use_syslog = parse_bool(value)?,
            "use-stderr" => self.use_stderr = parse_bool(value)?,
            "syslog-facility" => self.syslog_facility = value.to_owned(),
            "xml-summary" => self.xml_summary = Some(PathBuf::from(value)),
            "allow-stale-crl" => self.allow_stale_crl = parse_bool(value)?,
            "allow-stale-manifest" => self.allow_stale_manifest = parse_bool(value)?,
            "allow-non-self-signed-trust-anchor" => self.allow_non_self_signed_trust_anchor = parse_bool(value)?,
            "allow-object-not-in-manifest" => self.allow_object_not_in_manifest = parse_bool(value)?,
            "require-crl-in-manifest" => self.require_crl_in_manifest = parse_bool(value)?,
            "use-links" => self.use_links = parse_bool(value)?,
            "prune" => self.prune = parse_bool(value)?,
            "trust-anchor" => self.trust_anchors.push(PathBuf::from(value)),
            "trust-anchor-locator" => self.trust_anchor_locators.push(PathBuf::from(value)),
            key if key.starts_with("syslog-priority-") => {}
            other => bail!("unrecognized option `{other}`"),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => bail!("`{other}` is not a boolean"),
    }
}

fn parse_u64(value: &str) -> Result<u64> {
    value.parse().with_context(|| format!("`{value}` is not a number"))
}

fn parse_timeout(value: &str) -> Result<Option<Duration>> {
    if value == "0" || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(Duration::from_secs(parse_u64(value)?)))
}

fn parse_log_level(value: &str) -> Result<LogLevel> {
    match value {
        "log_sys_err" => Ok(LogLevel::LogSysErr),
        "log_usage_err" => Ok(LogLevel::LogUsageErr),
        "log_data_err" => Ok(LogLevel::LogDataErr),
        "log_telemetry" => Ok(LogLevel::LogTelemetry),
        "log_verbose" => Ok(LogLevel::LogVerbose),
        "log_debug" => Ok(LogLevel::LogDebug),
        other => bail!("`{other}` is not a recognized log level"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_simple_options_and_ignores_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpki.conf");
        std::fs::write(
            &path,
            "# a comment\nauthenticated /data/authenticated\nallow-stale-crl yes\njitter 600\n",
        )
        .unwrap();
        let config = Config::read(&path).unwrap();
        assert_eq!(config.authenticated, PathBuf::from("/data/authenticated"));
        assert!(config.allow_stale_crl);
        assert_eq!(config.jitter, Duration::from_secs(600));
    }

    #[test]
    fn trust_anchor_options_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpki.conf");
        std::fs::write(&path, "trust-anchor a.cer\ntrust-anchor b.cer\n").unwrap();
        let config = Config::read(&path).unwrap();
        assert_eq!(config.trust_anchors, vec![PathBuf::from("a.cer"), PathBuf::from("b.cer")]);
    }

    #[test]
    fn unrecognized_option_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpki.conf");
        std::fs::write(&path, "not-a-real-option 1\n").unwrap();
        assert!(Config::read(&path).is_err());
    }
}
