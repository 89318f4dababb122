//! Logging sink setup, per spec.md s6 and s7.
//!
//! The core logs exclusively through the `log` facade; this module is the
//! only place that picks a sink. `--stderr` installs `pretty_env_logger`,
//! `--syslog` installs the `syslog` crate's logger, and both may be active
//! at once.

use anyhow::{Context, Result};
use log::LevelFilter;

use crate::config::LogLevel;

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::LogSysErr => LevelFilter::Error,
        LogLevel::LogUsageErr => LevelFilter::Error,
        LogLevel::LogDataErr => LevelFilter::Warn,
        LogLevel::LogTelemetry => LevelFilter::Info,
        LogLevel::LogVerbose => LevelFilter::Debug,
        LogLevel::LogDebug => LevelFilter::Trace,
    }
}

/// Install the stderr and/or syslog sinks at the configured level. At least
/// one of `use_stderr`/`use_syslog` must be set or log output is dropped
/// entirely, matching the original's "you asked for silence" behavior.
pub fn init(level: LogLevel, use_stderr: bool, use_syslog: bool, facility: &str) -> Result<()> {
    let filter = level_filter(level);

    if use_syslog {
        init_syslog(filter, facility)?;
    } else if use_stderr {
        std::env::set_var("RUST_LOG", filter.to_string());
        pretty_env_logger::init();
    } else {
        log::set_max_level(LevelFilter::Off);
    }

    Ok(())
}

#[cfg(unix)]
fn init_syslog(filter: LevelFilter, facility: &str) -> Result<()> {
    let facility = parse_facility(facility);
    let formatter = syslog::Formatter3164 {
        facility,
        hostname: None,
        process: "rrp".into(),
        pid: std::process::id(),
    };
    let logger = syslog::unix(formatter).context("could not connect to syslog")?;
    log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
        .map(|()| log::set_max_level(filter))
        .context("a logger was already installed")
}

#[cfg(not(unix))]
fn init_syslog(_filter: LevelFilter, _facility: &str) -> Result<()> {
    anyhow::bail!("syslog is only supported on unix targets")
}

#[cfg(unix)]
fn parse_facility(name: &str) -> syslog::Facility {
    match name {
        "LOG_LOCAL0" => syslog::Facility::LOG_LOCAL0,
        "LOG_LOCAL1" => syslog::Facility::LOG_LOCAL1,
        "LOG_LOCAL2" => syslog::Facility::LOG_LOCAL2,
        "LOG_LOCAL3" => syslog::Facility::LOG_LOCAL3,
        "LOG_LOCAL4" => syslog::Facility::LOG_LOCAL4,
        "LOG_LOCAL5" => syslog::Facility::LOG_LOCAL5,
        "LOG_LOCAL6" => syslog::Facility::LOG_LOCAL6,
        "LOG_LOCAL7" => syslog::Facility::LOG_LOCAL7,
        "LOG_DAEMON" => syslog::Facility::LOG_DAEMON,
        _ => syslog::Facility::LOG_USER,
    }
}
