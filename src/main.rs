use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;

use rrp::config::{Config, LogLevel};
use rrp::crypto::verify::{self, VerifyPolicy};
use rrp::fetch::{FetchCache, Fetcher, StaleCaches};
use rrp::stage::{InstallMode, Trees};
use rrp::walk::{self, WalkEnv};
use rrp::{counters::CounterRegistry, trust_anchor, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::read(&cli.config).with_context(|| format!("could not open --config {}", cli.config.display()))?;

    let log_level = match &cli.log_level {
        Some(level) => parse_log_level(level)?,
        None => config.log_level,
    };
    rrp::logging::init(log_level, cli.stderr || config.use_stderr, cli.syslog || config.use_syslog, &config.syslog_facility)
        .context("could not initialize logging")?;

    if let Some(jitter) = cli.jitter.or(Some(config.jitter.as_secs())).filter(|s| *s > 0) {
        let seconds = rand::rng().random_range(0..=jitter);
        log::debug!("sleeping {seconds}s of jitter before starting");
        std::thread::sleep(std::time::Duration::from_secs(seconds));
    }

    let _lock = config.lockfile.as_deref().map(acquire_lockfile).transpose()?;

    run(&config)
}

fn run(config: &Config) -> Result<()> {
    let trees = Trees {
        authenticated: config.authenticated.clone(),
        old_authenticated: config.old_authenticated.clone(),
        unauthenticated: config.unauthenticated.clone(),
        install_mode: if config.use_links { InstallMode::Link } else { InstallMode::Copy },
    };
    trees.rotate().context("could not rotate the on-disk trees")?;

    let fetcher = Fetcher {
        rsync_program: config.rsync_program.clone(),
        timeout: config.rsync_timeout,
        unauthenticated_root: config.unauthenticated.clone(),
    };

    let env = Arc::new(WalkEnv {
        trees,
        fetcher,
        fetch_cache: FetchCache::new(),
        counters: CounterRegistry::new(),
        backup_cache: StaleCaches::new(),
        policy: VerifyPolicy {
            allow_stale_crl: config.allow_stale_crl,
            allow_stale_manifest: config.allow_stale_manifest,
            allow_non_self_signed_ta: config.allow_non_self_signed_trust_anchor,
            allow_object_not_in_manifest: config.allow_object_not_in_manifest,
            require_crl_in_manifest: config.require_crl_in_manifest,
        },
    });

    for path in &config.trust_anchors {
        if let Err(err) = walk_local_trust_anchor(&env, path) {
            log::warn!("Rejected trust anchor {} because {err:#}", path.display());
        }
    }
    for path in &config.trust_anchor_locators {
        if let Err(err) = walk_locator_trust_anchor(&env, path) {
            log::warn!("Rejected trust anchor locator {} because {err:#}", path.display());
        }
    }

    if config.prune {
        let _ = env.trees.prune_unauthenticated(&env.fetch_cache);
    }

    if let Some(xml_path) = &config.xml_summary {
        write_xml_summary(xml_path, &env.counters)?;
    }

    let any_bad = env
        .counters
        .hosts()
        .values()
        .any(|host| rrp::error::Outcome::ALL.iter().any(|o| o.is_fatal() && host.get(*o) > 0));

    if any_bad {
        std::process::exit(1);
    }
    Ok(())
}

fn walk_local_trust_anchor(env: &Arc<WalkEnv>, path: &std::path::Path) -> Result<()> {
    let cert = trust_anchor::load_local_cert(path).map_err(anyhow::Error::from)?;
    let uri = cert
        .ca_repository()
        .map(|u| u.to_string())
        .context("trust anchor certificate has no SIA caRepository")?;
    let resource_cert = verify::validate_trust_anchor(cert, &env.policy).map_err(|err| anyhow::anyhow!("{err}"))?;
    let info = rrp::crypto::certinfo::parse(resource_cert.cert(), &uri, true, |_| {}).map_err(|err| anyhow::anyhow!("{err}"))?;
    walk::walk_trust_anchor(env, &uri, resource_cert, info);
    Ok(())
}

fn walk_locator_trust_anchor(env: &Arc<WalkEnv>, path: &std::path::Path) -> Result<()> {
    let anchor = trust_anchor::load_locator(path).map_err(anyhow::Error::from)?;
    env.fetcher.rsync_file(&anchor.uri, &env.fetch_cache, &env.counters);
    let fetched_path = env
        .trees
        .unauthenticated_path(&anchor.uri)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    let (cert, _) = rrp::crypto::reader::read_cert(&fetched_path).map_err(|err| anyhow::anyhow!("{err}"))?;

    if let Some(expected) = &anchor.expected_key {
        if !trust_anchor::key_matches(&cert, expected) {
            anyhow::bail!("fetched trust anchor key does not match the locator");
        }
    }

    let resource_cert = verify::validate_trust_anchor(cert, &env.policy).map_err(|err| anyhow::anyhow!("{err}"))?;
    let info = rrp::crypto::certinfo::parse(resource_cert.cert(), &anchor.uri, true, |_| {}).map_err(|err| anyhow::anyhow!("{err}"))?;
    walk::walk_trust_anchor(env, &anchor.uri, resource_cert, info);
    Ok(())
}

fn write_xml_summary(path: &std::path::Path, counters: &CounterRegistry) -> Result<()> {
    log::info!("Writing XML summary to {}", path.display());
    let file = std::fs::File::create(path).with_context(|| format!("could not create {}", path.display()))?;
    rrp::xml::write_summary(file, counters)
}

fn parse_log_level(value: &str) -> Result<LogLevel> {
    match value {
        "log_sys_err" => Ok(LogLevel::LogSysErr),
        "log_usage_err" => Ok(LogLevel::LogUsageErr),
        "log_data_err" => Ok(LogLevel::LogDataErr),
        "log_telemetry" => Ok(LogLevel::LogTelemetry),
        "log_verbose" => Ok(LogLevel::LogVerbose),
        "log_debug" => Ok(LogLevel::LogDebug),
        other => anyhow::bail!("`{other}` is not a recognized log level"),
    }
}

#[cfg(unix)]
fn acquire_lockfile(path: &std::path::Path) -> Result<std::fs::File> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::fd::AsRawFd;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .with_context(|| format!("could not open lockfile {}", path.display()))?;
    flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
        .with_context(|| format!("another instance already holds {}", path.display()))?;
    Ok(file)
}

#[cfg(not(unix))]
fn acquire_lockfile(path: &std::path::Path) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .with_context(|| format!("could not open lockfile {}", path.display()))
}

