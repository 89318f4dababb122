use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod counters;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod stage;
pub mod trust_anchor;
pub mod uri;
pub mod validators;
pub mod walk;
pub mod xml;

pub use config::Config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "rpki.conf")]
    pub config: PathBuf,

    /// Override the configured log level
    #[arg(short = 'l', long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log to syslog
    #[arg(short = 's', long)]
    pub syslog: bool,

    /// Log to standard error
    #[arg(short = 'e', long)]
    pub stderr: bool,

    /// Sleep a random number of seconds (0..=jitter) before starting, to
    /// spread load when many instances are started by the same cron entry
    #[arg(short = 'j', long, value_name = "SECONDS")]
    pub jitter: Option<u64>,
}
