//! This module holds struct and helpers for parameters and configuration
//!
//! Configuration is merged from, by increasing priority: built-in defaults,
//! the TOML configuration file, environment variables and command line flags.
use ::structopt::clap::AppSettings;
use anyhow::{bail, Context, Result};
use directories_next::ProjectDirs;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{CommandLine, DEFAULT_TIMEOUT, MAX_TIMEOUT};
use crate::vpn::DetectorCommands;

/// Verbosity flags shared by every subcommand.
#[derive(structopt::StructOpt, Debug, Clone, Default, PartialEq, Eq)]
pub struct Verbosity {
    /// Increase the output's verbosity level
    ///
    /// Pass many times to increase verbosity level, up to 3.
    #[structopt(
        name = "verbose",
        long = "verbose",
        short = "v",
        parse(from_occurrences),
        conflicts_with = "quiet",
        global = true
    )]
    verbose: u8,

    /// Decrease the output's verbosity level.
    ///
    /// Used once, only errors are logged. Used twice, logging is off.
    #[structopt(
        name = "quiet",
        long = "quiet",
        short = "q",
        parse(from_occurrences),
        global = true
    )]
    quiet: u8,
}

/// Log levels indexed by `verbose - quiet + 2`.
const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Verbosity {
    /// Level usable as an `EnvFilter` directive (`warn` without any flag).
    pub fn level_filter(&self) -> &'static str {
        let index = 2 + i16::from(self.verbose.min(3)) - i16::from(self.quiet.min(2));
        LEVELS[index as usize]
    }

    fn is_default(&self) -> bool {
        self == &Verbosity::default()
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.level_filter())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = s.to_ascii_lowercase();
        match LEVELS.iter().position(|l| *l == level) {
            Some(index) => Ok(Verbosity {
                verbose: index.saturating_sub(2) as u8,
                quiet: 2usize.saturating_sub(index) as u8,
            }),
            None => Err(serde::de::Error::custom(format!(
                "unknown log level '{s}', expected one of {}",
                LEVELS.join(", ")
            ))),
        }
    }
}

#[derive(structopt::StructOpt, Serialize, Deserialize, Debug, Clone)]
/// Report VPN status and internet identity information
///
/// Detect whether a VPN is active from the system network services and
/// routing table, and show what a saved IP lookup payload tells about the
/// current internet connection.
#[structopt(global_settings(&[AppSettings::ColoredHelp, AppSettings::ColorAuto]))]
pub struct Args {
    /// configuration file
    ///
    /// Defaults to `netposture.toml` in the user configuration directory.
    #[serde(skip)]
    #[structopt(short, long, env = "NETPOSTURE_CONFIG", parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// command listing network services and their state
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "NETPOSTURE_SERVICE_LIST_CMD")]
    pub service_list_cmd: Option<String>,

    /// command printing the IPv4 routing table
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(long, env = "NETPOSTURE_ROUTE_TABLE_CMD")]
    pub route_table_cmd: Option<String>,

    /// maximum run time of each command, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(short, long, env = "NETPOSTURE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// IP lookup service payload to decode (`-` for stdin)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[structopt(short, long, env = "NETPOSTURE_INFO", parse(from_os_str))]
    pub info: Option<PathBuf>,

    /// show sensitive lines (IP address, Tor exit)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[structopt(short, long)]
    pub reveal: bool,

    /// print the result as json
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[structopt(long)]
    pub json: bool,

    #[structopt(flatten)]
    #[serde(default, skip_serializing_if = "Verbosity::is_default")]
    pub verbose: Verbosity,
}

impl Default for Args {
    fn default() -> Args {
        let commands = DetectorCommands::default();
        Args {
            config: None,
            service_list_cmd: Some(commands.service_list.to_string()),
            route_table_cmd: Some(commands.route_table.to_string()),
            timeout: Some(DEFAULT_TIMEOUT.as_secs()),
            info: None,
            reveal: false,
            json: false,
            verbose: Verbosity::default(),
        }
    }
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// commands queried for VPN detection
    pub commands: DetectorCommands,
    /// maximum run time of each command
    pub timeout: Duration,
    /// lookup payload location, `-` meaning stdin
    pub info: Option<PathBuf>,
    /// show lines hidden without privilege
    pub reveal: bool,
    /// print json instead of text
    pub json: bool,
}

fn parse_command(name: &str, value: &Option<String>) -> Result<CommandLine> {
    let value = value
        .as_deref()
        .with_context(|| format!("{name} is not defined"))?;
    value
        .parse()
        .with_context(|| format!("Parsing {name} '{value}'"))
}

impl Args {
    /// Check merged arguments and build the [`AppConfig`].
    pub fn validate(self) -> Result<AppConfig> {
        let commands = DetectorCommands {
            service_list: parse_command("service_list_cmd", &self.service_list_cmd)?,
            route_table: parse_command("route_table_cmd", &self.route_table_cmd)?,
        };
        let timeout = match self.timeout {
            None => bail!("timeout is not defined"),
            Some(0) => bail!("timeout shall be at least one second"),
            Some(secs) if secs > MAX_TIMEOUT.as_secs() => bail!(
                "timeout shall be at most {} seconds (got {})",
                MAX_TIMEOUT.as_secs(),
                secs
            ),
            Some(secs) => Duration::from_secs(secs),
        };
        Ok(AppConfig {
            commands,
            timeout,
            info: self.info,
            reveal: self.reveal,
            json: self.json,
        })
    }
}

/// Default location of the configuration file, if the platform has one.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("net", "netposture", "netposture")
        .map(|dirs| dirs.config_dir().join("netposture.toml"))
}

/// Merge defaults, the configuration file `file` (ignored when missing) and
/// command line `args`.
pub fn merge(args: Args, file: Option<&Path>) -> Result<Args> {
    let mut figment = Figment::from(Serialized::defaults(Args::default()));
    if let Some(path) = file {
        figment = figment.merge(Toml::file(path));
    }
    let config = args.config.clone();
    let mut merged: Args = figment
        .merge(Serialized::defaults(args))
        .extract()
        .context("Merging configuration")?;
    merged.config = config;
    Ok(merged)
}

/// Configuration file read by [`load`]: the one given on the command line,
/// or the default one.
pub fn config_file(args: &Args) -> Option<PathBuf> {
    args.config.clone().or_else(default_config_file)
}

/// Merge command line `args` with the file [`config_file`] designates.
///
/// Tracing is not set up yet when this runs, since verbosity itself may come
/// from the file: callers log the outcome afterwards.
pub fn load(args: Args) -> Result<Args> {
    let file = config_file(&args);
    merge(args, file.as_deref())
}
