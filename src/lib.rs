#![warn(missing_docs)]
//! Netposture main components and helper functions used by `main`
//!
//! Two independent pipelines are provided:
//! - [`vpn`] runs system commands and reconciles their output into a
//!   [`VpnStatus`],
//! - [`internet`] decodes an IP lookup service payload into an
//!   [`InternetInfo`] and projects it into menu lines.
//!
//! They only meet in [`Posture`], which is what the `netposture` binary prints.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub mod command;
pub mod config;
pub mod internet;
pub mod vpn;
pub use command::{CommandLine, CommandRunner, SystemCommandRunner};
pub use config::{AppConfig, Args, Verbosity};
pub use internet::{InternetInfo, MenuLine};
pub use vpn::{DetectorCommands, VpnStatus, VpnStatusDetector};

/// Setup logging to stderr, keeping stdout for the report itself.
pub fn setup_tracing(verbosity: &Verbosity) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    let filter_layer =
        EnvFilter::try_new(verbosity.level_filter()).context("Initializing log filter")?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Read and decode a lookup service payload from `source` (`-` is stdin).
///
/// Returns `Ok(None)` when the content cannot be decoded: the caller has
/// nothing to display but this is not an error.
pub fn read_internet_info(source: &Path) -> Result<Option<InternetInfo>> {
    let bytes = if source == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Reading internet info from stdin")?;
        buf
    } else {
        fs::read(source).with_context(|| format!("Reading internet info from {source:?}"))?
    };
    let info = internet::decode(&bytes);
    if info.is_none() {
        warn!("Unusable internet info payload in {:?}", source);
    }
    Ok(info)
}

/// Snapshot of the host network privacy state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posture {
    /// VPN status detected from the system
    pub vpn: VpnStatus,
    /// Decoded lookup payload, if any
    pub info: Option<InternetInfo>,
}

#[derive(Serialize)]
struct PostureReport<'a> {
    vpn: &'a VpnStatus,
    vpn_connected: Option<bool>,
    info: Option<&'a InternetInfo>,
    menu: Vec<MenuLine>,
}

impl Posture {
    /// Text lines to display, sensitive ones only when `reveal` is set.
    pub fn lines(&self, reveal: bool) -> Vec<String> {
        let vpn = match &self.vpn {
            VpnStatus::Connected { service_names } => {
                format!("VPN: Connected ({})", service_names.join(", "))
            }
            VpnStatus::Disconnected => "VPN: Disconnected".to_owned(),
            VpnStatus::Unknown => "VPN: Unknown".to_owned(),
        };
        let mut lines = vec![vpn];
        match &self.info {
            Some(info) => lines.extend(
                info.menu_lines()
                    .into_iter()
                    .filter(|l| l.is_visible(reveal))
                    .map(|l| l.title),
            ),
            None => lines.push("Internet info unavailable".to_owned()),
        }
        lines
    }

    /// Json report including every menu line with its visibility flag.
    pub fn to_json(&self) -> Result<String> {
        let report = PostureReport {
            vpn: &self.vpn,
            vpn_connected: self.vpn.is_connected(),
            info: self.info.as_ref(),
            menu: self
                .info
                .as_ref()
                .map(InternetInfo::menu_lines)
                .unwrap_or_default(),
        };
        serde_json::to_string_pretty(&report).context("Serializing posture")
    }
}

/// Detect the VPN status and read the configured lookup payload once.
pub fn collect_posture(config: &AppConfig) -> Result<Posture> {
    let detector = VpnStatusDetector::new(
        config.commands.clone(),
        SystemCommandRunner::new(config.timeout),
    );
    debug!("Using {:?}", detector);
    let vpn = detector.detect();
    let info = match &config.info {
        Some(path) => read_internet_info(path)?,
        None => None,
    };
    Ok(Posture { vpn, info })
}



#[cfg(all(test, unix))]
mod collect_posture_should {
    use super::*;
    use mktemp::Temp;
    use std::time::Duration;
    use test_log::test;

    fn config(service_list: &str, route_table: &str) -> Result<AppConfig> {
        Ok(AppConfig {
            commands: DetectorCommands {
                service_list: service_list.parse()?,
                route_table: route_table.parse()?,
            },
            timeout: Duration::from_secs(5),
            info: None,
            reveal: false,
            json: false,
        })
    }

    #[test]
    fn report_service_list_evidence_end_to_end() -> Result<()> {
        let mut config = config(
            r#"/bin/sh -c "echo '* (Connected) Work VPN [IPSec]'""#,
            "/bin/sh -c 'exit 1'",
        )?;
        let temp = Temp::new_file()?;
        let path = temp.to_path_buf();
        fs::write(&path, r#"{"YourFuckingCity": "Portland", "YourFuckingCountry": "US"}"#)?;
        config.info = Some(path);

        let posture = collect_posture(&config)?;
        assert_eq!(
            posture.lines(false),
            ["VPN: Connected (Work VPN [IPSec])", "Location: Portland, US"]
        );
        Ok(())
    }

    #[test]
    fn fall_back_to_route_table() -> Result<()> {
        let config = config(
            "/bin/sh -c 'echo \"* (Disconnected) Work VPN\"'",
            "/bin/sh -c 'echo \"0/1  10.0.0.1  UGSc  utun6\"'",
        )?;
        let posture = collect_posture(&config)?;
        assert_eq!(
            posture.vpn,
            VpnStatus::Connected {
                service_names: vec!["utun6".to_owned()]
            }
        );
        Ok(())
    }

    #[test]
    fn report_unknown_when_commands_are_missing() -> Result<()> {
        let config = config("/nonexistent/scutil --nc list", "/nonexistent/netstat -rn")?;
        assert_eq!(collect_posture(&config)?.vpn, VpnStatus::Unknown);
        Ok(())
    }
}
