//! Detect whether a VPN is active by reconciling two system signals.
//!
//! The named network services (`scutil --nc list` on macOS) are the
//! authoritative signal. Tunnel routes in the IPv4 routing table
//! (`netstat -rn -f inet`) are only consulted when no named service reports
//! itself connected.

mod route_parse;
mod service_parse;

pub use route_parse::parse_route_table;
pub use service_parse::parse_service_list;

use crate::command::{CommandLine, CommandRunner, SystemCommandRunner};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// VPN state as seen by the operating system.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VpnStatus {
    /// At least one VPN is up. Names are either connected service names or,
    /// when only routing evidence exists, tunnel interface names.
    Connected {
        /// Names of the connected services or interfaces
        service_names: Vec<String>,
    },
    /// The system reports VPN services and none is connected
    Disconnected,
    /// No usable signal was available
    Unknown,
}

impl VpnStatus {
    /// Boolean view of the status, `None` when unknown.
    pub fn is_connected(&self) -> Option<bool> {
        match self {
            VpnStatus::Connected { .. } => Some(true),
            VpnStatus::Disconnected => Some(false),
            VpnStatus::Unknown => None,
        }
    }
}

impl fmt::Display for VpnStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VpnStatus::Connected { service_names } => {
                write!(f, "connected ({})", service_names.join(", "))
            }
            VpnStatus::Disconnected => write!(f, "disconnected"),
            VpnStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Commands queried by [`VpnStatusDetector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorCommands {
    /// Lists configured network services with their connection state
    pub service_list: CommandLine,
    /// Dumps the IPv4 routing table
    pub route_table: CommandLine,
}

impl Default for DetectorCommands {
    fn default() -> Self {
        DetectorCommands {
            service_list: CommandLine::new("/usr/sbin/scutil", &["--nc", "list"]),
            route_table: CommandLine::new("/usr/sbin/netstat", &["-rn", "-f", "inet"]),
        }
    }
}

/// Run the system commands and combine their verdicts into a [`VpnStatus`].
pub struct VpnStatusDetector {
    commands: DetectorCommands,
    /// Command runner for executing system commands (enables mocking in tests)
    runner: Box<dyn CommandRunner>,
}

impl fmt::Debug for VpnStatusDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VpnStatusDetector")
            .field("commands", &self.commands)
            .finish()
    }
}

impl VpnStatusDetector {
    /// Create a detector running `commands` on the host.
    pub fn new(commands: DetectorCommands, runner: SystemCommandRunner) -> Self {
        Self::with_runner(commands, Box::new(runner))
    }

    /// Create a detector with a custom command runner.
    pub fn with_runner(commands: DetectorCommands, runner: Box<dyn CommandRunner>) -> Self {
        VpnStatusDetector { commands, runner }
    }

    fn output_of(&self, command: &CommandLine) -> Option<String> {
        match command.run_with(self.runner.as_ref()) {
            Ok(output) => Some(output),
            Err(e) => {
                debug!("No output from `{}`: {:#}", command, anyhow::Error::from(e));
                None
            }
        }
    }

    /// Status reported by the named network services alone.
    pub fn service_status(&self) -> VpnStatus {
        match self.output_of(&self.commands.service_list) {
            Some(output) => parse_service_list(&output),
            None => VpnStatus::Unknown,
        }
    }

    /// Tunnel interfaces carrying an active route, sorted.
    pub fn tunnel_interfaces(&self) -> Vec<String> {
        self.output_of(&self.commands.route_table)
            .map(|output| parse_route_table(&output))
            .unwrap_or_default()
    }

    /// Detect the VPN status.
    ///
    /// A connected named service wins outright. Otherwise any tunnel route
    /// means connected, then the services' disconnected verdict applies, and
    /// only when neither signal is usable the status is unknown.
    pub fn detect(&self) -> VpnStatus {
        let service_status = self.service_status();
        debug!("Service list status: {:?}", service_status);
        let status = if let VpnStatus::Connected { .. } = service_status {
            service_status
        } else {
            let mut interfaces = self.tunnel_interfaces();
            debug!("Tunnel interfaces with routes: {:?}", interfaces);
            if !interfaces.is_empty() {
                interfaces.sort();
                VpnStatus::Connected {
                    service_names: interfaces,
                }
            } else if service_status == VpnStatus::Disconnected {
                VpnStatus::Disconnected
            } else {
                VpnStatus::Unknown
            }
        };
        info!("VPN is {}", status);
        status
    }
}
