use super::VpnStatus;
use tracing::trace;

/// Phrase printed by `scutil --nc list` before the service list, even when
/// no service is configured.
const SERVICE_LIST_MARKER: &str = "Available network connection services";

/// Split a `* (State) Service name` line into its lower-cased state token
/// and service name. Returns `None` when the line has no parenthesized token.
fn split_state_line(line: &str) -> Option<(String, &str)> {
    let open = line.find('(')?;
    let close = open + line[open..].find(')')?;
    let state = line[open + 1..close].trim().to_lowercase();
    let name = line[close + 1..].trim();
    Some((state, name))
}

/// Reconcile the output of a "list network services" command into a
/// [`VpnStatus`].
///
/// Every service whose state token is `connected` is reported, in source
/// order. Without any connected service the output must still look like a
/// service list (a state line or the list header) to be trusted as
/// [`VpnStatus::Disconnected`]; anything else is [`VpnStatus::Unknown`].
pub fn parse_service_list(output: &str) -> VpnStatus {
    let mut connected = Vec::new();
    let mut saw_service_state = false;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((state, name)) = split_state_line(line) {
            trace!("service {:?} is {:?}", name, state);
            saw_service_state = true;
            if state == "connected" {
                connected.push(name.to_owned());
            }
        }
    }

    if !connected.is_empty() {
        VpnStatus::Connected {
            service_names: connected,
        }
    } else if saw_service_state || output.contains(SERVICE_LIST_MARKER) {
        VpnStatus::Disconnected
    } else {
        VpnStatus::Unknown
    }
}
