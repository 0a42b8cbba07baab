use std::collections::BTreeSet;
use tracing::trace;

/// Banner and header lines printed by `netstat -rn` before the routes.
const HEADER_PREFIXES: [&str; 3] = ["Routing tables", "Internet", "Destination"];

/// Name prefix of tunnel interfaces.
const TUNNEL_PREFIX: &str = "utun";

/// Default route and the halves used by split-tunnel VPN clients.
const DEFAULT_DESTINATIONS: [&str; 4] = ["default", "0/1", "128/1", "128.0/1"];

fn is_routed_destination(destination: &str) -> bool {
    DEFAULT_DESTINATIONS.contains(&destination)
        || destination.contains('/')
        || destination.contains('.')
}

/// Return the sorted, deduplicated names of tunnel interfaces carrying an
/// active route in an IPv4 routing table dump.
///
/// A row qualifies when its interface starts with `utun`, its flags contain
/// `U` (route up) and its destination is a default route or an address
/// rather than a symbolic name.
pub fn parse_route_table(output: &str) -> Vec<String> {
    let mut interfaces = BTreeSet::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || HEADER_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let (destination, flags, netif) = (fields[0], fields[2], fields[3]);
        if !netif.starts_with(TUNNEL_PREFIX) || !flags.contains('U') {
            continue;
        }
        if is_routed_destination(destination) {
            trace!("tunnel route {} via {} ({})", destination, netif, flags);
            interfaces.insert(netif.to_owned());
        }
    }

    interfaces.into_iter().collect()
}
