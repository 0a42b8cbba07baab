//! Internet identity information and its projection into menu lines.
//!
//! [`InternetInfo`] is built from the lookup service payload with
//! [`decode`]; [`InternetInfo::menu_lines`] turns it into the ordered entries
//! shown in the menu.
pub mod decode;
pub use decode::{decode, DecodeError};

use serde::Serialize;

/// Public identity of the host as seen from the internet.
///
/// A `None` field is unknown. Present strings are trimmed and never empty.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct InternetInfo {
    /// public IP address
    pub ip_address: Option<String>,
    /// internet service provider name
    pub isp: Option<String>,
    /// human readable location
    pub location: Option<String>,
    /// lookup service belief that the address belongs to a VPN
    pub vpn: Option<bool>,
    /// whether the address is a Tor exit node
    pub tor_exit: Option<bool>,
}

/// One entry of the internet info menu.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MenuLine {
    /// text of the entry
    pub title: String,
    /// the entry is only shown while the user asks to reveal sensitive data
    pub hidden_without_privilege: bool,
}

impl MenuLine {
    fn new(title: String, hidden_without_privilege: bool) -> Self {
        MenuLine {
            title,
            hidden_without_privilege,
        }
    }

    /// Return `true` if the line shall be displayed.
    pub fn is_visible(&self, reveal: bool) -> bool {
        reveal || !self.hidden_without_privilege
    }
}

impl InternetInfo {
    /// Menu entries, always in the order IP, ISP, location, Tor exit.
    ///
    /// Absent fields give no entry. The IP address and the Tor exit flag are
    /// sensitive and hidden without privilege. `vpn` is never displayed.
    pub fn menu_lines(&self) -> Vec<MenuLine> {
        let mut lines = Vec::with_capacity(4);
        if let Some(ip) = &self.ip_address {
            lines.push(MenuLine::new(format!("IP: {ip}"), true));
        }
        if let Some(isp) = &self.isp {
            lines.push(MenuLine::new(format!("ISP: {isp}"), false));
        }
        if let Some(location) = &self.location {
            lines.push(MenuLine::new(format!("Location: {location}"), false));
        }
        if let Some(tor_exit) = self.tor_exit {
            let answer = if tor_exit { "Yes" } else { "No" };
            lines.push(MenuLine::new(format!("Tor Exit: {answer}"), true));
        }
        lines
    }
}

#[cfg(test)]
mod menu_lines_should {
    use super::*;

    fn line(title: &str, hidden_without_privilege: bool) -> MenuLine {
        MenuLine::new(title.to_owned(), hidden_without_privilege)
    }

    fn info(tor_exit: Option<bool>, vpn: Option<bool>) -> InternetInfo {
        InternetInfo {
            ip_address: Some("1.2.3.4".to_owned()),
            isp: Some("Example ISP".to_owned()),
            location: Some("Portland, United States".to_owned()),
            vpn,
            tor_exit,
        }
    }

    #[test]
    fn only_hide_ip_when_no_tor_value() {
        assert_eq!(
            info(None, Some(true)).menu_lines(),
            [
                line("IP: 1.2.3.4", true),
                line("ISP: Example ISP", false),
                line("Location: Portland, United States", false),
            ]
        );
    }

    #[test]
    fn hide_ip_and_tor_exit() {
        assert_eq!(
            info(Some(true), None).menu_lines(),
            [
                line("IP: 1.2.3.4", true),
                line("ISP: Example ISP", false),
                line("Location: Portland, United States", false),
                line("Tor Exit: Yes", true),
            ]
        );
    }

    #[test]
    fn render_false_tor_exit() {
        let info = InternetInfo {
            tor_exit: Some(false),
            ..Default::default()
        };
        assert_eq!(info.menu_lines(), [line("Tor Exit: No", true)]);
    }

    #[test]
    fn ignore_vpn_flag() {
        for vpn in [None, Some(false), Some(true)] {
            assert_eq!(info(Some(false), vpn).menu_lines(), info(Some(false), None).menu_lines());
        }
        let only_vpn = InternetInfo {
            vpn: Some(true),
            ..Default::default()
        };
        assert!(only_vpn.menu_lines().is_empty());
    }

    #[test]
    fn keep_order_with_missing_fields() {
        let info = InternetInfo {
            ip_address: Some("1.2.3.4".to_owned()),
            location: Some("France".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            info.menu_lines(),
            [line("IP: 1.2.3.4", true), line("Location: France", false)]
        );
    }

    #[test]
    fn show_hidden_lines_only_when_revealed() {
        let lines = info(Some(true), None).menu_lines();
        let visible = |reveal: bool| -> Vec<String> {
            lines
                .iter()
                .filter(|l| l.is_visible(reveal))
                .map(|l| l.title.clone())
                .collect()
        };
        assert_eq!(
            visible(false),
            ["ISP: Example ISP", "Location: Portland, United States"]
        );
        assert_eq!(visible(true).len(), 4);
    }
}
