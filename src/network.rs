//! Local network identity probing.

use std::net::{IpAddr, UdpSocket};

use tracing::warn;

/// Address used only to pick the outbound route; nothing is sent to it.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Network identity reported on the computer record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub ip: Option<String>,
    pub mac: Option<String>,
}

impl HostIdentity {
    pub fn probe() -> Self {
        Self {
            ip: local_ip().map(|ip| ip.to_string()),
            mac: mac_address(),
        }
    }
}

/// Local address of the interface that routes to the public internet.
pub fn local_ip() -> Option<IpAddr> {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(ROUTE_PROBE_ADDR)?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) => Some(ip),
        Err(err) => {
            warn!(error = %err, "could not determine local ip");
            None
        }
    }
}

/// Hardware address of the first non-loopback interface, upper-case and
/// colon separated.
#[cfg(target_os = "linux")]
pub fn mac_address() -> Option<String> {
    let entries = match std::fs::read_dir("/sys/class/net") {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "could not list network interfaces");
            return None;
        }
    };

    let mut interfaces: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.file_name().is_some_and(|name| name != "lo"))
        .collect();
    interfaces.sort();

    interfaces.into_iter().find_map(|path| {
        let raw = std::fs::read_to_string(path.join("address")).ok()?;
        normalize_mac(&raw)
    })
}

#[cfg(not(target_os = "linux"))]
pub fn mac_address() -> Option<String> {
    None
}

fn normalize_mac(raw: &str) -> Option<String> {
    let mac = raw.trim().to_ascii_uppercase();
    let octets: Vec<&str> = mac.split(':').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed || octets.iter().all(|octet| *octet == "00") {
        return None;
    }
    // Multicast bit set: not a hardware address.
    let first = u8::from_str_radix(octets[0], 16).ok()?;
    if first & 0x01 != 0 {
        return None;
    }
    Some(mac)
}
