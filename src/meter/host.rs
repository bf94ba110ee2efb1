//! Outbound network address of this device, embedded in each reading for
//! remote troubleshooting.

use std::net::{Ipv4Addr, UdpSocket};

use tracing::debug;

/// Non-routable address used only to select the outbound interface
const ROUTE_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 254, 254, 254), 1);

/// Address reported when no interface is up
pub const FALLBACK_ADDRESS: &str = "127.0.0.1";

/// Local address of the interface that would carry outbound traffic
///
/// Connecting a UDP socket sends nothing; it only asks the kernel to pick a
/// route. Falls back to [`FALLBACK_ADDRESS`] if there is no route.
pub fn host_address() -> String {
    let address = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(ROUTE_PROBE_ADDR)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());

    match address {
        Ok(ip) if ip != Ipv4Addr::UNSPECIFIED.to_string() => ip,
        Ok(_) => FALLBACK_ADDRESS.to_string(),
        Err(e) => {
            debug!("No outbound route, reporting {}: {}", FALLBACK_ADDRESS, e);
            FALLBACK_ADDRESS.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_address_is_ipv4() {
        let address = host_address();
        assert!(address.parse::<Ipv4Addr>().is_ok(), "not an IPv4 address: {}", address);
    }
}
