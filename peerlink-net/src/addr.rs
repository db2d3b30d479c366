//! Address this host should advertise to its peer.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};

/// Local IP the OS would use to reach `peer_host`, else the default-route address,
/// else loopback. No packet is sent: connecting a UDP socket only selects a route.
/// May block on DNS when `peer_host` is a name.
pub fn local_ip(peer_host: Option<&str>) -> IpAddr {
    peer_host
        .and_then(|host| route_source((host, 9)))
        .or_else(|| route_source((Ipv4Addr::new(8, 8, 8, 8), 80)))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn route_source(target: impl ToSocketAddrs) -> Option<IpAddr> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    sock.connect(target).ok()?;
    let ip = sock.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_peer_routes_via_loopback() {
        assert_eq!(local_ip(Some("127.0.0.1")), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn unresolvable_peer_falls_back() {
        // Either the default-route address or loopback; never unspecified.
        let ip = local_ip(Some("no-such-host.invalid"));
        assert!(!ip.is_unspecified());
    }
}
