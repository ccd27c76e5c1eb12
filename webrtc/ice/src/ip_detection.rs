//! IP address detection utilities
//!
//! Provides the address advertised for host candidates bound to the
//! unspecified address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Detects the local IP address of the default route.
///
/// Connects an unbound UDP socket towards a public address and reads the
/// source address the kernel picked. No packet is sent.
///
/// # Returns
/// The outbound interface address, or `None` when no route exists or the
/// address is loopback or link-local.
pub fn detect_local_ip() -> Option<IpAddr> {
    let probe = |bind: SocketAddr, target: SocketAddr| -> Option<IpAddr> {
        let socket = UdpSocket::bind(bind).ok()?;
        socket.connect(target).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        is_valid_lan_ip(&ip).then_some(ip)
    };

    probe(
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::from(([8, 8, 8, 8], 80)),
    )
    .or_else(|| {
        probe(
            SocketAddr::from(([0u16; 8], 0)),
            SocketAddr::from(([0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888], 80)),
        )
    })
}

/// Checks if an IP address is usable on a LAN
fn is_valid_lan_ip(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }

    match ip {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}
