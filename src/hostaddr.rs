//! Default `src` field derivation, grounded in
//! `original_source/src/pyimclsts/core.py`'s `get_initial_IP` +
//! `_base.py`'s `_default_src = 0x4000 | (get_initial_IP() & 0xFFFF)`.
//!
//! The Python implementation shells out to `ifaddr` to enumerate network
//! interfaces. Rather than adding an interface-enumeration crate, this
//! uses the standard "connect a UDP socket, read back the local address"
//! trick: `connect` on a UDP socket never sends a packet, it only asks
//! the kernel to pick a source address/route, so this works offline and
//! needs no extra dependency.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::OnceLock;

fn primary_ipv4() -> Ipv4Addr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .ok()
        .and_then(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

static DEFAULT_SRC: OnceLock<u16> = OnceLock::new();

/// The default `src` header field used when a message is packed for the
/// first time and no explicit source was given: `0x4000 |
/// (local_ipv4 & 0xFFFF)`.
pub fn default_src() -> u16 {
    *DEFAULT_SRC.get_or_init(|| {
        let octets = primary_ipv4().octets();
        let low16 = u16::from_be_bytes([octets[2], octets[3]]);
        0x4000 | low16
    })
}
