//! Local address lookup
//!
//! The provisioning flow announces the receiver's own IP to the camera
//! (status 23). The address is resolved by asking the OS which interface
//! would route an outbound datagram; nothing is actually sent.

use std::net::{IpAddr, UdpSocket};

/// The local IP an outbound connection would use, if any
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        return None;
    }
    Some(addr.ip())
}
