//! Advertised address validation.

use std::net::{IpAddr, SocketAddr};

use crate::core::{TransportError, TransportResult};

/// Check that `advertise` is usable by remote peers of a listener bound to
/// `bound`.
///
/// The address must name a concrete host and port. Its family has to match
/// the bound address unless the listener sits on the IPv6 wildcard, which
/// accepts both families.
pub fn validate_advertise(advertise: SocketAddr, bound: SocketAddr) -> TransportResult<SocketAddr> {
    if advertise.ip().is_unspecified() || advertise.port() == 0 {
        return Err(TransportError::NotAdvertisable(advertise));
    }

    let dual_stack = matches!(bound.ip(), IpAddr::V6(ip) if ip.is_unspecified());
    if !dual_stack && advertise.is_ipv4() != bound.is_ipv4() {
        return Err(TransportError::InvalidAddressFamily { advertise, bound });
    }

    Ok(advertise)
}
