// ── Local interface discovery ──
//
// The scanner must never probe this machine, and when no subnet is
// configured it sweeps the first private /24 it finds on an active,
// non-loopback interface.

use std::collections::HashSet;
use std::net::IpAddr;

use pnet::datalink::{self, NetworkInterface};

use crate::error::CoreError;
use crate::scan::SubnetPrefix;

/// Every address bound to any local interface, loopback included.
pub fn local_addresses() -> HashSet<IpAddr> {
    datalink::interfaces()
        .into_iter()
        .flat_map(|iface| iface.ips.into_iter().map(|net| net.ip()))
        .collect()
}

/// The /24 of the first up, non-loopback interface with a private IPv4.
pub fn local_subnet() -> Result<SubnetPrefix, CoreError> {
    let interfaces = datalink::interfaces();
    if interfaces.is_empty() {
        return Err(CoreError::Interfaces {
            message: "no network interfaces reported".into(),
        });
    }
    first_private_subnet(&interfaces).ok_or(CoreError::NoLocalSubnet)
}

fn first_private_subnet(interfaces: &[NetworkInterface]) -> Option<SubnetPrefix> {
    interfaces
        .iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .flat_map(|iface| iface.ips.iter())
        .find_map(|net| match net.ip() {
            IpAddr::V4(v4) if v4.is_private() => Some(SubnetPrefix::of(v4)),
            _ => None,
        })
}
