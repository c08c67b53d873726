//! Administrative listener port selection

use crate::{CoreError, Result};
use egress_api::{ExternalServicePort, Protocol};
use std::collections::HashSet;
use std::ops::Range;

/// Ports the proxy's admin listener may be placed on
pub const ADMIN_PORT_RANGE: Range<u16> = 11000..32768;

/// Pick the lowest port in [`ADMIN_PORT_RANGE`] not taken by a TCP entry.
///
/// UDP entries never collide with the admin listener, so they don't exclude
/// a port. The result only changes when the declared TCP ports change.
pub fn admin_port(ports: &[ExternalServicePort]) -> Result<u16> {
    let taken: HashSet<u16> = ports
        .iter()
        .filter(|p| p.protocol == Protocol::Tcp)
        .map(|p| p.port)
        .collect();

    ADMIN_PORT_RANGE
        .into_iter()
        .find(|port| !taken.contains(port))
        .ok_or(CoreError::AdminPortExhausted {
            start: ADMIN_PORT_RANGE.start,
            end: ADMIN_PORT_RANGE.end,
        })
}
