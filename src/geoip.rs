//! IP-to-country lookup. The actual MaxMind database handling lives outside
//! this crate; the pipeline only depends on this trait.

use std::net::IpAddr;

/// External collaborator that resolves a client IP to an ISO-2 country
/// code. A lookup failure or a disabled lookup must never fail the request;
/// callers fall back to the default cache zone.
pub trait GeoIpLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<String>;
}

/// Used when `geoip.enable = false`, and as the default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeoIp;

impl GeoIpLookup for NullGeoIp {
    fn lookup(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}
