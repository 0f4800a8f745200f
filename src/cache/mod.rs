pub mod router;
pub mod sidecar;
pub mod zone;

pub use router::{CacheRouter, ZoneName, ZoneSelector};
pub use sidecar::HeaderSidecar;
pub use zone::{CacheEntryRecord, CacheError, CacheZone, CacheZoneConfig, ZoneStatsSnapshot};
