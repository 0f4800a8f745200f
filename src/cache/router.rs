//! Routes a request's cache operations to one of (up to) two independent
//! [`CacheZone`]s, selected by the client's ISO-2 country code.

use bytes::Bytes;

use super::{
    sidecar::HeaderSidecar,
    zone::{CacheZone, CacheZoneConfig, ZoneStatsSnapshot},
};
use crate::config::cache::CacheConfig;

const HEADERS_SUFFIX: &[u8] = b"\0headers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum ZoneName {
    Default,
    Quarantine,
}

/// Selects a zone by ISO-2 country code.
pub struct ZoneSelector {
    quarantine_countries: Vec<String>,
}

impl ZoneSelector {
    #[must_use]
    pub fn new(quarantine_countries: Vec<String>) -> Self {
        Self {
            quarantine_countries: quarantine_countries
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn select(&self, iso: Option<&str>) -> ZoneName {
        match iso {
            Some(iso) if self.quarantine_countries.iter().any(|c| c == iso) => {
                ZoneName::Quarantine
            }
            _ => ZoneName::Default,
        }
    }

    #[must_use]
    pub fn has_quarantine(&self) -> bool {
        !self.quarantine_countries.is_empty()
    }
}

pub struct CacheRouter {
    selector: ZoneSelector,
    default_zone: CacheZone,
    quarantine_zone: Option<CacheZone>,
}

impl CacheRouter {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let zone_config = CacheZoneConfig {
            shards: config.shards,
            life_window: config.life_window,
            clean_window: config.clean_window,
            hard_max_bytes: config.max_size_mb * 1024 * 1024,
            max_entry_size: config.max_entry_size,
        };
        let selector = ZoneSelector::new(config.quarantine_countries.clone());
        let quarantine_zone = selector
            .has_quarantine()
            .then(|| CacheZone::new(zone_config));
        Self {
            selector,
            default_zone: CacheZone::new(zone_config),
            quarantine_zone,
        }
    }

    fn zone(&self, iso: Option<&str>) -> &CacheZone {
        match self.selector.select(iso) {
            ZoneName::Quarantine => {
                self.quarantine_zone.as_ref().unwrap_or(&self.default_zone)
            }
            ZoneName::Default => &self.default_zone,
        }
    }

    /// Resolves the zone a country code would route to, used by the admin
    /// API to turn a `country` query parameter into a [`ZoneName`].
    #[must_use]
    pub fn zone_name_for(&self, iso: Option<&str>) -> ZoneName {
        self.selector.select(iso)
    }

    /// Looks up the zone by name directly, used by the admin API.
    #[must_use]
    pub fn zone_by_name(&self, name: ZoneName) -> &CacheZone {
        match name {
            ZoneName::Quarantine => {
                self.quarantine_zone.as_ref().unwrap_or(&self.default_zone)
            }
            ZoneName::Default => &self.default_zone,
        }
    }

    #[must_use]
    pub fn zone_names(&self) -> Vec<ZoneName> {
        if self.quarantine_zone.is_some() {
            vec![ZoneName::Default, ZoneName::Quarantine]
        } else {
            vec![ZoneName::Default]
        }
    }

    #[must_use]
    pub fn is_cached(&self, iso: Option<&str>, key: &Bytes) -> bool {
        self.zone(iso).contains(key)
    }

    pub fn read(&self, iso: Option<&str>, key: &Bytes) -> Option<(Bytes, HeaderSidecar)> {
        let zone = self.zone(iso);
        let body = zone.get(key).ok()?;
        let sidecar = zone
            .get_uncounted(&headers_key(key))
            .ok()
            .and_then(|bytes| HeaderSidecar::decode(&bytes).ok())
            .unwrap_or_default();
        Some((body, sidecar))
    }

    pub fn store(&self, iso: Option<&str>, key: &Bytes, body: &[u8], headers: &HeaderSidecar) {
        let zone = self.zone(iso);
        zone.set(key, body);
        zone.set(&headers_key(key), &headers.encode());
    }

    /// Deletes a body and its header sidecar. Returns whether the body
    /// entry was present.
    pub fn purge(&self, zone: ZoneName, key: &Bytes) -> bool {
        let zone = self.zone_by_name(zone);
        let deleted = zone.delete(key);
        zone.delete(&headers_key(key));
        deleted
    }

    pub fn reset(&self, zone: ZoneName) {
        self.zone_by_name(zone).reset();
    }

    #[must_use]
    pub fn stats(&self, zone: ZoneName) -> ZoneStatsSnapshot {
        self.zone_by_name(zone).stats()
    }
}

fn headers_key(key: &Bytes) -> Bytes {
    let mut out = Vec::with_capacity(key.len() + HEADERS_SUFFIX.len());
    out.extend_from_slice(key);
    out.extend_from_slice(HEADERS_SUFFIX);
    Bytes::from(out)
}
