//! The `Release` record served by the randomizer, plus the blocked-region
//! predicates consulted during random pick.

use std::collections::HashSet;

use bytes::Bytes;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseBlockedInfo {
    #[serde(default, rename = "is_blocked_in_geo")]
    pub blocked_in_geo: HashSet<String>,
    #[serde(default, rename = "is_blocked_by_copyrights")]
    pub blocked_by_copyrights: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMeta {
    pub id: u64,
    pub code: String,
    #[serde(default, rename = "blockedInfo")]
    pub blocked_info: Option<ReleaseBlockedInfo>,
}

/// A release together with the raw JSON bytes it was decoded from, so the
/// `release` query can echo the upstream shape verbatim.
#[derive(Debug, Clone)]
pub struct Release {
    pub meta: ReleaseMeta,
    pub raw: Bytes,
}

impl Release {
    /// Blocked for every region, e.g. a global copyright takedown.
    #[must_use]
    pub fn is_worldwide_blocked(&self) -> bool {
        self.meta
            .blocked_info
            .as_ref()
            .is_some_and(|b| b.blocked_by_copyrights)
    }

    #[must_use]
    pub fn is_blocked_in(&self, region: &str) -> bool {
        self.meta
            .blocked_info
            .as_ref()
            .is_some_and(|b| b.blocked_in_geo.contains(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(id: u64, code: &str, blocked_info: Option<ReleaseBlockedInfo>) -> Release {
        Release {
            meta: ReleaseMeta {
                id,
                code: code.to_string(),
                blocked_info,
            },
            raw: Bytes::new(),
        }
    }

    #[test]
    fn worldwide_block_is_detected() {
        let r = release(
            1,
            "foo",
            Some(ReleaseBlockedInfo {
                blocked_in_geo: HashSet::new(),
                blocked_by_copyrights: true,
                reason: "takedown".to_string(),
            }),
        );
        assert!(r.is_worldwide_blocked());
    }

    #[test]
    fn regional_block_only_applies_to_that_region() {
        let r = release(
            1,
            "foo",
            Some(ReleaseBlockedInfo {
                blocked_in_geo: HashSet::from(["RU".to_string()]),
                blocked_by_copyrights: false,
                reason: String::new(),
            }),
        );
        assert!(r.is_blocked_in("RU"));
        assert!(!r.is_blocked_in("US"));
        assert!(!r.is_worldwide_blocked());
    }

    #[test]
    fn unblocked_release_passes_all_checks() {
        let r = release(1, "foo", None);
        assert!(!r.is_worldwide_blocked());
        assert!(!r.is_blocked_in("RU"));
    }
}
