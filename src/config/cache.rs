use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::InitError, types::Secret};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Static secret compared against the `x-api-secret` header on admin
    /// endpoints.
    #[serde(default = "default_api_secret")]
    pub api_secret: Secret<String>,
    /// Number of shards per cache zone. Must be a power of two.
    #[serde(default = "default_shards")]
    pub shards: u32,
    /// Time after which an entry can be evicted.
    #[serde(with = "humantime_serde", default = "default_life_window")]
    pub life_window: Duration,
    /// Interval between sweeps that remove expired entries. `<= 0` disables
    /// the sweep.
    #[serde(with = "humantime_serde", default = "default_clean_window")]
    pub clean_window: Duration,
    /// Cache will not allocate more memory than this limit, in megabytes.
    /// `0` means no limit. If `quarantine_countries` is non-empty, a second
    /// pool of the same size is created, so total memory use can reach
    /// `2 * max_size_mb`.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// Max size of an entry in bytes. Used only to size the initial shards.
    #[serde(default = "default_max_entry_size")]
    pub max_entry_size: usize,
    /// ISO-2 country codes routed to a second, independent cache zone.
    /// Example: `RU,UA,BY,KZ`.
    #[serde(default)]
    pub quarantine_countries: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            api_secret: default_api_secret(),
            shards: default_shards(),
            life_window: default_life_window(),
            clean_window: default_clean_window(),
            max_size_mb: default_max_size_mb(),
            max_entry_size: default_max_entry_size(),
            quarantine_countries: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), InitError> {
        if !self.shards.is_power_of_two() {
            return Err(InitError::InvalidShardCount(self.shards));
        }
        for code in &self.quarantine_countries {
            if isocountry::CountryCode::for_alpha2(code).is_err() {
                return Err(InitError::InvalidCountryCode(code.clone()));
            }
        }
        Ok(())
    }
}

fn default_api_secret() -> Secret<String> {
    Secret::from("secret".to_string())
}

fn default_shards() -> u32 {
    512
}

fn default_life_window() -> Duration {
    Duration::from_secs(600)
}

fn default_clean_window() -> Duration {
    Duration::from_secs(60)
}

fn default_max_size_mb() -> u64 {
    1024
}

fn default_max_entry_size() -> usize {
    64 * 1024
}
