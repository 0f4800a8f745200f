use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Secret;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RandomizerConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_kv_host")]
    pub kv_host: Secret<String>,
    #[serde(default)]
    pub kv_password: Secret<String>,
    #[serde(default)]
    pub kv_db: i64,
    /// Whether chunk payloads are zstd-compressed.
    #[serde(default)]
    pub zstd_enable: bool,
    #[serde(default = "default_releases_key")]
    pub releases_key: String,
    #[serde(with = "humantime_serde", default = "default_update_frequency")]
    pub update_frequency: Duration,
    #[serde(with = "humantime_serde", default = "default_retry_frequency")]
    pub retry_frequency: Duration,
    #[serde(with = "humantime_serde", default = "default_bootstrap_delay")]
    pub bootstrap_delay: Duration,
    /// Rejection-sampling budget for `random_release`.
    #[serde(default = "default_fetch_tries")]
    pub fetch_tries: u32,
}

impl Default for RandomizerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            kv_host: default_kv_host(),
            kv_password: Secret::from(String::new()),
            kv_db: 0,
            zstd_enable: false,
            releases_key: default_releases_key(),
            update_frequency: default_update_frequency(),
            retry_frequency: default_retry_frequency(),
            bootstrap_delay: default_bootstrap_delay(),
            fetch_tries: default_fetch_tries(),
        }
    }
}

fn default_kv_host() -> Secret<String> {
    Secret::from("redis://localhost:6379".to_string())
}

fn default_releases_key() -> String {
    "releases".to_string()
}

fn default_update_frequency() -> Duration {
    Duration::from_secs(300)
}

fn default_retry_frequency() -> Duration {
    Duration::from_secs(15)
}

fn default_bootstrap_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_tries() -> u32 {
    10
}
