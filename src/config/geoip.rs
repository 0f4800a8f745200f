use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GeoIpConfig {
    #[serde(default)]
    pub enable: bool,
    /// Path to a MaxMind GeoLite2-Country database. Downloading and
    /// refreshing this file is outside the scope of this crate.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}
