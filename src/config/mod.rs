pub mod cache;
pub mod geoip;
pub mod proxy;
pub mod randomizer;
pub mod server;
pub mod telemetry;

use std::path::PathBuf;

use json_patch::merge;
use serde::{Deserialize, Serialize};

use crate::error::InitError;

const DEFAULT_CONFIG_PATH: &str = "/etc/alice-gateway/config.yaml";

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub server: self::server::ServerConfig,
    pub telemetry: self::telemetry::TelemetryConfig,
    pub cache: self::cache::CacheConfig,
    pub proxy: self::proxy::ProxyConfig,
    pub randomizer: self::randomizer::RandomizerConfig,
    pub geoip: self::geoip::GeoIpConfig,
}

impl Config {
    pub fn try_read(config_file_path: Option<PathBuf>) -> Result<Self, Box<InitError>> {
        let default_config = serde_json::to_value(Self::default())
            .expect("default config is serializable");
        let mut builder = config::Config::builder();
        if let Some(path) = config_file_path {
            builder = builder.add_source(config::File::from(path));
        } else if std::fs::exists(DEFAULT_CONFIG_PATH).unwrap_or_default() {
            builder = builder.add_source(config::File::from(PathBuf::from(
                DEFAULT_CONFIG_PATH,
            )));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ALICE_GATEWAY")
                .try_parsing(true)
                .separator("__")
                .convert_case(config::Case::Kebab),
        );

        let input_config: serde_json::Value = builder
            .build()
            .map_err(InitError::from)
            .map_err(Box::new)?
            .try_deserialize()
            .map_err(InitError::from)
            .map_err(Box::new)?;

        let mut merged_config = default_config;
        merge(&mut merged_config, &input_config);

        let config: Self = serde_path_to_error::deserialize(merged_config)
            .map_err(InitError::from)
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InitError> {
        self.cache.validate()
    }
}
