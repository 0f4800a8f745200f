use std::sync::Arc;

use crate::{
    cache::CacheRouter, config::Config, geoip::GeoIpLookup, randomizer::Randomizer,
    upstream::UpstreamGate,
};

/// Shared application state, built once in `main` and cheaply cloned into
/// every request task.
#[derive(Clone)]
pub struct AppState(pub Arc<InnerAppState>);

pub struct InnerAppState {
    pub config: Config,
    pub cache: CacheRouter,
    pub upstream: UpstreamGate,
    pub randomizer: Arc<Randomizer>,
    pub geoip: Arc<dyn GeoIpLookup>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    #[must_use]
    pub fn cache(&self) -> &CacheRouter {
        &self.0.cache
    }

    #[must_use]
    pub fn upstream(&self) -> &UpstreamGate {
        &self.0.upstream
    }

    #[must_use]
    pub fn randomizer(&self) -> &Randomizer {
        &self.0.randomizer
    }

    #[must_use]
    pub fn geoip(&self) -> &dyn GeoIpLookup {
        self.0.geoip.as_ref()
    }
}
