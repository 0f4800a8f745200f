use std::{path::PathBuf, sync::Arc};

use alice_gateway::{
    app_state::{AppState, InnerAppState},
    config::Config,
    error::InitError,
    geoip::{GeoIpLookup, NullGeoIp},
    randomizer::store::RedisReleaseStore,
    server::GatewayServer,
    shutdown::{ShutdownSignal, TaggedService},
};
use clap::Parser;
use meltdown::Meltdown;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Path to the config file. Values here can be overridden by environment
    /// variables prefixed `ALICE_GATEWAY__`.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (trace-level) logging for this crate.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match Config::try_read(args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to read config: {error}");
            std::process::exit(1);
        }
    };

    if args.verbose {
        config.telemetry.level = "info,alice_gateway=trace".to_string();
    }

    alice_gateway::telemetry::init(&config.telemetry).map_err(InitError::Telemetry)?;

    debug!("telemetry initialized");
    config.validate().inspect_err(|error| {
        tracing::error!(error = %error, "configuration validation failed");
    })?;

    let app_state = build_app_state(config).await?;

    if app_state.config().randomizer.enable {
        app_state.0.randomizer.clone().spawn_refresh_loop();
    }

    let mut shutting_down = false;
    let mut meltdown = Meltdown::new()
        .register(TaggedService::new("shutdown-signals", ShutdownSignal))
        .register(TaggedService::new(
            "gateway",
            GatewayServer::new(app_state.clone()),
        ));

    info!("starting services");

    while let Some((service, result)) = meltdown.next().await {
        match result {
            Ok(()) => info!(%service, "service stopped"),
            Err(error) => tracing::error!(%service, %error, "service crashed"),
        }
        if !shutting_down {
            info!("propagating shutdown signal...");
            meltdown.trigger();
            shutting_down = true;
        }
    }

    app_state.randomizer().stop();
    println!("shut down");
    Ok(())
}

async fn build_app_state(config: Config) -> Result<AppState, InitError> {
    let cache = alice_gateway::cache::CacheRouter::new(&config.cache);
    let upstream = alice_gateway::upstream::UpstreamGate::new(config.proxy.clone())?;

    let store: Arc<dyn alice_gateway::randomizer::ReleaseStore> = if config.randomizer.enable {
        Arc::new(RedisReleaseStore::new(&config.randomizer)?)
    } else {
        Arc::new(DisabledReleaseStore)
    };
    let randomizer = Arc::new(alice_gateway::randomizer::Randomizer::new(
        store,
        config.randomizer.clone(),
    ));

    let geoip: Arc<dyn GeoIpLookup> = if config.geoip.enable {
        tracing::warn!(
            "geoip.enable=true but no MaxMind reader is wired in this build; falling back to no-op lookups"
        );
        Arc::new(NullGeoIp)
    } else {
        Arc::new(NullGeoIp)
    };

    Ok(AppState(Arc::new(InnerAppState {
        config,
        cache,
        upstream,
        randomizer,
        geoip,
    })))
}

/// Used when the randomizer is disabled so the subsystem still has a
/// well-typed store to hold, rather than making it `Option`-shaped.
struct DisabledReleaseStore;

#[async_trait::async_trait]
impl alice_gateway::randomizer::ReleaseStore for DisabledReleaseStore {
    async fn get(&self, _key: &str) -> Result<Option<bytes::Bytes>, alice_gateway::randomizer::StoreError> {
        Ok(None)
    }
}
