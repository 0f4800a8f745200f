//! Caching reverse proxy for the legacy `apiv1` form-encoded API: request
//! fingerprinting, geo-partitioned caching, an upstream forward/validate
//! state machine, and the `Randomizer` random-release subsystem.

pub mod admin;
pub mod apiv1;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod geoip;
pub mod pipeline;
pub mod randomizer;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod types;
pub mod upstream;
pub mod validator;
