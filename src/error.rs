//! Error taxonomy for the gateway, one enum per subsystem composed into a
//! top-level [`GatewayError`] that knows how to render itself as an apiv1
//! envelope response.

use axum::response::{IntoResponse, Response};
use displaydoc::Display;
use http::StatusCode;
use thiserror::Error;

use crate::apiv1::ApiResponse;

/// Errors that can occur while reading and validating configuration.
#[derive(Debug, Error, Display)]
pub enum InitError {
    /// error collecting config sources: {0}
    Source(#[from] config::ConfigError),
    /// deserialization error for input config: {0}
    InputConfigDeserialization(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// deserialization error for merged config: {0}
    MergedConfigDeserialization(
        #[from] serde_path_to_error::Error<serde_json::Error>,
    ),
    /// cache shard count must be a power of two, got {0}
    InvalidShardCount(u32),
    /// malformed quarantine country code: {0}
    InvalidCountryCode(String),
    /// failed to bind listener on {0}: {1}
    Bind(std::net::SocketAddr, #[source] std::io::Error),
    /// failed to connect to the release store: {0}
    ReleaseStore(#[source] redis::RedisError),
    /// failed to build the upstream HTTP client: {0}
    UpstreamClient(#[source] reqwest::Error),
    /// failed to initialize telemetry: {0}
    Telemetry(#[source] anyhow::Error),
    /// failed to install signal handler: {0}
    Signal(#[source] std::io::Error),
}

/// Errors surfaced while parsing and validating an inbound request.
#[derive(Debug, Error, Display, Clone, Copy, strum::AsRefStr)]
pub enum ValidationError {
    /// method not allowed
    MethodNotAllowed,
    /// unsupported or missing content-type
    InvalidContentType,
    /// request body carries no recognized parameters
    EmptyBody,
    /// request contains arguments outside the allowed set
    DeclinedArgs,
    /// the `query` parameter is not on the allowed list
    DeclinedQuery,
    /// failed to parse request body
    MalformedBody,
}

impl ValidationError {
    #[must_use]
    pub fn status(self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method not allowed",
            Self::InvalidContentType => "unsupported content type",
            Self::EmptyBody => "empty request body",
            Self::DeclinedArgs => "invalid api arguments detected",
            Self::DeclinedQuery => "invalid query value detected",
            Self::MalformedBody => "malformed request body",
        }
    }
}

/// Errors surfaced while forwarding a request to the upstream origin.
#[derive(Debug, Error, Display)]
pub enum UpstreamError {
    /// failed to reach upstream: {0}
    Transport(#[source] reqwest::Error),
    /// upstream returned an unexpected status: {0}
    BadStatus(StatusCode),
    /// upstream response body was empty
    EmptyBody,
}

/// Errors surfaced by admin endpoints.
#[derive(Debug, Error, Display, Clone, Copy, strum::AsRefStr)]
pub enum AdminError {
    /// missing x-api-secret header
    MissingSecret,
    /// x-api-secret header did not match configured secret
    InvalidSecret,
    /// missing required `country` parameter
    MissingCountry,
    /// missing required `key` parameter
    MissingKey,
    /// no entry found for the given key
    KeyNotFound,
}

impl AdminError {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::MissingSecret | Self::InvalidSecret => StatusCode::UNAUTHORIZED,
            Self::MissingCountry | Self::MissingKey => StatusCode::BAD_REQUEST,
            Self::KeyNotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// Top level error type returned from the request pipeline.
#[derive(Debug, Error, Display)]
pub enum GatewayError {
    /// invalid request: {0}
    Validation(#[from] ValidationError),
    /// upstream error: {0}
    Upstream(#[from] UpstreamError),
    /// admin error: {0}
    Admin(#[from] AdminError),
    /// service panicked: {0}
    Panic(String),
    /// internal error: {0}
    Internal(#[source] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(error) => {
                let body: ApiResponse<()> =
                    ApiResponse::err(400, error.message());
                (error.status(), axum::Json(body)).into_response()
            }
            Self::Upstream(error) => {
                tracing::warn!(error = %error, "upstream request failed");
                let body: ApiResponse<()> =
                    ApiResponse::err(503, "upstream unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body))
                    .into_response()
            }
            Self::Admin(error) => {
                let body: ApiResponse<()> = ApiResponse::err(
                    i64::from(error.status().as_u16()),
                    error.as_ref(),
                );
                (error.status(), axum::Json(body)).into_response()
            }
            Self::Panic(message) => {
                tracing::error!(error = %message, "internal server error");
                let body: ApiResponse<()> =
                    ApiResponse::err(500, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body))
                    .into_response()
            }
            Self::Internal(error) => {
                tracing::error!(error = %error, "internal server error");
                let body: ApiResponse<()> =
                    ApiResponse::err(500, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body))
                    .into_response()
            }
        }
    }
}
