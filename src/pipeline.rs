//! Per-request orchestration: validate, maybe hijack (randomizer), look up
//! the cache, or forward to the origin and cache the response.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{HeaderValue, StatusCode};

use crate::{
    apiv1::ApiResponse,
    app_state::AppState,
    cache::HeaderSidecar,
    error::{GatewayError, ValidationError},
    fingerprint::ParsedBody,
    upstream::Classification,
    validator::Validator,
};

const CACHE_STATUS_HEADER: &str = "x-alice-cache";

pub async fn handle(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    match run(state, connect_info, request).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn run(
    state: AppState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Result<Response, GatewayError> {
    if request.method() != http::Method::POST {
        return Err(ValidationError::MethodNotAllowed.into());
    }

    let (parts, body) = request.into_parts();
    let is_multipart = Validator::validate_content_type(&parts.headers)?;

    let raw_body;
    let parsed = if is_multipart {
        let boundary = Validator::multipart_boundary(&parts.headers)?;
        raw_body = Bytes::new();
        Validator::parse_multipart(body, &boundary).await?
    } else {
        let bytes: Bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|_| ValidationError::MalformedBody)?;
        raw_body = bytes.clone();
        ParsedBody::from_urlencoded(&bytes)
    };

    let validated = Validator::finalize(parsed.clone(), &parts.headers)?;

    let iso = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .and_then(|ip| state.geoip().lookup(ip));
    let iso = iso.as_deref();

    if let Some(query) = validated.query.as_deref() {
        if query == "random_release"
            && let Ok(code) = state.randomizer().randomize(None).await
        {
            return Ok(envelope_response(
                ApiResponse::ok(serde_json::json!({ "code": code })),
                "HIT",
            ));
        }
        if query == "release" {
            let identifier = parsed.get("code").or_else(|| parsed.get("id"));
            if let Some(identifier) = identifier
                && let Some(raw) = state.randomizer().raw_release(identifier).await
            {
                return Ok(raw_json_response(raw, "HIT"));
            }
        }
    }

    if !validated.is_bypass()
        && let Some((body, sidecar)) = state.cache().read(iso, &validated.key)
    {
        return Ok(build_response(StatusCode::OK, &body, &sidecar, "HIT"));
    }

    let upstream = state
        .upstream()
        .forward(
            parts.method.clone(),
            parts
                .uri
                .path_and_query()
                .map_or(parts.uri.path(), |p| p.as_str()),
            &parts.headers,
            raw_body,
        )
        .await?;

    match crate::upstream::UpstreamGate::classify(&upstream) {
        Classification::Fail => Err(crate::error::UpstreamError::BadStatus(upstream.status).into()),
        Classification::Bypass => {
            let sidecar = HeaderSidecar::capture(&upstream.headers);
            Ok(build_response(upstream.status, &upstream.body, &sidecar, "BYPASS"))
        }
        Classification::Cacheable => {
            let sidecar = HeaderSidecar::capture(&upstream.headers);
            if !validated.is_bypass() {
                state
                    .cache()
                    .store(iso, &validated.key, &upstream.body, &sidecar);
            }
            Ok(build_response(upstream.status, &upstream.body, &sidecar, "MISS"))
        }
    }
}

fn build_response(
    status: StatusCode,
    body: &[u8],
    sidecar: &HeaderSidecar,
    cache_status: &'static str,
) -> Response {
    let mut response = Response::builder().status(status);
    if let Some(headers) = response.headers_mut() {
        sidecar.apply(headers);
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    }
    response
        .body(Body::from(Bytes::copy_from_slice(body)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn envelope_response<T: serde::Serialize>(
    body: ApiResponse<T>,
    cache_status: &'static str,
) -> Response {
    let mut response = axum::Json(body).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    response
}

fn raw_json_response(raw: Bytes, cache_status: &'static str) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(raw))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status));
    response
}
