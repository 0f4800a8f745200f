//! Admin surface: per-zone cache introspection and maintenance, gated by a
//! shared-secret header rather than a real auth scheme.
//!
//! Grounded on `internal/cache/api.go` and the admin handlers in
//! `internal/proxy/handlers.go` from the original service; the original
//! renders its tables with `go-pretty/table`, which this stack has no
//! equivalent for, so the tables below are rendered by hand (see
//! `DESIGN.md`).

use std::time::Instant;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::{
    app_state::AppState,
    cache::{CacheEntryRecord, ZoneName},
    error::{AdminError, GatewayError},
};

const SECRET_HEADER: &str = "x-api-secret";

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    country: Option<String>,
    key: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    let Some(provided) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) else {
        return Err(AdminError::MissingSecret);
    };
    if provided != state.config().cache.api_secret.expose() {
        return Err(AdminError::InvalidSecret);
    }
    Ok(())
}

fn zone_for(state: &AppState, country: Option<&str>) -> ZoneName {
    let upper = country.map(str::to_ascii_uppercase);
    state.cache().zone_name_for(upper.as_deref())
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    let mut rows = Vec::new();
    for zone in state.cache().zone_names() {
        let stats = state.cache().stats(zone);
        let zone_cache = state.cache().zone_by_name(zone);
        rows.push(vec![
            zone.as_ref().to_string(),
            zone_cache.entry_count().to_string(),
            format!("{:.2}", mb(zone_cache.allocated_bytes())),
            stats.hits.to_string(),
            stats.misses.to_string(),
            stats.del_hits.to_string(),
            stats.del_misses.to_string(),
            stats.collisions.to_string(),
        ]);
    }
    let table = render_table(
        &[
            "zone",
            "entries",
            "capacity (mb)",
            "hits",
            "misses",
            "delhits",
            "delmisses",
            "collisions",
        ],
        rows,
    );
    Ok(plain_text(StatusCode::OK, table))
}

pub async fn stats_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    let zone = zone_for(&state, query.country.as_deref());
    state.cache().zone_by_name(zone).reset_stats();
    Ok(StatusCode::ACCEPTED.into_response())
}

pub async fn dump(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    let key = query.key.ok_or(AdminError::MissingKey)?;
    let zone = zone_for(&state, query.country.as_deref());
    let body = state
        .cache()
        .zone_by_name(zone)
        .get(&Bytes::from(key.into_bytes()))
        .map_err(|_| AdminError::KeyNotFound)?;
    Ok((StatusCode::OK, body.to_vec()).into_response())
}

pub async fn dump_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    let mut records: Vec<(ZoneName, CacheEntryRecord)> = Vec::new();
    for zone in state.cache().zone_names() {
        for record in state.cache().zone_by_name(zone).iterate() {
            records.push((zone, record));
        }
    }
    records.sort_by_key(|(_, record)| record.timestamp);
    let now = Instant::now();
    let rows = records
        .into_iter()
        .map(|(zone, record)| {
            vec![
                format!("{}s ago", now.saturating_duration_since(record.timestamp).as_secs()),
                zone.as_ref().to_string(),
                record.hash.to_string(),
                String::from_utf8_lossy(&record.key).into_owned(),
            ]
        })
        .collect();
    let table = render_table(&["age", "zone", "hash", "key"], rows);
    Ok(plain_text(StatusCode::OK, table))
}

pub async fn purge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    let key = query.key.ok_or(AdminError::MissingKey)?;
    let zone = zone_for(&state, query.country.as_deref());
    state.cache().purge(zone, &Bytes::from(key.into_bytes()));
    Ok(StatusCode::ACCEPTED.into_response())
}

pub async fn purge_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    authorize(&state, &headers)?;
    for zone in state.cache().zone_names() {
        state.cache().reset(zone);
    }
    Ok(StatusCode::ACCEPTED.into_response())
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (
        status,
        [(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Renders a fixed-width plain-text table, one row per line, columns padded
/// to the widest cell.
fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let mut out = String::new();
    push_row(&mut out, headers.iter().map(ToString::to_string).collect::<Vec<_>>().as_slice(), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    for (cell, width) in cells.iter().zip(widths) {
        out.push_str(&format!("{cell:<width$}  "));
    }
    out.push('\n');
}

impl AdminQuery {
    #[cfg(test)]
    fn new(country: Option<&str>, key: Option<&str>) -> Self {
        Self {
            country: country.map(str::to_string),
            key: key.map(str::to_string),
        }
    }
}
