//! Header sidecar: a small JSON map of response headers stored alongside a
//! cached body so a cache hit can reproduce upstream headers byte-for-byte.
//!
//! Values are base64-encoded rather than stored as UTF-8 strings directly,
//! since header values are not guaranteed to be valid UTF-8.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Response headers that are never persisted to the sidecar: either they are
/// meaningless once served from cache (`Expires`, `Cache-Control`, ...), or
/// they carry session state that must never be replayed to a different
/// client (`Set-Cookie`).
pub const IGNORED_HEADERS: &[&str] = &[
    "x-accel-expires",
    "expires",
    "cache-control",
    "set-cookie",
    "vary",
    "x-accel-redirect",
    "x-accel-limit-rate",
    "x-accel-buffering",
    "x-accel-charset",
];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HeaderSidecar(Vec<(String, String)>);

impl HeaderSidecar {
    #[must_use]
    pub fn capture(headers: &HeaderMap) -> Self {
        let mut entries = Vec::new();
        for (name, value) in headers {
            if IGNORED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            entries.push((name.as_str().to_string(), STANDARD.encode(value.as_bytes())));
        }
        Self(entries)
    }

    pub fn encode(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).expect("sidecar is always serializable"))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Applies the captured headers onto `headers`, skipping any entries
    /// that fail to decode rather than failing the whole response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, encoded) in &self.0 {
            let (Ok(name), Ok(raw)) = (
                HeaderName::try_from(name.as_str()),
                STANDARD.decode(encoded),
            ) else {
                continue;
            };
            let Ok(value) = HeaderValue::from_bytes(&raw) else {
                continue;
            };
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_bytes(&[0xff, 0x00, 0x80]).unwrap());
        let sidecar = HeaderSidecar::capture(&headers);
        let encoded = sidecar.encode();
        let decoded = HeaderSidecar::decode(&encoded).unwrap();
        let mut out = HeaderMap::new();
        decoded.apply(&mut out);
        assert_eq!(out.get("x-custom").unwrap().as_bytes(), &[0xff, 0x00, 0x80]);
    }

    #[test]
    fn set_cookie_is_never_persisted() {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", HeaderValue::from_static("sid=abc"));
        let sidecar = HeaderSidecar::capture(&headers);
        assert!(sidecar.0.is_empty());
    }
}
