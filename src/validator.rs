//! Validates an inbound request and produces the effective cache key used by
//! the rest of the pipeline.

use bytes::{Bytes, BytesMut};
use http::HeaderMap;

use crate::{
    error::ValidationError,
    fingerprint::{ParsedBody, parse_content_type},
};

const HEADER_KEY_OVERRIDE: &str = "x-cachekey-override";
const HEADER_KEY_PREFIX: &str = "x-cachekey-prefix";
const HEADER_KEY_SUFFIX: &str = "x-cachekey-suffix";
const HEADER_BYPASS: &str = "x-cache-bypass";

#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Empty iff the request is a cache bypass.
    pub key: Bytes,
    pub bypass: bool,
    pub query: Option<String>,
}

impl ValidatedRequest {
    #[must_use]
    pub fn is_bypass(&self) -> bool {
        self.bypass || self.key.is_empty()
    }
}

pub struct Validator;

impl Validator {
    /// Parses a `multipart/form-data` body into name/value pairs, reading
    /// only the first value of each field. File parts are read to
    /// completion and discarded; their temporary storage is released as
    /// soon as the bytes are read.
    pub async fn parse_multipart(
        body: axum::body::Body,
        boundary: &str,
    ) -> Result<ParsedBody, ValidationError> {
        let mut multipart = multer::Multipart::new(body.into_data_stream(), boundary);
        let mut pairs = Vec::new();
        while let Ok(Some(field)) = multipart.next_field().await {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ValidationError::MalformedBody)?;
            let value = String::from_utf8_lossy(&bytes).into_owned();
            pairs.push((name, value));
        }
        Ok(ParsedBody { pairs })
    }

    /// Extracts the multipart boundary from the `Content-Type` header.
    pub fn multipart_boundary(headers: &HeaderMap) -> Result<String, ValidationError> {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or(ValidationError::InvalidContentType)?;
        multer::parse_boundary(content_type).map_err(|_| ValidationError::InvalidContentType)
    }

    /// Validates content-type, whitelist membership, and applies
    /// cache-control headers to compute the effective cache key.
    pub fn finalize(
        body: ParsedBody,
        headers: &HeaderMap,
    ) -> Result<ValidatedRequest, ValidationError> {
        body.validate_whitelist()?;

        let mut bypass = body.is_bypass_query() || headers.contains_key(HEADER_BYPASS);
        let query = body.get("query").map(str::to_string);

        let key = if let Some(value) = headers.get(HEADER_KEY_OVERRIDE) {
            Bytes::copy_from_slice(value.as_bytes())
        } else {
            let mut key = BytesMut::new();
            if let Some(prefix) = headers.get(HEADER_KEY_PREFIX) {
                key.extend_from_slice(prefix.as_bytes());
            }
            key.extend_from_slice(&body.canonical_key());
            if let Some(suffix) = headers.get(HEADER_KEY_SUFFIX) {
                key.extend_from_slice(suffix.as_bytes());
            }
            key.freeze()
        };

        if key.is_empty() {
            bypass = true;
        }

        Ok(ValidatedRequest { key, bypass, query })
    }

    pub fn validate_content_type(headers: &HeaderMap) -> Result<bool, ValidationError> {
        let mime = parse_content_type(headers)?;
        match (mime.type_(), mime.subtype()) {
            (mime::APPLICATION, mime::WWW_FORM_URLENCODED) => Ok(false),
            (mime::MULTIPART, mime::FORM_DATA) => Ok(true),
            _ => Err(ValidationError::InvalidContentType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_header_replaces_computed_key() {
        let body = ParsedBody {
            pairs: vec![("query".to_string(), "release".to_string())],
        };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KEY_OVERRIDE, "custom-key".parse().unwrap());
        let validated = Validator::finalize(body, &headers).unwrap();
        assert_eq!(validated.key, Bytes::from_static(b"custom-key"));
        assert!(!validated.is_bypass());
    }

    #[test]
    fn prefix_and_suffix_wrap_the_key() {
        let body = ParsedBody {
            pairs: vec![("code".to_string(), "foo".to_string())],
        };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KEY_PREFIX, "pre-".parse().unwrap());
        headers.insert(HEADER_KEY_SUFFIX, "-post".parse().unwrap());
        let validated = Validator::finalize(body, &headers).unwrap();
        assert_eq!(validated.key, Bytes::from_static(b"pre-code=foo-post"));
    }

    #[test]
    fn bypass_header_marks_request_uncacheable() {
        let body = ParsedBody {
            pairs: vec![("code".to_string(), "foo".to_string())],
        };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_BYPASS, "1".parse().unwrap());
        let validated = Validator::finalize(body, &headers).unwrap();
        assert!(validated.is_bypass());
    }

    #[test]
    fn bypass_query_values_are_never_cached() {
        let body = ParsedBody {
            pairs: vec![("query".to_string(), "auth_get_otp".to_string())],
        };
        let validated = Validator::finalize(body, &HeaderMap::new()).unwrap();
        assert!(validated.is_bypass());
    }
}
