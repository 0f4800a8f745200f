//! Request fingerprinting: turns a parsed parameter set into a canonical
//! cache key that is invariant to encoding (urlencoded vs. multipart) and
//! parameter order.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::HeaderMap;
use mime::Mime;

use crate::error::ValidationError;

/// Body parameter names the proxy is willing to forward upstream and fold
/// into the cache key.
pub const ALLOWED_PARAM_NAMES: &[&str] = &[
    "action",
    "code",
    "filter",
    "id",
    "json",
    "page",
    "perPage",
    "query",
    "rm",
    "sort",
    "xpage",
    "finish",
    "search",
    "current",
    "2fa",
    "announce",
    "csrf",
    "csrf_token",
    "data",
    "deviceId",
    "do",
    "fa2code",
    "g-recaptcha-response",
    "info",
    "key",
    "login",
    "mail",
    "mes",
    "newPasswd",
    "oldPasswd",
    "order0column",
    "order0dir",
    "passwd",
    "recaptcha",
    "reset",
    "rid",
    "searchvalue",
    "url",
    "v",
    "vk",
    "w",
    "width",
];

/// Values of the `query` parameter that the proxy will forward.
pub const ALLOWED_QUERY_VALUES: &[&str] = &[
    "app_update",
    "config",
    "donation_details",
    "empty",
    "teams",
    "torrent",
    "info",
    "franchises",
    "release",
    "random_release",
    "list",
    "schedule",
    "feed",
    "genres",
    "years",
    "favorites",
    "youtube",
    "user",
    "catalog",
    "search",
    "vkcomments",
    "social_auth",
    "link_menu",
    "reserved_test",
    "auth_get_otp",
    "auth_accept_otp",
    "auth_login_otp",
    "api_empty",
];

/// `query` values that never get cached, even when otherwise cacheable.
pub const BYPASS_QUERY_VALUES: &[&str] = &["auth_get_otp", "auth_accept_otp", "auth_login_otp"];

/// A parsed, still-unsorted body as `(name, value)` pairs.
#[derive(Debug, Default, Clone)]
pub struct ParsedBody {
    pub pairs: Vec<(String, String)>,
}

impl ParsedBody {
    /// Parses an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let pairs = form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every parameter name must be on the allow-list.
    pub fn validate_whitelist(&self) -> Result<(), ValidationError> {
        if self.pairs.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        for (name, _) in &self.pairs {
            if !ALLOWED_PARAM_NAMES.contains(&name.as_str()) {
                return Err(ValidationError::DeclinedArgs);
            }
        }
        if let Some(query) = self.get("query")
            && !ALLOWED_QUERY_VALUES.contains(&query)
        {
            return Err(ValidationError::DeclinedQuery);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_bypass_query(&self) -> bool {
        self.get("query")
            .is_some_and(|q| BYPASS_QUERY_VALUES.contains(&q))
    }

    /// Canonical key: pairs sorted by name (ties broken by value), re-joined
    /// as `name=value&name=value`.
    #[must_use]
    pub fn canonical_key(&self) -> Bytes {
        let mut sorted: BTreeMap<(&str, &str), ()> = BTreeMap::new();
        for (name, value) in &self.pairs {
            sorted.insert((name.as_str(), value.as_str()), ());
        }
        let mut out = String::new();
        for (i, ((name, value), ())) in sorted.into_iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(value);
        }
        Bytes::from(out.into_bytes())
    }
}

/// Classifies the request content-type, stripping any `;` parameters.
pub fn parse_content_type(headers: &HeaderMap) -> Result<Mime, ValidationError> {
    let raw = headers
        .get(http::header::CONTENT_TYPE)
        .ok_or(ValidationError::InvalidContentType)?;
    let raw = raw.to_str().map_err(|_| ValidationError::InvalidContentType)?;
    raw.parse::<Mime>()
        .map_err(|_| ValidationError::InvalidContentType)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_is_order_invariant() {
        let a = ParsedBody {
            pairs: vec![
                ("query".to_string(), "release".to_string()),
                ("code".to_string(), "foo".to_string()),
            ],
        };
        let b = ParsedBody {
            pairs: vec![
                ("code".to_string(), "foo".to_string()),
                ("query".to_string(), "release".to_string()),
            ],
        };
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key(), Bytes::from_static(b"code=foo&query=release"));
    }

    #[test]
    fn empty_body_is_rejected() {
        let body = ParsedBody::default();
        assert!(matches!(
            body.validate_whitelist(),
            Err(ValidationError::EmptyBody)
        ));
    }

    #[test]
    fn non_whitelisted_param_is_rejected() {
        let body = ParsedBody {
            pairs: vec![
                ("query".to_string(), "release".to_string()),
                ("bogus".to_string(), "1".to_string()),
            ],
        };
        assert!(matches!(
            body.validate_whitelist(),
            Err(ValidationError::DeclinedArgs)
        ));
    }

    #[test]
    fn non_whitelisted_query_value_is_rejected() {
        let body = ParsedBody {
            pairs: vec![("query".to_string(), "drop_table".to_string())],
        };
        assert!(matches!(
            body.validate_whitelist(),
            Err(ValidationError::DeclinedQuery)
        ));
    }

    #[test]
    fn urlencoded_and_equivalent_pairs_match() {
        let urlencoded = ParsedBody::from_urlencoded(b"query=release&code=foo");
        let multipart_equivalent = ParsedBody {
            pairs: vec![
                ("code".to_string(), "foo".to_string()),
                ("query".to_string(), "release".to_string()),
            ],
        };
        assert_eq!(
            urlencoded.canonical_key(),
            multipart_equivalent.canonical_key()
        );
    }
}
