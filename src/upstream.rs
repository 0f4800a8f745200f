//! Forwards validated requests to the legacy origin and classifies the
//! response into cacheable / bypass / fail.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::{apiv1::EnvelopeProbe, config::proxy::ProxyConfig, error::UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Cacheable,
    Bypass,
    Fail,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UpstreamGate {
    client: reqwest::Client,
    config: ProxyConfig,
}

impl UpstreamGate {
    pub fn new(config: ProxyConfig) -> Result<Self, crate::error::InitError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.conn_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_idle_conn)
            .pool_idle_timeout(config.idle_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|error| crate::error::InitError::UpstreamClient(error))?;
        Ok(Self { client, config })
    }

    /// Forwards the untouched request body to the configured origin, with
    /// the `Host` header overridden.
    pub async fn forward(
        &self,
        method: http::Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.config.dst_server, path_and_query);
        let mut request = self.client.request(method, &url);
        for (name, value) in headers {
            if name == http::header::HOST {
                continue;
            }
            request = request.header(name.clone(), value.clone());
        }
        request = request.header(http::header::HOST, self.config.dst_host.clone());
        request = request.body(body);

        let response = request
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(UpstreamError::Transport)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    /// Classifies an upstream response per the gateway's forward/validate
    /// state machine.
    #[must_use]
    pub fn classify(response: &UpstreamResponse) -> Classification {
        if response.status.as_u16() < 200 || response.status.is_server_error() {
            return Classification::Fail;
        }
        if response.status.is_client_error() {
            return Classification::Bypass;
        }
        if response.body.is_empty() {
            return Classification::Fail;
        }
        if response.headers.contains_key(http::header::SET_COOKIE) {
            return Classification::Bypass;
        }
        match serde_json::from_slice::<EnvelopeProbe>(&response.body) {
            Ok(envelope) if envelope.is_cacheable() => Classification::Cacheable,
            Ok(_) => Classification::Bypass,
            Err(_) => Classification::Bypass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str, set_cookie: bool) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        if set_cookie {
            headers.insert(http::header::SET_COOKIE, "sid=abc".parse().unwrap());
        }
        UpstreamResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn server_error_is_a_failure() {
        let resp = response(503, "", false);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Fail);
    }

    #[test]
    fn client_error_is_a_bypass() {
        let resp = response(404, "not found", false);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Bypass);
    }

    #[test]
    fn empty_body_is_a_failure() {
        let resp = response(200, "", false);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Fail);
    }

    #[test]
    fn set_cookie_triggers_bypass() {
        let resp = response(200, r#"{"status":true,"data":{}}"#, true);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Bypass);
    }

    #[test]
    fn successful_envelope_is_cacheable() {
        let resp = response(200, r#"{"status":true,"data":{"id":1}}"#, false);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Cacheable);
    }

    #[test]
    fn error_envelope_is_a_bypass() {
        let resp = response(
            200,
            r#"{"status":false,"data":null,"error":{"code":404,"message":"not found","description":""}}"#,
            false,
        );
        assert_eq!(UpstreamGate::classify(&resp), Classification::Bypass);
    }

    #[test]
    fn non_envelope_body_is_a_bypass() {
        let resp = response(200, "not json", false);
        assert_eq!(UpstreamGate::classify(&resp), Classification::Bypass);
    }
}
