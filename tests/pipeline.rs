//! End-to-end tests against the real request pipeline: a mock upstream
//! origin stands in for `api.anilibria.tv`, and requests are driven through
//! the assembled [`Router`] the way `server.rs` builds it for `/`.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use alice_gateway::{
    app_state::{AppState, InnerAppState},
    cache::{CacheRouter, ZoneName},
    config::Config,
    geoip::GeoIpLookup,
    pipeline,
    randomizer::{Randomizer, ReleaseStore, StoreError},
    upstream::UpstreamGate,
};
use axum::{Router, body::Body, extract::ConnectInfo};
use bytes::Bytes;
use http::{Request, StatusCode};
use tower::ServiceExt;

/// A `ReleaseStore` fake populated directly in memory, mirroring the
/// in-module `InMemoryReleaseStore` test double but usable from an
/// integration test (which links against the crate without `cfg(test)`).
struct FakeReleaseStore {
    entries: HashMap<String, Bytes>,
}

#[async_trait::async_trait]
impl ReleaseStore for FakeReleaseStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }
}

fn release_chunk(releases: &[(&str, u64)]) -> String {
    let mut map = serde_json::Map::new();
    for (code, id) in releases {
        map.insert(id.to_string(), serde_json::json!({"id": id, "code": code}));
    }
    serde_json::to_string(&map).unwrap()
}

/// Maps a fixed set of addresses to ISO-2 codes, so quarantine routing can
/// be exercised without a real geoip database.
struct StaticGeoIp(HashMap<IpAddr, String>);

impl GeoIpLookup for StaticGeoIp {
    fn lookup(&self, ip: IpAddr) -> Option<String> {
        self.0.get(&ip).cloned()
    }
}

struct MockUpstream {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
}

/// Spawns a tiny axum server that always answers with `body`, optionally
/// marked `Set-Cookie`, and counts how many requests it received.
async fn spawn_mock_upstream(
    status: StatusCode,
    set_cookie: bool,
    body: &'static str,
) -> MockUpstream {
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    let handler = move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut response = http::Response::builder().status(status);
            if set_cookie {
                response = response.header(http::header::SET_COOKIE, "sid=abc123");
            }
            response
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        }
    };
    let app = Router::new().fallback(handler);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockUpstream { addr, requests }
}

#[derive(Default)]
struct StateOpts {
    quarantine: Vec<String>,
    geoip: HashMap<IpAddr, String>,
    release_entries: HashMap<String, Bytes>,
}

async fn build_state(upstream_addr: SocketAddr, opts: StateOpts) -> AppState {
    let mut config = Config::default();
    config.proxy.dst_server = format!("http://{upstream_addr}");
    config.proxy.dst_host = upstream_addr.to_string();
    config.cache.quarantine_countries = opts.quarantine;

    let cache = CacheRouter::new(&config.cache);
    let upstream = UpstreamGate::new(config.proxy.clone()).unwrap();
    let store: Arc<dyn ReleaseStore> = Arc::new(FakeReleaseStore {
        entries: opts.release_entries,
    });
    let randomizer = Arc::new(Randomizer::new(store, config.randomizer.clone()));
    let geoip: Arc<dyn GeoIpLookup> = Arc::new(StaticGeoIp(opts.geoip));

    AppState(Arc::new(InnerAppState {
        config,
        cache,
        upstream,
        randomizer,
        geoip,
    }))
}

fn post_request(body: &'static str, content_type: &str) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri("/")
        .header(http::header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

fn router(state: AppState) -> Router {
    Router::new().fallback(pipeline::handle).with_state(state)
}

async fn body_json(response: http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn declined_argument_is_rejected_with_400() {
    let upstream = spawn_mock_upstream(StatusCode::OK, false, r#"{"status":true}"#).await;
    let state = build_state(upstream.addr, StateOpts::default()).await;

    let response = router(state)
        .oneshot(post_request(
            "query=release&bogus=1",
            "application/x-www-form-urlencoded",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], serde_json::json!(false));
    assert_eq!(body["error"]["code"], serde_json::json!(400));
    assert_eq!(
        body["error"]["message"],
        serde_json::json!("invalid api arguments detected")
    );
    assert_eq!(upstream.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let upstream = spawn_mock_upstream(
        StatusCode::OK,
        false,
        r#"{"status":true,"data":{"id":1,"code":"foo"}}"#,
    )
    .await;
    let state = build_state(upstream.addr, StateOpts::default()).await;
    let router = router(state);

    let first = router
        .clone()
        .oneshot(post_request(
            "query=release&code=foo",
            "application/x-www-form-urlencoded",
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("x-alice-cache").unwrap(), "MISS");

    let second = router
        .oneshot(post_request(
            "query=release&code=foo",
            "application/x-www-form-urlencoded",
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-alice-cache").unwrap(), "HIT");

    assert_eq!(upstream.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn set_cookie_response_always_bypasses_the_cache() {
    let upstream = spawn_mock_upstream(
        StatusCode::OK,
        true,
        r#"{"status":true,"data":{"id":1,"code":"foo"}}"#,
    )
    .await;
    let state = build_state(upstream.addr, StateOpts::default()).await;
    let router = router(state);

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(post_request(
                "query=release&code=foo",
                "application/x-www-form-urlencoded",
            ))
            .await
            .unwrap();
        assert_eq!(response.headers().get("x-alice-cache").unwrap(), "BYPASS");
    }

    assert_eq!(upstream.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn random_release_query_is_answered_from_the_randomizer() {
    let upstream = spawn_mock_upstream(StatusCode::OK, false, r#"{"status":true}"#).await;
    let release_entries = HashMap::from([
        ("releases".to_string(), Bytes::from("1".to_string())),
        (
            "releases0".to_string(),
            Bytes::from(release_chunk(&[("foo", 1), ("bar", 2)])),
        ),
    ]);
    let state = build_state(
        upstream.addr,
        StateOpts {
            release_entries,
            ..StateOpts::default()
        },
    )
    .await;
    state.randomizer().refresh_once().await.unwrap();

    let response = router(state)
        .oneshot(post_request(
            "query=random_release",
            "application/x-www-form-urlencoded",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-alice-cache").unwrap(), "HIT");
    let body = body_json(response).await;
    let code = body["data"]["code"].as_str().unwrap();
    assert!(code == "foo" || code == "bar");
    assert_eq!(upstream.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quarantine_zone_is_purged_independently_of_the_default_zone() {
    let upstream = spawn_mock_upstream(
        StatusCode::OK,
        false,
        r#"{"status":true,"data":{"id":1,"code":"foo"}}"#,
    )
    .await;
    let ru_addr: SocketAddr = "10.0.0.1:1234".parse().unwrap();
    let us_addr: SocketAddr = "10.0.0.2:1234".parse().unwrap();
    let state = build_state(
        upstream.addr,
        StateOpts {
            quarantine: vec!["RU".to_string()],
            geoip: HashMap::from([
                (ru_addr.ip(), "RU".to_string()),
                (us_addr.ip(), "US".to_string()),
            ]),
            ..StateOpts::default()
        },
    )
    .await;

    let request_from = |addr: SocketAddr| {
        let mut request =
            post_request("query=release&code=foo", "application/x-www-form-urlencoded");
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    };

    let router = router(state.clone());
    for addr in [ru_addr, us_addr] {
        let response = router.clone().oneshot(request_from(addr)).await.unwrap();
        assert_eq!(response.headers().get("x-alice-cache").unwrap(), "MISS");
    }
    for addr in [ru_addr, us_addr] {
        let response = router.clone().oneshot(request_from(addr)).await.unwrap();
        assert_eq!(response.headers().get("x-alice-cache").unwrap(), "HIT");
    }
    assert_eq!(upstream.requests.load(Ordering::SeqCst), 2);

    state.cache().reset(ZoneName::Quarantine);

    let ru_again = router.clone().oneshot(request_from(ru_addr)).await.unwrap();
    assert_eq!(ru_again.headers().get("x-alice-cache").unwrap(), "MISS");
    let us_again = router.clone().oneshot(request_from(us_addr)).await.unwrap();
    assert_eq!(us_again.headers().get("x-alice-cache").unwrap(), "HIT");

    assert_eq!(upstream.requests.load(Ordering::SeqCst), 3);
}
