//! HTTP frontend: route wiring, middleware stack, and graceful shutdown.
//!
//! Grounded on the teacher's `app.rs`, trimmed to this proxy's much smaller
//! surface: no provider dispatch, no rate limiting, no TLS termination (the
//! original service sits behind a TLS-terminating edge; see `DESIGN.md`).

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use futures::future::BoxFuture;
use meltdown::Token;
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt, catch_panic::CatchPanicLayer, request_id::MakeRequestUuid,
    sensitive_headers::SetSensitiveHeadersLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{admin, app_state::AppState, error::InitError, pipeline};

pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn build_router(&self) -> Router {
        let admin_routes = Router::new()
            .route("/stats", get(admin::stats))
            .route("/stats/reset", post(admin::stats_reset))
            .route("/dump", get(admin::dump))
            .route("/dumpkeys", get(admin::dump_keys))
            .route("/purge", post(admin::purge))
            .route("/purgeall", post(admin::purge_all));

        let request_timeout = self.state.config().proxy.read_timeout;

        Router::new()
            .nest("/admin", admin_routes)
            .fallback(pipeline::handle)
            .layer(
                ServiceBuilder::new()
                    .layer(CatchPanicLayer::new())
                    .layer(SetSensitiveHeadersLayer::new(std::iter::once(
                        http::header::AUTHORIZATION,
                    )))
                    .layer(TraceLayer::new_for_http())
                    .set_x_request_id(MakeRequestUuid)
                    .propagate_x_request_id()
                    .layer(TimeoutLayer::new(request_timeout)),
            )
            .with_state(self.state.clone())
    }
}

impl meltdown::Service for GatewayServer {
    type Future = BoxFuture<'static, Result<(), InitError>>;

    fn run(self, token: Token) -> Self::Future {
        Box::pin(async move {
            let config = self.state.config().server.clone();
            let addr = SocketAddr::from((config.address, config.port));
            let router = self.build_router();

            tracing::info!(address = %addr, "server starting");
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|error| InitError::Bind(addr, error))?;

            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_after(token, config.shutdown_timeout))
            .await
            .map_err(|error| InitError::Bind(addr, error))?;

            Ok(())
        })
    }
}

async fn shutdown_after(token: Token, grace: Duration) {
    token.await;
    tracing::info!(?grace, "server received shutdown signal");
}
