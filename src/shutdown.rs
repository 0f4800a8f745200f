//! Glue between ordinary async services/futures and `meltdown`, the
//! orchestrator that drives graceful shutdown of the server and background
//! tasks together.
//!
//! Grounded on the teacher's `meltdown::Service` usage in `app.rs`: a single
//! associated `Future`, and `run(self, token)` rather than an `async fn`.

use std::future::Future;

use futures::future::BoxFuture;
use meltdown::Token;

use crate::error::InitError;

/// Wraps a named future-producing service so its failures are attributable
/// by name in the `Meltdown` event loop.
pub struct TaggedService<S> {
    name: &'static str,
    inner: S,
}

impl<S> TaggedService<S> {
    pub fn new(name: &'static str, inner: S) -> Self {
        Self { name, inner }
    }
}

impl<S, E> meltdown::Service for TaggedService<S>
where
    S: meltdown::Service + Send + 'static,
    S::Future: Future<Output = Result<(), E>> + Send,
    E: Send + 'static,
{
    type Future = BoxFuture<'static, Result<(), E>>;

    fn run(self, token: Token) -> Self::Future {
        let name = self.name;
        Box::pin(async move {
            tracing::debug!(service = name, "starting");
            let result = self.inner.run(token).await;
            tracing::debug!(service = name, "stopped");
            result
        })
    }
}

/// A bare service that resolves once an operator-initiated shutdown signal
/// (Ctrl+C, or `SIGTERM` on unix) arrives, or the token is cancelled first.
pub struct ShutdownSignal;

impl meltdown::Service for ShutdownSignal {
    type Future = BoxFuture<'static, Result<(), InitError>>;

    fn run(self, token: Token) -> Self::Future {
        Box::pin(async move {
            tokio::select! {
                biased;
                () = token => Ok(()),
                result = wait_for_signal() => {
                    if result.is_ok() {
                        tracing::info!("shutdown signal received");
                    }
                    result
                }
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), InitError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).map_err(InitError::Signal)?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), InitError> {
    tokio::signal::ctrl_c().await.map_err(InitError::Signal)
}
