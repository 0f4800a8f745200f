//! In-memory index of releases, refreshed from a chunked key-value store,
//! serving the `random_release` and `release` query hijacks.
//!
//! Grounded on `internal/anilibria/randomizer.go` and `releases.go` from the
//! original service; the random-pick algorithm is redesigned to draw
//! uniformly from a `code_order` vector rather than reinterpreting a random
//! integer as a map key (see `DESIGN.md`).

pub mod release;
pub mod store;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use displaydoc::Display;
use rand::Rng;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub use release::{Release, ReleaseBlockedInfo, ReleaseMeta};
pub use store::{ReleaseStore, StoreError};

use crate::config::randomizer::RandomizerConfig;

#[derive(Debug, Error, Display)]
pub enum RandomizerError {
    /// randomizer index has not been populated yet
    NotReady,
    /// exhausted rejection-sampling budget without finding an eligible release
    TooManyRejections,
    /// release not found
    NotFound,
    /// key-value store error: {0}
    Store(#[from] StoreError),
}

#[derive(Default)]
pub struct ReleaseIndex {
    by_code: HashMap<String, Arc<Release>>,
    by_id: HashMap<String, Arc<Release>>,
    code_order: Vec<String>,
}

impl ReleaseIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        self.code_order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code_order.is_empty()
    }
}

pub struct Randomizer {
    store: Arc<dyn ReleaseStore>,
    config: RandomizerConfig,
    index: RwLock<Arc<ReleaseIndex>>,
    refresh_token: CancellationToken,
}

impl Randomizer {
    #[must_use]
    pub fn new(store: Arc<dyn ReleaseStore>, config: RandomizerConfig) -> Self {
        Self {
            store,
            config,
            index: RwLock::new(Arc::new(ReleaseIndex::default())),
            refresh_token: CancellationToken::new(),
        }
    }

    /// Performs one chunked fetch-decode-commit cycle, returning the number
    /// of releases indexed. Per-chunk failures are logged and skipped
    /// rather than aborting the whole refresh.
    pub async fn refresh_once(&self) -> Result<usize, RandomizerError> {
        let Some(count_bytes) = self.store.get(&self.config.releases_key).await? else {
            tracing::debug!("randomizer releases key not present yet");
            return Ok(0);
        };
        let count_bytes = self.maybe_decompress(&count_bytes);
        let chunk_count: usize = std::str::from_utf8(&count_bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        let mut by_code = HashMap::new();
        let mut by_id = HashMap::new();
        let mut code_order = Vec::new();
        let mut failed_chunks = 0usize;

        for i in 0..chunk_count {
            let chunk_key = format!("{}{i}", self.config.releases_key);
            match self.store.get(&chunk_key).await {
                Ok(Some(bytes)) => {
                    let bytes = self.maybe_decompress(&bytes);
                    match self.index_chunk(&bytes) {
                        Ok(releases) => {
                            for release in releases {
                                code_order.push(release.meta.code.clone());
                                let release = Arc::new(release);
                                by_code.insert(release.meta.code.clone(), release.clone());
                                by_id.insert(release.meta.id.to_string(), release);
                            }
                        }
                        Err(error) => {
                            tracing::warn!(chunk = i, error = %error, "failed to decode release chunk");
                            failed_chunks += 1;
                        }
                    }
                }
                Ok(None) => failed_chunks += 1,
                Err(error) => {
                    tracing::warn!(chunk = i, error = %error, "failed to fetch release chunk");
                    failed_chunks += 1;
                }
            }
        }

        if failed_chunks > 0 {
            tracing::warn!(failed_chunks, total = chunk_count, "some release chunks failed to refresh");
        }

        let indexed = code_order.len();
        let new_index = Arc::new(ReleaseIndex {
            by_code,
            by_id,
            code_order,
        });
        *self.index.write().await = new_index;
        Ok(indexed)
    }

    fn maybe_decompress(&self, bytes: &Bytes) -> Bytes {
        if !self.config.zstd_enable {
            return bytes.clone();
        }
        zstd::stream::decode_all(std::io::Cursor::new(bytes.as_ref()))
            .map(Bytes::from)
            .unwrap_or_else(|_| bytes.clone())
    }

    fn index_chunk(&self, bytes: &[u8]) -> Result<Vec<Release>, serde_json::Error> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        let mut out = Vec::with_capacity(object.len());
        for (_key, value) in object {
            let meta: ReleaseMeta = serde_json::from_value(value.clone())?;
            let raw = Bytes::from(serde_json::to_vec(&value)?);
            out.push(Release { meta, raw });
        }
        Ok(out)
    }

    /// Runs the refresh loop until cancelled: `bootstrap_delay` before the
    /// first attempt, then `update_frequency` on success or
    /// `retry_frequency` on failure.
    pub fn spawn_refresh_loop(self: Arc<Self>) {
        if !self.config.enable {
            return;
        }
        let randomizer = self;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = randomizer.refresh_token.cancelled() => return,
                () = tokio::time::sleep(randomizer.config.bootstrap_delay) => {}
            }
            loop {
                let delay = match randomizer.refresh_once().await {
                    Ok(count) => {
                        tracing::debug!(count, "randomizer index refreshed");
                        randomizer.config.update_frequency
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "randomizer refresh failed, will retry");
                        randomizer.config.retry_frequency
                    }
                };
                tokio::select! {
                    biased;
                    () = randomizer.refresh_token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        });
    }

    pub fn stop(&self) {
        self.refresh_token.cancel();
    }

    /// Picks a uniformly random, non-blocked release code via rejection
    /// sampling bounded by `fetch_tries`.
    pub async fn randomize(&self, region: Option<&str>) -> Result<String, RandomizerError> {
        let index = self.index.read().await.clone();
        if index.is_empty() {
            return Err(RandomizerError::NotReady);
        }
        let mut rng = rand::rng();
        for _ in 0..self.config.fetch_tries.max(1) {
            let i = rng.random_range(0..index.len());
            let code = &index.code_order[i];
            let Some(release) = index.by_code.get(code) else {
                continue;
            };
            if release.is_worldwide_blocked() {
                continue;
            }
            if let Some(region) = region
                && release.is_blocked_in(region)
            {
                continue;
            }
            return Ok(release.meta.code.clone());
        }
        Err(RandomizerError::TooManyRejections)
    }

    /// Returns the raw upstream JSON for a release, by code or id.
    pub async fn raw_release(&self, identifier: &str) -> Option<Bytes> {
        let index = self.index.read().await.clone();
        index
            .by_code
            .get(identifier)
            .or_else(|| index.by_id.get(identifier))
            .map(|release| release.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use super::*;
    use crate::randomizer::store::InMemoryReleaseStore;

    fn chunk(releases: &[(&str, u64, bool)]) -> String {
        let mut map = serde_json::Map::new();
        for (code, id, blocked) in releases {
            let mut obj = serde_json::json!({"id": id, "code": code});
            if *blocked {
                obj["blockedInfo"] = serde_json::json!({
                    "is_blocked_in_geo": [],
                    "is_blocked_by_copyrights": true,
                    "reason": "takedown",
                });
            }
            map.insert(id.to_string(), obj);
        }
        serde_json::to_string(&map).unwrap()
    }

    fn store_with(chunks: Vec<String>) -> Arc<InMemoryReleaseStore> {
        let mut entries = StdHashMap::new();
        entries.insert("releases".to_string(), Bytes::from(chunks.len().to_string()));
        for (i, c) in chunks.into_iter().enumerate() {
            entries.insert(format!("releases{i}"), Bytes::from(c));
        }
        Arc::new(InMemoryReleaseStore { entries })
    }

    #[tokio::test]
    async fn refresh_indexes_all_chunks() {
        let store = store_with(vec![
            chunk(&[("foo", 1, false)]),
            chunk(&[("bar", 2, false)]),
        ]);
        let randomizer = Randomizer::new(store, RandomizerConfig::default());
        let indexed = randomizer.refresh_once().await.unwrap();
        assert_eq!(indexed, 2);
    }

    #[tokio::test]
    async fn randomize_before_refresh_is_not_ready() {
        let store = store_with(vec![]);
        let randomizer = Randomizer::new(store, RandomizerConfig::default());
        assert!(matches!(
            randomizer.randomize(None).await,
            Err(RandomizerError::NotReady)
        ));
    }

    #[tokio::test]
    async fn randomize_never_returns_worldwide_blocked_release() {
        let store = store_with(vec![chunk(&[("blocked", 1, true), ("ok", 2, false)])]);
        let randomizer = Randomizer::new(store, RandomizerConfig::default());
        randomizer.refresh_once().await.unwrap();
        for _ in 0..50 {
            let code = randomizer.randomize(None).await.unwrap();
            assert_eq!(code, "ok");
        }
    }

    #[tokio::test]
    async fn raw_release_is_looked_up_by_code_or_id() {
        let store = store_with(vec![chunk(&[("foo", 42, false)])]);
        let randomizer = Randomizer::new(store, RandomizerConfig::default());
        randomizer.refresh_once().await.unwrap();
        assert!(randomizer.raw_release("foo").await.is_some());
        assert!(randomizer.raw_release("42").await.is_some());
        assert!(randomizer.raw_release("missing").await.is_none());
    }
}
