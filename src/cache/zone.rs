//! A sharded, fixed-memory, time-windowed byte cache.
//!
//! Grounded on the `allegro/bigcache` design used by the original service:
//! a power-of-two number of shards, each an independent hash table behind
//! its own lock with a FIFO insertion ring, a per-entry life window, and a
//! periodic sweep that evicts expired entries. Unlike `bigcache` this
//! implementation favors ordinary heap allocation over an arena/ring-buffer
//! of raw bytes; see the design notes in `DESIGN.md`.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, thiserror::Error, displaydoc::Display)]
pub enum CacheError {
    /// entry not found
    NotFound,
    /// failed to decompress cache entry
    Corrupt,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheZoneConfig {
    pub shards: u32,
    pub life_window: Duration,
    pub clean_window: Duration,
    pub hard_max_bytes: u64,
    pub max_entry_size: usize,
}

struct Entry {
    compressed: Bytes,
    inserted_at: Instant,
}

#[derive(Default)]
struct Shard {
    map: HashMap<Bytes, Entry>,
    order: VecDeque<Bytes>,
    bytes_used: u64,
}

impl Shard {
    fn with_capacity(max_entry_size: usize) -> Self {
        let cap = (max_entry_size.max(1) * 16).clamp(16, 1 << 16);
        Self {
            map: HashMap::with_capacity(cap / max_entry_size.max(1)),
            order: VecDeque::new(),
            bytes_used: 0,
        }
    }
}

#[derive(Default)]
pub struct ZoneStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub del_hits: AtomicU64,
    pub del_misses: AtomicU64,
    pub collisions: AtomicU64,
}

impl ZoneStats {
    fn snapshot(&self) -> ZoneStatsSnapshot {
        ZoneStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            del_misses: self.del_misses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.del_hits.store(0, Ordering::Relaxed);
        self.del_misses.store(0, Ordering::Relaxed);
        self.collisions.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub del_hits: u64,
    pub del_misses: u64,
    pub collisions: u64,
}

pub struct CacheEntryRecord {
    pub timestamp: Instant,
    pub hash: u64,
    pub key: Bytes,
}

/// One independent cache pool. Cloning is cheap; clones share the same
/// shards and stats via `Arc`.
#[derive(Clone)]
pub struct CacheZone {
    inner: Arc<Inner>,
}

struct Inner {
    shards: Vec<Mutex<Shard>>,
    mask: u64,
    config: CacheZoneConfig,
    per_shard_max_bytes: u64,
    stats: ZoneStats,
    sweep_token: CancellationToken,
}

impl CacheZone {
    /// # Panics
    /// Panics if `config.shards` is not a power of two; callers must
    /// validate configuration before constructing a zone.
    #[must_use]
    pub fn new(config: CacheZoneConfig) -> Self {
        assert!(config.shards.is_power_of_two(), "shard count must be a power of two");
        let shards = (0..config.shards)
            .map(|_| Mutex::new(Shard::with_capacity(config.max_entry_size)))
            .collect();
        let per_shard_max_bytes = if config.hard_max_bytes == 0 {
            u64::MAX
        } else {
            config.hard_max_bytes / u64::from(config.shards)
        };
        let zone = Self {
            inner: Arc::new(Inner {
                shards,
                mask: u64::from(config.shards) - 1,
                config,
                per_shard_max_bytes,
                stats: ZoneStats::default(),
                sweep_token: CancellationToken::new(),
            }),
        };
        if !config.clean_window.is_zero() {
            zone.spawn_sweeper();
        }
        zone
    }

    fn shard_for(&self, key: &[u8]) -> &Mutex<Shard> {
        let hash = hash_key(key);
        &self.inner.shards[(hash & self.inner.mask) as usize]
    }

    /// Stores `value`, compressing it first. May evict the oldest entries
    /// in the affected shard (FIFO) if the shard's hard memory cap would
    /// otherwise be exceeded.
    pub fn set(&self, key: &Bytes, value: &[u8]) {
        let compressed = Bytes::from(lz4_flex::compress_prepend_size(value));
        let shard = self.shard_for(key);
        let mut shard = lock_shard(shard);
        if let Some(old) = shard.map.get(key) {
            shard.bytes_used = shard.bytes_used.saturating_sub(old.compressed.len() as u64);
            self.inner.stats.collisions.fetch_add(1, Ordering::Relaxed);
        } else {
            shard.order.push_back(key.clone());
        }
        shard.bytes_used += compressed.len() as u64;
        shard.map.insert(
            key.clone(),
            Entry {
                compressed,
                inserted_at: Instant::now(),
            },
        );

        while shard.bytes_used > self.inner.per_shard_max_bytes {
            let Some(oldest) = shard.order.pop_front() else {
                break;
            };
            if let Some(evicted) = shard.map.remove(&oldest) {
                shard.bytes_used =
                    shard.bytes_used.saturating_sub(evicted.compressed.len() as u64);
            }
        }
    }

    /// Returns the decompressed value, if present and not expired.
    pub fn get(&self, key: &Bytes) -> Result<Bytes, CacheError> {
        let result = self.fetch(key);
        match &result {
            Ok(_) => self.inner.stats.hits.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.inner.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Like [`Self::get`], but does not touch the hit/miss counters. Used
    /// for auxiliary reads (the header sidecar) that belong to the same
    /// logical lookup as an already-counted primary read.
    pub(crate) fn get_uncounted(&self, key: &Bytes) -> Result<Bytes, CacheError> {
        self.fetch(key)
    }

    fn fetch(&self, key: &Bytes) -> Result<Bytes, CacheError> {
        let shard = self.shard_for(key);
        let shard = lock_shard(shard);
        let Some(entry) = shard.map.get(key) else {
            return Err(CacheError::NotFound);
        };
        if entry.inserted_at.elapsed() > self.inner.config.life_window {
            return Err(CacheError::NotFound);
        }
        let decompressed = lz4_flex::decompress_size_prepended(&entry.compressed)
            .map_err(|_| CacheError::Corrupt)?;
        Ok(Bytes::from(decompressed))
    }

    #[must_use]
    pub fn contains(&self, key: &Bytes) -> bool {
        self.get(key).is_ok()
    }

    /// Idempotent. Returns whether the key was present.
    pub fn delete(&self, key: &Bytes) -> bool {
        let shard = self.shard_for(key);
        let mut shard = lock_shard(shard);
        if let Some(entry) = shard.map.remove(key) {
            shard.bytes_used = shard.bytes_used.saturating_sub(entry.compressed.len() as u64);
            self.inner.stats.del_hits.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.inner.stats.del_misses.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn reset(&self) {
        for shard in &self.inner.shards {
            let mut shard = lock_shard(shard);
            shard.map.clear();
            shard.order.clear();
            shard.bytes_used = 0;
        }
        self.inner.stats.reset();
    }

    #[must_use]
    pub fn stats(&self) -> ZoneStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Resets only the hit/miss counters, leaving stored entries untouched.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.inner.shards.iter().map(|s| lock_shard(s).map.len()).sum()
    }

    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.inner.shards.iter().map(|s| lock_shard(s).bytes_used).sum()
    }

    /// Yields a record per live entry, shard by shard. Concurrent mutation
    /// may skip entries inserted mid-iteration but never panics.
    #[must_use]
    pub fn iterate(&self) -> Vec<CacheEntryRecord> {
        let mut out = Vec::new();
        for shard in &self.inner.shards {
            let shard = lock_shard(shard);
            for (key, entry) in &shard.map {
                out.push(CacheEntryRecord {
                    timestamp: entry.inserted_at,
                    hash: hash_key(key),
                    key: key.clone(),
                });
            }
        }
        out
    }

    fn spawn_sweeper(&self) {
        let inner = self.inner.clone();
        let token = self.inner.sweep_token.clone();
        let interval = inner.config.clean_window;
        let life_window = inner.config.life_window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        for shard in &inner.shards {
                            let mut shard = lock_shard(shard);
                            while let Some(oldest_key) = shard.order.front().cloned() {
                                let expired = shard
                                    .map
                                    .get(&oldest_key)
                                    .is_some_and(|e| e.inserted_at.elapsed() > life_window);
                                if !expired {
                                    break;
                                }
                                shard.order.pop_front();
                                if let Some(entry) = shard.map.remove(&oldest_key) {
                                    shard.bytes_used = shard
                                        .bytes_used
                                        .saturating_sub(entry.compressed.len() as u64);
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Halts the periodic clean task. Idempotent.
    pub fn close(&self) {
        self.inner.sweep_token.cancel();
    }
}

fn lock_shard(shard: &Mutex<Shard>) -> MutexGuard<'_, Shard> {
    shard.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn hash_key(key: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}
