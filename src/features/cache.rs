use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::names::FeatureName;
use crate::common::errors::FeatureError;
use crate::config::types::CacheConfig;

/// Key for a memoized feature value
///
/// The digest covers exactly the sub-inputs the feature reads, so two
/// snapshots that differ elsewhere still share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub feature: FeatureName,
    digest: [u8; 32],
}

impl CacheKey {
    pub fn builder(feature: FeatureName) -> CacheKeyBuilder {
        CacheKeyBuilder {
            feature,
            hasher: Sha256::new(),
        }
    }

    /// Abbreviated digest for log lines
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest[..6])
    }
}

pub struct CacheKeyBuilder {
    feature: FeatureName,
    hasher: Sha256,
}

impl CacheKeyBuilder {
    pub fn f64(mut self, value: f64) -> Self {
        self.hasher.update(value.to_bits().to_le_bytes());
        self
    }

    pub fn opt_f64(self, value: Option<f64>) -> Self {
        match value {
            Some(v) => self.flag(true).f64(v),
            None => self.flag(false),
        }
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.hasher.update([value as u8]);
        self
    }

    pub fn build(self) -> CacheKey {
        let mut hasher = self.hasher;
        hasher.update(self.feature.as_str().as_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        CacheKey {
            feature: self.feature,
            digest,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    value: f64,
    inserted_at: DateTime<Utc>,
}

/// Counters exposed through engine stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Time-bounded memo for expensive features
///
/// Expiry is measured on snapshot timestamps so that replayed data behaves
/// exactly like live data. The lock is released while a value computes.
pub struct FeatureCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: BTreeMap<FeatureName, Duration>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FeatureCache {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = config
            .ttl_seconds
            .iter()
            .filter(|(_, secs)| **secs > 0)
            .map(|(name, secs)| (*name, Duration::seconds(*secs as i64)))
            .collect();
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: config.max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether values of this feature are memoized at all
    pub fn is_cached(&self, feature: FeatureName) -> bool {
        self.ttl.contains_key(&feature)
    }

    /// Return the live entry for `key`, or compute, store and return it.
    ///
    /// Errors are returned as-is and never stored.
    pub fn get_or_compute<F>(
        &self,
        key: CacheKey,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<f64, FeatureError>
    where
        F: FnOnce() -> Result<f64, FeatureError>,
    {
        let Some(ttl) = self.ttl.get(&key.feature).copied() else {
            return compute();
        };

        if let Some(entry) = self.entries.lock().get(&key).copied() {
            let age = now - entry.inserted_at;
            if age >= Duration::zero() && age < ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(feature = %key.feature, key = %key.short_hex(), "feature cache hit");
                return Ok(entry.value);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute()?;

        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            self.evict(&mut entries, now);
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
        Ok(value)
    }

    /// Drop expired entries; if none expired, drop the oldest one
    fn evict(&self, entries: &mut HashMap<CacheKey, CacheEntry>, now: DateTime<Utc>) {
        let before = entries.len();
        entries.retain(|key, entry| {
            self.ttl
                .get(&key.feature)
                .map(|ttl| now - entry.inserted_at < *ttl)
                .unwrap_or(false)
        });
        if entries.len() < before {
            return;
        }
        if let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&oldest);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}
