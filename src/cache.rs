//! The in-memory cache of decoded values and its expiration policy.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A decoded value as stored in the cache.
///
/// Decoders produce arbitrary caller types; the cache holds them erased and
/// the facade downcasts on the way back out.
pub(crate) type DecodedValue = Arc<dyn Any + Send + Sync>;

/// One memoized lookup outcome.
///
/// Entries are immutable once inserted: expiry is observed by readers, never
/// written back. An entry with `ok == false` memoizes a store miss or a
/// decode failure, so the store is left alone for such keys until the TTL
/// runs out.
pub(crate) struct CachedEntry {
    pub(crate) value: Option<DecodedValue>,
    pub(crate) ok: bool,
    created: Instant,
    ttl: Duration,
}

impl CachedEntry {
    /// An entry carrying a decoded value.
    pub(crate) fn found(value: DecodedValue, ttl: Duration) -> Self {
        CachedEntry {
            value: Some(value),
            ok: true,
            created: Instant::now(),
            ttl,
        }
    }

    /// An entry memoizing a miss or a decode failure.
    pub(crate) fn absent(ttl: Duration) -> Self {
        CachedEntry {
            value: None,
            ok: false,
            created: Instant::now(),
            ttl,
        }
    }

    pub(crate) fn has_expired(&self) -> bool {
        self.created.elapsed() > self.ttl
    }
}

/// String key to [`CachedEntry`] mapping, owned exclusively by the actor.
///
/// There is no per-entry eviction: when the map outgrows the configured
/// capacity the whole thing is flushed, and a sampled sweep removes expired
/// entries between lookups.
#[derive(Default)]
pub(crate) struct ValueCache {
    entries: HashMap<String, CachedEntry>,
}

impl ValueCache {
    pub(crate) fn get(&self, key: &str) -> Option<&CachedEntry> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: String, entry: CachedEntry) {
        self.entries.insert(key, entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry.
    pub(crate) fn flush(&mut self) {
        self.entries = HashMap::new();
    }

    /// A bounded expiration sweep, the way redis expires keys.
    ///
    /// Each pass visits at most `sample_count` entries in unspecified order
    /// and removes the expired ones. When at least a quarter of the sample
    /// budget was removed, many more entries are probably stale, so another
    /// pass runs immediately, up to 5 passes in total. The pass bound keeps
    /// a mass expiry from stalling lookups behind an unbounded sweep.
    pub(crate) fn sweep(&mut self, sample_count: usize) {
        let mut passes = 0;
        loop {
            let removed = self.sweep_once(sample_count);
            passes += 1;
            if removed < sample_count / 4 || passes == 5 {
                break;
            }
            tracing::debug!(removed, "expired a large part of the sample, sweeping again");
        }
    }

    fn sweep_once(&mut self, sample_count: usize) -> usize {
        let mut visited = 0;
        let mut expired = Vec::new();
        for (key, entry) in &self.entries {
            if entry.has_expired() {
                expired.push(key.clone());
            }
            visited += 1;
            if visited == sample_count {
                break;
            }
        }
        for key in &expired {
            self.entries.remove(key);
        }
        expired.len()
    }
}
