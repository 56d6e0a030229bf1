//! The actor owning the store handle and the cache, and its public facade.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cache::{CachedEntry, DecodedValue, ValueCache};
use crate::config::{DbConfig, DbOptions};
use crate::fetcher::Fetcher;
use crate::object_store;
use crate::store::Snapshot;

/// How often expired cache entries are swept out.
const EXPIRE_TICK: Duration = Duration::from_secs(10);
/// How many unanswered lookups may queue up before submitters wait.
const GET_BACKLOG: usize = 999;

type Decoder = Box<dyn FnOnce(&[u8]) -> anyhow::Result<DecodedValue> + Send>;

/// One lookup in flight from a facade handle to the actor.
struct GetCmd {
    key: String,
    decode: Decoder,
    ttl: Duration,
    reply: oneshot::Sender<RawLookup>,
}

/// What the actor answers: the type-erased value plus the two flags.
struct RawLookup {
    value: Option<DecodedValue>,
    ok: bool,
    hit: bool,
}

/// The outcome of one [`SnapDb::get`].
#[derive(Debug)]
pub struct Lookup<T> {
    /// The decoded value, `Some` exactly when `ok` is true.
    pub value: Option<Arc<T>>,
    /// Whether the key was found and decoded successfully. A `false` is
    /// itself cached for one TTL, so retrying immediately will not reach
    /// the store either.
    pub ok: bool,
    /// Whether the answer came from the in-memory cache without touching
    /// the snapshot store.
    pub hit: bool,
}

/// Per-request randomization of the cache TTL, in whole seconds, within
/// `[base, base + base/10]`, so entries inserted together do not all expire
/// together.
fn jittered_ttl(base: u64) -> Duration {
    let jitter = rand::rng().random_range(0..base / 10 + 1);
    Duration::from_secs(base + jitter)
}

/// Read-only key/value lookups over periodically refreshed snapshots.
///
/// All clones address one actor task, which owns the open snapshot and the
/// value cache. Reads go through the cache; every `update_interval` the
/// published tar is downloaded again and the store is hot-swapped
/// underneath the cache. Cached entries deliberately survive a swap, so a
/// decoded value can be one snapshot stale for at most one TTL.
#[derive(Clone)]
pub struct SnapDb {
    get_tx: mpsc::Sender<GetCmd>,
    reset_tx: mpsc::Sender<()>,
    expire_tx: mpsc::Sender<()>,
    close_tx: mpsc::Sender<oneshot::Sender<()>>,
    cache_expire: u64,
}

impl std::fmt::Debug for SnapDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapDb")
            .field("cache_expire", &self.cache_expire)
            .finish_non_exhaustive()
    }
}

impl SnapDb {
    /// Downloads the initial snapshot and starts serving lookups.
    ///
    /// Fails when the initial snapshot cannot be fetched; callers decide
    /// whether to retry.
    pub async fn open(config: DbConfig) -> anyhow::Result<SnapDb> {
        let object_store = object_store::from_config(&config.storage).await?;
        let fetcher = Fetcher::new(object_store, config.save_dir.clone());
        let snapshot = fetcher
            .download()
            .await
            .context("downloading the initial snapshot")?;
        Ok(SnapDb::with_snapshot(snapshot, fetcher, config.options))
    }

    /// Starts serving lookups from an already open snapshot.
    ///
    /// `fetcher` is still used for the periodic refresh.
    pub fn with_snapshot(snapshot: Snapshot, fetcher: Fetcher, options: DbOptions) -> SnapDb {
        let (db, _) = spawn_actor(snapshot, fetcher, options);
        db
    }

    /// Looks up `key`, decoding the raw bytes with `decode` on a cache miss.
    ///
    /// Within one TTL window, repeated gets for the same key are answered
    /// from the cache, including memoized misses, and `decode` is not called
    /// again. All callers of one key must agree on `T`.
    ///
    /// Fails only when the database has been closed.
    pub async fn get<T, F>(&self, key: &str, decode: F) -> anyhow::Result<Lookup<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&[u8]) -> anyhow::Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = GetCmd {
            key: key.to_owned(),
            decode: Box::new(move |bytes| decode(bytes).map(|v| Arc::new(v) as DecodedValue)),
            ttl: jittered_ttl(self.cache_expire),
            reply: reply_tx,
        };
        self.get_tx
            .send(cmd)
            .await
            .ok()
            .context("database is closed")?;
        let raw = reply_rx
            .await
            .context("database closed while answering")?;
        let value = match raw.value {
            Some(value) if raw.ok => Some(value.downcast::<T>().map_err(|_| {
                anyhow::anyhow!("cached value for {key} was decoded to a different type")
            })?),
            _ => None,
        };
        Ok(Lookup {
            value,
            ok: raw.ok,
            hit: raw.hit,
        })
    }

    /// Empties the value cache.
    pub async fn flush_cache(&self) -> anyhow::Result<()> {
        self.reset_tx
            .send(())
            .await
            .ok()
            .context("database is closed")
    }

    /// Runs an expiration sweep now instead of waiting for the next tick.
    pub async fn expire_now(&self) -> anyhow::Result<()> {
        self.expire_tx
            .send(())
            .await
            .ok()
            .context("database is closed")
    }

    /// Closes the store, removes the snapshot directory and stops the actor.
    ///
    /// Call it once: further calls, and further gets from any clone, fail.
    pub async fn close(&self) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.close_tx
            .send(reply_tx)
            .await
            .ok()
            .context("database is already closed")?;
        reply_rx
            .await
            .context("database actor went away during close")?;
        Ok(())
    }
}

fn spawn_actor(
    snapshot: Snapshot,
    fetcher: Fetcher,
    options: DbOptions,
) -> (SnapDb, mpsc::Sender<Option<Snapshot>>) {
    let (get_tx, get_rx) = mpsc::channel(GET_BACKLOG);
    let (switching_tx, switching_rx) = mpsc::channel(1);
    let (reset_tx, reset_rx) = mpsc::channel(1);
    let (expire_tx, expire_rx) = mpsc::channel(1);
    let (close_tx, close_rx) = mpsc::channel(1);
    let db = SnapDb {
        get_tx,
        reset_tx,
        expire_tx,
        close_tx,
        cache_expire: options.cache_expire,
    };
    let actor = Actor {
        snapshot,
        cache: ValueCache::default(),
        downloading: false,
        fetcher,
        options,
        get_rx,
        switching_rx,
        switching_tx: switching_tx.clone(),
        reset_rx,
        expire_rx,
        close_rx,
    };
    tokio::spawn(actor.run());
    (db, switching_tx)
}

/// The task owning the snapshot, the cache, and the refresh state.
///
/// Everything mutable lives here, so cache mutation and handle replacement
/// are serialized without locks. Lookups into the snapshot store block this
/// task; the get backlog absorbs short stalls.
struct Actor {
    snapshot: Snapshot,
    cache: ValueCache,
    /// A refresh was spawned and its outcome has not arrived on
    /// `switching_rx` yet. Only this task touches the flag, which also
    /// means at most one refresh is ever in flight.
    downloading: bool,
    fetcher: Fetcher,
    options: DbOptions,
    get_rx: mpsc::Receiver<GetCmd>,
    switching_rx: mpsc::Receiver<Option<Snapshot>>,
    switching_tx: mpsc::Sender<Option<Snapshot>>,
    reset_rx: mpsc::Receiver<()>,
    expire_rx: mpsc::Receiver<()>,
    close_rx: mpsc::Receiver<oneshot::Sender<()>>,
}

impl Actor {
    async fn run(mut self) {
        let mut expire_tick = interval_at(Instant::now() + EXPIRE_TICK, EXPIRE_TICK);
        let update_every = Duration::from_secs(self.options.update_interval.max(1));
        let mut update_tick = interval_at(Instant::now() + update_every, update_every);
        expire_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        update_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // None from the close channel means every facade handle was dropped
        // without closing; finalize all the same so the snapshot directory
        // is not leaked.
        let reply = loop {
            tokio::select! {
                Some(cmd) = self.get_rx.recv() => self.exec_get(cmd),
                Some(outcome) = self.switching_rx.recv() => self.install(outcome).await,
                Some(()) = self.reset_rx.recv() => self.cache.flush(),
                Some(()) = self.expire_rx.recv() => self.cache.sweep(self.options.expiration_count),
                _ = expire_tick.tick() => self.cache.sweep(self.options.expiration_count),
                _ = update_tick.tick() => self.spawn_refresh(),
                request = self.close_rx.recv() => break request,
            }
        };
        self.finalize(reply).await;
    }

    fn exec_get(&mut self, cmd: GetCmd) {
        let GetCmd {
            key,
            decode,
            ttl,
            reply,
        } = cmd;
        let cached = match self.cache.get(&key) {
            Some(entry) if !entry.has_expired() => Some((entry.value.clone(), entry.ok)),
            _ => None,
        };
        let (value, ok, hit) = match cached {
            Some((value, ok)) => (value, ok, true),
            None => {
                let entry = self.load(&key, decode, ttl);
                let answer = (entry.value.clone(), entry.ok, false);
                self.cache.insert(key, entry);
                answer
            }
        };
        let _ = reply.send(RawLookup { value, ok, hit });
        if self.cache.len() > self.options.capacity {
            tracing::info!(entries = self.cache.len(), "cache over capacity, flushing");
            self.cache.flush();
        }
    }

    /// One uncached lookup: read the snapshot store, decode, memoize.
    ///
    /// Store errors and decode failures both become a memoized absent
    /// entry, so the store is left alone for this key until the TTL runs
    /// out.
    fn load(&self, key: &str, decode: Decoder, ttl: Duration) -> CachedEntry {
        let bytes = match self.snapshot.store().get(key.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CachedEntry::absent(ttl),
            Err(e) => {
                tracing::warn!("snapshot store read for {key} failed: {e:#}");
                return CachedEntry::absent(ttl);
            }
        };
        match decode(&bytes) {
            Ok(value) => CachedEntry::found(value, ttl),
            Err(e) => {
                tracing::warn!("value for {key} does not decode: {e:#}");
                CachedEntry::absent(ttl)
            }
        }
    }

    /// Starts a background snapshot download unless one is already pending.
    fn spawn_refresh(&mut self) {
        if self.downloading {
            return;
        }
        self.downloading = true;
        let fetcher = self.fetcher.clone();
        let outcome_tx = self.switching_tx.clone();
        tokio::spawn(async move {
            let outcome = fetcher.download().await;
            if let Err(unsent) = outcome_tx.send(outcome).await {
                // the actor exited while we were fetching
                if let Some(snapshot) = unsent.0 {
                    if let Err(e) = snapshot.dispose().await {
                        tracing::warn!("disposing an unwanted snapshot: {e:#}");
                    }
                }
            }
        });
    }

    /// Adopts a freshly downloaded snapshot, retiring the old one.
    ///
    /// The cache is intentionally not flushed here: entries cached against
    /// the old snapshot stay valid until their TTL runs out.
    async fn install(&mut self, outcome: Option<Snapshot>) {
        self.downloading = false;
        let Some(new) = outcome else {
            // the failure was already logged; the next update tick retries
            return;
        };
        tracing::info!("switching to the snapshot in {}", new.path().display());
        let old = std::mem::replace(&mut self.snapshot, new);
        if let Err(e) = old.dispose().await {
            tracing::warn!("retiring the previous snapshot: {e:#}");
        }
    }

    /// Closes the store, removes its directory, empties the cache and
    /// acknowledges the close request if there is one to answer.
    async fn finalize(self, reply: Option<oneshot::Sender<()>>) {
        let Actor {
            snapshot,
            mut cache,
            mut switching_rx,
            ..
        } = self;
        if let Err(e) = snapshot.dispose().await {
            tracing::warn!("disposing the snapshot on close: {e:#}");
        }
        cache.flush();
        // a refresh that completed right before the close is drained so its
        // directory does not outlive the database
        switching_rx.close();
        while let Ok(Some(unwanted)) = switching_rx.try_recv() {
            if let Err(e) = unwanted.dispose().await {
                tracing::warn!("disposing an unwanted snapshot: {e:#}");
            }
        }
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }
}
