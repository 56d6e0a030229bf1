//! Configuration for a snapshot-backed database.

use std::path::PathBuf;

use serde::Deserialize;

/// Where the offline pipeline publishes its tar snapshots.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// An object in an S3 bucket.
    S3 {
        /// AWS region the bucket lives in.
        region: String,
        /// Bucket name.
        bucket: String,
        /// Object key of the published snapshot.
        path: String,
    },
    /// A snapshot served over `http://` or `https://`.
    Http {
        /// Full url of the published snapshot.
        url: String,
    },
    /// A snapshot on the local filesystem.
    ///
    /// Mostly useful for tests, and for deployments where snapshots arrive
    /// by other means (rsync, a mounted share).
    File {
        /// Path of the published snapshot.
        path: PathBuf,
    },
}

/// Tuning knobs for the cache and the refresh cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbOptions {
    /// Base lifetime of a cached entry in seconds, before per-request
    /// jitter is added.
    pub cache_expire: u64,
    /// How many cache entries one expiration pass may visit.
    pub expiration_count: usize,
    /// Seconds between snapshot refresh attempts.
    pub update_interval: u64,
    /// Number of cached entries above which the whole cache is flushed.
    pub capacity: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            cache_expire: 60,
            expiration_count: 100,
            update_interval: 300,
            capacity: 100_000,
        }
    }
}

/// Everything needed to open a [`crate::SnapDb`].
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Parent directory for downloaded snapshot directories.
    pub save_dir: PathBuf,
    /// Where snapshots are published.
    pub storage: StorageConfig,
    /// Cache and refresh tuning.
    #[serde(default)]
    pub options: DbOptions,
}
