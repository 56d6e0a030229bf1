//! Downloading a published snapshot and opening it as a store.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use anyhow::Context;
use uuid::Uuid;

use crate::archive::unpack_flat;
use crate::object_store::SharedObjectStore;
use crate::store::{remove_path, Snapshot, SnapshotStore};

/// Fetches tar snapshots from an object store and opens them.
///
/// Stateless apart from its configuration: safe to call from any task, and
/// cheap to clone into background refresh tasks. Each fetch works under a
/// freshly named directory, so concurrent fetches cannot collide.
#[derive(Clone)]
pub struct Fetcher {
    object_store: SharedObjectStore,
    save_dir: PathBuf,
}

impl Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("save_dir", &self.save_dir)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// A fetcher placing snapshot directories under `save_dir`.
    pub fn new(object_store: SharedObjectStore, save_dir: PathBuf) -> Self {
        Fetcher {
            object_store,
            save_dir,
        }
    }

    /// Downloads the published snapshot and opens it.
    ///
    /// Returns `None` on any failure (download, extraction, store open).
    /// The failure is logged, and neither the tar nor a half-extracted
    /// directory is left behind.
    pub async fn download(&self) -> Option<Snapshot> {
        match self.try_download().await {
            Ok(snapshot) => {
                tracing::info!("downloaded a snapshot into {}", snapshot.path().display());
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!("snapshot download failed: {e:#}");
                None
            }
        }
    }

    async fn try_download(&self) -> anyhow::Result<Snapshot> {
        tokio::fs::create_dir_all(&self.save_dir)
            .await
            .with_context(|| format!("creating {}", self.save_dir.display()))?;
        let name = Uuid::new_v4().to_string();
        let dir = self.save_dir.join(&name);
        let tar = self.save_dir.join(format!("{name}.tar"));
        let result = self.fetch_and_open(&dir, &tar).await;
        // the tar is only an intermediate; the directory survives on success
        if let Err(e) = remove_path(&tar).await {
            tracing::warn!("leaving {} behind: {e}", tar.display());
        }
        if result.is_err() {
            if let Err(e) = remove_path(&dir).await {
                tracing::warn!("leaving {} behind: {e}", dir.display());
            }
        }
        result
    }

    async fn fetch_and_open(&self, dir: &Path, tar: &Path) -> anyhow::Result<Snapshot> {
        self.object_store
            .download_object(tar)
            .await
            .context("downloading the snapshot")?;
        unpack_flat(tar, dir).await.context("extracting the snapshot")?;
        let to_open = dir.to_owned();
        let store = tokio::task::spawn_blocking(move || SnapshotStore::open(&to_open))
            .await
            .context("store open task died")??;
        Ok(Snapshot::new(store, dir.to_owned()))
    }
}
