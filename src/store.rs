//! The embedded store snapshots are opened as, and its on-disk location.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Removes `path` whether it is a file or a directory tree, succeeding if
/// it does not exist. Symlinks are not followed.
pub(crate) async fn remove_path(path: &Path) -> std::io::Result<()> {
    // a stat failure flows into the same not-found tolerance as the removal
    let removed = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match removed {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// A handle on the key/value files extracted from one snapshot.
///
/// The dataset is produced offline and never written to by this process, so
/// the only operations exposed are point lookups and an orderly close.
pub struct SnapshotStore {
    db: sled::Db,
}

impl SnapshotStore {
    /// Opens the store files extracted into `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .open()
            .with_context(|| format!("opening the snapshot store in {}", path.display()))?;
        Ok(SnapshotStore { db })
    }

    /// Looks up `key`, returning `None` if the snapshot has no such key.
    ///
    /// May block briefly on disk I/O.
    pub fn get(&self, key: &[u8]) -> anyhow::Result<Option<sled::IVec>> {
        self.db.get(key).with_context(|| {
            format!(
                "reading {} from the snapshot store",
                String::from_utf8_lossy(key)
            )
        })
    }

    /// Flushes and closes the store. Its files stay behind on disk.
    pub fn close(self) -> anyhow::Result<()> {
        self.db.flush().context("flushing the snapshot store")?;
        Ok(())
    }
}

impl Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

/// An open [`SnapshotStore`] together with the directory holding its files.
///
/// Exactly one snapshot is active at a time; replacing it closes the old
/// store first and only then deletes its directory.
pub struct Snapshot {
    store: SnapshotStore,
    path: PathBuf,
}

impl Snapshot {
    /// Pairs an open store with the directory it was extracted into.
    pub fn new(store: SnapshotStore, path: PathBuf) -> Self {
        Snapshot { store, path }
    }

    /// The open store handle.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// The directory the store files were extracted into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the store, then removes its directory, in that order.
    pub async fn dispose(self) -> anyhow::Result<()> {
        let Snapshot { store, path } = self;
        tokio::task::spawn_blocking(move || store.close())
            .await
            .context("snapshot close task died")??;
        remove_path(&path)
            .await
            .with_context(|| format!("removing the snapshot directory {}", path.display()))?;
        Ok(())
    }
}

impl Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot").field("path", &self.path).finish()
    }
}
