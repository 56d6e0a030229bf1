//! Functions used in tests only

use std::path::Path;
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};

use crate::fetcher::Fetcher;
use crate::object_store::file::FileObjectStore;
use crate::store::{Snapshot, SnapshotStore};

static SETUP_LOGGING: Once = Once::new();

/// Tests calling this function get tracing output in a way compatible with
/// `cargo test`.
pub fn setup_logging() {
    SETUP_LOGGING.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .init();
    });
}

/// The record type snapshot fixtures hold, json encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Some text payload.
    pub title: String,
    /// Another text payload.
    pub url: String,
    /// A numeric payload, used to tell records apart.
    pub score: i64,
}

impl TestRecord {
    /// A record distinguishable by its score.
    pub fn numbered(score: impl Into<i64>) -> Self {
        TestRecord {
            title: "title".into(),
            url: "url".into(),
            score: score.into(),
        }
    }
}

/// The decoder most tests use.
pub fn decode_record(bytes: &[u8]) -> anyhow::Result<TestRecord> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes a store under `dir` holding `entries` as json and closes it.
pub fn write_store(dir: &Path, entries: &[(&str, TestRecord)]) {
    let db = sled::open(dir).unwrap();
    for (key, record) in entries {
        db.insert(*key, serde_json::to_vec(record).unwrap()).unwrap();
    }
    db.flush().unwrap();
}

/// Writes a store under `dir` holding `entries`, then reopens it as a
/// [`Snapshot`].
pub fn snapshot_fixture(dir: &Path, entries: &[(&str, TestRecord)]) -> Snapshot {
    write_store(dir, entries);
    let store = SnapshotStore::open(dir).unwrap();
    Snapshot::new(store, dir.to_owned())
}

/// Publishes `entries` the way the offline pipeline does: a store directory
/// packed as a flat tar at `tar_path`.
pub fn publish_tar(tar_path: &Path, entries: &[(&str, TestRecord)]) {
    let staging = tempfile::tempdir().unwrap();
    write_store(staging.path(), entries);
    let tar_file = std::fs::File::create(tar_path).unwrap();
    let mut builder = tar::Builder::new(tar_file);
    for entry in walkdir::WalkDir::new(staging.path()) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), Path::new(entry.file_name()))
                .unwrap();
        }
    }
    builder.finish().unwrap();
}

/// A fetcher whose object store never has anything to download.
pub fn dead_fetcher(save_dir: &Path) -> Fetcher {
    let missing = save_dir.join("does-not-exist.tar");
    Fetcher::new(
        Arc::new(FileObjectStore::new(&missing)),
        save_dir.to_owned(),
    )
}
