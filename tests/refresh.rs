//! End to end through the public API: bootstrap from a published snapshot,
//! serve reads, pick up a newly published snapshot, shut down.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snapdb::{DbConfig, DbOptions, SnapDb, StorageConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    title: String,
    url: String,
    score: i64,
}

fn record(score: i64) -> Record {
    Record {
        title: "title".into(),
        url: "url".into(),
        score,
    }
}

fn decode_record(bytes: &[u8]) -> anyhow::Result<Record> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Publishes `entries` the way the offline pipeline does: a store directory
/// packed as a flat tar at `tar_path`.
fn publish_snapshot(tar_path: &Path, entries: &[(&str, Record)]) {
    let staging = tempfile::tempdir().unwrap();
    let db = sled::open(staging.path()).unwrap();
    for (key, value) in entries {
        db.insert(*key, serde_json::to_vec(value).unwrap()).unwrap();
    }
    db.flush().unwrap();
    drop(db);

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

/// Snapshot directories (and stray tars) currently under `save_dir`.
fn entries_under(save_dir: &Path) -> usize {
    match std::fs::read_dir(save_dir) {
        Err(_) => 0,
        Ok(listing) => listing.count(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_cycle() {
    let t = tempfile::tempdir().unwrap();
    let published = t.path().join("published.tar");
    publish_snapshot(&published, &[("testdata:1", record(1))]);

    let save_dir = t.path().join("snapshots");
    let db = SnapDb::open(DbConfig {
        save_dir: save_dir.clone(),
        storage: StorageConfig::File {
            path: published.clone(),
        },
        options: DbOptions {
            cache_expire: 1,
            update_interval: 1,
            ..DbOptions::default()
        },
    })
    .await
    .unwrap();

    let first = db.get("testdata:1", decode_record).await.unwrap();
    assert!(first.ok);
    assert!(!first.hit);
    assert_eq!(*first.value.unwrap(), record(1));
    let second = db.get("testdata:1", decode_record).await.unwrap();
    assert!(second.hit);

    // publish a replacement and wait out a refresh tick plus the TTL
    publish_snapshot(
        &published,
        &[("testdata:1", record(2)), ("testdata:2", record(3))],
    );
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // a key the old snapshot never had is served from the new one
    let fresh = db.get("testdata:2", decode_record).await.unwrap();
    assert!(fresh.ok);
    assert_eq!(*fresh.value.unwrap(), record(3));
    // the old entry's TTL has passed, so the new snapshot shows through
    let replaced = db.get("testdata:1", decode_record).await.unwrap();
    assert!(!replaced.hit);
    assert_eq!(*replaced.value.unwrap(), record(2));

    // retired snapshot directories are deleted as new ones are adopted; a
    // refresh caught in flight may account for one extra directory and tar
    assert!(entries_under(&save_dir) <= 3);

    db.close().await.unwrap();
    // a refresh caught mid-flight disposes of its download once it notices
    // the database is gone
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(entries_under(&save_dir), 0);

    db.get("testdata:1", decode_record).await.unwrap_err();
    db.close().await.unwrap_err();
}

#[tokio::test]
async fn bootstrap_failure_is_an_error() {
    let t = tempfile::tempdir().unwrap();
    SnapDb::open(DbConfig {
        save_dir: t.path().join("snapshots"),
        storage: StorageConfig::File {
            path: t.path().join("never-published.tar"),
        },
        options: DbOptions::default(),
    })
    .await
    .unwrap_err();
}
