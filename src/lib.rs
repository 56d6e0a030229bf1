//! Read-only key/value lookups over snapshots published to an object store.
//!
//! The dataset is produced offline, packed into a tar archive and published
//! somewhere durable (an S3 bucket, an http endpoint, a plain file). This
//! crate downloads the published snapshot, opens it as an embedded store,
//! and serves point lookups through an in-memory TTL cache. Periodically it
//! downloads the snapshot again and hot-swaps the store underneath the
//! cache, so readers eventually observe new data without ever taking a
//! write path.
//!
//! ### Architecture
//!
//! Support for the various snapshot locations is in [object_store].
//!
//! Downloading, extracting and opening one snapshot is [fetcher::Fetcher];
//! what it produces is a [store::Snapshot].
//!
//! The cache, the open snapshot and all refresh state are owned by a single
//! actor task in [db]; [SnapDb] is the handle the rest of the world talks
//! to, over channels.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use snapdb::{DbConfig, DbOptions, SnapDb, StorageConfig};
//!
//! let db = SnapDb::open(DbConfig {
//!     save_dir: "/var/lib/myapp/snapshots".into(),
//!     storage: StorageConfig::S3 {
//!         region: "ap-northeast-1".into(),
//!         bucket: "my-snapshots".into(),
//!         path: "catalog/latest.tar".into(),
//!     },
//!     options: DbOptions::default(),
//! })
//! .await?;
//! let lookup = db
//!     .get("catalog:42", |bytes| Ok(String::from_utf8(bytes.to_vec())?))
//!     .await?;
//! if let Some(title) = lookup.value {
//!     println!("{title}");
//! }
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
mod cache;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod object_store;
pub mod store;

#[cfg(test)]
pub mod test_utils;

pub use config::{DbConfig, DbOptions, StorageConfig};
pub use db::{Lookup, SnapDb};
