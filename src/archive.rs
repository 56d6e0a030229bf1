//! Extraction of tar snapshots.

use std::path::Path;

use anyhow::Context;

/// Extracts every regular file of the tar archive at `tar_path` directly
/// into `into`, which is created if needed.
///
/// The directory structure inside the archive is flattened: an entry named
/// `a/b/data.file` is written to `into/data.file`. Snapshot archives are
/// produced with every store file at a unique basename, and the store opens
/// the flat directory; both sides of the pipeline rely on this layout.
/// Directory entries and non-regular entries (symlinks, devices) are
/// silently skipped.
///
/// All written files are closed by the time this function returns.
pub async fn unpack_flat(tar_path: &Path, into: &Path) -> anyhow::Result<()> {
    let tar_path = tar_path.to_owned();
    let into = into.to_owned();
    tokio::task::spawn_blocking(move || unpack_flat_sync(&tar_path, &into))
        .await
        .context("tar extraction task died")?
}

fn unpack_flat_sync(tar_path: &Path, into: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(tar_path)
        .with_context(|| format!("opening {}", tar_path.display()))?;
    std::fs::create_dir_all(into).with_context(|| format!("creating {}", into.display()))?;
    let mut archive = tar::Archive::new(file);
    let entries = archive
        .entries()
        .with_context(|| format!("reading {} as a tar archive", tar_path.display()))?;
    for entry in entries {
        let mut entry =
            entry.with_context(|| format!("reading an entry of {}", tar_path.display()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().context("tar entry has an unusable name")?;
        let Some(name) = path.file_name().map(ToOwned::to_owned) else {
            continue;
        };
        let target = into.join(name);
        let mut out = std::fs::File::create(&target)
            .with_context(|| format!("creating {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("writing {}", target.display()))?;
    }
    Ok(())
}
