use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path};

pub fn write_staged_bytes(staging_root: &Path, rel_path: &str, bytes: &[u8]) -> Result<()> {
    let rel = checked_rel_path(rel_path)?;
    let staging_path = staging_root.join(rel);
    if let Some(parent) = staging_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&staging_path, bytes).with_context(|| format!("write {}", staging_path.display()))?;
    Ok(())
}

/// Move a fully written staging tree to its version directory in one rename.
///
/// The destination must not exist yet; a leftover directory from an earlier
/// crash is an error so a half-written set is never merged into a new one.
pub fn publish_version(staging_root: &Path, version_root: &Path) -> Result<()> {
    if version_root.exists() {
        return Err(anyhow!(
            "version directory already exists: {}",
            version_root.display()
        ));
    }
    if let Some(parent) = version_root.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    if !staging_root.exists() {
        fs::create_dir_all(staging_root)
            .with_context(|| format!("create {}", staging_root.display()))?;
    }
    fs::rename(staging_root, version_root).with_context(|| {
        format!(
            "publish {} -> {}",
            staging_root.display(),
            version_root.display()
        )
    })?;
    Ok(())
}

/// Replace `path` atomically: write a sibling temp file, fsync, then rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| anyhow!("persist {}: {}", path.display(), err.error))?;
    Ok(())
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).context("serialize JSON")?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Every file under `root`, sorted.
#[cfg(test)]
pub(crate) fn collect_files_recursive(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            files.extend(collect_files_recursive(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn checked_rel_path(rel_path: &str) -> Result<&Path> {
    let rel = Path::new(rel_path);
    if rel_path.is_empty() {
        return Err(anyhow!("artifact path is empty"));
    }
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(anyhow!(
            "artifact path must be relative and stay inside the version: {rel_path}"
        ));
    }
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_paths_cannot_escape_the_staging_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(write_staged_bytes(dir.path(), "../outside.md", b"x").is_err());
        assert!(write_staged_bytes(dir.path(), "/abs.md", b"x").is_err());
        assert!(write_staged_bytes(dir.path(), "", b"x").is_err());
        write_staged_bytes(dir.path(), "trade_scopes/plumber_scope.md", b"ok").expect("nested");
        assert!(dir.path().join("trade_scopes/plumber_scope.md").is_file());
    }

    #[test]
    fn publish_version_refuses_to_merge_into_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("txn/staging");
        write_staged_bytes(&staging, "a.txt", b"new").expect("stage");
        let version = dir.path().join("versions/1");
        fs::create_dir_all(&version).expect("existing version");

        assert!(publish_version(&staging, &version).is_err());
        assert!(staging.join("a.txt").is_file());
    }

    #[test]
    fn write_atomic_replaces_contents_without_leaving_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("document.json");
        write_atomic(&path, b"one").expect("first write");
        write_atomic(&path, b"two").expect("second write");
        assert_eq!(fs::read(&path).expect("read"), b"two");
        let leftovers = collect_files_recursive(dir.path()).expect("collect");
        assert_eq!(leftovers, vec![path]);
    }
}
