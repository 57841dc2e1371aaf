//! Per-deal mutual exclusion and input hashing for staleness checks.
//!
//! A deal is locked with an advisory file lock on `.locks/<deal>.lock`, which
//! serializes threads sharing one store and separate CLI processes alike.
use crate::error::StoreResult;
use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// Content hash of an input payload.
///
/// Object keys serialize in sorted order, so equal payloads hash equally
/// regardless of how they were built.
pub fn input_hash(payload: &Value) -> StoreResult<String> {
    let bytes = serde_json::to_vec(payload).context("serialize input payload")?;
    Ok(sha256_hex(&bytes))
}

/// Exclusive hold on one deal, released when dropped.
#[derive(Debug)]
pub(crate) struct DealGuard {
    file: File,
}

impl Drop for DealGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(error = %err, "failed to unlock deal");
        }
    }
}

/// Block until the advisory lock on `.locks/<deal>.lock` is held.
///
/// Each call opens its own descriptor, so the lock excludes other threads of
/// this process as well as other processes.
pub(crate) fn lock_deal(path: &Path) -> Result<DealGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock {}", path.display()))?;
    loop {
        match file.lock() {
            Ok(()) => return Ok(DealGuard { file }),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).with_context(|| format!("lock {}", path.display())),
        }
    }
}
