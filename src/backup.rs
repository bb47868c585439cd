//! Pre-change configuration backups.
//!
//! Before any mutating operation with backups enabled, the executor hands
//! the device's running configuration to a [`BackupStore`]. The core only
//! ever saves; [`FsBackupStore::list`] and [`FsBackupStore::prune`] exist
//! for retention tooling.

use crate::error::{Error, Result};
use crate::inventory::{DeviceRole, DeviceTarget};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A persisted configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Device address
    pub host: String,
    /// Device role, when known
    pub role: Option<DeviceRole>,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Backup file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// SHA-256 of the content, hex encoded
    pub sha256: String,
}

/// Persistence collaborator for configuration snapshots.
pub trait BackupStore: Send + Sync {
    /// Persist `config` for `target`.
    fn save(&self, target: &DeviceTarget, config: &[String]) -> Result<BackupRecord>;
}

/// Calculate the SHA-256 checksum of configuration content.
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Make a host usable as a file name prefix.
fn file_stem(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Stores backups as `<host>_<YYYYmmdd_HHMMSS>.conf` files in one directory.
#[derive(Debug, Clone)]
pub struct FsBackupStore {
    dir: PathBuf,
}

impl FsBackupStore {
    /// Create a store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_at(
        &self,
        target: &DeviceTarget,
        config: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<BackupRecord> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::backup(
                &target.host,
                format!("cannot create {}: {}", self.dir.display(), e),
            )
        })?;

        let stem = format!("{}_{}", file_stem(&target.host), timestamp.format(TIMESTAMP_FORMAT));
        let mut path = self.dir.join(format!("{}.conf", stem));
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("{}-{}.conf", stem, suffix));
            suffix += 1;
        }

        let mut content = config.join("\n");
        content.push('\n');

        std::fs::write(&path, &content).map_err(|e| {
            Error::backup(&target.host, format!("cannot write {}: {}", path.display(), e))
        })?;

        let record = BackupRecord {
            host: target.host.clone(),
            role: Some(target.role),
            timestamp,
            size: content.len() as u64,
            sha256: checksum(&content),
            path,
        };
        info!(
            host = %record.host,
            path = %record.path.display(),
            size = record.size,
            "Configuration backup written"
        );
        Ok(record)
    }

    /// Backups of `host`, oldest first.
    pub fn list(&self, host: &str) -> Result<Vec<BackupRecord>> {
        let prefix = format!("{}_", file_stem(host));
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(rest) = name
                .strip_prefix(&prefix)
                .and_then(|r| r.strip_suffix(".conf"))
            else {
                continue;
            };
            // Tolerate the `-N` collision suffix
            let stamp = rest.split('-').next().unwrap_or(rest);
            let Ok(naive) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) else {
                continue;
            };

            let content = std::fs::read(&path)?;
            records.push(BackupRecord {
                host: host.to_string(),
                role: None,
                timestamp: Utc.from_utc_datetime(&naive),
                size: content.len() as u64,
                sha256: checksum(&String::from_utf8_lossy(&content)),
                path,
            });
        }

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.path.cmp(&b.path)));
        Ok(records)
    }

    /// Delete all but the newest `keep` backups of `host`. Returns removed paths.
    pub fn prune(&self, host: &str, keep: usize) -> Result<Vec<PathBuf>> {
        let records = self.list(host)?;
        let excess = records.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for record in records.into_iter().take(excess) {
            std::fs::remove_file(&record.path)?;
            debug!(path = %record.path.display(), "Pruned backup");
            removed.push(record.path);
        }
        Ok(removed)
    }
}

impl BackupStore for FsBackupStore {
    fn save(&self, target: &DeviceTarget, config: &[String]) -> Result<BackupRecord> {
        self.save_at(target, config, Utc::now())
    }
}
