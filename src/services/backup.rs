//! Configuration backup and restore.
//!
//! Backups are timestamped directories of plain file copies plus a
//! `MANIFEST.txt` listing for human inspection. Restore verifies the
//! manifest (every listed file present with the recorded size) before
//! copying anything back, and refuses to overwrite existing files unless
//! forced.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const MANIFEST_NAME: &str = "MANIFEST.txt";

/// Errors from backup and restore operations.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("backup {0} has no manifest")]
    MissingManifest(PathBuf),

    #[error("manifest line {0} is malformed")]
    MalformedManifest(usize),

    #[error("backup file {name} failed verification: {reason}")]
    Verification { name: String, reason: String },

    #[error("{0} already exists; pass --force to overwrite")]
    WouldOverwrite(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A created backup.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    /// Directory holding the copies and manifest.
    pub dir: PathBuf,
    /// Names of the files that were copied.
    pub files: Vec<String>,
}

/// Manages timestamped backups under a root directory.
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Copies the given files into a fresh `backup-YYYYMMDD-HHMMSS/`
    /// directory and writes the manifest. Missing source files are skipped
    /// with a warning; an empty file list is an error at the call site's
    /// discretion (the manifest will just be empty).
    pub fn backup(&self, files: &[PathBuf]) -> Result<BackupInfo, BackupError> {
        let dir = self
            .root
            .join(format!("backup-{}", Utc::now().format("%Y%m%d-%H%M%S")));
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let mut manifest = String::new();
        let mut copied = Vec::new();

        for source in files {
            let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %source.display(), "skipping file with unusable name");
                continue;
            };
            if !source.exists() {
                warn!(path = %source.display(), "skipping missing file");
                continue;
            }

            let dest = dir.join(name);
            fs::copy(source, &dest).map_err(io_err(&dest))?;
            let size = fs::metadata(&dest).map_err(io_err(&dest))?.len();
            manifest.push_str(&format!("{}\t{}\n", name, size));
            copied.push(name.to_string());
        }

        let manifest_path = dir.join(MANIFEST_NAME);
        fs::write(&manifest_path, &manifest).map_err(io_err(&manifest_path))?;

        info!(dir = %dir.display(), files = copied.len(), "backup created");
        Ok(BackupInfo { dir, files: copied })
    }

    /// Lists backup directories under the root, newest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, BackupError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.root)(e)),
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(is_backup_name)
                        .unwrap_or(false)
            })
            .collect();

        // Timestamped names sort chronologically; newest first.
        dirs.sort();
        dirs.reverse();
        Ok(dirs)
    }

    /// Restores a backup directory into `dest`, verifying the manifest
    /// first. Every listed file must exist in the backup with the recorded
    /// size. Existing destination files abort the restore unless `force`.
    pub fn restore(&self, backup_dir: &Path, dest: &Path, force: bool) -> Result<Vec<String>, BackupError> {
        let manifest_path = backup_dir.join(MANIFEST_NAME);
        let manifest = fs::read_to_string(&manifest_path)
            .map_err(|_| BackupError::MissingManifest(backup_dir.to_path_buf()))?;

        // Verify everything before touching the destination.
        let mut entries = Vec::new();
        for (i, line) in manifest.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (name, size) = line
                .split_once('\t')
                .ok_or(BackupError::MalformedManifest(i + 1))?;
            let size: u64 = size
                .trim()
                .parse()
                .map_err(|_| BackupError::MalformedManifest(i + 1))?;

            let source = backup_dir.join(name);
            let metadata = fs::metadata(&source).map_err(|_| BackupError::Verification {
                name: name.to_string(),
                reason: "file missing from backup".to_string(),
            })?;
            if metadata.len() != size {
                return Err(BackupError::Verification {
                    name: name.to_string(),
                    reason: format!("size {} does not match manifest {}", metadata.len(), size),
                });
            }
            entries.push((name.to_string(), source));
        }

        if !force {
            for (name, _) in &entries {
                let target = dest.join(name);
                if target.exists() {
                    return Err(BackupError::WouldOverwrite(target));
                }
            }
        }

        fs::create_dir_all(dest).map_err(io_err(dest))?;
        let mut restored = Vec::new();
        for (name, source) in entries {
            let target = dest.join(&name);
            fs::copy(&source, &target).map_err(io_err(&target))?;
            restored.push(name);
        }

        info!(
            backup = %backup_dir.display(),
            dest = %dest.display(),
            files = restored.len(),
            "backup restored"
        );
        Ok(restored)
    }
}

/// Whether a directory name matches the `backup-YYYYMMDD-HHMMSS` pattern.
fn is_backup_name(name: &str) -> bool {
    let Some(stamp) = name.strip_prefix("backup-") else {
        return false;
    };
    let bytes = stamp.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 8 { *b == b'-' } else { b.is_ascii_digit() })
}
