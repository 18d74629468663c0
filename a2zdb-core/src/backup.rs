// src/backup.rs
// Archive-based backup and restore of database directories

use crate::error::{A2zError, Result};
use crate::logging::log_operation;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Creates, restores and lists zip snapshots of database directories.
/// Archives are named `<db>_<YYYYMMDD_HHMMSS>.zip` and rooted at the
/// database name, so extracting at the db root reconstructs `<root>/<db>/`.
pub struct BackupManager {
    backup_dir: PathBuf,
}

/// One listed backup archive
#[derive(Debug, Clone, PartialEq)]
pub struct BackupInfo {
    pub db_name: String,
    pub timestamp: String,
    pub path: PathBuf,
    pub size: u64,
}

impl BackupManager {
    pub fn new(backup_dir: PathBuf) -> Result<BackupManager> {
        std::fs::create_dir_all(&backup_dir)?;
        Ok(BackupManager { backup_dir })
    }

    /// Zip every file under `<root>/<db_name>` into a timestamped archive
    pub fn create_backup(&self, root: &Path, db_name: &str) -> Result<PathBuf> {
        let db_path = root.join(db_name);
        if !db_path.exists() {
            log_operation(
                "BACKUP_CREATE",
                &format!("db:{db_name}"),
                "FAILED",
                "database not found",
            );
            return Err(A2zError::DatabaseNotFound(db_name.to_string()));
        }

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = self.backup_dir.join(format!("{db_name}_{timestamp}.zip"));

        let result = self.write_archive(&db_path, db_name, &backup_path);
        match &result {
            Ok(()) => log_operation(
                "BACKUP_CREATE",
                &format!("db:{db_name}"),
                "SUCCESS",
                &format!("path:{}", backup_path.display()),
            ),
            Err(e) => log_operation(
                "BACKUP_CREATE",
                &format!("db:{db_name}"),
                "FAILED",
                &e.to_string(),
            ),
        }
        result.map(|()| backup_path)
    }

    fn write_archive(&self, db_path: &Path, db_name: &str, backup_path: &Path) -> Result<()> {
        let file = File::create(backup_path)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut files = Vec::new();
        collect_files(db_path, &mut files)?;
        for path in files {
            let relative = path
                .strip_prefix(db_path)
                .map_err(|_| A2zError::Validation("backup path escaped database directory".to_string()))?;
            // Entries rooted at the database name: "<db>/<collection>.json"
            let entry_name = Path::new(db_name)
                .join(relative)
                .to_string_lossy()
                .replace('\\', "/");

            zip.start_file(entry_name, options)?;
            let mut contents = Vec::new();
            File::open(&path)?.read_to_end(&mut contents)?;
            zip.write_all(&contents)?;
        }
        zip.finish()?;
        Ok(())
    }

    /// Restore the newest `<name>_*.zip` archive. `target` defaults to the
    /// archived database name; the target directory is wiped first and the
    /// archive extracted at the db root.
    pub fn restore_backup(&self, root: &Path, name: &str, target: Option<&str>) -> Result<String> {
        let target = target.unwrap_or(name);
        let backup_path = self.latest_backup(name)?;

        let db_path = root.join(target);
        if db_path.exists() {
            std::fs::remove_dir_all(&db_path)?;
        }
        std::fs::create_dir_all(&db_path)?;

        let mut archive = ZipArchive::new(File::open(&backup_path)?)?;
        archive.extract(root)?;

        log_operation(
            "BACKUP_RESTORE",
            &format!("db:{target}"),
            "SUCCESS",
            &format!("path:{}", backup_path.display()),
        );
        Ok(format!(
            "Restored database '{target}' from '{}'",
            backup_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        ))
    }

    /// Newest matching archive by modification time
    fn latest_backup(&self, name: &str) -> Result<PathBuf> {
        let prefix = format!("{name}_");
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !file_name.starts_with(&prefix) || !file_name.ends_with(".zip") {
                continue;
            }
            let modified = std::fs::metadata(&path)?.modified()?;
            if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                newest = Some((modified, path));
            }
        }
        newest
            .map(|(_, path)| path)
            .ok_or_else(|| A2zError::BackupNotFound(name.to_string()))
    }

    /// All archives, optionally filtered by database name, newest first
    pub fn list_backups(&self, db_name: Option<&str>) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let stem = match (path.extension().and_then(|e| e.to_str()), path.file_stem()) {
                (Some("zip"), Some(stem)) => stem.to_string_lossy().to_string(),
                _ => continue,
            };

            // <db>_<YYYYMMDD>_<HHMMSS>; db names may contain underscores, so
            // split from the right
            let mut parts = stem.rsplitn(3, '_');
            let (time, date, name) = match (parts.next(), parts.next(), parts.next()) {
                (Some(time), Some(date), Some(name)) => (time, date, name),
                _ => continue,
            };
            if let Some(filter) = db_name {
                if name != filter {
                    continue;
                }
            }
            backups.push(BackupInfo {
                db_name: name.to_string(),
                timestamp: format!("{date}_{time}"),
                path: path.clone(),
                size: std::fs::metadata(&path)?.len(),
            });
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Listing as JSON rows (surface/info panel format)
    pub fn list_backups_json(&self, db_name: Option<&str>) -> Result<Vec<Value>> {
        Ok(self
            .list_backups(db_name)?
            .into_iter()
            .map(|b| {
                json!({
                    "db_name": b.db_name,
                    "timestamp": b.timestamp,
                    "path": b.path.to_string_lossy(),
                    "size": b.size,
                })
            })
            .collect())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    out.sort();
    Ok(())
}
