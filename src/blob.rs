//! Date-sharded file store for full crash payloads.
//!
//! Keeps the potentially large stack trace and breadcrumb payload out of
//! the indexed store so index queries stay fast. The date-partitioned
//! layout makes retention a directory-granularity operation.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BlobError;
use crate::models::Crash;

/// Local filesystem-backed blob store rooted at a configured directory.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Creates a blob store rooted at `root`, creating the directory if
    /// it doesn't already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, BlobError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(app_id: &str, created_at: DateTime<Utc>, crash_id: &str) -> String {
        format!(
            "{}/{}/{}.json",
            app_id,
            created_at.format("%Y-%m-%d"),
            crash_id
        )
    }

    /// Writes the full crash record, returning its path relative to the
    /// store root.
    pub fn write(&self, crash: &Crash) -> Result<String, BlobError> {
        let relative = Self::relative_path(&crash.app_id, crash.created_at, &crash.id);
        let full_path = self.root.join(&relative);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(crash)?;
        fs::write(&full_path, json)?;
        set_conservative_permissions(&full_path);
        Ok(relative)
    }

    /// Reads a crash record back by its relative path.
    pub fn read(&self, relative_path: &str) -> Result<Crash, BlobError> {
        let full_path = self.resolve(relative_path)?;
        let bytes = fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound
            } else {
                BlobError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Deletes the file at `relative_path`. Succeeds silently if it's
    /// already gone, and removes any ancestor directories left empty by
    /// the deletion, stopping at the store root.
    pub fn delete(&self, relative_path: &str) -> Result<(), BlobError> {
        let full_path = self.resolve(relative_path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BlobError::Io(e)),
        }

        let mut dir = full_path.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            match fs::remove_dir(&d) {
                Ok(()) => dir = d.parent().map(Path::to_path_buf),
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Deletes every date-sharded directory, across all apps, whose
    /// `YYYY-MM-DD` name sorts before `cutoff_date`. Returns the number of
    /// files removed.
    pub fn delete_before(&self, cutoff_date: &str) -> Result<usize, BlobError> {
        let mut removed = 0;
        if !self.root.exists() {
            return Ok(0);
        }

        for app_entry in fs::read_dir(&self.root)? {
            let app_entry = app_entry?;
            if !app_entry.file_type()?.is_dir() {
                continue;
            }

            for date_entry in fs::read_dir(app_entry.path())? {
                let date_entry = date_entry?;
                if !date_entry.file_type()?.is_dir() {
                    continue;
                }
                let date_name = date_entry.file_name().to_string_lossy().to_string();
                if date_name.as_str() < cutoff_date {
                    removed += count_files(&date_entry.path())?;
                    fs::remove_dir_all(date_entry.path())?;
                }
            }
        }

        Ok(removed)
    }

    /// Deletes every date-sharded directory for one app whose name sorts
    /// before `cutoff_date`.
    pub fn delete_app_before(&self, app_id: &str, cutoff_date: &str) -> Result<usize, BlobError> {
        let app_dir = self.root.join(app_id);
        if !app_dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for date_entry in fs::read_dir(&app_dir)? {
            let date_entry = date_entry?;
            if !date_entry.file_type()?.is_dir() {
                continue;
            }
            let date_name = date_entry.file_name().to_string_lossy().to_string();
            if date_name.as_str() < cutoff_date {
                removed += count_files(&date_entry.path())?;
                fs::remove_dir_all(date_entry.path())?;
            }
        }
        Ok(removed)
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, BlobError> {
        if relative_path.is_empty() {
            return Err(BlobError::InvalidPath("empty path".to_string()));
        }
        let joined = self.root.join(relative_path);
        Ok(joined)
    }
}

fn count_files(dir: &Path) -> Result<usize, BlobError> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            count += 1;
        } else if entry.file_type()?.is_dir() {
            count += count_files(&entry.path())?;
        }
    }
    Ok(count)
}

#[cfg(unix)]
fn set_conservative_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_conservative_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_crash(app_id: &str, created_at: DateTime<Utc>) -> Crash {
        Crash {
            id: "crash-1".into(),
            app_id: app_id.into(),
            fingerprint: "fp".into(),
            group_id: "g1".into(),
            app_version: "1.0.0".into(),
            platform: "android".into(),
            os_version: None,
            device_model: None,
            error_type: "E".into(),
            error_message: "boom".into(),
            stack_trace: vec![],
            user_id: None,
            environment: "production".into(),
            metadata: HashMap::new(),
            breadcrumbs: vec![],
            blob_path: String::new(),
            created_at,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let crash = sample_crash("app1", Utc::now());

        let path = store.write(&crash).unwrap();
        assert!(path.starts_with("app1/"));
        assert!(path.ends_with("crash-1.json"));

        let read_back = store.read(&path).unwrap();
        assert_eq!(read_back.id, crash.id);
        assert_eq!(read_back.error_type, crash.error_type);
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let err = store.read("app1/2024-01-01/missing.json").unwrap_err();
        assert!(matches!(err, BlobError::NotFound));
    }

    #[test]
    fn delete_removes_file_and_empty_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let crash = sample_crash("app1", Utc::now());
        let path = store.write(&crash).unwrap();

        store.delete(&path).unwrap();
        assert!(!dir.path().join(&path).exists());
        // date directory and app directory should both be pruned
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn delete_missing_succeeds_silently() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        store.delete("app1/2024-01-01/missing.json").unwrap();
    }

    #[test]
    fn delete_before_cutoff_removes_old_partitions_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();

        let old = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let recent = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut old_crash = sample_crash("app1", old);
        old_crash.id = "old".into();
        let mut recent_crash = sample_crash("app1", recent);
        recent_crash.id = "recent".into();

        store.write(&old_crash).unwrap();
        store.write(&recent_crash).unwrap();

        let removed = store.delete_before("2024-03-01").unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("app1/2024-01-01").exists());
        assert!(dir.path().join("app1/2024-06-01").exists());
    }
}
