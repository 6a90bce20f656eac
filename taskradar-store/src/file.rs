//! JSON workspace file with rotating backups.
//!
//! Layout under the workspace directory:
//!
//! ```text
//! workspace.json
//! backups/workspace_backup_20260504_120000.json
//! ```
//!
//! Writers serialize on an exclusive lock on `.workspace.json.lock`, held
//! from load through save. Writes go to a uniquely named temp file in the
//! same directory and are renamed into place, so readers never see a partial
//! document. Backups are best-effort: a failed copy or rotation is logged and
//! the save carries on.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use taskradar_core::{Calendar, CoreResult, TaskGraph};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::workspace::{
    CalendarDocument, FORMAT_VERSION, Workspace, WorkspaceDocument, check_version,
};

pub const DEFAULT_FILE_NAME: &str = "workspace.json";
pub const DEFAULT_BACKUPS_TO_KEEP: usize = 10;

const BACKUP_DIR: &str = "backups";
const BACKUP_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct WorkspaceFile {
    dir: PathBuf,
    file_name: String,
    backups_to_keep: usize,
}

/// Exclusive writer lock on one workspace file. Released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "could not release workspace lock");
        }
    }
}

/// Problems found by [`WorkspaceFile::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    AlreadyValid,
    Restored { from: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub backup_dir: PathBuf,
    pub backup_count: usize,
}

impl WorkspaceFile {
    /// Use `dir` (created if missing) with the default file name.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            file_name: DEFAULT_FILE_NAME.to_string(),
            backups_to_keep: DEFAULT_BACKUPS_TO_KEEP,
        })
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_backups_to_keep(mut self, keep: usize) -> Self {
        self.backups_to_keep = keep;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.lock", self.file_name))
    }

    /// Block until this handle holds the writer lock.
    pub fn lock(&self) -> StoreResult<WorkspaceLock> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.lock_exclusive().map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "workspace lock acquired");
        Ok(WorkspaceLock { file, path })
    }

    fn check_lock(&self, lock: &WorkspaceLock) -> StoreResult<()> {
        if lock.path != self.lock_path() {
            return Err(StoreError::ForeignLock(lock.path.clone()));
        }
        Ok(())
    }

    /// Load, apply `f` and save under one writer lock. Nothing is written
    /// when `f` fails.
    pub fn update<T>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Workspace) -> CoreResult<T>,
    ) -> StoreResult<T> {
        let lock = self.lock()?;
        let mut workspace = self.load()?;
        let out = f(&mut workspace)?;
        self.save(&lock, &workspace, now)?;
        Ok(out)
    }

    /// A missing file is an empty workspace.
    pub fn load(&self) -> StoreResult<Workspace> {
        let path = self.path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no workspace file yet, starting empty");
            return Ok(Workspace::default());
        }
        let doc = read_document(&path)?;
        let workspace = Workspace::from_document(doc)?;
        tracing::info!(
            path = %path.display(),
            tasks = workspace.graph.len(),
            events = workspace.calendar.event_count(),
            "workspace loaded"
        );
        Ok(workspace)
    }

    /// Write `workspace`, backing up the previous file first. The caller must
    /// hold this file's lock, normally since the matching `load`.
    pub fn save(&self, lock: &WorkspaceLock, workspace: &Workspace, now: DateTime<Utc>) -> StoreResult<()> {
        self.check_lock(lock)?;
        let path = self.path();
        if path.exists() {
            self.backup_best_effort(&path, now);
        }
        write_json_atomic(&path, &workspace.to_document(now))?;
        tracing::info!(path = %path.display(), "workspace saved");
        Ok(())
    }

    fn backup_best_effort(&self, path: &Path, now: DateTime<Utc>) {
        let dir = self.backup_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "could not create backup dir");
            return;
        }
        let target = dir.join(format!(
            "{}{}.json",
            self.backup_prefix(),
            now.format(BACKUP_TIMESTAMP)
        ));
        if let Err(e) = fs::copy(path, &target) {
            tracing::warn!(target = %target.display(), error = %e, "backup failed");
            return;
        }
        tracing::debug!(target = %target.display(), "backup written");

        for stale in self.backups().into_iter().skip(self.backups_to_keep) {
            if let Err(e) = fs::remove_file(&stale) {
                tracing::warn!(path = %stale.display(), error = %e, "could not remove old backup");
            }
        }
    }

    fn backup_prefix(&self) -> String {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workspace");
        format!("{stem}_backup_")
    }

    /// Backup files, newest first. Unreadable dirs yield nothing.
    pub fn backups(&self) -> Vec<PathBuf> {
        let prefix = self.backup_prefix();
        let Ok(entries) = fs::read_dir(self.backup_dir()) else {
            return Vec::new();
        };
        let mut out: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
            })
            .collect();
        // Timestamps sort lexically.
        out.sort();
        out.reverse();
        out
    }

    pub fn export_calendar(&self, calendar: &Calendar, target: &Path, now: DateTime<Utc>) -> StoreResult<usize> {
        let doc = CalendarDocument {
            version: FORMAT_VERSION.to_string(),
            exported_at: now,
            events: calendar.all_events().into_iter().cloned().collect(),
        };
        write_json_atomic(target, &doc)?;
        tracing::info!(target = %target.display(), events = doc.events.len(), "calendar exported");
        Ok(doc.events.len())
    }

    /// Re-add every event through the calendar's own checks. Invalid events
    /// are skipped. Into an empty calendar the export is restored as it was,
    /// overlaps included; otherwise events overlapping existing ones are skipped.
    pub fn import_calendar(&self, calendar: &mut Calendar, source: &Path) -> StoreResult<ImportSummary> {
        let text = fs::read_to_string(source).map_err(|e| StoreError::io(source, e))?;
        let doc: CalendarDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::json(source, e))?;
        check_version(&doc.version)?;

        let keep_overlaps = calendar.event_count() == 0;
        let mut summary = ImportSummary::default();
        for event in doc.events {
            let id = event.id.clone();
            let restored = if keep_overlaps {
                calendar.insert_stored(event)
            } else {
                calendar.restore_event(event)
            };
            match restored {
                Ok(_) => summary.imported += 1,
                Err(e) => {
                    tracing::warn!(event_id = %id, error = %e, "skipping imported event");
                    summary.skipped += 1;
                }
            }
        }
        tracing::info!(imported = summary.imported, skipped = summary.skipped, "calendar imported");
        Ok(summary)
    }

    pub fn validate(&self) -> StoreResult<ValidationReport> {
        let path = self.path();
        if !path.exists() {
            return Ok(ValidationReport::default());
        }
        Ok(validate_path(&path))
    }

    /// Restore the newest backup that validates, if the live file does not.
    pub fn repair(&self) -> StoreResult<RepairOutcome> {
        let _lock = self.lock()?;
        if self.validate()?.is_valid() {
            return Ok(RepairOutcome::AlreadyValid);
        }

        let path = self.path();
        for backup in self.backups() {
            let report = validate_path(&backup);
            if !report.is_valid() {
                tracing::debug!(backup = %backup.display(), issues = report.issues.len(), "backup unusable");
                continue;
            }
            let tmp = temp_beside(&path)?;
            fs::copy(&backup, tmp.path()).map_err(|e| StoreError::io(tmp.path(), e))?;
            tmp.persist(&path).map_err(|e| StoreError::io(&path, e.error))?;
            tracing::info!(from = %backup.display(), "workspace restored from backup");
            return Ok(RepairOutcome::Restored { from: backup });
        }

        Err(StoreError::NoBackup(self.backup_dir()))
    }

    pub fn storage_info(&self) -> StoreResult<StorageInfo> {
        let path = self.path();
        let (exists, size_bytes, modified) = match fs::metadata(&path) {
            Ok(meta) => (
                true,
                meta.len(),
                meta.modified().ok().map(DateTime::<Utc>::from),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (false, 0, None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        Ok(StorageInfo {
            path,
            exists,
            size_bytes,
            modified,
            backup_dir: self.backup_dir(),
            backup_count: self.backups().len(),
        })
    }
}

fn read_document(path: &Path) -> StoreResult<WorkspaceDocument> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))
}

fn validate_path(path: &Path) -> ValidationReport {
    let doc = match read_document(path) {
        Ok(doc) => doc,
        Err(e) => {
            return ValidationReport {
                issues: vec![e.to_string()],
            };
        }
    };
    validate_document(doc)
}

/// Structural checks, collecting every problem rather than stopping at the first.
fn validate_document(doc: WorkspaceDocument) -> ValidationReport {
    let mut issues = Vec::new();

    if let Err(e) = check_version(&doc.version) {
        issues.push(e.to_string());
    }

    let mut seen = HashSet::new();
    for event in &doc.events {
        if event.id.is_empty() {
            issues.push(format!("event '{}' has no id", event.title));
        } else if !seen.insert(event.id.as_str()) {
            issues.push(format!("duplicate event id {}", event.id));
        }
        if let Err(e) = event.validate() {
            issues.push(format!("event {}: {e}", event.id));
        }
    }

    if let Err(e) = TaskGraph::from_snapshot(doc.tasks) {
        issues.push(format!("tasks: {e}"));
    }

    ValidationReport { issues }
}

/// Uniquely named temp file in `path`'s directory, so the final rename
/// stays on one filesystem.
fn temp_beside(path: &Path) -> StoreResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    let mut tmp = temp_beside(path)?;
    tmp.write_all(&json).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use taskradar_core::{Event, NewTask};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let ws = file.load().unwrap();
        assert!(ws.graph.is_empty());
        assert!(file.validate().unwrap().is_valid());
        assert!(!file.storage_info().unwrap().exists);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let mut ws = Workspace::default();
        ws.graph.create_task(NewTask::new("a"), now()).unwrap();
        let lock = file.lock().unwrap();
        file.save(&lock, &ws, now()).unwrap();
        file.save(&lock, &ws, now()).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![".workspace.json.lock", "backups", "workspace.json"]);
        assert_eq!(file.load().unwrap().graph.len(), 1);
    }

    #[test]
    fn save_refuses_another_files_lock() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let other = WorkspaceFile::open(dir.path()).unwrap().with_file_name("other.json");
        let lock = other.lock().unwrap();
        assert!(matches!(
            file.save(&lock, &Workspace::default(), now()),
            Err(StoreError::ForeignLock(_))
        ));
        assert!(!file.path().exists());
    }

    #[test]
    fn update_writes_nothing_when_the_closure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let id = file
            .update(now(), |ws| ws.graph.create_task(NewTask::new("a"), now()).map(|t| t.id))
            .unwrap();

        let err = file.update(now(), |ws| {
            ws.graph.create_task(NewTask::new("b"), now())?;
            ws.graph.add_prerequisite(id, id)
        });
        assert!(matches!(err, Err(StoreError::Core(_))));
        assert_eq!(file.load().unwrap().graph.len(), 1);
    }

    #[test]
    fn backups_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap().with_backups_to_keep(2);
        let ws = Workspace::default();

        // The first save has nothing to back up.
        let lock = file.lock().unwrap();
        for i in 0..4 {
            file.save(&lock, &ws, now() + Duration::seconds(i)).unwrap();
        }
        let backups = file.backups();
        assert_eq!(backups.len(), 2);
        let newest = backups[0].file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(newest, "workspace_backup_20260504_120003.json");
        assert_eq!(file.storage_info().unwrap().backup_count, 2);
    }

    #[test]
    fn backup_failure_does_not_fail_save() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let lock = file.lock().unwrap();
        file.save(&lock, &Workspace::default(), now()).unwrap();

        // A plain file where the backup dir should be.
        fs::write(file.backup_dir(), "in the way").unwrap();
        file.save(&lock, &Workspace::default(), now()).unwrap();
        assert!(file.backups().is_empty());
    }

    #[test]
    fn validate_reports_bad_events() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        let mut doc = Workspace::default().to_document(now());
        let mut bad = Event::new("", now(), now() - Duration::hours(1));
        bad.id = "x".into();
        doc.events.push(bad.clone());
        doc.events.push(bad);
        write_json_atomic(&file.path(), &doc).unwrap();

        let report = file.validate().unwrap();
        assert!(!report.is_valid());
        assert!(report.issues.iter().any(|i| i.contains("duplicate event id x")));
        assert!(file.load().is_err());
    }

    #[test]
    fn repair_without_backups_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = WorkspaceFile::open(dir.path()).unwrap();
        fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(file.repair(), Err(StoreError::NoBackup(_))));
    }
}
