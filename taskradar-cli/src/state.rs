use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::PathBuf;

use taskradar_store::{Workspace, WorkspaceFile, WorkspaceLock};

use crate::config::{Config, load_config};

/// `$TASKRADAR_HOME`, else `~/.taskradar`.
pub fn taskradar_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TASKRADAR_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".taskradar"))
}

pub fn ensure_taskradar_home() -> Result<PathBuf> {
    let dir = taskradar_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn workspace_file(cfg: &Config) -> Result<WorkspaceFile> {
    let dir = ensure_taskradar_home()?;
    Ok(WorkspaceFile::open(&dir)
        .with_context(|| format!("open workspace in {}", dir.display()))?
        .with_file_name(cfg.storage.workspace_file.clone())
        .with_backups_to_keep(cfg.storage.backups_to_keep))
}

/// Config plus the loaded workspace, for one command invocation.
///
/// Holds the workspace writer lock from `open` until dropped, so concurrent
/// invocations run their load, mutate and save one after another.
pub struct Session {
    pub config: Config,
    pub tz: Tz,
    pub file: WorkspaceFile,
    pub workspace: Workspace,
    pub now: DateTime<Utc>,
    lock: WorkspaceLock,
}

impl Session {
    pub fn open() -> Result<Self> {
        let config = load_config()?;
        let tz = config.timezone()?;
        let file = workspace_file(&config)?;
        let lock = file
            .lock()
            .with_context(|| format!("lock {}", file.path().display()))?;
        let mut workspace = file
            .load()
            .with_context(|| format!("load {} (try: taskradar storage repair)", file.path().display()))?;

        workspace.budgets.set_default_total(config.budget.daily_coins);
        workspace.calendar = std::mem::take(&mut workspace.calendar)
            .with_strict_update_conflicts(config.calendar.strict_update_conflicts);
        tracing::debug!(
            path = %file.path().display(),
            timezone = %tz,
            strict_update_conflicts = config.calendar.strict_update_conflicts,
            "session opened"
        );

        Ok(Self {
            config,
            tz,
            file,
            workspace,
            now: Utc::now(),
            lock,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.file
            .save(&self.lock, &self.workspace, self.now)
            .with_context(|| format!("save {}", self.file.path().display()))
    }
}
