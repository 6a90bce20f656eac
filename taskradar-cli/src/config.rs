use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use chrono_tz::Tz;
use taskradar_core::time::parse_timezone;

use crate::state::ensure_taskradar_home;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub budget: BudgetSection,
    pub calendar: CalendarSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// Total for days that have no budget yet.
    pub daily_coins: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    /// IANA zone used for parsing times and for day/week/month views.
    pub timezone: String,
    /// Reject overlaps on edit too, not only on add.
    pub strict_update_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub workspace_file: String,
    pub backups_to_keep: usize,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_coins: taskradar_core::budget::DEFAULT_DAILY_COINS,
        }
    }
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            strict_update_conflicts: false,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            workspace_file: taskradar_store::file::DEFAULT_FILE_NAME.to_string(),
            backups_to_keep: taskradar_store::file::DEFAULT_BACKUPS_TO_KEEP,
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.calendar.timezone).context("calendar.timezone in config.toml")
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_taskradar_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
