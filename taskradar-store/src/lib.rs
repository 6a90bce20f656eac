//! taskradar-store: JSON workspace persistence, backups and calendar export/import

pub mod error;
pub mod file;
pub mod workspace;

pub use error::{StoreError, StoreResult};
pub use file::{
    ImportSummary, RepairOutcome, StorageInfo, ValidationReport, WorkspaceFile, WorkspaceLock,
};
pub use workspace::{CalendarDocument, FORMAT_VERSION, Workspace, WorkspaceDocument};
