use anyhow::Context;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Settings file written inside the user directory and expected in backups.
pub const SETTINGS_FILENAME: &str = "settings.json";

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("com", "prefpane", "prefpane").context("resolve project dirs")
}

/// Directory holding everything the application persists (settings, state),
/// which is what backups copy and restores overwrite.
pub fn default_user_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn settings_path(user_dir: &Path) -> PathBuf {
    user_dir.join(SETTINGS_FILENAME)
}

pub fn default_journal_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("journal"))
}

/// Lock file guarding the user directory during backup and restore.
pub fn lock_path(user_dir: &Path) -> PathBuf {
    user_dir.join(".lock")
}
