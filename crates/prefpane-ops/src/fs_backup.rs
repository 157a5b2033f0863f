use crate::retention::{
    auto_backup_due, backups_to_prune, day_index, format_bytes, next_backup_folder,
};
use anyhow::{Context, anyhow, bail};
use prefpane_core::backup::{BackupListener, BackupManager};
use prefpane_core::config::SETTINGS_FILENAME;
use prefpane_core::lockfile::OperationLock;
use prefpane_core::sections::backup::{
    AUTO_DIR, AUTO_EVERY_DAYS, AUTO_LAST_DAY, AUTO_RETAIN, BACKUP_PLUGINS, LAST_ERROR, LAST_TIME,
};
use prefpane_core::store::ConfigStore;
use prefpane_core::value::ParamValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

const SKIPPED_DIRS: [&str; 5] = ["cache", "tmp", "logs", "updates", "debug"];
const SKIPPED_FILES: [&str; 2] = [".lock", "operation.lock"];

/// Backs the user directory up into dated folders and restores it from
/// them.
pub struct FsBackupManager {
    store: Arc<dyn ConfigStore>,
    user_dir: PathBuf,
    lock_path: Option<PathBuf>,
}

impl FsBackupManager {
    pub fn new(store: Arc<dyn ConfigStore>, user_dir: PathBuf) -> Self {
        Self {
            store,
            user_dir,
            lock_path: None,
        }
    }

    /// Holds an exclusive lock at `path` for the duration of each backup or
    /// restore.
    pub fn with_lock(mut self, path: PathBuf) -> Self {
        self.lock_path = Some(path);
        self
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Whether the configured schedule calls for an automatic backup now.
    pub fn auto_backup_due(&self, now: OffsetDateTime) -> bool {
        auto_backup_due(
            self.store.int_or(AUTO_LAST_DAY, 0),
            self.store.int_or(AUTO_EVERY_DAYS, 1),
            day_index(now),
        )
    }

    pub fn backup_on(
        &self,
        parent: &Path,
        date: Date,
        listener: &dyn BackupListener,
    ) -> anyhow::Result<PathBuf> {
        let result = self.write_backup(parent, date, listener);
        let error = match &result {
            Ok(_) => String::new(),
            Err(err) => format!("{err:#}"),
        };
        self.store.set(
            LAST_TIME,
            ParamValue::Int(OffsetDateTime::now_utc().unix_timestamp()),
        );
        self.store.set(LAST_ERROR, ParamValue::Str(error));
        match &result {
            Ok(folder) => {
                info!(folder = %folder.display(), "Backup complete");
                listener.report_complete();
            }
            Err(err) => {
                warn!(parent = %parent.display(), error = %err, "Backup failed");
                listener.report_error(err);
            }
        }
        result
    }

    fn write_backup(
        &self,
        parent: &Path,
        date: Date,
        listener: &dyn BackupListener,
    ) -> anyhow::Result<PathBuf> {
        if !parent.is_dir() {
            bail!("Backup folder '{}' is invalid", parent.display());
        }
        let _lock = self.lock("backup")?;
        let folder = next_backup_folder(parent, date)?;
        if is_within(&folder, &self.user_dir) {
            bail!(
                "Backup folder '{}' is not permitted to be within the configuration folder '{}'",
                folder.display(),
                self.user_dir.display()
            );
        }
        progress(listener, &format!("Writing to {}", folder.display()))?;
        fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create '{}'", folder.display()))?;

        let copied = self.copy_user_entries(&folder, listener);
        if let Err(err) = copied {
            if let Err(cleanup) = fs::remove_dir_all(&folder) {
                warn!(
                    folder = %folder.display(),
                    error = %cleanup,
                    "Failed to remove partial backup"
                );
            }
            return Err(err);
        }
        Ok(folder)
    }

    fn copy_user_entries(
        &self,
        folder: &Path,
        listener: &dyn BackupListener,
    ) -> anyhow::Result<()> {
        progress(
            listener,
            &format!("Reading configuration data from {}", self.user_dir.display()),
        )?;
        let include_plugins = self.store.bool_or(BACKUP_PLUGINS, false);
        for entry in sorted_entries(&self.user_dir)? {
            let name = entry
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if entry.is_dir() {
                if SKIPPED_DIRS.contains(&name.as_str()) {
                    continue;
                }
                if name == "plugins" && !include_plugins {
                    progress(listener, "Not backing up plugins due to configuration settings")?;
                    continue;
                }
            } else if SKIPPED_FILES.contains(&name.as_str()) || name.ends_with(".log") {
                continue;
            }
            progress(listener, &format!("Copying '{name}' ..."))?;
            let (files, bytes) = copy_recursive(&entry, &folder.join(&name))?;
            let summary = if files > 1 {
                format!("{files} files, {}", format_bytes(bytes))
            } else {
                format_bytes(bytes)
            };
            progress(listener, &summary)?;
        }
        Ok(())
    }

    fn restore_from(&self, source: &Path, listener: &dyn BackupListener) -> anyhow::Result<()> {
        if !source.is_dir() || !source.join(SETTINGS_FILENAME).is_file() {
            bail!("Invalid backup: {SETTINGS_FILENAME} not found");
        }
        let _lock = self.lock("restore")?;
        progress(listener, &format!("Reading from {}", source.display()))?;
        progress(listener, "Analysing backup")?;
        fs::create_dir_all(&self.user_dir)
            .with_context(|| format!("create {}", self.user_dir.display()))?;
        for entry in sorted_entries(source)? {
            let name = entry
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress(listener, &format!("Restoring '{name}' ..."))?;
            let (_, bytes) = copy_recursive(&entry, &self.user_dir.join(&name))?;
            progress(listener, &format_bytes(bytes))?;
        }
        progress(listener, "Restore complete, restart required to apply the configuration")?;
        Ok(())
    }

    fn lock(&self, holder: &str) -> anyhow::Result<Option<OperationLock>> {
        let Some(path) = &self.lock_path else {
            return Ok(None);
        };
        match OperationLock::try_acquire(path, holder)? {
            Some(lock) => Ok(Some(lock)),
            None => {
                let current = OperationLock::holder(path).unwrap_or_else(|| "unknown".into());
                bail!("Another operation is already running ({current})")
            }
        }
    }
}

impl BackupManager for FsBackupManager {
    fn backup(&self, parent: &Path, listener: &dyn BackupListener) -> anyhow::Result<PathBuf> {
        self.backup_on(parent, OffsetDateTime::now_utc().date(), listener)
    }

    fn restore(&self, source: &Path, listener: &dyn BackupListener) -> anyhow::Result<()> {
        let result = self.restore_from(source, listener);
        match &result {
            Ok(()) => {
                info!(source = %source.display(), "Restore complete");
                listener.report_complete();
            }
            Err(err) => {
                warn!(source = %source.display(), error = %err, "Restore failed");
                listener.report_error(err);
            }
        }
        result
    }

    fn run_auto_backup(&self, listener: &dyn BackupListener) -> anyhow::Result<PathBuf> {
        let dir = self.store.string_or(AUTO_DIR, "");
        if dir.trim().is_empty() {
            let err = anyhow!("Auto backup folder is not configured");
            listener.report_error(&err);
            return Err(err);
        }
        progress(listener, &format!("Auto backup starting: folder={dir}"))?;
        let parent = PathBuf::from(dir.trim());
        let now = OffsetDateTime::now_utc();
        let folder = match self.backup_on(&parent, now.date(), listener) {
            Ok(folder) => folder,
            Err(err) => {
                let _ = listener.report_progress("Auto backup failed");
                return Err(err);
            }
        };
        self.store.set(AUTO_LAST_DAY, ParamValue::Int(day_index(now)));

        let retain = usize::try_from(self.store.int_or(AUTO_RETAIN, 1).max(1)).unwrap_or(1);
        for old in backups_to_prune(&parent, retain)? {
            progress(listener, &format!("Deleting old backup: {}", old.display()))?;
            if let Err(err) = fs::remove_dir_all(&old) {
                warn!(folder = %old.display(), error = %err, "Failed to delete old backup");
            }
        }
        Ok(folder)
    }

    fn last_backup_time(&self) -> Option<OffsetDateTime> {
        match self.store.int_or(LAST_TIME, 0) {
            0 => None,
            secs => OffsetDateTime::from_unix_timestamp(secs).ok(),
        }
    }

    fn last_backup_error(&self) -> Option<String> {
        let error = self.store.string_or(LAST_ERROR, "");
        (!error.is_empty()).then_some(error)
    }
}

fn progress(listener: &dyn BackupListener, line: &str) -> anyhow::Result<()> {
    if !listener.report_progress(line) {
        bail!("Operation abandoned by listener");
    }
    Ok(())
}

fn is_within(path: &Path, dir: &Path) -> bool {
    let canonical_dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let mut current = path
        .parent()
        .and_then(|parent| fs::canonicalize(parent).ok())
        .map(|parent| parent.join(path.file_name().unwrap_or_default()))
        .unwrap_or_else(|| path.to_path_buf());
    loop {
        if current == canonical_dir {
            return true;
        }
        if !current.pop() {
            return false;
        }
    }
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        entries.push(entry.context("read directory entry")?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Copies a file or directory tree; returns the number of files and bytes.
fn copy_recursive(source: &Path, destination: &Path) -> anyhow::Result<(u64, u64)> {
    let metadata =
        fs::metadata(source).with_context(|| format!("read metadata {}", source.display()))?;
    if metadata.is_file() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).context("create copy parent")?;
        }
        let bytes = fs::copy(source, destination)
            .with_context(|| format!("copy file {}", source.display()))?;
        return Ok((1, bytes));
    }
    fs::create_dir_all(destination)
        .with_context(|| format!("create dir {}", destination.display()))?;
    let mut totals = (0, 0);
    for entry in fs::read_dir(source).with_context(|| format!("read {}", source.display()))? {
        let entry = entry.context("read directory entry")?;
        let (files, bytes) = copy_recursive(&entry.path(), &destination.join(entry.file_name()))?;
        totals.0 += files;
        totals.1 += bytes;
    }
    Ok(totals)
}
