use crate::operation::{WorkContext, WorkError};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info};

/// Progress callbacks a backup manager reports through.
pub trait BackupListener {
    /// Returns false when nobody is listening any more; the manager should
    /// abandon the operation.
    fn report_progress(&self, line: &str) -> bool;
    fn report_complete(&self);
    fn report_error(&self, error: &anyhow::Error);
}

pub trait BackupManager: Send + Sync {
    /// Writes a new backup below `parent` and returns its folder.
    fn backup(&self, parent: &Path, listener: &dyn BackupListener) -> anyhow::Result<PathBuf>;
    fn restore(&self, source: &Path, listener: &dyn BackupListener) -> anyhow::Result<()>;
    fn run_auto_backup(&self, listener: &dyn BackupListener) -> anyhow::Result<PathBuf>;
    fn last_backup_time(&self) -> Option<OffsetDateTime>;
    fn last_backup_error(&self) -> Option<String>;
}

/// Forwards manager progress into an operation's sink. A refused line
/// (cancelled or torn-down UI) is reported back as "stop".
pub struct SinkBackupListener<'a> {
    ctx: &'a WorkContext,
    abandoned: Cell<bool>,
}

impl<'a> SinkBackupListener<'a> {
    pub fn new(ctx: &'a WorkContext) -> Self {
        Self {
            ctx,
            abandoned: Cell::new(false),
        }
    }

    pub fn was_abandoned(&self) -> bool {
        self.abandoned.get()
    }

    /// Maps the manager's result onto the work result. A manager that
    /// finished keeps its result even if cancellation arrived meanwhile.
    pub fn finish<T>(&self, result: anyhow::Result<T>) -> Result<T, WorkError> {
        match result {
            Ok(value) => Ok(value),
            Err(_) if self.was_abandoned() || self.ctx.is_cancelled() => Err(WorkError::Cancelled),
            Err(err) => Err(WorkError::Failed(err)),
        }
    }
}

impl BackupListener for SinkBackupListener<'_> {
    fn report_progress(&self, line: &str) -> bool {
        if self.abandoned.get() {
            return false;
        }
        if self.ctx.report(line).is_err() {
            self.abandoned.set(true);
            return false;
        }
        true
    }

    fn report_complete(&self) {
        debug!("Backup manager reported completion");
    }

    fn report_error(&self, error: &anyhow::Error) {
        debug!(error = %format!("{error:#}"), "Backup manager reported an error");
    }
}

pub fn run_backup_work(
    manager: Arc<dyn BackupManager>,
    parent: PathBuf,
) -> impl FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static {
    move |ctx| {
        ctx.checkpoint()?;
        let listener = SinkBackupListener::new(ctx);
        let folder = listener.finish(manager.backup(&parent, &listener))?;
        info!(folder = %folder.display(), "Backup written");
        Ok(())
    }
}

pub fn run_restore_work(
    manager: Arc<dyn BackupManager>,
    confirmed: ConfirmedRestore,
) -> impl FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static {
    move |ctx| {
        ctx.checkpoint()?;
        let listener = SinkBackupListener::new(ctx);
        listener.finish(manager.restore(&confirmed.source, &listener))
    }
}

pub fn run_auto_backup_work(
    manager: Arc<dyn BackupManager>,
) -> impl FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static {
    move |ctx| {
        ctx.checkpoint()?;
        let listener = SinkBackupListener::new(ctx);
        let folder = listener.finish(manager.run_auto_backup(&listener))?;
        info!(folder = %folder.display(), "Auto backup written");
        Ok(())
    }
}

/// A restore the user has not acknowledged yet. Only [`confirm`] yields
/// something [`run_restore_work`] accepts.
///
/// [`confirm`]: RestoreRequest::confirm
#[derive(Debug)]
pub struct RestoreRequest {
    source: PathBuf,
}

impl RestoreRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn warning(&self) -> String {
        format!(
            "Restoring from '{}' overwrites the current configuration and requires a restart. Continue?",
            self.source.display()
        )
    }

    pub fn confirm(self) -> ConfirmedRestore {
        info!(source = %self.source.display(), "Restore confirmed");
        ConfirmedRestore {
            source: self.source,
        }
    }

    pub fn decline(self) {
        info!(source = %self.source.display(), "Restore declined");
    }
}

#[derive(Debug)]
pub struct ConfirmedRestore {
    source: PathBuf,
}

impl ConfirmedRestore {
    pub fn source(&self) -> &Path {
        &self.source
    }
}
