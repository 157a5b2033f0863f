use super::{ConfigSection, wire};
use crate::backup::{
    BackupManager, ConfirmedRestore, RestoreRequest, run_auto_backup_work, run_backup_work,
    run_restore_work,
};
use crate::dependency::{CyclicDependencyError, DependencyEdge, DependencyEngine, HeadlessControl};
use crate::dispatch::UiDispatcher;
use crate::journal::OperationJournal;
use crate::operation::{OperationController, OperationError, OperationKind, OperationOutcome};
use crate::parameter::{Parameter, ParameterSet};
use crate::progress::ProgressSink;
use crate::store::ConfigStore;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

pub const AUTO_ENABLE: &str = "br.backup.auto.enable";
pub const AUTO_DIR: &str = "br.backup.auto.dir";
pub const AUTO_EVERY_DAYS: &str = "br.backup.auto.everydays";
pub const AUTO_RETAIN: &str = "br.backup.auto.retain";
pub const NOTIFY: &str = "br.backup.notify";
pub const FOLDER_DEFAULT: &str = "br.backup.folder.default";
pub const BACKUP_PLUGINS: &str = "br.backup.plugins";
pub const LAST_TIME: &str = "br.backup.last.time";
pub const LAST_ERROR: &str = "br.backup.last.error";
pub const AUTO_LAST_DAY: &str = "br.backup.auto.last_backup_day";

pub struct BackupSection {
    params: ParameterSet,
    engine: DependencyEngine,
    auto_dir: Parameter,
    folder_default: Parameter,
    backup_now: Rc<HeadlessControl>,
    manager: Arc<dyn BackupManager>,
    dispatcher: Arc<dyn UiDispatcher>,
    journal: Option<OperationJournal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackupStatus {
    pub last_time: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl BackupStatus {
    pub fn last_time_text(&self) -> String {
        self.last_time
            .and_then(|time| time.format(&Rfc3339).ok())
            .unwrap_or_else(|| "never".to_string())
    }
}

impl BackupSection {
    pub fn build(
        store: Arc<dyn ConfigStore>,
        manager: Arc<dyn BackupManager>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> Result<Self, CyclicDependencyError> {
        let mut params = ParameterSet::new(store);
        let folder_default = params.string(FOLDER_DEFAULT, "");
        let auto_enable = params.boolean(AUTO_ENABLE, false);
        let auto_dir = params.string(AUTO_DIR, "");
        let every_days = params.int(AUTO_EVERY_DAYS, 1, 1, i64::from(i32::MAX));
        let retain = params.int(AUTO_RETAIN, 1, 1, i64::from(i32::MAX));
        let notify = params.boolean(NOTIFY, true);
        let backup_now = HeadlessControl::new("br.backup.auto.now");

        if auto_dir.text().is_empty() {
            let seed = folder_default.text();
            if !seed.is_empty()
                && let Err(err) = auto_dir.set_text(&seed)
            {
                warn!(error = %err, "Failed to seed auto backup folder");
            }
        }

        let engine = DependencyEngine::new();
        wire(
            &engine,
            [DependencyEdge::enable_when_selected("auto-backup", &auto_enable)
                .targets([&auto_dir, &every_days, &retain, &notify])
                .control(backup_now.clone())],
        )?;

        Ok(Self {
            params,
            engine,
            auto_dir,
            folder_default,
            backup_now,
            manager,
            dispatcher,
            journal: None,
        })
    }

    pub fn with_journal(mut self, journal: OperationJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn backup_now_control(&self) -> &Rc<HeadlessControl> {
        &self.backup_now
    }

    pub fn auto_dir(&self) -> String {
        self.auto_dir.text()
    }

    /// Folder last used for a manual backup or restore.
    pub fn default_folder(&self) -> Option<PathBuf> {
        let text = self.folder_default.text();
        (!text.is_empty()).then(|| PathBuf::from(text))
    }

    pub fn status(&self) -> BackupStatus {
        BackupStatus {
            last_time: self.manager.last_backup_time(),
            last_error: self.manager.last_backup_error(),
        }
    }

    pub fn start_backup(
        &self,
        parent: &Path,
        sink: ProgressSink,
        on_complete: impl FnOnce(&OperationOutcome) + Send + 'static,
    ) -> Result<OperationController, OperationError> {
        self.remember_folder(parent);
        let controller = self.controller(OperationKind::Backup, parent);
        controller.start(
            run_backup_work(Arc::clone(&self.manager), parent.to_path_buf()),
            sink,
            on_complete,
        )?;
        Ok(controller)
    }

    /// First phase of a restore; nothing runs until the request is
    /// confirmed and handed to [`start_restore`](Self::start_restore).
    pub fn request_restore(&self, source: &Path) -> RestoreRequest {
        self.remember_folder(source.parent().unwrap_or(source));
        RestoreRequest::new(source)
    }

    /// `on_complete` is where the caller offers the restart.
    pub fn start_restore(
        &self,
        confirmed: ConfirmedRestore,
        sink: ProgressSink,
        on_complete: impl FnOnce(&OperationOutcome) + Send + 'static,
    ) -> Result<OperationController, OperationError> {
        let controller = self.controller(OperationKind::Restore, confirmed.source());
        controller.start(
            run_restore_work(Arc::clone(&self.manager), confirmed),
            sink,
            on_complete,
        )?;
        Ok(controller)
    }

    pub fn start_auto_backup(
        &self,
        sink: ProgressSink,
        on_complete: impl FnOnce(&OperationOutcome) + Send + 'static,
    ) -> Result<OperationController, OperationError> {
        let target = self.auto_dir();
        let controller = self.controller(OperationKind::AutoBackup, Path::new(&target));
        controller.start(run_auto_backup_work(Arc::clone(&self.manager)), sink, on_complete)?;
        Ok(controller)
    }

    fn controller(&self, kind: OperationKind, target: &Path) -> OperationController {
        let controller = OperationController::new(
            kind,
            target.display().to_string(),
            Arc::clone(&self.dispatcher),
        );
        match &self.journal {
            Some(journal) => controller.with_journal(journal.clone()),
            None => controller,
        }
    }

    fn remember_folder(&self, folder: &Path) {
        if let Err(err) = self.folder_default.set_text(&folder.display().to_string()) {
            warn!(error = %err, "Failed to remember backup folder");
        }
    }
}

impl ConfigSection for BackupSection {
    fn name(&self) -> &'static str {
        "backuprestore"
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn controls(&self) -> Vec<Rc<HeadlessControl>> {
        vec![Rc::clone(&self.backup_now)]
    }
}

impl Drop for BackupSection {
    fn drop(&mut self) {
        self.engine.teardown();
    }
}
