use super::*;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = command_label(&cli.command), "Running command");
    let ctx = AppContext::resolve(&cli)?;
    match cli.command {
        Commands::Config(args) => handle_config(&ctx, args),
        Commands::Sections => handle_sections(&ctx),
        Commands::Backup(args) => handle_backup(&ctx, args),
        Commands::Restore(args) => handle_restore(&ctx, args),
        Commands::AutoBackup(args) => handle_auto_backup(&ctx, args),
        Commands::ProxyTest => handle_proxy_test(&ctx),
        Commands::Journal(args) => handle_journal(&ctx, args),
    }
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Config(_) => "config",
        Commands::Sections => "sections",
        Commands::Backup(_) => "backup",
        Commands::Restore(_) => "restore",
        Commands::AutoBackup(_) => "auto-backup",
        Commands::ProxyTest => "proxy-test",
        Commands::Journal(_) => "journal",
    }
}

/// Paths and shared services every command works against.
pub(super) struct AppContext {
    pub(super) store: Arc<SettingsStore>,
    pub(super) user_dir: PathBuf,
    pub(super) journal: Option<OperationJournal>,
}

impl AppContext {
    pub(super) fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let user_dir = match &cli.user_dir {
            Some(dir) => dir.clone(),
            None => default_user_dir()?,
        };
        let settings_path = cli
            .settings
            .clone()
            .unwrap_or_else(|| settings_path(&user_dir));
        let store = SettingsStore::load(&settings_path)
            .with_context(|| format!("load settings from {}", settings_path.display()))?;
        let journal_dir = match &cli.journal_dir {
            Some(dir) => Some(dir.clone()),
            None => default_journal_dir().ok(),
        };
        let journal = journal_dir.and_then(|dir| match OperationJournal::new(dir) {
            Ok(journal) => Some(journal),
            Err(err) => {
                warn!(error = %err, "Operation journal disabled");
                None
            }
        });
        Ok(Self {
            store: Arc::new(store),
            user_dir,
            journal,
        })
    }

    pub(super) fn config_store(&self) -> Arc<dyn ConfigStore> {
        self.store.clone()
    }

    pub(super) fn save(&self) -> anyhow::Result<()> {
        self.store.save()
    }

    pub(super) fn backup_manager(&self) -> Arc<FsBackupManager> {
        Arc::new(
            FsBackupManager::new(self.config_store(), self.user_dir.clone())
                .with_lock(lock_path(&self.user_dir)),
        )
    }

    pub(super) fn backup_section(
        &self,
        queue: &TaskQueue,
        manager: Arc<dyn BackupManager>,
    ) -> anyhow::Result<BackupSection> {
        let section = BackupSection::build(self.config_store(), manager, queue.dispatcher())?;
        Ok(match &self.journal {
            Some(journal) => section.with_journal(journal.clone()),
            None => section,
        })
    }

    pub(super) fn proxy_section(&self, queue: &TaskQueue) -> anyhow::Result<ProxySection> {
        let section = ProxySection::build(
            self.config_store(),
            Arc::new(SocksProxyFactory::default()),
            queue.dispatcher(),
        )?;
        Ok(match &self.journal {
            Some(journal) => section.with_journal(journal.clone()),
            None => section,
        })
    }
}
