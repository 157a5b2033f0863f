use super::*;

#[derive(Parser)]
#[command(author, version, about = "Preferences, backup and proxy tools")]
pub(super) struct Cli {
    #[arg(long, global = true, help = "Settings file (defaults to the user directory)")]
    pub(super) settings: Option<PathBuf>,
    #[arg(long, global = true, help = "User directory to back up and restore")]
    pub(super) user_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Directory for the operation journal")]
    pub(super) journal_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Read and write settings")]
    Config(ConfigArgs),
    #[command(about = "Show every section's parameters and their enabled state")]
    Sections,
    #[command(about = "Back up the user directory into a dated folder")]
    Backup(BackupArgs),
    #[command(about = "Restore the user directory from a backup folder")]
    Restore(RestoreArgs),
    #[command(about = "Run the automatic backup now")]
    AutoBackup(AutoBackupArgs),
    #[command(about = "Test the configured SOCKS proxy")]
    ProxyTest,
    #[command(about = "Show how recent operations ended")]
    Journal(JournalArgs),
}

#[derive(Parser)]
pub(super) struct ConfigArgs {
    #[command(subcommand)]
    pub(super) command: ConfigCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommands {
    #[command(about = "Print one setting")]
    Get(KeyArgs),
    #[command(about = "Change one setting")]
    Set(SetArgs),
    #[command(about = "Remove one setting")]
    Unset(KeyArgs),
    #[command(about = "List all stored settings")]
    List(ListArgs),
}

#[derive(Parser)]
pub(super) struct KeyArgs {
    pub(super) key: String,
}

#[derive(Parser)]
pub(super) struct ListArgs {
    #[arg(long, help = "Print the settings as JSON")]
    pub(super) json: bool,
}

#[derive(Parser)]
pub(super) struct SetArgs {
    pub(super) key: String,
    pub(super) value: String,
    #[arg(long, value_enum, help = "Value kind for keys no section knows about")]
    pub(super) kind: Option<KindArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(super) enum KindArg {
    Bool,
    Int,
    Float,
    String,
    Choice,
    Bytes,
}

impl From<KindArg> for ParamKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Bool => ParamKind::Bool,
            KindArg::Int => ParamKind::Int,
            KindArg::Float => ParamKind::Float,
            KindArg::String => ParamKind::Str,
            KindArg::Choice => ParamKind::Choice,
            KindArg::Bytes => ParamKind::Bytes,
        }
    }
}

#[derive(Parser)]
pub(super) struct BackupArgs {
    #[arg(help = "Parent folder; defaults to the last folder used")]
    pub(super) dir: Option<PathBuf>,
}

#[derive(Parser)]
pub(super) struct RestoreArgs {
    pub(super) dir: PathBuf,
    #[arg(long, help = "Skip the confirmation prompt")]
    pub(super) yes: bool,
}

#[derive(Parser)]
pub(super) struct AutoBackupArgs {
    #[arg(long, help = "Only run when the schedule says a backup is due")]
    pub(super) if_due: bool,
}

#[derive(Parser)]
pub(super) struct JournalArgs {
    #[arg(long, default_value_t = 20, help = "Number of entries to show")]
    pub(super) limit: usize,
}
