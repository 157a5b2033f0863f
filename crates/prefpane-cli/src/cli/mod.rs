use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use prefpane_core::backup::{BackupManager, ConfirmedRestore};
use prefpane_core::config::{default_journal_dir, default_user_dir, lock_path, settings_path};
use prefpane_core::dependency::ControlHandle;
use prefpane_core::dispatch::TaskQueue;
use prefpane_core::journal::OperationJournal;
use prefpane_core::operation::{OperationController, OperationOutcome, OperationState};
use prefpane_core::progress::{ProgressSink, ProgressView};
use prefpane_core::sections::backup::AUTO_ENABLE;
use prefpane_core::sections::{BackupSection, ConfigSection, ProxySection};
use prefpane_core::store::{ConfigStore, SettingsStore};
use prefpane_core::value::{ParamKind, ParamValue};
use prefpane_ops::{FsBackupManager, SocksProxyFactory};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod args;
mod config_cmd;
mod journal_cmd;
mod ops_cmd;
mod sections_cmd;
mod terminal;

use args::*;

pub use app::run;
use app::AppContext;
use config_cmd::handle_config;
use journal_cmd::handle_journal;
use ops_cmd::{handle_auto_backup, handle_backup, handle_proxy_test, handle_restore};
use sections_cmd::handle_sections;
