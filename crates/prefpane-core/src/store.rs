use crate::value::ParamValue;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, mpsc};
use tracing::debug;

/// Key/value settings consumed by parameters and collaborators.
///
/// Change notification is channel based: `subscribe` hands out a receiver
/// that the affinity thread drains, so no store callback ever runs on a
/// worker thread.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ParamValue>;
    /// Returns true when the stored value changed.
    fn set(&self, key: &str, value: ParamValue) -> bool;
    fn remove(&self, key: &str) -> Option<ParamValue>;
    fn subscribe(&self) -> mpsc::Receiver<StoreEvent>;

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn int_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_int()).unwrap_or(default)
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Changed { key: String },
    Removed { key: String },
}

impl StoreEvent {
    pub fn key(&self) -> &str {
        match self {
            StoreEvent::Changed { key } | StoreEvent::Removed { key } => key,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    version: u32,
    values: BTreeMap<String, ParamValue>,
}

const SETTINGS_VERSION: u32 = 1;

#[derive(Default)]
struct StoreState {
    values: BTreeMap<String, ParamValue>,
    subscribers: Vec<mpsc::Sender<StoreEvent>>,
}

impl StoreState {
    fn notify(&mut self, event: StoreEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[derive(Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl SettingsStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let values = if path.exists() {
            let data = fs::read_to_string(path).context("read settings")?;
            let file: SettingsFile = serde_json::from_str(&data).context("parse settings")?;
            if file.version > SETTINGS_VERSION {
                anyhow::bail!("unsupported settings version {}", file.version);
            }
            file.values
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "Settings loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(StoreState {
                values,
                subscribers: Vec::new(),
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create settings directory")?;
        }
        let file = SettingsFile {
            version: SETTINGS_VERSION,
            values: self.lock().values.clone(),
        };
        let data = serde_json::to_string_pretty(&file).context("serialize settings")?;
        fs::write(path, data).context("write settings")?;
        Ok(())
    }

    pub fn entries(&self) -> Vec<(String, ParamValue)> {
        self.lock()
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for SettingsStore {
    fn get(&self, key: &str) -> Option<ParamValue> {
        self.lock().values.get(key).cloned()
    }

    fn set(&self, key: &str, value: ParamValue) -> bool {
        let mut state = self.lock();
        if state.values.get(key) == Some(&value) {
            return false;
        }
        state.values.insert(key.to_string(), value);
        state.notify(StoreEvent::Changed {
            key: key.to_string(),
        });
        true
    }

    fn remove(&self, key: &str) -> Option<ParamValue> {
        let mut state = self.lock();
        let removed = state.values.remove(key);
        if removed.is_some() {
            state.notify(StoreEvent::Removed {
                key: key.to_string(),
            });
        }
        removed
    }

    fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }
}
