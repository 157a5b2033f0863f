use crate::operation::{OperationKind, OperationOutcome};
use anyhow::Context;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const MAX_BYTES: u64 = 4 * 1024 * 1024;

/// Append-only JSONL record of how each operation ended. One file per day,
/// rotated with a numeric suffix once it reaches the size limit.
#[derive(Clone, Debug)]
pub struct OperationJournal {
    session_id: String,
    base_dir: PathBuf,
    max_bytes: u64,
}

impl OperationJournal {
    pub fn new(base_dir: PathBuf) -> anyhow::Result<Self> {
        Self::new_with_limit(base_dir, MAX_BYTES)
    }

    pub fn new_with_limit(base_dir: PathBuf, max_bytes: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(&base_dir).context("create journal dir")?;
        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            base_dir,
            max_bytes,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn record(
        &self,
        operation_id: &Uuid,
        kind: OperationKind,
        target: &str,
        outcome: &OperationOutcome,
    ) -> anyhow::Result<()> {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format timestamp")?;
        let entry = JournalEntry {
            ts,
            session_id: &self.session_id,
            operation_id: operation_id.to_string(),
            kind: kind.as_str(),
            target,
            state: outcome.state().as_str(),
            error: outcome.error(),
        };
        let date = OffsetDateTime::now_utc()
            .format(&time::format_description::parse("[year][month][day]")?)
            .context("format date")?;
        let path = next_journal_path(&self.base_dir, &date, self.max_bytes);
        let line = serde_json::to_string(&entry).context("serialize journal entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open journal {}", path.display()))?;
        writeln!(file, "{line}").context("write journal entry")?;
        Ok(())
    }

    /// Most recent entries across all journal files, newest last.
    pub fn tail(&self, limit: usize) -> anyhow::Result<Vec<String>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.base_dir)
            .context("read journal dir")?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort_by_key(|path| journal_sort_key(path));
        let mut lines = Vec::new();
        for path in files {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read journal {}", path.display()))?;
            lines.extend(contents.lines().map(str::to_string));
        }
        let skip = lines.len().saturating_sub(limit);
        Ok(lines.split_off(skip))
    }
}

#[derive(Serialize)]
struct JournalEntry<'a> {
    ts: String,
    session_id: &'a str,
    operation_id: String,
    kind: &'static str,
    target: &'a str,
    state: &'static str,
    error: Option<&'a str>,
}

fn next_journal_path(base_dir: &Path, date: &str, max_bytes: u64) -> PathBuf {
    let mut suffix = 0;
    loop {
        let name = if suffix == 0 {
            format!("operations-{date}.jsonl")
        } else {
            format!("operations-{date}-{suffix}.jsonl")
        };
        let path = base_dir.join(name);
        if let Ok(metadata) = fs::metadata(&path)
            && metadata.len() >= max_bytes
        {
            suffix += 1;
            continue;
        }
        return path;
    }
}

fn journal_sort_key(path: &Path) -> (String, u32) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut parts = stem.splitn(3, '-');
    let _prefix = parts.next();
    let date = parts.next().unwrap_or_default().to_string();
    let suffix = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (date, suffix)
}
