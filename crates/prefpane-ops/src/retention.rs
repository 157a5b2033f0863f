use anyhow::Context;
use prefpane_core::config::SETTINGS_FILENAME;
use std::fs;
use std::path::{Path, PathBuf};
use time::{Date, Month, OffsetDateTime};

const MAX_SUFFIX: u32 = 100;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// `2026-10-19` for the first backup of a day, `2026-10-19.3` for later ones.
pub fn backup_dir_name(date: Date, suffix: u32) -> String {
    let base = format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    );
    if suffix == 0 {
        base
    } else {
        format!("{base}.{suffix}")
    }
}

pub fn parse_backup_dir(name: &str) -> Option<(Date, u32)> {
    let (date_part, suffix) = match name.split_once('.') {
        Some((date, suffix)) => (date, suffix.parse().ok()?),
        None => (name, 0),
    };
    let mut parts = date_part.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    Some((date, suffix))
}

/// First unused folder for a backup taken on `date`, following the highest
/// suffix already present.
pub fn next_backup_folder(parent: &Path, date: Date) -> anyhow::Result<PathBuf> {
    let mut next = 0;
    for entry in fs::read_dir(parent).with_context(|| format!("read {}", parent.display()))? {
        let entry = entry.context("read backup folder entry")?;
        let name = entry.file_name();
        if let Some((existing, suffix)) = parse_backup_dir(&name.to_string_lossy())
            && existing == date
        {
            next = next.max(suffix + 1);
        }
    }
    (next..MAX_SUFFIX)
        .map(|suffix| parent.join(backup_dir_name(date, suffix)))
        .find(|candidate| !candidate.exists())
        .with_context(|| {
            format!(
                "No free backup folder for {} in '{}'",
                backup_dir_name(date, 0),
                parent.display()
            )
        })
}

/// Dated backup folders under `parent` beyond the newest `retain`. Only
/// folders holding a settings file count as backups.
pub fn backups_to_prune(parent: &Path, retain: usize) -> anyhow::Result<Vec<PathBuf>> {
    let mut backups = Vec::new();
    for entry in fs::read_dir(parent).with_context(|| format!("read {}", parent.display()))? {
        let entry = entry.context("read backup folder entry")?;
        let path = entry.path();
        if !path.is_dir() || !path.join(SETTINGS_FILENAME).is_file() {
            continue;
        }
        if let Some(stamp) = parse_backup_dir(&entry.file_name().to_string_lossy()) {
            backups.push((stamp, path));
        }
    }
    backups.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(backups
        .into_iter()
        .skip(retain.max(1))
        .map(|(_, path)| path)
        .collect())
}

pub fn day_index(now: OffsetDateTime) -> i64 {
    now.unix_timestamp().div_euclid(SECONDS_PER_DAY)
}

/// Whether an automatic backup is due on day `today`. A last day in the
/// future (clock moved back) counts as today.
pub fn auto_backup_due(last_day: i64, every_days: i64, today: i64) -> bool {
    let last_day = last_day.min(today);
    today >= last_day + every_days.max(1)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    fn make_backup(parent: &Path, name: &str) -> PathBuf {
        let dir = parent.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SETTINGS_FILENAME), "{}").unwrap();
        dir
    }

    #[test]
    fn names_parse_back() {
        let day = date(2026, Month::October, 9);
        assert_eq!(backup_dir_name(day, 0), "2026-10-09");
        assert_eq!(backup_dir_name(day, 4), "2026-10-09.4");
        assert_eq!(parse_backup_dir("2026-10-09.4"), Some((day, 4)));
        assert_eq!(parse_backup_dir("2026-13-09"), None);
        assert_eq!(parse_backup_dir("notes"), None);
        assert_eq!(parse_backup_dir("2026-10-09.x"), None);
    }

    #[test]
    fn next_folder_follows_highest_suffix() {
        let tmp = TempDir::new().unwrap();
        let day = date(2026, Month::October, 19);
        assert_eq!(
            next_backup_folder(tmp.path(), day).unwrap(),
            tmp.path().join("2026-10-19")
        );
        fs::create_dir(tmp.path().join("2026-10-19")).unwrap();
        fs::create_dir(tmp.path().join("2026-10-19.3")).unwrap();
        fs::create_dir(tmp.path().join("2026-10-18.9")).unwrap();
        assert_eq!(
            next_backup_folder(tmp.path(), day).unwrap(),
            tmp.path().join("2026-10-19.4")
        );
    }

    #[test]
    fn next_folder_gives_up_at_limit() {
        let tmp = TempDir::new().unwrap();
        let day = date(2026, Month::October, 19);
        fs::create_dir(tmp.path().join("2026-10-19.99")).unwrap();
        assert!(next_backup_folder(tmp.path(), day).is_err());
    }

    #[test]
    fn retention_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        let oldest = make_backup(tmp.path(), "2026-10-01");
        let older = make_backup(tmp.path(), "2026-10-18");
        make_backup(tmp.path(), "2026-10-18.1");
        make_backup(tmp.path(), "2026-10-19");
        fs::create_dir(tmp.path().join("2026-09-01")).unwrap();
        fs::create_dir(tmp.path().join("unrelated")).unwrap();

        let mut pruned = backups_to_prune(tmp.path(), 2).unwrap();
        pruned.sort();
        assert_eq!(pruned, vec![oldest, older]);
        assert_eq!(backups_to_prune(tmp.path(), 0).unwrap().len(), 3);
    }

    #[test]
    fn due_after_interval() {
        assert!(auto_backup_due(0, 1, 20_000));
        assert!(!auto_backup_due(20_000, 1, 20_000));
        assert!(auto_backup_due(19_999, 1, 20_000));
        assert!(!auto_backup_due(19_998, 3, 20_000));
        assert!(!auto_backup_due(30_000, 7, 20_000));
        assert!(auto_backup_due(19_999, 0, 20_000));
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
