//! JSONL feeds and atomic file replacement

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append one JSON record as a line, creating parent directories on demand
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Read every well-formed record from a JSONL file.
///
/// A missing file reads as empty. Blank and malformed lines are skipped so a
/// torn final write never poisons the whole feed.
pub fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> std::io::Result<Vec<T>> {
    let mut records = Vec::new();
    for_each_record(path, |record| records.push(record))?;
    Ok(records)
}

/// Read the last `limit` well-formed records, oldest first
pub fn read_jsonl_tail<T: for<'de> Deserialize<'de>>(
    path: &Path,
    limit: usize,
) -> std::io::Result<Vec<T>> {
    let mut window = VecDeque::with_capacity(limit.min(1024));
    if limit == 0 {
        return Ok(Vec::new());
    }
    for_each_record(path, |record| {
        if window.len() == limit {
            window.pop_front();
        }
        window.push_back(record);
    })?;
    Ok(window.into_iter().collect())
}

fn for_each_record<T, F>(path: &Path, mut f: F) -> std::io::Result<()>
where
    T: for<'de> Deserialize<'de>,
    F: FnMut(T),
{
    if !path.exists() {
        return Ok(());
    }

    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str(&line) {
            f(record);
        }
    }
    Ok(())
}

/// Replace `path` with `data` through a sibling temp file and a rename.
///
/// Readers observe either the old contents or the new ones, never a prefix.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = temp_sibling(path);
    std::fs::write(&temp_path, data)?;
    if let Err(err) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err);
    }
    Ok(())
}

/// Pretty-print `value` and write it atomically
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}
