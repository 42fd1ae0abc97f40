use crate::domain::signal::{Action, Trend};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const DEFAULT_QUERY_LIMIT: usize = 30;

const HEADER: [&str; 12] = [
    "date",
    "symbol",
    "price",
    "prediction",
    "signal",
    "confidence",
    "prob_up",
    "prob_down",
    "predicted_price",
    "recommendation",
    "recommendation_confidence",
    "degraded",
];

/// One row of the prediction history, keyed by (date, symbol).
///
/// The first eight columns describe the direction model's call. The trailing columns carry the
/// fused recommendation and are empty in logs written before fusion existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub price: f64,
    pub prediction: Trend,
    /// Technical call derived from the model probabilities.
    pub signal: Action,
    /// Probability of the called direction.
    pub confidence: f64,
    /// Empty when inference failed and the call fell back to HOLD.
    #[serde(default)]
    pub prob_up: Option<f64>,
    #[serde(default)]
    pub prob_down: Option<f64>,
    #[serde(default)]
    pub predicted_price: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<Action>,
    #[serde(default)]
    pub recommendation_confidence: Option<f64>,
    #[serde(default)]
    pub degraded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub symbol: Option<String>,
    /// Only rows at most this many days before "today".
    pub days: Option<u32>,
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            symbol: None,
            days: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Append-only CSV log of predictions.
///
/// Writers hold an exclusive OS lock on `<path>.lock` for the whole read-merge-write, so runs in
/// separate processes serialize. The file is replaced by renaming a temp file from the same
/// directory; readers never lock and always see a complete file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges `records` into the log, keeping the last row per (date, symbol).
    ///
    /// A missing or empty log starts fresh. A log with any unreadable row is left untouched and
    /// the append fails. Returns the number of rows in the rewritten log.
    pub fn append(&self, records: &[HistoryRecord]) -> anyhow::Result<usize> {
        let dir = parent_dir(&self.path);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let _lock = lock_exclusive(&self.path)?;

        let existing = read_records(&self.path).with_context(|| {
            format!(
                "history {} has unreadable rows; not rewriting it",
                self.path.display()
            )
        })?;

        let merged = dedupe_keep_last(existing.into_iter().chain(records.iter().cloned()));
        write_atomically(&self.path, &merged)?;

        tracing::info!(
            path = %self.path.display(),
            appended = records.len(),
            total = merged.len(),
            "history updated"
        );
        Ok(merged.len())
    }

    /// Rows newest first. `today` anchors the `days` cutoff.
    pub fn query(&self, q: &HistoryQuery, today: NaiveDate) -> anyhow::Result<Vec<HistoryRecord>> {
        let cutoff = q
            .days
            .map(|days| today - chrono::Duration::days(i64::from(days)));

        let mut rows: Vec<HistoryRecord> = read_records(&self.path)?
            .into_iter()
            .filter(|r| match &q.symbol {
                Some(symbol) => r.symbol.eq_ignore_ascii_case(symbol),
                None => true,
            })
            .filter(|r| cutoff.map_or(true, |c| r.date >= c))
            .collect();

        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.symbol.cmp(&b.symbol)));
        rows.truncate(q.limit);
        Ok(rows)
    }
}

/// A missing file reads as an empty log.
fn read_records(path: &Path) -> anyhow::Result<Vec<HistoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open history {}", path.display()))?;
    reader
        .deserialize::<HistoryRecord>()
        .map(|row| row.with_context(|| format!("bad history row in {}", path.display())))
        .collect()
}

fn dedupe_keep_last(rows: impl Iterator<Item = HistoryRecord>) -> Vec<HistoryRecord> {
    let rows: Vec<HistoryRecord> = rows.collect();
    let mut seen = HashSet::new();
    let mut out: Vec<HistoryRecord> = rows
        .into_iter()
        .rev()
        .filter(|r| seen.insert((r.date, r.symbol.clone())))
        .collect();
    out.reverse();
    out
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Blocks until this process owns `<path>.lock`. Released when the returned file drops.
fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open {}", lock_path.display()))?;
    fs4::fs_std::FileExt::lock_exclusive(&file)
        .with_context(|| format!("failed to lock {}", lock_path.display()))?;
    Ok(file)
}

fn write_atomically(path: &Path, rows: &[HistoryRecord]) -> anyhow::Result<()> {
    let dir = parent_dir(path);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;

    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        if rows.is_empty() {
            writer.write_record(HEADER)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().context("failed to flush history")?;
    }

    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
