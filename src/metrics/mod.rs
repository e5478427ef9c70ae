// src/metrics/mod.rs
// Append-only CSV metrics store for before/after job records

use chrono::{DateTime, Local, NaiveDateTime};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::DebloatError;
use crate::utils::{join_csv_line, split_csv_line};

pub const HEADER: &str =
    "timestamp,file_name,model,prompt_id,lines_before,lines_after,reduction_percent,status,detail";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }
}

/// One row of the metrics store. Failed jobs record whatever was computed
/// before the failure; `lines_after` and `reduction_percent` stay empty when
/// the candidate never materialized.
#[derive(Debug, Clone)]
pub struct MetricsRecord {
    pub timestamp: DateTime<Local>,
    pub file_name: String,
    pub model: String,
    pub prompt_id: String,
    pub lines_before: usize,
    pub lines_after: Option<usize>,
    pub reduction_percent: Option<f64>,
    pub status: RecordStatus,
    pub detail: String,
}

impl MetricsRecord {
    pub fn success(
        file_name: String,
        model: String,
        prompt_id: String,
        lines_before: usize,
        lines_after: usize,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            file_name,
            model,
            prompt_id,
            lines_before,
            lines_after: Some(lines_after),
            reduction_percent: Some(reduction_percent(lines_before, lines_after)),
            status: RecordStatus::Success,
            detail: String::new(),
        }
    }

    pub fn failure(
        file_name: String,
        model: String,
        prompt_id: String,
        lines_before: usize,
        lines_after: Option<usize>,
        detail: String,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            file_name,
            model,
            prompt_id,
            lines_before,
            lines_after,
            reduction_percent: lines_after.map(|after| reduction_percent(lines_before, after)),
            status: RecordStatus::Failed,
            detail,
        }
    }

    fn to_csv_line(&self) -> String {
        let timestamp = self.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let lines_before = self.lines_before.to_string();
        let lines_after = self
            .lines_after
            .map(|n| n.to_string())
            .unwrap_or_default();
        let reduction = self
            .reduction_percent
            .map(|r| format!("{:.2}", r))
            .unwrap_or_default();
        join_csv_line(&[
            &timestamp,
            &self.file_name,
            &self.model,
            &self.prompt_id,
            &lines_before,
            &lines_after,
            &reduction,
            self.status.as_str(),
            &self.detail,
        ])
    }

    fn from_csv_fields(fields: &[String]) -> Option<Self> {
        if fields.len() != 9 {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(&fields[0], TIMESTAMP_FORMAT)
            .ok()?
            .and_local_timezone(Local)
            .single()?;
        let status = match fields[7].as_str() {
            "success" => RecordStatus::Success,
            "failed" => RecordStatus::Failed,
            _ => return None,
        };
        Some(Self {
            timestamp,
            file_name: fields[1].clone(),
            model: fields[2].clone(),
            prompt_id: fields[3].clone(),
            lines_before: fields[4].parse().ok()?,
            lines_after: if fields[5].is_empty() {
                None
            } else {
                Some(fields[5].parse().ok()?)
            },
            reduction_percent: if fields[6].is_empty() {
                None
            } else {
                Some(fields[6].parse().ok()?)
            },
            status,
            detail: fields[8].clone(),
        })
    }
}

/// Relative line-count decrease, rounded to two decimals. Defined as 0 when
/// there was nothing to reduce.
pub fn reduction_percent(lines_before: usize, lines_after: usize) -> f64 {
    if lines_before == 0 {
        return 0.0;
    }
    let raw = (lines_before as f64 - lines_after as f64) / lines_before as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Aggregates over a set of records.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub jobs: usize,
    pub successes: usize,
    pub failures: usize,
    pub mean_reduction_percent: f64,
    pub lines_removed: i64,
}

/// Aggregate existing records. Reduction statistics cover successful rows
/// only; failed rows count toward the tallies.
pub fn summarize(records: &[MetricsRecord]) -> Summary {
    let mut summary = Summary {
        jobs: records.len(),
        ..Summary::default()
    };
    let mut reduction_sum = 0.0;

    for record in records {
        match record.status {
            RecordStatus::Success => {
                summary.successes += 1;
                if let Some(reduction) = record.reduction_percent {
                    reduction_sum += reduction;
                }
                if let Some(after) = record.lines_after {
                    summary.lines_removed += record.lines_before as i64 - after as i64;
                }
            }
            RecordStatus::Failed => summary.failures += 1,
        }
    }

    if summary.successes > 0 {
        summary.mean_reduction_percent = reduction_sum / summary.successes as f64;
    }
    summary
}

/// Append-only CSV store. Appends are serialized behind a mutex so
/// concurrent batch workers cannot interleave or drop rows; the file is
/// never rewritten, reordered, or deduplicated from here.
pub struct MetricsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MetricsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file with its header row first if
    /// needed.
    pub fn append(&self, record: &MetricsRecord) -> Result<(), DebloatError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DebloatError::file_io("open metrics store", &self.path, e))?;

        let mut line = String::new();
        if needs_header {
            line.push_str(HEADER);
            line.push('\n');
        }
        line.push_str(&record.to_csv_line());
        line.push('\n');

        file.write_all(line.as_bytes())
            .map_err(|e| DebloatError::file_io("append to metrics store", &self.path, e))?;

        info!("metrics recorded to {}", self.path.display());
        Ok(())
    }

    /// Parse existing rows. Malformed lines are skipped with a warning
    /// rather than failing the load.
    pub fn load(&self) -> Result<Vec<MetricsRecord>, DebloatError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DebloatError::file_io("read metrics store", &self.path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if idx == 0 || line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            match MetricsRecord::from_csv_fields(&fields) {
                Some(record) => records.push(record),
                None => warn!(
                    "skipping malformed metrics row {} in {}",
                    idx + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }
}
