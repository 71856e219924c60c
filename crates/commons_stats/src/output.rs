use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use commons_stats_core::aggregate::{TimeBucket, TimeseriesRow};
use commons_stats_core::creation::CreationCounts;
use commons_stats_core::diffstats::FileDiff;
use commons_stats_core::wiki::CategoryRef;
use serde::{Deserialize, Serialize};

/// Run parameters stored next to every result. Never carries the output path or the
/// contact identity.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta<P: Serialize> {
    #[serde(flatten)]
    pub params: P,
    /// `YYYYMMDD`
    pub today: String,
}

impl<P: Serialize> RunMeta<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            today: Local::now().format("%Y%m%d").to_string(),
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    write_text(path, &content)
}

pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", normalize_path(parent)))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", normalize_path(path)))
}

#[derive(Debug, Deserialize)]
struct StoredSeries {
    data: BTreeMap<String, TimeBucket>,
}

/// Reads the series of a `mediaviews` output written with `--type month` or `--type day`.
pub fn read_time_series(path: &Path) -> Result<BTreeMap<String, TimeBucket>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", normalize_path(path)))?;
    let stored: StoredSeries = serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is not a per-time-unit mediaviews output",
            normalize_path(path)
        )
    })?;
    Ok(stored.data)
}

#[derive(Debug, Deserialize)]
pub struct StoredDiff {
    #[serde(default)]
    pub meta: serde_json::Value,
    pub results: Vec<FileDiff>,
}

/// Reads a structured-data diff output: `{"meta": {...}, "results": [...]}`.
pub fn read_diff(path: &Path) -> Result<StoredDiff> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", normalize_path(path)))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a diff output", normalize_path(path)))
}

pub fn render_time_series_tsv(rows: &[TimeseriesRow]) -> String {
    let mut out = String::from("date\tviews\tviewed_files\n");
    for row in rows {
        let _ = writeln!(out, "{}\t{}\t{}", row.date, row.views, row.viewed_files);
    }
    out
}

pub fn render_file_count_tsv(category: &CategoryRef, counts: &CreationCounts) -> String {
    let mut out = format!(
        "# File count for {}\nmonth\tnew_files\n",
        clean_category_name(category)
    );
    for (month, count) in counts {
        let _ = writeln!(out, "{month}\t{count}");
    }
    out
}

/// `Category:Old maps/1850` → `Old_maps-1850`
pub fn clean_category_name(category: &CategoryRef) -> String {
    category.name().replace(' ', "_").replace('/', "-")
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
