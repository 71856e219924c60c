use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dates::Frequency;
use crate::error::{StatsError, StatsResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequestRecord {
    /// `YYYYMMDDHH`
    pub timestamp: String,
    pub requests: u64,
}

/// Records keyed by file title.
pub type FileRecords = BTreeMap<String, Vec<MediaRequestRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Raw,
    File,
    Month,
    Day,
}

impl OutputType {
    pub fn parse(value: &str) -> StatsResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "file" => Ok(Self::File),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            _ => Err(StatsError::Config(format!(
                "unsupported output type: {value} (expected raw|file|month|day)"
            ))),
        }
    }

    /// Granularity requested from the metrics API.
    pub fn frequency(self) -> Frequency {
        match self {
            Self::Day => Frequency::Daily,
            _ => Frequency::Monthly,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub total: u64,
    /// Per-file counts contributing to the bucket.
    pub items: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Aggregate {
    PerFile(BTreeMap<String, u64>),
    PerTimeUnit(BTreeMap<String, TimeBucket>),
    Raw(FileRecords),
}

impl Aggregate {
    pub fn len(&self) -> usize {
        match self {
            Self::PerFile(map) => map.len(),
            Self::PerTimeUnit(map) => map.len(),
            Self::Raw(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn aggregate(stats: FileRecords, output: OutputType) -> Aggregate {
    match output {
        OutputType::File => Aggregate::PerFile(per_file_totals(&stats)),
        OutputType::Month => Aggregate::PerTimeUnit(per_time_unit(&stats, Frequency::Monthly)),
        OutputType::Day => Aggregate::PerTimeUnit(per_time_unit(&stats, Frequency::Daily)),
        OutputType::Raw => Aggregate::Raw(stats),
    }
}

pub fn per_file_totals(stats: &FileRecords) -> BTreeMap<String, u64> {
    stats
        .iter()
        .map(|(title, records)| {
            let total = records.iter().map(|record| record.requests).sum();
            (title.clone(), total)
        })
        .collect()
}

pub fn per_time_unit(stats: &FileRecords, frequency: Frequency) -> BTreeMap<String, TimeBucket> {
    let mut buckets = BTreeMap::<String, TimeBucket>::new();
    for records in stats.values() {
        for record in records {
            let bucket = buckets
                .entry(frequency.bucket(&record.timestamp))
                .or_default();
            bucket.total += record.requests;
            bucket.items.push(record.requests);
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesRow {
    /// Bucket key without its day suffix, e.g. `202403`.
    pub date: String,
    pub views: u64,
    /// Files contributing a record to the bucket.
    pub viewed_files: usize,
}

pub fn timeseries_rows(buckets: &BTreeMap<String, TimeBucket>) -> Vec<TimeseriesRow> {
    buckets
        .iter()
        .map(|(key, bucket)| TimeseriesRow {
            date: key
                .get(..key.len().saturating_sub(2))
                .unwrap_or(key)
                .to_string(),
            views: bucket.total,
            viewed_files: bucket.items.len(),
        })
        .collect()
}
