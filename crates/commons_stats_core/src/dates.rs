use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};

/// Date parameter of the metrics API: `YYYYMMDD`, optionally followed by a 2-digit hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiDate {
    date: NaiveDate,
    hour: Option<u32>,
}

impl ApiDate {
    pub fn parse(value: &str) -> StatsResult<Self> {
        let value = value.trim();
        if !value.chars().all(|ch| ch.is_ascii_digit()) || !matches!(value.len(), 8 | 10) {
            return Err(StatsError::Config(format!(
                "invalid date {value:?} (expected YYYYMMDD or YYYYMMDDHH)"
            )));
        }
        let date = NaiveDate::parse_from_str(&value[..8], "%Y%m%d")
            .map_err(|error| StatsError::Config(format!("invalid date {value:?}: {error}")))?;
        let hour = match value.get(8..) {
            Some(hour) if !hour.is_empty() => {
                let hour = hour
                    .parse::<u32>()
                    .map_err(|error| StatsError::Config(format!("invalid hour {hour:?}: {error}")))?;
                if hour > 23 {
                    return Err(StatsError::Config(format!("invalid hour in {value:?}")));
                }
                Some(hour)
            }
            _ => None,
        };
        Ok(Self { date, hour })
    }

    /// Start of today, the default end of a window.
    pub fn today() -> Self {
        Self {
            date: Local::now().date_naive(),
            hour: Some(0),
        }
    }

    /// Ten-digit `YYYYMMDDHH` form, comparable with record timestamps.
    fn key(&self) -> String {
        format!("{}{:02}", self.date.format("%Y%m%d"), self.hour.unwrap_or(0))
    }
}

impl fmt::Display for ApiDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y%m%d"))?;
        if let Some(hour) = self.hour {
            write!(f, "{hour:02}")?;
        }
        Ok(())
    }
}

impl FromStr for ApiDate {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for ApiDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    /// Bucket key of a `YYYYMMDDHH` timestamp: the day, or the first day of the month.
    pub fn bucket(self, timestamp: &str) -> String {
        match self {
            Self::Daily => timestamp.get(..8).unwrap_or(timestamp).to_string(),
            Self::Monthly => format!("{}01", timestamp.get(..6).unwrap_or(timestamp)),
        }
    }
}

/// Half-open `[start, end)` window. The start is truncated to the frequency so that a
/// monthly bucket beginning before a mid-month start date is still included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: ApiDate,
    pub end: ApiDate,
}

impl DateWindow {
    pub fn new(start: ApiDate, end: ApiDate) -> StatsResult<Self> {
        if start.key() >= end.key() {
            return Err(StatsError::Config(format!(
                "start date {start} must be before end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: &str, frequency: Frequency) -> bool {
        let start = match frequency {
            Frequency::Daily => self.start.key(),
            // Monthly records are stamped with the first of the month, so a mid-month
            // start keeps the whole month the API returned rather than dropping it.
            Frequency::Monthly => format!("{}00", frequency.bucket(&self.start.key())),
        };
        let end = self.end.key();
        timestamp >= start.as_str() && timestamp < end.as_str()
    }
}
