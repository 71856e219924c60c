//! Media-request statistics for the files of a category.
//!
//! One REST call per file against the metrics API, human traffic only. If the window
//! includes the current month the newest bucket is likely partial.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{Aggregate, FileRecords, MediaRequestRecord, OutputType, aggregate};
use crate::client::HttpFetch;
use crate::dates::{DateWindow, Frequency};
use crate::error::{StatsError, StatsResult};
use crate::walker::{ProgressSink, WalkOptions, walk_category};
use crate::wiki::{CategoryRef, FileIdentity, WikiSource};

/// Agent class of the metrics API for human traffic.
pub const HUMAN_AGENT: &str = "user";

pub struct MediaRequestFetcher {
    base_url: String,
}

impl MediaRequestFetcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn request_url(
        &self,
        storage_path: &str,
        frequency: Frequency,
        window: &DateWindow,
    ) -> String {
        format!(
            "{}/metrics/mediarequests/per-file/all-referers/{HUMAN_AGENT}/{}/{}/{}/{}",
            self.base_url,
            urlencoding::encode(storage_path),
            frequency.as_str(),
            window.start,
            window.end
        )
    }

    /// Records for one file, limited to `window`.
    pub fn fetch_requests<H: HttpFetch>(
        &self,
        http: &mut H,
        file: &FileIdentity,
        storage_path: &str,
        window: &DateWindow,
        frequency: Frequency,
    ) -> StatsResult<Vec<MediaRequestRecord>> {
        let url = self.request_url(storage_path, frequency, window);
        debug!(file = file.title(), url = url.as_str(), "looking up media requests");
        let response = http.get(&url)?;
        match response.status {
            404 => {
                return Err(StatsError::NoDataForPeriod {
                    title: file.title().to_string(),
                });
            }
            400 => {
                let detail = serde_json::from_str::<ErrorBody>(&response.body)
                    .ok()
                    .and_then(|body| body.detail)
                    .unwrap_or_else(|| response.body.clone());
                return Err(StatsError::BadRequest { detail });
            }
            _ if !response.is_success() => return Err(response.client_error()),
            _ => {}
        }

        let payload: MediaRequestsResponse = response.json()?;
        let (kept, dropped): (Vec<_>, Vec<_>) = payload
            .items
            .into_iter()
            .map(|item| MediaRequestRecord {
                timestamp: item.timestamp,
                requests: item.requests,
            })
            .partition(|record| window.contains(&record.timestamp, frequency));
        if !dropped.is_empty() {
            debug!(
                file = file.title(),
                dropped = dropped.len(),
                "discarded records outside the window"
            );
        }
        Ok(kept)
    }
}

/// Path of the file on the upload server, e.g. `/wikipedia/commons/a/ab/Example.jpg`.
pub fn storage_path(file_url: &str) -> StatsResult<String> {
    let url = Url::parse(file_url)
        .map_err(|error| StatsError::Wiki(format!("invalid file URL {file_url}: {error}")))?;
    let path = urlencoding::decode(url.path())
        .map_err(|error| StatsError::Wiki(format!("invalid file URL {file_url}: {error}")))?;
    Ok(path.into_owned())
}

#[derive(Debug, Clone)]
pub struct MediaViewsOptions {
    pub category: CategoryRef,
    pub walk: WalkOptions,
    pub window: DateWindow,
    pub output: OutputType,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaViewsReport {
    pub files_examined: usize,
    pub files_with_stats: usize,
    pub result: Aggregate,
}

#[derive(Debug, Clone)]
pub enum MediaViewsOutcome {
    /// Every file was skipped, or the category was empty.
    NoResults { files_examined: usize },
    Stats(MediaViewsReport),
}

pub fn collect_media_views<W: WikiSource, H: HttpFetch>(
    wiki: &mut W,
    http: &mut H,
    fetcher: &MediaRequestFetcher,
    options: &MediaViewsOptions,
    progress: &mut dyn ProgressSink,
) -> StatsResult<MediaViewsOutcome> {
    let frequency = options.output.frequency();
    let mut walk = walk_category(wiki, &options.category, &options.walk, progress)?;
    let mut stats = FileRecords::new();

    for file in walk.by_ref() {
        let path = storage_path(&wiki.file_url(&file)?)?;
        match fetcher.fetch_requests(http, &file, &path, &options.window, frequency) {
            Ok(records) => {
                stats.insert(file.title().to_string(), records);
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => debug!("{error}"),
        }
    }
    let files_examined = walk.yielded();

    if stats.is_empty() {
        info!(category = options.category.title(), "found no stats for the category");
        return Ok(MediaViewsOutcome::NoResults { files_examined });
    }
    info!("found stats for {} files", stats.len());

    let files_with_stats = stats.len();
    Ok(MediaViewsOutcome::Stats(MediaViewsReport {
        files_examined,
        files_with_stats,
        result: aggregate(stats, options.output),
    }))
}

#[derive(Debug, Deserialize)]
struct MediaRequestsResponse {
    items: Vec<MediaRequestItem>,
}

#[derive(Debug, Deserialize)]
struct MediaRequestItem {
    timestamp: String,
    requests: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}
