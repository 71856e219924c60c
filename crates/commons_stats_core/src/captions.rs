//! Captions of category files across every wiki that embeds them.
//!
//! Each (site, page) is resolved through an ordered chain: the structured media-list
//! endpoint first, then the rendered-HTML gallery scan for files the media list left
//! without a caption. A 404 from either endpoint disables that endpoint for the site
//! for the rest of the run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::HttpFetch;
use crate::error::{StatsError, StatsResult};
use crate::gallery::fetch_gallery_captions;
use crate::stats::{RunStatistics, UsageIndex};
use crate::support::{Endpoint, EndpointSupport};
use crate::walker::{ProgressSink, WalkOptions, walk_category};
use crate::wiki::{CategoryRef, WikiSource, normalize_title};

/// File name → trimmed caption, `None` when the file is listed without a caption object.
pub type MediaList = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionLookup {
    Found(String),
    /// Listed with an empty caption.
    Blank,
    /// The source was consulted and has no caption for the file.
    Absent,
    /// The source was not consulted, e.g. unsupported on this site.
    NotAttempted,
}

/// Result of one strategy for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome<T> {
    Fetched(T),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptionSource {
    MediaList,
    Gallery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionRecord {
    /// `None` (or empty) only in keep-empty mode, marking a file without a caption.
    pub caption: Option<String>,
    pub site: String,
    pub page: String,
    pub source: CaptionSource,
}

#[derive(Debug, Clone)]
pub struct CaptionOptions {
    pub category: CategoryRef,
    pub walk: WalkOptions,
    /// Consult `<gallery>` contents for files missing from the media list. Slower.
    pub gallery: bool,
    /// Record blank and missing captions instead of dropping them.
    pub keep_empty: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptionReport {
    pub stats: RunStatistics,
    pub results: BTreeMap<String, Vec<CaptionRecord>>,
    pub unsupported: Vec<UnsupportedEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedEndpoint {
    pub site: String,
    pub endpoint: Endpoint,
}

pub fn media_list_url(site: &str, page: &str) -> String {
    format!(
        "https://{site}/api/rest_v1/page/media-list/{}",
        urlencoding::encode(page)
    )
}

/// Stage A. Does not capture captions inside `<gallery>` blocks.
pub fn fetch_media_list<H: HttpFetch>(
    http: &mut H,
    site: &str,
    page: &str,
    drop_empty: bool,
) -> StatsResult<MediaList> {
    let url = media_list_url(site, page);
    debug!(site, page, "looking up media list");
    let response = http.get(&url)?;
    if response.status == 404 {
        return Err(StatsError::EndpointNotFound { url });
    }
    if !response.is_success() {
        return Err(response.client_error());
    }
    let payload: MediaListResponse = response.json()?;

    let mut media = MediaList::new();
    for item in payload.items {
        let caption = item
            .caption
            .and_then(|caption| caption.text)
            .map(|text| text.trim().to_string());
        if drop_empty && caption.as_deref().is_none_or(str::is_empty) {
            continue;
        }
        let name = item
            .title
            .split_once(':')
            .map(|(_, name)| name)
            .unwrap_or(&item.title);
        media.insert(normalize_title(name), caption);
    }
    Ok(media)
}

pub fn lookup(media: &MediaList, file: &str) -> CaptionLookup {
    match media.get(file) {
        Some(Some(text)) if !text.is_empty() => CaptionLookup::Found(text.clone()),
        Some(Some(_)) => CaptionLookup::Blank,
        Some(None) | None => CaptionLookup::Absent,
    }
}

/// Runs one endpoint for a site, turning a 404 into a permanent unsupported mark.
fn run_strategy<T>(
    support: &mut EndpointSupport,
    site: &str,
    endpoint: Endpoint,
    fetch: impl FnOnce() -> StatsResult<T>,
) -> StatsResult<StrategyOutcome<T>> {
    if !support.is_supported(site, endpoint) {
        return Ok(StrategyOutcome::Unsupported);
    }
    match fetch() {
        Ok(value) => Ok(StrategyOutcome::Fetched(value)),
        Err(StatsError::EndpointNotFound { .. }) => {
            if support.mark_unsupported(site, endpoint) {
                warn!("{site} does not support the {} endpoint", endpoint.as_str());
            }
            Ok(StrategyOutcome::Unsupported)
        }
        Err(error) => Err(error),
    }
}

/// Caption lookups for `files` on one page, in the order given.
pub fn resolve_page<H: HttpFetch>(
    http: &mut H,
    support: &mut EndpointSupport,
    site: &str,
    page: &str,
    files: &[String],
    options: &CaptionOptions,
) -> StatsResult<Vec<(String, CaptionLookup, CaptionSource)>> {
    let drop_empty = !options.gallery && !options.keep_empty;
    let media = match run_strategy(support, site, Endpoint::MediaList, || {
        fetch_media_list(http, site, page, drop_empty)
    })? {
        StrategyOutcome::Fetched(media) => media,
        StrategyOutcome::Unsupported => {
            return Ok(files
                .iter()
                .map(|file| (file.clone(), CaptionLookup::NotAttempted, CaptionSource::MediaList))
                .collect());
        }
    };

    let mut resolved = files
        .iter()
        .map(|file| (file.clone(), lookup(&media, file), CaptionSource::MediaList))
        .collect::<Vec<_>>();

    let missing = resolved
        .iter()
        .any(|(_, lookup, _)| *lookup == CaptionLookup::Absent);
    if !options.gallery || !missing {
        return Ok(resolved);
    }

    let gallery = run_strategy(support, site, Endpoint::Html, || {
        fetch_gallery_captions(http, site, page, None)
    })?;
    if let StrategyOutcome::Fetched(gallery) = gallery {
        for (file, lookup, source) in &mut resolved {
            if *lookup != CaptionLookup::Absent {
                continue;
            }
            if let Some(Some(caption)) = gallery.get(file.as_str()) {
                *lookup = CaptionLookup::Found(caption.clone());
                *source = CaptionSource::Gallery;
            }
        }
    }
    Ok(resolved)
}

fn to_record(
    lookup: CaptionLookup,
    source: CaptionSource,
    site: &str,
    page: &str,
    keep_empty: bool,
) -> Option<CaptionRecord> {
    let caption = match lookup {
        CaptionLookup::Found(text) => Some(text),
        CaptionLookup::Blank if keep_empty => Some(String::new()),
        CaptionLookup::Absent if keep_empty => None,
        _ => return None,
    };
    Some(CaptionRecord {
        caption,
        site: site.to_string(),
        page: page.to_string(),
        source,
    })
}

pub fn collect_captions<W: WikiSource, H: HttpFetch>(
    wiki: &mut W,
    http: &mut H,
    options: &CaptionOptions,
    progress: &mut dyn ProgressSink,
) -> StatsResult<CaptionReport> {
    let mut index = UsageIndex::default();
    for file in walk_category(wiki, &options.category, &options.walk, progress)? {
        let usages = wiki.global_usage(&file)?;
        index.record(file.name(), &usages);
    }
    let stats = index.statistics();
    info!(
        "found {} files used {} times across {} pages on {} sites",
        stats.used_files, stats.usages, stats.pages, stats.sites
    );

    let mut support = EndpointSupport::default();
    let mut results = BTreeMap::<String, Vec<CaptionRecord>>::new();
    for (site, pages) in index.sites() {
        info!(site, pages = pages.len(), "processing captions");
        for (page, page_files) in pages {
            if !support.is_supported(site, Endpoint::MediaList) {
                break;
            }
            let resolved = resolve_page(http, &mut support, site, page, page_files, options)?;
            for (file, lookup, source) in resolved {
                if let Some(record) = to_record(lookup, source, site, page, options.keep_empty) {
                    results.entry(file).or_default().push(record);
                }
            }
        }
    }

    let unsupported = support
        .unsupported()
        .map(|(site, endpoint)| UnsupportedEndpoint {
            site: site.to_string(),
            endpoint,
        })
        .collect();
    Ok(CaptionReport {
        stats,
        results,
        unsupported,
    })
}

#[derive(Debug, Deserialize)]
struct MediaListResponse {
    items: Vec<MediaListItem>,
}

#[derive(Debug, Deserialize)]
struct MediaListItem {
    title: String,
    caption: Option<MediaListCaption>,
}

#[derive(Debug, Deserialize)]
struct MediaListCaption {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{
        CaptionLookup, CaptionOptions, CaptionSource, MediaList, collect_captions,
        fetch_media_list, lookup, resolve_page,
    };
    use crate::error::StatsError;
    use crate::support::{Endpoint, EndpointSupport};
    use crate::testing::{MockHttp, MockWiki};
    use crate::walker::{NoProgress, WalkOptions};
    use crate::wiki::CategoryRef;

    const MEDIA_LIST: &str = r#"{"items":[
        {"title":"File:File_A.jpg","caption":{"text":"  Harbour at dusk "}},
        {"title":"File:File_B.jpg"},
        {"title":"File:File_C.jpg","caption":{"text":"   "}}
    ]}"#;

    const GALLERY_HTML: &str = r#"<html><body><ul class="gallery">
        <li class="gallerybox"><a href="./File:File_A.jpg" class="mw-file-description" title="Redundant"></a></li>
        <li class="gallerybox"><a href="./File:File_B.jpg" class="mw-file-description" title="From gallery"></a></li>
    </ul></body></html>"#;

    fn options(gallery: bool, keep_empty: bool) -> CaptionOptions {
        CaptionOptions {
            category: CategoryRef::new("Harbours"),
            walk: WalkOptions::default(),
            gallery,
            keep_empty,
        }
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn media_list_normalizes_names_and_trims_captions() {
        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);
        let media = fetch_media_list(&mut http, "en.example.org", "Harbour", false)
            .expect("media list");
        assert_eq!(
            media,
            MediaList::from([
                ("File A.jpg".to_string(), Some("Harbour at dusk".to_string())),
                ("File B.jpg".to_string(), None),
                ("File C.jpg".to_string(), Some(String::new())),
            ])
        );
        assert_eq!(lookup(&media, "File A.jpg"), CaptionLookup::Found("Harbour at dusk".to_string()));
        assert_eq!(lookup(&media, "File B.jpg"), CaptionLookup::Absent);
        assert_eq!(lookup(&media, "File C.jpg"), CaptionLookup::Blank);
        assert_eq!(lookup(&media, "File D.jpg"), CaptionLookup::Absent);
    }

    #[test]
    fn drop_empty_omits_blank_and_missing_captions() {
        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);
        let media = fetch_media_list(&mut http, "en.example.org", "Harbour", true)
            .expect("media list");
        assert_eq!(media.len(), 1);
        assert!(media.contains_key("File A.jpg"));
    }

    #[test]
    fn gallery_is_consulted_only_for_files_missing_a_caption() {
        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);
        http.route("/page/html/", 200, GALLERY_HTML);
        let mut support = EndpointSupport::default();

        let resolved = resolve_page(
            &mut http,
            &mut support,
            "en.example.org",
            "Harbour",
            &files(&["File A.jpg", "File B.jpg", "File C.jpg"]),
            &options(true, false),
        )
        .expect("resolve");

        assert_eq!(
            resolved,
            vec![
                (
                    "File A.jpg".to_string(),
                    CaptionLookup::Found("Harbour at dusk".to_string()),
                    CaptionSource::MediaList
                ),
                (
                    "File B.jpg".to_string(),
                    CaptionLookup::Found("From gallery".to_string()),
                    CaptionSource::Gallery
                ),
                ("File C.jpg".to_string(), CaptionLookup::Blank, CaptionSource::MediaList),
            ]
        );
    }

    #[test]
    fn gallery_is_skipped_when_every_file_is_resolved() {
        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);
        http.route("/page/html/", 200, GALLERY_HTML);
        let mut support = EndpointSupport::default();

        resolve_page(
            &mut http,
            &mut support,
            "en.example.org",
            "Harbour",
            &files(&["File A.jpg", "File C.jpg"]),
            &options(true, false),
        )
        .expect("resolve");
        assert_eq!(http.requests_matching("/page/html/"), 0);
    }

    #[test]
    fn missing_media_list_endpoint_short_circuits_the_site() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Harbours", &["File A.jpg", "File B.jpg"], &[]);
        wiki.usage("File A.jpg", "old.example.org", "Page 1");
        wiki.usage("File B.jpg", "old.example.org", "Page 2");
        wiki.usage("File B.jpg", "old.example.org", "Page 3");
        wiki.usage("File A.jpg", "en.example.org", "Harbour");

        let mut http = MockHttp::default();
        http.route("old.example.org/api/rest_v1/page/media-list/", 404, "");
        http.route("en.example.org/api/rest_v1/page/media-list/", 200, MEDIA_LIST);

        let report = collect_captions(&mut wiki, &mut http, &options(false, false), &mut NoProgress)
            .expect("run");

        assert_eq!(http.requests_matching("old.example.org"), 1);
        assert_eq!(report.stats.used_files, 2);
        assert_eq!(report.stats.usages, 4);
        assert_eq!(report.stats.pages, 4);
        assert_eq!(report.stats.sites, 2);
        assert_eq!(report.results.len(), 1);
        assert_eq!(
            report.results["File A.jpg"][0].caption.as_deref(),
            Some("Harbour at dusk")
        );
        assert_eq!(report.unsupported.len(), 1);
        assert_eq!(report.unsupported[0].site, "old.example.org");
        assert_eq!(report.unsupported[0].endpoint, Endpoint::MediaList);
    }

    #[test]
    fn missing_html_endpoint_keeps_media_list_running() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Harbours", &["File B.jpg"], &[]);
        wiki.usage("File B.jpg", "en.example.org", "Page 1");
        wiki.usage("File B.jpg", "en.example.org", "Page 2");

        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);
        http.route("/page/html/", 404, "");

        let report = collect_captions(&mut wiki, &mut http, &options(true, false), &mut NoProgress)
            .expect("run");

        assert_eq!(http.requests_matching("/page/media-list/"), 2);
        assert_eq!(http.requests_matching("/page/html/"), 1);
        assert!(report.results.is_empty());
    }

    #[test]
    fn keep_empty_records_sentinels_for_uncaptioned_files() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Harbours", &["File B.jpg", "File C.jpg"], &[]);
        wiki.usage("File B.jpg", "en.example.org", "Harbour");
        wiki.usage("File C.jpg", "en.example.org", "Harbour");

        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);

        let report = collect_captions(&mut wiki, &mut http, &options(false, true), &mut NoProgress)
            .expect("run");

        assert_eq!(report.results["File B.jpg"][0].caption, None);
        assert_eq!(report.results["File C.jpg"][0].caption.as_deref(), Some(""));
    }

    #[test]
    fn captions_accumulate_across_pages_and_sites() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Harbours", &["File A.jpg"], &[]);
        wiki.usage("File A.jpg", "en.example.org", "Harbour");
        wiki.usage("File A.jpg", "sv.example.org", "Hamn");

        let mut http = MockHttp::default();
        http.route("/page/media-list/", 200, MEDIA_LIST);

        let report = collect_captions(&mut wiki, &mut http, &options(false, false), &mut NoProgress)
            .expect("run");
        let records = &report.results["File A.jpg"];
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].site, "en.example.org");
        assert_eq!(records[1].page, "Hamn");
    }

    #[test]
    fn server_failures_abort_the_run() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Harbours", &["File A.jpg"], &[]);
        wiki.usage("File A.jpg", "en.example.org", "Harbour");

        let mut http = MockHttp::default();
        http.route("/page/media-list/", 403, "");

        let error = collect_captions(&mut wiki, &mut http, &options(false, false), &mut NoProgress)
            .expect_err("must fail");
        assert!(matches!(error, StatsError::ClientError { status: 403, .. }));
    }
}
