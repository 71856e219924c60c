use std::collections::{BTreeMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::HttpFetch;
use crate::error::{StatsError, StatsResult};

pub const NS_FILE: i32 = 6;
pub const NS_CATEGORY: i32 = 14;

const FILE_PREFIX: &str = "File:";
const CATEGORY_PREFIX: &str = "Category:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CategoryRef {
    title: String,
}

impl CategoryRef {
    /// Accepts the name with or without the `Category:` prefix.
    pub fn new(name: &str) -> Self {
        let name = normalize_title(name);
        let title = if name.starts_with(CATEGORY_PREFIX) {
            name
        } else {
            format!("{CATEGORY_PREFIX}{name}")
        };
        Self { title }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn name(&self) -> &str {
        self.title
            .strip_prefix(CATEGORY_PREFIX)
            .unwrap_or(&self.title)
    }
}

/// A file page. Equality and hashing use the normalized title only, so the same file
/// reached through different subcategories compares equal.
#[derive(Debug, Clone, Serialize)]
pub struct FileIdentity {
    title: String,
}

impl FileIdentity {
    pub fn new(title: &str) -> Self {
        let title = normalize_title(title);
        let title = if title.starts_with(FILE_PREFIX) {
            title
        } else {
            format!("{FILE_PREFIX}{title}")
        };
        Self { title }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title without the namespace prefix, as it appears in media lists and galleries.
    pub fn name(&self) -> &str {
        self.title.strip_prefix(FILE_PREFIX).unwrap_or(&self.title)
    }
}

impl PartialEq for FileIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
    }
}

impl Eq for FileIdentity {}

impl Hash for FileIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
    }
}

/// A page embedding a file. `site` is the wiki's server name, e.g. `en.wikipedia.org`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UsagePage {
    pub site: String,
    pub title: String,
}

/// Category membership and file metadata the collectors depend on.
pub trait WikiSource {
    /// Files in `category`, descending `depth` levels of subcategories (`None` or negative
    /// means direct members only). May contain duplicates. `limit` bounds the number of
    /// distinct files the source needs to produce.
    fn category_members(
        &mut self,
        category: &CategoryRef,
        depth: Option<i32>,
        limit: Option<usize>,
    ) -> StatsResult<Vec<FileIdentity>>;
    /// Advisory file count of the category itself; may be stale.
    fn category_file_count(&mut self, category: &CategoryRef) -> StatsResult<Option<u64>>;
    fn file_url(&mut self, file: &FileIdentity) -> StatsResult<String>;
    fn global_usage(&mut self, file: &FileIdentity) -> StatsResult<Vec<UsagePage>>;
    /// Non-redirect File-namespace pages linking to `file`.
    fn file_backlinks(&mut self, file: &FileIdentity) -> StatsResult<Vec<String>>;
    fn oldest_revision_timestamp(&mut self, file: &FileIdentity) -> StatsResult<DateTime<Utc>>;
}

pub struct MediaWikiClient<H: HttpFetch> {
    api_url: String,
    http: H,
}

impl<H: HttpFetch> MediaWikiClient<H> {
    pub fn new(api_url: &str, http: H) -> Self {
        Self {
            api_url: api_url.to_string(),
            http,
        }
    }

    pub fn request_count(&self) -> usize {
        self.http.request_count()
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> StatsResult<QueryResponse> {
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }
        let url = Url::parse_with_params(&self.api_url, &pairs)
            .map_err(|error| StatsError::Config(format!("invalid API URL {}: {error}", self.api_url)))?;

        let response = self.http.get(url.as_str())?;
        if !response.is_success() {
            return Err(response.client_error());
        }
        let payload: Value = response.json()?;
        if let Some(error) = payload.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info");
            return Err(StatsError::Wiki(format!("[{code}]: {info}")));
        }
        serde_json::from_value(payload)
            .map_err(|error| StatsError::malformed(url.as_str(), error.to_string()))
    }

    /// Runs a query following `continue` blocks until exhausted or `each` returns false.
    fn query_continued<F>(&mut self, params: &[(&str, String)], mut each: F) -> StatsResult<()>
    where
        F: FnMut(QueryPayload) -> bool,
    {
        let mut continuation = BTreeMap::<String, String>::new();
        loop {
            let mut request = params.to_vec();
            for (key, value) in &continuation {
                request.push((key.as_str(), value.clone()));
            }
            let parsed = self.request_json_get(&request)?;
            if !each(parsed.query) {
                return Ok(());
            }
            match parsed.continuation {
                Some(next) if !next.is_empty() => {
                    continuation = next
                        .into_iter()
                        .map(|(key, value)| {
                            let value = match value {
                                Value::String(text) => text,
                                other => other.to_string(),
                            };
                            (key, value)
                        })
                        .collect();
                }
                _ => return Ok(()),
            }
        }
    }

    fn single_page(&mut self, params: &[(&str, String)], title: &str) -> StatsResult<PageItem> {
        let parsed = self.request_json_get(params)?;
        let page = parsed
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| StatsError::Wiki(format!("no page returned for {title}")))?;
        if page.missing.unwrap_or(false) {
            return Err(StatsError::Wiki(format!("page does not exist: {title}")));
        }
        Ok(page)
    }
}

impl<H: HttpFetch> WikiSource for MediaWikiClient<H> {
    fn category_members(
        &mut self,
        category: &CategoryRef,
        depth: Option<i32>,
        limit: Option<usize>,
    ) -> StatsResult<Vec<FileIdentity>> {
        let max_depth = depth.filter(|value| *value > 0).unwrap_or(0);
        let mut members = Vec::new();
        let mut distinct = HashSet::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(category.clone(), 0)]);
        let limit_reached =
            |distinct: &HashSet<String>| limit.is_some_and(|limit| distinct.len() >= limit);

        while let Some((current, level)) = queue.pop_front() {
            if !visited.insert(current.title().to_string()) {
                continue;
            }
            if limit_reached(&distinct) {
                break;
            }
            debug!(category = current.title(), level, "listing category members");
            let member_types = if level < max_depth {
                "file|subcat"
            } else {
                "file"
            };
            let params = [
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", current.title().to_string()),
                ("cmtype", member_types.to_string()),
                ("cmprop", "title".to_string()),
                ("cmlimit", "max".to_string()),
            ];
            self.query_continued(&params, |payload| {
                for item in payload.categorymembers {
                    if item.ns == NS_CATEGORY {
                        queue.push_back((CategoryRef::new(&item.title), level + 1));
                        continue;
                    }
                    if item.ns != NS_FILE {
                        continue;
                    }
                    let file = FileIdentity::new(&item.title);
                    distinct.insert(file.title().to_string());
                    members.push(file);
                    if limit_reached(&distinct) {
                        return false;
                    }
                }
                true
            })?;
        }

        Ok(members)
    }

    fn category_file_count(&mut self, category: &CategoryRef) -> StatsResult<Option<u64>> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("prop", "categoryinfo".to_string()),
                ("titles", category.title().to_string()),
            ],
            category.title(),
        );
        match page {
            Ok(page) => Ok(page.categoryinfo.map(|info| info.files)),
            // Categories without a description page still have members.
            Err(StatsError::Wiki(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn file_url(&mut self, file: &FileIdentity) -> StatsResult<String> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("prop", "imageinfo".to_string()),
                ("iiprop", "url".to_string()),
                ("titles", file.title().to_string()),
            ],
            file.title(),
        )?;
        page.imageinfo
            .into_iter()
            .next()
            .map(|info| info.url)
            .ok_or_else(|| StatsError::Wiki(format!("no file info for {}", file.title())))
    }

    fn global_usage(&mut self, file: &FileIdentity) -> StatsResult<Vec<UsagePage>> {
        let mut usages = Vec::new();
        let params = [
            ("action", "query".to_string()),
            ("prop", "globalusage".to_string()),
            ("gulimit", "max".to_string()),
            ("titles", file.title().to_string()),
        ];
        self.query_continued(&params, |payload| {
            for page in payload.pages {
                for usage in page.globalusage {
                    usages.push(UsagePage {
                        site: usage.wiki,
                        title: normalize_title(&usage.title),
                    });
                }
            }
            true
        })?;
        Ok(usages)
    }

    fn file_backlinks(&mut self, file: &FileIdentity) -> StatsResult<Vec<String>> {
        let mut titles = Vec::new();
        let params = [
            ("action", "query".to_string()),
            ("list", "backlinks".to_string()),
            ("bltitle", file.title().to_string()),
            ("blnamespace", NS_FILE.to_string()),
            ("blfilterredir", "nonredirects".to_string()),
            ("bllimit", "max".to_string()),
        ];
        self.query_continued(&params, |payload| {
            titles.extend(payload.backlinks.into_iter().map(|item| item.title));
            true
        })?;
        Ok(titles)
    }

    fn oldest_revision_timestamp(&mut self, file: &FileIdentity) -> StatsResult<DateTime<Utc>> {
        let page = self.single_page(
            &[
                ("action", "query".to_string()),
                ("prop", "revisions".to_string()),
                ("rvprop", "timestamp".to_string()),
                ("rvdir", "newer".to_string()),
                ("rvlimit", "1".to_string()),
                ("titles", file.title().to_string()),
            ],
            file.title(),
        )?;
        let revision = page
            .revisions
            .into_iter()
            .next()
            .ok_or_else(|| StatsError::Wiki(format!("no revisions for {}", file.title())))?;
        DateTime::parse_from_rfc3339(&revision.timestamp)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| {
                StatsError::Wiki(format!(
                    "invalid revision timestamp {}: {error}",
                    revision.timestamp
                ))
            })
    }
}

pub fn normalize_title(title: &str) -> String {
    title.replace('_', " ").trim().to_string()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    categorymembers: Vec<CategoryMemberItem>,
    #[serde(default)]
    pages: Vec<PageItem>,
    #[serde(default)]
    backlinks: Vec<TitleItem>,
}

#[derive(Debug, Deserialize)]
struct CategoryMemberItem {
    ns: i32,
    title: String,
}

#[derive(Debug, Deserialize)]
struct TitleItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    missing: Option<bool>,
    categoryinfo: Option<CategoryInfo>,
    #[serde(default)]
    imageinfo: Vec<ImageInfoItem>,
    #[serde(default)]
    globalusage: Vec<GlobalUsageItem>,
    #[serde(default)]
    revisions: Vec<RevisionItem>,
}

#[derive(Debug, Deserialize)]
struct CategoryInfo {
    #[serde(default)]
    files: u64,
}

#[derive(Debug, Deserialize)]
struct ImageInfoItem {
    url: String,
}

#[derive(Debug, Deserialize)]
struct GlobalUsageItem {
    title: String,
    wiki: String,
}

#[derive(Debug, Deserialize)]
struct RevisionItem {
    timestamp: String,
}
