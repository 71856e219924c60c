use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::client::{HttpFetch, RemoteResponse};
use crate::error::{StatsError, StatsResult};
use crate::wiki::{CategoryRef, FileIdentity, UsagePage, WikiSource};

/// Routes by URL substring; the first matching route wins.
#[derive(Default)]
pub struct MockHttp {
    routes: Vec<(String, u16, String)>,
    pub requests: Vec<String>,
}

impl MockHttp {
    pub fn route(&mut self, pattern: &str, status: u16, body: &str) {
        self.routes
            .push((pattern.to_string(), status, body.to_string()));
    }

    pub fn requests_matching(&self, pattern: &str) -> usize {
        self.requests
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }
}

impl HttpFetch for MockHttp {
    fn get(&mut self, url: &str) -> StatsResult<RemoteResponse> {
        self.requests.push(url.to_string());
        let (_, status, body) = self
            .routes
            .iter()
            .find(|(pattern, _, _)| url.contains(pattern.as_str()))
            .ok_or_else(|| StatsError::TransientNetwork {
                url: url.to_string(),
                attempts: 1,
                message: "no mock route".to_string(),
            })?;
        Ok(RemoteResponse {
            url: url.to_string(),
            status: *status,
            body: body.clone(),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.len()
    }
}

#[derive(Default)]
pub struct MockWiki {
    tree: BTreeMap<String, (Vec<String>, Vec<String>)>,
    pub file_count: Option<u64>,
    pub file_urls: BTreeMap<String, String>,
    pub usages: BTreeMap<String, Vec<UsagePage>>,
    pub backlinks: BTreeMap<String, Vec<String>>,
    pub oldest: BTreeMap<String, DateTime<Utc>>,
    pub member_calls: Vec<(Option<i32>, Option<usize>)>,
}

impl MockWiki {
    pub fn category(&mut self, title: &str, files: &[&str], subcategories: &[&str]) {
        self.tree.insert(
            title.to_string(),
            (
                files.iter().map(ToString::to_string).collect(),
                subcategories.iter().map(ToString::to_string).collect(),
            ),
        );
    }

    pub fn usage(&mut self, file: &str, site: &str, page: &str) {
        self.usages
            .entry(FileIdentity::new(file).title().to_string())
            .or_default()
            .push(UsagePage {
                site: site.to_string(),
                title: page.to_string(),
            });
    }
}

impl WikiSource for MockWiki {
    fn category_members(
        &mut self,
        category: &CategoryRef,
        depth: Option<i32>,
        limit: Option<usize>,
    ) -> StatsResult<Vec<FileIdentity>> {
        self.member_calls.push((depth, limit));
        let max_depth = depth.filter(|value| *value > 0).unwrap_or(0);
        let mut members = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(category.title().to_string(), 0)]);
        while let Some((title, level)) = queue.pop_front() {
            if !visited.insert(title.clone()) {
                continue;
            }
            let Some((files, subcategories)) = self.tree.get(&title) else {
                continue;
            };
            members.extend(files.iter().map(|file| FileIdentity::new(file)));
            if level < max_depth {
                for sub in subcategories {
                    queue.push_back((sub.clone(), level + 1));
                }
            }
        }
        Ok(members)
    }

    fn category_file_count(&mut self, _category: &CategoryRef) -> StatsResult<Option<u64>> {
        Ok(self.file_count)
    }

    fn file_url(&mut self, file: &FileIdentity) -> StatsResult<String> {
        self.file_urls
            .get(file.title())
            .cloned()
            .ok_or_else(|| StatsError::Wiki(format!("no file info for {}", file.title())))
    }

    fn global_usage(&mut self, file: &FileIdentity) -> StatsResult<Vec<UsagePage>> {
        Ok(self.usages.get(file.title()).cloned().unwrap_or_default())
    }

    fn file_backlinks(&mut self, file: &FileIdentity) -> StatsResult<Vec<String>> {
        Ok(self.backlinks.get(file.title()).cloned().unwrap_or_default())
    }

    fn oldest_revision_timestamp(&mut self, file: &FileIdentity) -> StatsResult<DateTime<Utc>> {
        self.oldest
            .get(file.title())
            .copied()
            .ok_or_else(|| StatsError::Wiki(format!("no revisions for {}", file.title())))
    }
}
