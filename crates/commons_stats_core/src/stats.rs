use std::collections::BTreeMap;

use serde::Serialize;

use crate::wiki::UsagePage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Files with at least one usage anywhere.
    #[serde(rename = "used files")]
    pub used_files: usize,
    /// (file, page) usage pairs.
    pub usages: usize,
    pub pages: usize,
    pub sites: usize,
}

/// site → page → file names embedded on that page. Only ever grows during a run.
#[derive(Debug, Clone, Default)]
pub struct UsageIndex {
    sites: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    used_files: usize,
    usages: usize,
}

impl UsageIndex {
    pub fn record(&mut self, file_name: &str, usages: &[UsagePage]) {
        if usages.is_empty() {
            return;
        }
        self.used_files += 1;
        for usage in usages {
            self.usages += 1;
            self.sites
                .entry(usage.site.clone())
                .or_default()
                .entry(usage.title.clone())
                .or_default()
                .push(file_name.to_string());
        }
    }

    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            used_files: self.used_files,
            usages: self.usages,
            pages: self.sites.values().map(BTreeMap::len).sum(),
            sites: self.sites.len(),
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<String>>)> {
        self.sites
            .iter()
            .map(|(site, pages)| (site.as_str(), pages))
    }
}
