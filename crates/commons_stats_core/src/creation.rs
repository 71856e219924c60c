use std::collections::BTreeMap;

use tracing::info;

use crate::error::StatsResult;
use crate::walker::{ProgressSink, WalkOptions, walk_category};
use crate::wiki::{CategoryRef, WikiSource};

/// `YYYY-MM` of a file's first revision → number of files created that month.
pub type CreationCounts = BTreeMap<String, usize>;

pub fn count_file_creations<W: WikiSource>(
    wiki: &mut W,
    category: &CategoryRef,
    walk: &WalkOptions,
    progress: &mut dyn ProgressSink,
) -> StatsResult<CreationCounts> {
    let mut files = walk_category(wiki, category, walk, progress)?;
    let mut counts = CreationCounts::new();
    for file in files.by_ref() {
        let created = wiki.oldest_revision_timestamp(&file)?;
        *counts
            .entry(created.format("%Y-%m").to_string())
            .or_default() += 1;
    }
    info!(
        category = category.title(),
        files = files.yielded(),
        months = counts.len(),
        "counted file creations"
    );
    Ok(counts)
}
