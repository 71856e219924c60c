use std::collections::HashSet;

use tracing::warn;

use crate::error::StatsResult;
use crate::wiki::{CategoryRef, FileIdentity, WikiSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Forwarded unchanged to the membership source.
    pub depth: Option<i32>,
    /// Cap on distinct files yielded.
    pub limit: Option<usize>,
}

pub trait ProgressSink {
    fn begin(&mut self, total: Option<u64>);
    fn advance(&mut self, current: usize);
    fn finish(&mut self, _current: usize) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&mut self, _total: Option<u64>) {}
    fn advance(&mut self, _current: usize) {}
}

/// Yields each distinct file of a category once. A fresh walk always starts from the root.
pub struct CategoryWalk<'p> {
    members: std::vec::IntoIter<FileIdentity>,
    seen: HashSet<FileIdentity>,
    limit: Option<usize>,
    progress: &'p mut dyn ProgressSink,
    finished: bool,
}

impl CategoryWalk<'_> {
    pub fn yielded(&self) -> usize {
        self.seen.len()
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.progress.finish(self.seen.len());
        }
    }
}

impl Iterator for CategoryWalk<'_> {
    type Item = FileIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.limit.is_some_and(|limit| self.seen.len() >= limit) {
            self.finish();
            return None;
        }
        for file in self.members.by_ref() {
            // Same file can occur in several subcategories.
            if self.seen.insert(file.clone()) {
                self.progress.advance(self.seen.len());
                return Some(file);
            }
        }
        self.finish();
        None
    }
}

pub fn walk_category<'p, W: WikiSource + ?Sized>(
    wiki: &mut W,
    category: &CategoryRef,
    options: &WalkOptions,
    progress: &'p mut dyn ProgressSink,
) -> StatsResult<CategoryWalk<'p>> {
    let members = wiki.category_members(category, options.depth, options.limit)?;
    progress.begin(advisory_total(wiki, category, options));

    Ok(CategoryWalk {
        members: members.into_iter(),
        seen: HashSet::new(),
        limit: options.limit,
        progress,
        finished: false,
    })
}

/// Member counts are unknown under recursion and may be stale otherwise.
fn advisory_total<W: WikiSource + ?Sized>(
    wiki: &mut W,
    category: &CategoryRef,
    options: &WalkOptions,
) -> Option<u64> {
    if options.depth.is_some_and(|depth| depth > 0) {
        return None;
    }
    if let Some(limit) = options.limit {
        return u64::try_from(limit).ok();
    }
    match wiki.category_file_count(category) {
        Ok(total) => total,
        Err(error) => {
            warn!(category = category.title(), %error, "category file count unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NoProgress, ProgressSink, WalkOptions, walk_category};
    use crate::testing::MockWiki;
    use crate::wiki::{CategoryRef, FileIdentity};

    #[derive(Default)]
    struct RecordingProgress {
        total: Option<Option<u64>>,
        advances: Vec<usize>,
        finished: Option<usize>,
    }

    impl ProgressSink for RecordingProgress {
        fn begin(&mut self, total: Option<u64>) {
            self.total = Some(total);
        }

        fn advance(&mut self, current: usize) {
            self.advances.push(current);
        }

        fn finish(&mut self, current: usize) {
            self.finished = Some(current);
        }
    }

    fn tree() -> MockWiki {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Root", &["A.jpg", "B.jpg"], &["Category:Left", "Category:Right"]);
        wiki.category("Category:Left", &["C.jpg", "Shared.jpg"], &[]);
        wiki.category("Category:Right", &["Shared.jpg", "D.jpg"], &[]);
        wiki
    }

    fn titles(files: &[FileIdentity]) -> Vec<&str> {
        files.iter().map(FileIdentity::name).collect()
    }

    #[test]
    fn file_reachable_through_two_subcategories_is_yielded_once() {
        let mut wiki = tree();
        let mut progress = NoProgress;
        let files = walk_category(
            &mut wiki,
            &CategoryRef::new("Root"),
            &WalkOptions {
                depth: Some(1),
                limit: None,
            },
            &mut progress,
        )
        .expect("walk")
        .collect::<Vec<_>>();

        assert_eq!(
            titles(&files),
            vec!["A.jpg", "B.jpg", "C.jpg", "Shared.jpg", "D.jpg"]
        );
    }

    #[test]
    fn zero_depth_yields_direct_members_only() {
        let mut wiki = tree();
        let mut progress = NoProgress;
        let files = walk_category(
            &mut wiki,
            &CategoryRef::new("Root"),
            &WalkOptions {
                depth: Some(0),
                limit: None,
            },
            &mut progress,
        )
        .expect("walk")
        .collect::<Vec<_>>();

        assert_eq!(titles(&files), vec!["A.jpg", "B.jpg"]);
        assert_eq!(wiki.member_calls, vec![(Some(0), None)]);
    }

    #[test]
    fn limit_counts_distinct_files() {
        let mut wiki = tree();
        let mut progress = NoProgress;
        let files = walk_category(
            &mut wiki,
            &CategoryRef::new("Root"),
            &WalkOptions {
                depth: Some(1),
                limit: Some(4),
            },
            &mut progress,
        )
        .expect("walk")
        .collect::<Vec<_>>();

        assert_eq!(titles(&files), vec!["A.jpg", "B.jpg", "C.jpg", "Shared.jpg"]);
    }

    #[test]
    fn progress_total_is_advisory_and_may_be_wrong() {
        let mut wiki = tree();
        wiki.file_count = Some(40);
        let mut progress = RecordingProgress::default();
        let count = walk_category(
            &mut wiki,
            &CategoryRef::new("Root"),
            &WalkOptions::default(),
            &mut progress,
        )
        .expect("walk")
        .count();

        assert_eq!(count, 2);
        assert_eq!(progress.total, Some(Some(40)));
        assert_eq!(progress.advances, vec![1, 2]);
        assert_eq!(progress.finished, Some(2));
    }

    #[test]
    fn recursive_walk_reports_unknown_total() {
        let mut wiki = tree();
        wiki.file_count = Some(2);
        let mut progress = RecordingProgress::default();
        let count = walk_category(
            &mut wiki,
            &CategoryRef::new("Root"),
            &WalkOptions {
                depth: Some(1),
                limit: None,
            },
            &mut progress,
        )
        .expect("walk")
        .count();

        assert_eq!(count, 5);
        assert_eq!(progress.total, Some(None));
    }
}
