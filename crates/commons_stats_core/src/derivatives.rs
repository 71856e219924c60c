use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use crate::error::StatsResult;
use crate::walker::{ProgressSink, WalkOptions, walk_category};
use crate::wiki::{CategoryRef, WikiSource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivativeReport {
    /// File title → File-namespace pages linking to it. Files without such links are omitted.
    pub links: BTreeMap<String, Vec<String>>,
    pub relations: usize,
}

pub fn find_derivatives<W: WikiSource>(
    wiki: &mut W,
    category: &CategoryRef,
    walk: &WalkOptions,
    progress: &mut dyn ProgressSink,
) -> StatsResult<DerivativeReport> {
    let mut links = BTreeMap::new();
    for file in walk_category(wiki, category, walk, progress)? {
        let backlinks = wiki.file_backlinks(&file)?;
        if !backlinks.is_empty() {
            links.insert(file.title().to_string(), backlinks);
        }
    }
    let relations = count_relations(&links);
    info!(
        category = category.title(),
        linked = links.len(),
        relations,
        "collected file backlinks"
    );
    Ok(DerivativeReport { links, relations })
}

/// Unordered pairs, so A → B and B → A count once. A file linking to itself is one relation.
pub fn count_relations(links: &BTreeMap<String, Vec<String>>) -> usize {
    let mut pairs = BTreeSet::new();
    for (file, linking) in links {
        for other in linking {
            let pair = if file < other {
                (file.as_str(), other.as_str())
            } else {
                (other.as_str(), file.as_str())
            };
            pairs.insert(pair);
        }
    }
    pairs.len()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{count_relations, find_derivatives};
    use crate::testing::MockWiki;
    use crate::walker::{NoProgress, WalkOptions};
    use crate::wiki::CategoryRef;

    #[test]
    fn mutual_links_count_once() {
        let links = BTreeMap::from([
            (
                "File:A.jpg".to_string(),
                vec!["File:B.jpg".to_string(), "File:C.png".to_string()],
            ),
            ("File:B.jpg".to_string(), vec!["File:A.jpg".to_string()]),
            ("File:C.png".to_string(), vec!["File:C.png".to_string()]),
        ]);
        assert_eq!(count_relations(&links), 3);
    }

    #[test]
    fn files_without_backlinks_are_left_out() {
        let mut wiki = MockWiki::default();
        wiki.category("Category:Maps", &["A.jpg", "B.jpg"], &[]);
        wiki.backlinks
            .insert("File:A.jpg".to_string(), vec!["File:A cropped.jpg".to_string()]);

        let report = find_derivatives(
            &mut wiki,
            &CategoryRef::new("Maps"),
            &WalkOptions::default(),
            &mut NoProgress,
        )
        .expect("report");

        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links["File:A.jpg"], vec!["File:A cropped.jpg".to_string()]);
        assert_eq!(report.relations, 1);
    }
}
