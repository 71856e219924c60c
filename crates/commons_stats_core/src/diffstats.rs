//! Summary of a structured-data diff run: how many files changed, and the net number of
//! captions, categories and statements added.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeSet<T> {
    #[serde(default)]
    pub added: Vec<T>,
    #[serde(default)]
    pub removed: Vec<T>,
}

impl<T> ChangeSet<T> {
    fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    fn net(&self) -> i64 {
        let added = i64::try_from(self.added.len()).unwrap_or(i64::MAX);
        let removed = i64::try_from(self.removed.len()).unwrap_or(i64::MAX);
        added.saturating_sub(removed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionChange {
    #[serde(default)]
    pub changed: bool,
}

/// One file of the diff output. Captions are `{language: text}` objects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileDiff {
    #[serde(default)]
    pub captions: ChangeSet<BTreeMap<String, Value>>,
    #[serde(default)]
    pub categories: ChangeSet<Value>,
    #[serde(default)]
    pub statements: ChangeSet<Value>,
    #[serde(default)]
    pub description: DescriptionChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub all: usize,
    pub changed: usize,
    /// Net additions.
    pub captions: i64,
    pub categories: i64,
    pub statements: i64,
    /// Files whose description changed, not the number of edits.
    pub descriptions: usize,
    /// Distinct languages among added captions.
    pub caption_languages: usize,
}

pub fn analyse_diffs(diffs: &[FileDiff]) -> DiffStats {
    let mut stats = DiffStats::default();
    let mut languages = BTreeSet::new();
    for diff in diffs {
        stats.all += 1;
        let mut changed = false;
        if diff.captions.is_changed() {
            changed = true;
            stats.captions += diff.captions.net();
        }
        if diff.categories.is_changed() {
            changed = true;
            stats.categories += diff.categories.net();
        }
        if diff.statements.is_changed() {
            changed = true;
            stats.statements += diff.statements.net();
        }
        if diff.description.changed {
            changed = true;
            stats.descriptions += 1;
        }
        if changed {
            stats.changed += 1;
        }
        for caption in &diff.captions.added {
            if let Some(language) = caption.keys().next() {
                languages.insert(language.clone());
            }
        }
    }
    stats.caption_languages = languages.len();
    stats
}

#[cfg(test)]
mod tests {
    use super::{DiffStats, FileDiff, analyse_diffs};

    #[test]
    fn changes_are_netted_per_kind() {
        let diffs: Vec<FileDiff> = serde_json::from_str(
            r#"[
                {"captions": {"added": [{"en": "Harbour"}, {"sv": "Hamn"}], "removed": []},
                 "categories": {"added": ["Category:Ports"], "removed": []},
                 "statements": {"added": [], "removed": ["P180"]},
                 "description": {"changed": false}},
                {"captions": {"added": [{"en": "Harbour at dusk"}], "removed": [{"en": "Harbour"}]},
                 "categories": {"added": [], "removed": []},
                 "statements": {"added": [], "removed": []},
                 "description": {"changed": true}},
                {"captions": {"added": [], "removed": []},
                 "categories": {"added": [], "removed": []},
                 "statements": {"added": [], "removed": []},
                 "description": {"changed": false}}
            ]"#,
        )
        .expect("diffs");

        assert_eq!(
            analyse_diffs(&diffs),
            DiffStats {
                all: 3,
                changed: 2,
                captions: 2,
                categories: 1,
                statements: -1,
                descriptions: 1,
                caption_languages: 2,
            }
        );
    }

    #[test]
    fn missing_sections_count_as_unchanged() {
        let diffs: Vec<FileDiff> = serde_json::from_str(r#"[{}]"#).expect("diffs");
        let stats = analyse_diffs(&diffs);
        assert_eq!(stats.all, 1);
        assert_eq!(stats.changed, 0);
    }
}
