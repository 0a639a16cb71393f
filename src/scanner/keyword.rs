use std::path::Path;

use regex::RegexSet;

use super::{taxonomy::Taxonomy, Matcher};
use crate::errors::ScanError;

const EXTENSIONS: [&str; 2] = ["java", "kt"];

/// Literal substring search over the raw source text. A file counts once per
/// category no matter how many of its patterns occur. Never fails to parse.
pub struct KeywordMatcher<'t> {
    set: RegexSet,
    /// Category of each pattern in `set`, by index.
    owners: Vec<&'t str>,
}

impl<'t> KeywordMatcher<'t> {
    pub fn new(taxonomy: &'t Taxonomy) -> Result<Self, ScanError> {
        let mut patterns = Vec::new();
        let mut owners = Vec::new();
        for (category, names) in taxonomy.iter() {
            for name in names {
                patterns.push(regex::escape(name));
                owners.push(category);
            }
        }
        Ok(Self {
            set: RegexSet::new(patterns)?,
            owners,
        })
    }
}

impl<'t> Matcher<'t> for KeywordMatcher<'t> {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext))
    }

    fn hits(&mut self, source: &str) -> Option<Vec<&'t str>> {
        let mut hits: Vec<&'t str> = self
            .set
            .matches(source)
            .into_iter()
            .map(|i| self.owners[i])
            .collect();
        // owners are grouped by category, so duplicates are adjacent
        hits.dedup();
        Some(hits)
    }
}
