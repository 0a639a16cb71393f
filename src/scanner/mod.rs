mod ast;
mod keyword;
mod taxonomy;

pub use self::{ast::InvocationMatcher, keyword::KeywordMatcher, taxonomy::Taxonomy};

use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path},
};

use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::ScanError;

/// How decompiled sources are matched against the taxonomy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Method invocations in the Java syntax tree.
    #[default]
    Ast,
    /// Substrings of `.java` and `.kt` sources.
    Keyword,
}

pub trait Matcher<'t> {
    fn accepts(&self, path: &Path) -> bool;
    /// One category per matching occurrence, or `None` if the source could
    /// not be parsed.
    fn hits(&mut self, source: &str) -> Option<Vec<&'t str>>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Every accepted source file, relative to the sources root.
    pub files: Vec<String>,
    pub counts: BTreeMap<String, u64>,
    /// Files in which each category was seen, once per hit.
    pub hits: BTreeMap<String, Vec<String>>,
    /// Files that were listed but contributed nothing because they could
    /// not be read or parsed.
    pub skipped: usize,
}

impl ScanResult {
    /// All categories present with zero hits.
    pub fn empty(taxonomy: &Taxonomy) -> Self {
        Self {
            counts: taxonomy.categories().map(|c| (c.to_string(), 0)).collect(),
            hits: taxonomy.categories().map(|c| (c.to_string(), Vec::new())).collect(),
            ..Default::default()
        }
    }

    fn record(&mut self, category: &str, file: &str) {
        if let Some(count) = self.counts.get_mut(category) {
            *count += 1;
        }
        if let Some(files) = self.hits.get_mut(category) {
            files.push(file.to_string());
        }
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Scans the decompiled `sources` tree. A missing directory yields the empty
/// result. Traversal is lexicographic so hit lists are reproducible.
pub fn scan(sources: &Path, taxonomy: &Taxonomy, mode: ScanMode) -> Result<ScanResult, ScanError> {
    match mode {
        ScanMode::Ast => scan_with(sources, taxonomy, InvocationMatcher::new(taxonomy)?),
        ScanMode::Keyword => scan_with(sources, taxonomy, KeywordMatcher::new(taxonomy)?),
    }
}

pub fn scan_with<'t, M: Matcher<'t>>(
    sources: &Path,
    taxonomy: &'t Taxonomy,
    mut matcher: M,
) -> Result<ScanResult, ScanError> {
    let mut result = ScanResult::empty(taxonomy);
    if !sources.is_dir() {
        debug!("No sources at {}", sources.display());
        return Ok(result);
    }

    for entry in WalkDir::new(sources).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !matcher.accepts(entry.path()) {
            continue;
        }
        let rel = relative(sources, entry.path());
        result.files.push(rel.clone());

        let source = match fs::read(entry.path()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!("Cannot read {rel}: {e}");
                result.skipped += 1;
                continue;
            }
        };
        match matcher.hits(&source) {
            Some(hits) => {
                for category in hits {
                    result.record(category, &rel);
                }
            }
            None => {
                debug!("Cannot parse {rel}");
                result.skipped += 1;
            }
        }
    }
    Ok(result)
}
