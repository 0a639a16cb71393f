use std::{collections::BTreeMap, path::Path};

use tree_sitter::Parser;

use super::{taxonomy::Taxonomy, Matcher};
use crate::errors::ScanError;

const INVOCATION: &str = "method_invocation";

/// Matches the simple name of every `method_invocation` in a Java syntax
/// tree.
pub struct InvocationMatcher<'t> {
    parser: Parser,
    index: BTreeMap<&'t str, Vec<&'t str>>,
}

impl<'t> InvocationMatcher<'t> {
    pub fn new(taxonomy: &'t Taxonomy) -> Result<Self, ScanError> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_java::LANGUAGE.into())?;
        Ok(Self {
            parser,
            index: taxonomy.inverted(),
        })
    }
}

impl<'t> Matcher<'t> for InvocationMatcher<'t> {
    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "java")
    }

    fn hits(&mut self, source: &str) -> Option<Vec<&'t str>> {
        let tree = self.parser.parse(source, None)?;
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }

        let bytes = source.as_bytes();
        let mut hits = Vec::new();
        let mut cursor = tree.walk();
        loop {
            let node = cursor.node();
            if node.kind() == INVOCATION {
                if let Some(name) = node
                    .child_by_field_name("name")
                    .and_then(|name| name.utf8_text(bytes).ok())
                {
                    if let Some(categories) = self.index.get(name) {
                        hits.extend(categories.iter().copied());
                    }
                }
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Some(hits);
                }
            }
        }
    }
}
