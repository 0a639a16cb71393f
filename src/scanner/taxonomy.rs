use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use super::ScanMode;
use crate::errors::TaxonomyError;

lazy_static! {
    static ref INVOCATIONS: Taxonomy = Taxonomy::from_pairs(&[
        (
            "location",
            &["requestLocationUpdates", "getLastLocation", "getCurrentLocation"],
        ),
        ("microphone", &["startRecording"]),
        ("camera", &["openCamera", "open"]),
        ("media_projection", &["getMediaProjection", "createVirtualDisplay"]),
        ("dynamic_load", &["DexClassLoader", "PathClassLoader"]),
        ("jni", &["loadLibrary"]),
    ]);
    static ref KEYWORDS: Taxonomy = Taxonomy::from_pairs(&[
        ("api_location", &["LocationManager", "FusedLocationProvider"]),
        ("api_media_projection", &["MediaProjection"]),
        ("api_sensor_av", &["Camera", "AudioRecord", "MediaRecorder"]),
        ("api_dynamic_load", &["DexClassLoader", "PathClassLoader"]),
        ("api_jni", &["System.loadLibrary"]),
    ]);
}

/// Sensitive capability category to the names that count as evidence of it.
///
/// For [`ScanMode::Ast`] the names are simple method names matched against
/// invocations; for [`ScanMode::Keyword`] they are literal substrings.
/// Serializes as a plain JSON object of arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxonomy {
    categories: BTreeMap<String, BTreeSet<String>>,
}

impl Taxonomy {
    pub fn new(categories: BTreeMap<String, BTreeSet<String>>) -> Result<Self, TaxonomyError> {
        if categories.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        Ok(Self { categories })
    }

    fn from_pairs(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            categories: pairs
                .iter()
                .map(|(category, names)| {
                    (
                        category.to_string(),
                        names.iter().map(|n| n.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// The built-in table for `mode`.
    pub fn default_for(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Ast => INVOCATIONS.clone(),
            ScanMode::Keyword => KEYWORDS.clone(),
        }
    }

    pub fn from_json(text: &str, path: &Path) -> Result<Self, TaxonomyError> {
        let categories = serde_json::from_str(text).map_err(|source| TaxonomyError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(categories)
    }

    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let text = fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Name to every category listing it, categories in order.
    pub fn inverted(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (category, names) in self.iter() {
            for name in names {
                index.entry(name.as_str()).or_default().push(category);
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::Taxonomy;
    use crate::{errors::TaxonomyError, scanner::ScanMode};

    #[test]
    fn test_defaults() {
        let ast = Taxonomy::default_for(ScanMode::Ast);
        assert_eq!(
            ast.categories().collect::<Vec<_>>(),
            vec!["camera", "dynamic_load", "jni", "location", "media_projection", "microphone"]
        );
        let keyword = Taxonomy::default_for(ScanMode::Keyword);
        assert_eq!(keyword.categories().count(), 5);
        assert!(keyword
            .iter()
            .any(|(c, names)| c == "api_jni" && names.contains("System.loadLibrary")));
    }

    #[test]
    fn test_from_json() {
        let taxonomy = Taxonomy::from_json(
            r#"{"sms": ["sendTextMessage", "sendMultipartTextMessage"], "camera": ["open"]}"#,
            Path::new("t.json"),
        )
        .unwrap();
        assert_eq!(taxonomy.categories().collect::<Vec<_>>(), vec!["camera", "sms"]);

        assert!(matches!(
            Taxonomy::from_json("{}", Path::new("t.json")),
            Err(TaxonomyError::Empty)
        ));
        assert!(matches!(
            Taxonomy::from_json(r#"{"sms": "sendTextMessage"}"#, Path::new("t.json")),
            Err(TaxonomyError::Json { .. })
        ));
    }

    #[test]
    fn test_inverted() {
        let taxonomy = Taxonomy::from_json(
            r#"{"camera": ["open", "openCamera"], "files": ["open"]}"#,
            Path::new("t.json"),
        )
        .unwrap();
        let index = taxonomy.inverted();
        assert_eq!(index["open"], vec!["camera", "files"]);
        assert_eq!(index["openCamera"], vec!["camera"]);
    }

    #[test]
    fn test_json_round_trip() {
        let taxonomy = Taxonomy::default_for(ScanMode::Ast);
        let json = serde_json::to_string(&taxonomy).unwrap();
        assert!(json.starts_with(r#"{"camera":["open","openCamera"]"#));
        assert_eq!(Taxonomy::from_json(&json, Path::new("-")).unwrap(), taxonomy);
    }
}
