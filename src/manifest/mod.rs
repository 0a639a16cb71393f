mod component;

pub use component::{resolve_name, ComponentKind};

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Read,
    path::Path,
};

use axmldecoder::{Element, Node, XmlDocument};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zip::{result::ZipError, ZipArchive};

use crate::{errors::ManifestError, permissions::RiskCounts};

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
/// Largest manifest entry that is read. Real manifests are a few dozen KiB.
pub const MAX_MANIFEST_SIZE: u64 = 8 * 1024 * 1024;

/// Identity, platform levels, permissions and components of an APK.
///
/// All lists are deduplicated and sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub package_name: Option<String>,
    pub version_code: Option<u64>,
    pub version_name: Option<String>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub receivers: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    /// Filled in by the enrichment pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_details: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_counts: Option<RiskCounts>,
    /// Keys written by other tools, kept when a summary is rewritten.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `metadata` section of a summary: either the parsed manifest or the
/// reason it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metadata {
    Failed { error: String },
    Parsed(ManifestInfo),
}

impl Metadata {
    pub fn info(&self) -> Option<&ManifestInfo> {
        match self {
            Metadata::Parsed(info) => Some(info),
            Metadata::Failed { .. } => None,
        }
    }

    pub fn info_mut(&mut self) -> Option<&mut ManifestInfo> {
        match self {
            Metadata::Parsed(info) => Some(info),
            Metadata::Failed { .. } => None,
        }
    }

    pub fn activities(&self) -> &[String] {
        self.info().map(|i| i.activities.as_slice()).unwrap_or_default()
    }

    pub fn services(&self) -> &[String] {
        self.info().map(|i| i.services.as_slice()).unwrap_or_default()
    }

    pub fn receivers(&self) -> &[String] {
        self.info().map(|i| i.receivers.as_slice()).unwrap_or_default()
    }
}

impl From<Result<Manifest, ManifestError>> for Metadata {
    fn from(result: Result<Manifest, ManifestError>) -> Self {
        match result {
            Ok(manifest) => Metadata::Parsed(manifest.info),
            Err(e) => Metadata::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub info: ManifestInfo,
    /// `<permission>` elements the app declares itself, name to raw
    /// `protectionLevel`.
    pub declared_permissions: BTreeMap<String, String>,
}

/// Attribute lookup over a manifest element.
pub trait Attributes {
    fn attr(&self, key: &str) -> Option<&str>;
}

impl Attributes for Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

impl Attributes for [(&str, &str)] {
    fn attr(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }
}

/// Accumulates manifest elements in document order.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    package: Option<String>,
    version_code: Option<u64>,
    version_name: Option<String>,
    min_sdk: Option<u32>,
    target_sdk: Option<u32>,
    permissions: BTreeSet<String>,
    activities: BTreeSet<String>,
    services: BTreeSet<String>,
    receivers: BTreeSet<String>,
    providers: BTreeSet<String>,
    declared_permissions: BTreeMap<String, String>,
}

impl ManifestBuilder {
    /// The root `<manifest>` element.
    pub fn root<A: Attributes + ?Sized>(&mut self, attrs: &A) {
        self.package = attrs.attr("package").map(str::to_string);
        self.version_code = attrs.attr("android:versionCode").and_then(parse_int);
        self.version_name = attrs.attr("android:versionName").map(str::to_string);
    }

    /// A direct child of `<manifest>`.
    pub fn top_level<A: Attributes + ?Sized>(&mut self, tag: &str, attrs: &A) {
        match tag {
            "uses-permission" | "uses-permission-sdk-23" => {
                if let Some(name) = attrs.attr("android:name") {
                    self.permissions.insert(name.to_string());
                }
            }
            "permission" => {
                if let Some(name) = attrs.attr("android:name") {
                    let level = attrs.attr("android:protectionLevel").unwrap_or("0");
                    self.declared_permissions
                        .insert(name.to_string(), level.to_string());
                }
            }
            "uses-sdk" => {
                self.min_sdk = attrs
                    .attr("android:minSdkVersion")
                    .and_then(parse_int)
                    .and_then(|v| u32::try_from(v).ok());
                self.target_sdk = attrs
                    .attr("android:targetSdkVersion")
                    .and_then(parse_int)
                    .and_then(|v| u32::try_from(v).ok());
            }
            _ => (),
        }
    }

    /// A direct child of `<application>`.
    pub fn component<A: Attributes + ?Sized>(&mut self, tag: &str, attrs: &A) {
        let Some(kind) = ComponentKind::from_tag(tag) else {
            return;
        };
        let Some(name) = attrs.attr("android:name") else {
            debug!("<{tag}> without android:name");
            return;
        };
        let name = resolve_name(self.package.as_deref(), name);
        match kind {
            ComponentKind::Activity => self.activities.insert(name),
            ComponentKind::Service => self.services.insert(name),
            ComponentKind::Receiver => self.receivers.insert(name),
            ComponentKind::Provider => self.providers.insert(name),
        };
    }

    pub fn build(self) -> Manifest {
        Manifest {
            info: ManifestInfo {
                package_name: self.package,
                version_code: self.version_code,
                version_name: self.version_name,
                min_sdk: self.min_sdk,
                target_sdk: self.target_sdk,
                permissions: self.permissions.into_iter().collect(),
                activities: self.activities.into_iter().collect(),
                services: self.services.into_iter().collect(),
                receivers: self.receivers.into_iter().collect(),
                providers: self.providers.into_iter().collect(),
                permission_details: None,
                risk_counts: None,
                extra: Map::new(),
            },
            declared_permissions: self.declared_permissions,
        }
    }
}

/// Decimal or `0x` prefixed hexadecimal.
fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Parses a binary `AndroidManifest.xml`.
pub fn parse(buf: &[u8]) -> Result<Manifest, ManifestError> {
    let XmlDocument { root } = axmldecoder::parse(buf)?;
    let Some(Node::Element(root)) = root else {
        return Err(ManifestError::NoRoot);
    };

    let mut builder = ManifestBuilder::default();
    builder.root(&root);
    for node in &root.children {
        if let Node::Element(element) = node {
            let tag = element.get_tag();
            if tag == "application" {
                for node in &element.children {
                    if let Node::Element(child) = node {
                        builder.component(child.get_tag(), child);
                    }
                }
            } else {
                builder.top_level(tag, element);
            }
        }
    }
    Ok(builder.build())
}

/// Reads and parses the manifest entry of the APK at `path`.
pub fn extract(path: &Path) -> Result<Manifest, ManifestError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ManifestError::Missing),
        Err(e) => return Err(e.into()),
    };
    let claimed = entry.size();
    let buf = read_capped(&mut entry, claimed, MAX_MANIFEST_SIZE)?;
    parse(&buf)
}

/// Reads at most `limit` bytes. `claimed` is the size recorded in the
/// archive and is only a capacity hint.
fn read_capped<R: Read>(reader: R, claimed: u64, limit: u64) -> Result<Vec<u8>, ManifestError> {
    let mut buf = Vec::with_capacity(claimed.min(limit) as usize);
    reader.take(limit + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(ManifestError::TooLarge(limit));
    }
    Ok(buf)
}
