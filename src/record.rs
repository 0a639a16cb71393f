//! Per-artifact output records.
//!
//! Each artifact gets a directory under the output root holding
//! `summary.json` and, unless the archive was invalid, `raw_features.json`.
//! The presence of `summary.json` marks the artifact as processed.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{ser::PrettyFormatter, Map, Value};

use crate::{
    archive::ArchiveStats,
    decompiler::{Decompilation, DecompileStatus},
    errors::RecordError,
    manifest::Metadata,
    scanner::ScanResult,
};

pub const SUMMARY_FILE: &str = "summary.json";
pub const RAW_FEATURES_FILE: &str = "raw_features.json";

/// Appended to a record's file name while it is being written.
pub const TMP_SUFFIX: &str = ".tmp";

pub const INVALID_APK_ERROR: &str = "File is not a valid ZIP/APK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Complete,
    Partial,
    InvalidApk,
}

impl AnalysisState {
    pub fn from_decompilation(decompilation: &Decompilation) -> Self {
        if decompilation.is_ok() {
            AnalysisState::Complete
        } else {
            AnalysisState::Partial
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedComponents {
    pub activities: Vec<String>,
    pub services: Vec<String>,
    pub receivers: Vec<String>,
}

impl From<&Metadata> for ExportedComponents {
    fn from(metadata: &Metadata) -> Self {
        Self {
            activities: metadata.activities().to_vec(),
            services: metadata.services().to_vec(),
            receivers: metadata.receivers().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeatures {
    pub java_files: Vec<String>,
    pub ast_hits_by_file: BTreeMap<String, Vec<String>>,
    pub native_libs: Vec<String>,
    pub dex_files_count: usize,
    pub exported_components: ExportedComponents,
}

impl RawFeatures {
    pub fn new(scan: &ScanResult, stats: &ArchiveStats, metadata: &Metadata) -> Self {
        Self {
            java_files: scan.files.clone(),
            ast_hits_by_file: scan.hits.clone(),
            native_libs: stats.native_libs.clone(),
            dex_files_count: stats.dex_count,
            exported_components: metadata.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub dex_count: usize,
    pub native_lib_count: usize,
}

impl From<&ArchiveStats> for Stats {
    fn from(stats: &ArchiveStats) -> Self {
        Self {
            dex_count: stats.dex_count,
            native_lib_count: stats.native_libs.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JadxReport {
    pub status: DecompileStatus,
    pub duration_sec: f64,
    pub sources_present: bool,
    pub java_file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl JadxReport {
    pub fn new(decompilation: &Decompilation, scan: &ScanResult) -> Self {
        Self {
            status: decompilation.status,
            duration_sec: decompilation.duration_sec,
            sources_present: !scan.files.is_empty(),
            java_file_count: scan.files.len(),
            exit_code: decompilation.exit_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub apk_name: String,
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jadx: Option<JadxReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast_analysis: Option<BTreeMap<String, u64>>,
    pub analysis_state: AnalysisState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Summary {
    /// Summary of an artifact that is not a zip container.
    pub fn invalid(apk_name: &str, sha256: Option<String>) -> Self {
        Self {
            apk_name: apk_name.to_string(),
            sha256,
            metadata: None,
            stats: None,
            jadx: None,
            ast_analysis: None,
            analysis_state: AnalysisState::InvalidApk,
            error: Some(INVALID_APK_ERROR.to_string()),
            extra: Map::new(),
        }
    }

    pub fn analyzed(
        apk_name: &str,
        sha256: Option<String>,
        metadata: Metadata,
        stats: &ArchiveStats,
        decompilation: &Decompilation,
        scan: &ScanResult,
    ) -> Self {
        Self {
            apk_name: apk_name.to_string(),
            sha256,
            metadata: Some(metadata),
            stats: Some(stats.into()),
            jadx: Some(JadxReport::new(decompilation, scan)),
            ast_analysis: Some(scan.counts.clone()),
            analysis_state: AnalysisState::from_decompilation(decompilation),
            error: None,
            extra: Map::new(),
        }
    }
}

/// Output locations of one artifact.
#[derive(Debug, Clone)]
pub struct RecordDir {
    dir: PathBuf,
}

impl RecordDir {
    pub fn new(output_root: &Path, apk_name: &str) -> Self {
        Self {
            dir: output_root.join(apk_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    pub fn raw_features_path(&self) -> PathBuf {
        self.dir.join(RAW_FEATURES_FILE)
    }

    pub fn has_summary(&self) -> bool {
        self.summary_path().is_file()
    }

    pub fn write_summary(&self, summary: &Summary) -> Result<(), RecordError> {
        write_json(&self.summary_path(), summary)
    }

    pub fn write_raw_features(&self, raw: &RawFeatures) -> Result<(), RecordError> {
        write_json(&self.raw_features_path(), raw)
    }

    pub fn read_summary(&self) -> Result<Summary, RecordError> {
        read_json(&self.summary_path())
    }

    pub fn read_raw_features(&self) -> Result<RawFeatures, RecordError> {
        read_json(&self.raw_features_path())
    }
}

/// Pretty printed with four space indentation, UTF-8 as is. Creates parent
/// directories. The document is written next to `path` and renamed over it,
/// so `path` is either absent, the previous version or complete.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RecordError> {
    let tmp = tmp_path(path);
    let io_err = |source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let written = write_pretty(&tmp, value);
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
        return written;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RecordError> {
    let io_err = |source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    let mut ser =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.sync_all().map_err(io_err)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RecordError> {
    let file = File::open(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })
}
