use std::path::{Path, PathBuf};

use crate::{
    decompiler::Jadx,
    scanner::{ScanMode, Taxonomy},
};

pub const DEFAULT_SUFFIX: &str = ".apk";
pub const SCRATCH_DIR: &str = ".jadx-scratch";

/// Everything a batch run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Reused for every artifact and cleared in between.
    pub scratch_dir: PathBuf,
    pub jadx: Jadx,
    pub taxonomy: Taxonomy,
    pub scan_mode: ScanMode,
    /// Input files are selected by this file name suffix.
    pub artifact_suffix: String,
}

impl PipelineConfig {
    /// Defaults: `jadx` from `PATH`, 600 s timeout, AST scanning with the
    /// built-in taxonomy, scratch space inside the output directory.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            input_dir: input_dir.into(),
            scratch_dir: output_dir.join(SCRATCH_DIR),
            output_dir,
            jadx: Jadx::default(),
            taxonomy: Taxonomy::default_for(ScanMode::Ast),
            scan_mode: ScanMode::Ast,
            artifact_suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Switches the scan mode together with its built-in taxonomy.
    pub fn with_scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self.taxonomy = Taxonomy::default_for(mode);
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn with_jadx(mut self, jadx: Jadx) -> Self {
        self.jadx = jadx;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn artifact_name(&self, path: &Path) -> String {
        artifact_name(path, &self.artifact_suffix)
    }
}

/// Output name of the artifact at `path`: its file name without `suffix`.
pub fn artifact_name(path: &Path, suffix: &str) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(stem) = file_name.strip_suffix(suffix).filter(|s| !s.is_empty()) {
        return stem.to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::PipelineConfig;
    use crate::scanner::ScanMode;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("in", "out");
        assert_eq!(config.scratch_dir, Path::new("out/.jadx-scratch"));
        assert_eq!(config.jadx.timeout.as_secs(), 600);
        assert_eq!(config.scan_mode, ScanMode::Ast);
        assert!(config.taxonomy.categories().any(|c| c == "location"));

        let config = config.with_scan_mode(ScanMode::Keyword);
        assert!(config.taxonomy.categories().any(|c| c == "api_location"));
    }

    #[test]
    fn test_artifact_name() {
        let config = PipelineConfig::new("in", "out");
        assert_eq!(config.artifact_name(Path::new("in/com.whatsapp.apk")), "com.whatsapp");
        assert_eq!(config.artifact_name(Path::new("in/app.v2.apk")), "app.v2");
    }
}
