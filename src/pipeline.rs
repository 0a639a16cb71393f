use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use log::{error, info, warn};

use crate::{
    archive,
    config::PipelineConfig,
    decompiler::{Decompile, Jadx, SOURCES_DIR},
    errors::PipelineError,
    manifest::{self, Metadata},
    record::{AnalysisState, RawFeatures, RecordDir, Summary},
    scanner::{self, ScanResult},
};

/// What happened to one artifact during a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A summary already existed.
    Skipped,
    Invalid,
    Complete,
    Partial,
    /// Aborted by an unexpected error; no summary was written.
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Artifact names with their outcome, in processing order.
    pub artifacts: Vec<(String, Outcome)>,
}

impl BatchReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.artifacts.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(Outcome::Failed) > 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artifacts: {} complete, {} partial, {} invalid, {} skipped, {} failed",
            self.artifacts.len(),
            self.count(Outcome::Complete),
            self.count(Outcome::Partial),
            self.count(Outcome::Invalid),
            self.count(Outcome::Skipped),
            self.count(Outcome::Failed),
        )
    }
}

/// Files in `dir` whose name ends with `suffix`, sorted by name.
pub fn list_artifacts(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let input_err = |source| PipelineError::Input {
        path: dir.to_path_buf(),
        source,
    };
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir).map_err(input_err)? {
        let entry = entry.map_err(input_err)?;
        let path = entry.path();
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(suffix));
        if matches && path.is_file() {
            artifacts.push(path);
        }
    }
    artifacts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(artifacts)
}

/// Sequential batch driver. One artifact at a time: the scratch directory is
/// shared between artifacts, and the existence check on `summary.json` is not
/// locked, so two runs must never share an output directory.
pub struct Pipeline<D = Jadx> {
    config: PipelineConfig,
    decompiler: D,
}

impl Pipeline<Jadx> {
    pub fn new(config: PipelineConfig) -> Self {
        let decompiler = config.jadx.clone();
        Self { config, decompiler }
    }
}

impl<D: Decompile> Pipeline<D> {
    pub fn with_decompiler(config: PipelineConfig, decompiler: D) -> Self {
        Self { config, decompiler }
    }

    pub fn artifacts(&self) -> Result<Vec<PathBuf>, PipelineError> {
        list_artifacts(&self.config.input_dir, &self.config.artifact_suffix)
    }

    /// Processes every artifact in name order. Only an unreadable input
    /// directory fails the run; per-artifact errors are logged and counted.
    pub fn run(&self) -> Result<BatchReport, PipelineError> {
        let artifacts = self.artifacts()?;
        info!(
            "{} artifacts in {}",
            artifacts.len(),
            self.config.input_dir.display()
        );

        let mut report = BatchReport::default();
        for path in artifacts {
            let name = self.config.artifact_name(&path);
            let outcome = match self.analyze(&path) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Failed {name}: {e}");
                    self.clear_scratch();
                    Outcome::Failed
                }
            };
            report.artifacts.push((name, outcome));
        }
        info!("{report}");
        Ok(report)
    }

    pub fn analyze(&self, path: &Path) -> Result<Outcome, PipelineError> {
        let name = self.config.artifact_name(path);
        let records = RecordDir::new(&self.config.output_dir, &name);
        if records.has_summary() {
            info!("Skipped {name}");
            return Ok(Outcome::Skipped);
        }

        info!("Analyzing {name}");
        fs::create_dir_all(records.path()).map_err(|source| PipelineError::Io {
            path: records.path().to_path_buf(),
            source,
        })?;

        let sha256 = archive::sha256(path);

        if !archive::validate(path) {
            records.write_summary(&Summary::invalid(&name, sha256))?;
            warn!("Invalid APK {name}");
            return Ok(Outcome::Invalid);
        }

        let metadata = Metadata::from(manifest::extract(path));
        if let Metadata::Failed { error } = &metadata {
            warn!("{name}: {error}");
        }

        let stats = archive::inspect(path)?;

        let scratch = &self.config.scratch_dir;
        let decompilation = self.decompiler.decompile(path, scratch);
        let scan = if decompilation.is_ok() {
            scanner::scan(
                &scratch.join(SOURCES_DIR),
                &self.config.taxonomy,
                self.config.scan_mode,
            )
        } else {
            warn!("{name}: decompilation {:?}", decompilation.status);
            Ok(ScanResult::empty(&self.config.taxonomy))
        };
        self.clear_scratch();
        let scan = scan?;

        records.write_raw_features(&RawFeatures::new(&scan, &stats, &metadata))?;
        let summary = Summary::analyzed(&name, sha256, metadata, &stats, &decompilation, &scan);
        records.write_summary(&summary)?;

        info!(
            "Done {name} ({} files, {} hits)",
            scan.files.len(),
            scan.counts.values().sum::<u64>()
        );
        Ok(match summary.analysis_state {
            AnalysisState::Complete => Outcome::Complete,
            _ => Outcome::Partial,
        })
    }

    fn clear_scratch(&self) {
        match fs::remove_dir_all(&self.config.scratch_dir) {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => warn!(
                "Cannot remove {}: {e}",
                self.config.scratch_dir.display()
            ),
        }
    }
}
