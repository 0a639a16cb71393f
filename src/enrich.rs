//! Second pass over finished summaries: annotate requested permissions with
//! their protection level.

use std::{collections::BTreeMap, fmt, path::Path};

use log::{info, warn};

use crate::{
    config::artifact_name,
    errors::{EnrichError, PipelineError},
    manifest::{self, Manifest, ManifestInfo},
    permissions::{PermissionCatalog, RiskCounts},
    pipeline::list_artifacts,
    record::RecordDir,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Updated,
    /// No summary yet.
    Missing,
    /// The summary has no parsed metadata to extend.
    Skipped,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub artifacts: Vec<(String, EnrichOutcome)>,
}

impl EnrichReport {
    pub fn count(&self, outcome: EnrichOutcome) -> usize {
        self.artifacts.iter().filter(|(_, o)| *o == outcome).count()
    }
}

impl fmt::Display for EnrichReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artifacts: {} updated, {} missing, {} skipped, {} failed",
            self.artifacts.len(),
            self.count(EnrichOutcome::Updated),
            self.count(EnrichOutcome::Missing),
            self.count(EnrichOutcome::Skipped),
            self.count(EnrichOutcome::Failed),
        )
    }
}

/// Rewrites the summary of `apk` with `permission_details` and
/// `risk_counts`. Requires the summary to exist.
pub fn enrich(
    apk: &Path,
    records: &RecordDir,
    catalog: &PermissionCatalog,
) -> Result<EnrichOutcome, EnrichError> {
    if !records.has_summary() {
        return Ok(EnrichOutcome::Missing);
    }
    let mut summary = records.read_summary()?;
    let Some(info) = summary.metadata.as_mut().and_then(|m| m.info_mut()) else {
        return Ok(EnrichOutcome::Skipped);
    };

    let manifest = manifest::extract(apk)?;
    annotate(info, &manifest, catalog);
    records.write_summary(&summary)?;
    Ok(EnrichOutcome::Updated)
}

/// Sets the protection level of every permission `manifest` requests.
pub fn annotate(info: &mut ManifestInfo, manifest: &Manifest, catalog: &PermissionCatalog) {
    let details: BTreeMap<String, String> = manifest
        .info
        .permissions
        .iter()
        .map(|perm| {
            let level = catalog.protection_level(perm, &manifest.declared_permissions);
            (perm.clone(), level)
        })
        .collect();
    info.risk_counts = Some(RiskCounts::tally(details.values()));
    info.permission_details = Some(details);
}

/// Runs [`enrich`] over every artifact in `input_dir`, in name order.
pub fn enrich_all(
    input_dir: &Path,
    output_dir: &Path,
    suffix: &str,
    catalog: &PermissionCatalog,
) -> Result<EnrichReport, PipelineError> {
    let mut report = EnrichReport::default();
    for apk in list_artifacts(input_dir, suffix)? {
        let name = artifact_name(&apk, suffix);
        let records = RecordDir::new(output_dir, &name);
        let outcome = match enrich(&apk, &records, catalog) {
            Ok(EnrichOutcome::Updated) => {
                info!("Updated {name}");
                EnrichOutcome::Updated
            }
            Ok(EnrichOutcome::Missing) => {
                warn!("No summary for {name}, skipping");
                EnrichOutcome::Missing
            }
            Ok(outcome) => {
                warn!("No metadata in summary of {name}, skipping");
                outcome
            }
            Err(e) => {
                warn!("Cannot enrich {name}: {e}");
                EnrichOutcome::Failed
            }
        };
        report.artifacts.push((name, outcome));
    }
    info!("{report}");
    Ok(report)
}
