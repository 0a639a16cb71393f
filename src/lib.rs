//! Batch static analysis of Android packages.
//!
//! For every APK in an input directory the [`Pipeline`] hashes the file,
//! validates the zip container, extracts manifest metadata, counts dex and
//! native library entries, decompiles it with jadx and scans the resulting
//! Java sources for calls into sensitive APIs. Results land in
//! `<output>/<name>/summary.json` and `raw_features.json`.

pub mod archive;
pub mod config;
pub mod decompiler;
pub mod enrich;
pub mod errors;
pub mod manifest;
pub mod permissions;
pub mod pipeline;
pub mod record;
pub mod scanner;

pub use config::PipelineConfig;
pub use decompiler::{Decompilation, Decompile, DecompileStatus, Jadx};
pub use pipeline::{BatchReport, Outcome, Pipeline};
pub use scanner::{ScanMode, Taxonomy};
