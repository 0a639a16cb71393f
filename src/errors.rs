use std::{io, path::PathBuf};

use axmldecoder::ParseError;
use thiserror::Error;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Failed to read archive {path}: {source}")]
    Zip {
        path: PathBuf,
        source: ZipError,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read archive: {0}")]
    ZipError(ZipError),
    #[error("AndroidManifest.xml not found in archive")]
    Missing,
    #[error("Failed to read AndroidManifest.xml: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse manifest: {0}")]
    ManifestError(ParseError),
    #[error("Manifest has no <manifest> root element")]
    NoRoot,
    #[error("AndroidManifest.xml is larger than {0} bytes")]
    TooLarge(u64),
}

impl From<ZipError> for ManifestError {
    fn from(e: ZipError) -> Self {
        ManifestError::ZipError(e)
    }
}

impl From<ParseError> for ManifestError {
    fn from(e: ParseError) -> Self {
        ManifestError::ManifestError(e)
    }
}

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("Failed to read taxonomy {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Malformed taxonomy {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Taxonomy has no categories")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to load the Java grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("Failed to compile keyword patterns: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read permission catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Malformed permission catalog {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Malformed record {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("Failed to read manifest: {0}")]
    Manifest(#[from] ManifestError),
}

/// Errors that abort a single artifact. The batch driver logs them and moves
/// on to the next artifact.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Failed to list input directory {path}: {source}")]
    Input {
        path: PathBuf,
        source: io::Error,
    },
}
