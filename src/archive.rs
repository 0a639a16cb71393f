use std::{fs::File, io, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::errors::ArchiveError;

pub const DEX_SUFFIX: &str = ".dex";
pub const NATIVE_LIB_SUFFIX: &str = ".so";

/// Entry-level statistics gathered from a single pass over the archive's
/// central directory.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub dex_count: usize,
    /// Native library entries in central directory order.
    pub native_libs: Vec<String>,
}

/// Hex-encoded SHA-256 of the file contents, or `None` if it cannot be read.
pub fn sha256(path: &Path) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot hash {}: {e}", path.display());
            return None;
        }
    };
    let mut hasher = Sha256::new();
    match io::copy(&mut file, &mut hasher) {
        Ok(_) => Some(hex::encode(hasher.finalize())),
        Err(e) => {
            debug!("Cannot hash {}: {e}", path.display());
            None
        }
    }
}

/// Whether `path` is a readable zip container. Never fails; anything that is
/// not a zip (or cannot be opened) is just `false`.
pub fn validate(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => ZipArchive::new(file).is_ok(),
        Err(_) => false,
    }
}

/// Counts bytecode entries and collects native library entries. Entry
/// contents are never decompressed.
pub fn inspect(path: &Path) -> Result<ArchiveStats, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    })?;

    let mut stats = ArchiveStats::default();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|source| ArchiveError::Zip {
            path: path.to_path_buf(),
            source,
        })?;
        let name = entry.name();
        if name.ends_with(DEX_SUFFIX) {
            stats.dex_count += 1;
        } else if name.ends_with(NATIVE_LIB_SUFFIX) {
            stats.native_libs.push(name.to_string());
        }
    }
    Ok(stats)
}
