//! Content-derived revision identifiers for project directories.
//!
//! The revision covers exactly what a bundle would contain: every regular
//! file under the project root (symlinks skipped), keyed by its relative
//! path. Unstaged and untracked edits therefore change the revision.

use crate::errors::ArchiveError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

/// Compute a hex-encoded SHA256 revision id for `project_dir`.
///
/// Paths are hashed in sorted order with separators normalised to `/`, so
/// the result is stable across platforms and walk orders.
pub fn compute_revision(project_dir: &Path) -> Result<String, ArchiveError> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(project_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(project_dir).to_path_buf();
            ArchiveError::Filesystem {
                path,
                source: err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(project_dir)
            .unwrap_or(entry.path());
        let name: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let fs_err = |source: std::io::Error| ArchiveError::Filesystem {
            path: entry.path().to_path_buf(),
            source,
        };
        let mut file = File::open(entry.path()).map_err(fs_err)?;
        let len = file.metadata().map_err(fs_err)?.len();

        hasher.update(name.join("/").as_bytes());
        hasher.update([0u8]);
        hasher.update(len.to_le_bytes());
        std::io::copy(&mut file, &mut hasher).map_err(fs_err)?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}
