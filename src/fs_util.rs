use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::PipelineError;

/// Extracts one file from a zip archive into `target_dir`, matching on the
/// member's file name so archives with a top-level folder work too.
pub fn extract_member(
    zip_path: &Path,
    member: &str,
    target_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        PipelineError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| PipelineError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(entry_path) = entry.enclosed_name() else {
            return Err(PipelineError::Filesystem(
                "zip entry path traversal detected".to_string(),
            ));
        };
        if entry_path.file_name().and_then(|name| name.to_str()) != Some(member) {
            continue;
        }

        fs::create_dir_all(target_dir).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let destination = target_dir.join(member);
        let mut outfile = fs::File::create(&destination)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        return Ok(destination);
    }

    Err(PipelineError::InputNotFound(format!(
        "{member} in {}",
        zip_path.display()
    )))
}
