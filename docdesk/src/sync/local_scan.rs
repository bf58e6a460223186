use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use super::upload::{FALLBACK_ROOT_NAME, UploadFile, UploadSource};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lists every regular file below `root` with a picker-style relative path
/// (`<dir name>/<sub dirs>/<file>`), sorted by path.
pub fn scan_directory(root: &Path) -> Result<Vec<UploadFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize()?;
    let dir_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_ROOT_NAME.to_string());

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let mut relative_path = dir_name.clone();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                relative_path.push('/');
                relative_path.push_str(&part.to_string_lossy());
            }
        }
        files.push(UploadFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            relative_path: Some(relative_path),
            mime_type: None,
            size: entry.metadata()?.len(),
            source: UploadSource::Path(entry.path().to_path_buf()),
        });
    }
    Ok(files)
}
